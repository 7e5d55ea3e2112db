use aws_sdk_sns::{types::MessageAttributeValue, Client as SnsClient};

use crate::error::NotifyError;

/// Message attribute the mail relay reads recipients from.
pub const RECIPIENTS_ATTRIBUTE: &str = "recipients";

/// SNS rejects subjects longer than this.
const MAX_SUBJECT_LEN: usize = 100;

/// An email to election stakeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(to: Vec<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Outbound notification delivery.
#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Send a notification, logging rather than returning any failure.
/// Returns whether it was handed off.
pub async fn send_logged(notifier: &dyn Notifier, notification: &Notification) -> bool {
    match notifier.send(notification).await {
        Ok(()) => {
            debug!(
                "Sent '{}' to {}",
                notification.subject,
                notification.to.join(", ")
            );
            true
        }
        Err(e) => {
            error!("Notification '{}' was not sent: {e}", notification.subject);
            false
        }
    }
}

/// Publishes notifications to an SNS topic. A mail relay subscribed to the
/// topic fans each message out to its recipients.
pub struct SnsNotifier {
    client: SnsClient,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(client: SnsClient, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[rocket::async_trait]
impl Notifier for SnsNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if notification.to.is_empty() {
            return Err(NotifyError::NoRecipients(notification.subject.clone()));
        }
        let recipients = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(notification.to.join(","))
            .build()
            .map_err(|e| NotifyError::Build(e.to_string()))?;
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(sns_subject(&notification.subject))
            .message(&notification.body)
            .message_attributes(RECIPIENTS_ATTRIBUTE, recipients)
            .send()
            .await
            .map_err(|e| NotifyError::Send(e.to_string()))?;
        Ok(())
    }
}

/// Fit a subject to what SNS accepts: printable ASCII on one line, at most
/// 100 characters. Anything else is replaced rather than rejected.
fn sns_subject(subject: &str) -> String {
    let cleaned: String = subject
        .chars()
        .map(|c| match c {
            c if c.is_ascii_whitespace() || c.is_control() => ' ',
            c if c.is_ascii() => c,
            _ => '?',
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return "Notification".to_string();
    }
    if cleaned.len() <= MAX_SUBJECT_LEN {
        return cleaned.to_string();
    }
    format!("{}...", cleaned[..MAX_SUBJECT_LEN - 3].trim_end())
}
