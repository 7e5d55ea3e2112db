use serde::{Deserialize, Serialize};

use crate::{
    config::VotingConfig,
    error::{Error, Result},
    model::{
        notify::{send_logged, Notification},
        platform::Platform,
        results::StoreHandle,
        submission::Submission,
    },
};

use super::validator::{validate, Verdict};

/// A ballot submission as dispatched by the form platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmissionEvent {
    /// The results destination the submitting ballot writes into.
    pub destination_id: String,
    pub answers: Submission,
}

/// What happened to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub verdict: Verdict,
    pub accepted: bool,
    pub reason: String,
}

impl From<Verdict> for SubmissionReceipt {
    fn from(verdict: Verdict) -> Self {
        Self {
            verdict,
            accepted: verdict.is_valid(),
            reason: verdict.reason().to_string(),
        }
    }
}

/// Records each ballot submission as a vote or quarantines it.
pub struct SubmissionHandler {
    platform: Platform,
    config: VotingConfig,
}

impl SubmissionHandler {
    pub fn new(platform: Platform, config: VotingConfig) -> Self {
        Self { platform, config }
    }

    /// Validate a submission and store it in the results or quarantine store.
    ///
    /// Rejected votes are a normal outcome, not an error. Notifications are
    /// sent after the row is stored and their failures are only logged.
    pub async fn on_ballot_submission(&self, event: SubmissionEvent) -> Result<SubmissionReceipt> {
        let SubmissionEvent {
            destination_id,
            answers,
        } = event;
        let mut submission = answers.normalized();

        let results = self
            .platform
            .results
            .open(&destination_id, &self.config.results_store, true)
            .await?
            .ok_or_else(|| Error::not_found(&self.config.results_store))?;
        let existing = self.platform.results.read(&results).await?;
        let raw = submission.clone();

        let verdict = validate(
            &mut submission,
            &existing,
            &destination_id,
            &self.config,
            self.platform.tokens.as_ref(),
        )
        .await?;

        if verdict.is_valid() {
            self.record(&results, &submission).await?;
        } else {
            self.quarantine(&results, submission, &raw, verdict).await?;
        }
        Ok(verdict.into())
    }

    async fn record(&self, results: &StoreHandle, vote: &Submission) -> Result<()> {
        self.platform.results.append(results, vote).await?;
        info!("Recorded vote in '{}'", results.title);

        if let Some(voter) = self.voter_of(vote) {
            let notification = Notification::new(
                vec![voter.to_string()],
                format!("Your vote in '{}' was recorded", results.title),
                format!(
                    "Thank you for voting. Your vote was recorded as follows:\n\n{vote}"
                ),
            );
            send_logged(self.platform.notifier.as_ref(), &notification).await;
        }
        Ok(())
    }

    async fn quarantine(
        &self,
        results: &StoreHandle,
        mut rejected: Submission,
        raw: &Submission,
        verdict: Verdict,
    ) -> Result<()> {
        if self.config.quarantine_keeps_token {
            if let Some(token) = raw.get(&self.config.token_field) {
                rejected.insert(self.config.token_field.as_str(), token.clone());
            }
        }

        let quarantine = self
            .platform
            .results
            .open(&results.destination_id, &self.config.quarantine_store, true)
            .await?
            .ok_or_else(|| Error::not_found(&self.config.quarantine_store))?;
        self.platform.results.append(&quarantine, &rejected).await?;
        warn!(
            "Quarantined submission to '{}': {}",
            results.title,
            verdict.reason()
        );

        if let Err(e) = self
            .platform
            .results
            .flag_needs_attention(&results.destination_id)
            .await
        {
            error!("Could not flag '{}' for attention: {e}", results.title);
        }

        match self
            .platform
            .results
            .collaborators(&results.destination_id)
            .await
        {
            Ok(collaborators) if !collaborators.is_empty() => {
                let notification = Notification::new(
                    collaborators,
                    format!("Manual count needed for '{}'", results.title),
                    format!(
                        "A submission to '{}' was rejected because {}. It has been moved \
                         to '{}' and the results will need a manual count.\n\n\
                         Submission as received:\n\n{raw}",
                        results.title,
                        verdict.reason(),
                        self.config.quarantine_store
                    ),
                );
                send_logged(self.platform.notifier.as_ref(), &notification).await;
            }
            Ok(_) => warn!("'{}' has no collaborators to alert", results.title),
            Err(e) => error!("Could not look up collaborators of '{}': {e}", results.title),
        }

        if let Some(voter) = self.voter_of(&rejected) {
            let notification = Notification::new(
                vec![voter.to_string()],
                format!("Your vote in '{}' was not counted", results.title),
                format!(
                    "Your submission was rejected because {}. The election officers \
                     have been told.\n",
                    verdict.reason()
                ),
            );
            send_logged(self.platform.notifier.as_ref(), &notification).await;
        }
        Ok(())
    }

    fn voter_of<'a>(&self, submission: &'a Submission) -> Option<&'a str> {
        submission
            .text(&self.config.voter_email_field)
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{memory::MemoryPlatform, submission::Answer};

    const DESTINATION: &str = "results-ballot-A";

    fn handler(config: VotingConfig) -> (MemoryPlatform, SubmissionHandler) {
        let memory = MemoryPlatform::new();
        memory.add_destination(
            DESTINATION,
            "Board Vote (Responses)",
            &["secretary@example.com", "observer@example.com"],
        );
        let handler = SubmissionHandler::new(memory.platform(), config);
        (memory, handler)
    }

    /// A submission as the form platform sends it: every answer in a list.
    fn event(token: &str, answer: &str) -> SubmissionEvent {
        let answers = [
            ("TOKEN", Answer::Many(vec![token.to_string()])),
            ("Answer1", Answer::Many(vec![answer.to_string()])),
        ]
        .into_iter()
        .collect();
        SubmissionEvent {
            destination_id: DESTINATION.to_string(),
            answers,
        }
    }

    #[rocket::async_test]
    async fn valid_vote_is_recorded_without_token() {
        let (memory, handler) = handler(VotingConfig::default());
        memory.add_token("abc123", "voter@example.com", DESTINATION);

        let receipt = handler.on_ballot_submission(event("abc123", "yes")).await.unwrap();

        assert!(receipt.accepted);
        assert_eq!(receipt.verdict, Verdict::Valid);
        let rows = memory.rows(DESTINATION, "Validated Results").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].contains("TOKEN"));
        assert_eq!(rows[0].text("VOTER EMAIL"), Some("voter@example.com"));
        assert_eq!(rows[0].get("Answer1"), Some(&Answer::Text("yes".to_string())));
        assert_eq!(memory.rows(DESTINATION, "Invalid Results"), None);
        assert!(!memory.needs_attention(DESTINATION));

        let sent = memory.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["voter@example.com"]);
        assert_eq!(sent[0].subject, "Your vote in 'Board Vote (Responses)' was recorded");
        assert!(sent[0].body.contains("Answer1: yes"));
    }

    #[rocket::async_test]
    async fn second_vote_from_same_voter_is_quarantined() {
        let (memory, handler) = handler(VotingConfig::default());
        memory.add_token("first", "voter@example.com", DESTINATION);
        memory.add_token("second", "voter@example.com", DESTINATION);

        handler.on_ballot_submission(event("first", "yes")).await.unwrap();
        let receipt = handler.on_ballot_submission(event("second", "no")).await.unwrap();

        assert!(!receipt.accepted);
        assert_eq!(receipt.verdict, Verdict::DuplicateVoter);
        assert_eq!(memory.rows(DESTINATION, "Validated Results").unwrap().len(), 1);
        let quarantined = memory.rows(DESTINATION, "Invalid Results").unwrap();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].text("TOKEN"), Some("second"));
        assert_eq!(quarantined[0].text("VOTER EMAIL"), Some("voter@example.com"));
        assert!(memory.needs_attention(DESTINATION));
        assert!(!memory.has_token("second"));

        let sent = memory.sent();
        // Confirmation of the first vote, the alert, and the rejection notice.
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent[1].to,
            vec!["secretary@example.com", "observer@example.com"]
        );
        assert!(sent[1].subject.contains("Manual count needed"));
        assert!(sent[1].body.contains("TOKEN: second"));
        assert_eq!(sent[2].to, vec!["voter@example.com"]);
        assert!(sent[2].subject.contains("was not counted"));
    }

    #[rocket::async_test]
    async fn unknown_token_is_quarantined_without_voter_notice() {
        let (memory, handler) = handler(VotingConfig::default());

        let receipt = handler.on_ballot_submission(event("forged", "yes")).await.unwrap();

        assert_eq!(receipt.verdict, Verdict::InvalidToken);
        assert_eq!(
            memory.rows(DESTINATION, "Validated Results"),
            Some(Vec::new())
        );
        let quarantined = memory.rows(DESTINATION, "Invalid Results").unwrap();
        assert_eq!(quarantined[0].text("VOTER EMAIL"), Some(""));
        let sent = memory.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("Manual count needed"));
    }

    #[rocket::async_test]
    async fn quarantine_can_drop_token() {
        let (memory, handler) = handler(VotingConfig {
            quarantine_keeps_token: false,
            ..VotingConfig::default()
        });

        handler.on_ballot_submission(event("forged", "yes")).await.unwrap();

        let quarantined = memory.rows(DESTINATION, "Invalid Results").unwrap();
        assert!(!quarantined[0].contains("TOKEN"));
        assert_eq!(quarantined[0].text("Answer1"), Some("yes"));
    }

    #[rocket::async_test]
    async fn notification_failure_keeps_recorded_vote() {
        let (memory, handler) = handler(VotingConfig::default());
        memory.add_token("abc123", "voter@example.com", DESTINATION);
        memory.fail_notifications(true);

        let receipt = handler.on_ballot_submission(event("abc123", "yes")).await.unwrap();

        assert!(receipt.accepted);
        assert_eq!(memory.rows(DESTINATION, "Validated Results").unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn failed_append_is_reported() {
        let (memory, handler) = handler(VotingConfig::default());
        memory.add_token("abc123", "voter@example.com", DESTINATION);
        memory.fail_appends(true);

        assert!(handler.on_ballot_submission(event("abc123", "yes")).await.is_err());
        assert!(memory.sent().is_empty());
    }
}
