use serde::Serialize;

use crate::{
    config::VotingConfig,
    error::Result,
    model::{
        submission::{Answer, Submission},
        token::TokenStore,
    },
};

/// The outcome of validating one submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Valid,
    /// The token was missing, unknown or already used.
    InvalidToken,
    /// The token was good but its voter has already voted.
    DuplicateVoter,
}

impl Verdict {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// Human-readable reason, for notifications and receipts.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Valid => "the vote was recorded",
            Self::InvalidToken => "the voting token was missing, unknown or already used",
            Self::DuplicateVoter => "a vote has already been recorded for this voter",
        }
    }
}

/// Canonical form of an email address for comparisons.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Decide whether a submission may be counted.
///
/// The submission is modified in place: its token field is removed whatever
/// the outcome, and its voter-email field is set to the email the token
/// resolved to (or left empty). The token is consumed *before* the duplicate
/// check, so a voter who has already voted loses the token they resubmit.
///
/// Only tokens issued for `destination_id` are redeemed; a token minted for
/// another ballot is refused without being spent.
///
/// `existing` is a snapshot of the results store. Two submissions validated
/// against the same snapshot can both pass; callers that need stronger
/// guarantees must serialise access to the store.
pub async fn validate(
    submission: &mut Submission,
    existing: &[Submission],
    destination_id: &str,
    config: &VotingConfig,
    tokens: &dyn TokenStore,
) -> Result<Verdict> {
    submission.insert(config.voter_email_field.as_str(), "");

    let token = submission.remove(&config.token_field);
    let token = token
        .as_ref()
        .and_then(Answer::as_text)
        .map(str::trim)
        .filter(|token| !token.is_empty());
    let email = match token {
        Some(token) => {
            tokens
                .consume_one_time_token(token, destination_id)
                .await?
        }
        None => None,
    };
    let email = match email.filter(|email| !email.trim().is_empty()) {
        Some(email) => email,
        None => {
            debug!("Rejecting submission with missing or spent token");
            return Ok(Verdict::InvalidToken);
        }
    };

    let voter = normalize_email(&email);
    submission.insert(config.voter_email_field.as_str(), email);

    let already_voted = existing.iter().any(|vote| {
        vote.text(&config.voter_email_field)
            .map_or(false, |recorded| normalize_email(recorded) == voter)
    });
    if already_voted {
        debug!("Rejecting duplicate vote from {voter}");
        return Ok(Verdict::DuplicateVoter);
    }

    Ok(Verdict::Valid)
}
