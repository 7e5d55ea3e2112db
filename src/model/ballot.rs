use mongodb::{bson::doc, Database};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ResolutionError, Result},
    model::mongodb::{Coll, Id},
};

/// The fillable form backing one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Stable identifier.
    #[serde(rename = "_id")]
    pub id: Id,
    pub title: String,
    /// The reference elections use to find this ballot.
    pub edit_url: String,
    pub published: bool,
    pub accepting_responses: bool,
    /// The results document submissions are written into.
    #[serde(default)]
    pub destination_id: Option<String>,
    #[serde(default)]
    pub editors: Vec<String>,
}

impl Ballot {
    /// A ballot is live once it is both published and taking responses.
    pub fn is_live(&self) -> bool {
        self.published && self.accepting_responses
    }
}

/// Access to ballot forms. The lifecycle manager is the only component that
/// changes a ballot's publish state.
#[rocket::async_trait]
pub trait BallotAccessor: Send + Sync {
    /// Find the ballot behind a reference.
    async fn resolve(&self, reference: &str) -> std::result::Result<Ballot, ResolutionError>;

    /// Publish or unpublish the ballot. Accepting responses follows the
    /// published flag.
    async fn set_published(&self, ballot: &mut Ballot, published: bool) -> Result<()>;
}

/// Ballots stored in MongoDB, resolved by edit reference.
pub struct MongoBallots {
    ballots: Coll<Ballot>,
}

impl MongoBallots {
    pub fn new(db: &Database) -> Self {
        Self {
            ballots: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl BallotAccessor for MongoBallots {
    async fn resolve(&self, reference: &str) -> std::result::Result<Ballot, ResolutionError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ResolutionError::Malformed(reference.to_string()));
        }
        self.ballots
            .find_one(doc! { "edit_url": reference }, None)
            .await?
            .ok_or_else(|| ResolutionError::NotFound(reference.to_string()))
    }

    async fn set_published(&self, ballot: &mut Ballot, published: bool) -> Result<()> {
        let update = doc! {
            "$set": {
                "published": published,
                "accepting_responses": published,
            }
        };
        let result = self
            .ballots
            .update_one(ballot.id.as_doc(), update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(ResolutionError::NotFound(ballot.edit_url.clone()).into());
        }
        ballot.published = published;
        ballot.accepting_responses = published;
        Ok(())
    }
}

/// Example data for tests.
#[cfg(test)]
pub(crate) mod examples {
    use super::*;

    impl Ballot {
        /// An unpublished ballot writing into `results-<reference>`.
        pub fn example(reference: &str) -> Self {
            Self {
                id: Id::new(),
                title: format!("Ballot {reference}"),
                edit_url: reference.to_string(),
                published: false,
                accepting_responses: false,
                destination_id: Some(format!("results-{reference}")),
                editors: vec!["secretary@example.com".to_string()],
            }
        }
    }
}
