use mongodb::{bson::doc, Database};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TriggerError},
    model::{mongodb::Coll, token::random_hex},
};

/// A registered submission-event handler bound to one results destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "_id")]
    pub id: String,
    /// Name of the function the platform dispatches to.
    pub handler: String,
    /// The destination whose submissions fire this trigger.
    pub source_id: String,
}

/// The platform's live list of event triggers.
#[rocket::async_trait]
pub trait TriggerRegistry: Send + Sync {
    /// Every trigger registered under the submission handler.
    async fn list_triggers(&self) -> Result<Vec<Trigger>>;

    /// Register the submission handler against a destination, returning the
    /// new trigger's id.
    async fn create_submission_trigger(&self, destination_id: &str) -> Result<String>;

    /// Remove a trigger. Returns false if no such trigger existed.
    async fn delete_trigger(&self, trigger_id: &str) -> Result<bool>;
}

/// Triggers stored in MongoDB for the platform's dispatcher to read.
pub struct MongoTriggers {
    triggers: Coll<Trigger>,
    handler: String,
}

impl MongoTriggers {
    pub fn new(db: &Database, handler: impl Into<String>) -> Self {
        Self {
            triggers: Coll::from_db(db),
            handler: handler.into(),
        }
    }
}

#[rocket::async_trait]
impl TriggerRegistry for MongoTriggers {
    async fn list_triggers(&self) -> Result<Vec<Trigger>> {
        let triggers = self
            .triggers
            .find(doc! { "handler": &self.handler }, None)
            .await?
            .try_collect()
            .await?;
        Ok(triggers)
    }

    async fn create_submission_trigger(&self, destination_id: &str) -> Result<String> {
        if destination_id.trim().is_empty() {
            return Err(TriggerError::MissingDestination(destination_id.to_string()).into());
        }
        let trigger = Trigger {
            id: random_hex(8),
            handler: self.handler.clone(),
            source_id: destination_id.to_string(),
        };
        self.triggers
            .insert_one(&trigger, None)
            .await
            .map_err(TriggerError::Db)?;
        Ok(trigger.id)
    }

    async fn delete_trigger(&self, trigger_id: &str) -> Result<bool> {
        let result = self
            .triggers
            .delete_one(doc! { "_id": trigger_id }, None)
            .await
            .map_err(TriggerError::Db)?;
        Ok(result.deleted_count > 0)
    }
}
