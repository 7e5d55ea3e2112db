use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    options::{FindOptions, UpdateOptions},
    Database,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::{mongodb::Coll, submission::Submission},
};

/// A results document: the destination a ballot writes into. It holds one
/// or more named stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub editors: Vec<String>,
    #[serde(default)]
    pub viewers: Vec<String>,
    /// Set when any store in the document needs a human to look at it.
    #[serde(default)]
    pub needs_attention: bool,
}

/// A named store within a destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub destination_id: String,
    pub name: String,
}

/// One appended row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub destination_id: String,
    pub store: String,
    pub row: Submission,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub recorded_at: DateTime<Utc>,
}

/// An opened store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHandle {
    pub destination_id: String,
    pub name: String,
    /// Title of the containing results document.
    pub title: String,
}

/// Access to results documents and their stores. Rows are append-only.
#[rocket::async_trait]
pub trait ResultsStore: Send + Sync {
    /// Open a store, creating it first if asked to. Returns `None` if the
    /// store does not exist and was not created.
    async fn open(
        &self,
        destination_id: &str,
        name: &str,
        create_if_missing: bool,
    ) -> Result<Option<StoreHandle>>;

    /// Every row in the store, oldest first.
    async fn read(&self, store: &StoreHandle) -> Result<Vec<Submission>>;

    /// Append a row.
    async fn append(&self, store: &StoreHandle, row: &Submission) -> Result<()>;

    /// Mark every store in the destination as needing attention.
    async fn flag_needs_attention(&self, destination_id: &str) -> Result<()>;

    /// Editors and viewers of the results document.
    async fn collaborators(&self, destination_id: &str) -> Result<Vec<String>>;
}

/// Results documents stored in MongoDB.
pub struct MongoResults {
    destinations: Coll<Destination>,
    stores: Coll<StoreRecord>,
    rows: Coll<ResultRow>,
}

impl MongoResults {
    pub fn new(db: &Database) -> Self {
        Self {
            destinations: Coll::from_db(db),
            stores: Coll::from_db(db),
            rows: Coll::from_db(db),
        }
    }

    async fn destination(&self, destination_id: &str) -> Result<Option<Destination>> {
        Ok(self
            .destinations
            .find_one(doc! { "_id": destination_id }, None)
            .await?)
    }
}

#[rocket::async_trait]
impl ResultsStore for MongoResults {
    async fn open(
        &self,
        destination_id: &str,
        name: &str,
        create_if_missing: bool,
    ) -> Result<Option<StoreHandle>> {
        let filter = doc! {
            "destination_id": destination_id,
            "name": name,
        };
        if create_if_missing {
            let insert = doc! { "$setOnInsert": filter.clone() };
            let upsert = UpdateOptions::builder().upsert(true).build();
            let result = self.stores.update_one(filter, insert, upsert).await?;
            if result.upserted_id.is_some() {
                info!("Created store '{name}' in {destination_id}");
            }
        } else if self.stores.find_one(filter, None).await?.is_none() {
            return Ok(None);
        }

        let title = self
            .destination(destination_id)
            .await?
            .map(|destination| destination.title)
            .unwrap_or_else(|| destination_id.to_string());
        Ok(Some(StoreHandle {
            destination_id: destination_id.to_string(),
            name: name.to_string(),
            title,
        }))
    }

    async fn read(&self, store: &StoreHandle) -> Result<Vec<Submission>> {
        let filter = doc! {
            "destination_id": &store.destination_id,
            "store": &store.name,
        };
        let oldest_first = FindOptions::builder().sort(doc! { "recorded_at": 1 }).build();
        let rows: Vec<ResultRow> = self
            .rows
            .find(filter, oldest_first)
            .await?
            .try_collect()
            .await?;
        Ok(rows.into_iter().map(|row| row.row).collect())
    }

    async fn append(&self, store: &StoreHandle, row: &Submission) -> Result<()> {
        let row = ResultRow {
            destination_id: store.destination_id.clone(),
            store: store.name.clone(),
            row: row.clone(),
            recorded_at: Utc::now(),
        };
        self.rows.insert_one(row, None).await?;
        Ok(())
    }

    async fn flag_needs_attention(&self, destination_id: &str) -> Result<()> {
        let update = doc! { "$set": { "needs_attention": true } };
        self.destinations
            .update_one(doc! { "_id": destination_id }, update, None)
            .await?;
        Ok(())
    }

    async fn collaborators(&self, destination_id: &str) -> Result<Vec<String>> {
        let mut collaborators = Vec::new();
        if let Some(destination) = self.destination(destination_id).await? {
            for email in destination.editors.into_iter().chain(destination.viewers) {
                if !collaborators.contains(&email) {
                    collaborators.push(email);
                }
            }
        }
        Ok(collaborators)
    }
}
