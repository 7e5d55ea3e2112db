use mongodb::{options::ReplaceOptions, Database};
use rocket::futures::TryStreamExt;

use crate::{error::Result, model::mongodb::Coll};

use super::Election;

/// Durable table of election records, read and written as a batch.
#[rocket::async_trait]
pub trait ElectionRegistry: Send + Sync {
    /// Every election record.
    async fn read_all(&self) -> Result<Vec<Election>>;

    /// Overwrite the stored records with the given ones. Records not in
    /// `elections` are left alone.
    async fn write_all(&self, elections: &[Election]) -> Result<()>;
}

/// The registry as a MongoDB collection.
///
/// Writes are not serialised against concurrent scans: the last writer wins,
/// which is safe because every scan recomputes the same target state.
pub struct MongoRegistry {
    elections: Coll<Election>,
}

impl MongoRegistry {
    pub fn new(db: &Database) -> Self {
        Self {
            elections: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl ElectionRegistry for MongoRegistry {
    async fn read_all(&self) -> Result<Vec<Election>> {
        let elections = self.elections.find(None, None).await?.try_collect().await?;
        Ok(elections)
    }

    async fn write_all(&self, elections: &[Election]) -> Result<()> {
        // Bulk writes aren't in the 2.x driver, so replace records one by one.
        let upsert = ReplaceOptions::builder().upsert(true).build();
        for election in elections {
            self.elections
                .replace_one(election.id.as_doc(), election, upsert.clone())
                .await?;
        }
        debug!("Wrote {} election records", elections.len());
        Ok(())
    }
}
