use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::{
    ballot::Ballot,
    election::Election,
    results::{Destination, ResultRow, StoreRecord},
    token::TokenRecord,
    trigger::Trigger,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

impl MongoCollection for Ballot {
    const NAME: &'static str = "ballots";
}

impl MongoCollection for Trigger {
    const NAME: &'static str = "triggers";
}

impl MongoCollection for TokenRecord {
    const NAME: &'static str = "tokens";
}

impl MongoCollection for Destination {
    const NAME: &'static str = "destinations";
}

impl MongoCollection for StoreRecord {
    const NAME: &'static str = "result_stores";
}

impl MongoCollection for ResultRow {
    const NAME: &'static str = "result_rows";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Ballots are resolved by their edit reference.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"edit_url": 1})
        .options(unique.clone())
        .build();
    Coll::<Ballot>::from_db(db)
        .create_index(ballot_index, None)
        .await?;

    // Token digests must be unique for consumption to be unambiguous.
    let token_index = IndexModel::builder()
        .keys(doc! {"token_hmac": 1})
        .options(unique.clone())
        .build();
    Coll::<TokenRecord>::from_db(db)
        .create_index(token_index, None)
        .await?;

    // One store of each name per destination.
    let store_index = IndexModel::builder()
        .keys(doc! {"destination_id": 1, "name": 1})
        .options(unique)
        .build();
    Coll::<StoreRecord>::from_db(db)
        .create_index(store_index, None)
        .await?;

    // Rows are always read per store, in insertion order.
    let row_index = IndexModel::builder()
        .keys(doc! {"destination_id": 1, "store": 1, "recorded_at": 1})
        .build();
    Coll::<ResultRow>::from_db(db)
        .create_index(row_index, None)
        .await?;

    Ok(())
}
