use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, to_bson, Bson},
    Database,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::mongodb::{is_duplicate_key_error, Coll},
};

mod code;

pub use code::{random_hex, random_token, TokenDigester};

/// How many times issuance retries after a digest collision.
const ISSUE_ATTEMPTS: usize = 3;

/// Session-level tokens may be presented many times; vote tokens only once.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    OneTime,
    MultiUse,
}

impl From<TokenKind> for Bson {
    fn from(kind: TokenKind) -> Self {
        to_bson(&kind).expect("Serialisation is infallible")
    }
}

/// A stored token: the digest of the credential and the email it is bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_hmac: String,
    pub email: String,
    /// The results destination of the election this token votes in.
    pub destination_id: String,
    pub kind: TokenKind,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub issued_at: DateTime<Utc>,
}

/// Credentials binding a voter's email to a ballot.
#[rocket::async_trait]
pub trait TokenStore: Send + Sync {
    /// Redeem a one-time token issued for `destination_id`, returning the
    /// email it was bound to. The token is invalidated by the same operation.
    /// Unknown, already used and multi-use tokens return `None`, as do tokens
    /// issued for another destination, which are left in place.
    async fn consume_one_time_token(
        &self,
        token: &str,
        destination_id: &str,
    ) -> Result<Option<String>>;

    /// Revoke every token scoped to a destination. Returns how many went.
    async fn delete_all_tokens_for_destination(&self, destination_id: &str) -> Result<u64>;

    /// Mint a one-time token for a voter, returning the raw token.
    async fn issue_one_time_token(&self, email: &str, destination_id: &str) -> Result<String>;
}

/// Tokens stored in MongoDB as keyed digests.
pub struct MongoTokens {
    tokens: Coll<TokenRecord>,
    digester: TokenDigester,
}

impl MongoTokens {
    pub fn new(db: &Database, digester: TokenDigester) -> Self {
        Self {
            tokens: Coll::from_db(db),
            digester,
        }
    }
}

#[rocket::async_trait]
impl TokenStore for MongoTokens {
    async fn consume_one_time_token(
        &self,
        token: &str,
        destination_id: &str,
    ) -> Result<Option<String>> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        // Find-and-delete is atomic, so two racing submissions cannot both
        // redeem the same token.
        let filter = doc! {
            "token_hmac": self.digester.digest(token),
            "destination_id": destination_id,
            "kind": TokenKind::OneTime,
        };
        let record = self.tokens.find_one_and_delete(filter, None).await?;
        Ok(record.map(|record| record.email))
    }

    async fn delete_all_tokens_for_destination(&self, destination_id: &str) -> Result<u64> {
        let result = self
            .tokens
            .delete_many(doc! { "destination_id": destination_id }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn issue_one_time_token(&self, email: &str, destination_id: &str) -> Result<String> {
        let mut attempt = 1;
        loop {
            let token = random_token();
            let record = TokenRecord {
                token_hmac: self.digester.digest(&token),
                email: email.trim().to_lowercase(),
                destination_id: destination_id.to_string(),
                kind: TokenKind::OneTime,
                issued_at: Utc::now(),
            };
            match self.tokens.insert_one(&record, None).await {
                Ok(_) => return Ok(token),
                Err(e) if is_duplicate_key_error(&e) && attempt < ISSUE_ATTEMPTS => {
                    warn!("Token digest collision, retrying issuance");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
