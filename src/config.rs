use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sns::{
    config::{Credentials, Region},
    Client as SnsClient,
};
use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::mongodb::ensure_indexes_exist;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_scan_interval")]
    scan_interval: u32,
    notification_topic_arn: String,
    #[serde(default)]
    voting: VotingConfig,
    // secrets
    platform_key: String,
    token_secret: String,
}

fn default_scan_interval() -> u32 {
    300
}

impl Config {
    /// Time between scheduled lifecycle scans, or `None` if the recurring
    /// scan is disabled.
    pub fn scan_interval(&self) -> Option<Duration> {
        (self.scan_interval > 0).then(|| Duration::seconds(self.scan_interval.into()))
    }

    /// SNS topic that election notifications are published to.
    pub fn notification_topic_arn(&self) -> &str {
        &self.notification_topic_arn
    }

    /// Field names and store names used by the voting workflow.
    pub fn voting(&self) -> &VotingConfig {
        &self.voting
    }

    /// Shared key the platform presents on every callback.
    pub fn platform_key(&self) -> &str {
        &self.platform_key
    }

    /// Secret key used to digest vote tokens before storage.
    pub fn token_secret(&self) -> &[u8] {
        self.token_secret.as_bytes()
    }
}

/// Names shared between the ballot forms, the results documents and the
/// voting workflow. Every field has a default, so the whole `[voting]` table
/// may be omitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Ballot question carrying the voter's one-time token.
    pub token_field: String,
    /// Column that receives the voter email resolved from the token.
    pub voter_email_field: String,
    /// Store that accepted votes are appended to.
    pub results_store: String,
    /// Store that rejected votes are appended to. Its existence means a
    /// manual count is required.
    pub quarantine_store: String,
    /// Handler name every submission trigger is registered under.
    pub submission_handler: String,
    /// Whether quarantined votes keep the raw token for auditing.
    pub quarantine_keeps_token: bool,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            token_field: "TOKEN".to_string(),
            voter_email_field: "VOTER EMAIL".to_string(),
            results_store: "Validated Results".to_string(),
            quarantine_store: "Invalid Results".to_string(),
            submission_handler: "on_ballot_submission".to_string(),
            quarantine_keeps_token: true,
        }
    }
}

impl VotingConfig {
    /// Reject configurations that would make votes ambiguous.
    pub fn validate(&self) -> Result<(), String> {
        let names = [
            ("token_field", &self.token_field),
            ("voter_email_field", &self.voter_email_field),
            ("results_store", &self.results_store),
            ("quarantine_store", &self.quarantine_store),
            ("submission_handler", &self.submission_handler),
        ];
        if let Some((key, _)) = names.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(format!("`voting.{key}` must not be empty"));
        }
        if self.token_field == self.voter_email_field {
            return Err("`voting.token_field` and `voting.voter_email_field` must differ".into());
        }
        if self.results_store == self.quarantine_store {
            return Err("`voting.results_store` and `voting.quarantine_store` must differ".into());
        }
        Ok(())
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// Refuses to ignite if the voting configuration is inconsistent.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if let Err(e) = config.voting().validate() {
            error!("Invalid voting config: {e}");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "club_elections".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// ensures the indexes exist, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Configuration for the AWS connection.
#[derive(Deserialize)]
struct AwsConfig {
    // non-secrets
    aws_region: String,
    aws_access_key_id: String,
    // secrets
    aws_secret_access_key: String,
}

/// A fairing that loads the AWS config and places an SNS `Client` into
/// managed state.
pub struct AwsFairing;

#[rocket::async_trait]
impl Fairing for AwsFairing {
    fn info(&self) -> Info {
        Info {
            name: "AWS SNS",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<AwsConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load AWS config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        // Construct the connection.
        let aws_config = SdkConfig::builder()
            .region(Region::new(config.aws_region))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                config.aws_access_key_id,
                config.aws_secret_access_key,
                None,
                None,
                "rocket config",
            )))
            .behavior_version(BehaviorVersion::latest())
            .build();
        let client = SnsClient::new(&aws_config);
        info!("Loaded Amazon SNS config");

        // Manage the state.
        rocket = rocket.manage(client);
        Ok(rocket)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_voting_config_is_valid() {
        assert_eq!(VotingConfig::default().validate(), Ok(()));
    }

    #[test]
    fn empty_names_are_rejected() {
        let config = VotingConfig {
            quarantine_store: "  ".to_string(),
            ..VotingConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("quarantine_store"), "{err}");
    }

    #[test]
    fn colliding_names_are_rejected() {
        let config = VotingConfig {
            voter_email_field: "TOKEN".to_string(),
            ..VotingConfig::default()
        };
        assert!(config.validate().is_err());

        let config = VotingConfig {
            quarantine_store: "Validated Results".to_string(),
            ..VotingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_disables_scans() {
        let mut config = Config::example();
        assert_eq!(config.scan_interval(), None);
        config.scan_interval = 60;
        assert_eq!(config.scan_interval(), Some(Duration::seconds(60)));
    }
}
