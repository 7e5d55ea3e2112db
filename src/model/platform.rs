use std::sync::Arc;

use aws_sdk_sns::Client as SnsClient;
use mongodb::Database;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};

use crate::{
    model::{
        ballot::{BallotAccessor, MongoBallots},
        election::{ElectionRegistry, MongoRegistry},
        notify::{Notifier, SnsNotifier},
        results::{MongoResults, ResultsStore},
        token::{MongoTokens, TokenDigester, TokenStore},
        trigger::{MongoTriggers, TriggerRegistry},
    },
    Config,
};

/// Handles on every external collaborator the voting workflow talks to.
#[derive(Clone)]
pub struct Platform {
    pub registry: Arc<dyn ElectionRegistry>,
    pub ballots: Arc<dyn BallotAccessor>,
    pub triggers: Arc<dyn TriggerRegistry>,
    pub tokens: Arc<dyn TokenStore>,
    pub results: Arc<dyn ResultsStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl Platform {
    /// The production platform: MongoDB storage and SNS delivery.
    pub fn mongo(db: &Database, sns: SnsClient, config: &Config) -> Self {
        Self {
            registry: Arc::new(MongoRegistry::new(db)),
            ballots: Arc::new(MongoBallots::new(db)),
            triggers: Arc::new(MongoTriggers::new(
                db,
                config.voting().submission_handler.clone(),
            )),
            tokens: Arc::new(MongoTokens::new(
                db,
                TokenDigester::new(config.token_secret()),
            )),
            results: Arc::new(MongoResults::new(db)),
            notifier: Arc::new(SnsNotifier::new(sns, config.notification_topic_arn())),
        }
    }
}

/// A fairing that assembles the `Platform` from the database, SNS client and
/// config already in managed state, and manages it in turn.
/// Must be attached after the fairings responsible for those.
pub struct PlatformFairing;

#[rocket::async_trait]
impl Fairing for PlatformFairing {
    fn info(&self) -> Info {
        Info {
            name: "Platform",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let platform = match (
            rocket.state::<Database>(),
            rocket.state::<SnsClient>(),
            rocket.state::<Config>(),
        ) {
            (Some(db), Some(sns), Some(config)) => Platform::mongo(db, sns.clone(), config),
            _ => {
                error!("Database, SNS client and config must be managed before the platform");
                return Err(rocket);
            }
        };
        info!("Platform collaborators ready");
        Ok(rocket.manage(platform))
    }
}
