#[macro_use]
extern crate rocket;
#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod scheduled_task;
pub mod voting;

pub use config::Config;

use config::{AwsFairing, ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;
use model::platform::{Platform, PlatformFairing};
use voting::LifecycleFairing;

/// The production rocket: collaborators backed by MongoDB and SNS, with
/// lifecycle scans scheduled from liftoff.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(AwsFairing)
        .attach(PlatformFairing)
        .attach(LifecycleFairing::default())
        .attach(LoggerFairing)
}

/// A rocket on the given collaborators and config, with no database or AWS
/// connection of its own.
pub fn rocket_for_platform(platform: Platform, config: Config) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .manage(platform)
        .manage(config)
        .attach(LifecycleFairing::default())
        .attach(LoggerFairing)
}

/// A fresh, uniquely named database for one test, or `None` when no
/// `db_uri` is configured (for example through `ROCKET_DB_URI`).
#[cfg(test)]
pub(crate) async fn test_database() -> Option<mongodb::Database> {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .ok()?;
    let client = mongodb::Client::with_uri_str(db_uri).await.unwrap();
    let db = client.database(&format!(
        "club_elections_test_{}",
        model::token::random_hex(6)
    ));
    model::mongodb::ensure_indexes_exist(&db).await.unwrap();
    Some(db)
}
