use chrono::{DateTime, Utc};
use rocket::{serde::json::Json, Route, State};
use serde::Serialize;

use crate::{
    config::Config,
    error::Result,
    model::{election::Election, platform::Platform},
    voting::{ElectionState, LifecycleManager, ScanReport},
};

use super::PlatformKey;

pub fn routes() -> Vec<Route> {
    routes![list_elections, scan]
}

/// An election record as seen at the time of the request.
#[derive(Debug, Serialize)]
struct ElectionSummary {
    title: String,
    state: ElectionState,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    ballot: String,
    trigger_attached: bool,
    election_officers: Vec<String>,
}

impl ElectionSummary {
    fn at(election: Election, now: DateTime<Utc>) -> Self {
        Self {
            state: election.state_at(now),
            trigger_attached: election.trigger_id.is_some(),
            title: election.title,
            start: election.start,
            end: election.end,
            ballot: election.form_edit_url,
            election_officers: election.election_officers,
        }
    }
}

#[get("/elections")]
async fn list_elections(
    _key: PlatformKey,
    platform: &State<Platform>,
) -> Result<Json<Vec<ElectionSummary>>> {
    let now = Utc::now();
    let elections = platform.registry.read_all().await?;
    let summaries = elections
        .into_iter()
        .map(|election| ElectionSummary::at(election, now))
        .collect();
    Ok(Json(summaries))
}

#[post("/lifecycle/scan")]
async fn scan(
    _key: PlatformKey,
    platform: &State<Platform>,
    config: &State<Config>,
) -> Result<Json<ScanReport>> {
    let manager = LifecycleManager::new(platform.inner().clone(), config.voting().clone());
    let report = manager.manage_election_lifecycles().await?;
    info!(
        "On-demand scan{}: {} opened, {} closed, {} failed",
        report.scan,
        report.opened.len(),
        report.closed.len(),
        report.failures.len()
    );
    Ok(Json(report))
}
