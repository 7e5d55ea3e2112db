use rocket::{serde::json::Json, Route, State};

use crate::{
    config::Config,
    error::Result,
    model::platform::Platform,
    voting::{SubmissionEvent, SubmissionHandler, SubmissionReceipt},
};

use super::PlatformKey;

pub fn routes() -> Vec<Route> {
    routes![submit]
}

/// Dispatch target for ballot submissions. A rejected vote is still a
/// successful request; the receipt says why it was not counted.
#[post("/submissions", data = "<event>", format = "json")]
async fn submit(
    _key: PlatformKey,
    event: Json<SubmissionEvent>,
    platform: &State<Platform>,
    config: &State<Config>,
) -> Result<Json<SubmissionReceipt>> {
    let handler = SubmissionHandler::new(platform.inner().clone(), config.voting().clone());
    let receipt = handler.on_ballot_submission(event.into_inner()).await?;
    Ok(Json(receipt))
}
