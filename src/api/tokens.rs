use rocket::{http::Status, serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::platform::Platform,
};

use super::PlatformKey;

pub fn routes() -> Vec<Route> {
    routes![issue_token]
}

/// A voter to mint a one-time token for.
#[derive(Debug, Deserialize)]
struct TokenRequest {
    email: String,
    destination_id: String,
}

#[derive(Debug, Serialize)]
struct IssuedToken {
    token: String,
}

/// Mint a one-time vote token, for the registration flow to hand to a voter.
#[post("/tokens", data = "<request>", format = "json")]
async fn issue_token(
    _key: PlatformKey,
    request: Json<TokenRequest>,
    platform: &State<Platform>,
) -> Result<Json<IssuedToken>> {
    let email = request.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::Status(
            Status::BadRequest,
            format!("Not an email address: '{email}'"),
        ));
    }
    if request.destination_id.trim().is_empty() {
        return Err(Error::Status(
            Status::BadRequest,
            "A results destination is required".to_string(),
        ));
    }
    let token = platform
        .tokens
        .issue_one_time_token(email, &request.destination_id)
        .await?;
    debug!("Issued a vote token for {}", request.destination_id);
    Ok(Json(IssuedToken { token }))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{json, serde_json, Value},
    };

    use crate::{api::test_helpers::platform_key, model::memory::MemoryPlatform};

    use super::*;

    #[backend_test]
    async fn issued_token_can_vote_once(client: Client, platform: MemoryPlatform) {
        let response = client
            .post(uri!(issue_token))
            .header(ContentType::JSON)
            .header(platform_key())
            .body(
                json!({ "email": "Voter@Example.com", "destination_id": "results-ballot-A" })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let issued: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let token = issued["token"].as_str().unwrap();

        assert!(platform.has_token(token));
        let tokens = platform.platform().tokens;
        assert_eq!(
            tokens
                .consume_one_time_token(token, "results-ballot-B")
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            tokens
                .consume_one_time_token(token, "results-ballot-A")
                .await
                .unwrap()
                .as_deref(),
            Some("voter@example.com")
        );
        assert_eq!(
            tokens
                .consume_one_time_token(token, "results-ballot-A")
                .await
                .unwrap(),
            None
        );
    }

    #[backend_test]
    async fn bad_requests_are_refused(client: Client, platform: MemoryPlatform) {
        for body in [
            json!({ "email": "not-an-email", "destination_id": "results-ballot-A" }),
            json!({ "email": "voter@example.com", "destination_id": " " }),
        ] {
            let response = client
                .post(uri!(issue_token))
                .header(ContentType::JSON)
                .header(platform_key())
                .body(body.to_string())
                .dispatch()
                .await;
            assert_eq!(Status::BadRequest, response.status());
        }
        assert_eq!(platform.token_count(), 0);
    }
}
