use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};

use crate::{config::Config, error::Error};

/// Header the platform presents its shared key in.
pub const PLATFORM_KEY_HEADER: &str = "X-Platform-Key";

/// Proof that a request came from the platform: it carried the configured
/// platform key.
#[derive(Debug)]
pub struct PlatformKey;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PlatformKey {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => {
                let e = Error::Config("application config is not managed".to_string());
                return Outcome::Error((Status::InternalServerError, e));
            }
        };

        match req.headers().get_one(PLATFORM_KEY_HEADER) {
            Some(key) if key == config.platform_key() => Outcome::Success(PlatformKey),
            Some(_) => {
                warn!("Rejected request with a bad platform key");
                let e = Error::Status(Status::Unauthorized, "Bad platform key".to_string());
                Outcome::Error((Status::Unauthorized, e))
            }
            None => {
                let e = Error::Status(Status::Unauthorized, "Missing platform key".to_string());
                Outcome::Error((Status::Unauthorized, e))
            }
        }
    }
}
