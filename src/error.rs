use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::Status(Status::NotFound, format!("{} not found", what.as_ref()))
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        warn!("{self}");
        Err(match self {
            Self::Db(_) | Self::Trigger(_) | Self::Config(_) => Status::InternalServerError,
            Self::Resolution(ResolutionError::Db(_)) => Status::InternalServerError,
            Self::Resolution(_) => Status::NotFound,
            Self::Status(status, _) => status,
        })
    }
}

/// Failure to turn a ballot reference into a live ballot.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Ballot '{0}' no longer exists")]
    NotFound(String),
    #[error("Ballot reference '{0}' is malformed")]
    Malformed(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Failure to attach or detach a submission trigger.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Ballot '{0}' has no results destination to bind a trigger to")]
    MissingDestination(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Failure to hand a notification to the delivery service.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification '{0}' has no recipients")]
    NoRecipients(String),
    #[error("Failed to build notification: {0}")]
    Build(String),
    #[error("Failed to send notification: {0}")]
    Send(String),
}
