//! Crate-wide error hierarchy (spec §7: Transport / Protocol / Authorization /
//! NotFound / Precondition / Resource / Shutdown).

use rocket::http::Status;
use thiserror::Error;

/// A deliberate, non-restartable exit code in the 101-109 range (spec §6).
pub const SHUTDOWN_EXIT_BASE: i32 = 101;

#[derive(Debug, Error)]
pub enum CitadelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("resource exhausted: {0}")]
    Resource(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CitadelError {
    /// Render as a Citadel line-protocol status line: "<code> <text>".
    pub fn status_line(&self) -> String {
        match self {
            CitadelError::Transport(m) => format!("400 {m}"),
            CitadelError::Protocol(m) => format!("502 {m}"),
            CitadelError::Authorization(m) => format!("540 {m}"),
            CitadelError::NotFound(m) => format!("500 {m}"),
            CitadelError::Precondition(m) => format!("571 {m}"),
            CitadelError::Resource(m) => format!("420 {m}"),
            CitadelError::Sqlite(e) => format!("420 database error: {e}"),
            CitadelError::Io(e) => format!("400 i/o error: {e}"),
        }
    }

    pub fn http_status(&self) -> Status {
        match self {
            CitadelError::Transport(_) => Status::BadGateway,
            CitadelError::Protocol(_) => Status::BadRequest,
            CitadelError::Authorization(_) => Status::Forbidden,
            CitadelError::NotFound(_) => Status::NotFound,
            CitadelError::Precondition(_) => Status::PreconditionFailed,
            CitadelError::Resource(_) => Status::ServiceUnavailable,
            CitadelError::Sqlite(_) | CitadelError::Io(_) => Status::InternalServerError,
        }
    }
}

pub type CitadelResult<T> = Result<T, CitadelError>;
