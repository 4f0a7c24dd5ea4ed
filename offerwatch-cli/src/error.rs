use thiserror::Error;

use offer_monitor::MonitorError;
use ucas_client::auth::AuthError;
use ucas_client::track::TrackError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sign-in failed: {0}")]
    Auth(#[from] AuthError),

    #[error("status query failed: {0}")]
    Track(#[from] TrackError),

    #[error("{0}")]
    Monitor(#[from] MonitorError),

    #[error("prompt aborted: {0}")]
    Prompt(#[from] inquire::InquireError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
