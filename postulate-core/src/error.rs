use thiserror::Error;

use crate::client::ApiError;
use crate::replay::ReplayError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PostulateError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("State error: {0}")]
    Store(#[from] StoreError),

    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    #[error("No active session")]
    NoActiveSession,

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
