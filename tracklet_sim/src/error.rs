//! Simulation harness errors.

use thiserror::Error;
use tracklet_core::TrackletError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Core(#[from] TrackletError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generator or runner parameters are inconsistent
    #[error("Invalid simulation configuration: {0}")]
    Config(String),
}
