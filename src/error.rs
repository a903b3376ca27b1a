//! Application-wide error types.
//!
//! Per-call failures live in [`crate::relay::RelayError`]; this enum covers
//! process-level failures (startup, server loop).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
