//! Platform Error Types

use thiserror::Error;

/// Errors surfaced by an `IoDevBackend` implementation.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("no matching audio device found: {0}")]
    DeviceNotFound(String),

    #[error("failed to build device stream: {0}")]
    StreamBuildFailed(String),

    #[error("failed to configure device stream: {0}")]
    StreamConfigFailed(String),

    #[error("failed to start device stream: {0}")]
    StreamPlayFailed(String),

    #[error("device entered a severe underrun it could not recover from: {0}")]
    SevereUnderrun(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("feature not available on this backend: {0}")]
    FeatureNotAvailable(String),

    #[error("buffer operation out of order: {0}")]
    BufferProtocolViolation(String),

    #[error("backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}
