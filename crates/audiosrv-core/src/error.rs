//! Engine error types
//!
//! Mirrors spec.md §7's error kinds: transient device errors are handled
//! in-thread and never reach this type; `EngineError` covers what the
//! control-thread-facing API (registry mutation, message bus `send`) can
//! return synchronously — policy rejection and resource exhaustion — plus
//! the two wrapped per-crate error types, following the teacher's
//! `#[from]`-per-dependency-crate convention.

use thiserror::Error;

use crate::ids::{DeviceIndex, StreamId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    #[error("unknown device: {0}")]
    UnknownDevice(DeviceIndex),

    #[error("policy rejection: {0}")]
    PolicyRejected(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("engine already running")]
    AlreadyRunning,

    #[error("engine not running")]
    NotRunning,

    #[error("DSP error: {0}")]
    Dsp(#[from] audiosrv_dsp::DspError),

    #[error("platform error: {0}")]
    Platform(#[from] audiosrv_platform::PlatformError),

    #[error("command channel send error - realtime thread gone")]
    ChannelSendError,

    #[error("event channel receive error - sender dropped")]
    ChannelRecvError,
}

pub type EngineResult<T> = Result<T, EngineError>;
