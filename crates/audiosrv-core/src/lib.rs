//! audiosrv-core — realtime audio mixing engine
//!
//! Owns the device/stream data model, the per-device state machine, the
//! mixer/DSP cycle, and the control-to-realtime message bus. `audiosrv-dsp`
//! supplies the sample-level processing primitives this crate sequences;
//! `audiosrv-platform` supplies the backend trait devices are driven through.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Control thread                         │
//! │  (daemon / IPC) ──Command──▶ Engine ◀──Event── (daemon)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Realtime thread                        │
//! │   capture ──▶ DSP chain ──▶ demux            mix ──▶ DSP     │
//! │                                    ◀── pull ──── chain ──▶  │
//! │                 (device registry + stream registry)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod dev_stream;
mod device;
mod engine;
mod error;
mod format;
mod ids;
mod message;
mod policy;
mod registry;
mod settings;
mod stream;
mod wake;

pub use config::{DeviceDefaults, EngineConfig, RateEstimatorConfig, StreamConfig};
pub use device::{DeviceState, IoDev, UnderrunObservation};
pub use dev_stream::DevStream;
pub use engine::AudioThreadEngine;
pub use error::{EngineError, EngineResult};
pub use format::{AudioFormat, ChannelLayout, ClientCredential, Direction, SampleFormat, StreamEffects};
pub use ids::{ClientId, DeviceIndex, StreamId};
pub use message::{Ack, Command, Event};
pub use registry::{DeviceRegistry, StreamRegistry};
pub use settings::{Settings, SystemSettings};
pub use stream::Stream;
