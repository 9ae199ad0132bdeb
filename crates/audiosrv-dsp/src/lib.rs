//! audiosrv-dsp — DSP kernels for the audiosrv realtime mixing engine
//!
//! Provides the pieces of the per-device cycle (spec.md §4.3/§4.4) that are
//! pure signal processing, with no notion of a device, stream, or thread:
//!
//! - the shared-memory-shaped SPSC ring buffer (`ring_buffer`)
//! - the windowed rate estimator (`rate_estimator`)
//! - sample-format/rate/channel conversion (`format_converter`)
//! - mix-add and volume kernels (`mixer`)
//! - the ramp envelope (`ramp`)
//! - the DSP pipeline adapter and its concrete stages (`dsp_pipeline`, `eq`,
//!   `soft_clip`)
//! - the loopback tap registry (`loopback`)
//!
//! # Real-time safety
//!
//! Every function reachable from a device's per-cycle path is allocation-
//! free and O(n) in the buffer size. Setup-time calls (constructing a
//! converter, registering a tap) may allocate; they never run on the
//! audio thread's hot path.

mod dsp_pipeline;
mod eq;
mod error;
mod format_converter;
pub mod loopback;
pub mod mixer;
mod ramp;
pub mod rate_estimator;
pub mod ring_buffer;
mod soft_clip;

pub use dsp_pipeline::{AudioProcessor, ProcessContext, ProcessorChain};
pub use eq::{Band, BandType, Equalizer, EqConfig, EQ_BANDS};
pub use error::DspError;
pub use format_converter::{convert_channels, RateConverter, SampleFormat};
pub use loopback::{LoopbackPoint, LoopbackReceiver, LoopbackRegistry};
pub use ramp::{RampEnvelope, RampRequest, DEFAULT_RAMP_DURATION};
pub use rate_estimator::RateEstimator;
pub use ring_buffer::{FrameRingBuffer, FrameRingConsumer, FrameRingProducer, RingBufferHeader};
pub use soft_clip::SoftClipper;
