//! Stream direction, effects flags, channel layout, and negotiated format
//!
//! `Direction` and `StreamEffects` are grounded on `cras_types.h`'s
//! `CRAS_STREAM_DIRECTION` and `CRAS_INPUT_STREAM_FLAG`. The flags are
//! modeled as a `bitflags!` set rather than a raw integer OR'ed by hand
//! (Design Notes: "bit-field flag enums combined with OR" -> a set with
//! `contains`/`union`/`difference`), which is also what sidesteps the
//! `notify_profile_dropped` bug the spec flags as an open question: a typo'd
//! `!profile` can't silently compile where `difference()` is the only way to
//! clear a bit.
//!
//! `ChannelLayout` replaces the original's fixed-size `CRAS_CH_MAX`-indexed
//! array with an ordered `Vec<ChannelLabel>` (Design Notes: tagged array ->
//! sum-type-free ordered list).

use bitflags::bitflags;

pub use audiosrv_dsp::SampleFormat;

/// Direction of a stream or a device's active transfer path. Mirrors
/// `CRAS_STREAM_DIRECTION`, dropping the `Undefined` placeholder variant
/// the original only used as an array bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Output,
    Input,
    /// Secondary consumer of a device's mixed-but-unprocessed frames.
    LoopbackPreDsp,
    /// Secondary consumer of a device's post-DSP frames.
    LoopbackPostDsp,
}

impl Direction {
    /// `cras_stream_uses_output_hw`.
    pub fn uses_output_hw(self) -> bool {
        matches!(self, Direction::Output)
    }

    /// `cras_stream_uses_input_hw`.
    pub fn uses_input_hw(self) -> bool {
        matches!(self, Direction::Input)
    }

    /// `cras_stream_has_input` (anything that isn't driving an output
    /// device pulls from the input side, loopback included).
    pub fn has_input(self) -> bool {
        !matches!(self, Direction::Output)
    }

    /// `cras_stream_is_loopback`.
    pub fn is_loopback(self) -> bool {
        matches!(self, Direction::LoopbackPreDsp | Direction::LoopbackPostDsp)
    }
}

bitflags! {
    /// Per-stream behavior flags, lifted from `CRAS_INPUT_STREAM_FLAG`.
    /// `HOTWORD_STREAM` is `BULK_AUDIO_OK | USE_DEV_TIMING` in the original;
    /// kept here as a derived constant rather than a fifth independent bit
    /// so the two can never drift apart.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StreamEffects: u32 {
        /// Stream accepts up to a full shm of samples in one callback.
        const BULK_AUDIO_OK = 0x01;
        /// Don't wake based on stream timing; only wake when the device is
        /// ready (input streams only).
        const USE_DEV_TIMING = 0x02;
        /// Receive-availability only; never deliver actual samples. Used
        /// together with hotword streams.
        const TRIGGER_ONLY = 0x04;
        /// Not associated with a client; used for audio flowing from
        /// hardware through a device's DSP pipeline with no external
        /// consumer.
        const SERVER_ONLY = 0x08;
    }
}

impl StreamEffects {
    /// `BULK_AUDIO_OK | USE_DEV_TIMING`, matching the original's derived
    /// `HOTWORD_STREAM` constant.
    pub const HOTWORD_STREAM: StreamEffects =
        StreamEffects::from_bits_truncate(StreamEffects::BULK_AUDIO_OK.bits() | StreamEffects::USE_DEV_TIMING.bits());

    /// §9's documented resolution for `BULK_AUDIO_OK | USE_DEV_TIMING`
    /// (hotword) streams: wake only on device readiness, deliver up to a
    /// full shm per wake, no synthetic per-callback pacing.
    pub fn is_hotword(self) -> bool {
        self.contains(StreamEffects::HOTWORD_STREAM)
    }
}

/// A single channel position, in delivery order. A small, closed set
/// covering mono/stereo plus the handful of surround positions the engine
/// might see negotiated by a client; anything else is rejected at the
/// protocol boundary (out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLabel {
    FrontLeft,
    FrontRight,
    FrontCenter,
    Lfe,
    RearLeft,
    RearRight,
    SideLeft,
    SideRight,
}

/// Ordered list of channel positions for a negotiated format. Position `i`
/// in the list is interleaved sample index `i` within a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout(Vec<ChannelLabel>);

impl ChannelLayout {
    pub fn new(labels: Vec<ChannelLabel>) -> Self {
        Self(labels)
    }

    pub fn mono() -> Self {
        Self(vec![ChannelLabel::FrontCenter])
    }

    pub fn stereo() -> Self {
        Self(vec![ChannelLabel::FrontLeft, ChannelLabel::FrontRight])
    }

    pub fn channels(&self) -> u16 {
        self.0.len() as u16
    }

    pub fn labels(&self) -> &[ChannelLabel] {
        &self.0
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::stereo()
    }
}

/// A negotiated audio format: sample representation, rate, channel count,
/// and channel layout. Shared between a client stream's negotiated format
/// and a device's current transfer format (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub rate: u32,
    pub layout: ChannelLayout,
}

impl AudioFormat {
    pub fn new(sample_format: SampleFormat, rate: u32, layout: ChannelLayout) -> Self {
        Self {
            sample_format,
            rate,
            layout,
        }
    }

    pub fn channels(&self) -> u16 {
        self.layout.channels()
    }
}

/// Process credential presented at connect time. Used only to enforce the
/// stream-id/client-id invariant (§3); never used for authorization here,
/// that belongs to the (out-of-scope) client IPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientCredential {
    pub pid: u32,
    pub uid: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_predicates_match_original_helpers() {
        assert!(Direction::Output.uses_output_hw());
        assert!(!Direction::Input.uses_output_hw());
        assert!(Direction::Input.uses_input_hw());
        assert!(Direction::Input.has_input());
        assert!(Direction::LoopbackPreDsp.has_input());
        assert!(!Direction::Output.has_input());
        assert!(Direction::LoopbackPreDsp.is_loopback());
        assert!(Direction::LoopbackPostDsp.is_loopback());
        assert!(!Direction::Output.is_loopback());
    }

    #[test]
    fn hotword_is_bulk_audio_ok_plus_use_dev_timing() {
        let hotword = StreamEffects::BULK_AUDIO_OK | StreamEffects::USE_DEV_TIMING;
        assert_eq!(hotword, StreamEffects::HOTWORD_STREAM);
        assert!(hotword.is_hotword());
        assert!(!StreamEffects::BULK_AUDIO_OK.is_hotword());
    }

    #[test]
    fn clearing_a_flag_uses_difference_not_raw_not() {
        let mut flags = StreamEffects::BULK_AUDIO_OK | StreamEffects::TRIGGER_ONLY;
        flags = flags.difference(StreamEffects::TRIGGER_ONLY);
        assert_eq!(flags, StreamEffects::BULK_AUDIO_OK);
    }

    #[test]
    fn stereo_layout_has_two_channels_in_order() {
        let layout = ChannelLayout::stereo();
        assert_eq!(layout.channels(), 2);
        assert_eq!(layout.labels(), &[ChannelLabel::FrontLeft, ChannelLabel::FrontRight]);
    }

    #[test]
    fn audio_format_channels_delegates_to_layout() {
        let fmt = AudioFormat::new(SampleFormat::S16Le, 48_000, ChannelLayout::mono());
        assert_eq!(fmt.channels(), 1);
    }
}
