//! The uniform device contract (spec.md §4.1)
//!
//! Every back-end — ALSA, Bluetooth, loopback, or (the one concrete
//! implementation this crate ships) a cross-platform `cpal` device —
//! implements `IoDevBackend`. The realtime engine never knows which
//! back-end it's driving; it only ever calls through this trait.
//!
//! Grounded on the shape of the original's `struct cras_iodev` function
//! pointer table (`examples/original_source/cras/src/server/cras_iodev.h`):
//! one method per documented contract entry, with the same strictness
//! (`configure` must succeed before any transfer, `close` is idempotent
//! from `Close`, optional ops default to the state machine's own fallback
//! rather than being absent).

use crate::error::PlatformError;

/// Sample format a back-end negotiates with the engine. Re-exported from
/// `audiosrv-dsp` rather than duplicated here — this crate already depends
/// on it for the SPSC ring buffer, and the engine needs both crates to
/// agree on one format type.
pub use audiosrv_dsp::SampleFormat;

/// Negotiated transfer format between the engine and a back-end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceFormat {
    pub sample_format: SampleFormat,
    pub rate: u32,
    pub channels: u16,
}

/// Transfer direction a back-end was built for. Shared by every concrete
/// `IoDevBackend` implementation in this crate; the engine's own
/// `Direction` (which also distinguishes the two loopback variants) lives
/// in `audiosrv-core` and is mapped onto this one at device-construction
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Result of `frames_queued`: either a frame count, or the severe-underrun
/// sentinel the original represents as a negative errno. Modeled as a sum
/// type per the REDESIGN FLAGS (tagged union with a discriminant ->
/// enum with its own payload) instead of a magic negative return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwLevel {
    Frames(u32),
    SevereUnderrun,
}

/// Monotonic timestamp paired with a `frames_queued`/`delay_frames`
/// reading. Back-ends report this relative to an arbitrary epoch; only
/// differences between readings are meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HwTimestamp(pub std::time::Duration);

/// A contiguous region of a back-end's buffer available for transfer.
/// Borrowed for the duration between `get_buffer` and the matching
/// `put_buffer`; the engine writes/reads through `samples` and then commits
/// with `put_buffer(n)`.
pub struct DeviceArea<'a> {
    pub samples: &'a mut [f32],
    pub channels: u16,
}

/// The uniform device contract. `Send` because the realtime thread owns
/// the backend and nothing else touches it concurrently (spec.md §5): all
/// cross-thread mutation arrives as a message, never a second caller of
/// this trait.
pub trait IoDevBackend: Send {
    /// Prepare hardware; may adjust `buffer_size` and other parameters.
    /// Failure aborts activation (the device stays in `Close`).
    fn open(&mut self, cb_level: u32, format: DeviceFormat) -> Result<(), PlatformError>;

    /// Apply the negotiated format. Must succeed before any transfer;
    /// `open` calls this internally for backends that fold the two steps
    /// together, but the engine may call it again on a format change.
    fn configure(&mut self, format: DeviceFormat) -> Result<(), PlatformError>;

    /// Release hardware. Idempotent from `Close`.
    fn close(&mut self) -> Result<(), PlatformError>;

    /// Refresh advertised rate/channel/format sets.
    fn update_supported_formats(&mut self) -> Result<Vec<DeviceFormat>, PlatformError>;

    /// Frames currently in the hardware buffer, and the timestamp at which
    /// that level was observed.
    fn frames_queued(&self) -> Result<(HwLevel, HwTimestamp), PlatformError>;

    /// Hardware-side playback/capture delay in frames, not including DSP.
    fn delay_frames(&self) -> Result<u32, PlatformError>;

    /// Obtain the next contiguous region of up to `frames` frames.
    fn get_buffer(&mut self, frames: u32) -> Result<DeviceArea<'_>, PlatformError>;

    /// Commit `n` frames as produced (output) or consumed (input).
    fn put_buffer(&mut self, n: u32) -> Result<(), PlatformError>;

    /// Discard pending input; return the flushed frame count.
    fn flush_buffer(&mut self) -> Result<u32, PlatformError>;

    /// Move from `Open` to `NormalRun`. Devices lacking this op
    /// auto-transition via `NoStreamRun` instead.
    fn start(&mut self) -> Result<(), PlatformError> {
        Err(PlatformError::FeatureNotAvailable("start".into()))
    }

    fn supports_start(&self) -> bool {
        false
    }

    /// Enter/leave the mode that keeps output hardware clocked with
    /// silence. Output-only. The default no-stream policy (§4.6) is used
    /// when a backend doesn't override this.
    fn no_stream(&mut self, enable: bool) -> Result<(), PlatformError> {
        let _ = enable;
        Err(PlatformError::FeatureNotAvailable("no_stream".into()))
    }

    fn supports_no_stream(&self) -> bool {
        false
    }

    /// Back-end-specific underrun recovery. The default path (fill
    /// `min_cb_level` silence and continue) is used when absent.
    fn output_underrun(&mut self) -> Result<(), PlatformError> {
        Err(PlatformError::FeatureNotAvailable("output_underrun".into()))
    }

    fn supports_output_underrun(&self) -> bool {
        false
    }

    fn update_active_node(&mut self, node_idx: u32) -> Result<(), PlatformError> {
        let _ = node_idx;
        Ok(())
    }

    fn update_channel_layout(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn set_volume(&mut self, _scaler: f32) -> Result<(), PlatformError> {
        Ok(())
    }

    fn set_mute(&mut self, _muted: bool) -> Result<(), PlatformError> {
        Ok(())
    }

    fn set_capture_gain(&mut self, _gain_db: f32) -> Result<(), PlatformError> {
        Ok(())
    }

    /// Human-readable name for logging (e.g. "cpal:Speakers").
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hw_level_distinguishes_frames_from_severe_underrun() {
        assert_ne!(HwLevel::Frames(0), HwLevel::SevereUnderrun);
        assert_eq!(HwLevel::Frames(100), HwLevel::Frames(100));
    }
}
