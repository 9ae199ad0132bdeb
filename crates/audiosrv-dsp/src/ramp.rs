//! Linear ramp envelope
//!
//! Masks transients at mute/unmute and at the first block after an
//! underrun recovery or a stream join, by multiplying a short window of
//! frames by a linearly moving scalar instead of jumping straight to the
//! target level.

use std::time::Duration;

/// Why a ramp was requested. Named after the three cases the original
/// documents: mute/unmute transitions and a fresh stream joining an idle
/// device (`CRAS_IODEV_RAMP_REQUEST_UP_UNMUTE` /
/// `CRAS_IODEV_RAMP_REQUEST_DOWN_MUTE` /
/// `CRAS_IODEV_RAMP_REQUEST_UP_START_PLAYBACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampRequest {
    /// Ramp from silence up to unmuted volume.
    UpUnmute,
    /// Ramp from current volume down to silence, then mute.
    DownMute,
    /// Ramp up from silence because playback is starting (underrun
    /// recovery or a stream join on a previously idle device).
    UpStartPlayback,
}

/// Default ramp duration; short enough not to be perceived as a fade, long
/// enough to mask a click.
pub const DEFAULT_RAMP_DURATION: Duration = Duration::from_millis(10);

/// A linear scalar envelope applied once, start to finish, over a run of
/// frames. `progress` advances by `1 / total_frames` per frame processed.
pub struct RampEnvelope {
    request: RampRequest,
    start_scaler: f32,
    end_scaler: f32,
    total_frames: u32,
    frames_done: u32,
}

impl RampEnvelope {
    pub fn new(request: RampRequest, rate: u32, duration: Duration) -> Self {
        let total_frames = ((rate as f64 * duration.as_secs_f64()).round() as u32).max(1);
        let (start_scaler, end_scaler) = match request {
            RampRequest::UpUnmute | RampRequest::UpStartPlayback => (0.0, 1.0),
            RampRequest::DownMute => (1.0, 0.0),
        };
        Self {
            request,
            start_scaler,
            end_scaler,
            total_frames,
            frames_done: 0,
        }
    }

    pub fn request(&self) -> RampRequest {
        self.request
    }

    pub fn is_finished(&self) -> bool {
        self.frames_done >= self.total_frames
    }

    /// Apply the envelope to an interleaved buffer in place, advancing
    /// internal progress by `buffer.len() / channels` frames. Frames beyond
    /// the ramp's duration are left untouched (envelope has finished).
    pub fn apply(&mut self, buffer: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for frame in buffer.chunks_mut(channels) {
            if self.is_finished() {
                break;
            }
            let t = self.frames_done as f32 / self.total_frames as f32;
            let scaler = self.start_scaler + (self.end_scaler - self.start_scaler) * t;
            for sample in frame.iter_mut() {
                *sample *= scaler;
            }
            self.frames_done += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_unmute_ramps_from_silence_to_unity() {
        let mut ramp = RampEnvelope::new(RampRequest::UpUnmute, 48_000, Duration::from_millis(1));
        let mut buffer = vec![1.0f32; 48 * 2]; // 48 frames stereo, shorter than ramp length
        ramp.apply(&mut buffer, 2);
        assert_eq!(buffer[0], 0.0, "first sample should start at silence");
        assert!(buffer[buffer.len() - 1] > buffer[0]);
    }

    #[test]
    fn down_mute_ramps_from_unity_to_silence() {
        let mut ramp = RampEnvelope::new(RampRequest::DownMute, 48_000, Duration::from_millis(1));
        let mut buffer = vec![1.0f32; 48 * 2];
        ramp.apply(&mut buffer, 2);
        assert_eq!(buffer[0], 1.0);
    }

    #[test]
    fn finishes_after_total_frames_and_stops_scaling() {
        let mut ramp = RampEnvelope::new(RampRequest::UpStartPlayback, 48_000, Duration::from_millis(1));
        let mut buffer = vec![1.0f32; 200 * 2]; // well past the ramp's ~48 frames
        ramp.apply(&mut buffer, 2);
        assert!(ramp.is_finished());
        let tail = &buffer[buffer.len() - 2..];
        assert_eq!(tail, &[1.0, 1.0], "post-ramp frames pass through unscaled");
    }
}
