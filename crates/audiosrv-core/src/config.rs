//! Engine and device configuration (spec.md §4.14)
//!
//! Load-once-at-startup settings: default device buffer sizing, the rate
//! estimator's window and smoothing (§4.8), the no-stream target-fill
//! multiplier (§4.6), and the idle-close timeout. Kept from the teacher's
//! `StreamConfig`/`EngineConfig` split and generalized from one fixed
//! stream format to the multi-device model; `serde` derives are kept so
//! `audiosrvd` can load overrides from a TOML file via `toml`, matching the
//! teacher's convention even though §6 specifies no *runtime* persisted
//! state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::format::{AudioFormat, ChannelLayout, SampleFormat};

/// Format and sizing a client stream negotiates at connect time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames exchanged per client wake (`cb_threshold`, §3).
    pub callback_threshold: u32,
    /// Frames in the client's shared ring (§3).
    pub buffer_frames: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            callback_threshold: 240,
            buffer_frames: 480,
        }
    }
}

impl StreamConfig {
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_frames as f32 / self.sample_rate as f32) * 1000.0
    }

    pub fn to_format(&self) -> AudioFormat {
        let layout = if self.channels == 1 {
            ChannelLayout::mono()
        } else {
            ChannelLayout::stereo()
        };
        AudioFormat::new(SampleFormat::F32Le, self.sample_rate, layout)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8_000 || self.sample_rate > 192_000 {
            return Err(format!("invalid sample rate: {}", self.sample_rate));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(format!("invalid channel count: {}", self.channels));
        }
        if self.callback_threshold == 0 || self.callback_threshold > self.buffer_frames {
            return Err(format!(
                "invalid callback threshold {} for buffer of {} frames",
                self.callback_threshold, self.buffer_frames
            ));
        }
        Ok(())
    }
}

/// Default sizing and policy constants for newly opened devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefaults {
    pub buffer_size_frames: u32,
    /// Floor reserved in the hardware buffer (§3 invariant, `min_buffer_level`).
    pub min_buffer_level_frames: u32,
    /// Multiplier on `min_cb_level` for the no-stream target fill (§4.6).
    #[serde(default = "default_no_stream_fill_multiplier")]
    pub no_stream_fill_multiplier: u32,
    /// How long an idle device stays open before the control thread closes
    /// it (§4.2 "Any state -> CLOSE on last detach after an idle timeout").
    #[serde(with = "duration_ms", default = "default_idle_close_timeout")]
    pub idle_close_timeout: Duration,
}

fn default_no_stream_fill_multiplier() -> u32 {
    2
}

fn default_idle_close_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            buffer_size_frames: 1024,
            min_buffer_level_frames: 240,
            no_stream_fill_multiplier: default_no_stream_fill_multiplier(),
            idle_close_timeout: default_idle_close_timeout(),
        }
    }
}

/// Rate estimator tuning (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateEstimatorConfig {
    #[serde(with = "duration_ms", default = "default_rate_window")]
    pub window: Duration,
    #[serde(default = "default_rate_smoothing")]
    pub smoothing: f64,
}

fn default_rate_window() -> Duration {
    audiosrv_dsp::rate_estimator::DEFAULT_WINDOW
}

fn default_rate_smoothing() -> f64 {
    0.2
}

impl Default for RateEstimatorConfig {
    fn default() -> Self {
        Self {
            window: default_rate_window(),
            smoothing: default_rate_smoothing(),
        }
    }
}

/// Top-level engine configuration, loaded once at daemon startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub stream: StreamConfig,
    pub device: DeviceDefaults,
    pub rate_estimator: RateEstimatorConfig,
}

impl EngineConfig {
    /// Low-latency preset: smaller device buffers, tighter min level.
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                callback_threshold: 64,
                buffer_frames: 128,
                ..StreamConfig::default()
            },
            device: DeviceDefaults {
                buffer_size_frames: 256,
                min_buffer_level_frames: 64,
                ..DeviceDefaults::default()
            },
            rate_estimator: RateEstimatorConfig::default(),
        }
    }

    /// Load an `EngineConfig` from a TOML file, falling back to defaults
    /// for any field the file omits.
    pub fn load_from_toml(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stream_config_is_valid() {
        assert!(StreamConfig::default().validate().is_ok());
    }

    #[test]
    fn callback_threshold_above_buffer_is_rejected() {
        let cfg = StreamConfig {
            callback_threshold: 1000,
            buffer_frames: 480,
            ..StreamConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn low_latency_preset_has_smaller_buffers_than_default() {
        let default = EngineConfig::default();
        let low_latency = EngineConfig::low_latency();
        assert!(low_latency.stream.buffer_frames < default.stream.buffer_frames);
        assert!(low_latency.device.buffer_size_frames < default.device.buffer_size_frames);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = EngineConfig::low_latency();
        let text = toml::to_string(&config).unwrap();
        let parsed = EngineConfig::load_from_toml(&text).unwrap();
        assert_eq!(parsed.stream.buffer_frames, config.stream.buffer_frames);
        assert_eq!(parsed.device.idle_close_timeout, config.device.idle_close_timeout);
    }

    #[test]
    fn to_format_reflects_mono_vs_stereo() {
        let mono = StreamConfig {
            channels: 1,
            ..StreamConfig::default()
        };
        assert_eq!(mono.to_format().channels(), 1);

        let stereo = StreamConfig::default();
        assert_eq!(stereo.to_format().channels(), 2);
    }
}
