//! Wake-time computation (spec.md §4.5)
//!
//! The realtime thread doesn't busy-poll every device every cycle; it sleeps
//! until the soonest device needs servicing. Grounded on `cras_iodev.c`'s
//! `get_next_event_time` — output devices sleep until hardware level falls
//! below a `max_cb_level`-scaled low-water mark (half of `min_cb_level` when
//! no stream is attached to size against), and input devices sleep until
//! enough frames have accumulated for the most eager attached stream. Both
//! use the device's [`audiosrv_dsp::RateEstimator`]-scaled rate rather than
//! the nominal rate, so a device running fast or slow doesn't cause
//! systematic early or late wakeups (§4.8).

use std::time::Duration;

use audiosrv_platform::HwLevel;

use crate::device::IoDev;
use crate::format::Direction;

/// How long the realtime thread can sleep before `dev` next needs a cycle,
/// given the hardware level just observed.
pub fn compute_wake_delay(dev: &IoDev, hw_level: HwLevel) -> Duration {
    let hw_frames = match hw_level {
        HwLevel::SevereUnderrun => return Duration::ZERO,
        HwLevel::Frames(frames) => frames,
    };

    let estimator = dev.rate_estimator();
    let estimated_rate = (estimator.nominal_rate() * estimator.ratio()).max(1.0);

    match dev.direction() {
        Direction::Output | Direction::LoopbackPreDsp | Direction::LoopbackPostDsp => {
            match dev.max_callback_threshold() {
                Some(max_cb) => {
                    let low_water = dev.buffer_size_frames().saturating_sub(max_cb);
                    if hw_frames > low_water {
                        frames_to_duration((hw_frames - low_water) as u64, estimated_rate)
                    } else {
                        Duration::ZERO
                    }
                }
                // No stream attached: nothing to size the wake against but
                // the device's own no-stream fill cadence, so wake at twice
                // the rate a NO_STREAM_RUN top-up needs (§4.6).
                None => frames_to_duration(dev.min_buffer_level_frames() as u64, estimated_rate) / 2,
            }
        }
        Direction::Input => {
            let target = dev
                .max_callback_threshold()
                .unwrap_or_else(|| dev.min_buffer_level_frames());
            if hw_frames < target {
                frames_to_duration((target - hw_frames) as u64, estimated_rate)
            } else {
                Duration::ZERO
            }
        }
    }
}

fn frames_to_duration(frames: u64, rate: f64) -> Duration {
    Duration::from_secs_f64(frames as f64 / rate)
}
