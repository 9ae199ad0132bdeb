//! No-stream fill policy and underrun handling (spec.md §4.6, §4.7)
//!
//! Grounded on `cras_iodev.c`'s `fill_time_from_level` / no-stream silence
//! filler and `possibly_enter_output_underrun`/`cras_iodev_output_underrun`.
//! Both policies only ever touch a device's backend and its own
//! bookkeeping; neither reaches into the stream registry, since by
//! definition a device needing either is one with no data coming from its
//! attached streams this cycle.

use tracing::{debug, error, warn};

use audiosrv_platform::HwLevel;

use crate::device::{IoDev, UnderrunObservation};

/// Top up a device idling in NO_STREAM_RUN toward its target fill level
/// (§4.6: `2 × min_cb_level`), writing silence through the normal
/// `get_buffer`/`put_buffer` path so the hardware clock keeps running.
///
/// The current fill is read fresh from the backend every call rather than
/// tallied locally: real hardware drains what was filled on its own
/// schedule, so the device can fall back below target between cycles and
/// needs topping up again, exactly like any other `frames_queued` read.
pub fn service_no_stream(dev: &mut IoDev) -> Result<(), audiosrv_platform::PlatformError> {
    let target = dev.no_stream_target_fill();
    let filled = match dev.backend_mut().frames_queued()? {
        (HwLevel::Frames(frames), _) => frames,
        (HwLevel::SevereUnderrun, _) => 0,
    };
    if filled >= target {
        return Ok(());
    }

    let need = target - filled;
    let channels = dev.format().map(|f| f.channels).unwrap_or(2).max(1) as usize;

    let got = {
        let area = dev.backend_mut().get_buffer(need)?;
        audiosrv_dsp::mixer::fill_silence(area.samples);
        (area.samples.len() / channels) as u32
    };
    dev.backend_mut().put_buffer(got)
}

/// Pre-roll `min_cb_level` frames of silence immediately after leaving
/// NO_STREAM_RUN (§4.6), so the first real mix has somewhere to land
/// without the hardware underrunning while the first stream's samples
/// are still being pulled.
pub fn pre_roll(dev: &mut IoDev) -> Result<(), audiosrv_platform::PlatformError> {
    let need = dev.min_buffer_level_frames();
    let channels = dev.format().map(|f| f.channels).unwrap_or(2).max(1) as usize;

    let got = {
        let area = dev.backend_mut().get_buffer(need)?;
        audiosrv_dsp::mixer::fill_silence(area.samples);
        (area.samples.len() / channels) as u32
    };
    dev.backend_mut().put_buffer(got)
}

/// React to the underrun `observation` from this cycle's `frames_queued`
/// read (§4.7). Returns `true` when the caller should request a device
/// reset (close + reopen) — a severe underrun the backend can't recover
/// from in place.
pub fn handle_underrun(dev: &mut IoDev, observation: UnderrunObservation) -> bool {
    match observation {
        UnderrunObservation::None => false,
        UnderrunObservation::Mild => {
            if dev.backend_mut().supports_output_underrun() {
                if let Err(err) = dev.backend_mut().output_underrun() {
                    warn!(device = dev.name(), %err, "backend underrun recovery failed");
                }
            } else {
                debug!(device = dev.name(), "mild underrun, default silence-fill recovery");
                if let Err(err) = pre_roll(dev) {
                    warn!(device = dev.name(), %err, "default underrun recovery failed");
                }
            }
            false
        }
        UnderrunObservation::Severe => {
            error!(device = dev.name(), "severe underrun, requesting device reset");
            true
        }
    }
}
