//! Loopback tap registry and fan-out
//!
//! A device fans its mixed (or DSP-applied) frames out to zero or more
//! secondary consumers without blocking the playback/capture cycle on them.
//! This replaces the original's callback-function-pointer-plus-`void*`
//! pattern (`loopback_hook_data_t`/`loopback_hook_control_t`/`cb_data`) with
//! a capability trait, the same shape `AudioProcessor` already gives the
//! DSP chain: one object exposing the operations the sender needs, instead
//! of a bag of raw pointers the sender has to thread through by hand.

use tracing::warn;

/// Where in the playback pipeline a tap observes frames (spec §3, §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackPoint {
    /// Mixed-but-unprocessed frames (before the device's DSP pipeline).
    PreDsp,
    /// The frames that will actually reach hardware.
    PostDsp,
}

/// The capability set a loopback receiver exposes to its sender device.
/// `on_data` must not block; the sender treats any failure as non-fatal and
/// logs it rather than propagating an error into the mix cycle.
pub trait LoopbackReceiver: Send {
    /// Deliver one block of interleaved frames in the source device's
    /// native format.
    fn on_data(&mut self, frames: &[f32], channels: u16) -> Result<(), String>;

    /// Notified when the source starts producing frames after being idle
    /// (`start = true`), or enters `NO_STREAM_RUN`/closes (`start = false`).
    fn on_control(&mut self, start: bool) -> Result<(), String> {
        let _ = start;
        Ok(())
    }
}

struct Tap {
    point: LoopbackPoint,
    receiver: Box<dyn LoopbackReceiver>,
    was_active: bool,
}

/// Ordered sequence of taps registered on one device. Registration order is
/// delivery order, matching the invariant that loopback delivery order
/// equals mixing order for a given cycle.
#[derive(Default)]
pub struct LoopbackRegistry {
    taps: Vec<Tap>,
}

impl LoopbackRegistry {
    pub fn new() -> Self {
        Self { taps: Vec::new() }
    }

    /// Register a new tap, returning an opaque id used to remove it later.
    pub fn register(&mut self, point: LoopbackPoint, receiver: Box<dyn LoopbackReceiver>) -> usize {
        self.taps.push(Tap {
            point,
            receiver,
            was_active: false,
        });
        self.taps.len() - 1
    }

    /// Remove a tap by id. Fires a final `on_control(false)` so the
    /// receiver's `cb_data`-equivalent state is released cleanly.
    pub fn remove(&mut self, id: usize) {
        if id < self.taps.len() {
            let mut tap = self.taps.remove(id);
            if tap.was_active {
                if let Err(e) = tap.receiver.on_control(false) {
                    warn!("loopback tap control callback failed on removal: {e}");
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Deliver one block to every tap registered at `point`, in
    /// registration order. Fires `on_control(true)` for a tap the first
    /// time it sees data after being idle.
    pub fn deliver(&mut self, point: LoopbackPoint, frames: &[f32], channels: u16) {
        for tap in self.taps.iter_mut().filter(|t| t.point == point) {
            if !tap.was_active {
                if let Err(e) = tap.receiver.on_control(true) {
                    warn!("loopback tap control callback failed on start: {e}");
                }
                tap.was_active = true;
            }
            if let Err(e) = tap.receiver.on_data(frames, channels) {
                warn!("loopback tap data callback failed: {e}");
            }
        }
    }

    /// Notify every tap that the source has gone idle (`NO_STREAM_RUN` or
    /// close). Called once per transition, not per cycle.
    pub fn notify_idle(&mut self) {
        for tap in self.taps.iter_mut().filter(|t| t.was_active) {
            if let Err(e) = tap.receiver.on_control(false) {
                warn!("loopback tap control callback failed on idle: {e}");
            }
            tap.was_active = false;
        }
    }
}
