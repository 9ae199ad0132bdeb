//! audiosrv-platform — the uniform device back-end contract (spec.md §4.1)
//!
//! Every device back-end — ALSA, Bluetooth, loopback, or the one concrete
//! implementation this crate ships — implements [`IoDevBackend`]. The
//! realtime engine in `audiosrv-core` never knows which back-end it's
//! driving; it only ever calls through this trait (spec.md §1 keeps actual
//! ALSA/Bluetooth/loopback back-ends external, as collaborators behind this
//! same contract).
//!
//! Two implementations ship here:
//!
//! - [`CpalIoDevBackend`] — a cross-platform back-end over `cpal`, standing
//!   in for the class of back-ends the core spec keeps external.
//! - [`TestIoDevBackend`] — a deterministic in-memory back-end with no
//!   hardware dependency, used to drive the engine in property and scenario
//!   tests (spec.md §8) without real audio hardware.

mod contract;
mod cpal_backend;
mod error;
mod test_backend;

pub use contract::{
    DeviceArea, DeviceFormat, Direction, HwLevel, HwTimestamp, IoDevBackend, SampleFormat,
};
pub use cpal_backend::CpalIoDevBackend;
pub use error::PlatformError;
pub use test_backend::{ScriptedEvent, TestIoDevBackend, TestIoDevHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hw_level_and_test_backend_are_reachable() {
        let _ = HwLevel::Frames(0);
        let backend = TestIoDevBackend::new("test", Direction::Output, 2);
        assert_eq!(backend.name(), "test");
    }
}
