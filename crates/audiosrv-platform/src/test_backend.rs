//! Deterministic in-memory `IoDevBackend` for tests (spec.md §8)
//!
//! Drives the engine's playback/capture cycles without real hardware: an
//! output `TestIoDevBackend` is a software "speaker" that accumulates every
//! committed frame into a buffer the test can inspect; an input one is a
//! software "microphone" the test pre-loads with a known signal before the
//! engine ever runs. `frames_queued` reports a caller-controlled hardware
//! level rather than a real device's drift, so scenario tests can force
//! specific conditions (a severe underrun at a chosen cycle) without racing
//! real audio hardware.
//!
//! The backend itself is handed by value to `AudioThreadEngine::add_device`
//! and lives out its life on the realtime thread, so a test that needs to
//! inspect it afterwards can't hold the value directly. [`TestIoDevBackend::handle`]
//! returns a [`TestIoDevHandle`] sharing the same inner state over an
//! `Arc<Mutex<_>>`, the way the teacher's own test doubles expose a cloneable
//! handle for assertions while the real object is owned elsewhere
//! (`gecko_dsp/src/dsp_pipeline.rs`'s bypass-flag test double).
//!
//! Grounded on `original_source/cras/src/tests/iodev_unittest.cc`'s style of
//! a fully software-driven iodev test double.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::contract::{DeviceArea, DeviceFormat, Direction, HwLevel, HwTimestamp, IoDevBackend};
use crate::error::PlatformError;

/// A scripted event a test can inject into one cycle of a
/// [`TestIoDevBackend`]'s `frames_queued` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedEvent {
    /// Report the severe-underrun sentinel on this call only.
    SevereUnderrun,
}

struct Inner {
    name: String,
    direction: Direction,
    channels: u16,
    rate: u32,
    opened: bool,
    /// Fake "hardware" queue depth the engine observes via
    /// `frames_queued`. For an output backend this is what `put_buffer`
    /// committed minus what wall-clock time has since "played out", the
    /// same way a real device's buffer drains on its own schedule rather
    /// than only when the engine calls in; this is what lets a test drive
    /// the engine through more than one playback cycle with ordinary
    /// `thread::sleep`s instead of hand-stepping cycles.
    hw_level_frames: u32,
    /// Every frame ever committed via `put_buffer` on an output backend.
    committed: Vec<f32>,
    /// For an input backend, samples yet to be handed out by `get_buffer`,
    /// pre-loaded by the test before the engine runs.
    capture_source: VecDeque<f32>,
    start: Instant,
    last_drain: Instant,
    scripted: HashMap<u64, ScriptedEvent>,
    cycle: u64,
    supports_start: bool,
    started: bool,
}

impl Inner {
    /// Drain `hw_level_frames` by however many frames would have played out
    /// at `rate` since the last drain, for output backends only — an input
    /// backend's level tracks preloaded frames directly instead.
    fn drain_elapsed(&mut self) {
        if self.direction != Direction::Output || !self.opened {
            return;
        }
        let now = Instant::now();
        let dt = now.duration_since(self.last_drain);
        self.last_drain = now;
        let drained = (dt.as_secs_f64() * self.rate as f64) as u32;
        self.hw_level_frames = self.hw_level_frames.saturating_sub(drained);
    }

    fn frames_queued_at_cycle(&mut self) -> (HwLevel, HwTimestamp) {
        self.drain_elapsed();
        let ts = HwTimestamp(self.start.elapsed());
        if self.scripted.get(&(self.cycle + 1)) == Some(&ScriptedEvent::SevereUnderrun) {
            return (HwLevel::SevereUnderrun, ts);
        }
        let level = match self.direction {
            Direction::Output => self.hw_level_frames,
            Direction::Input => (self.capture_source.len() / self.channels.max(1) as usize) as u32,
        };
        (HwLevel::Frames(level), ts)
    }
}

/// The `IoDevBackend` implementation handed to `AudioThreadEngine::add_device`.
///
/// `scratch` and `name_cache` live outside the mutex: `get_buffer`/`put_buffer`
/// are only ever called by the engine's single realtime thread, which also
/// owns this backend exclusively (`&mut self`), so there is no concurrent
/// access to guard against there. The mutex only protects state a
/// [`TestIoDevHandle`] reads or writes from a test thread concurrently with
/// the engine thread.
pub struct TestIoDevBackend {
    inner: Arc<Mutex<Inner>>,
    scratch: Vec<f32>,
    name_cache: String,
}

/// A cloneable, non-owning view onto a [`TestIoDevBackend`]'s state, kept by
/// a test after the backend itself has been moved into the engine.
#[derive(Clone)]
pub struct TestIoDevHandle {
    inner: Arc<Mutex<Inner>>,
}

impl TestIoDevBackend {
    pub fn new(name: impl Into<String>, direction: Direction, channels: u16) -> Self {
        let name = name.into();
        let now = Instant::now();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                name: name.clone(),
                direction,
                channels,
                rate: 48_000,
                opened: false,
                hw_level_frames: 0,
                committed: Vec::new(),
                capture_source: VecDeque::new(),
                start: now,
                last_drain: now,
                scripted: HashMap::new(),
                cycle: 0,
                supports_start: false,
                started: false,
            })),
            scratch: Vec::new(),
            name_cache: name,
        }
    }

    /// Advertise a `start` op, so the device transitions OPEN -> NORMAL_RUN
    /// directly instead of going through NO_STREAM_RUN first.
    pub fn with_start(self) -> Self {
        self.inner.lock().unwrap().supports_start = true;
        self
    }

    /// A handle a test can keep after this backend has been moved into
    /// [`crate::IoDevBackend`] storage elsewhere (e.g. the engine).
    pub fn handle(&self) -> TestIoDevHandle {
        TestIoDevHandle {
            inner: self.inner.clone(),
        }
    }

    pub fn name(&self) -> String {
        self.inner.lock().unwrap().name.clone()
    }
}

impl TestIoDevHandle {
    /// Queue interleaved `f32` frames an input backend will hand out from
    /// `get_buffer`, in order, across however many calls it takes to drain
    /// them.
    pub fn load_capture_frames(&self, frames: &[f32]) {
        self.inner.lock().unwrap().capture_source.extend(frames.iter().copied());
    }

    /// Force `frames_queued` to report the severe-underrun sentinel on the
    /// given 1-indexed cycle number (spec.md §8 scenario S3).
    pub fn script_severe_underrun_at(&self, cycle: u64) {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .insert(cycle, ScriptedEvent::SevereUnderrun);
    }

    /// Every frame this backend has ever committed via `put_buffer`, for an
    /// output backend.
    pub fn committed_frames(&self) -> Vec<f32> {
        self.inner.lock().unwrap().committed.clone()
    }

    pub fn hw_level_frames(&self) -> u32 {
        self.inner.lock().unwrap().hw_level_frames
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().unwrap().opened
    }

    pub fn cycles_run(&self) -> u64 {
        self.inner.lock().unwrap().cycle
    }
}

impl IoDevBackend for TestIoDevBackend {
    fn open(&mut self, _cb_level: u32, format: DeviceFormat) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.channels = format.channels;
        inner.rate = format.rate;
        inner.opened = true;
        inner.last_drain = Instant::now();
        Ok(())
    }

    fn configure(&mut self, format: DeviceFormat) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.channels = format.channels;
        inner.rate = format.rate;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.opened = false;
        inner.started = false;
        inner.hw_level_frames = 0;
        Ok(())
    }

    fn update_supported_formats(&mut self) -> Result<Vec<DeviceFormat>, PlatformError> {
        Ok(Vec::new())
    }

    fn frames_queued(&self) -> Result<(HwLevel, HwTimestamp), PlatformError> {
        Ok(self.inner.lock().unwrap().frames_queued_at_cycle())
    }

    // `frames_queued` takes `&self` in the trait but needs to mutate the
    // drain bookkeeping; the `Mutex` makes that an interior-mutability
    // concern rather than a signature mismatch.

    fn delay_frames(&self) -> Result<u32, PlatformError> {
        Ok(self.inner.lock().unwrap().hw_level_frames)
    }

    fn get_buffer(&mut self, frames: u32) -> Result<DeviceArea<'_>, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.opened {
            return Err(PlatformError::BufferProtocolViolation(
                "get_buffer called before open".into(),
            ));
        }
        let channels = inner.channels.max(1) as usize;
        let want = frames as usize * channels;
        self.scratch.resize(want, 0.0);

        match inner.direction {
            Direction::Input => {
                for slot in self.scratch.iter_mut() {
                    *slot = inner.capture_source.pop_front().unwrap_or(0.0);
                }
            }
            Direction::Output => {
                self.scratch.fill(0.0);
            }
        }

        Ok(DeviceArea {
            samples: &mut self.scratch,
            channels: inner.channels,
        })
    }

    fn put_buffer(&mut self, n: u32) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        let channels = inner.channels.max(1) as usize;
        let count = (n as usize * channels).min(self.scratch.len());

        match inner.direction {
            Direction::Output => {
                inner.committed.extend_from_slice(&self.scratch[..count]);
                inner.hw_level_frames = inner.hw_level_frames.saturating_add(n);
            }
            Direction::Input => {
                // Already removed from `capture_source` in `get_buffer`;
                // nothing left to commit on the input side.
            }
        }

        inner.cycle += 1;
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<u32, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        let channels = inner.channels.max(1) as usize;
        let flushed = (inner.capture_source.len() / channels) as u32;
        inner.capture_source.clear();
        Ok(flushed)
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.supports_start {
            return Err(PlatformError::FeatureNotAvailable("start".into()));
        }
        inner.started = true;
        Ok(())
    }

    fn supports_start(&self) -> bool {
        self.inner.lock().unwrap().supports_start
    }

    fn name(&self) -> &str {
        &self.name_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> DeviceFormat {
        DeviceFormat {
            sample_format: crate::contract::SampleFormat::F32Le,
            rate: 48_000,
            channels: 2,
        }
    }

    #[test]
    fn output_backend_accumulates_committed_frames() {
        let mut backend = TestIoDevBackend::new("spk", Direction::Output, 2);
        let handle = backend.handle();
        backend.open(480, format()).unwrap();
        {
            let area = backend.get_buffer(4).unwrap();
            area.samples.copy_from_slice(&[0.1, 0.1, 0.2, 0.2, 0.3, 0.3, 0.4, 0.4]);
        }
        backend.put_buffer(4).unwrap();
        assert_eq!(handle.committed_frames().len(), 8);
        assert_eq!(handle.hw_level_frames(), 4);
    }

    #[test]
    fn input_backend_hands_out_preloaded_frames() {
        let mut backend = TestIoDevBackend::new("mic", Direction::Input, 1);
        let handle = backend.handle();
        backend.open(480, format()).unwrap();
        handle.load_capture_frames(&[0.5, -0.5, 0.25]);
        let area = backend.get_buffer(3).unwrap();
        assert_eq!(area.samples, &[0.5, -0.5, 0.25]);
    }

    #[test]
    fn scripted_severe_underrun_fires_on_the_requested_cycle() {
        let mut backend = TestIoDevBackend::new("spk", Direction::Output, 2);
        let handle = backend.handle();
        backend.open(480, format()).unwrap();
        handle.script_severe_underrun_at(2);

        let (level, _) = backend.frames_queued().unwrap();
        assert_eq!(level, HwLevel::Frames(0));
        backend.put_buffer(0).unwrap(); // advances to cycle 1

        let (level, _) = backend.frames_queued().unwrap();
        assert_eq!(level, HwLevel::SevereUnderrun);
    }
}
