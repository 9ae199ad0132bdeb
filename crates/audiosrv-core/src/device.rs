//! Device object and state machine (spec.md §3, §4.2)
//!
//! `IoDev` is the realtime thread's view of one hardware (or virtual)
//! device: a back-end implementing [`audiosrv_platform::IoDevBackend`], the
//! current negotiated format, the attached [`DevStream`] list, the DSP
//! context, rate estimator, loopback taps, and an optional ramp envelope.
//! Replaces the teacher's cpal-enumeration-only `AudioDevice` with the
//! spec's CLOSE/OPEN/NORMAL_RUN/NO_STREAM_RUN state machine, grounded on
//! `cras_iodev.c`'s `cras_iodev_open`/`close`/`no_stream` transition logic.

use std::time::{Duration, Instant};

use audiosrv_dsp::{LoopbackRegistry, ProcessorChain, RampEnvelope, RateEstimator};
use audiosrv_platform::{DeviceFormat, HwLevel, HwTimestamp, IoDevBackend};

use crate::config::DeviceDefaults;
use crate::dev_stream::DevStream;
use crate::format::Direction;
use crate::ids::{DeviceIndex, StreamId};

/// CLOSE -> OPEN -> NORMAL_RUN <-> NO_STREAM_RUN -> CLOSE (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Close,
    Open,
    NormalRun,
    NoStreamRun,
}

/// Per-cycle underrun counters (§4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct UnderrunCounters {
    pub total: u64,
    pub severe: u64,
}

pub struct IoDev {
    index: DeviceIndex,
    direction: Direction,
    backend: Box<dyn IoDevBackend>,
    state: DeviceState,
    format: Option<DeviceFormat>,
    buffer_size_frames: u32,
    min_buffer_level_frames: u32,
    no_stream_fill_multiplier: u32,
    active_node: u32,
    dev_streams: Vec<DevStream>,
    dsp_chain: ProcessorChain,
    rate_estimator: RateEstimator,
    loopback: LoopbackRegistry,
    ramp: Option<RampEnvelope>,
    underrun: UnderrunCounters,
    last_cumulative_frames: u64,
    opened_at: Option<Instant>,
    idle_since: Option<Instant>,
    idle_close_timeout: Duration,
}

impl IoDev {
    pub fn new(
        index: DeviceIndex,
        direction: Direction,
        backend: Box<dyn IoDevBackend>,
        defaults: &DeviceDefaults,
    ) -> Self {
        Self {
            index,
            direction,
            backend,
            state: DeviceState::Close,
            format: None,
            buffer_size_frames: defaults.buffer_size_frames,
            min_buffer_level_frames: defaults.min_buffer_level_frames,
            no_stream_fill_multiplier: defaults.no_stream_fill_multiplier,
            active_node: 0,
            dev_streams: Vec::new(),
            dsp_chain: ProcessorChain::new(48_000.0, 2, defaults.buffer_size_frames as usize),
            rate_estimator: RateEstimator::new(48_000),
            loopback: LoopbackRegistry::new(),
            ramp: None,
            underrun: UnderrunCounters::default(),
            last_cumulative_frames: 0,
            opened_at: None,
            idle_since: None,
            idle_close_timeout: defaults.idle_close_timeout,
        }
    }

    pub fn index(&self) -> DeviceIndex {
        self.index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn format(&self) -> Option<DeviceFormat> {
        self.format
    }

    pub fn buffer_size_frames(&self) -> u32 {
        self.buffer_size_frames
    }

    pub fn min_buffer_level_frames(&self) -> u32 {
        self.min_buffer_level_frames
    }

    pub fn dsp_chain_mut(&mut self) -> &mut ProcessorChain {
        &mut self.dsp_chain
    }

    pub fn loopback_mut(&mut self) -> &mut LoopbackRegistry {
        &mut self.loopback
    }

    pub fn rate_estimator(&self) -> &RateEstimator {
        &self.rate_estimator
    }

    pub fn underrun_counters(&self) -> UnderrunCounters {
        self.underrun
    }

    pub fn backend_mut(&mut self) -> &mut dyn IoDevBackend {
        self.backend.as_mut()
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn active_node(&self) -> u32 {
        self.active_node
    }

    pub fn set_active_node(&mut self, node_idx: u32) -> Result<(), audiosrv_platform::PlatformError> {
        self.backend.update_active_node(node_idx)?;
        self.active_node = node_idx;
        Ok(())
    }

    /// CLOSE -> OPEN (§4.2): negotiate format, allocate DSP, create a fresh
    /// rate estimator, clear no-stream/underrun tracking.
    pub fn open(&mut self, format: DeviceFormat) -> Result<(), audiosrv_platform::PlatformError> {
        self.backend.open(self.min_buffer_level_frames, format)?;
        self.format = Some(format);
        self.dsp_chain
            .set_context(audiosrv_dsp::ProcessContext::new(
                format.rate as f32,
                format.channels as usize,
                self.buffer_size_frames as usize,
            ));
        self.rate_estimator = RateEstimator::new(format.rate);
        self.underrun = UnderrunCounters::default();
        self.last_cumulative_frames = 0;
        self.opened_at = Some(Instant::now());
        self.idle_since = None;
        self.state = DeviceState::Open;
        Ok(())
    }

    /// Any state -> CLOSE. Idempotent from `Close`. Attached `dev_stream`s
    /// are preserved across a close issued for a profile switch; callers
    /// that mean a permanent teardown must detach streams first.
    pub fn close(&mut self) -> Result<(), audiosrv_platform::PlatformError> {
        if self.state == DeviceState::Close {
            return Ok(());
        }
        self.backend.close()?;
        self.loopback.notify_idle();
        self.format = None;
        self.state = DeviceState::Close;
        self.opened_at = None;
        Ok(())
    }

    /// OPEN -> NORMAL_RUN directly, for back-ends exposing `start`.
    /// Back-ends without it auto-transition via NO_STREAM_RUN (§4.2) — the
    /// engine should call [`IoDev::enter_no_stream_run`] instead in that case.
    pub fn start(&mut self) -> Result<(), audiosrv_platform::PlatformError> {
        debug_assert_eq!(self.state, DeviceState::Open);
        if self.backend.supports_start() {
            self.backend.start()?;
        }
        self.state = DeviceState::NormalRun;
        self.idle_since = None;
        Ok(())
    }

    /// NORMAL_RUN -> NO_STREAM_RUN: the last attached stream produced no
    /// frames for one cycle.
    pub fn enter_no_stream_run(&mut self) -> Result<(), audiosrv_platform::PlatformError> {
        if self.backend.supports_no_stream() {
            self.backend.no_stream(true)?;
        }
        self.state = DeviceState::NoStreamRun;
        self.loopback.notify_idle();
        self.idle_since = Some(Instant::now());
        Ok(())
    }

    /// NO_STREAM_RUN -> NORMAL_RUN: a stream has frames ready. Engages a
    /// ramp so the join doesn't click (§4.6's pre-roll requirement pairs
    /// with this transition in the playback cycle).
    pub fn leave_no_stream_run(&mut self) -> Result<(), audiosrv_platform::PlatformError> {
        if self.backend.supports_no_stream() {
            self.backend.no_stream(false)?;
        }
        self.state = DeviceState::NormalRun;
        self.idle_since = None;
        self.ramp = Some(RampEnvelope::new(
            audiosrv_dsp::RampRequest::UpStartPlayback,
            self.format.map(|f| f.rate).unwrap_or(48_000),
            audiosrv_dsp::DEFAULT_RAMP_DURATION,
        ));
        Ok(())
    }

    /// Target fill level while idling in NO_STREAM_RUN (§4.6): `2 ×
    /// min_cb_level`.
    pub fn no_stream_target_fill(&self) -> u32 {
        self.min_buffer_level_frames * self.no_stream_fill_multiplier
    }

    /// Apply the active ramp envelope, if any, clearing it once finished.
    pub fn apply_ramp(&mut self, buffer: &mut [f32], channels: usize) {
        if let Some(ramp) = self.ramp.as_mut() {
            ramp.apply(buffer, channels);
            if ramp.is_finished() {
                self.ramp = None;
            }
        }
    }

    pub fn has_active_ramp(&self) -> bool {
        self.ramp.is_some()
    }

    /// Feed one `frames_queued` reading into the rate estimator and detect
    /// underrun per §4.3 step 1-2 / §4.7.
    pub fn observe_hw_level(&mut self, level: HwLevel, ts: HwTimestamp) -> UnderrunObservation {
        match level {
            HwLevel::SevereUnderrun => {
                self.underrun.total += 1;
                self.underrun.severe += 1;
                UnderrunObservation::Severe
            }
            HwLevel::Frames(frames) => {
                let cumulative = self.last_cumulative_frames + frames as u64;
                self.rate_estimator.update(cumulative, ts.0);
                self.last_cumulative_frames = cumulative;
                if frames == 0 && self.state == DeviceState::NormalRun {
                    self.underrun.total += 1;
                    UnderrunObservation::Mild
                } else {
                    UnderrunObservation::None
                }
            }
        }
    }

    pub fn attach(&mut self, dev_stream: DevStream) {
        self.dev_streams.push(dev_stream);
    }

    pub fn detach(&mut self, stream_id: StreamId) -> Option<DevStream> {
        let pos = self.dev_streams.iter().position(|d| d.stream_id() == stream_id)?;
        Some(self.dev_streams.remove(pos))
    }

    pub fn dev_streams(&self) -> &[DevStream] {
        &self.dev_streams
    }

    pub fn dev_streams_mut(&mut self) -> &mut [DevStream] {
        &mut self.dev_streams
    }

    pub fn is_attached(&self, stream_id: StreamId) -> bool {
        self.dev_streams.iter().any(|d| d.stream_id() == stream_id)
    }

    /// Largest callback threshold among attached streams, used for wake
    /// scheduling (§4.5): the device must have room for the most demanding
    /// stream before the next wake.
    pub fn max_callback_threshold(&self) -> Option<u32> {
        self.dev_streams.iter().map(DevStream::callback_threshold).max()
    }

    /// §4.9's join-offset computation: the maximum device-side write offset
    /// across all already-attached streams, used to seed a newly attaching
    /// stream so it never receives samples older than the newest delivered.
    pub fn join_offset(&self) -> u64 {
        self.dev_streams.iter().map(DevStream::device_offset).max().unwrap_or(0)
    }

    /// Whether the device has been idle (NO_STREAM_RUN, no attachments)
    /// long enough to close per its configured idle timeout.
    pub fn idle_timed_out(&self) -> bool {
        self.dev_streams.is_empty()
            && self
                .idle_since
                .map(|since| since.elapsed() >= self.idle_close_timeout)
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderrunObservation {
    None,
    Mild,
    Severe,
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiosrv_dsp::SampleFormat;
    use audiosrv_platform::{DeviceArea, PlatformError};

    struct StubBackend {
        opened: bool,
    }

    impl IoDevBackend for StubBackend {
        fn open(&mut self, _cb_level: u32, _format: DeviceFormat) -> Result<(), PlatformError> {
            self.opened = true;
            Ok(())
        }

        fn configure(&mut self, _format: DeviceFormat) -> Result<(), PlatformError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), PlatformError> {
            self.opened = false;
            Ok(())
        }

        fn update_supported_formats(&mut self) -> Result<Vec<DeviceFormat>, PlatformError> {
            Ok(Vec::new())
        }

        fn frames_queued(&self) -> Result<(HwLevel, HwTimestamp), PlatformError> {
            Ok((HwLevel::Frames(0), HwTimestamp(Duration::ZERO)))
        }

        fn delay_frames(&self) -> Result<u32, PlatformError> {
            Ok(0)
        }

        fn get_buffer(&mut self, _frames: u32) -> Result<DeviceArea<'_>, PlatformError> {
            Err(PlatformError::FeatureNotAvailable("stub".into()))
        }

        fn put_buffer(&mut self, _n: u32) -> Result<(), PlatformError> {
            Ok(())
        }

        fn flush_buffer(&mut self) -> Result<u32, PlatformError> {
            Ok(0)
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn defaults() -> DeviceDefaults {
        DeviceDefaults {
            buffer_size_frames: 1024,
            min_buffer_level_frames: 240,
            no_stream_fill_multiplier: 2,
            idle_close_timeout: Duration::from_secs(10),
        }
    }

    fn format() -> DeviceFormat {
        DeviceFormat {
            sample_format: SampleFormat::F32Le,
            rate: 48_000,
            channels: 2,
        }
    }

    #[test]
    fn starts_closed_and_opens_into_open_state() {
        let mut dev = IoDev::new(
            DeviceIndex(0),
            Direction::Output,
            Box::new(StubBackend { opened: false }),
            &defaults(),
        );
        assert_eq!(dev.state(), DeviceState::Close);
        dev.open(format()).unwrap();
        assert_eq!(dev.state(), DeviceState::Open);
    }

    #[test]
    fn no_stream_target_fill_is_twice_min_buffer_level() {
        let dev = IoDev::new(
            DeviceIndex(0),
            Direction::Output,
            Box::new(StubBackend { opened: false }),
            &defaults(),
        );
        assert_eq!(dev.no_stream_target_fill(), 480);
    }

    #[test]
    fn severe_underrun_increments_both_counters() {
        let mut dev = IoDev::new(
            DeviceIndex(0),
            Direction::Output,
            Box::new(StubBackend { opened: false }),
            &defaults(),
        );
        dev.open(format()).unwrap();
        dev.start().unwrap();
        let obs = dev.observe_hw_level(HwLevel::SevereUnderrun, HwTimestamp(Duration::ZERO));
        assert_eq!(obs, UnderrunObservation::Severe);
        assert_eq!(dev.underrun_counters().total, 1);
        assert_eq!(dev.underrun_counters().severe, 1);
    }

    #[test]
    fn zero_frames_while_running_counts_as_mild_underrun() {
        let mut dev = IoDev::new(
            DeviceIndex(0),
            Direction::Output,
            Box::new(StubBackend { opened: false }),
            &defaults(),
        );
        dev.open(format()).unwrap();
        dev.start().unwrap();
        let obs = dev.observe_hw_level(HwLevel::Frames(0), HwTimestamp(Duration::ZERO));
        assert_eq!(obs, UnderrunObservation::Mild);
        assert_eq!(dev.underrun_counters().total, 1);
        assert_eq!(dev.underrun_counters().severe, 0);
    }

    #[test]
    fn close_is_idempotent() {
        let mut dev = IoDev::new(
            DeviceIndex(0),
            Direction::Output,
            Box::new(StubBackend { opened: false }),
            &defaults(),
        );
        assert!(dev.close().is_ok());
        assert!(dev.close().is_ok());
    }

    #[test]
    fn join_offset_is_zero_with_no_attachments() {
        let dev = IoDev::new(
            DeviceIndex(0),
            Direction::Output,
            Box::new(StubBackend { opened: false }),
            &defaults(),
        );
        assert_eq!(dev.join_offset(), 0);
    }
}
