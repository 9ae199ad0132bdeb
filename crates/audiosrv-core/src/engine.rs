//! The realtime audio thread and its control-facing handle (spec.md §2, §4)
//!
//! `AudioThreadEngine` is the control thread's handle: a command sender, an
//! event receiver, and a join handle, exactly the shape of the teacher's
//! `AudioEngine` (`bounded::<Command>(32)` / `unbounded::<Event>()`, one
//! named thread spawned from the constructor). What runs on that thread is
//! new: `audio_thread_main` owns a [`DeviceRegistry`] and [`StreamRegistry`]
//! it built itself, drains the command queue every cycle (§4.11), then walks
//! every device running its playback cycle (§4.3), capture cycle (§4.4), or
//! no-stream service (§4.6), and sleeps for the shortest wake delay any
//! device reports (§4.5) before doing it again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use audiosrv_dsp::mixer;
use audiosrv_dsp::LoopbackPoint;
use audiosrv_platform::{DeviceFormat, HwLevel, IoDevBackend, PlatformError};

use crate::config::EngineConfig;
use crate::device::{DeviceState, IoDev};
use crate::dev_stream::DevStream;
use crate::error::{EngineError, EngineResult};
use crate::format::{AudioFormat, ChannelLayout, Direction};
use crate::ids::{DeviceIndex, StreamId};
use crate::message::{Command, Event};
use crate::policy;
use crate::registry::{DeviceRegistry, StreamRegistry};
use crate::settings::{Settings, SystemSettings};
use crate::stream::Stream;
use crate::wake;

/// The control thread's handle to the realtime audio thread.
pub struct AudioThreadEngine {
    command_tx: Sender<Command>,
    event_rx: Receiver<Event>,
    thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    settings: Arc<SystemSettings>,
    config: EngineConfig,
}

impl AudioThreadEngine {
    pub fn new() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        let (command_tx, command_rx) = bounded::<Command>(32);
        let (event_tx, event_rx) = unbounded::<Event>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(false));
        let settings = Arc::new(SystemSettings::new(Settings::default()));

        let shutdown_clone = shutdown.clone();
        let running_clone = running.clone();
        let settings_clone = settings.clone();
        let config_clone = config.clone();

        let thread = thread::Builder::new()
            .name("audiosrv-rt".into())
            .spawn(move || {
                running_clone.store(true, Ordering::Release);
                audio_thread_main(command_rx, event_tx, shutdown_clone, config_clone, settings_clone);
                running_clone.store(false, Ordering::Release);
            })
            .map_err(|err| {
                EngineError::Platform(PlatformError::InitializationFailed(err.to_string()))
            })?;

        Ok(Self {
            command_tx,
            event_rx,
            thread: Some(thread),
            shutdown,
            running,
            settings,
            config,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.settings.update(|s| s.master_volume = volume.clamp(0.0, 2.0));
    }

    pub fn set_mute(&self, muted: bool) {
        self.settings.update(|s| s.muted = muted);
    }

    pub fn set_user_mute(&self, muted: bool) {
        self.settings.update(|s| s.user_muted = muted);
    }

    /// `ADD_DEV`: hand a freshly constructed backend to the realtime thread,
    /// which opens and starts cycling it. Blocks for the realtime thread's
    /// acknowledgement.
    pub fn add_device(
        &self,
        backend: Box<dyn IoDevBackend>,
        direction: Direction,
        format: DeviceFormat,
    ) -> EngineResult<DeviceIndex> {
        let (reply, reply_rx) = bounded(1);
        self.command_tx
            .send(Command::AddDevice {
                backend,
                direction,
                format,
                reply,
            })
            .map_err(|_| EngineError::ChannelSendError)?;
        reply_rx
            .recv()
            .map_err(|_| EngineError::ChannelRecvError)?
            .map_err(EngineError::PolicyRejected)
    }

    /// `REMOVE_DEV`.
    pub fn remove_device(&self, device: DeviceIndex) -> EngineResult<()> {
        self.blocking_command(|reply| Command::RemoveDevice { device, reply })
    }

    /// `ADD_STREAM`: attach `stream` to every device in `devices`.
    pub fn add_stream(&self, stream: Stream, devices: Vec<DeviceIndex>) -> EngineResult<()> {
        let (reply, reply_rx) = bounded(1);
        self.command_tx
            .send(Command::AddStream {
                stream,
                devices,
                reply,
            })
            .map_err(|_| EngineError::ChannelSendError)?;
        reply_rx
            .recv()
            .map_err(|_| EngineError::ChannelRecvError)?
            .map_err(EngineError::PolicyRejected)
    }

    /// `REMOVE_STREAM`.
    pub fn remove_stream(&self, stream_id: StreamId) -> EngineResult<()> {
        self.blocking_command(|reply| Command::RemoveStream { stream_id, reply })
    }

    /// Control-thread reaction to [`Event::ResetRequested`] (§4.7 step 3):
    /// close and reopen `device` at its last format, preserving its attached
    /// streams.
    pub fn reset_device(&self, device: DeviceIndex) -> EngineResult<()> {
        self.blocking_command(|reply| Command::ResetDevice { device, reply })
    }

    /// `SWITCH_PROFILE`.
    pub fn switch_profile(&self, device: DeviceIndex, enable_dev: bool) -> EngineResult<()> {
        self.blocking_command(|reply| Command::SwitchProfile {
            device,
            enable_dev,
            reply,
        })
    }

    /// `SCHEDULE_SUSPEND`. Fire-and-forget: serviced once per realtime cycle.
    pub fn schedule_suspend(&self, device: DeviceIndex, delay_ms: u32) -> EngineResult<()> {
        self.command_tx
            .send(Command::ScheduleSuspend { device, delay_ms })
            .map_err(|_| EngineError::ChannelSendError)
    }

    /// `CANCEL_SUSPEND`.
    pub fn cancel_suspend(&self, device: DeviceIndex) -> EngineResult<()> {
        self.command_tx
            .send(Command::CancelSuspend { device })
            .map_err(|_| EngineError::ChannelSendError)
    }

    /// `DUMP_DEBUG`.
    pub fn dump_debug(&self) -> EngineResult<String> {
        let (reply, reply_rx) = bounded(1);
        self.command_tx
            .send(Command::DumpDebug { reply })
            .map_err(|_| EngineError::ChannelSendError)?;
        reply_rx.recv().map_err(|_| EngineError::ChannelRecvError)
    }

    /// Non-blocking poll for the next event the realtime thread posted.
    pub fn try_recv_event(&self) -> Option<Event> {
        self.event_rx.try_recv().ok()
    }

    fn blocking_command(
        &self,
        build: impl FnOnce(Sender<Result<(), String>>) -> Command,
    ) -> EngineResult<()> {
        let (reply, reply_rx) = bounded(1);
        self.command_tx
            .send(build(reply))
            .map_err(|_| EngineError::ChannelSendError)?;
        reply_rx
            .recv()
            .map_err(|_| EngineError::ChannelRecvError)?
            .map_err(EngineError::PolicyRejected)
    }

    /// Stop the realtime thread and wait for it to exit.
    pub fn shutdown(mut self) -> EngineResult<()> {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(handle) = self.thread.take() {
            handle.join().map_err(|_| {
                EngineError::Platform(PlatformError::Internal("audio thread panicked".into()))
            })?;
        }
        Ok(())
    }
}

impl Drop for AudioThreadEngine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Outcome of one device's cycle, consumed by the loop driver to decide
/// whether to post an [`Event`].
enum CycleOutcome {
    None,
    ResetRequested,
}

fn audio_thread_main(
    command_rx: Receiver<Command>,
    event_tx: Sender<Event>,
    shutdown: Arc<AtomicBool>,
    config: EngineConfig,
    settings: Arc<SystemSettings>,
) {
    let mut devices = DeviceRegistry::new();
    let mut streams = StreamRegistry::new();
    let mut pending_suspends: HashMap<DeviceIndex, Instant> = HashMap::new();

    info!("audio thread starting");

    'outer: while !shutdown.load(Ordering::Acquire) {
        loop {
            match command_rx.try_recv() {
                Ok(Command::Shutdown) => break 'outer,
                Ok(command) => handle_command(
                    command,
                    &mut devices,
                    &mut streams,
                    &event_tx,
                    &mut pending_suspends,
                    &config,
                ),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'outer,
            }
        }

        close_timed_out_devices(&mut devices, &event_tx);
        service_pending_suspends(&mut pending_suspends, &mut devices, &event_tx);

        let settings_snapshot = settings.read();
        let mut next_wake = Duration::from_millis(50);

        for (index, dev) in devices.iter_mut() {
            let outcome = run_device_cycle(dev, &mut streams, &settings_snapshot);
            if let CycleOutcome::ResetRequested = outcome {
                let _ = event_tx.send(Event::ResetRequested { device: *index });
            }

            if dev.state() != DeviceState::Close {
                if let Ok((hw_level, _)) = dev.backend_mut().frames_queued() {
                    let delay = wake::compute_wake_delay(dev, hw_level);
                    next_wake = next_wake.min(delay);
                }
            }
        }

        match command_rx.recv_timeout(next_wake.max(Duration::from_micros(200))) {
            Ok(Command::Shutdown) => break,
            Ok(command) => handle_command(
                command,
                &mut devices,
                &mut streams,
                &event_tx,
                &mut pending_suspends,
                &config,
            ),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("audio thread stopping");
}

fn run_device_cycle(
    dev: &mut IoDev,
    streams: &mut StreamRegistry,
    settings: &Settings,
) -> CycleOutcome {
    match dev.state() {
        DeviceState::NormalRun if dev.direction().uses_output_hw() => {
            playback_cycle(dev, streams, settings)
        }
        DeviceState::NormalRun if dev.direction().uses_input_hw() => {
            capture_cycle(dev, streams)
        }
        DeviceState::NoStreamRun => {
            no_stream_cycle(dev, streams);
            CycleOutcome::None
        }
        _ => CycleOutcome::None,
    }
}

/// §4.3: the output device playback cycle.
fn playback_cycle(dev: &mut IoDev, streams: &mut StreamRegistry, settings: &Settings) -> CycleOutcome {
    let (hw_level, ts) = match dev.backend_mut().frames_queued() {
        Ok(v) => v,
        Err(err) => {
            error!(device = dev.name(), %err, "frames_queued failed");
            return CycleOutcome::None;
        }
    };

    let observation = dev.observe_hw_level(hw_level, ts);
    if policy::handle_underrun(dev, observation) {
        return CycleOutcome::ResetRequested;
    }

    let hw_frames = match hw_level {
        HwLevel::Frames(f) => f,
        HwLevel::SevereUnderrun => 0,
    };
    let buffer_avail = dev.buffer_size_frames().saturating_sub(hw_frames);
    if buffer_avail == 0 || dev.dev_streams().is_empty() {
        if dev.dev_streams().is_empty() && dev.state() == DeviceState::NormalRun {
            transition_to_no_stream(dev);
        }
        return CycleOutcome::None;
    }

    // Per-stream offers, bounded by buffer room, the stream's own callback
    // threshold, and what it actually has ready.
    let mut offers: Vec<u32> = Vec::with_capacity(dev.dev_streams().len());
    for ds in dev.dev_streams() {
        let cap = ds.callback_threshold().min(buffer_avail);
        let available = streams
            .get(ds.stream_id())
            .map(|s| s.slots_frames() as u32)
            .unwrap_or(0);
        offers.push(available.min(cap));
    }

    let wanted = offers.iter().copied().min().unwrap_or(0);
    if wanted == 0 {
        if dev.state() == DeviceState::NormalRun {
            transition_to_no_stream(dev);
        }
        return CycleOutcome::None;
    }

    let channels = dev.format().map(|f| f.channels).unwrap_or(2) as usize;
    let channels_u16 = channels as u16;
    let gain = settings.effective_volume();
    // §4.8: re-slew every attached stream's resampler from this cycle's
    // estimated device-rate ratio rather than fixing it at attach time.
    let rate_ratio = dev.rate_estimator().ratio();

    let mixed_frames = {
        let area = match dev.backend_mut().get_buffer(wanted) {
            Ok(area) => area,
            Err(err) => {
                error!(device = dev.name(), %err, "get_buffer failed");
                return CycleOutcome::None;
            }
        };
        let frame_cap = (wanted as usize * channels).min(area.samples.len());
        let samples = &mut area.samples[..frame_cap];
        mixer::fill_silence(samples);

        for (ds, offer) in dev.dev_streams_mut().iter_mut().zip(offers.iter()) {
            if *offer == 0 {
                continue;
            }
            let Some(stream) = streams.get_mut(ds.stream_id()) else {
                continue;
            };
            ds.adjust_rate_ratio(rate_ratio);
            let pulled = ds.pull_for_mix(stream, *offer);
            let take = pulled.len().min(samples.len());
            if take > 0 {
                mixer::mix_add(&mut samples[..take], &pulled[..take]);
            }
        }

        dev.loopback_mut().deliver(LoopbackPoint::PreDsp, samples, channels_u16);

        if gain != 1.0 {
            mixer::scale_volume(samples, gain);
        }

        dev.dsp_chain_mut().process(samples);
        dev.loopback_mut().deliver(LoopbackPoint::PostDsp, samples, channels_u16);
        dev.apply_ramp(samples, channels);

        frame_cap / channels.max(1)
    };

    if let Err(err) = dev.backend_mut().put_buffer(mixed_frames as u32) {
        error!(device = dev.name(), %err, "put_buffer failed");
    }

    CycleOutcome::None
}

fn transition_to_no_stream(dev: &mut IoDev) {
    if let Err(err) = dev.enter_no_stream_run() {
        error!(device = dev.name(), %err, "failed entering no-stream-run");
    } else {
        debug!(device = dev.name(), "entering NO_STREAM_RUN, no stream produced frames");
    }
}

/// §4.4: the input device capture cycle, mirroring playback with DSP applied
/// before demux instead of after mix.
fn capture_cycle(dev: &mut IoDev, streams: &mut StreamRegistry) -> CycleOutcome {
    let (hw_level, ts) = match dev.backend_mut().frames_queued() {
        Ok(v) => v,
        Err(err) => {
            error!(device = dev.name(), %err, "frames_queued failed");
            return CycleOutcome::None;
        }
    };

    let observation = dev.observe_hw_level(hw_level, ts);
    if policy::handle_underrun(dev, observation) {
        return CycleOutcome::ResetRequested;
    }

    let hw_frames = match hw_level {
        HwLevel::Frames(f) => f,
        HwLevel::SevereUnderrun => 0,
    };
    if hw_frames == 0 {
        return CycleOutcome::None;
    }

    let channels = dev.format().map(|f| f.channels).unwrap_or(2) as usize;

    let mut samples: Vec<f32> = {
        let area = match dev.backend_mut().get_buffer(hw_frames) {
            Ok(area) => area,
            Err(err) => {
                error!(device = dev.name(), %err, "get_buffer failed");
                return CycleOutcome::None;
            }
        };
        let frame_cap = (hw_frames as usize * channels).min(area.samples.len());
        area.samples[..frame_cap].to_vec()
    };

    dev.dsp_chain_mut().process(&mut samples);
    dev.loopback_mut()
        .deliver(LoopbackPoint::PostDsp, &samples, channels as u16);

    // §4.4: gain here is per-stream, applied inside each `DevStream`'s own
    // demux (`push_from_demux`) — the system output volume/mute in
    // `settings` scales the playback mix only (§8 property 8 scopes mute
    // dominance to frames committed to hardware), it must never silence
    // captured audio.
    let rate_ratio = dev.rate_estimator().ratio();
    for ds in dev.dev_streams_mut() {
        let Some(stream) = streams.get_mut(ds.stream_id()) else {
            continue;
        };
        ds.adjust_rate_ratio(rate_ratio);
        ds.push_from_demux(stream, &samples);
    }

    if let Err(err) = dev.backend_mut().put_buffer(hw_frames) {
        error!(device = dev.name(), %err, "put_buffer failed");
    }

    CycleOutcome::None
}

/// §4.6: keep an idling output device topped up with silence and watch for
/// the first attached stream to have data ready.
fn no_stream_cycle(dev: &mut IoDev, streams: &StreamRegistry) {
    if dev.direction().uses_output_hw() {
        if let Err(err) = policy::service_no_stream(dev) {
            error!(device = dev.name(), %err, "no-stream fill failed");
        }
    }

    let ready = dev
        .dev_streams()
        .iter()
        .any(|ds| streams.get(ds.stream_id()).map(|s| s.slots_frames() > 0).unwrap_or(false));

    if !ready {
        return;
    }

    if let Err(err) = dev.leave_no_stream_run() {
        error!(device = dev.name(), %err, "failed leaving no-stream-run");
        return;
    }

    if dev.direction().uses_output_hw() {
        if let Err(err) = policy::pre_roll(dev) {
            error!(device = dev.name(), %err, "pre-roll failed");
        }
    }

    debug!(device = dev.name(), "leaving NO_STREAM_RUN, stream has data");
}

fn close_timed_out_devices(devices: &mut DeviceRegistry, event_tx: &Sender<Event>) {
    let timed_out: Vec<DeviceIndex> = devices
        .indices()
        .into_iter()
        .filter(|index| devices.get_mut(*index).map(|d| d.idle_timed_out()).unwrap_or(false))
        .collect();

    for index in timed_out {
        if let Some(mut dev) = devices.remove(index) {
            if let Err(err) = dev.close() {
                warn!(%err, "error closing idle-timed-out device");
            }
            let _ = event_tx.send(Event::DeviceStateChanged {
                device: index,
                state: DeviceState::Close,
            });
        }
    }
}

fn service_pending_suspends(
    pending: &mut HashMap<DeviceIndex, Instant>,
    devices: &mut DeviceRegistry,
    event_tx: &Sender<Event>,
) {
    let now = Instant::now();
    let due: Vec<DeviceIndex> = pending
        .iter()
        .filter(|(_, deadline)| **deadline <= now)
        .map(|(index, _)| *index)
        .collect();

    for index in due {
        pending.remove(&index);
        if let Some(mut dev) = devices.remove(index) {
            if let Err(err) = dev.close() {
                warn!(%err, "error closing device on scheduled suspend");
            }
            let _ = event_tx.send(Event::DeviceStateChanged {
                device: index,
                state: DeviceState::Close,
            });
        }
    }
}

fn handle_command(
    command: Command,
    devices: &mut DeviceRegistry,
    streams: &mut StreamRegistry,
    event_tx: &Sender<Event>,
    pending_suspends: &mut HashMap<DeviceIndex, Instant>,
    config: &EngineConfig,
) {
    match command {
        Command::AddDevice {
            backend,
            direction,
            format,
            reply,
        } => {
            let index = devices.insert(|index| IoDev::new(index, direction, backend, &config.device));
            match open_device(devices, index, format) {
                Ok(()) => {
                    if let Some(dev) = devices.get_mut(index) {
                        let _ = event_tx.send(Event::DeviceStateChanged {
                            device: index,
                            state: dev.state(),
                        });
                    }
                    let _ = reply.send(Ok(index));
                }
                Err(err) => {
                    devices.remove(index);
                    let _ = reply.send(Err(err.to_string()));
                }
            }
        }
        Command::RemoveDevice { device, reply } => {
            pending_suspends.remove(&device);
            match devices.remove(device) {
                Some(mut dev) => {
                    if let Err(err) = dev.close() {
                        warn!(%err, "error closing device on remove");
                    }
                    let _ = reply.send(Ok(()));
                }
                None => {
                    let _ = reply.send(Err(format!("unknown device {device}")));
                }
            }
        }
        Command::AddStream {
            stream,
            devices: targets,
            reply,
        } => {
            handle_add_stream(stream, targets, devices, streams, reply);
        }
        Command::RemoveStream { stream_id, reply } => {
            for (_, dev) in devices.iter_mut() {
                dev.detach(stream_id);
            }
            streams.remove(stream_id);
            let _ = reply.send(Ok(()));
        }
        Command::SwitchProfile {
            device,
            enable_dev,
            reply,
        } => {
            let result = switch_profile(devices, device, enable_dev);
            let _ = reply.send(result);
        }
        Command::ResetDevice { device, reply } => {
            let result = reset_device(devices, device);
            let _ = reply.send(result);
        }
        Command::ScheduleSuspend { device, delay_ms } => {
            pending_suspends.insert(device, Instant::now() + Duration::from_millis(delay_ms as u64));
        }
        Command::CancelSuspend { device } => {
            pending_suspends.remove(&device);
        }
        Command::DumpDebug { reply } => {
            let dump = format!(
                "devices={} streams={} pending_suspends={}",
                devices.len(),
                streams.len(),
                pending_suspends.len()
            );
            let _ = reply.send(dump);
        }
        Command::Shutdown => {}
    }
}

fn open_device(
    devices: &mut DeviceRegistry,
    index: DeviceIndex,
    format: DeviceFormat,
) -> Result<(), PlatformError> {
    let dev = devices
        .get_mut(index)
        .ok_or_else(|| PlatformError::DeviceNotFound(index.to_string()))?;
    dev.open(format)?;
    if dev.backend_mut().supports_start() {
        dev.start()
    } else {
        dev.enter_no_stream_run()
    }
}

/// §4.7 step 3: close and reopen `device` at its last negotiated format,
/// resetting the per-device state (`IoDev::open` clears the rate estimator,
/// underrun counters and no-stream tracking) without touching its attached
/// `dev_stream`s, which `close`/`open` never reach.
fn reset_device(devices: &mut DeviceRegistry, device: DeviceIndex) -> Result<(), String> {
    let run = || -> Result<(), PlatformError> {
        let dev = devices
            .get_mut(device)
            .ok_or_else(|| PlatformError::DeviceNotFound(device.to_string()))?;
        let format = dev
            .format()
            .ok_or_else(|| PlatformError::Internal("device has no negotiated format to reopen with".into()))?;
        dev.close()?;
        dev.open(format)?;
        if dev.backend_mut().supports_start() {
            dev.start()?;
        } else {
            dev.enter_no_stream_run()?;
        }
        Ok(())
    };
    run().map_err(|e| e.to_string())
}

fn switch_profile(devices: &mut DeviceRegistry, device: DeviceIndex, enable_dev: bool) -> Result<(), String> {
    let run = || -> Result<(), PlatformError> {
        let dev = devices
            .get_mut(device)
            .ok_or_else(|| PlatformError::DeviceNotFound(device.to_string()))?;
        let previous_format = dev.format();
        dev.close()?;
        if enable_dev {
            if let Some(format) = previous_format {
                dev.open(format)?;
                if dev.backend_mut().supports_start() {
                    dev.start()?;
                } else {
                    dev.enter_no_stream_run()?;
                }
            }
        }
        Ok(())
    };
    run().map_err(|e| e.to_string())
}

fn handle_add_stream(
    stream: Stream,
    targets: Vec<DeviceIndex>,
    devices: &mut DeviceRegistry,
    streams: &mut StreamRegistry,
    reply: Sender<Result<(), String>>,
) {
    let mut attachments: Vec<(DeviceIndex, DevStream)> = Vec::with_capacity(targets.len());

    for target in &targets {
        let Some(dev) = devices.get_mut(*target) else {
            let _ = reply.send(Err(format!("unknown device {target}")));
            return;
        };
        let Some(format) = dev.format() else {
            let _ = reply.send(Err(format!("device {target} is not open")));
            return;
        };
        let device_format = audio_format_from_device(format);
        let join_offset = dev.join_offset();
        match DevStream::attach(&stream, &device_format, dev.buffer_size_frames() as usize, join_offset) {
            Ok(dev_stream) => attachments.push((*target, dev_stream)),
            Err(err) => {
                let _ = reply.send(Err(err.to_string()));
                return;
            }
        }
    }

    let stream_id = stream.id();
    streams.insert(stream);
    for (target, dev_stream) in attachments {
        if let Some(dev) = devices.get_mut(target) {
            dev.attach(dev_stream);
        }
    }
    debug!(stream = %stream_id, devices = targets.len(), "stream attached");
    let _ = reply.send(Ok(()));
}

fn audio_format_from_device(format: DeviceFormat) -> AudioFormat {
    let layout = if format.channels <= 1 {
        ChannelLayout::mono()
    } else {
        ChannelLayout::stereo()
    };
    AudioFormat::new(format.sample_format, format.rate, layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_starts_and_shuts_down_cleanly() {
        let engine = AudioThreadEngine::new().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(engine.is_running());
        engine.shutdown().unwrap();
    }

    #[test]
    fn dump_debug_reports_empty_registries_on_a_fresh_engine() {
        let engine = AudioThreadEngine::new().unwrap();
        let dump = engine.dump_debug().unwrap();
        assert!(dump.contains("devices=0"));
        assert!(dump.contains("streams=0"));
        engine.shutdown().unwrap();
    }

    #[test]
    fn removing_an_unknown_device_is_rejected() {
        let engine = AudioThreadEngine::new().unwrap();
        let err = engine.remove_device(DeviceIndex(99)).unwrap_err();
        assert!(matches!(err, EngineError::PolicyRejected(_)));
        engine.shutdown().unwrap();
    }

    #[test]
    fn resetting_an_unknown_device_is_rejected() {
        let engine = AudioThreadEngine::new().unwrap();
        let err = engine.reset_device(DeviceIndex(99)).unwrap_err();
        assert!(matches!(err, EngineError::PolicyRejected(_)));
        engine.shutdown().unwrap();
    }

    #[test]
    fn reset_device_reopens_at_the_same_format_and_stays_running() {
        use audiosrv_platform::{Direction as BackendDirection, SampleFormat as BackendSampleFormat, TestIoDevBackend};

        let engine = AudioThreadEngine::new().unwrap();
        let backend = TestIoDevBackend::new("spk", BackendDirection::Output, 2).with_start();
        let handle = backend.handle();
        let format = DeviceFormat {
            sample_format: BackendSampleFormat::F32Le,
            rate: 48_000,
            channels: 2,
        };
        let device = engine
            .add_device(Box::new(backend), Direction::Output, format)
            .unwrap();

        assert!(handle.is_open());
        engine.reset_device(device).unwrap();
        assert!(handle.is_open(), "device should be reopened, not left closed");

        engine.shutdown().unwrap();
    }
}
