//! audiosrvd — the audiosrv daemon binary
//!
//! Bootstraps logging, loads configuration, constructs the default output
//! and input devices against the `cpal` back-end, starts the realtime audio
//! thread, and runs the control thread's loop: nothing but the parts of
//! spec.md §5's two-thread model this crate owns. Client IPC (accepting
//! connections, parsing `CONNECT_STREAM`/`DISCONNECT_STREAM` requests) is
//! out of scope (spec.md §1) — this binary exists so the workspace has a
//! runnable entry point, the way the original's `cras_server.c` wires up
//! its device list and audio thread before entering its own `poll()` loop.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use audiosrv_core::{AudioThreadEngine, Direction, EngineConfig};
use audiosrv_platform::{CpalIoDevBackend, DeviceFormat, Direction as BackendDirection, SampleFormat};

#[derive(Parser, Debug)]
#[command(name = "audiosrvd", about = "audiosrv realtime mixing/demuxing daemon")]
struct Args {
    /// Path to a TOML configuration file overriding the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the low-latency configuration preset instead of the default.
    #[arg(long, conflicts_with = "config")]
    low_latency: bool,

    /// Skip opening the default output device (useful when running
    /// headless, e.g. in CI, where no playback device is present).
    #[arg(long)]
    no_output: bool,

    /// Skip opening the default input device.
    #[arg(long)]
    no_input: bool,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    info!(
        buffer_frames = config.device.buffer_size_frames,
        min_buffer_level = config.device.min_buffer_level_frames,
        "starting audio thread engine"
    );

    let engine = match AudioThreadEngine::with_config(config.clone()) {
        Ok(engine) => engine,
        Err(err) => {
            error!(%err, "failed to start audio thread engine");
            std::process::exit(1);
        }
    };

    if !args.no_output {
        if let Err(err) = open_default_device(&engine, &config, Direction::Output) {
            warn!(%err, "no default output device opened");
        }
    }

    if !args.no_input {
        if let Err(err) = open_default_device(&engine, &config, Direction::Input) {
            warn!(%err, "no default input device opened");
        }
    }

    run_control_loop(&engine);

    if let Err(err) = engine.shutdown() {
        error!(%err, "audio thread did not shut down cleanly");
    }
}

fn load_config(args: &Args) -> Result<EngineConfig, String> {
    if let Some(path) = &args.config {
        let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        return EngineConfig::load_from_toml(&contents);
    }
    if args.low_latency {
        return Ok(EngineConfig::low_latency());
    }
    Ok(EngineConfig::default())
}

/// Build a `CpalIoDevBackend` for the host's default device in `direction`
/// and hand it to the engine via `ADD_DEV`.
fn open_default_device(
    engine: &AudioThreadEngine,
    config: &EngineConfig,
    direction: Direction,
) -> Result<(), String> {
    let host = cpal::default_host();
    let (device, backend_direction) = match direction {
        Direction::Output => (
            host.default_output_device().ok_or("no default output device")?,
            BackendDirection::Output,
        ),
        Direction::Input => (
            host.default_input_device().ok_or("no default input device")?,
            BackendDirection::Input,
        ),
        _ => return Err("only output/input directions open a hardware device".into()),
    };

    let name = device.name().unwrap_or_else(|_| "unknown".into());
    let backend = Box::new(CpalIoDevBackend::new(device, backend_direction));
    let format = DeviceFormat {
        sample_format: SampleFormat::F32Le,
        rate: config.stream.sample_rate,
        channels: config.stream.channels,
    };

    let index = engine
        .add_device(backend, direction, format)
        .map_err(|e| e.to_string())?;
    info!(%index, device = %name, ?direction, "device opened");
    Ok(())
}

/// The control thread's own loop (spec.md §5): for this minimal daemon,
/// with no client IPC listener to poll, that reduces to draining events the
/// realtime thread posts and waiting for a shutdown signal.
fn run_control_loop(engine: &AudioThreadEngine) {
    info!("control thread running, press Ctrl-C to stop");

    let running = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let running_handler = running.clone();
    if ctrlc::set_handler(move || {
        running_handler.store(false, std::sync::atomic::Ordering::Release);
    })
    .is_err()
    {
        warn!("failed to install Ctrl-C handler; daemon must be killed to stop");
    }

    while running.load(std::sync::atomic::Ordering::Acquire) {
        while let Some(event) = engine.try_recv_event() {
            handle_event(engine, event);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// §4.7 step 3: on a reset request the control thread closes and reopens
/// the device, preserving stream attachments — `AudioThreadEngine::reset_device`
/// does exactly that on the realtime thread and acks back here.
fn handle_event(engine: &AudioThreadEngine, event: audiosrv_core::Event) {
    match event {
        audiosrv_core::Event::DeviceStateChanged { device, state } => {
            info!(%device, ?state, "device state changed");
        }
        audiosrv_core::Event::ResetRequested { device } => {
            warn!(%device, "severe underrun reported, resetting device");
            if let Err(err) = engine.reset_device(device) {
                error!(%device, %err, "device reset failed");
            }
        }
    }
}

