//! Client-visible stream object (spec.md §3)
//!
//! A `Stream` is the control thread's view of one client connection: its
//! negotiated format, its callback threshold and buffer sizing, its effect
//! flags, and the producer/consumer half of the shared ring it exchanges
//! frames through with the realtime thread. The realtime thread only ever
//! touches a stream through a [`crate::dev_stream::DevStream`] adapter that
//! borrows a reference to it; the `Stream` itself is owned by the
//! [`crate::registry::StreamRegistry`] (Design Notes: single-owner registry
//! replacing the original's intrusive linked list of streams).
//!
//! The shared ring is built on `audiosrv_dsp`'s `FrameRingBuffer`, the same
//! lock-free SPSC ring the original shared-memory protocol's offset pair
//! describes; here it lives in-process rather than across a memfd, since
//! client IPC is out of scope.

use audiosrv_dsp::{FrameRingBuffer, FrameRingConsumer, FrameRingProducer};

use crate::format::{AudioFormat, ClientCredential, Direction};
use crate::ids::StreamId;

/// A connected client's stream, as seen by the control thread.
pub struct Stream {
    id: StreamId,
    direction: Direction,
    format: AudioFormat,
    /// Frames exchanged per client wake (`cb_threshold`, §3).
    callback_threshold: u32,
    /// Frames in the shared ring (§3).
    buffer_frames: u32,
    effects: crate::format::StreamEffects,
    credential: ClientCredential,
    /// Consumer half for output streams, `None` for input/loopback streams
    /// (those instead hold a [`FrameRingProducer`] the client reads from).
    consumer: Option<FrameRingConsumer>,
    producer: Option<FrameRingProducer>,
    /// Total frames the realtime thread has ever pulled from (output) or
    /// pushed into (input) this stream's ring, for rate-estimation input.
    frames_transferred: u64,
}

impl Stream {
    /// Construct an output stream: the engine pulls frames from the
    /// returned [`FrameRingConsumer`]; the client-facing [`FrameRingProducer`]
    /// is handed back to the caller to wire to the (out-of-scope) client
    /// IPC transport.
    pub fn new_output(
        id: StreamId,
        format: AudioFormat,
        callback_threshold: u32,
        buffer_frames: u32,
        effects: crate::format::StreamEffects,
        credential: ClientCredential,
    ) -> Result<(Self, FrameRingProducer), String> {
        let channels = format.channels() as usize;
        let (producer, consumer) = FrameRingBuffer::new(buffer_frames as usize, channels)
            .map_err(|e| e.to_string())?;
        Ok((
            Self {
                id,
                direction: Direction::Output,
                format,
                callback_threshold,
                buffer_frames,
                effects,
                credential,
                consumer: Some(consumer),
                producer: None,
                frames_transferred: 0,
            },
            producer,
        ))
    }

    /// Construct an input stream: the engine pushes captured frames into the
    /// returned [`FrameRingProducer`]; the client-facing [`FrameRingConsumer`]
    /// is handed back to the caller.
    pub fn new_input(
        id: StreamId,
        format: AudioFormat,
        callback_threshold: u32,
        buffer_frames: u32,
        effects: crate::format::StreamEffects,
        credential: ClientCredential,
    ) -> Result<(Self, FrameRingConsumer), String> {
        let channels = format.channels() as usize;
        let (producer, consumer) = FrameRingBuffer::new(buffer_frames as usize, channels)
            .map_err(|e| e.to_string())?;
        Ok((
            Self {
                id,
                direction: Direction::Input,
                format,
                callback_threshold,
                buffer_frames,
                effects,
                credential,
                consumer: None,
                producer: Some(producer),
                frames_transferred: 0,
            },
            consumer,
        ))
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn callback_threshold(&self) -> u32 {
        self.callback_threshold
    }

    pub fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    pub fn effects(&self) -> crate::format::StreamEffects {
        self.effects
    }

    pub fn credential(&self) -> ClientCredential {
        self.credential
    }

    pub fn frames_transferred(&self) -> u64 {
        self.frames_transferred
    }

    /// Pull up to `out.len() / channels` frames for an output stream's
    /// device-side consumer. Realtime-thread-safe: no allocation, bounded by
    /// ring occupancy.
    pub fn pull_output(&mut self, out: &mut [f32]) -> usize {
        let read = self
            .consumer
            .as_mut()
            .map(|c| c.read_interleaved(out))
            .unwrap_or(0);
        self.frames_transferred += read as u64;
        read
    }

    /// Push up to `frames.len() / channels` captured frames into an input
    /// stream's device-side producer.
    pub fn push_input(&mut self, frames: &[f32]) -> usize {
        let written = self
            .producer
            .as_mut()
            .map(|p| p.write_interleaved(frames))
            .unwrap_or(0);
        self.frames_transferred += written as u64;
        written
    }

    /// Frames currently queued for an output stream's consumer to drain, or
    /// room available in an input stream's producer.
    pub fn slots_frames(&self) -> usize {
        match (&self.consumer, &self.producer) {
            (Some(c), _) => c.slots_frames(),
            (_, Some(p)) => p.slots_frames(),
            _ => 0,
        }
    }
}
