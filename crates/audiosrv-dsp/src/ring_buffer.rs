//! Shared single-producer/single-consumer frame buffer
//!
//! This is the in-process stand-in for the shared-memory ring a client and
//! the realtime thread exchange frames through. The wire header fields
//! (`write_offset[2]`, `read_offset[2]`, `used_size`, `frame_bytes`,
//! `config_version`) are modeled explicitly so the rest of the engine can
//! reason about offsets the way the external protocol describes them, even
//! though the actual lock-free transfer is delegated to `rtrb`.

use rtrb::{Consumer, Producer, RingBuffer as Rtrb};

use crate::error::DspError;

/// Cache-line-shaped header mirroring the external shared-memory ring
/// layout. `write_offset`/`read_offset` are double-buffered so a reader can
/// always observe a torn-free pair by picking whichever index was not being
/// written when it last swapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct RingBufferHeader {
    pub write_offset: [u64; 2],
    pub read_offset: [u64; 2],
    pub used_size: u32,
    pub frame_bytes: u32,
    pub config_version: u32,
    write_index: u8,
    read_index: u8,
}

impl RingBufferHeader {
    pub fn new(used_size: u32, frame_bytes: u32) -> Self {
        Self {
            used_size,
            frame_bytes,
            ..Default::default()
        }
    }

    /// Publish a new write offset, flipping to the other half of the
    /// double buffer so a racing reader never observes a half-updated pair.
    pub fn publish_write(&mut self, offset: u64) {
        let next = 1 - self.write_index;
        self.write_offset[next as usize] = offset;
        self.write_index = next;
    }

    /// Mirror of `publish_write` for the consumer side.
    pub fn publish_read(&mut self, offset: u64) {
        let next = 1 - self.read_index;
        self.read_offset[next as usize] = offset;
        self.read_index = next;
    }

    pub fn current_write_offset(&self) -> u64 {
        self.write_offset[self.write_index as usize]
    }

    pub fn current_read_offset(&self) -> u64 {
        self.read_offset[self.read_index as usize]
    }

    pub fn bump_config_version(&mut self) {
        self.config_version = self.config_version.wrapping_add(1);
    }
}

/// Frame-oriented SPSC ring buffer. Each element is one interleaved frame
/// worth of `f32` samples; `channels` says how many samples make up a frame.
pub struct FrameRingBuffer {
    header: RingBufferHeader,
    channels: usize,
}

pub struct FrameRingProducer {
    inner: Producer<f32>,
    channels: usize,
    frames_written: u64,
}

pub struct FrameRingConsumer {
    inner: Consumer<f32>,
    channels: usize,
    frames_read: u64,
}

impl FrameRingBuffer {
    /// Construct a ring buffer large enough to hold `capacity_frames` frames
    /// of `channels`-channel interleaved `f32` audio, returning the split
    /// producer/consumer halves.
    pub fn new(
        capacity_frames: usize,
        channels: usize,
    ) -> Result<(FrameRingProducer, FrameRingConsumer), DspError> {
        if channels == 0 {
            return Err(DspError::BufferSizeMismatch {
                expected: 1,
                got: 0,
            });
        }
        let header = RingBufferHeader::new(
            (capacity_frames * channels * std::mem::size_of::<f32>()) as u32,
            (channels * std::mem::size_of::<f32>()) as u32,
        );
        let (producer, consumer) = Rtrb::<f32>::new(capacity_frames * channels);
        let _ = header; // header lives with the owner of the pair, not inside rtrb
        Ok((
            FrameRingProducer {
                inner: producer,
                channels,
                frames_written: 0,
            },
            FrameRingConsumer {
                inner: consumer,
                channels,
                frames_read: 0,
            },
        ))
    }
}

impl FrameRingProducer {
    /// Write up to `frames.len() / channels` frames from an interleaved
    /// buffer, returning the number of whole frames actually written.
    ///
    /// # Real-time safety
    /// No allocation; bounded by `frames.len()`.
    pub fn write_interleaved(&mut self, frames: &[f32]) -> usize {
        let sample_count = frames.len() - (frames.len() % self.channels);
        let Ok(mut chunk) = self.inner.write_chunk_uninit(sample_count) else {
            return self.write_interleaved_partial(frames);
        };
        let (first, second) = chunk.as_mut_slices();
        for (slot, value) in first.iter_mut().chain(second.iter_mut()).zip(frames.iter()) {
            slot.write(*value);
        }
        // SAFETY: every slot in `first`/`second` was just initialized above.
        unsafe { chunk.commit_all() };
        let frames_written = sample_count / self.channels;
        self.frames_written += frames_written as u64;
        frames_written
    }

    fn write_interleaved_partial(&mut self, frames: &[f32]) -> usize {
        let available = self.inner.slots() - (self.inner.slots() % self.channels);
        if available == 0 {
            return 0;
        }
        let sample_count = available.min(frames.len() - (frames.len() % self.channels));
        let Ok(mut chunk) = self.inner.write_chunk_uninit(sample_count) else {
            return 0;
        };
        let (first, second) = chunk.as_mut_slices();
        for (slot, value) in first.iter_mut().chain(second.iter_mut()).zip(frames.iter()) {
            slot.write(*value);
        }
        unsafe { chunk.commit_all() };
        let frames_written = sample_count / self.channels;
        self.frames_written += frames_written as u64;
        frames_written
    }

    /// Frames of room left to accept.
    pub fn slots_frames(&self) -> usize {
        self.inner.slots() / self.channels
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameRingConsumer {
    /// Read up to `out.len() / channels` frames into an interleaved buffer,
    /// returning the number of whole frames actually read. Unfilled tail
    /// frames are left untouched; callers fill silence themselves so the
    /// underrun path stays visible to the caller.
    pub fn read_interleaved(&mut self, out: &mut [f32]) -> usize {
        let wanted = (out.len() - (out.len() % self.channels)).min(
            self.inner.slots() - (self.inner.slots() % self.channels),
        );
        if wanted == 0 {
            return 0;
        }
        let Ok(chunk) = self.inner.read_chunk(wanted) else {
            return 0;
        };
        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..first.len() + second.len()].copy_from_slice(second);
        chunk.commit_all();
        let frames_read = wanted / self.channels;
        self.frames_read += frames_read as u64;
        frames_read
    }

    /// Frames currently available to read.
    pub fn slots_frames(&self) -> usize {
        self.inner.slots() / self.channels
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_whole_frames() {
        let (mut producer, mut consumer) = FrameRingBuffer::new(16, 2).unwrap();
        let input = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let written = producer.write_interleaved(&input);
        assert_eq!(written, 3);

        let mut out = [0.0f32; 6];
        let read = consumer.read_interleaved(&mut out);
        assert_eq!(read, 3);
        assert_eq!(out, input);
    }

    #[test]
    fn rejects_zero_channels() {
        assert!(FrameRingBuffer::new(16, 0).is_err());
    }

    #[test]
    fn reports_available_slots() {
        let (mut producer, consumer) = FrameRingBuffer::new(4, 2).unwrap();
        assert_eq!(producer.slots_frames(), 4);
        producer.write_interleaved(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(consumer.slots_frames(), 2);
    }

    #[test]
    fn partial_write_stops_at_capacity() {
        let (mut producer, _consumer) = FrameRingBuffer::new(2, 2).unwrap();
        let input = vec![0.1f32; 12]; // 6 frames, only room for 2
        let written = producer.write_interleaved(&input);
        assert_eq!(written, 2);
    }

    #[test]
    fn header_double_buffers_offsets() {
        let mut header = RingBufferHeader::new(1024, 8);
        header.publish_write(100);
        assert_eq!(header.current_write_offset(), 100);
        header.publish_write(200);
        assert_eq!(header.current_write_offset(), 200);
        // both slots get used across publishes, never left stale mid-update
        assert!(header.write_offset.contains(&100) || header.write_offset.contains(&200));
    }

    #[test]
    fn config_version_wraps_without_panicking() {
        let mut header = RingBufferHeader::new(1024, 8);
        header.config_version = u32::MAX;
        header.bump_config_version();
        assert_eq!(header.config_version, 0);
    }
}
