//! Per-(stream, device) attachment adapter (spec.md §3, §4.9)
//!
//! A `DevStream` is created when a stream attaches to a device and destroyed
//! on detach. It owns the sample-format/channel/rate converter chain for
//! that one attachment and the timing bookkeeping the engine uses to detect
//! a stream that has stopped keeping up. It does not own the [`crate::stream::Stream`]
//! it serves — that stays in the stream registry; a `DevStream` only holds
//! the stream's id and the handful of fields copied at attach time that the
//! spec treats as immutable for the attachment's lifetime (direction,
//! callback threshold, negotiated format).
//!
//! Grounded on the conversion chain in `audiosrv_dsp::format_converter`
//! (sample format -> `f32` -> channels -> rate) and on §4.8's directive that
//! the rate-converter ratio is re-slewed every cycle from the device's rate
//! estimator rather than fixed at attach time.

use std::time::{Duration, Instant};

use audiosrv_dsp::{convert_channels, mixer, DspError, RateConverter};

use crate::format::{AudioFormat, Direction};
use crate::ids::StreamId;
use crate::stream::Stream;

/// Timing stats the engine consults to flag a lagging client (missed
/// callback detection, §3's "longest fetch latency").
#[derive(Debug, Clone, Copy, Default)]
pub struct DevStreamTiming {
    pub last_fetch: Option<Instant>,
    pub longest_fetch_latency: Duration,
    pub missed_callbacks: u64,
}

impl DevStreamTiming {
    fn record_fetch(&mut self, now: Instant) {
        if let Some(last) = self.last_fetch {
            let latency = now.duration_since(last);
            if latency > self.longest_fetch_latency {
                self.longest_fetch_latency = latency;
            }
        }
        self.last_fetch = Some(now);
    }
}

/// One stream's attachment to one device.
pub struct DevStream {
    stream_id: StreamId,
    direction: Direction,
    callback_threshold: u32,
    stream_format: AudioFormat,
    /// Rate converter, present only when the stream and device rates
    /// differ. Buffers input internally up to the resampler's fixed chunk
    /// size before producing output.
    rate_converter: Option<RateConverter>,
    pending_input: Vec<f32>,
    pending_output: Vec<f32>,
    device_channels: u16,
    /// Cumulative device-side frames this attachment has produced
    /// (playback) or consumed (capture), used for the join-offset
    /// computation on a later attach (§4.9).
    device_offset: u64,
    timing: DevStreamTiming,
    /// Per-stream gain applied post-DSP during capture demux (§4.4). Output
    /// attachments leave this at unity; the device-wide system volume is
    /// what scales the playback mix instead.
    capture_gain: f32,
}

impl DevStream {
    /// Attach `stream` to a device transferring at `device_format`.
    /// `chunk_size` is the device's buffer size in frames, the resampler's
    /// fixed input chunk when a rate conversion is needed.
    pub fn attach(
        stream: &Stream,
        device_format: &AudioFormat,
        chunk_size: usize,
        join_offset: u64,
    ) -> Result<Self, DspError> {
        let stream_format = stream.format().clone();
        let device_channels = device_format.channels();
        let rate_converter = if stream_format.rate != device_format.rate {
            let (from_rate, to_rate) = match stream.direction() {
                Direction::Output => (stream_format.rate, device_format.rate),
                _ => (device_format.rate, stream_format.rate),
            };
            Some(RateConverter::new(
                from_rate,
                to_rate,
                device_channels as usize,
                chunk_size,
            )?)
        } else {
            None
        };

        Ok(Self {
            stream_id: stream.id(),
            direction: stream.direction(),
            callback_threshold: stream.callback_threshold(),
            stream_format,
            rate_converter,
            pending_input: Vec::new(),
            pending_output: Vec::new(),
            device_channels,
            device_offset: join_offset,
            timing: DevStreamTiming::default(),
            capture_gain: 1.0,
        })
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn capture_gain(&self) -> f32 {
        self.capture_gain
    }

    /// Set this attachment's per-stream capture gain (§4.4: applied
    /// post-DSP during demux, independent of the system output volume).
    pub fn set_capture_gain(&mut self, gain: f32) {
        self.capture_gain = gain;
    }

    pub fn callback_threshold(&self) -> u32 {
        self.callback_threshold
    }

    pub fn device_offset(&self) -> u64 {
        self.device_offset
    }

    pub fn timing(&self) -> DevStreamTiming {
        self.timing
    }

    /// Playback path: pull up to `frames_wanted` frames from `stream`'s
    /// ring, converted to the device's channel count and rate. Returns an
    /// interleaved buffer of however many device-format frames are ready;
    /// shorter than requested when the stream or the resampler doesn't
    /// have enough input buffered yet.
    pub fn pull_for_mix(&mut self, stream: &mut Stream, frames_wanted: u32) -> Vec<f32> {
        debug_assert_eq!(stream.id(), self.stream_id);
        self.timing.record_fetch(Instant::now());

        let stream_channels = self.stream_format.channels();
        let mut raw = vec![0.0f32; frames_wanted as usize * stream_channels as usize];
        let read = stream.pull_output(&mut raw);
        raw.truncate(read * stream_channels as usize);

        let channel_matched = match convert_channels(&raw, stream_channels, self.device_channels) {
            Ok(converted) => converted,
            Err(_) => return Vec::new(),
        };

        let output = self.resample(channel_matched);
        self.device_offset += (output.len() / self.device_channels.max(1) as usize) as u64;
        output
    }

    /// Capture path: push a block of device-format frames (already
    /// DSP-processed) into `stream`'s ring, converted down to the stream's
    /// negotiated channel count and rate and scaled by this attachment's
    /// per-stream gain (§4.4: applied post-DSP, independent of any
    /// device-wide output volume). Returns how many stream-format frames
    /// were accepted.
    pub fn push_from_demux(&mut self, stream: &mut Stream, device_frames: &[f32]) -> usize {
        debug_assert_eq!(stream.id(), self.stream_id);
        self.timing.record_fetch(Instant::now());

        let converted = self.resample(device_frames.to_vec());
        let stream_channels = self.stream_format.channels();
        let mut channel_matched = match convert_channels(&converted, self.device_channels, stream_channels) {
            Ok(v) => v,
            Err(_) => return 0,
        };
        mixer::scale_volume(&mut channel_matched, self.capture_gain);

        let written = stream.push_input(&channel_matched);
        self.device_offset += (device_frames.len() / self.device_channels.max(1) as usize) as u64;
        written
    }

    /// Re-slew the rate converter's ratio from a fresh rate-estimator
    /// reading (§4.8). No-op when this attachment needs no rate conversion.
    pub fn adjust_rate_ratio(&mut self, relative_ratio: f64) {
        if let Some(converter) = self.rate_converter.as_mut() {
            let _ = converter.adjust_ratio(relative_ratio);
        }
    }

    fn resample(&mut self, input: Vec<f32>) -> Vec<f32> {
        let Some(converter) = self.rate_converter.as_mut() else {
            return input;
        };

        self.pending_input.extend(input);
        let chunk_frames = converter.input_chunk_size();
        let chunk_samples = chunk_frames * self.device_channels as usize;

        while self.pending_input.len() >= chunk_samples {
            let chunk: Vec<f32> = self.pending_input.drain(..chunk_samples).collect();
            if let Ok(converted) = converter.process(&chunk) {
                self.pending_output.extend(converted);
            }
        }

        std::mem::take(&mut self.pending_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, ClientCredential, SampleFormat, StreamEffects};
    use crate::ids::ClientId;

    fn make_output_stream(rate: u32) -> Stream {
        let format = AudioFormat::new(SampleFormat::F32Le, rate, ChannelLayout::stereo());
        let (stream, _producer) = Stream::new_output(
            StreamId::new(ClientId(1), 0),
            format,
            240,
            480,
            StreamEffects::empty(),
            ClientCredential { pid: 1, uid: 1 },
        )
        .unwrap();
        stream
    }

    #[test]
    fn same_rate_attachment_has_no_converter() {
        let stream = make_output_stream(48_000);
        let device_format = AudioFormat::new(SampleFormat::F32Le, 48_000, ChannelLayout::stereo());
        let dev_stream = DevStream::attach(&stream, &device_format, 480, 0).unwrap();
        assert!(dev_stream.rate_converter.is_none());
    }

    #[test]
    fn differing_rate_attachment_builds_a_converter() {
        let stream = make_output_stream(44_100);
        let device_format = AudioFormat::new(SampleFormat::F32Le, 48_000, ChannelLayout::stereo());
        let dev_stream = DevStream::attach(&stream, &device_format, 480, 0).unwrap();
        assert!(dev_stream.rate_converter.is_some());
    }

    #[test]
    fn pull_for_mix_passes_through_when_rates_match() {
        let mut stream = make_output_stream(48_000);
        let device_format = AudioFormat::new(SampleFormat::F32Le, 48_000, ChannelLayout::stereo());
        let mut dev_stream = DevStream::attach(&stream, &device_format, 480, 0).unwrap();

        // Drive frames into the stream's ring via its own producer half.
        let (restream, mut producer) = Stream::new_output(
            stream.id(),
            AudioFormat::new(SampleFormat::F32Le, 48_000, ChannelLayout::stereo()),
            240,
            480,
            StreamEffects::empty(),
            ClientCredential { pid: 1, uid: 1 },
        )
        .unwrap();
        stream = restream;
        producer.write_interleaved(&[0.1, 0.2, 0.3, 0.4]);

        let out = dev_stream.pull_for_mix(&mut stream, 2);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(dev_stream.device_offset(), 2);
    }

    #[test]
    fn join_offset_seeds_device_offset() {
        let stream = make_output_stream(48_000);
        let device_format = AudioFormat::new(SampleFormat::F32Le, 48_000, ChannelLayout::stereo());
        let dev_stream = DevStream::attach(&stream, &device_format, 480, 1_000).unwrap();
        assert_eq!(dev_stream.device_offset(), 1_000);
    }

    fn make_input_stream(rate: u32) -> (Stream, audiosrv_dsp::FrameRingConsumer) {
        let format = AudioFormat::new(SampleFormat::F32Le, rate, ChannelLayout::stereo());
        Stream::new_input(
            StreamId::new(ClientId(1), 0),
            format,
            240,
            480,
            StreamEffects::empty(),
            ClientCredential { pid: 1, uid: 1 },
        )
        .unwrap()
    }

    #[test]
    fn capture_gain_defaults_to_unity() {
        let stream = make_input_stream(48_000).0;
        let device_format = AudioFormat::new(SampleFormat::F32Le, 48_000, ChannelLayout::stereo());
        let dev_stream = DevStream::attach(&stream, &device_format, 480, 0).unwrap();
        assert_eq!(dev_stream.capture_gain(), 1.0);
    }

    #[test]
    fn push_from_demux_scales_by_per_stream_capture_gain() {
        let (mut stream, mut consumer) = make_input_stream(48_000);
        let device_format = AudioFormat::new(SampleFormat::F32Le, 48_000, ChannelLayout::stereo());
        let mut dev_stream = DevStream::attach(&stream, &device_format, 480, 0).unwrap();
        dev_stream.set_capture_gain(0.5);

        let device_frames = [0.2f32, 0.4, 0.6, 0.8];
        let written = dev_stream.push_from_demux(&mut stream, &device_frames);
        assert_eq!(written, 2);

        let mut out = [0.0f32; 4];
        assert_eq!(consumer.read_interleaved(&mut out), 2);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);
    }
}
