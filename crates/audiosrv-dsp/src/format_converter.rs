//! Sample-format, rate, and channel-layout conversion
//!
//! Every `dev_stream` owns one of these chains to bridge a client's
//! negotiated format to the device's format before mixing (playback) or
//! after demux (capture). Three independent conversions compose:
//!
//! 1. sample format (`S16Le`/`S32Le`/`F32Le`) <-> internal `f32` working
//!    domain, normalized to `[-1.0, 1.0]`,
//! 2. channel count (mono/stereo up- and down-mix),
//! 3. sample rate, via `rubato`'s sinc resampler, whose ratio is re-slewed
//!    every cycle from the device's rate estimator (spec.md §4.8).

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::DspError;

/// Sample formats a client or device may negotiate. Mirrors the original's
/// `snd_pcm_format_t` subset actually used by the mixer path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    S16Le,
    S32Le,
    F32Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::S32Le => 4,
            SampleFormat::F32Le => 4,
        }
    }

    /// Decode one interleaved frame buffer of this format into normalized
    /// `f32` samples. Used on the way in from a client's ring buffer.
    pub fn decode(self, bytes: &[u8], out: &mut [f32]) {
        match self {
            SampleFormat::S16Le => {
                for (chunk, sample) in bytes.chunks_exact(2).zip(out.iter_mut()) {
                    let raw = i16::from_le_bytes([chunk[0], chunk[1]]);
                    *sample = raw as f32 / i16::MAX as f32;
                }
            }
            SampleFormat::S32Le => {
                for (chunk, sample) in bytes.chunks_exact(4).zip(out.iter_mut()) {
                    let raw = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    *sample = raw as f32 / i32::MAX as f32;
                }
            }
            SampleFormat::F32Le => {
                for (chunk, sample) in bytes.chunks_exact(4).zip(out.iter_mut()) {
                    *sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
        }
    }

    /// Encode normalized `f32` samples into this format's byte
    /// representation. Used on the way out to a device or a client ring.
    pub fn encode(self, samples: &[f32], out: &mut [u8]) {
        match self {
            SampleFormat::S16Le => {
                for (sample, chunk) in samples.iter().zip(out.chunks_exact_mut(2)) {
                    let raw = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    chunk.copy_from_slice(&raw.to_le_bytes());
                }
            }
            SampleFormat::S32Le => {
                for (sample, chunk) in samples.iter().zip(out.chunks_exact_mut(4)) {
                    let raw = (sample.clamp(-1.0, 1.0) * i32::MAX as f32) as i32;
                    chunk.copy_from_slice(&raw.to_le_bytes());
                }
            }
            SampleFormat::F32Le => {
                for (sample, chunk) in samples.iter().zip(out.chunks_exact_mut(4)) {
                    chunk.copy_from_slice(&sample.to_le_bytes());
                }
            }
        }
    }
}

/// Upmix/downmix interleaved frames between channel counts. Only mono and
/// stereo are modeled; anything else is a straight channel-count mismatch
/// error, since the engine never needs more exotic layouts internally (the
/// external negotiated layout is resolved to mono/stereo before it reaches
/// the mixer).
pub fn convert_channels(
    input: &[f32],
    in_channels: u16,
    out_channels: u16,
) -> Result<Vec<f32>, DspError> {
    if in_channels == out_channels {
        return Ok(input.to_vec());
    }
    match (in_channels, out_channels) {
        (1, 2) => Ok(input.iter().flat_map(|&s| [s, s]).collect()),
        (2, 1) => Ok(input
            .chunks_exact(2)
            .map(|f| (f[0] + f[1]) * 0.5)
            .collect()),
        _ => Err(DspError::UnsupportedConversion {
            from_rate: 0,
            from_channels: in_channels,
            to_rate: 0,
            to_channels: out_channels,
        }),
    }
}

/// Sinc-interpolated sample-rate converter for one stream's conversion
/// chain. The ratio is re-slewed every cycle from the owning device's
/// rate-estimator output so accumulated clock drift stays bounded (§4.8)
/// instead of being corrected in one audible jump.
pub struct RateConverter {
    resampler: SincFixedIn<f32>,
    channels: usize,
    chunk_size: usize,
}

impl RateConverter {
    pub fn new(from_rate: u32, to_rate: u32, channels: usize, chunk_size: usize) -> Result<Self, DspError> {
        let ratio = to_rate as f64 / from_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };
        let resampler = SincFixedIn::<f32>::new(ratio, 1.05, params, chunk_size, channels)
            .map_err(|e| DspError::ResamplerInit(e.to_string()))?;
        Ok(Self {
            resampler,
            channels,
            chunk_size,
        })
    }

    /// Re-slew the conversion ratio in response to a new rate-estimator
    /// reading. `relative_ratio` is `estimated_rate / nominal_rate` for the
    /// device side of the conversion.
    pub fn adjust_ratio(&mut self, relative_ratio: f64) -> Result<(), DspError> {
        self.resampler
            .set_resample_ratio_relative(relative_ratio, true)
            .map_err(|e| DspError::ResamplerInit(e.to_string()))
    }

    /// Convert one chunk of interleaved input frames (exactly `chunk_size`
    /// frames, per-channel de-interleaved internally) into resampled
    /// interleaved output frames.
    pub fn process(&mut self, interleaved_in: &[f32]) -> Result<Vec<f32>, DspError> {
        let frames_in = interleaved_in.len() / self.channels;
        debug_assert_eq!(frames_in, self.chunk_size);

        let mut deinterleaved: Vec<Vec<f32>> = vec![Vec::with_capacity(frames_in); self.channels];
        for frame in interleaved_in.chunks_exact(self.channels) {
            for (ch, sample) in frame.iter().enumerate() {
                deinterleaved[ch].push(*sample);
            }
        }

        let output = self
            .resampler
            .process(&deinterleaved, None)
            .map_err(|e| DspError::ResamplerInit(e.to_string()))?;

        let frames_out = output[0].len();
        let mut interleaved_out = vec![0.0f32; frames_out * self.channels];
        for (ch, channel_samples) in output.iter().enumerate() {
            for (i, sample) in channel_samples.iter().enumerate() {
                interleaved_out[i * self.channels + ch] = *sample;
            }
        }
        Ok(interleaved_out)
    }

    pub fn input_chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s16le_round_trips_through_f32() {
        let samples = [0.5f32, -0.5, 0.0, 1.0];
        let mut bytes = vec![0u8; samples.len() * 2];
        SampleFormat::S16Le.encode(&samples, &mut bytes);

        let mut decoded = vec![0.0f32; samples.len()];
        SampleFormat::S16Le.decode(&bytes, &mut decoded);

        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 0.001, "{a} vs {b}");
        }
    }

    #[test]
    fn f32le_round_trips_exactly() {
        let samples = [0.123f32, -0.456, 0.789];
        let mut bytes = vec![0u8; samples.len() * 4];
        SampleFormat::F32Le.encode(&samples, &mut bytes);

        let mut decoded = vec![0.0f32; samples.len()];
        SampleFormat::F32Le.decode(&bytes, &mut decoded);
        assert_eq!(samples.to_vec(), decoded);
    }

    #[test]
    fn mono_to_stereo_duplicates_samples() {
        let mono = vec![0.2, 0.4, 0.6];
        let stereo = convert_channels(&mono, 1, 2).unwrap();
        assert_eq!(stereo, vec![0.2, 0.2, 0.4, 0.4, 0.6, 0.6]);
    }

    #[test]
    fn stereo_to_mono_averages_channels() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5];
        let mono = convert_channels(&stereo, 2, 1).unwrap();
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn identical_channel_count_is_a_no_op_copy() {
        let stereo = vec![0.1, 0.2, 0.3, 0.4];
        let out = convert_channels(&stereo, 2, 2).unwrap();
        assert_eq!(out, stereo);
    }

    #[test]
    fn rate_converter_produces_output_at_new_rate() {
        let mut converter = RateConverter::new(44_100, 48_000, 2, 512).unwrap();
        let input = vec![0.0f32; 512 * 2];
        let output = converter.process(&input).unwrap();
        // Roughly rate-scaled length; sinc resamplers don't guarantee exact.
        assert!(output.len() > 0);
        assert_eq!(output.len() % 2, 0);
    }

    #[test]
    fn rate_converter_accepts_ratio_adjustment() {
        let mut converter = RateConverter::new(48_000, 48_000, 2, 256).unwrap();
        assert!(converter.adjust_ratio(1.0005).is_ok());
    }
}
