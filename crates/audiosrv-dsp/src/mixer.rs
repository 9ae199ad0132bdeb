//! Mix-add and scalar volume kernels
//!
//! These are the innermost per-sample kernels of the playback cycle: mixing
//! each contributing stream into the device's shared area with saturation,
//! and scaling a buffer by a software volume factor. Both are O(n) with no
//! allocation, safe to call from the realtime thread.

/// Mix `source` into `dest` in place with saturating addition, in the
/// integer domain the area's format implies. `f32` samples here are assumed
/// to already be normalized to `[-1.0, 1.0]`; saturation clamps to that
/// range the same way a fixed-point mixer would clamp to its integer range.
#[inline]
pub fn mix_add(dest: &mut [f32], source: &[f32]) {
    debug_assert_eq!(dest.len(), source.len(), "mix_add requires equal-length buffers");
    for (d, s) in dest.iter_mut().zip(source.iter()) {
        *d = (*d + *s).clamp(-1.0, 1.0);
    }
}

/// Scale a buffer by a linear volume factor. A factor of exactly `1.0` is a
/// no-op fast path so volume idempotence (scaler 1.0 == no scaler) holds
/// byte-for-byte, not just numerically.
#[inline]
pub fn scale_volume(buffer: &mut [f32], volume: f32) {
    if volume == 1.0 {
        return;
    }
    for sample in buffer.iter_mut() {
        *sample *= volume;
    }
}

/// Force a buffer to silence. Used for the no-stream filler and for the
/// system-mute dominance rule (mute always wins, regardless of content).
#[inline]
pub fn fill_silence(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

/// Mix one stream's contribution directly with a per-stream gain applied
/// before the add, avoiding an extra pass over the buffer.
#[inline]
pub fn mix_add_scaled(dest: &mut [f32], source: &[f32], gain: f32) {
    debug_assert_eq!(
        dest.len(),
        source.len(),
        "mix_add_scaled requires equal-length buffers"
    );
    if gain == 1.0 {
        mix_add(dest, source);
        return;
    }
    for (d, s) in dest.iter_mut().zip(source.iter()) {
        *d = (*d + *s * gain).clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_add_sums_without_clipping() {
        let mut dest = vec![0.1, 0.2, 0.3];
        let source = vec![0.1, 0.1, 0.1];
        mix_add(&mut dest, &source);
        assert_eq!(dest, vec![0.2, 0.3, 0.4]);
    }

    #[test]
    fn mix_add_clamps_to_unit_range() {
        let mut dest = vec![0.9, -0.9];
        let source = vec![0.5, -0.5];
        mix_add(&mut dest, &source);
        assert_eq!(dest, vec![1.0, -1.0]);
    }

    #[test]
    fn scale_volume_is_identity_at_unity() {
        let mut buffer = vec![0.3, -0.7, 1.0];
        let original = buffer.clone();
        scale_volume(&mut buffer, 1.0);
        assert_eq!(buffer, original, "volume 1.0 must be byte-identical to no scaling");
    }

    #[test]
    fn scale_volume_scales_linearly() {
        let mut buffer = vec![0.5, -0.5];
        scale_volume(&mut buffer, 0.5);
        assert_eq!(buffer, vec![0.25, -0.25]);
    }

    #[test]
    fn fill_silence_zeroes_regardless_of_content() {
        let mut buffer = vec![1.0, -1.0, 0.3];
        fill_silence(&mut buffer);
        assert_eq!(buffer, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn mix_add_scaled_matches_scale_then_add() {
        let mut a = vec![0.2, 0.2];
        let mut b = vec![0.2, 0.2];
        let source = vec![0.4, 0.4];

        mix_add_scaled(&mut a, &source, 0.5);

        let mut scaled_source = source.clone();
        scale_volume(&mut scaled_source, 0.5);
        mix_add(&mut b, &scaled_source);

        assert_eq!(a, b);
    }
}
