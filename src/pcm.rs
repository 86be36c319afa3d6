//! Float to 16-bit PCM conversion
//!
//! Samples are clipped to [-1.0, 1.0], scaled by `i16::MAX` and rounded, then
//! packed little-endian for the hardware buffer.

/// Clip and convert one sample
#[inline]
pub fn quantize(x: f32) -> i16 {
    (x.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Quantize `samples` into `out` as little-endian i16 pairs
///
/// `out` is cleared first and reuses its allocation across calls.
pub fn encode_pcm16(samples: &[f32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * 2);
    for &x in samples {
        out.extend_from_slice(&quantize(x).to_le_bytes());
    }
}

/// Inverse of [`encode_pcm16`] without the clipping, for backends and tests
pub fn decode_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
