//! PCM decoding: little-endian signed 16-bit mono to normalized f32.

use crate::error::StreamError;

/// Scale factor between i16 sample values and normalized floats.
const I16_SCALE: f32 = 32768.0;

/// Decode a raw LE i16 mono payload into normalized samples in [-1.0, 1.0).
///
/// Stateless 1:1 transform; no resampling, no channel mixing. An odd byte
/// count means a torn frame and is rejected.
pub fn decode_i16_le(payload: &[u8]) -> Result<Vec<f32>, StreamError> {
    if payload.len() % 2 != 0 {
        return Err(StreamError::OddPcmLength(payload.len()));
    }
    let samples = payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / I16_SCALE)
        .collect();
    Ok(samples)
}
