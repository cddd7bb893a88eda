//! PCM16 payload decoding.

use base64::Engine;
use std::time::Duration;
use studio_core::error::AppError;
use uuid::Uuid;

/// Sample rate of synthesized speech.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

pub const DEFAULT_CHANNEL_COUNT: u16 = 1;

/// One decoded audio buffer, ready to play.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSession {
    pub id: Uuid,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Per-channel amplitudes in [-1.0, 1.0].
    pub channels: Vec<Vec<f32>>,
}

impl AudioSession {
    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Samples re-interleaved frame by frame, as output devices expect.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames() * self.channels.len());
        for frame in 0..self.frames() {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }
}

/// Decode a base64 PCM16 little-endian payload.
///
/// Sample `i` of channel `c` is raw sample `i * channel_count + c`.
pub fn decode(
    payload: &str,
    sample_rate: u32,
    channel_count: u16,
) -> Result<AudioSession, AppError> {
    if channel_count == 0 {
        return Err(AppError::DecodeError(
            "channel count must be at least 1".to_string(),
        ));
    }
    if sample_rate == 0 {
        return Err(AppError::DecodeError(
            "sample rate must be positive".to_string(),
        ));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::DecodeError(format!("invalid base64: {}", e)))?;

    if bytes.is_empty() {
        return Err(AppError::DecodeError("empty audio payload".to_string()));
    }

    let frame_bytes = 2 * channel_count as usize;
    if bytes.len() % frame_bytes != 0 {
        return Err(AppError::DecodeError(format!(
            "{} bytes is not a whole number of {}-channel PCM16 frames",
            bytes.len(),
            channel_count
        )));
    }

    let frames = bytes.len() / frame_bytes;
    let mut channels = vec![Vec::with_capacity(frames); channel_count as usize];

    for (index, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        channels[index % channel_count as usize].push(sample as f32 / 32768.0);
    }

    Ok(AudioSession {
        id: Uuid::new_v4(),
        sample_rate,
        channel_count,
        channels,
    })
}
