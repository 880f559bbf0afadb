//! Audio payload decoding
//!
//! Generated narration arrives as base64 raw PCM (s16le); background music
//! arrives as base64 compressed audio, often wrapped in a data URL.

use super::buffer::AudioBuffer;
use crate::{ReverieError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rodio::Source;
use std::io::Cursor;
use tracing::debug;

/// Return the base64 body of a `data:<mime>;base64,<body>` URL, or the input
/// unchanged when it is not a data URL.
pub fn strip_data_url(text: &str) -> &str {
    if text.starts_with("data:") {
        if let Some(idx) = text.find(";base64,") {
            return &text[idx + ";base64,".len()..];
        }
    }
    text
}

/// Decode base64 text (optionally a data URL) into bytes
pub fn base64_to_bytes(text: &str) -> Result<Vec<u8>> {
    let body = strip_data_url(text.trim());
    if body.is_empty() {
        return Ok(Vec::new());
    }
    STANDARD
        .decode(body)
        .map_err(|e| ReverieError::Decode(format!("Invalid base64 payload: {}", e)))
}

/// Encode bytes as standard base64
pub fn bytes_to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode signed 16-bit little-endian PCM into a playable buffer
///
/// Each sample is divided by 32768, so the output lies in [-1, 1).
pub fn decode_raw_pcm(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    if bytes.len() % 2 != 0 {
        return Err(ReverieError::Decode(format!(
            "PCM payload length {} is not a multiple of 2",
            bytes.len()
        )));
    }
    if channels == 0 || sample_rate == 0 {
        return Err(ReverieError::Decode(
            "PCM sample rate and channel count must be non-zero".into(),
        ));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    if samples.len() % channels as usize != 0 {
        return Err(ReverieError::Decode(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            channels
        )));
    }

    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

/// Decode compressed audio (MP3, WAV, FLAC, Vorbis) on the blocking pool
pub async fn decode_compressed_audio(bytes: Vec<u8>) -> Result<AudioBuffer> {
    tokio::task::spawn_blocking(move || decode_compressed_blocking(bytes))
        .await
        .map_err(|e| ReverieError::AudioProcessing(format!("Decoder task failed: {}", e)))?
}

/// Synchronous compressed decode
pub fn decode_compressed_blocking(bytes: Vec<u8>) -> Result<AudioBuffer> {
    let decoder = rodio::Decoder::new(Cursor::new(bytes))
        .map_err(|e| ReverieError::Decode(format!("Unsupported audio container: {}", e)))?;

    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();

    if samples.is_empty() {
        return Err(ReverieError::Decode("Audio container holds no samples".into()));
    }

    let buffer = AudioBuffer::new(samples, sample_rate, channels);
    debug!(
        "Decoded compressed audio: {} Hz, {} channels, {:.2}s",
        sample_rate,
        channels,
        buffer.duration().as_secs_f32()
    );
    Ok(buffer)
}
