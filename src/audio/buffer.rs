use crate::{ReverieError, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Decoded, playable audio
///
/// Samples are f32 in [-1, 1], interleaved when `channels > 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Average all channels down to one
    pub fn to_mono(&self) -> AudioBuffer {
        if self.channels <= 1 {
            return self.clone();
        }

        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        AudioBuffer::new(samples, self.sample_rate, 1)
    }

    /// Write the buffer as 16-bit PCM WAV
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let spec = WavSpec {
            channels: self.channels.max(1),
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path.as_ref(), spec)
            .map_err(|e| ReverieError::IO(format!("Failed to create WAV writer: {}", e)))?;
        for &sample in &self.samples {
            let sample = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(sample)
                .map_err(|e| ReverieError::IO(format!("Failed to write sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| ReverieError::IO(format!("Failed to finalize WAV file: {}", e)))?;

        info!("Wrote {:?} of audio to {:?}", self.duration(), path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 24000], 24000, 1);
        assert_eq!(buffer.frames(), 24000);
        assert_eq!(buffer.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_stereo_frames_and_downmix() {
        let buffer = AudioBuffer::new(vec![1.0, 0.0, 0.5, 0.5], 48000, 2);
        assert_eq!(buffer.frames(), 2);

        let mono = buffer.to_mono();
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![0.5, 0.5]);
    }

    #[test]
    fn test_write_wav() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        let buffer = AudioBuffer::new(vec![0.0, 0.5, -0.5, 2.0], 24000, 1);
        buffer.write_wav(&path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 24000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -16383, i16::MAX]);
    }
}
