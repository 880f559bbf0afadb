use super::buffer::AudioBuffer;
use crate::{ReverieError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Sinc resampler for bringing decoded audio to the context sample rate
pub struct AudioResampler {
    resampler: SincFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
}

impl AudioResampler {
    /// Create a new audio resampler
    ///
    /// # Arguments
    /// * `input_rate` - Input sample rate
    /// * `output_rate` - Output sample rate
    /// * `channels` - Number of audio channels
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(ReverieError::Config(
                "Sample rates must be greater than 0".into(),
            ));
        }

        if channels == 0 {
            return Err(ReverieError::Config(
                "Number of channels must be greater than 0".into(),
            ));
        }

        let resample_ratio = output_rate as f64 / input_rate as f64;

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        // Frames per channel per process() call
        let chunk_size = 1024;

        let resampler =
            SincFixedIn::<f32>::new(resample_ratio, 2.0, params, chunk_size, channels as usize)
                .map_err(|e| {
                    ReverieError::AudioProcessing(format!("Failed to create resampler: {}", e))
                })?;

        debug!(
            "Created resampler: {} Hz -> {} Hz, {} channels",
            input_rate, output_rate, channels
        );

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels: channels as usize,
        })
    }

    /// Resample interleaved audio
    pub fn resample(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = self.resampler.input_frames_max();
        let total_frames = input.len() / self.channels;
        let ratio = self.output_rate as f64 / self.input_rate as f64;
        let mut output =
            Vec::with_capacity((total_frames as f64 * ratio * 1.1) as usize * self.channels);

        let mut frame_offset = 0;
        while frame_offset < total_frames {
            let frames_remaining = total_frames - frame_offset;
            let frames_to_read = frames_remaining.min(chunk_size);

            // SincFixedIn wants exactly chunk_size frames; the tail is zero-padded
            let mut input_planar = vec![vec![0.0f32; chunk_size]; self.channels];
            for frame_idx in 0..frames_to_read {
                let src_idx = (frame_offset + frame_idx) * self.channels;
                for (ch_idx, channel) in input_planar.iter_mut().enumerate() {
                    channel[frame_idx] = input[src_idx + ch_idx];
                }
            }

            let output_planar = self
                .resampler
                .process(&input_planar, None)
                .map_err(|e| ReverieError::AudioProcessing(format!("Resampling failed: {}", e)))?;

            let output_frames = output_planar[0].len();
            let frames_to_take = if frames_remaining < chunk_size {
                ((frames_to_read as f64) * ratio).ceil() as usize
            } else {
                output_frames
            };

            for frame_idx in 0..frames_to_take.min(output_frames) {
                for channel in output_planar.iter() {
                    output.push(channel[frame_idx]);
                }
            }

            frame_offset += frames_to_read;
        }

        debug!(
            "Resampled {} frames -> {} frames",
            total_frames,
            output.len() / self.channels
        );

        Ok(output)
    }
}

/// Convert a buffer to mono at `output_rate`, the layout the mix graph plays
pub fn prepare_for_context(buffer: &AudioBuffer, output_rate: u32) -> Result<AudioBuffer> {
    let mono = buffer.to_mono();
    if mono.sample_rate == output_rate || mono.is_empty() {
        return Ok(AudioBuffer::new(mono.samples, output_rate, 1));
    }

    let mut resampler = AudioResampler::new(mono.sample_rate, output_rate, 1)?;
    let samples = resampler.resample(&mono.samples)?;
    Ok(AudioBuffer::new(samples, output_rate, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameters() {
        assert!(AudioResampler::new(0, 48000, 1).is_err());
        assert!(AudioResampler::new(16000, 0, 1).is_err());
        assert!(AudioResampler::new(16000, 48000, 0).is_err());
    }

    #[test]
    fn test_resample_upsampling() {
        let mut resampler = AudioResampler::new(24000, 48000, 1).unwrap();
        let input: Vec<f32> = (0..2048).map(|i| (i as f32 * 0.01).sin()).collect();
        let output = resampler.resample(&input).unwrap();
        assert!(output.len() > input.len() * 3 / 2);
    }

    #[test]
    fn test_prepare_same_rate_only_downmixes() {
        let stereo = AudioBuffer::new(vec![0.2, 0.4, 0.6, 0.8], 24000, 2);
        let prepared = prepare_for_context(&stereo, 24000).unwrap();
        assert_eq!(prepared.channels, 1);
        assert_eq!(prepared.frames(), 2);
        assert!((prepared.samples[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_resamples_to_context_rate() {
        let buffer = AudioBuffer::new(vec![0.1; 4410], 44100, 1);
        let prepared = prepare_for_context(&buffer, 48000).unwrap();
        assert_eq!(prepared.sample_rate, 48000);
        assert!(prepared.frames() > 4410);
    }
}
