use crate::error::{Result, WadMixError};

/// Offline whole-buffer resampler used for load-time conversion.
pub struct BatchResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    chunk_size: usize,
}

impl BatchResampler {
    /// Creates a new batch resampler for offline audio processing.
    ///
    /// # Arguments
    /// * `source_sample_rate` - The sample rate of the input audio
    /// * `target_sample_rate` - The desired sample rate of the output audio
    /// * `chunk_size` - Optional size of processing chunks (defaults to 1024)
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(WadMixError::Configuration(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            chunk_size: chunk_size.unwrap_or(1024).max(1),
        })
    }

    /// Resamples a single planar channel.
    ///
    /// The final partial chunk goes through `process_partial`, the filter
    /// tail is flushed, and the resampler's output delay is cut from the
    /// front, so output sample `i` lines up with input time `i / ratio`. The
    /// result is trimmed to the length implied by the rate ratio.
    pub fn resample_channel(&self, channel_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(channel_samples.to_vec());
        }

        use rubato::{FftFixedIn, Resampler};

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            1, // single channel
        )
        .map_err(|e| WadMixError::Decode(format!("Failed to create resampler: {}", e)))?;

        let delay = resampler.output_delay();
        let expected_len = self.expected_len(channel_samples.len());
        let mut output_buffer = Vec::with_capacity(delay + expected_len);
        let mut input_index = 0;

        while input_index < channel_samples.len() {
            let remaining = &channel_samples[input_index..];
            let waves_out = if remaining.len() >= self.chunk_size {
                let chunk: [&[f32]; 1] = [&remaining[..self.chunk_size]];
                resampler.process(&chunk[..], None)
            } else {
                let chunk: [&[f32]; 1] = [remaining];
                resampler.process_partial(Some(&chunk[..]), None)
            }
            .map_err(|e| WadMixError::Decode(format!("Resampling error: {}", e)))?;

            if let Some(first_channel) = waves_out.first() {
                output_buffer.extend_from_slice(first_channel);
            }

            input_index += remaining.len().min(self.chunk_size);
        }

        // Push the delayed tail out of the filter.
        while output_buffer.len() < delay + expected_len {
            let waves_out = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| WadMixError::Decode(format!("Resampling error: {}", e)))?;
            match waves_out.first() {
                Some(tail) if !tail.is_empty() => output_buffer.extend_from_slice(tail),
                _ => break,
            }
        }

        output_buffer.drain(..delay.min(output_buffer.len()));
        output_buffer.truncate(expected_len);
        Ok(output_buffer)
    }

    fn expected_len(&self, input_len: usize) -> usize {
        (input_len as u64 * self.target_sample_rate as u64).div_ceil(self.source_sample_rate as u64)
            as usize
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_a_copy() {
        let resampler = BatchResampler::new(44100, 44100, None).unwrap();
        assert_eq!(resampler.resample_channel(&[0.1, 0.2]).unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    fn output_length_follows_ratio() {
        let resampler = BatchResampler::new(11025, 44100, Some(256)).unwrap();
        let input = vec![0.25f32; 1000];
        let output = resampler.resample_channel(&input).unwrap();
        assert_eq!(output.len(), 4000);
    }

    #[test]
    fn output_is_aligned_with_the_input() {
        let resampler = BatchResampler::new(22050, 44100, Some(256)).unwrap();
        let input = vec![0.5f32; 700];
        let output = resampler.resample_channel(&input).unwrap();
        assert_eq!(output.len(), 1400);
        // The last input chunk is partial, so the tail checks the flush.
        for (i, s) in output.iter().enumerate().take(1300).skip(100) {
            assert!((s - 0.5).abs() < 0.02, "sample {i} is {s}");
        }
    }

    #[test]
    fn impulse_is_not_shifted() {
        let resampler = BatchResampler::new(11025, 44100, Some(128)).unwrap();
        let mut input = vec![0.0f32; 400];
        input[100] = 1.0;
        let output = resampler.resample_channel(&input).unwrap();
        let peak = output
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &s)| if s > best.1 { (i, s) } else { best });
        assert!((398..=402).contains(&peak.0), "peak at {}", peak.0);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(BatchResampler::new(0, 44100, None).is_err());
    }
}
