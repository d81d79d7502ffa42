use crate::error::{EmotionError, Result};
use crate::types::AudioData;

/// Linearly resample `samples` from `source_rate` to `target_rate`.
pub fn linear_resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == 0 || target_rate == 0 {
        return Err(EmotionError::config(format!(
            "sample rates must be positive (got {source_rate} -> {target_rate})"
        )));
    }
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = ((samples.len() as f64) * ratio).ceil().max(1.0) as usize;
    let last_index = samples.len() - 1;
    let resampled = (0..output_len)
        .map(|i| {
            let position = i as f64 / ratio;
            let left = (position.floor() as usize).min(last_index);
            let right = (left + 1).min(last_index);
            let t = (position - left as f64) as f32;
            samples[left] * (1.0 - t) + samples[right] * t
        })
        .collect();
    Ok(resampled)
}

/// Resample a decoded clip to the analysis rate.
pub fn to_rate(audio: &AudioData, target_rate: u32) -> Result<Vec<f32>> {
    linear_resample(&audio.samples, audio.sample_rate, target_rate)
}

#[cfg(test)]
mod tests {
    use super::linear_resample;

    #[test]
    fn preserves_constant_signal_after_resample() {
        let input = vec![0.5; 480];
        let resampled = linear_resample(&input, 48_000, 22_050).unwrap();
        let expected_len = ((input.len() as f64) * 22_050_f64 / 48_000_f64).ceil() as usize;
        assert_eq!(resampled.len(), expected_len);
        assert!(resampled.iter().all(|&sample| (sample - 0.5).abs() < 1e-6));
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(linear_resample(&[0.0; 4], 0, 22_050).is_err());
    }
}
