//! Fixed-shape descriptors computed from variable-length audio.
//!
//! Two extraction paths share a single decode step: a pooled vector (time-averaged
//! MFCC / chroma / mel statistics) for the classical classifier, and a time-major
//! MFCC sequence of fixed length for the sequence model.

mod normalize;
mod spectral;

use std::path::Path;

use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::audio::{decoder, resample};
use crate::error::{EmotionError, Result};
use crate::types::AudioData;

pub use normalize::fix_length;

/// Analysis settings shared by every extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub fmin: f64,
    /// Coefficient count of the pooled MFCC block.
    pub n_mfcc: usize,
    pub n_chroma: usize,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            fmin: 0.0,
            n_mfcc: 40,
            n_chroma: 12,
        }
    }
}

impl SpectralConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.n_fft == 0 || self.hop_length == 0 {
            return Err(EmotionError::config(
                "sample_rate, n_fft and hop_length must be positive",
            ));
        }
        if self.n_mels == 0 || self.n_mfcc == 0 || self.n_chroma == 0 {
            return Err(EmotionError::config(
                "n_mels, n_mfcc and n_chroma must be positive",
            ));
        }
        if self.n_mfcc > self.n_mels {
            return Err(EmotionError::config(format!(
                "n_mfcc ({}) cannot exceed n_mels ({})",
                self.n_mfcc, self.n_mels
            )));
        }
        if self.fmin < 0.0 || self.fmin >= self.sample_rate as f64 / 2.0 {
            return Err(EmotionError::config("fmin must lie in [0, nyquist)"));
        }
        Ok(())
    }
}

/// Which statistics make up a pooled feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PooledFlags {
    pub mfcc: bool,
    pub chroma: bool,
    pub mel: bool,
}

impl Default for PooledFlags {
    fn default() -> Self {
        Self {
            mfcc: true,
            chroma: true,
            mel: true,
        }
    }
}

impl PooledFlags {
    pub fn new(mfcc: bool, chroma: bool, mel: bool) -> Self {
        Self { mfcc, chroma, mel }
    }

    /// Length of the vector these flags produce under `config`.
    pub fn vector_len(&self, config: &SpectralConfig) -> usize {
        usize::from(self.mfcc) * config.n_mfcc
            + usize::from(self.chroma) * config.n_chroma
            + usize::from(self.mel) * config.n_mels
    }

    fn any(&self) -> bool {
        self.mfcc || self.chroma || self.mel
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: SpectralConfig,
}

impl FeatureExtractor {
    pub fn new(config: SpectralConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    /// Decode and resample a clip to the analysis rate.
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let audio = decoder::decode_audio(path)?;
        self.prepare(&audio)
    }

    pub fn prepare(&self, audio: &AudioData) -> Result<Vec<f32>> {
        resample::to_rate(audio, self.config.sample_rate)
    }

    pub fn extract_pooled(&self, path: &Path, flags: PooledFlags) -> Result<Array1<f32>> {
        let samples = self.load(path)?;
        self.pooled_from_samples(&samples, flags)
    }

    pub fn extract_sequence(&self, path: &Path, n_mfcc: usize, max_len: usize) -> Result<Array2<f32>> {
        let samples = self.load(path)?;
        self.sequence_from_samples(&samples, n_mfcc, max_len)
    }

    /// Pooled statistics of a waveform already at the analysis rate.
    ///
    /// Blocks are concatenated in the fixed order MFCC, chroma, mel; the output
    /// length depends only on `flags`, never on the clip duration.
    pub fn pooled_from_samples(&self, samples: &[f32], flags: PooledFlags) -> Result<Array1<f32>> {
        if !flags.any() {
            return Err(EmotionError::config(
                "at least one of mfcc, chroma or mel must be enabled",
            ));
        }
        let spectrograms = spectral::compute(&self.pad_to_window(samples), &self.config);

        let mut blocks = Vec::with_capacity(3);
        if flags.mfcc {
            blocks.push(time_mean(spectral::mfcc(&spectrograms, self.config.n_mfcc)?)?);
        }
        if flags.chroma {
            blocks.push(time_mean(spectral::chroma(&spectrograms, self.config.n_chroma)?)?);
        }
        if flags.mel {
            blocks.push(time_mean(spectral::mel(&spectrograms)?)?);
        }
        let views: Vec<ArrayView1<'_, f32>> = blocks.iter().map(|b| b.view()).collect();
        let pooled = concatenate(Axis(0), &views)?;

        debug_assert_eq!(pooled.len(), flags.vector_len(&self.config));
        Ok(pooled)
    }

    /// `(max_len, n_mfcc)` MFCC frames of a waveform already at the analysis rate.
    pub fn sequence_from_samples(
        &self,
        samples: &[f32],
        n_mfcc: usize,
        max_len: usize,
    ) -> Result<Array2<f32>> {
        if n_mfcc == 0 || max_len == 0 {
            return Err(EmotionError::config("n_mfcc and max_len must be positive"));
        }
        if n_mfcc > self.config.n_mels {
            return Err(EmotionError::config(format!(
                "n_mfcc ({n_mfcc}) cannot exceed n_mels ({})",
                self.config.n_mels
            )));
        }
        let spectrograms = spectral::compute(&self.pad_to_window(samples), &self.config);
        let frames = spectral::mfcc(&spectrograms, n_mfcc)?;
        let fixed = fix_length(frames.view(), max_len, Axis(0));
        if fixed.dim() != (max_len, n_mfcc) {
            return Err(shape_violation());
        }
        Ok(fixed)
    }

    // Clips shorter than one analysis window still yield a single frame.
    fn pad_to_window(&self, samples: &[f32]) -> Vec<f32> {
        if samples.len() >= self.config.n_fft {
            return samples.to_vec();
        }
        fix_length(ArrayView1::from(samples), self.config.n_fft, Axis(0)).to_vec()
    }
}

/// Convenience wrapper using the default analysis settings.
pub fn extract_pooled(
    path: &Path,
    use_mfcc: bool,
    use_chroma: bool,
    use_mel: bool,
) -> Result<Array1<f32>> {
    FeatureExtractor::default().extract_pooled(path, PooledFlags::new(use_mfcc, use_chroma, use_mel))
}

/// Convenience wrapper using the default analysis settings.
pub fn extract_sequence(path: &Path, n_mfcc: usize, max_len: usize) -> Result<Array2<f32>> {
    FeatureExtractor::default().extract_sequence(path, n_mfcc, max_len)
}

fn time_mean(frames: Array2<f32>) -> Result<Array1<f32>> {
    frames.mean_axis(Axis(0)).ok_or_else(shape_violation)
}

fn shape_violation() -> EmotionError {
    EmotionError::Shape(ndarray::ShapeError::from_kind(
        ndarray::ErrorKind::IncompatibleShape,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(seconds: f32, config: &SpectralConfig) -> Vec<f32> {
        let n = (seconds * config.sample_rate as f32) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / config.sample_rate as f32;
                (2.0 * std::f32::consts::PI * 330.0 * t).sin() * 0.4
            })
            .collect()
    }

    #[test]
    fn pooled_length_follows_flags() {
        let extractor = FeatureExtractor::default();
        let samples = tone(0.5, extractor.config());
        for (flags, expected) in [
            (PooledFlags::new(true, true, true), 180),
            (PooledFlags::new(true, false, false), 40),
            (PooledFlags::new(false, true, false), 12),
            (PooledFlags::new(false, true, true), 140),
        ] {
            let pooled = extractor.pooled_from_samples(&samples, flags).unwrap();
            assert_eq!(pooled.len(), expected);
            assert_eq!(flags.vector_len(extractor.config()), expected);
        }
    }

    #[test]
    fn pooled_requires_a_flag() {
        let extractor = FeatureExtractor::default();
        let samples = tone(0.2, extractor.config());
        assert!(extractor
            .pooled_from_samples(&samples, PooledFlags::new(false, false, false))
            .is_err());
    }

    #[test]
    fn sequence_shape_is_fixed_for_any_duration() {
        let extractor = FeatureExtractor::default();
        for seconds in [0.01, 0.3, 4.0] {
            let samples = tone(seconds, extractor.config());
            let frames = extractor.sequence_from_samples(&samples, 20, 50).unwrap();
            assert_eq!(frames.dim(), (50, 20));
        }
    }

    #[test]
    fn short_sequence_is_zero_padded_at_the_end() {
        let extractor = FeatureExtractor::default();
        let samples = tone(0.1, extractor.config());
        let frames = extractor.sequence_from_samples(&samples, 13, 200).unwrap();
        let last = frames.row(199);
        assert!(last.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn spectral_config_rejects_zero_fft() {
        let config = SpectralConfig {
            n_fft: 0,
            ..SpectralConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn spectral_config_rejects_more_coefficients_than_mel_bands() {
        let config = SpectralConfig {
            n_mels: 32,
            n_mfcc: 40,
            ..SpectralConfig::default()
        };
        assert!(matches!(config.validate(), Err(EmotionError::Config(_))));
    }

    #[test]
    fn sequence_with_more_coefficients_than_mel_bands_is_a_config_error() {
        let extractor = FeatureExtractor::default();
        let samples = tone(1.0, extractor.config());
        let err = extractor.sequence_from_samples(&samples, 200, 50).unwrap_err();
        assert!(matches!(err, EmotionError::Config(_)));
    }

    #[test]
    fn pooled_mfcc_block_wider_than_mel_bands_is_an_error() {
        let extractor = FeatureExtractor::new(SpectralConfig {
            n_mels: 20,
            n_mfcc: 40,
            ..SpectralConfig::default()
        });
        let samples = tone(0.5, extractor.config());
        let err = extractor
            .pooled_from_samples(&samples, PooledFlags::new(true, false, false))
            .unwrap_err();
        assert!(matches!(err, EmotionError::Config(_)));
    }
}
