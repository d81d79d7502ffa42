use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;
use ndarray::{Array2, Axis};

use super::SpectralConfig;
use crate::error::{EmotionError, Result};

const A4_HZ: f64 = 440.0;
const CHROMA_MIN_HZ: f64 = 20.0;
const EPSILON: f32 = 1e-10;
const MIN_POWER: f64 = 1e-10;

/// Frame-major spectrograms computed from one short-time transform.
pub(crate) struct Spectrograms {
    /// `frames × (n_fft / 2 + 1)` magnitudes
    pub magnitude: Vec<Vec<f64>>,
    /// `frames × n_mels` mel power
    pub mel: Vec<Vec<f64>>,
    freqs: Vec<f64>,
}

pub(crate) fn compute(samples: &[f32], config: &SpectralConfig) -> Spectrograms {
    let audio: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    let stft = spectrum::rstft(&audio, config.n_fft, config.hop_length, WindowType::Hanning);
    let (magnitude, _phase) = spectrum::complex_to_polar_rstft(&stft);
    let power = analysis::make_power_spectrogram(&magnitude);

    let freqs = spectrum::rfftfreq(config.n_fft, config.sample_rate);
    let filterbank = MelFilterbank::new(
        config.fmin,
        config.sample_rate as f64 / 2.0,
        config.n_mels,
        &freqs,
        true,
    );
    let mel = analysis::mel::make_mel_spectrogram(&power, &filterbank);

    Spectrograms {
        magnitude,
        mel,
        freqs,
    }
}

/// `frames × n_mfcc` cepstral coefficients.
pub(crate) fn mfcc(spectrograms: &Spectrograms, n_mfcc: usize) -> Result<Array2<f32>> {
    let n_mels = spectrograms.mel.first().map_or(0, Vec::len);
    if n_mfcc > n_mels {
        return Err(EmotionError::config(format!(
            "n_mfcc ({n_mfcc}) cannot exceed the mel band count ({n_mels})"
        )));
    }
    // silent frames would otherwise take the log of zero
    let floored: Vec<Vec<f64>> = spectrograms
        .mel
        .iter()
        .map(|frame| frame.iter().map(|&p| p.max(MIN_POWER)).collect())
        .collect();
    let coefficients = analysis::mel::mfcc_spectrogram(&floored, n_mfcc, None);
    to_array(&coefficients)
}

pub(crate) fn mel(spectrograms: &Spectrograms) -> Result<Array2<f32>> {
    to_array(&spectrograms.mel)
}

/// `frames × 12` pitch-class energy, each frame scaled to a unit maximum.
pub(crate) fn chroma(spectrograms: &Spectrograms, n_chroma: usize) -> Result<Array2<f32>> {
    let magnitude = to_array(&spectrograms.magnitude)?;
    let filterbank = chroma_filterbank(&spectrograms.freqs, n_chroma);
    let mut chroma = magnitude.dot(&filterbank.t());
    for mut frame in chroma.axis_iter_mut(Axis(0)) {
        let peak = frame.iter().copied().fold(0.0_f32, f32::max);
        if peak > EPSILON {
            frame.mapv_inplace(|v| v / peak);
        }
    }
    Ok(chroma)
}

fn chroma_filterbank(freqs: &[f64], n_chroma: usize) -> Array2<f32> {
    let mut filterbank = Array2::<f32>::zeros((n_chroma, freqs.len()));
    let c0 = A4_HZ * 2.0_f64.powf(-4.75);
    for (bin, &freq) in freqs.iter().enumerate() {
        if freq < CHROMA_MIN_HZ {
            continue;
        }
        let pitch = (12.0 * (freq / c0).log2()).round() as i64;
        let class = pitch.rem_euclid(n_chroma as i64) as usize;
        filterbank[[class, bin]] += 1.0;
    }
    for mut row in filterbank.axis_iter_mut(Axis(0)) {
        let total = row.sum();
        if total > 0.0 {
            row.mapv_inplace(|v| v / total);
        }
    }
    filterbank
}

fn to_array(data: &[Vec<f64>]) -> Result<Array2<f32>> {
    let rows = data.len();
    let cols = data.first().map_or(0, Vec::len);
    let flat: Vec<f32> = data.iter().flatten().map(|&v| v as f32).collect();
    Ok(Array2::from_shape_vec((rows, cols), flat)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroma_filterbank_rows_are_normalised() {
        let freqs: Vec<f64> = (0..1025).map(|i| i as f64 * 22_050.0 / 2048.0).collect();
        let bank = chroma_filterbank(&freqs, 12);
        assert_eq!(bank.dim(), (12, 1025));
        for row in bank.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
        // the DC bin sits below the audible cut-off
        assert!(bank.column(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn a440_lands_in_pitch_class_a() {
        let freqs = vec![0.0, 440.0];
        let bank = chroma_filterbank(&freqs, 12);
        // C0-relative pitch classes: C=0 ... A=9
        assert_eq!(bank[[9, 1]], 1.0);
    }

    #[test]
    fn ragged_input_is_a_shape_error() {
        assert!(to_array(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }
}
