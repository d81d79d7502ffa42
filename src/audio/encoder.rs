use std::path::Path;

use crate::error::{EmotionError, Result};
use crate::types::AudioData;

/// Write mono audio as a 16-bit PCM WAV file. Samples outside [-1, 1] are clipped on write only.
pub fn write_wav<P: AsRef<Path>>(audio: &AudioData, path: P) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_err = |err: hound::Error| match err {
        hound::Error::IoError(io) => EmotionError::Io(io),
        other => EmotionError::config(format!("cannot write {}: {other}", path.display())),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for &sample in &audio.samples {
        let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(pcm).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::decode_audio;

    #[test]
    fn written_wav_decodes_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..1_000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        write_wav(&AudioData::new(samples.clone(), 16_000), &path).unwrap();

        let decoded = decode_audio(&path).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.samples.len(), samples.len());
        for (a, b) in decoded.samples.iter().zip(&samples) {
            assert!((a - b).abs() < 1e-3);
        }
    }
}
