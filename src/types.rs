//! Core types shared by the emotion classification pipeline

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raw audio data representation (mono, f32 samples)
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g., 22050)
    pub sample_rate: u32,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// The eight emotion categories recognised by the corpus filename convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Calm,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgust,
    Surprised,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Neutral,
        Emotion::Calm,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fearful,
        Emotion::Disgust,
        Emotion::Surprised,
    ];

    /// Map a two-digit filename code (`01`..`08`) to its emotion.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Emotion::Neutral),
            "02" => Some(Emotion::Calm),
            "03" => Some(Emotion::Happy),
            "04" => Some(Emotion::Sad),
            "05" => Some(Emotion::Angry),
            "06" => Some(Emotion::Fearful),
            "07" => Some(Emotion::Disgust),
            "08" => Some(Emotion::Surprised),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Emotion::Neutral => "01",
            Emotion::Calm => "02",
            Emotion::Happy => "03",
            Emotion::Sad => "04",
            Emotion::Angry => "05",
            Emotion::Fearful => "06",
            Emotion::Disgust => "07",
            Emotion::Surprised => "08",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Calm => "calm",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fearful => "fearful",
            Emotion::Disgust => "disgust",
            Emotion::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labelled audio source discovered in the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pub path: PathBuf,
    pub emotion: Emotion,
}
