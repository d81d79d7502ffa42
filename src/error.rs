use std::path::PathBuf;

/// Convenient alias for results returned by library modules.
pub type Result<T> = std::result::Result<T, EmotionError>;

#[derive(thiserror::Error, Debug)]
pub enum EmotionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no usable clips found under {roots:?}")]
    EmptyDataset { roots: Vec<PathBuf> },

    #[error("unrecognised label for {path}")]
    Label { path: PathBuf },

    #[error("training failed: {0}")]
    Training(String),

    #[error("training diverged at epoch {epoch}: loss is not finite")]
    Divergence { epoch: usize },

    #[error("model artifact error: {0}")]
    Artifact(String),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EmotionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn training(message: impl Into<String>) -> Self {
        Self::Training(message.into())
    }
}
