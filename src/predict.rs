use std::path::Path;

use ndarray::Axis;
use tracing::debug;

use crate::artifact::{self, ModelKind, SequenceBundle};
use crate::dataset::LabelEncoder;
use crate::error::{EmotionError, Result};
use crate::features::{FeatureExtractor, SpectralConfig};
use crate::training::{argmax_rows, ClassicalModel, SequenceModel};

/// Label of one clip under a trained sequence model, using the default analysis settings.
///
/// Always the arg-max class; there is no confidence threshold. Features are computed
/// with `SpectralConfig::default()`; a model trained under other analysis settings
/// should be served through [`Predictor`], which reads them from the artifact.
pub fn predict(
    path: &Path,
    model: &SequenceModel,
    encoder: &LabelEncoder,
    max_len: usize,
) -> Result<String> {
    let architecture = model.architecture();
    if architecture.max_len != max_len {
        return Err(EmotionError::config(format!(
            "model expects {} frames, asked to predict on {max_len}",
            architecture.max_len
        )));
    }
    if architecture.num_classes != encoder.num_classes() {
        return Err(EmotionError::config(format!(
            "model has {} outputs but the encoder knows {} classes",
            architecture.num_classes,
            encoder.num_classes()
        )));
    }
    predict_with(&FeatureExtractor::default(), path, model, encoder, max_len)
}

fn predict_with(
    extractor: &FeatureExtractor,
    path: &Path,
    model: &SequenceModel,
    encoder: &LabelEncoder,
    max_len: usize,
) -> Result<String> {
    let n_mfcc = model.architecture().n_mfcc;
    let sequence = extractor.extract_sequence(path, n_mfcc, max_len)?;
    let probabilities = model.predict_one(&sequence)?;
    let class = argmax_rows(&probabilities.insert_axis(Axis(0)))[0];
    debug!(path = %path.display(), class, "sequence prediction");
    Ok(encoder.decode(class)?.to_string())
}

/// Label of one clip under the pooled-feature classifier.
pub fn predict_pooled(path: &Path, model: &ClassicalModel) -> Result<String> {
    let extractor = FeatureExtractor::new(model.spectral.clone());
    let features = extractor.extract_pooled(path, model.flags)?;
    let class = model.predict_features(features.view().insert_axis(Axis(0)))?[0];
    debug!(path = %path.display(), class, "pooled prediction");
    Ok(model.encoder.decode(class)?.to_string())
}

/// A loaded artifact ready to serve repeated predictions.
pub enum Predictor {
    Sequence(SequenceBundle),
    Classical(ClassicalModel),
}

impl Predictor {
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = artifact::read_manifest(dir)?;
        match manifest.model.kind() {
            ModelKind::Sequence => Ok(Self::Sequence(artifact::load_sequence(dir)?)),
            ModelKind::Classical => Ok(Self::Classical(artifact::load_classical(dir)?)),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Sequence(_) => ModelKind::Sequence,
            Self::Classical(_) => ModelKind::Classical,
        }
    }

    pub fn encoder(&self) -> &LabelEncoder {
        match self {
            Self::Sequence(bundle) => &bundle.encoder,
            Self::Classical(model) => &model.encoder,
        }
    }

    pub fn spectral(&self) -> &SpectralConfig {
        match self {
            Self::Sequence(bundle) => &bundle.spectral,
            Self::Classical(model) => &model.spectral,
        }
    }

    pub fn predict(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(EmotionError::config(format!(
                "{} is not a file",
                path.display()
            )));
        }
        match self {
            Self::Sequence(bundle) => predict_with(
                &FeatureExtractor::new(bundle.spectral.clone()),
                path,
                &bundle.model,
                &bundle.encoder,
                bundle.model.architecture().max_len,
            ),
            Self::Classical(model) => predict_pooled(path, model),
        }
    }
}
