//! Versioned on-disk model artifacts.
//!
//! An artifact is a directory holding `manifest.json` (everything needed to rebuild
//! the network and reproduce feature extraction) and `weights.safetensors`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::LabelEncoder;
use crate::error::{EmotionError, Result};
use crate::features::{PooledFlags, SpectralConfig};
use crate::training::mlp::{MlpClassifier, MlpParams};
use crate::training::{ClassicalModel, SequenceArchitecture, SequenceModel, StandardScaler};

pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const WEIGHTS_FILE: &str = "weights.safetensors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Classical,
    Sequence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelDescriptor {
    Classical {
        params: MlpParams,
        n_features: usize,
        scaler: StandardScaler,
        flags: PooledFlags,
    },
    Sequence {
        architecture: SequenceArchitecture,
    },
}

impl ModelDescriptor {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Classical { .. } => ModelKind::Classical,
            Self::Sequence { .. } => ModelKind::Sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub model: ModelDescriptor,
    pub encoder: LabelEncoder,
    pub spectral: SpectralConfig,
}

/// A trained sequence model with what it needs to classify new clips.
pub struct SequenceBundle {
    pub model: SequenceModel,
    pub encoder: LabelEncoder,
    pub spectral: SpectralConfig,
}

pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let text = fs::read_to_string(&path).map_err(|err| {
        EmotionError::Artifact(format!("cannot read {}: {err}", path.display()))
    })?;
    let manifest: Manifest = serde_json::from_str(&text)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(EmotionError::Artifact(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            manifest.format_version
        )));
    }
    Ok(manifest)
}

pub fn save_classical(model: &ClassicalModel, dir: &Path) -> Result<()> {
    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        model: ModelDescriptor::Classical {
            params: *model.classifier.params(),
            n_features: model.classifier.n_features(),
            scaler: model.scaler.clone(),
            flags: model.flags,
        },
        encoder: model.encoder.clone(),
        spectral: model.spectral.clone(),
    };
    write(dir, &manifest, |weights| Ok(model.classifier.varmap().save(weights)?))
}

pub fn load_classical(dir: &Path) -> Result<ClassicalModel> {
    let manifest = read_manifest(dir)?;
    let (params, n_features, scaler, flags) = match manifest.model {
        ModelDescriptor::Classical {
            params,
            n_features,
            scaler,
            flags,
        } => (params, n_features, scaler, flags),
        other => return Err(kind_mismatch(ModelKind::Classical, other.kind())),
    };
    if scaler.n_features() != n_features {
        return Err(EmotionError::Artifact(format!(
            "scaler covers {} features but the network expects {n_features}",
            scaler.n_features()
        )));
    }
    let mut classifier =
        MlpClassifier::new(n_features, manifest.encoder.num_classes(), params, 0)?;
    classifier.varmap_mut().load(weights_path(dir)?)?;
    Ok(ClassicalModel {
        scaler,
        encoder: manifest.encoder,
        classifier,
        spectral: manifest.spectral,
        flags,
    })
}

pub fn save_sequence(
    model: &SequenceModel,
    encoder: &LabelEncoder,
    spectral: &SpectralConfig,
    dir: &Path,
) -> Result<()> {
    if encoder.num_classes() != model.architecture().num_classes {
        return Err(EmotionError::Artifact(format!(
            "encoder has {} classes but the model outputs {}",
            encoder.num_classes(),
            model.architecture().num_classes
        )));
    }
    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        model: ModelDescriptor::Sequence {
            architecture: *model.architecture(),
        },
        encoder: encoder.clone(),
        spectral: spectral.clone(),
    };
    write(dir, &manifest, |weights| Ok(model.varmap().save(weights)?))
}

pub fn load_sequence(dir: &Path) -> Result<SequenceBundle> {
    let manifest = read_manifest(dir)?;
    let architecture = match manifest.model {
        ModelDescriptor::Sequence { architecture } => architecture,
        other => return Err(kind_mismatch(ModelKind::Sequence, other.kind())),
    };
    if architecture.num_classes != manifest.encoder.num_classes() {
        return Err(EmotionError::Artifact(
            "label encoder does not match the output layer".into(),
        ));
    }
    let mut model = SequenceModel::new(architecture, 0)?;
    model.varmap_mut().load(weights_path(dir)?)?;
    Ok(SequenceBundle {
        model,
        encoder: manifest.encoder,
        spectral: manifest.spectral,
    })
}

fn write<F>(dir: &Path, manifest: &Manifest, save_weights: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    fs::create_dir_all(dir)?;
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(manifest)?)?;
    save_weights(&dir.join(WEIGHTS_FILE))?;
    info!(path = %dir.display(), kind = ?manifest.model.kind(), "model artifact saved");
    Ok(())
}

fn weights_path(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(WEIGHTS_FILE);
    if !path.is_file() {
        return Err(EmotionError::Artifact(format!(
            "missing weights file {}",
            path.display()
        )));
    }
    Ok(path)
}

fn kind_mismatch(expected: ModelKind, found: ModelKind) -> EmotionError {
    EmotionError::Artifact(format!("expected a {expected:?} model but found {found:?}"))
}
