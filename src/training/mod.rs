//! Model training: imbalance correction, the pooled-feature classifier with its
//! hyperparameter search, and the convolution + recurrent sequence model.

pub mod class_weights;
pub mod grid;
mod init;
pub mod metrics;
pub mod mlp;
pub mod scaler;
pub mod sequence;

use candle_core::{Device, Tensor, D};
use ndarray::{Array2, ArrayBase, Data, Dimension};

use crate::error::Result;

pub use class_weights::ClassWeights;
pub use grid::{grid_search, train_classical, ClassicalModel, ClassicalOutcome, GridSearchConfig, MlpGrid};
pub use metrics::EvaluationReport;
pub use mlp::{LearningRateSchedule, MlpParams};
pub use scaler::StandardScaler;
pub use sequence::{SequenceArchitecture, SequenceModel, SequenceTrainConfig, TrainingHistory};

pub(crate) fn tensor_from_array<S, Dim>(array: &ArrayBase<S, Dim>, device: &Device) -> Result<Tensor>
where
    S: Data<Elem = f32>,
    Dim: Dimension,
{
    let values: Vec<f32> = array.iter().copied().collect();
    Ok(Tensor::from_vec(values, array.shape(), device)?)
}

/// Class labels or row indices as the `u32` tensor candle expects for both.
pub(crate) fn u32_tensor(values: &[usize], device: &Device) -> Result<Tensor> {
    let converted: Vec<u32> = values.iter().map(|&v| v as u32).collect();
    Ok(Tensor::from_vec(converted, values.len(), device)?)
}

pub(crate) fn probabilities_to_array(logits: &Tensor) -> Result<Array2<f32>> {
    let probs = candle_nn::ops::softmax(logits, D::Minus1)?;
    let (rows, cols) = probs.dims2()?;
    let flat = probs.flatten_all()?.to_vec1::<f32>()?;
    Ok(Array2::from_shape_vec((rows, cols), flat)?)
}

/// Index of the largest entry in each row; the first maximum wins ties.
pub fn argmax_rows(probabilities: &Array2<f32>) -> Vec<usize> {
    probabilities
        .outer_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (index, &p)| {
                    if p > best.1 {
                        (index, p)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}
