use std::fmt;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{AdamW, Linear, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{init, probabilities_to_array, tensor_from_array, u32_tensor};
use crate::error::{EmotionError, Result};

const LEARNING_RATE: f64 = 1e-3;
const MAX_BATCH: usize = 200;
const TOLERANCE: f64 = 1e-4;
const CONSTANT_PATIENCE: usize = 10;
const ADAPTIVE_PATIENCE: usize = 2;
const ADAPTIVE_DECAY: f64 = 5.0;
const MIN_LEARNING_RATE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningRateSchedule {
    /// Keep the initial rate; stop after a run of epochs without improvement.
    Constant,
    /// Divide the rate by five whenever the loss stalls for two epochs.
    Adaptive,
}

/// One point of the hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    pub hidden_units: usize,
    /// L2 penalty strength.
    pub alpha: f64,
    pub schedule: LearningRateSchedule,
    pub max_iter: usize,
}

impl fmt::Display for MlpParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hidden={} alpha={} schedule={:?} max_iter={}",
            self.hidden_units, self.alpha, self.schedule, self.max_iter
        )
    }
}

struct Mlp {
    hidden: Linear,
    output: Linear,
}

impl Mlp {
    fn new(n_features: usize, hidden_units: usize, n_classes: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            hidden: candle_nn::linear(n_features, hidden_units, vb.pp("hidden"))?,
            output: candle_nn::linear(hidden_units, n_classes, vb.pp("output"))?,
        })
    }

    fn l2_norm(&self) -> candle_core::Result<Tensor> {
        self.hidden.weight().sqr()?.sum_all()? + self.output.weight().sqr()?.sum_all()?
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.output.forward(&self.hidden.forward(xs)?.relu()?)
    }
}

/// Single-hidden-layer perceptron over standardised pooled features.
pub struct MlpClassifier {
    varmap: VarMap,
    network: Mlp,
    params: MlpParams,
    n_features: usize,
    n_classes: usize,
    device: Device,
}

impl MlpClassifier {
    /// Fresh, untrained network with deterministic initial weights.
    pub fn new(n_features: usize, n_classes: usize, params: MlpParams, seed: u64) -> Result<Self> {
        if n_features == 0 || n_classes == 0 || params.hidden_units == 0 {
            return Err(EmotionError::config(
                "features, classes and hidden units must all be positive",
            ));
        }
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = Mlp::new(n_features, params.hidden_units, n_classes, vb)?;
        init::glorot_reseed(&varmap, seed)?;
        Ok(Self {
            varmap,
            network,
            params,
            n_features,
            n_classes,
            device,
        })
    }

    pub fn fit(
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
        params: MlpParams,
        seed: u64,
    ) -> Result<Self> {
        let mut classifier = Self::new(x.ncols(), n_classes, params, seed)?;
        classifier.train(x, y, seed)?;
        Ok(classifier)
    }

    fn train(&mut self, x: ArrayView2<'_, f32>, y: &[usize], seed: u64) -> Result<()> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(EmotionError::training(format!(
                "{} feature rows but {} labels",
                n,
                y.len()
            )));
        }
        if let Some(&bad) = y.iter().find(|&&label| label >= self.n_classes) {
            return Err(EmotionError::training(format!(
                "label {bad} out of range for {} classes",
                self.n_classes
            )));
        }

        let xs = tensor_from_array(&x, &self.device)?;
        let ys = u32_tensor(y, &self.device)?;
        let batch_size = n.min(MAX_BATCH);
        let mut learning_rate = LEARNING_RATE;
        let mut optimizer = AdamW::new(
            self.varmap.all_vars(),
            ParamsAdamW {
                lr: learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..n).collect();
        let mut best_loss = f64::INFINITY;
        let mut stalled = 0usize;

        for epoch in 1..=self.params.max_iter {
            order.shuffle(&mut rng);
            let mut total = 0.0;
            for batch in order.chunks(batch_size) {
                let index = u32_tensor(batch, &self.device)?;
                let xb = xs.index_select(&index, 0)?;
                let yb = ys.index_select(&index, 0)?;
                let logits = self.network.forward(&xb)?;
                let data_loss = candle_nn::loss::cross_entropy(&logits, &yb)?;
                let penalty =
                    (self.network.l2_norm()? * (0.5 * self.params.alpha / batch.len() as f64))?;
                let loss = (data_loss + penalty)?;
                let value = loss.to_scalar::<f32>()? as f64;
                if !value.is_finite() {
                    return Err(EmotionError::Divergence { epoch });
                }
                optimizer.backward_step(&loss)?;
                total += value * batch.len() as f64;
            }
            let epoch_loss = total / n as f64;

            if epoch_loss > best_loss - TOLERANCE {
                stalled += 1;
            } else {
                stalled = 0;
            }
            best_loss = best_loss.min(epoch_loss);

            match self.params.schedule {
                LearningRateSchedule::Constant if stalled >= CONSTANT_PATIENCE => {
                    debug!(epoch, loss = epoch_loss, "loss plateaued; stopping");
                    break;
                }
                LearningRateSchedule::Adaptive if stalled >= ADAPTIVE_PATIENCE => {
                    learning_rate /= ADAPTIVE_DECAY;
                    if learning_rate < MIN_LEARNING_RATE {
                        debug!(epoch, loss = epoch_loss, "learning rate exhausted; stopping");
                        break;
                    }
                    optimizer.set_learning_rate(learning_rate);
                    stalled = 0;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.n_features {
            return Err(EmotionError::config(format!(
                "classifier expects {} features but got {}",
                self.n_features,
                x.ncols()
            )));
        }
        let logits = self.network.forward(&tensor_from_array(&x, &self.device)?)?;
        probabilities_to_array(&logits)
    }

    pub fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<usize>> {
        Ok(super::argmax_rows(&self.predict_proba(x)?))
    }

    pub fn params(&self) -> &MlpParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub(crate) fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub(crate) fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }
}
