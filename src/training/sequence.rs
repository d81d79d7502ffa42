//! Convolution + recurrent classifier over fixed-length MFCC sequences.
//!
//! Layout per example is time-major `(max_len, n_mfcc)`; the network transposes to
//! channels-first for the two convolution blocks, halves the time axis after each,
//! runs an LSTM over what is left and classifies its final hidden state.

use std::collections::HashMap;

use candle_core::{DType, Device, Module, ModuleT, Tensor, D};
use candle_nn::{
    AdamW, BatchNorm, BatchNormConfig, Conv1d, Conv1dConfig, Dropout, LSTMConfig, Linear,
    Optimizer, ParamsAdamW, VarBuilder, VarMap, LSTM, RNN,
};
use ndarray::{concatenate, Array1, Array2, Array3, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::class_weights::ClassWeights;
use super::metrics::{accuracy, EvaluationReport};
use super::{argmax_rows, init, probabilities_to_array, tensor_from_array, u32_tensor};
use crate::dataset::{Dataset, LabelEncoder};
use crate::error::{EmotionError, Result};

const INFERENCE_BATCH: usize = 64;

/// Fixed layer sizes of the sequence network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceArchitecture {
    pub n_mfcc: usize,
    pub max_len: usize,
    pub num_classes: usize,
    pub conv1_filters: usize,
    pub conv2_filters: usize,
    pub kernel_size: usize,
    pub lstm_units: usize,
    pub dense_units: usize,
    pub dropout: f32,
}

impl SequenceArchitecture {
    pub fn new(n_mfcc: usize, max_len: usize, num_classes: usize) -> Self {
        Self {
            n_mfcc,
            max_len,
            num_classes,
            conv1_filters: 64,
            conv2_filters: 128,
            kernel_size: 5,
            lstm_units: 128,
            dense_units: 64,
            dropout: 0.3,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_mfcc == 0 || self.num_classes == 0 {
            return Err(EmotionError::config(
                "sequence model needs at least one coefficient and one class",
            ));
        }
        // two pooling stages must leave at least one step for the LSTM
        if self.max_len < 4 {
            return Err(EmotionError::config(format!(
                "max_len must be at least 4 (got {})",
                self.max_len
            )));
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(EmotionError::config("kernel_size must be odd"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(EmotionError::config("dropout must lie in [0, 1)"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceTrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub patience: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for SequenceTrainConfig {
    fn default() -> Self {
        Self {
            epochs: 60,
            batch_size: 32,
            patience: 10,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

impl SequenceTrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 || self.batch_size == 0 || self.patience == 0 {
            return Err(EmotionError::config(
                "epochs, batch_size and patience must be positive",
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(EmotionError::config(format!(
                "learning_rate must be positive (got {})",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Per-epoch curves of one training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
    /// 1-based epoch whose weights the model holds after training.
    pub best_epoch: usize,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn epochs_run(&self) -> usize {
        self.train_loss.len()
    }

    pub fn best_val_loss(&self) -> Option<f64> {
        self.best_epoch
            .checked_sub(1)
            .and_then(|i| self.val_loss.get(i))
            .copied()
    }
}

struct ConvBlock {
    conv: Conv1d,
    norm: BatchNorm,
    dropout: Dropout,
}

impl ConvBlock {
    fn new(in_channels: usize, filters: usize, arch: &SequenceArchitecture, vb: VarBuilder) -> Result<Self> {
        let conv_config = Conv1dConfig {
            padding: arch.kernel_size / 2,
            ..Default::default()
        };
        let norm_config = BatchNormConfig {
            eps: 1e-3,
            ..Default::default()
        };
        Ok(Self {
            conv: candle_nn::conv1d(in_channels, filters, arch.kernel_size, conv_config, vb.pp("conv"))?,
            norm: candle_nn::batch_norm(filters, norm_config, vb.pp("norm"))?,
            dropout: Dropout::new(arch.dropout),
        })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let xs = self.conv.forward(xs)?.relu()?;
        let xs = self.norm.forward_t(&xs, train)?;
        let xs = pool_pairs(&xs)?;
        self.dropout.forward_t(&xs, train)
    }
}

/// Max over adjacent frame pairs of a `(batch, channels, time)` tensor; an odd
/// trailing frame is dropped.
fn pool_pairs(xs: &Tensor) -> candle_core::Result<Tensor> {
    let (batch, channels, time) = xs.dims3()?;
    let even = time - time % 2;
    xs.narrow(2, 0, even)?
        .contiguous()?
        .reshape((batch, channels, even / 2, 2))?
        .max(3)
}

struct SequenceNet {
    block1: ConvBlock,
    block2: ConvBlock,
    lstm: LSTM,
    dense: Linear,
    dropout: Dropout,
    output: Linear,
}

impl SequenceNet {
    fn new(arch: &SequenceArchitecture, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            block1: ConvBlock::new(arch.n_mfcc, arch.conv1_filters, arch, vb.pp("block1"))?,
            block2: ConvBlock::new(arch.conv1_filters, arch.conv2_filters, arch, vb.pp("block2"))?,
            lstm: candle_nn::lstm(
                arch.conv2_filters,
                arch.lstm_units,
                LSTMConfig::default(),
                vb.pp("lstm"),
            )?,
            dense: candle_nn::linear(arch.lstm_units, arch.dense_units, vb.pp("dense"))?,
            dropout: Dropout::new(arch.dropout),
            output: candle_nn::linear(arch.dense_units, arch.num_classes, vb.pp("output"))?,
        })
    }

    /// `(batch, time, coefficients)` in, logits `(batch, classes)` out.
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let xs = xs.transpose(1, 2)?.contiguous()?;
        let xs = self.block1.forward_t(&xs, train)?;
        let xs = self.block2.forward_t(&xs, train)?;
        let xs = xs.transpose(1, 2)?.contiguous()?;
        let states = self.lstm.seq(&xs)?;
        let last = states
            .last()
            .ok_or_else(|| candle_core::Error::Msg("lstm produced no states".into()))?;
        let xs = self.dense.forward(last.h())?.relu()?;
        let xs = self.dropout.forward_t(&xs, train)?;
        self.output.forward(&xs)
    }
}

/// Trainable sequence classifier with its parameter store.
pub struct SequenceModel {
    varmap: VarMap,
    network: SequenceNet,
    architecture: SequenceArchitecture,
    device: Device,
}

impl SequenceModel {
    pub fn new(architecture: SequenceArchitecture, seed: u64) -> Result<Self> {
        architecture.validate()?;
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = SequenceNet::new(&architecture, vb)?;
        init::glorot_reseed(&varmap, seed)?;
        Ok(Self {
            varmap,
            network,
            architecture,
            device,
        })
    }

    pub fn architecture(&self) -> &SequenceArchitecture {
        &self.architecture
    }

    /// Train on `train`, monitoring `validation` after every epoch. The weights of
    /// the epoch with the lowest validation loss are restored before returning.
    pub fn fit(
        &mut self,
        train: &Dataset<Array2<f32>>,
        validation: &Dataset<Array2<f32>>,
        config: &SequenceTrainConfig,
    ) -> Result<TrainingHistory> {
        config.validate()?;
        if train.is_empty() || validation.is_empty() {
            return Err(EmotionError::training(
                "sequence training needs non-empty train and validation sets",
            ));
        }
        let x_train = self.input_tensor(&train.to_tensor()?.view())?;
        let y_train = u32_tensor(&train.labels, &self.device)?;
        let x_val = self.input_tensor(&validation.to_tensor()?.view())?;
        let y_val = u32_tensor(&validation.labels, &self.device)?;
        self.check_labels(&train.labels)?;
        self.check_labels(&validation.labels)?;

        let example_weights = balanced_example_weights(&train.labels, &self.device)?;

        let mut optimizer = AdamW::new(
            self.varmap.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = TrainingHistory::default();
        let mut best: Option<(f64, HashMap<String, Tensor>)> = None;
        let mut wait = 0usize;

        for epoch in 1..=config.epochs {
            order.shuffle(&mut rng);
            let mut total = 0.0;
            for batch in order.chunks(config.batch_size) {
                let index = u32_tensor(batch, &self.device)?;
                let xb = x_train.index_select(&index, 0)?;
                let yb = y_train.index_select(&index, 0)?;
                let wb = example_weights.index_select(&index, 0)?;
                let logits = self.network.forward_t(&xb, true)?;
                let loss = weighted_cross_entropy(&logits, &yb, &wb)?;
                let value = loss.to_scalar::<f32>()? as f64;
                if !value.is_finite() {
                    return Err(EmotionError::Divergence { epoch });
                }
                optimizer.backward_step(&loss)?;
                total += value * batch.len() as f64;
            }
            let train_loss = total / train.len() as f64;

            let val_logits = self.network.forward_t(&x_val, false)?;
            let val_loss = candle_nn::loss::cross_entropy(&val_logits, &y_val)?.to_scalar::<f32>()? as f64;
            let val_accuracy = accuracy(
                &validation.labels,
                &argmax_rows(&probabilities_to_array(&val_logits)?),
            );
            info!(epoch, train_loss, val_loss, val_accuracy, "epoch finished");
            history.train_loss.push(train_loss);
            history.val_loss.push(val_loss);
            history.val_accuracy.push(val_accuracy);

            let improved = val_loss.is_finite() && best.as_ref().map_or(true, |(b, _)| val_loss < *b);
            if improved {
                best = Some((val_loss, self.snapshot()?));
                history.best_epoch = epoch;
                wait = 0;
            } else {
                wait += 1;
                if wait >= config.patience {
                    info!(epoch, best_epoch = history.best_epoch, "early stopping");
                    history.stopped_early = true;
                    break;
                }
            }
        }

        if let Some((_, weights)) = best {
            self.restore(&weights)?;
        }
        Ok(history)
    }

    /// Class probabilities for a `(batch, max_len, n_mfcc)` block.
    pub fn predict_proba(&self, features: ArrayView3<'_, f32>) -> Result<Array2<f32>> {
        let mut parts = Vec::new();
        for chunk in features.axis_chunks_iter(Axis(0), INFERENCE_BATCH) {
            let logits = self.network.forward_t(&self.input_tensor(&chunk)?, false)?;
            parts.push(probabilities_to_array(&logits)?);
        }
        if parts.is_empty() {
            return Ok(Array2::zeros((0, self.architecture.num_classes)));
        }
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        Ok(concatenate(Axis(0), &views)?)
    }

    pub fn predict(&self, features: ArrayView3<'_, f32>) -> Result<Vec<usize>> {
        Ok(argmax_rows(&self.predict_proba(features)?))
    }

    /// Probabilities for one `(max_len, n_mfcc)` example.
    pub fn predict_one(&self, sequence: &Array2<f32>) -> Result<Array1<f32>> {
        let batch = sequence.view().insert_axis(Axis(0));
        let probs = self.predict_proba(batch)?;
        Ok(probs.row(0).to_owned())
    }

    pub fn evaluate(&self, data: &Dataset<Array2<f32>>, encoder: &LabelEncoder) -> Result<EvaluationReport> {
        let features: Array3<f32> = data.to_tensor()?;
        let predicted = self.predict(features.view())?;
        EvaluationReport::from_predictions(&data.labels, &predicted, encoder)
    }

    fn input_tensor(&self, features: &ArrayView3<'_, f32>) -> Result<Tensor> {
        let (_, time, coefficients) = features.dim();
        if time != self.architecture.max_len || coefficients != self.architecture.n_mfcc {
            return Err(EmotionError::config(format!(
                "model expects ({}, {}) sequences but got ({time}, {coefficients})",
                self.architecture.max_len, self.architecture.n_mfcc
            )));
        }
        tensor_from_array(features, &self.device)
    }

    fn check_labels(&self, labels: &[usize]) -> Result<()> {
        match labels.iter().find(|&&l| l >= self.architecture.num_classes) {
            Some(bad) => Err(EmotionError::training(format!(
                "label {bad} out of range for {} classes",
                self.architecture.num_classes
            ))),
            None => Ok(()),
        }
    }

    fn snapshot(&self) -> Result<HashMap<String, Tensor>> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| EmotionError::training("parameter store lock poisoned"))?;
        let mut copy = HashMap::with_capacity(vars.len());
        for (name, var) in vars.iter() {
            copy.insert(name.clone(), var.as_tensor().copy()?);
        }
        Ok(copy)
    }

    fn restore(&self, snapshot: &HashMap<String, Tensor>) -> Result<()> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| EmotionError::training("parameter store lock poisoned"))?;
        for (name, var) in vars.iter() {
            if let Some(saved) = snapshot.get(name) {
                var.set(saved)?;
            }
        }
        Ok(())
    }

    pub(crate) fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub(crate) fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }
}

/// Balanced class weight of every training example, in label order.
fn balanced_example_weights(labels: &[usize], device: &Device) -> candle_core::Result<Tensor> {
    let weights = ClassWeights::balanced(labels);
    debug!(?weights, "class weights");
    Tensor::from_vec(weights.per_example(labels), labels.len(), device)
}

/// Mean of `-log p(label) * weight` over the batch.
fn weighted_cross_entropy(logits: &Tensor, labels: &Tensor, weights: &Tensor) -> candle_core::Result<Tensor> {
    let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    let picked = log_probs.gather(&labels.unsqueeze(1)?, 1)?.squeeze(1)?;
    picked.neg()?.mul(weights)?.mean_all()
}
