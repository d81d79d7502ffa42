use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::metrics::{accuracy, EvaluationReport};
use super::mlp::{LearningRateSchedule, MlpClassifier, MlpParams};
use super::scaler::StandardScaler;
use crate::dataset::{stratified_kfold, Dataset, LabelEncoder, SplitIndices, TrainTestSplit};
use crate::error::{EmotionError, Result};
use crate::features::{PooledFlags, SpectralConfig};

/// Exhaustive hyperparameter domain for the pooled-feature classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpGrid {
    pub hidden_units: Vec<usize>,
    pub alphas: Vec<f64>,
    pub schedules: Vec<LearningRateSchedule>,
    pub max_iters: Vec<usize>,
}

impl Default for MlpGrid {
    fn default() -> Self {
        Self {
            hidden_units: vec![256, 300],
            alphas: vec![1e-4, 1e-3, 1e-2],
            schedules: vec![LearningRateSchedule::Constant, LearningRateSchedule::Adaptive],
            max_iters: vec![300, 500],
        }
    }
}

impl MlpGrid {
    /// Cartesian product in a fixed order: hidden units outermost, max_iter innermost.
    pub fn candidates(&self) -> Vec<MlpParams> {
        let mut out = Vec::new();
        for &hidden_units in &self.hidden_units {
            for &alpha in &self.alphas {
                for &schedule in &self.schedules {
                    for &max_iter in &self.max_iters {
                        out.push(MlpParams {
                            hidden_units,
                            alpha,
                            schedule,
                            max_iter,
                        });
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearchConfig {
    pub grid: MlpGrid,
    pub folds: usize,
    pub seed: u64,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            grid: MlpGrid::default(),
            folds: 3,
            seed: 42,
        }
    }
}

impl GridSearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.folds < 2 {
            return Err(EmotionError::config(format!(
                "grid search needs at least 2 folds (got {})",
                self.folds
            )));
        }
        if self.grid.candidates().is_empty() {
            return Err(EmotionError::config("hyperparameter grid is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub params: MlpParams,
    /// Mean fold accuracy, `-inf` when any fold failed.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSearchResult {
    pub best: MlpParams,
    pub best_score: f64,
    /// Every candidate in grid order.
    pub scores: Vec<CandidateScore>,
}

/// Cross-validated search over `config.grid`, fitting candidates in parallel.
pub fn grid_search(
    x: ArrayView2<'_, f32>,
    y: &[usize],
    n_classes: usize,
    config: &GridSearchConfig,
) -> Result<GridSearchResult> {
    config.validate()?;
    let folds = stratified_kfold(y, config.folds, config.seed)?;
    let candidates = config.grid.candidates();
    info!(
        candidates = candidates.len(),
        folds = folds.len(),
        "starting grid search"
    );

    let scores: Vec<CandidateScore> = candidates
        .par_iter()
        .map(|params| {
            let score = match cross_validate(x, y, n_classes, *params, &folds, config.seed) {
                Ok(score) if score.is_finite() => score,
                Ok(_) => f64::NEG_INFINITY,
                Err(err) => {
                    warn!(%params, error = %err, "candidate failed");
                    f64::NEG_INFINITY
                }
            };
            CandidateScore {
                params: *params,
                score,
            }
        })
        .collect();

    let mut best: Option<(MlpParams, f64)> = None;
    for candidate in &scores {
        if candidate.score == f64::NEG_INFINITY {
            continue;
        }
        if best.map_or(true, |(_, score)| candidate.score > score) {
            best = Some((candidate.params, candidate.score));
        }
    }
    let (best, best_score) =
        best.ok_or_else(|| EmotionError::training("every grid candidate failed"))?;
    info!(params = %best, score = best_score, "grid search finished");

    Ok(GridSearchResult {
        best,
        best_score,
        scores,
    })
}

fn cross_validate(
    x: ArrayView2<'_, f32>,
    y: &[usize],
    n_classes: usize,
    params: MlpParams,
    folds: &[SplitIndices],
    seed: u64,
) -> Result<f64> {
    let mut total = 0.0;
    for fold in folds {
        let x_train = x.select(Axis(0), &fold.train);
        let y_train: Vec<usize> = fold.train.iter().map(|&i| y[i]).collect();
        let x_test = x.select(Axis(0), &fold.test);
        let y_test: Vec<usize> = fold.test.iter().map(|&i| y[i]).collect();

        let model = MlpClassifier::fit(x_train.view(), &y_train, n_classes, params, seed)?;
        total += accuracy(&y_test, &model.predict(x_test.view())?);
    }
    Ok(total / folds.len() as f64)
}

/// Scaler, encoder and network of the pooled-feature path, plus the extraction
/// settings needed to featurise new clips the same way.
pub struct ClassicalModel {
    pub scaler: StandardScaler,
    pub encoder: LabelEncoder,
    pub classifier: MlpClassifier,
    pub spectral: SpectralConfig,
    pub flags: PooledFlags,
}

impl ClassicalModel {
    /// Class indices for raw (unscaled) pooled feature rows.
    pub fn predict_features(&self, features: ArrayView2<'_, f32>) -> Result<Vec<usize>> {
        let scaled = self.scaler.transform(features)?;
        self.classifier.predict(scaled.view())
    }

    pub fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let scaled = self.scaler.transform(features)?;
        self.classifier.predict_proba(scaled.view())
    }

    pub fn evaluate(&self, data: &Dataset<Array1<f32>>) -> Result<EvaluationReport> {
        let predicted = self.predict_features(data.to_matrix()?.view())?;
        EvaluationReport::from_predictions(&data.labels, &predicted, &self.encoder)
    }
}

pub struct ClassicalOutcome {
    pub model: ClassicalModel,
    pub report: EvaluationReport,
    pub search: GridSearchResult,
}

/// Standardise, search, refit the winner on the whole training split and evaluate
/// on the held-out split. The scaler only ever sees training rows.
pub fn train_classical(
    split: &TrainTestSplit<Array1<f32>>,
    spectral: &SpectralConfig,
    flags: PooledFlags,
    config: &GridSearchConfig,
) -> Result<ClassicalOutcome> {
    let train = split.train.to_matrix()?;
    let scaler = StandardScaler::fit(train.view())?;
    let train_scaled = scaler.transform(train.view())?;
    let n_classes = split.encoder.num_classes();

    let search = grid_search(train_scaled.view(), &split.train.labels, n_classes, config)?;
    let classifier = MlpClassifier::fit(
        train_scaled.view(),
        &split.train.labels,
        n_classes,
        search.best,
        config.seed,
    )?;

    let model = ClassicalModel {
        scaler,
        encoder: split.encoder.clone(),
        classifier,
        spectral: spectral.clone(),
        flags,
    };
    let report = model.evaluate(&split.test)?;
    info!(
        accuracy = report.accuracy,
        macro_f1 = report.macro_f1,
        "classical model evaluated"
    );
    Ok(ClassicalOutcome {
        model,
        report,
        search,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_has_twenty_four_candidates_in_fixed_order() {
        let candidates = MlpGrid::default().candidates();
        assert_eq!(candidates.len(), 24);
        assert_eq!(candidates[0].hidden_units, 256);
        assert_eq!(candidates[0].max_iter, 300);
        assert_eq!(candidates[1].max_iter, 500);
        assert_eq!(candidates[23].hidden_units, 300);
        assert_eq!(candidates[23].schedule, LearningRateSchedule::Adaptive);
    }

    #[test]
    fn empty_grid_is_rejected() {
        let config = GridSearchConfig {
            grid: MlpGrid {
                alphas: Vec::new(),
                ..MlpGrid::default()
            },
            ..GridSearchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn failing_candidates_score_negative_infinity() {
        // hidden width 0 cannot be built; the other candidate still wins
        let x = Array2::from_shape_fn((30, 2), |(i, j)| {
            let class = (i % 3) as f32;
            class * 3.0 + j as f32 + (i as f32 * 0.1).sin() * 0.1
        });
        let y: Vec<usize> = (0..30).map(|i| i % 3).collect();
        let config = GridSearchConfig {
            grid: MlpGrid {
                hidden_units: vec![0, 8],
                alphas: vec![1e-4],
                schedules: vec![LearningRateSchedule::Constant],
                max_iters: vec![50],
            },
            folds: 3,
            seed: 1,
        };
        let result = grid_search(x.view(), &y, 3, &config).unwrap();
        assert_eq!(result.scores[0].score, f64::NEG_INFINITY);
        assert!(result.scores[1].score.is_finite());
        assert_eq!(result.best.hidden_units, 8);
    }

    #[test]
    fn all_failing_candidates_is_an_error() {
        let x = Array2::<f32>::zeros((9, 2));
        let y: Vec<usize> = (0..9).map(|i| i % 3).collect();
        let config = GridSearchConfig {
            grid: MlpGrid {
                hidden_units: vec![0],
                alphas: vec![1e-4],
                schedules: vec![LearningRateSchedule::Constant],
                max_iters: vec![5],
            },
            folds: 3,
            seed: 1,
        };
        assert!(matches!(
            grid_search(x.view(), &y, 3, &config),
            Err(EmotionError::Training(_))
        ));
    }
}
