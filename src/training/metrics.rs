use std::fmt::{self, Display, Formatter};

use ndarray::Array2;

use crate::dataset::LabelEncoder;
use crate::error::{EmotionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Held-out evaluation keyed by the label encoder's class order.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub macro_f1: f64,
    pub per_class: Vec<ClassMetrics>,
    /// Rows are true classes, columns predicted classes.
    pub confusion: Array2<usize>,
}

impl EvaluationReport {
    pub fn from_predictions(
        y_true: &[usize],
        y_pred: &[usize],
        encoder: &LabelEncoder,
    ) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(EmotionError::training(format!(
                "{} labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        let n = encoder.num_classes();
        let mut confusion = Array2::<usize>::zeros((n, n));
        for (&truth, &guess) in y_true.iter().zip(y_pred) {
            if truth >= n || guess >= n {
                return Err(EmotionError::training(format!(
                    "class index out of range for {n} classes"
                )));
            }
            confusion[[truth, guess]] += 1;
        }

        let correct: usize = (0..n).map(|c| confusion[[c, c]]).sum();
        let accuracy = ratio(correct, y_true.len());

        let per_class: Vec<ClassMetrics> = encoder
            .classes()
            .iter()
            .enumerate()
            .map(|(c, label)| {
                let tp = confusion[[c, c]];
                let predicted = confusion.column(c).sum();
                let support = confusion.row(c).sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();
        let macro_f1 = if per_class.is_empty() {
            0.0
        } else {
            per_class.iter().map(|m| m.f1).sum::<f64>() / per_class.len() as f64
        };

        Ok(Self {
            accuracy,
            macro_f1,
            per_class,
            confusion,
        })
    }
}

/// Fraction of predictions equal to the truth.
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let correct = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    ratio(correct, y_true.len())
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl Display for EvaluationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "accuracy: {:.4}", self.accuracy)?;
        writeln!(f, "macro f1: {:.4}", self.macro_f1)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10} {:>8}",
            "class", "precision", "recall", "f1", "support"
        )?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:>12} {:>10.4} {:>10.4} {:>10.4} {:>8}",
                m.label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f, "confusion (rows = true, columns = predicted):")?;
        write!(f, "{:>12}", "")?;
        for m in &self.per_class {
            write!(f, " {:>6.6}", m.label)?;
        }
        writeln!(f)?;
        for (row, m) in self.confusion.outer_iter().zip(&self.per_class) {
            write!(f, "{:>12}", m.label)?;
            for count in row {
                write!(f, " {:>6}", count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
