use std::collections::BTreeSet;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{EmotionError, Result};

/// Bijection between class names and contiguous indices, in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = labels
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(label))
            .map_err(|_| EmotionError::config(format!("label '{label}' was not seen when fitting")))
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| {
                EmotionError::config(format!(
                    "class index {index} out of range for {} classes",
                    self.classes.len()
                ))
            })
    }

    pub fn one_hot(&self, index: usize) -> Result<Array1<f32>> {
        if index >= self.classes.len() {
            return Err(EmotionError::config(format!(
                "class index {index} out of range for {} classes",
                self.classes.len()
            )));
        }
        let mut encoded = Array1::zeros(self.classes.len());
        encoded[index] = 1.0;
        Ok(encoded)
    }
}
