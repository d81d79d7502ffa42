use std::collections::BTreeMap;

/// Per-class loss multipliers, inversely proportional to class frequency.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassWeights {
    weights: BTreeMap<usize, f32>,
}

impl ClassWeights {
    /// `weight[c] = total / (classes_present * count[c])`.
    pub fn balanced(labels: &[usize]) -> Self {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &label in labels {
            *counts.entry(label).or_default() += 1;
        }
        let total = labels.len() as f32;
        let present = counts.len() as f32;
        let weights = counts
            .into_iter()
            .map(|(class, count)| (class, total / (present * count as f32)))
            .collect();
        Self { weights }
    }

    /// Weight of `class`; classes absent from training get a neutral 1.0.
    pub fn get(&self, class: usize) -> f32 {
        self.weights.get(&class).copied().unwrap_or(1.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.weights.iter().map(|(&class, &weight)| (class, weight))
    }

    /// Weight per example, in label order.
    pub fn per_example(&self, labels: &[usize]) -> Vec<f32> {
        labels.iter().map(|&label| self.get(label)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rare_class_gets_double_weight() {
        let mut labels = vec![0; 300];
        labels.extend(vec![1; 300]);
        labels.extend(vec![2; 150]);
        let weights = ClassWeights::balanced(&labels);
        assert_relative_eq!(weights.get(2), 2.0 * weights.get(0), epsilon = 1e-6);
        assert_relative_eq!(weights.get(0), weights.get(1), epsilon = 1e-6);
        assert_relative_eq!(weights.get(0), 750.0 / 900.0, epsilon = 1e-6);
    }

    #[test]
    fn weighted_class_mass_is_balanced() {
        let mut labels = vec![0; 90];
        labels.extend(vec![1; 10]);
        let weights = ClassWeights::balanced(&labels);
        let mass0: f32 = labels.iter().filter(|&&l| l == 0).map(|&l| weights.get(l)).sum();
        let mass1: f32 = labels.iter().filter(|&&l| l == 1).map(|&l| weights.get(l)).sum();
        assert_relative_eq!(mass0, mass1, epsilon = 1e-3);
        assert_relative_eq!(mass0 + mass1, labels.len() as f32, epsilon = 1e-3);
    }

    #[test]
    fn unseen_class_is_neutral() {
        let weights = ClassWeights::balanced(&[0, 0, 1]);
        assert_eq!(weights.get(7), 1.0);
        assert_eq!(weights.iter().count(), 2);
    }
}
