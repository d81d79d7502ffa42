use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{EmotionError, Result};

/// How augmented siblings are assigned to partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Split clip identities first; every variant of a clip lands in its clip's partition.
    #[default]
    ByClip,
    /// Augment first, then split individual examples. Siblings may straddle the boundary.
    ByExample,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_size: f64,
    pub seed: u64,
    pub mode: SplitMode,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            mode: SplitMode::ByClip,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(EmotionError::config(format!(
                "test_size must lie strictly between 0 and 1 (got {})",
                self.test_size
            )));
        }
        Ok(())
    }
}

/// Row indices of one train/test partition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partition `0..keys.len()` so each key keeps its share in both halves.
///
/// Per key, `round(count * test_size)` members go to test, clamped so a key with at
/// least two members is represented on both sides. Singletons stay in train.
pub fn stratified_split<K: Ord + Clone>(
    keys: &[K],
    test_size: f64,
    seed: u64,
) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(EmotionError::config(format!(
            "test_size must lie strictly between 0 and 1 (got {test_size})"
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = SplitIndices::default();

    for (_, mut members) in group_by_key(keys) {
        members.shuffle(&mut rng);
        let n = members.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_size).round() as usize).clamp(1, n - 1)
        };
        split.test.extend_from_slice(&members[..n_test]);
        split.train.extend_from_slice(&members[n_test..]);
    }

    split.train.shuffle(&mut rng);
    split.test.shuffle(&mut rng);
    Ok(split)
}

/// `k` folds whose held-out parts preserve per-class proportions.
pub fn stratified_kfold(labels: &[usize], k: usize, seed: u64) -> Result<Vec<SplitIndices>> {
    if k < 2 {
        return Err(EmotionError::config(format!("k-fold needs k >= 2 (got {k})")));
    }
    if labels.len() < k {
        return Err(EmotionError::config(format!(
            "cannot make {k} folds from {} examples",
            labels.len()
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut held_out: Vec<Vec<usize>> = vec![Vec::new(); k];
    let mut offset = 0;
    for (_, mut members) in group_by_key(labels) {
        members.shuffle(&mut rng);
        for (i, index) in members.iter().enumerate() {
            held_out[(offset + i) % k].push(*index);
        }
        offset = (offset + members.len()) % k;
    }

    let folds = (0..k)
        .map(|fold| {
            let test = held_out[fold].clone();
            let train = held_out
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != fold)
                .flat_map(|(_, indices)| indices.iter().copied())
                .collect();
            SplitIndices { train, test }
        })
        .collect();
    Ok(folds)
}

fn group_by_key<K: Ord + Clone>(keys: &[K]) -> BTreeMap<K, Vec<usize>> {
    let mut groups: BTreeMap<K, Vec<usize>> = BTreeMap::new();
    for (index, key) in keys.iter().enumerate() {
        groups.entry(key.clone()).or_default().push(index);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(indices: &[usize], keys: &[&str], key: &str) -> usize {
        indices.iter().filter(|&&i| keys[i] == key).count()
    }

    #[test]
    fn preserves_class_proportions() {
        let mut keys = vec!["a"; 50];
        keys.extend(vec!["b"; 30]);
        keys.extend(vec!["c"; 20]);
        for ratio in [0.1, 0.2, 0.25, 0.5] {
            let split = stratified_split(&keys, ratio, 7).unwrap();
            assert_eq!(split.train.len() + split.test.len(), keys.len());
            for (class, total) in [("a", 50.0), ("b", 30.0), ("c", 20.0)] {
                let share = count(&split.test, &keys, class) as f64 / total;
                assert!((share - ratio).abs() < 0.05, "{class} share {share} vs {ratio}");
            }
        }
    }

    #[test]
    fn partitions_are_disjoint_and_reproducible() {
        let keys: Vec<usize> = (0..40).map(|i| i % 4).collect();
        let first = stratified_split(&keys, 0.25, 1).unwrap();
        let second = stratified_split(&keys, 0.25, 1).unwrap();
        assert_eq!(first, second);
        assert!(first.test.iter().all(|i| !first.train.contains(i)));
    }

    #[test]
    fn rejects_degenerate_ratio() {
        assert!(stratified_split(&[1, 2, 3], 0.0, 0).is_err());
        assert!(stratified_split(&[1, 2, 3], 1.0, 0).is_err());
    }

    #[test]
    fn kfold_covers_every_example_once() {
        let labels: Vec<usize> = (0..30).map(|i| i % 3).collect();
        let folds = stratified_kfold(&labels, 3, 5).unwrap();
        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..30).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.test.len(), 10);
            assert_eq!(fold.train.len(), 20);
            for class in 0..3 {
                let held = fold.test.iter().filter(|&&i| labels[i] == class).count();
                assert!((3..=4).contains(&held));
            }
        }
    }
}
