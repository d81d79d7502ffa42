use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{EmotionError, Result};

const MIN_STD: f32 = 1e-8;

/// Per-feature standardisation fitted on training rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f32>,
    std: Array1<f32>,
}

impl StandardScaler {
    pub fn fit(rows: ArrayView2<'_, f32>) -> Result<Self> {
        let mean = rows
            .mean_axis(Axis(0))
            .ok_or_else(|| EmotionError::training("cannot fit a scaler on zero rows"))?;
        let std = rows
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > MIN_STD { s } else { 1.0 });
        Ok(Self { mean, std })
    }

    pub fn transform(&self, rows: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        if rows.ncols() != self.mean.len() {
            return Err(EmotionError::config(format!(
                "scaler fitted on {} features but got {}",
                self.mean.len(),
                rows.ncols()
            )));
        }
        Ok((&rows - &self.mean) / &self.std)
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn standardises_columns() {
        let rows = array![[1.0_f32, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(rows.view()).unwrap();
        let scaled = scaler.transform(rows.view()).unwrap();
        let mean = scaled.mean_axis(Axis(0)).unwrap();
        assert_abs_diff_eq!(mean[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(scaled.std_axis(Axis(0), 0.0)[0], 1.0, epsilon = 1e-5);
        // constant column is centred but not blown up
        assert!(scaled.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn rejects_wrong_width() {
        let scaler = StandardScaler::fit(array![[1.0_f32, 2.0]].view()).unwrap();
        assert!(scaler.transform(array![[1.0_f32]].view()).is_err());
    }
}
