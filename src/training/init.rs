use candle_core::Tensor;
use candle_nn::VarMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{EmotionError, Result};

/// Re-draw every weight matrix / kernel in `varmap` from a seeded Glorot-uniform
/// distribution. Rank-1 parameters (biases, normalisation scales and running
/// statistics) keep the values they were created with.
pub(crate) fn glorot_reseed(varmap: &VarMap, seed: u64) -> Result<()> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| EmotionError::training("parameter store lock poisoned"))?;
    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();

    let mut rng = StdRng::seed_from_u64(seed);
    for name in names {
        let var = &vars[name];
        let dims = var.dims().to_vec();
        if dims.len() < 2 {
            continue;
        }
        let receptive: usize = dims[2..].iter().product();
        let fan_in = dims[1] * receptive;
        let fan_out = dims[0] * receptive;
        let bound = (6.0 / (fan_in + fan_out) as f64).sqrt() as f32;
        let values: Vec<f32> = (0..var.elem_count())
            .map(|_| rng.random_range(-bound..bound))
            .collect();
        var.set(&Tensor::from_vec(values, dims, var.device())?)?;
    }
    Ok(())
}
