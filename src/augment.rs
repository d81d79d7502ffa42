//! Signal-level perturbations used to synthesise extra training examples.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const FLOOR_SLACK: f64 = 1e-12;

/// Which way `shift` is allowed to rotate a waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShiftDirection {
    Left,
    Right,
    #[default]
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Scale applied to unit-variance Gaussian noise.
    pub noise_factor: f32,
    /// Upper bound (exclusive) of the shift, as a fraction of the clip length.
    pub shift_max_fraction: f64,
    pub shift_direction: ShiftDirection,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            noise_factor: 0.005,
            shift_max_fraction: 0.2,
            shift_direction: ShiftDirection::Both,
        }
    }
}

/// Return `waveform + factor * N(0, 1)` sample by sample. No clipping is applied.
pub fn add_noise<R: Rng + ?Sized>(waveform: &[f32], factor: f32, rng: &mut R) -> Vec<f32> {
    waveform
        .iter()
        .map(|&sample| sample + factor * standard_normal(rng))
        .collect()
}

/// Circularly rotate the waveform by a random amount in `[0, floor(len * max_fraction))`.
pub fn shift<R: Rng + ?Sized>(
    waveform: &[f32],
    max_fraction: f64,
    direction: ShiftDirection,
    rng: &mut R,
) -> Vec<f32> {
    let amount = draw_shift(waveform.len(), max_fraction, direction, rng);
    rotate(waveform, amount)
}

/// Rotate by `amount` samples; positive moves samples towards the end and wraps them around.
pub fn rotate(waveform: &[f32], amount: isize) -> Vec<f32> {
    let mut rotated = waveform.to_vec();
    if rotated.is_empty() {
        return rotated;
    }
    let k = amount.rem_euclid(rotated.len() as isize) as usize;
    rotated.rotate_right(k);
    rotated
}

fn draw_shift<R: Rng + ?Sized>(
    len: usize,
    max_fraction: f64,
    direction: ShiftDirection,
    rng: &mut R,
) -> isize {
    // decimal fractions such as 0.29 land a hair below the integer product
    let product = len as f64 * max_fraction.max(0.0);
    let upper = (product * (1.0 + FLOOR_SLACK)).floor() as usize;
    if upper == 0 {
        return 0;
    }
    let magnitude = rng.random_range(0..upper) as isize;
    match direction {
        ShiftDirection::Right => magnitude,
        ShiftDirection::Left => -magnitude,
        ShiftDirection::Both if rng.random_bool(0.5) => -magnitude,
        ShiftDirection::Both => magnitude,
    }
}

// Box-Muller; `1 - u` keeps the logarithm away from zero.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()) as f32
}

/// Seeded source of augmented variants for one dataset build.
#[derive(Debug)]
pub struct Augmentor {
    config: AugmentConfig,
    rng: StdRng,
}

impl Augmentor {
    pub fn new(config: AugmentConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    pub fn noisy(&mut self, waveform: &[f32]) -> Vec<f32> {
        add_noise(waveform, self.config.noise_factor, &mut self.rng)
    }

    pub fn shifted(&mut self, waveform: &[f32]) -> Vec<f32> {
        shift(
            waveform,
            self.config.shift_max_fraction,
            self.config.shift_direction,
            &mut self.rng,
        )
    }
}
