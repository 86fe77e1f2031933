//! Seeded parameter initialization.
//!
//! Candle cannot seed its CPU generator, so reproducible runs draw initial
//! values from `oorandom` and write them through [`Var::set`].

use candle_core::{Tensor, Var};

use crate::error::Result;

/// Fill `var` with values drawn uniformly from `[-bound, bound)`.
pub fn fill_uniform(var: &Var, bound: f32, rng: &mut oorandom::Rand32) -> Result<()> {
    let values: Vec<f32> = (0..var.elem_count())
        .map(|_| (rng.rand_float() * 2.0 - 1.0) * bound)
        .collect();
    set(var, values)
}

/// Fill `var` with standard normal values (Box-Muller).
pub fn fill_normal(var: &Var, rng: &mut oorandom::Rand32) -> Result<()> {
    let values: Vec<f32> = (0..var.elem_count())
        .map(|_| {
            // 1 - u keeps the logarithm finite.
            let u1 = 1.0 - rng.rand_float();
            let u2 = rng.rand_float();
            (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
        })
        .collect();
    set(var, values)
}

/// Bound for a layer with `fan_in` inputs per output unit.
pub fn fan_in_bound(fan_in: usize) -> f32 {
    1.0 / (fan_in.max(1) as f32).sqrt()
}

fn set(var: &Var, values: Vec<f32>) -> Result<()> {
    let tensor = Tensor::from_vec(values, var.dims(), var.device())?.to_dtype(var.dtype())?;
    var.set(&tensor)?;
    Ok(())
}
