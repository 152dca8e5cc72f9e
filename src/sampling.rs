//! Temperature-controlled sampling from a predicted next-ID distribution.

use ndarray::{Array1, ArrayView1};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SamplingError {
    #[error("cannot sample from an empty distribution")]
    Empty,
    #[error("temperature must be a positive finite number, got {0}")]
    InvalidTemperature(f64),
    #[error("distribution has no positive probability mass")]
    NoMass,
}

/// Reweights `probs` by temperature: p_i^(1/T), renormalised.
///
/// Computed as exp((ln p_i - max_j ln p_j) / T) so that tiny temperatures
/// collapse onto the arg-max instead of overflowing. Zero entries stay zero.
pub fn rescale_with_temperature(probs: ArrayView1<f64>, temperature: f64) -> Result<Array1<f64>, SamplingError> {
    if probs.is_empty() {
        return Err(SamplingError::Empty);
    }
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(SamplingError::InvalidTemperature(temperature));
    }

    let log_probs = probs.mapv(|p| if p > 0.0 { p.ln() } else { f64::NEG_INFINITY });
    let max_log = log_probs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max_log.is_finite() {
        return Err(SamplingError::NoMass);
    }

    let weights = log_probs.mapv(|lp| ((lp - max_log) / temperature).exp());
    let total = weights.sum();
    Ok(weights / total)
}

/// Draws one index from `probs` after temperature rescaling.
///
/// Lower temperatures sharpen towards the most likely ID, higher ones
/// flatten towards a uniform draw over the IDs with non-zero probability.
pub fn sample_with_temperature<R: Rng + ?Sized>(
    probs: ArrayView1<f64>,
    temperature: f64,
    rng: &mut R,
) -> Result<usize, SamplingError> {
    let rescaled = rescale_with_temperature(probs, temperature)?;
    let dist = WeightedIndex::<f64>::new(rescaled.iter()).map_err(|_| SamplingError::NoMass)?;
    Ok(dist.sample(rng))
}
