use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

/// Inverted dropout applied to the concatenated encoder output.
///
/// The mask is sampled per call and handed back to the caller, so the layer
/// itself holds no per-batch state and inference goes through `&self`.
#[derive(Clone, Debug)]
pub struct Dropout {
    pub dropout_rate: f64,
}

impl Dropout {
    pub fn new(dropout_rate: f64) -> Self {
        assert!((0.0..1.0).contains(&dropout_rate),
                "Dropout rate must be in [0.0, 1.0)");

        Dropout { dropout_rate }
    }

    fn keep_prob(&self) -> f64 {
        1.0 - self.dropout_rate
    }

    /// Samples a keep-mask of 1.0/0.0 entries, or `None` when the rate is zero.
    pub fn sample_mask<R: Rng + ?Sized>(&self, shape: (usize, usize), rng: &mut R) -> Option<Array2<f64>> {
        if self.dropout_rate == 0.0 {
            return None;
        }
        let keep_prob = self.keep_prob();
        let mask = Array2::random_using(shape, Uniform::new(0.0, 1.0), rng)
            .mapv(|x: f64| if x < keep_prob { 1.0 } else { 0.0 });
        Some(mask)
    }

    /// Training-time forward pass; evaluation simply skips the layer.
    pub fn forward(&self, input: &Array2<f64>, mask: Option<&Array2<f64>>) -> Array2<f64> {
        match mask {
            Some(mask) => input * mask / self.keep_prob(),
            None => input.clone(),
        }
    }

    pub fn backward(&self, grad_output: &Array2<f64>, mask: Option<&Array2<f64>>) -> Array2<f64> {
        match mask {
            Some(mask) => grad_output * mask / self.keep_prob(),
            None => grad_output.clone(),
        }
    }
}
