use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

use crate::layers::{CellKind, Gradients, Parameters, RecurrentCell};
use crate::utils::{sigmoid, tanh_grad_from_output};

/// Holds gradients for all GRU cell parameters during backpropagation
#[derive(Clone, Debug)]
pub struct GRUCellGradients {
    pub w_ir: Array2<f64>,
    pub w_hr: Array2<f64>,
    pub b_ir: Array2<f64>,
    pub b_hr: Array2<f64>,
    pub w_iz: Array2<f64>,
    pub w_hz: Array2<f64>,
    pub b_iz: Array2<f64>,
    pub b_hz: Array2<f64>,
    pub w_in: Array2<f64>,
    pub w_hn: Array2<f64>,
    pub b_in: Array2<f64>,
    pub b_hn: Array2<f64>,
}

impl Gradients for GRUCellGradients {
    fn tensors(&self) -> Vec<&Array2<f64>> {
        vec![
            &self.w_ir, &self.w_hr, &self.b_ir, &self.b_hr,
            &self.w_iz, &self.w_hz, &self.b_iz, &self.b_hz,
            &self.w_in, &self.w_hn, &self.b_in, &self.b_hn,
        ]
    }

    fn tensors_mut(&mut self) -> Vec<&mut Array2<f64>> {
        vec![
            &mut self.w_ir, &mut self.w_hr, &mut self.b_ir, &mut self.b_hr,
            &mut self.w_iz, &mut self.w_hz, &mut self.b_iz, &mut self.b_hz,
            &mut self.w_in, &mut self.w_hn, &mut self.b_in, &mut self.b_hn,
        ]
    }
}

/// Caches intermediate values during forward pass for efficient backward computation
#[derive(Clone, Debug)]
pub struct GRUCellCache {
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub reset_gate: Array2<f64>,
    pub update_gate: Array2<f64>,
    pub new_gate: Array2<f64>,
    pub reset_hidden: Array2<f64>,
}

/// GRU cell with trainable parameters
///
/// - r_t = σ(W_ir * x_t + b_ir + W_hr * h_t-1 + b_hr)
/// - z_t = σ(W_iz * x_t + b_iz + W_hz * h_t-1 + b_hz)
/// - n_t = tanh(W_in * x_t + b_in + W_hn * (r_t ⊙ h_t-1) + b_hn)
/// - h_t = (1 - z_t) ⊙ h_t-1 + z_t ⊙ n_t
#[derive(Clone, Debug)]
pub struct GRUCell {
    // Reset gate parameters
    pub w_ir: Array2<f64>,
    pub w_hr: Array2<f64>,
    pub b_ir: Array2<f64>,
    pub b_hr: Array2<f64>,

    // Update gate parameters
    pub w_iz: Array2<f64>,
    pub w_hz: Array2<f64>,
    pub b_iz: Array2<f64>,
    pub b_hz: Array2<f64>,

    // Candidate state parameters
    pub w_in: Array2<f64>,
    pub w_hn: Array2<f64>,
    pub b_in: Array2<f64>,
    pub b_hn: Array2<f64>,

    pub input_size: usize,
    pub hidden_size: usize,
}

impl Parameters for GRUCell {
    fn parameters(&self) -> Vec<(&'static str, &Array2<f64>)> {
        vec![
            ("w_ir", &self.w_ir), ("w_hr", &self.w_hr), ("b_ir", &self.b_ir), ("b_hr", &self.b_hr),
            ("w_iz", &self.w_iz), ("w_hz", &self.w_hz), ("b_iz", &self.b_iz), ("b_hz", &self.b_hz),
            ("w_in", &self.w_in), ("w_hn", &self.w_hn), ("b_in", &self.b_in), ("b_hn", &self.b_hn),
        ]
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Array2<f64>)> {
        vec![
            ("w_ir", &mut self.w_ir), ("w_hr", &mut self.w_hr), ("b_ir", &mut self.b_ir), ("b_hr", &mut self.b_hr),
            ("w_iz", &mut self.w_iz), ("w_hz", &mut self.w_hz), ("b_iz", &mut self.b_iz), ("b_hz", &mut self.b_hz),
            ("w_in", &mut self.w_in), ("w_hn", &mut self.w_hn), ("b_in", &mut self.b_in), ("b_hn", &mut self.b_hn),
        ]
    }
}

fn bias_gradient(raw: &Array2<f64>) -> Array2<f64> {
    raw.sum_axis(Axis(1)).insert_axis(Axis(1))
}

impl RecurrentCell for GRUCell {
    type State = Array2<f64>;
    type Cache = GRUCellCache;
    type Gradients = GRUCellGradients;

    const KIND: CellKind = CellKind::Gru;

    fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let dist = Uniform::new(-0.1, 0.1);
        let mut input_weights = || Array2::random_using((hidden_size, input_size), dist, rng);
        let (w_ir, w_iz, w_in) = (input_weights(), input_weights(), input_weights());
        let mut hidden_weights = || Array2::random_using((hidden_size, hidden_size), dist, rng);
        let (w_hr, w_hz, w_hn) = (hidden_weights(), hidden_weights(), hidden_weights());
        let bias = || Array2::zeros((hidden_size, 1));

        GRUCell {
            w_ir, w_hr, b_ir: bias(), b_hr: bias(),
            w_iz, w_hz, b_iz: bias(), b_hz: bias(),
            w_in, w_hn, b_in: bias(), b_hn: bias(),
            input_size,
            hidden_size,
        }
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn zero_state(&self, batch_size: usize) -> Array2<f64> {
        Array2::zeros((self.hidden_size, batch_size))
    }

    fn hidden(state: &Array2<f64>) -> &Array2<f64> {
        state
    }

    fn state_gradient(&self, dh: Array2<f64>) -> Array2<f64> {
        dh
    }

    fn forward_with_cache(&self, input: &Array2<f64>, hx: &Array2<f64>) -> (Array2<f64>, GRUCellCache) {
        let reset_gate = (&self.w_ir.dot(input) + &self.b_ir + &self.w_hr.dot(hx) + &self.b_hr).mapv(sigmoid);
        let update_gate = (&self.w_iz.dot(input) + &self.b_iz + &self.w_hz.dot(hx) + &self.b_hz).mapv(sigmoid);

        let reset_hidden = &reset_gate * hx;
        let new_gate = (&self.w_in.dot(input) + &self.b_in + &self.w_hn.dot(&reset_hidden) + &self.b_hn)
            .mapv(f64::tanh);

        let hy = &update_gate.mapv(|z| 1.0 - z) * hx + &update_gate * &new_gate;

        let cache = GRUCellCache {
            input: input.clone(),
            hx: hx.clone(),
            reset_gate,
            update_gate,
            new_gate,
            reset_hidden,
        };

        (hy, cache)
    }

    fn backward(&self, dhy: &Array2<f64>, cache: &GRUCellCache) -> (GRUCellGradients, Array2<f64>, Array2<f64>) {
        // h_t = (1 - z_t) ⊙ h_t-1 + z_t ⊙ n_t
        let d_update = dhy * &(&cache.new_gate - &cache.hx);
        let d_new = dhy * &cache.update_gate;
        let dhx_direct = dhy * &cache.update_gate.mapv(|z| 1.0 - z);

        let d_new_raw = &d_new * &cache.new_gate.mapv(tanh_grad_from_output);

        // reset_hidden = r_t ⊙ h_t-1
        let d_reset_hidden = self.w_hn.t().dot(&d_new_raw);
        let d_reset = &d_reset_hidden * &cache.hx;
        let dhx_from_reset = &d_reset_hidden * &cache.reset_gate;

        let d_reset_raw = &d_reset * &cache.reset_gate * &cache.reset_gate.mapv(|r| 1.0 - r);
        let d_update_raw = &d_update * &cache.update_gate * &cache.update_gate.mapv(|z| 1.0 - z);

        let gradients = GRUCellGradients {
            w_ir: d_reset_raw.dot(&cache.input.t()),
            w_hr: d_reset_raw.dot(&cache.hx.t()),
            b_ir: bias_gradient(&d_reset_raw),
            b_hr: bias_gradient(&d_reset_raw),
            w_iz: d_update_raw.dot(&cache.input.t()),
            w_hz: d_update_raw.dot(&cache.hx.t()),
            b_iz: bias_gradient(&d_update_raw),
            b_hz: bias_gradient(&d_update_raw),
            w_in: d_new_raw.dot(&cache.input.t()),
            w_hn: d_new_raw.dot(&cache.reset_hidden.t()),
            b_in: bias_gradient(&d_new_raw),
            b_hn: bias_gradient(&d_new_raw),
        };

        let dx = self.w_ir.t().dot(&d_reset_raw)
            + self.w_iz.t().dot(&d_update_raw)
            + self.w_in.t().dot(&d_new_raw);

        let dhx = dhx_direct
            + dhx_from_reset
            + self.w_hr.t().dot(&d_reset_raw)
            + self.w_hz.t().dot(&d_update_raw);

        (gradients, dx, dhx)
    }

    fn zero_gradients(&self) -> GRUCellGradients {
        let like = |m: &Array2<f64>| Array2::zeros(m.raw_dim());
        GRUCellGradients {
            w_ir: like(&self.w_ir), w_hr: like(&self.w_hr), b_ir: like(&self.b_ir), b_hr: like(&self.b_hr),
            w_iz: like(&self.w_iz), w_hz: like(&self.w_hz), b_iz: like(&self.b_iz), b_hz: like(&self.b_hz),
            w_in: like(&self.w_in), w_hn: like(&self.w_hn), b_in: like(&self.b_in), b_hn: like(&self.b_hn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gru_cell_forward() {
        let mut rng = StdRng::seed_from_u64(5);
        let cell = GRUCell::new(3, 2, &mut rng);

        let input = arr2(&[[0.5], [0.1], [-0.3]]);
        let hx = arr2(&[[0.1], [0.2]]);

        let hy = cell.step(&input, &hx);

        assert_eq!(hy.shape(), &[2, 1]);
    }

    #[test]
    fn test_gru_backward_pass() {
        let mut rng = StdRng::seed_from_u64(5);
        let cell = GRUCell::new(2, 3, &mut rng);

        let input = arr2(&[[1.0, 0.0], [0.5, 1.0]]);
        let hx = arr2(&[[0.1, 0.0], [0.2, 0.0], [0.3, 0.0]]);

        let (_, cache) = cell.forward_with_cache(&input, &hx);
        let (gradients, dx, dhx) = cell.backward(&Array2::ones((3, 2)), &cache);

        assert_eq!(gradients.w_ir.shape(), &[3, 2]);
        assert_eq!(gradients.w_hr.shape(), &[3, 3]);
        assert_eq!(gradients.b_in.shape(), &[3, 1]);
        assert_eq!(dx.shape(), &[2, 2]);
        assert_eq!(dhx.shape(), &[3, 2]);
    }

    #[test]
    fn test_hidden_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(9);
        let cell = GRUCell::new(2, 3, &mut rng);
        let input = arr2(&[[0.3], [-0.7]]);
        let hx = arr2(&[[0.2], [-0.1], [0.4]]);

        let loss = |h: &Array2<f64>| cell.step(&input, h).sum();
        let (_, cache) = cell.forward_with_cache(&input, &hx);
        let (_, _, dhx) = cell.backward(&Array2::ones((3, 1)), &cache);

        let eps = 1e-6;
        for i in 0..3 {
            let mut plus = hx.clone();
            plus[[i, 0]] += eps;
            let mut minus = hx.clone();
            minus[[i, 0]] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!((numeric - dhx[[i, 0]]).abs() < 1e-6, "dhx[{}]: {} vs {}", i, numeric, dhx[[i, 0]]);
        }
    }
}
