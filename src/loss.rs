use ndarray::{Array2, Axis};

use crate::utils::argmax;

/// Categorical cross-entropy on top of a softmax output layer
pub struct CrossEntropyLoss;

const EPSILON: f64 = 1e-15;

impl CrossEntropyLoss {
    /// Loss when the softmax has already been applied
    pub fn loss_from_probabilities(&self, probs: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let log_probs = probs.mapv(|p| (p + EPSILON).ln());
        -(targets * &log_probs).sum() / probs.ncols() as f64
    }

    /// d(mean CE)/d(logits) = (softmax - targets) / batch
    pub fn gradient_from_probabilities(&self, probs: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        (probs - targets) / probs.ncols() as f64
    }
}

/// Number of columns whose arg-max matches the one-hot target
pub fn count_correct(probs: &Array2<f64>, targets: &Array2<f64>) -> usize {
    probs.axis_iter(Axis(1))
        .zip(targets.axis_iter(Axis(1)))
        .filter(|(p, t)| argmax(p.view()) == argmax(t.view()))
        .count()
}
