//! Activation helpers shared by the recurrent cells and the output head.

use ndarray::{Array2, ArrayView1, Axis};

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Derivative of tanh expressed through its output: 1 - tanh²(x)
pub fn tanh_grad_from_output(y: f64) -> f64 {
    1.0 - y * y
}

/// Column-wise softmax: every column of the result sums to 1.
///
/// Each column is shifted by its maximum before exponentiating.
pub fn softmax_columns(logits: &Array2<f64>) -> Array2<f64> {
    let mut result = logits.clone();
    for mut col in result.axis_iter_mut(Axis(1)) {
        let max_val = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        col.mapv_inplace(|x| (x - max_val).exp());
        let sum = col.sum();
        col.mapv_inplace(|x| x / sum);
    }
    result
}

/// Index of the largest entry; ties resolve to the first one.
pub fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best
}
