use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

use crate::layers::{Gradients, Parameters};

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl Gradients for LinearGradients {
    fn tensors(&self) -> Vec<&Array2<f64>> {
        vec![&self.weight, &self.bias]
    }

    fn tensors_mut(&mut self) -> Vec<&mut Array2<f64>> {
        vec![&mut self.weight, &mut self.bias]
    }
}

/// Fully connected output projection
///
/// Performs `output = weight · input + bias` where weight has shape
/// (output_size, input_size) and bias (output_size, 1) broadcasts across the batch.
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Xavier/Glorot uniform initialisation, zero bias
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let weight = Array2::random_using((output_size, input_size), Uniform::new(-limit, limit), rng);
        let bias = Array2::zeros((output_size, 1));

        Self { weight, bias, input_size, output_size }
    }

    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Self {
        let (output_size, input_size) = weight.dim();
        assert_eq!(bias.shape(), &[output_size, 1], "Bias shape must be (output_size, 1)");

        Self { weight, bias, input_size, output_size }
    }

    /// `input` is (input_size, batch_size); returns (output_size, batch_size)
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        debug_assert_eq!(input.nrows(), self.input_size);
        &self.weight.dot(input) + &self.bias
    }

    /// Returns (parameter_gradients, input_gradient) given the forward input.
    pub fn backward(&self, input: &Array2<f64>, grad_output: &Array2<f64>) -> (LinearGradients, Array2<f64>) {
        let gradients = LinearGradients {
            weight: grad_output.dot(&input.t()),
            bias: grad_output.sum_axis(Axis(1)).insert_axis(Axis(1)),
        };
        let input_grad = self.weight.t().dot(grad_output);

        (gradients, input_grad)
    }
}

impl Parameters for LinearLayer {
    fn parameters(&self) -> Vec<(&'static str, &Array2<f64>)> {
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Array2<f64>)> {
        vec![("weight", &mut self.weight), ("bias", &mut self.bias)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::apply_gradients;
    use crate::optimizers::SGD;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_layer_creation() {
        let mut rng = StdRng::seed_from_u64(0);
        let layer = LinearLayer::new(10, 5, &mut rng);
        assert_eq!(layer.weight.shape(), &[5, 10]);
        assert_eq!(layer.bias.shape(), &[5, 1]);
        assert_eq!(layer.num_parameters(), 55);
    }

    #[test]
    fn test_linear_layer_forward() {
        let layer = LinearLayer::from_weights(arr2(&[[1.0, 2.0]]), arr2(&[[0.5]]));
        let input = arr2(&[[1.0, 0.0], [1.0, 2.0]]);

        let output = layer.forward(&input);
        assert_eq!(output, arr2(&[[3.5, 4.5]]));
    }

    #[test]
    fn test_linear_layer_backward() {
        let mut rng = StdRng::seed_from_u64(0);
        let layer = LinearLayer::new(3, 2, &mut rng);
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let grad_output = arr2(&[[1.0, 1.0], [1.0, 1.0]]);

        let (gradients, input_grad) = layer.backward(&input, &grad_output);

        assert_eq!(gradients.weight.shape(), &[2, 3]);
        assert_eq!(gradients.bias, arr2(&[[2.0], [2.0]]));
        assert_eq!(input_grad.shape(), &[3, 2]);
    }

    #[test]
    fn test_linear_layer_with_optimizer() {
        let mut layer = LinearLayer::from_weights(arr2(&[[0.0, 0.0]]), arr2(&[[0.0]]));
        let mut optimizer = SGD::new(0.1);

        let input = arr2(&[[1.0], [2.0]]);
        let target = arr2(&[[3.0]]);

        let grad_output = &layer.forward(&input) - &target;
        let (gradients, _) = layer.backward(&input, &grad_output);
        apply_gradients(&mut layer, &gradients, &mut optimizer, "dense");

        let expected = arr2(&[[0.3, 0.6]]);
        assert!((&layer.weight - &expected).mapv(f64::abs).sum() < 1e-12);
        assert!((layer.bias[[0, 0]] - 0.3).abs() < 1e-12);
    }
}
