use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::window_to_steps;
use crate::layers::bidirectional::Bidirectional;
use crate::layers::dropout::Dropout;
use crate::layers::gru_cell::GRUCell;
use crate::layers::linear::LinearLayer;
use crate::layers::lstm_cell::LSTMCell;
use crate::layers::{apply_gradients, CellKind, Gradients, Parameters, RecurrentCell};
use crate::loss::{count_correct, CrossEntropyLoss};
use crate::optimizers::Optimizer;
use crate::utils::softmax_columns;

/// Dimensions that fix the layout of every weight matrix in the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelShape {
    pub sentence_length: usize,
    pub vocab_size: usize,
    pub hidden_size: usize,
}

/// Loss and accuracy counts of one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchStats {
    /// Mean cross-entropy over the batch
    pub loss: f64,
    pub correct: usize,
    pub samples: usize,
}

/// Bidirectional next-ID predictor
///
/// input (sentence_length × vocab_size one-hot) → forward/backward recurrent
/// cells → concat → dropout → dense → softmax over the vocabulary.
#[derive(Clone, Debug)]
pub struct SequenceModel<C: RecurrentCell> {
    pub encoder: Bidirectional<C>,
    pub dropout: Dropout,
    pub output: LinearLayer,
    pub sentence_length: usize,
}

impl<C: RecurrentCell> SequenceModel<C> {
    pub fn new<R: Rng + ?Sized>(shape: ModelShape, dropout_rate: f64, rng: &mut R) -> Self {
        let encoder = Bidirectional::new(shape.vocab_size, shape.hidden_size, rng);
        let output = LinearLayer::new(encoder.output_size(), shape.vocab_size, rng);

        SequenceModel {
            encoder,
            dropout: Dropout::new(dropout_rate),
            output,
            sentence_length: shape.sentence_length,
        }
    }

    pub fn kind(&self) -> CellKind {
        C::KIND
    }

    pub fn shape(&self) -> ModelShape {
        ModelShape {
            sentence_length: self.sentence_length,
            vocab_size: self.output.output_size,
            hidden_size: self.encoder.hidden_size(),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.encoder.num_parameters() + self.output.num_parameters()
    }

    /// Every trainable matrix, keyed `"{forward|backward|dense}.{name}"`.
    pub fn named_parameters(&self) -> Vec<(String, &Array2<f64>)> {
        let mut all = Vec::new();
        for (prefix, params) in [
            ("forward", self.encoder.forward_cell.parameters()),
            ("backward", self.encoder.backward_cell.parameters()),
            ("dense", self.output.parameters()),
        ] {
            all.extend(params.into_iter().map(|(name, p)| (format!("{}.{}", prefix, name), p)));
        }
        all
    }

    pub fn named_parameters_mut(&mut self) -> Vec<(String, &mut Array2<f64>)> {
        let mut all = Vec::new();
        for (prefix, params) in [
            ("forward", self.encoder.forward_cell.parameters_mut()),
            ("backward", self.encoder.backward_cell.parameters_mut()),
            ("dense", self.output.parameters_mut()),
        ] {
            all.extend(params.into_iter().map(|(name, p)| (format!("{}.{}", prefix, name), p)));
        }
        all
    }

    /// Softmax probabilities `(vocab_size, batch)` with dropout disabled.
    pub fn predict_batch(&self, steps: &[Array2<f64>]) -> Array2<f64> {
        let encoded = self.encoder.forward(steps);
        softmax_columns(&self.output.forward(&encoded))
    }

    /// Next-ID distribution for a single one-hot window `(sentence_length, vocab_size)`.
    ///
    /// # Panics
    ///
    /// Panics if the window does not have exactly that shape. `encode_window`
    /// with the model's vocabulary always produces it.
    pub fn predict(&self, window: &Array2<bool>) -> Array1<f64> {
        assert_eq!(window.shape(), &[self.sentence_length, self.output.output_size],
                   "window shape must be (sentence_length, vocab_size)");
        self.predict_batch(&window_to_steps(window)).index_axis_move(Axis(1), 0)
    }

    pub fn evaluate_batch(&self, steps: &[Array2<f64>], targets: &Array2<f64>) -> BatchStats {
        let probs = self.predict_batch(steps);
        BatchStats {
            loss: CrossEntropyLoss.loss_from_probabilities(&probs, targets),
            correct: count_correct(&probs, targets),
            samples: targets.ncols(),
        }
    }

    /// One optimisation step on a mini-batch; gradients are averaged over the batch.
    pub fn train_batch<R: Rng + ?Sized>(
        &mut self,
        steps: &[Array2<f64>],
        targets: &Array2<f64>,
        optimizer: &mut dyn Optimizer,
        clip_gradient: Option<f64>,
        rng: &mut R,
    ) -> BatchStats {
        let (encoded, encoder_cache) = self.encoder.forward_with_cache(steps);
        let mask = self.dropout.sample_mask(encoded.dim(), rng);
        let dropped = self.dropout.forward(&encoded, mask.as_ref());
        let probs = softmax_columns(&self.output.forward(&dropped));

        let stats = BatchStats {
            loss: CrossEntropyLoss.loss_from_probabilities(&probs, targets),
            correct: count_correct(&probs, targets),
            samples: targets.ncols(),
        };

        let d_logits = CrossEntropyLoss.gradient_from_probabilities(&probs, targets);
        let (mut dense_grads, d_dropped) = self.output.backward(&dropped, &d_logits);
        let d_encoded = self.dropout.backward(&d_dropped, mask.as_ref());
        let (mut forward_grads, mut backward_grads) = self.encoder.backward(&d_encoded, &encoder_cache);

        if let Some(max_norm) = clip_gradient {
            dense_grads.clip(max_norm);
            forward_grads.clip(max_norm);
            backward_grads.clip(max_norm);
        }

        self.encoder.update_parameters(&forward_grads, &backward_grads, optimizer);
        apply_gradients(&mut self.output, &dense_grads, optimizer, "dense");

        stats
    }
}

/// Bidirectional LSTM model.
pub fn build_lstm<R: Rng + ?Sized>(shape: ModelShape, dropout_rate: f64, rng: &mut R) -> SequenceModel<LSTMCell> {
    SequenceModel::new(shape, dropout_rate, rng)
}

/// Bidirectional GRU model.
pub fn build_gru<R: Rng + ?Sized>(shape: ModelShape, dropout_rate: f64, rng: &mut R) -> SequenceModel<GRUCell> {
    SequenceModel::new(shape, dropout_rate, rng)
}
