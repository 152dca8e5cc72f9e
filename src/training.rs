use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::data::EncodedDataset;
use crate::layers::RecurrentCell;
use crate::models::sequence_model::{BatchStats, SequenceModel};
use crate::optimizers::{Optimizer, OptimizerConfig};
use crate::persistence::{ModelMetadata, PersistenceError, PersistentModel};

/// Configuration for training hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub epochs: usize,
    /// Fraction of samples, taken from the end before shuffling, held out for validation
    pub validation_split: f64,
    pub clip_gradient: Option<f64>,
    pub optimizer: OptimizerConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            batch_size: 128,
            epochs: 1,
            validation_split: 0.1,
            clip_gradient: Some(5.0),
            optimizer: OptimizerConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("batch size must be positive")]
    ZeroBatchSize,
    #[error("validation split of {validation_split} leaves no training samples out of {samples}")]
    NoTrainingSamples { samples: usize, validation_split: f64 },
    #[error("failed to write checkpoint: {0}")]
    Checkpoint(#[from] PersistenceError),
}

/// Training metrics of one epoch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

impl EpochMetrics {
    /// Validation loss when available, training loss otherwise.
    pub fn monitored_loss(&self) -> f64 {
        self.val_loss.unwrap_or(self.loss)
    }
}

/// Loss and accuracy of every epoch run by one [`Trainer::fit`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    pub epochs: Vec<EpochMetrics>,
}

impl History {
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn train_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.loss).collect()
    }

    pub fn val_losses(&self) -> Vec<f64> {
        self.epochs.iter().filter_map(|m| m.val_loss).collect()
    }
}

/// "Training:" and "Validation:" blocks, one `Loss/Accuracy` line per epoch.
impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Training: ")?;
        for m in &self.epochs {
            writeln!(f, "     Loss: {:.4}, Accuracy: {:.4}", m.loss, m.accuracy)?;
        }
        writeln!(f, "Validation: ")?;
        for m in &self.epochs {
            if let (Some(loss), Some(accuracy)) = (m.val_loss, m.val_accuracy) {
                writeln!(f, "     Loss: {:.4}, Accuracy: {:.4}", loss, accuracy)?;
            }
        }
        Ok(())
    }
}

/// Saves the model whenever the monitored loss improves on the best seen so far.
#[derive(Clone, Debug)]
pub struct Checkpointer {
    path: PathBuf,
    best: Option<f64>,
}

impl Checkpointer {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Checkpointer { path: path.as_ref().to_path_buf(), best: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Returns whether a checkpoint was written.
    pub fn observe<C: RecurrentCell>(
        &mut self,
        model: &SequenceModel<C>,
        metrics: &EpochMetrics,
        total_epochs: usize,
    ) -> Result<bool, PersistenceError> {
        let monitor = if metrics.val_loss.is_some() { "val_loss" } else { "loss" };
        let current = metrics.monitored_loss();
        let previous = self.best.unwrap_or(f64::INFINITY);

        if current < previous {
            info!(
                "Epoch {:05}: {} improved from {:.5} to {:.5}, saving model to {}",
                metrics.epoch, monitor, previous, current, self.path.display()
            );
            let metadata = ModelMetadata::new(model, "brnn_checkpoint", total_epochs, Some(current));
            model.save(&self.path, metadata)?;
            self.best = Some(current);
            Ok(true)
        } else {
            info!("Epoch {:05}: {} did not improve", metrics.epoch, monitor);
            Ok(false)
        }
    }
}

/// Owns the model and optimizer state across repeated `fit` calls.
pub struct Trainer<C: RecurrentCell> {
    pub model: SequenceModel<C>,
    pub config: TrainingConfig,
    optimizer: Box<dyn Optimizer>,
    epochs_trained: usize,
}

impl<C: RecurrentCell> Trainer<C> {
    pub fn new(model: SequenceModel<C>, config: TrainingConfig) -> Self {
        let optimizer = config.optimizer.build();
        Trainer { model, config, optimizer, epochs_trained: 0 }
    }

    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }

    pub fn into_model(self) -> SequenceModel<C> {
        self.model
    }

    /// Index at which the validation tail starts.
    fn split_at(&self, samples: usize) -> usize {
        (samples as f64 * (1.0 - self.config.validation_split)) as usize
    }

    /// Runs `config.epochs` epochs of mini-batch training.
    pub fn fit<R: Rng + ?Sized>(
        &mut self,
        dataset: &EncodedDataset,
        rng: &mut R,
        mut checkpointer: Option<&mut Checkpointer>,
    ) -> Result<History, TrainingError> {
        if self.config.batch_size == 0 {
            return Err(TrainingError::ZeroBatchSize);
        }
        let split_at = self.split_at(dataset.len());
        if split_at == 0 {
            return Err(TrainingError::NoTrainingSamples {
                samples: dataset.len(),
                validation_split: self.config.validation_split,
            });
        }

        let mut train_indices: Vec<usize> = (0..split_at).collect();
        let val_indices: Vec<usize> = (split_at..dataset.len()).collect();
        info!(
            "Train on {} samples, validate on {} samples ({})",
            train_indices.len(),
            val_indices.len(),
            self.optimizer.name()
        );

        let mut history = History::default();

        for _ in 0..self.config.epochs {
            let start_time = Instant::now();
            self.epochs_trained += 1;
            train_indices.shuffle(rng);

            let mut totals = StatsAccumulator::default();
            for chunk in train_indices.chunks(self.config.batch_size) {
                let (steps, targets) = dataset.batch(chunk);
                let stats = self.model.train_batch(
                    &steps,
                    &targets,
                    self.optimizer.as_mut(),
                    self.config.clip_gradient,
                    rng,
                );
                totals.add(stats);
            }

            let (val_loss, val_accuracy) = if val_indices.is_empty() {
                (None, None)
            } else {
                let (loss, accuracy) = self.evaluate(dataset, &val_indices);
                (Some(loss), Some(accuracy))
            };

            let metrics = EpochMetrics {
                epoch: self.epochs_trained,
                loss: totals.mean_loss(),
                accuracy: totals.accuracy(),
                val_loss,
                val_accuracy,
            };

            match (metrics.val_loss, metrics.val_accuracy) {
                (Some(vl), Some(va)) => info!(
                    "Epoch {}: loss: {:.4} - acc: {:.4} - val_loss: {:.4} - val_acc: {:.4} ({:.2}s)",
                    metrics.epoch, metrics.loss, metrics.accuracy, vl, va, start_time.elapsed().as_secs_f64()
                ),
                _ => info!(
                    "Epoch {}: loss: {:.4} - acc: {:.4} ({:.2}s)",
                    metrics.epoch, metrics.loss, metrics.accuracy, start_time.elapsed().as_secs_f64()
                ),
            }

            if let Some(checkpointer) = checkpointer.as_deref_mut() {
                checkpointer.observe(&self.model, &metrics, self.epochs_trained)?;
            }

            history.push(metrics);
        }

        Ok(history)
    }

    /// Mean loss and accuracy over `indices`, dropout off.
    pub fn evaluate(&self, dataset: &EncodedDataset, indices: &[usize]) -> (f64, f64) {
        let mut totals = StatsAccumulator::default();
        for chunk in indices.chunks(self.config.batch_size.max(1)) {
            let (steps, targets) = dataset.batch(chunk);
            totals.add(self.model.evaluate_batch(&steps, &targets));
        }
        debug!("evaluated {} samples", totals.samples);
        (totals.mean_loss(), totals.accuracy())
    }
}

/// Sample-weighted running totals over batches.
#[derive(Default)]
struct StatsAccumulator {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl StatsAccumulator {
    fn add(&mut self, stats: BatchStats) {
        self.loss_sum += stats.loss * stats.samples as f64;
        self.correct += stats.correct;
        self.samples += stats.samples;
    }

    fn mean_loss(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { self.loss_sum / self.samples as f64 }
    }

    fn accuracy(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { self.correct as f64 / self.samples as f64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::build_windows;
    use crate::layers::lstm_cell::LSTMCell;
    use crate::models::sequence_model::ModelShape;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dataset() -> EncodedDataset {
        let sequence: Vec<usize> = [1, 2, 3, 4].iter().cycle().take(40).cloned().collect();
        build_windows(&sequence, 4, 1).unwrap().encode(6).unwrap()
    }

    fn trainer(config: TrainingConfig, rng: &mut StdRng) -> Trainer<LSTMCell> {
        let shape = ModelShape { sentence_length: 4, vocab_size: 6, hidden_size: 8 };
        Trainer::new(SequenceModel::new(shape, 0.1, rng), config)
    }

    fn metrics(epoch: usize, loss: f64, val_loss: Option<f64>) -> EpochMetrics {
        EpochMetrics { epoch, loss, accuracy: 0.5, val_loss, val_accuracy: val_loss.map(|_| 0.5) }
    }

    #[test]
    fn test_history_has_one_entry_per_epoch() {
        let mut rng = StdRng::seed_from_u64(1337);
        let config = TrainingConfig { batch_size: 8, epochs: 3, ..TrainingConfig::default() };
        let mut trainer = trainer(config, &mut rng);

        let history = trainer.fit(&dataset(), &mut rng, None).unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(trainer.epochs_trained(), 3);
        assert_eq!(history.epochs.iter().map(|m| m.epoch).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(history.epochs.iter().all(|m| m.val_loss.is_some()));
        assert!(history.epochs.iter().all(|m| (0.0..=1.0).contains(&m.accuracy)));
    }

    #[test]
    fn test_fit_lowers_loss() {
        let mut rng = StdRng::seed_from_u64(1337);
        let config = TrainingConfig {
            batch_size: 8,
            epochs: 30,
            validation_split: 0.0,
            optimizer: OptimizerConfig::Rmsprop { learning_rate: 0.01 },
            ..TrainingConfig::default()
        };
        let mut trainer = trainer(config, &mut rng);

        let history = trainer.fit(&dataset(), &mut rng, None).unwrap();
        let losses = history.train_losses();

        assert!(losses[losses.len() - 1] < losses[0] * 0.5, "losses: {:?}", losses);
        assert!(history.val_losses().is_empty());
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let run = || {
            let mut rng = StdRng::seed_from_u64(99);
            let config = TrainingConfig { batch_size: 16, epochs: 2, ..TrainingConfig::default() };
            let mut trainer = trainer(config, &mut rng);
            trainer.fit(&dataset(), &mut rng, None).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_invalid_configurations() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut zero_batch = trainer(TrainingConfig { batch_size: 0, ..TrainingConfig::default() }, &mut rng);
        assert!(matches!(zero_batch.fit(&dataset(), &mut rng, None), Err(TrainingError::ZeroBatchSize)));

        let mut all_validation = trainer(TrainingConfig { validation_split: 0.999, ..TrainingConfig::default() }, &mut rng);
        assert!(matches!(
            all_validation.fit(&dataset(), &mut rng, None),
            Err(TrainingError::NoTrainingSamples { samples: 40, .. })
        ));
    }

    #[test]
    fn test_split_takes_tail_before_shuffling() {
        let mut rng = StdRng::seed_from_u64(0);
        let t = trainer(TrainingConfig { validation_split: 0.1, ..TrainingConfig::default() }, &mut rng);
        assert_eq!(t.split_at(40), 36);
        assert_eq!(t.split_at(128), 115);
    }

    #[test]
    fn test_history_report_format() {
        let history = History { epochs: vec![metrics(1, 1.23456, Some(2.0)), metrics(2, 0.5, Some(1.5))] };
        let report = history.to_string();
        assert_eq!(
            report,
            "Training: \n     Loss: 1.2346, Accuracy: 0.5000\n     Loss: 0.5000, Accuracy: 0.5000\n\
             Validation: \n     Loss: 2.0000, Accuracy: 0.5000\n     Loss: 1.5000, Accuracy: 0.5000\n"
        );
    }

    #[test]
    fn test_checkpointer_saves_only_on_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        let mut rng = StdRng::seed_from_u64(5);
        let model = trainer(TrainingConfig::default(), &mut rng).into_model();
        let mut checkpointer = Checkpointer::new(&path);

        assert!(checkpointer.observe(&model, &metrics(1, 1.0, Some(0.9)), 1).unwrap());
        assert!(path.exists());
        assert!(!checkpointer.observe(&model, &metrics(2, 0.5, Some(0.95)), 2).unwrap());
        assert!(checkpointer.observe(&model, &metrics(3, 0.5, Some(0.7)), 3).unwrap());
        assert_eq!(checkpointer.best(), Some(0.7));

        let (_, metadata) = SequenceModel::<LSTMCell>::load(&path).unwrap();
        assert_eq!(metadata.total_epochs, 3);
        assert_eq!(metadata.best_loss, Some(0.7));
    }

    #[test]
    fn test_checkpointer_monitors_train_loss_without_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let model = trainer(TrainingConfig::default(), &mut rng).into_model();
        let mut checkpointer = Checkpointer::new(dir.path().join("ckpt.json"));

        assert!(checkpointer.observe(&model, &metrics(1, 2.0, None), 1).unwrap());
        assert!(checkpointer.observe(&model, &metrics(2, 1.0, None), 2).unwrap());
        assert_eq!(checkpointer.best(), Some(1.0));
    }
}
