//! # BRNN Sequence Analyzer
//!
//! Learns to predict the next ID of an integer event log with a bidirectional
//! LSTM or GRU, then generates new IDs autoregressively with temperature
//! sampling.
//!
//! ## Core Components
//!
//! - **Data**: one-ID-per-line logs cut into left-padded ramp-up and sliding windows, one-hot encoded
//! - **Layers**: batched LSTM and GRU cells with hand-written BPTT, a bidirectional wrapper, dropout and a dense output
//! - **Training**: mini-batch training with validation split, gradient clipping and best-loss checkpointing
//! - **Optimizers**: RMSprop (default), Adam and SGD
//! - **Generation**: temperature sampling fed back through a sliding window
//! - **Persistence**: JSON or bincode model files with metadata
//!
//! ## Quick Start
//!
//! ```rust
//! use brnn_sequence::{build_windows, generate, vocab_size, ModelShape, SequenceModel, Trainer, TrainingConfig};
//! use brnn_sequence::LSTMCell;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let sequence: Vec<usize> = [1, 2, 3].iter().cycle().take(30).cloned().collect();
//! let vocab = vocab_size(&sequence).unwrap();
//! let dataset = build_windows(&sequence, 4, 1).unwrap().encode(vocab).unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(1337);
//! let shape = ModelShape { sentence_length: 4, vocab_size: vocab, hidden_size: 8 };
//! let model = SequenceModel::<LSTMCell>::new(shape, 0.2, &mut rng);
//!
//! let config = TrainingConfig { batch_size: 8, ..TrainingConfig::default() };
//! let mut trainer = Trainer::new(model, config);
//! let history = trainer.fit(&dataset, &mut rng, None).unwrap();
//! assert_eq!(history.len(), 1);
//!
//! let generation = generate(&trainer.model, &[1, 2, 3, 1], 10, 0.5, &mut rng, |_| Ok(())).unwrap();
//! assert_eq!(generation.generated.len(), 10);
//! ```

pub mod analyzer;
pub mod config;
pub mod data;
pub mod error;
pub mod generation;
pub mod graph;
pub mod layers;
pub mod loss;
pub mod models;
pub mod optimizers;
pub mod persistence;
pub mod sampling;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use analyzer::{IterationReport, RunReport, SequenceAnalyzer};
pub use config::{AnalyzerConfig, ConfigError};
pub use data::{build_windows, encode_window, load_sequence, parse_sequence, vocab_size, DataError, EncodedDataset, Windows};
pub use error::AnalyzerError;
pub use generation::{generate, Generation, GenerationError};
pub use layers::gru_cell::GRUCell;
pub use layers::lstm_cell::LSTMCell;
pub use layers::{CellKind, RecurrentCell};
pub use loss::CrossEntropyLoss;
pub use models::sequence_model::{build_gru, build_lstm, ModelShape, SequenceModel};
pub use optimizers::{Adam, OptimizerConfig, RMSprop, SGD};
pub use persistence::{ModelMetadata, ModelPersistence, PersistenceError, PersistentModel};
pub use sampling::{rescale_with_temperature, sample_with_temperature, SamplingError};
pub use training::{Checkpointer, EpochMetrics, History, Trainer, TrainingConfig, TrainingError};
pub use utils::argmax;
