//! End-to-end run: load, window, train, generate, report.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use tracing::info;

use crate::config::AnalyzerConfig;
use crate::data::{build_windows, load_sequence, vocab_size};
use crate::error::Result;
use crate::generation::{generate, Generation};
use crate::graph::write_dot;
use crate::layers::{CellKind, RecurrentCell};
use crate::models::sequence_model::{build_gru, build_lstm, ModelShape, SequenceModel};
use crate::persistence::{ModelMetadata, PersistentModel};
use crate::training::{Checkpointer, History, Trainer};

/// Output of one train-then-generate round.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    pub history: History,
    pub start_index: usize,
    /// One generation per configured temperature, in order.
    pub generations: Vec<(f64, Generation)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub cell: CellKind,
    pub num_parameters: usize,
    pub epochs_trained: usize,
    pub best_loss: Option<f64>,
    pub iterations: Vec<IterationReport>,
}

pub struct SequenceAnalyzer {
    config: AnalyzerConfig,
}

impl SequenceAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        SequenceAnalyzer { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Reads the configured event log and runs every iteration, writing
    /// generated sequences and loss reports to `out`.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<RunReport> {
        self.config.validate()?;
        writeln!(out, "Loading data...")?;
        let sequence = load_sequence(&self.config.data.path)?;
        self.run_on_sequence(&sequence, out)
    }

    pub fn run_on_sequence<W: Write>(&self, sequence: &[usize], out: &mut W) -> Result<RunReport> {
        self.config.validate()?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let vocab_size = vocab_size(sequence)?;
        let shape = ModelShape {
            sentence_length: self.config.data.sentence_length,
            vocab_size,
            hidden_size: self.config.model.hidden_len,
        };
        info!("sequence of {} IDs, vocabulary of {}", sequence.len(), vocab_size);

        writeln!(out, "Building Model...")?;
        let dropout = self.config.model.dropout;
        match self.config.model.cell {
            CellKind::Lstm => {
                let model = build_lstm(shape, dropout, &mut rng);
                self.train_and_generate(model, sequence, &mut rng, out)
            }
            CellKind::Gru => {
                let model = build_gru(shape, dropout, &mut rng);
                self.train_and_generate(model, sequence, &mut rng, out)
            }
        }
    }

    fn train_and_generate<C: RecurrentCell, W: Write>(
        &self,
        model: SequenceModel<C>,
        sequence: &[usize],
        rng: &mut StdRng,
        out: &mut W,
    ) -> Result<RunReport> {
        let config = &self.config;
        let sentence_length = config.data.sentence_length;
        let num_parameters = model.num_parameters();
        info!("built bidirectional {} model with {} parameters", C::KIND, num_parameters);

        if let Some(graph_path) = &config.output.graph_path {
            write_dot(&model, graph_path)?;
        }

        let dataset = build_windows(sequence, sentence_length, config.data.step)?
            .encode(model.shape().vocab_size)?;

        let mut trainer = Trainer::new(model, config.training.clone());
        let mut checkpointer = Checkpointer::new(&config.output.checkpoint_path);
        let mut iterations = Vec::with_capacity(config.generation.iterations);

        for iteration in 1..=config.generation.iterations {
            writeln!(out)?;
            writeln!(out, "------------------------ Start Training ------------------------")?;
            writeln!(out, "Iteration: {}", iteration)?;

            let history = trainer.fit(&dataset, rng, Some(&mut checkpointer))?;

            // build_windows guarantees sequence.len() > sentence_length
            let start_index = rng.gen_range(0..sequence.len() - sentence_length);
            let seed = &sequence[start_index..start_index + sentence_length];

            let mut generations = Vec::with_capacity(config.generation.temperatures.len());
            for &temperature in &config.generation.temperatures {
                writeln!(out, "------------Temperature: {:.2}", temperature)?;
                writeln!(out, "With seed: {}\n", join_ids(seed))?;
                write!(out, "Generated: {}", join_ids(seed))?;

                let generation = generate(
                    &trainer.model,
                    seed,
                    config.generation.predictions,
                    temperature,
                    rng,
                    |id| {
                        write!(out, " {}", id)?;
                        out.flush()
                    },
                )?;
                writeln!(out, "\n")?;
                generations.push((temperature, generation));
            }

            write!(out, "{}", history)?;
            iterations.push(IterationReport { iteration, history, start_index, generations });
        }

        let metadata = ModelMetadata::new(
            &trainer.model,
            "brnn_model",
            trainer.epochs_trained(),
            checkpointer.best(),
        );
        trainer.model.save(&config.output.weights_path, metadata)?;
        info!("final weights saved to {}", config.output.weights_path.display());

        Ok(RunReport {
            cell: C::KIND,
            num_parameters,
            epochs_trained: trainer.epochs_trained(),
            best_loss: checkpointer.best(),
            iterations,
        })
    }
}

fn join_ids(ids: &[usize]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" ")
}
