use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use brnn_sequence::{AnalyzerConfig, CellKind, SequenceAnalyzer};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a bidirectional recurrent model on an ID log and generate continuations")]
struct Cli {
    /// JSON configuration file; flags below override its fields.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Event log with one integer ID per line.
    #[arg(long, value_name = "PATH")]
    data: Option<PathBuf>,
    #[arg(long, value_enum)]
    cell: Option<CellArg>,
    #[arg(long)]
    hidden_len: Option<usize>,
    /// Number of train-then-generate rounds.
    #[arg(long)]
    iterations: Option<usize>,
    /// Epochs per round.
    #[arg(long)]
    epochs: Option<usize>,
    /// IDs generated per temperature.
    #[arg(long)]
    predictions: Option<usize>,
    /// Sampling temperature; repeat to generate at several.
    #[arg(long = "temperature", value_name = "T")]
    temperatures: Vec<f64>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CellArg {
    Lstm,
    Gru,
}

impl From<CellArg> for CellKind {
    fn from(arg: CellArg) -> Self {
        match arg {
            CellArg::Lstm => CellKind::Lstm,
            CellArg::Gru => CellKind::Gru,
        }
    }
}

impl Cli {
    fn into_config(self) -> Result<AnalyzerConfig> {
        let mut config = match &self.config {
            Some(path) => AnalyzerConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => AnalyzerConfig::default(),
        };

        if let Some(data) = self.data {
            config.data.path = data;
        }
        if let Some(cell) = self.cell {
            config.model.cell = cell.into();
        }
        if let Some(hidden_len) = self.hidden_len {
            config.model.hidden_len = hidden_len;
        }
        if let Some(iterations) = self.iterations {
            config.generation.iterations = iterations;
        }
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(predictions) = self.predictions {
            config.generation.predictions = predictions;
        }
        if !self.temperatures.is_empty() {
            config.generation.temperatures = self.temperatures;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("brnn_sequence=info".parse()?))
        .init();

    let config = Cli::parse().into_config()?;
    info!(
        "{} model, hidden_len {}, {} iterations, seed {}",
        config.model.cell, config.model.hidden_len, config.generation.iterations, config.seed
    );

    let analyzer = SequenceAnalyzer::new(config);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = analyzer
        .run(&mut out)
        .with_context(|| format!("analyzing {}", analyzer.config().data.path.display()))?;

    info!("done: {} epochs, best loss {:?}", report.epochs_trained, report.best_loss);
    Ok(())
}
