use thiserror::Error;

use crate::config::ConfigError;
use crate::data::DataError;
use crate::generation::GenerationError;
use crate::persistence::PersistenceError;
use crate::training::TrainingError;

/// Any failure that aborts an analyzer run.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = AnalyzerError> = std::result::Result<T, E>;
