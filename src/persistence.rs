use chrono::{DateTime, Utc};
use ndarray::{Array2, Dimension};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::layers::{CellKind, RecurrentCell};
use crate::models::sequence_model::{ModelShape, SequenceModel};

/// Serializable version of Array2<f64> for persistence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl TryFrom<SerializableArray2> for Array2<f64> {
    type Error = PersistenceError;

    fn try_from(array: SerializableArray2) -> Result<Self, Self::Error> {
        let len = array.data.len();
        Array2::from_shape_vec(array.shape, array.data)
            .map_err(|_| PersistenceError::MalformedArray { shape: array.shape, len })
    }
}

/// One trainable matrix, keyed as in [`SequenceModel::named_parameters`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedArray {
    pub name: String,
    pub array: SerializableArray2,
}

/// Everything needed to rebuild a [`SequenceModel`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableModel {
    pub cell: CellKind,
    pub shape: ModelShape,
    pub dropout: f64,
    pub parameters: Vec<NamedArray>,
}

impl<C: RecurrentCell> From<&SequenceModel<C>> for SerializableModel {
    fn from(model: &SequenceModel<C>) -> Self {
        Self {
            cell: C::KIND,
            shape: model.shape(),
            dropout: model.dropout.dropout_rate,
            parameters: model.named_parameters()
                .into_iter()
                .map(|(name, array)| NamedArray { name, array: array.into() })
                .collect(),
        }
    }
}

impl<C: RecurrentCell> TryFrom<SerializableModel> for SequenceModel<C> {
    type Error = PersistenceError;

    fn try_from(saved: SerializableModel) -> Result<Self, Self::Error> {
        if saved.cell != C::KIND {
            return Err(PersistenceError::CellMismatch { expected: C::KIND, found: saved.cell });
        }
        if !(0.0..1.0).contains(&saved.dropout) {
            return Err(PersistenceError::InvalidDropout(saved.dropout));
        }

        // Every parameter is overwritten below, so the init seed is irrelevant.
        let mut model = SequenceModel::<C>::new(saved.shape, saved.dropout, &mut StdRng::seed_from_u64(0));

        let mut stored: HashMap<String, SerializableArray2> = saved.parameters
            .into_iter()
            .map(|named| (named.name, named.array))
            .collect();

        for (name, param) in model.named_parameters_mut() {
            let array = stored.remove(&name)
                .ok_or_else(|| PersistenceError::MissingParameter(name.clone()))?;
            let expected = param.raw_dim().into_pattern();
            if array.shape != expected {
                return Err(PersistenceError::ShapeMismatch { name, expected, found: array.shape });
            }
            *param = array.try_into()?;
        }

        if let Some(name) = stored.into_keys().next() {
            return Err(PersistenceError::UnexpectedParameter(name));
        }

        Ok(model)
    }
}

/// Model metadata for tracking training information
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub cell: CellKind,
    pub sentence_length: usize,
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub total_epochs: usize,
    pub best_loss: Option<f64>,
    pub description: Option<String>,
}

impl ModelMetadata {
    pub fn new<C: RecurrentCell>(
        model: &SequenceModel<C>,
        model_name: impl Into<String>,
        total_epochs: usize,
        best_loss: Option<f64>,
    ) -> Self {
        let shape = model.shape();
        ModelMetadata {
            model_name: model_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            cell: C::KIND,
            sentence_length: shape.sentence_length,
            vocab_size: shape.vocab_size,
            hidden_size: shape.hidden_size,
            total_epochs,
            best_loss,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Complete saved model including weights and metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedModel {
    pub metadata: ModelMetadata,
    pub model: SerializableModel,
}

/// Errors that can occur during model persistence operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary serialization error: {0}")]
    Binary(#[from] bincode::Error),
    #[error("saved model uses {found} cells, expected {expected}")]
    CellMismatch { expected: CellKind, found: CellKind },
    #[error("parameter {name} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch { name: String, expected: (usize, usize), found: (usize, usize) },
    #[error("saved model is missing parameter {0}")]
    MissingParameter(String),
    #[error("saved model has unknown parameter {0}")]
    UnexpectedParameter(String),
    #[error("array of {len} values cannot have shape {shape:?}")]
    MalformedArray { shape: (usize, usize), len: usize },
    #[error("saved dropout rate {0} is outside [0, 1)")]
    InvalidDropout(f64),
}

/// On-disk encoding, picked from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Json,
    Binary,
}

impl Format {
    /// `.json` is JSON; anything else (`.bin`, `.model`, no extension) is bincode.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Format::Json,
            _ => Format::Binary,
        }
    }
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save model to JSON format (human-readable)
    pub fn save_to_json<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(model)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load model from JSON format
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save model to binary format (compact and fast)
    pub fn save_to_binary<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<(), PersistenceError> {
        let encoded = bincode::serialize(model)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load model from binary format
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(bincode::deserialize(&contents)?)
    }

    pub fn save<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        debug!("writing {:?} model to {}", Format::from_path(path), path.display());
        match Format::from_path(path) {
            Format::Json => Self::save_to_json(model, path),
            Format::Binary => Self::save_to_binary(model, path),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        let path = path.as_ref();
        match Format::from_path(path) {
            Format::Json => Self::load_from_json(path),
            Format::Binary => Self::load_from_binary(path),
        }
    }
}

/// Convenience trait for easy model saving/loading
pub trait PersistentModel {
    /// Save model to file (format determined by file extension)
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata) -> Result<(), PersistenceError>;

    /// Load model from file (format determined by file extension)
    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError>
    where
        Self: Sized;
}

impl<C: RecurrentCell> PersistentModel for SequenceModel<C> {
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata) -> Result<(), PersistenceError> {
        let saved_model = SavedModel { metadata, model: self.into() };
        ModelPersistence::save(&saved_model, path)
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError> {
        let saved_model = ModelPersistence::load(path)?;
        Ok((saved_model.model.try_into()?, saved_model.metadata))
    }
}
