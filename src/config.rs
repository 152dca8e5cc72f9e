use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::layers::CellKind;
use crate::training::TrainingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where the event log lives and how it is cut into windows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub path: PathBuf,
    pub sentence_length: usize,
    pub step: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig { path: PathBuf::from("train_data"), sentence_length: 40, step: 3 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub cell: CellKind,
    pub hidden_len: usize,
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig { cell: CellKind::Lstm, hidden_len: 512, dropout: 0.2 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Number of train-then-generate rounds
    pub iterations: usize,
    /// IDs generated per temperature
    pub predictions: usize,
    pub temperatures: Vec<f64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig { iterations: 40, predictions: 100, temperatures: vec![0.2, 0.5] }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub checkpoint_path: PathBuf,
    pub weights_path: PathBuf,
    pub graph_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            checkpoint_path: PathBuf::from("weights.bin"),
            weights_path: PathBuf::from("brnn_model_weights.bin"),
            graph_path: Some(PathBuf::from("brnn_model.dot")),
        }
    }
}

/// Full run configuration; every field falls back to its default when absent from the file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub seed: u64,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub generation: GenerationConfig,
    pub output: OutputConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            seed: 1337,
            data: DataConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            generation: GenerationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn from_json_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text, path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.data.sentence_length == 0 {
            return invalid("data.sentence_length must be positive".into());
        }
        if self.data.step == 0 {
            return invalid("data.step must be positive".into());
        }
        if self.model.hidden_len == 0 {
            return invalid("model.hidden_len must be positive".into());
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return invalid(format!("model.dropout must be in [0, 1), got {}", self.model.dropout));
        }
        if self.training.batch_size == 0 {
            return invalid("training.batch_size must be positive".into());
        }
        if !(0.0..1.0).contains(&self.training.validation_split) {
            return invalid(format!(
                "training.validation_split must be in [0, 1), got {}",
                self.training.validation_split
            ));
        }
        if let Some(clip) = self.training.clip_gradient {
            if !(clip.is_finite() && clip > 0.0) {
                return invalid(format!("training.clip_gradient must be positive, got {}", clip));
            }
        }
        let learning_rate = self.training.optimizer.learning_rate();
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return invalid(format!("training.optimizer.learning_rate must be positive, got {}", learning_rate));
        }
        if self.generation.temperatures.is_empty() {
            return invalid("generation.temperatures must not be empty".into());
        }
        if let Some(t) = self.generation.temperatures.iter().find(|t| !(t.is_finite() && **t > 0.0)) {
            return invalid(format!("temperatures must be positive, got {}", t));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::OptimizerConfig;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.seed, 1337);
        assert_eq!(config.data.sentence_length, 40);
        assert_eq!(config.data.step, 3);
        assert_eq!(config.model.cell, CellKind::Lstm);
        assert_eq!(config.model.hidden_len, 512);
        assert_eq!(config.training.batch_size, 128);
        assert_eq!(config.training.validation_split, 0.1);
        assert_eq!(config.training.optimizer, OptimizerConfig::Rmsprop { learning_rate: 0.001 });
        assert_eq!(config.generation.iterations, 40);
        assert_eq!(config.generation.temperatures, vec![0.2, 0.5]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "seed": 7,
            "model": { "cell": "gru", "hidden_len": 32 },
            "training": { "optimizer": { "kind": "adam", "learning_rate": 0.01 } },
            "output": { "graph_path": null }
        }"#;
        let config = AnalyzerConfig::from_json_str(json, Path::new("inline.json")).unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.model.cell, CellKind::Gru);
        assert_eq!(config.model.hidden_len, 32);
        assert_eq!(config.model.dropout, 0.2);
        assert_eq!(config.training.optimizer, OptimizerConfig::Adam { learning_rate: 0.01 });
        assert_eq!(config.training.batch_size, 128);
        assert_eq!(config.output.graph_path, None);
        assert_eq!(config.output.weights_path, PathBuf::from("brnn_model_weights.bin"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = AnalyzerConfig::from_json_str("{ not json", Path::new("bad.json")).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: [fn(&mut AnalyzerConfig); 10] = [
            |c| c.data.sentence_length = 0,
            |c| c.data.step = 0,
            |c| c.model.hidden_len = 0,
            |c| c.model.dropout = 1.0,
            |c| c.training.batch_size = 0,
            |c| c.training.validation_split = -0.1,
            |c| c.training.clip_gradient = Some(0.0),
            |c| c.training.optimizer = OptimizerConfig::Sgd { learning_rate: 0.0 },
            |c| c.generation.temperatures.clear(),
            |c| c.generation.temperatures = vec![0.5, -1.0],
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut config = AnalyzerConfig::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "case {} should be rejected",
                i
            );
        }
    }
}
