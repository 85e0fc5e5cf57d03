//! Text classification using deep learning
//!
//! Recurrent, convolutional and transformer-encoder classifiers over tokenized
//! text, sharing a single training/validation loop with early stopping and
//! learning-rate scheduling.

pub mod data;
pub mod model;
pub mod training;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide errors
#[derive(Debug, Error)]
pub enum TextCatError {
    #[error("Model type \"{0}\" not supported")]
    UnsupportedModel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, TextCatError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub training: TrainingConfig,
    pub model: ModelConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub early_stopping_patience: usize,
    /// Log training loss/accuracy every N iterations
    pub print_every: usize,
    /// Log validation loss/accuracy every N epochs
    pub print_validation_every: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Maximum vocabulary size (most frequent tokens kept)
    pub max_vocab: usize,
    /// Sequences are padded or truncated to this length
    pub max_seq_len: usize,
    pub n_classes: usize,
    pub embedding_dim: usize,
    /// Recurrent hidden size
    pub hidden_dim: usize,
    /// Number of stacked recurrent layers
    pub n_layers: usize,
    /// Convolutional filter counts, one per filter width
    pub num_filters: Vec<usize>,
    /// Convolutional filter widths (in tokens)
    pub filter_sizes: Vec<usize>,
    /// Transformer model dimension
    pub d_model: usize,
    pub n_heads: usize,
    pub n_encoder_layers: usize,
    pub d_ff: usize,
    pub dropout: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub train_path: String,
    pub validation_path: String,
    pub model_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            training: TrainingConfig {
                epochs: 20,
                batch_size: 32,
                learning_rate: 1e-3,
                early_stopping_patience: 3,
                print_every: 10,
                print_validation_every: 1,
            },
            model: ModelConfig {
                max_vocab: 20_000,
                max_seq_len: 128,
                n_classes: 5,
                embedding_dim: 128,
                hidden_dim: 256,
                n_layers: 2,
                num_filters: vec![64, 64, 64],
                filter_sizes: vec![3, 4, 5],
                d_model: 128,
                n_heads: 8,
                n_encoder_layers: 4,
                d_ff: 512,
                dropout: 0.5,
            },
            data: DataConfig {
                train_path: "data/train.jsonl".to_string(),
                validation_path: "data/validation.jsonl".to_string(),
                model_path: "model/textcat_model".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TextCatError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| TextCatError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TextCatError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
