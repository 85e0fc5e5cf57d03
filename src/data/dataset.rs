//! Burn Dataset implementation for labelled text
//!
//! Loads JSON-lines corpora, encodes them against a vocabulary and batches
//! them into tensors for training.

use crate::data::vocab::Vocabulary;
use crate::{Result, TextCatError};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// One raw corpus row: `{"text": "...", "label": 3}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRecord {
    pub text: String,
    pub label: usize,
}

/// An encoded training example
#[derive(Debug, Clone)]
pub struct TextSample {
    /// Token ids, padded or truncated to the configured sequence length
    pub tokens: Vec<i32>,
    /// True for real tokens, false for padding
    pub mask: Vec<bool>,
    /// Class index
    pub label: usize,
}

/// Labelled text dataset for training
#[derive(Debug, Clone)]
pub struct TextDataset {
    samples: Vec<TextSample>,
    n_classes: usize,
}

impl TextDataset {
    /// Read raw records from a JSON-lines file
    pub fn load_records(path: &str) -> Result<Vec<TextRecord>> {
        let file = std::fs::File::open(path).map_err(|e| {
            TextCatError::Dataset(format!("Failed to open corpus {}: {}", path, e))
        })?;

        let mut records = Vec::new();
        for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: TextRecord = serde_json::from_str(&line).map_err(|e| {
                TextCatError::Parse(format!("{}:{}: {}", path, line_no + 1, e))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Encode a JSON-lines corpus against a vocabulary
    pub fn from_jsonl(
        path: &str,
        vocab: &Vocabulary,
        max_seq_len: usize,
        n_classes: usize,
    ) -> Result<Self> {
        let records = Self::load_records(path)?;
        let mut samples = Vec::with_capacity(records.len());

        for record in records {
            if record.label >= n_classes {
                return Err(TextCatError::Dataset(format!(
                    "Label {} out of range for {} classes in {}",
                    record.label, n_classes, path
                )));
            }
            let (tokens, mask) = vocab.encode(&record.text, max_seq_len);
            samples.push(TextSample {
                tokens,
                mask,
                label: record.label,
            });
        }

        log::info!("Loaded {} samples from {}", samples.len(), path);
        Ok(TextDataset { samples, n_classes })
    }

    /// Create a dataset directly from pre-encoded samples
    pub fn from_samples(samples: Vec<TextSample>, n_classes: usize) -> Self {
        TextDataset { samples, n_classes }
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples per class, indexed by class id
    pub fn label_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }
}

impl Dataset<TextSample> for TextDataset {
    fn get(&self, index: usize) -> Option<TextSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Batch of encoded text for one forward pass
#[derive(Debug, Clone)]
pub struct TextBatch<B: burn::tensor::backend::Backend> {
    /// Token ids: [batch, seq_len]
    pub tokens: burn::tensor::Tensor<B, 2, burn::tensor::Int>,
    /// True for real tokens, false for padding: [batch, seq_len]
    pub padding_mask: burn::tensor::Tensor<B, 2, burn::tensor::Bool>,
    /// Class indices: [batch]
    pub labels: burn::tensor::Tensor<B, 1, burn::tensor::Int>,
}

impl<B: burn::tensor::backend::Backend> TextBatch<B> {
    /// Number of examples in this batch
    pub fn batch_size(&self) -> usize {
        self.tokens.dims()[0]
    }

    /// Move all tensors to the given device
    pub fn to_device(self, device: &B::Device) -> Self {
        TextBatch {
            tokens: self.tokens.to_device(device),
            padding_mask: self.padding_mask.to_device(device),
            labels: self.labels.to_device(device),
        }
    }
}

/// Batcher for creating training batches
#[derive(Clone)]
pub struct TextBatcher<B: burn::tensor::backend::Backend> {
    device: B::Device,
}

impl<B: burn::tensor::backend::Backend> TextBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        TextBatcher { device }
    }
}

impl<B: burn::tensor::backend::Backend>
    burn::data::dataloader::batcher::Batcher<B, TextSample, TextBatch<B>> for TextBatcher<B>
{
    fn batch(&self, items: Vec<TextSample>, _device: &B::Device) -> TextBatch<B> {
        let batch_size = items.len();
        let seq_len = items.first().map(|s| s.tokens.len()).unwrap_or(0);

        let mut token_data = Vec::with_capacity(batch_size * seq_len);
        let mut mask_data = Vec::with_capacity(batch_size * seq_len);
        let mut label_data = Vec::with_capacity(batch_size);

        for sample in &items {
            token_data.extend(sample.tokens.iter().copied());
            mask_data.extend(sample.mask.iter().copied());
            // Labels become backend integers here
            label_data.push(sample.label as i32);
        }

        let tokens = burn::tensor::Tensor::<B, 1, burn::tensor::Int>::from_ints(
            token_data.as_slice(),
            &self.device,
        )
        .reshape([batch_size, seq_len]);

        let padding_mask = burn::tensor::Tensor::<B, 1, burn::tensor::Bool>::from_bool(
            burn::tensor::TensorData::from(mask_data.as_slice()),
            &self.device,
        )
        .reshape([batch_size, seq_len]);

        let labels = burn::tensor::Tensor::<B, 1, burn::tensor::Int>::from_ints(
            label_data.as_slice(),
            &self.device,
        );

        TextBatch {
            tokens,
            padding_mask,
            labels,
        }
    }
}
