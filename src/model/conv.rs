//! Convolutional classifier
//!
//! Parallel convolution filters of different widths over the embedded token
//! sequence, max-pooled over time and concatenated.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::data::TextBatch;
use crate::model::{ClassifierOutput, SequenceClassifier};

/// Configuration for the convolutional classifier
#[derive(Debug, Clone)]
pub struct CnnConfig {
    pub vocab_size: usize,
    pub n_classes: usize,
    pub embedding_dim: usize,
    /// Filter count per filter width, aligned with `filter_sizes`
    pub num_filters: Vec<usize>,
    /// Filter widths in tokens; sequences must be at least this long
    pub filter_sizes: Vec<usize>,
    pub dropout: f64,
}

impl Default for CnnConfig {
    fn default() -> Self {
        CnnConfig {
            vocab_size: 20_000,
            n_classes: 5,
            embedding_dim: 128,
            num_filters: vec![64, 64, 64],
            filter_sizes: vec![3, 4, 5],
            dropout: 0.1,
        }
    }
}

/// Convolutional classifier over token sequences
#[derive(Module, Debug)]
pub struct CnnClassifier<B: Backend> {
    embedding: Embedding<B>,
    convs: Vec<Conv2d<B>>,
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> CnnClassifier<B> {
    pub fn new(device: &B::Device, config: CnnConfig) -> Self {
        // One conv per filter width, spanning the full embedding dimension
        let convs = config
            .num_filters
            .iter()
            .zip(&config.filter_sizes)
            .map(|(&n, &k)| Conv2dConfig::new([1, n], [k, config.embedding_dim]).init(device))
            .collect();

        let fc_input: usize = config.num_filters.iter().sum();

        CnnClassifier {
            embedding: EmbeddingConfig::new(config.vocab_size, config.embedding_dim).init(device),
            convs,
            dropout: DropoutConfig::new(config.dropout).init(),
            fc: LinearConfig::new(fc_input, config.n_classes).init(device),
        }
    }

    pub fn forward(&self, tokens: Tensor<B, 2, burn::tensor::Int>) -> Tensor<B, 2> {
        let x = self.embedding.forward(tokens);
        // Single input channel for the 2d convolutions
        let x: Tensor<B, 4> = x.unsqueeze_dim(1);

        let mut pooled = Vec::with_capacity(self.convs.len());
        for conv in &self.convs {
            let y = relu(conv.forward(x.clone()));
            let [batch, channels, time, _] = y.dims();
            let y = y.reshape([batch, channels, time]);
            // Max over time
            let y = y.max_dim(2);
            pooled.push(y.reshape([batch, channels]));
        }

        let features = Tensor::cat(pooled, 1);
        self.fc.forward(self.dropout.forward(features))
    }
}

impl<B: Backend> SequenceClassifier<B> for CnnClassifier<B> {
    type State = ();

    fn init_state(&self, _batch_size: usize, _device: &B::Device) {}

    fn detach_state(&self, _state: ()) {}

    fn forward(&self, batch: &TextBatch<B>, _state: ()) -> (ClassifierOutput<B>, ()) {
        let logits = self.forward(batch.tokens.clone());
        (ClassifierOutput::from_logits(logits), ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Int;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let config = CnnConfig {
            vocab_size: 50,
            n_classes: 4,
            embedding_dim: 8,
            num_filters: vec![6, 6],
            filter_sizes: vec![2, 3],
            dropout: 0.0,
        };
        let model = CnnClassifier::<TestBackend>::new(&device, config);

        let tokens = Tensor::<TestBackend, 2, Int>::ones([3, 10], &device);
        let logits = model.forward(tokens);

        assert_eq!(logits.dims(), [3, 4]);
    }

    #[test]
    fn test_sequence_as_short_as_widest_filter() {
        let device = Default::default();
        let config = CnnConfig {
            vocab_size: 50,
            n_classes: 2,
            embedding_dim: 8,
            num_filters: vec![4],
            filter_sizes: vec![5],
            dropout: 0.0,
        };
        let model = CnnClassifier::<TestBackend>::new(&device, config);

        let tokens = Tensor::<TestBackend, 2, Int>::ones([2, 5], &device);
        let logits = model.forward(tokens);

        assert_eq!(logits.dims(), [2, 2]);
    }
}
