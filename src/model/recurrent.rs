//! Recurrent classifier
//!
//! Embeds the token sequence, runs it through stacked LSTM layers and
//! classifies from the final time step.

use burn::module::Module;
use burn::nn::{
    Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig, Lstm, LstmConfig,
    LstmState,
};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::data::TextBatch;
use crate::model::{ClassifierOutput, SequenceClassifier};

/// Configuration for the recurrent classifier
#[derive(Debug, Clone)]
pub struct RnnConfig {
    pub vocab_size: usize,
    pub n_classes: usize,
    pub embedding_dim: usize,
    /// LSTM hidden size
    pub hidden_dim: usize,
    /// Number of stacked LSTM layers
    pub n_layers: usize,
    pub dropout: f64,
}

impl Default for RnnConfig {
    fn default() -> Self {
        RnnConfig {
            vocab_size: 20_000,
            n_classes: 5,
            embedding_dim: 128,
            hidden_dim: 256,
            n_layers: 2,
            dropout: 0.5,
        }
    }
}

/// Hidden and cell state for every LSTM layer
///
/// One `[batch, hidden_dim]` pair per layer. Owned by the caller between
/// forward calls within an epoch.
pub struct RnnState<B: Backend> {
    pub layers: Vec<LstmState<B, 2>>,
}

impl<B: Backend> RnnState<B> {
    /// Detach every tensor from the prior computation graph
    pub fn detach(self) -> Self {
        RnnState {
            layers: self
                .layers
                .into_iter()
                .map(|s| LstmState::new(s.cell.detach(), s.hidden.detach()))
                .collect(),
        }
    }
}

/// LSTM classifier over token sequences
#[derive(Module, Debug)]
pub struct RnnClassifier<B: Backend> {
    embedding: Embedding<B>,
    layers: Vec<Lstm<B>>,
    dropout: Dropout,
    fc: Linear<B>,
    hidden_dim: usize,
}

impl<B: Backend> RnnClassifier<B> {
    pub fn new(device: &B::Device, config: RnnConfig) -> Self {
        let layers = (0..config.n_layers)
            .map(|idx| {
                let d_input = if idx == 0 {
                    config.embedding_dim
                } else {
                    config.hidden_dim
                };
                LstmConfig::new(d_input, config.hidden_dim, true).init(device)
            })
            .collect();

        RnnClassifier {
            embedding: EmbeddingConfig::new(config.vocab_size, config.embedding_dim).init(device),
            layers,
            dropout: DropoutConfig::new(config.dropout).init(),
            fc: LinearConfig::new(config.hidden_dim, config.n_classes).init(device),
            hidden_dim: config.hidden_dim,
        }
    }

    /// Zero-initialized hidden state for a batch of `batch_size` examples
    ///
    /// Called once per phase, not once per run: training and validation
    /// loaders may use different batch sizes.
    pub fn init_hidden(&self, batch_size: usize, device: &B::Device) -> RnnState<B> {
        let layers = (0..self.layers.len())
            .map(|_| {
                LstmState::new(
                    Tensor::zeros([batch_size, self.hidden_dim], device),
                    Tensor::zeros([batch_size, self.hidden_dim], device),
                )
            })
            .collect();
        RnnState { layers }
    }

    /// Forward pass threading hidden state
    ///
    /// The returned state is always sized for the current batch: when the
    /// loader hands over a final batch smaller than the state it was
    /// initialized for, the stale state is replaced by zeros.
    pub fn forward(
        &self,
        tokens: Tensor<B, 2, burn::tensor::Int>,
        state: RnnState<B>,
    ) -> (Tensor<B, 2>, RnnState<B>) {
        let [batch_size, seq_len] = tokens.dims();
        let n_layers = self.layers.len();

        let mut x = self.embedding.forward(tokens);
        let mut next_layers = Vec::with_capacity(n_layers);

        for (idx, (lstm, layer_state)) in self.layers.iter().zip(state.layers).enumerate() {
            let layer_state = if layer_state.hidden.dims()[0] == batch_size {
                Some(layer_state)
            } else {
                None
            };
            let (out, new_state) = lstm.forward(x, layer_state);
            next_layers.push(new_state);

            x = if idx + 1 < n_layers {
                self.dropout.forward(out)
            } else {
                out
            };
        }

        // Classify from the final time step
        let last = x
            .slice([0..batch_size, seq_len - 1..seq_len, 0..self.hidden_dim])
            .reshape([batch_size, self.hidden_dim]);
        let logits = self.fc.forward(self.dropout.forward(last));

        (logits, RnnState { layers: next_layers })
    }
}

impl<B: Backend> SequenceClassifier<B> for RnnClassifier<B> {
    type State = RnnState<B>;

    fn init_state(&self, batch_size: usize, device: &B::Device) -> RnnState<B> {
        self.init_hidden(batch_size, device)
    }

    fn detach_state(&self, state: RnnState<B>) -> RnnState<B> {
        state.detach()
    }

    fn forward(
        &self,
        batch: &TextBatch<B>,
        state: RnnState<B>,
    ) -> (ClassifierOutput<B>, RnnState<B>) {
        let (logits, state) = self.forward(batch.tokens.clone(), state);
        (ClassifierOutput::from_logits(logits), state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Int;

    type TestBackend = NdArray<f32>;

    fn small_config() -> RnnConfig {
        RnnConfig {
            vocab_size: 50,
            n_classes: 3,
            embedding_dim: 8,
            hidden_dim: 16,
            n_layers: 2,
            dropout: 0.0,
        }
    }

    fn tokens(batch_size: usize, seq_len: usize) -> Tensor<TestBackend, 2, Int> {
        Tensor::<TestBackend, 2, Int>::ones([batch_size, seq_len], &Default::default())
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = RnnClassifier::<TestBackend>::new(&device, small_config());

        let hidden = model.init_hidden(4, &device);
        let (logits, hidden) = model.forward(tokens(4, 10), hidden);

        assert_eq!(logits.dims(), [4, 3]);
        assert_eq!(hidden.layers.len(), 2);
        for layer in &hidden.layers {
            assert_eq!(layer.hidden.dims(), [4, 16]);
            assert_eq!(layer.cell.dims(), [4, 16]);
        }
    }

    #[test]
    fn test_state_resizes_for_smaller_final_batch() {
        let device = Default::default();
        let model = RnnClassifier::<TestBackend>::new(&device, small_config());

        // State initialized for the loader batch size, then a smaller final
        // batch arrives
        let hidden = model.init_hidden(4, &device);
        let (logits, hidden) = model.forward(tokens(2, 10), hidden);

        assert_eq!(logits.dims(), [2, 3]);
        for layer in &hidden.layers {
            assert_eq!(layer.hidden.dims(), [2, 16]);
        }
    }

    #[test]
    fn test_state_threads_across_iterations() {
        let device = Default::default();
        let model = RnnClassifier::<TestBackend>::new(&device, small_config());

        let hidden = model.init_hidden(2, &device);
        let (_, hidden) = model.forward(tokens(2, 6), hidden);
        let hidden = hidden.detach();
        let (logits, _) = model.forward(tokens(2, 6), hidden);

        assert_eq!(logits.dims(), [2, 3]);
    }
}
