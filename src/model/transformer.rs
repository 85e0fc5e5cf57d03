//! Transformer-encoder classifier
//!
//! Encodes the token sequence with self-attention and classifies from a
//! prepended classification token. The attention weights of every layer are
//! returned alongside the logits for inspection.

use burn::module::Module;
use burn::nn::{self, Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::tensor::activation::{gelu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Tensor};

use crate::data::TextBatch;
use crate::model::{ClassifierOutput, SequenceClassifier};

/// Configuration for the transformer classifier
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    pub vocab_size: usize,
    pub n_classes: usize,
    /// Model dimension (d_model)
    pub d_model: usize,
    /// Number of attention heads
    pub n_heads: usize,
    /// Number of encoder layers
    pub n_layers: usize,
    /// Feedforward hidden dimension
    pub d_ff: usize,
    /// Dropout rate
    pub dropout: f64,
    /// Maximum sequence length
    pub max_seq_len: usize,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        TransformerConfig {
            vocab_size: 20_000,
            n_classes: 5,
            d_model: 128,
            n_heads: 8,
            n_layers: 4,
            d_ff: 512,
            dropout: 0.1,
            max_seq_len: 128,
        }
    }
}

/// Sinusoidal positional encoding added to the embedded sequence
#[derive(Module, Debug)]
pub struct PositionalEncoding<B: Backend> {
    /// Precomputed position table, never trained
    encoding: Tensor<B, 2>,
    d_model: usize,
}

impl<B: Backend> PositionalEncoding<B> {
    pub fn new(device: &B::Device, max_len: usize, d_model: usize) -> Self {
        let mut encoding_data = vec![0.0f32; max_len * d_model];

        for pos in 0..max_len {
            for i in 0..d_model {
                let angle = pos as f32 / 10000_f32.powf((2 * (i / 2)) as f32 / d_model as f32);
                encoding_data[pos * d_model + i] =
                    if i % 2 == 0 { angle.sin() } else { angle.cos() };
            }
        }

        let encoding = Tensor::<B, 1>::from_floats(encoding_data.as_slice(), device)
            .reshape([max_len, d_model]);

        PositionalEncoding { encoding, d_model }
    }

    /// Add positional encoding to input: [batch, seq_len, d_model]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [_batch, seq_len, _d_model] = x.dims();
        let pos_encoding = self.encoding.clone().slice([0..seq_len, 0..self.d_model]);
        x + pos_encoding.unsqueeze()
    }
}

/// Multi-head self-attention layer
#[derive(Module, Debug)]
pub struct MultiHeadAttention<B: Backend> {
    query: Linear<B>,
    key: Linear<B>,
    value: Linear<B>,
    output: Linear<B>,
    dropout: Dropout,
    n_heads: usize,
    head_dim: usize,
    scale: f32,
}

impl<B: Backend> MultiHeadAttention<B> {
    pub fn new(device: &B::Device, d_model: usize, n_heads: usize, dropout: f64) -> Self {
        let head_dim = d_model / n_heads;

        MultiHeadAttention {
            query: LinearConfig::new(d_model, d_model).init(device),
            key: LinearConfig::new(d_model, d_model).init(device),
            value: LinearConfig::new(d_model, d_model).init(device),
            output: LinearConfig::new(d_model, d_model).init(device),
            dropout: DropoutConfig::new(dropout).init(),
            n_heads,
            head_dim,
            scale: (head_dim as f32).sqrt(),
        }
    }

    /// Forward pass with an optional validity mask (true = real token)
    ///
    /// Returns the attended output and the post-softmax attention weights
    /// [batch, heads, seq, seq].
    pub fn forward(
        &self,
        query: Tensor<B, 3>,
        key: Tensor<B, 3>,
        value: Tensor<B, 3>,
        mask: Option<Tensor<B, 2, Bool>>,
    ) -> (Tensor<B, 3>, Tensor<B, 4>) {
        let [batch, seq_len, _] = query.dims();

        // Project Q, K, V
        let q = self.query.forward(query);
        let k = self.key.forward(key);
        let v = self.value.forward(value);

        // Reshape for multi-head attention: [batch, seq, heads, head_dim]
        let q = q.reshape([batch, seq_len, self.n_heads, self.head_dim]);
        let k = k.reshape([batch, seq_len, self.n_heads, self.head_dim]);
        let v = v.reshape([batch, seq_len, self.n_heads, self.head_dim]);

        // Transpose to [batch, heads, seq, head_dim]
        let q = q.swap_dims(1, 2);
        let k = k.swap_dims(1, 2);
        let v = v.swap_dims(1, 2);

        // Attention scores: [batch, heads, seq, seq]
        let scores = q.matmul(k.swap_dims(2, 3)) / self.scale;

        // Keep padding positions out of the softmax
        let scores = if let Some(mask) = mask {
            let padding: Tensor<B, 2, Bool> = mask.bool_not();
            let padding: Tensor<B, 3, Bool> = padding.unsqueeze_dim(1);
            let padding: Tensor<B, 4, Bool> = padding.unsqueeze_dim(1);
            let scores_dims = scores.dims();
            let neg_inf = Tensor::<B, 4>::full(scores_dims, -1e9, &scores.device());
            scores.mask_where(padding.expand(scores_dims), neg_inf)
        } else {
            scores
        };

        let attn = softmax(scores, 3);
        let weighted = self.dropout.forward(attn.clone());

        // Apply attention to values and merge heads: [batch, seq, d_model]
        let out = weighted.matmul(v);
        let out = out
            .swap_dims(1, 2)
            .reshape([batch, seq_len, self.n_heads * self.head_dim]);

        (self.output.forward(out), attn)
    }
}

/// Transformer encoder layer
#[derive(Module, Debug)]
pub struct EncoderLayer<B: Backend> {
    self_attn: MultiHeadAttention<B>,
    ff1: Linear<B>,
    ff2: Linear<B>,
    norm1: nn::LayerNorm<B>,
    norm2: nn::LayerNorm<B>,
    dropout: Dropout,
}

impl<B: Backend> EncoderLayer<B> {
    pub fn new(device: &B::Device, config: &TransformerConfig) -> Self {
        EncoderLayer {
            self_attn: MultiHeadAttention::new(
                device,
                config.d_model,
                config.n_heads,
                config.dropout,
            ),
            ff1: LinearConfig::new(config.d_model, config.d_ff).init(device),
            ff2: LinearConfig::new(config.d_ff, config.d_model).init(device),
            norm1: nn::LayerNormConfig::new(config.d_model).init(device),
            norm2: nn::LayerNormConfig::new(config.d_model).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
        }
    }

    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        mask: Option<Tensor<B, 2, Bool>>,
    ) -> (Tensor<B, 3>, Tensor<B, 4>) {
        // Self-attention with residual connection
        let (attn_out, attn) = self
            .self_attn
            .forward(x.clone(), x.clone(), x.clone(), mask);
        let x = self.norm1.forward(x + self.dropout.forward(attn_out));

        // Feedforward with residual connection
        let ff_out = self.ff2.forward(gelu(self.ff1.forward(x.clone())));
        let x = self.norm2.forward(x + self.dropout.forward(ff_out));

        (x, attn)
    }
}

/// Transformer encoder with a classification head
#[derive(Module, Debug)]
pub struct TransformerClassifier<B: Backend> {
    embedding: Embedding<B>,
    pos_encoding: PositionalEncoding<B>,
    layers: Vec<EncoderLayer<B>>,
    norm: nn::LayerNorm<B>,
    /// Classification token prepended to every sequence
    cls_token: Tensor<B, 2>,
    cls_head: Linear<B>,
    d_model: usize,
}

impl<B: Backend> TransformerClassifier<B> {
    pub fn new(device: &B::Device, config: TransformerConfig) -> Self {
        let layers: Vec<_> = (0..config.n_layers)
            .map(|_| EncoderLayer::new(device, &config))
            .collect();

        let cls_token = Tensor::<B, 2>::random(
            [1, config.d_model],
            burn::tensor::Distribution::Uniform(-0.02, 0.02),
            device,
        );

        TransformerClassifier {
            embedding: EmbeddingConfig::new(config.vocab_size, config.d_model).init(device),
            pos_encoding: PositionalEncoding::new(device, config.max_seq_len + 1, config.d_model),
            layers,
            norm: nn::LayerNormConfig::new(config.d_model).init(device),
            cls_token,
            cls_head: LinearConfig::new(config.d_model, config.n_classes).init(device),
            d_model: config.d_model,
        }
    }

    /// Classify a batch of sequences
    ///
    /// # Arguments
    /// * `tokens` - Token ids [batch, seq_len]
    /// * `mask` - Validity mask [batch, seq_len] (true = real token)
    ///
    /// # Returns
    /// Logits [batch, n_classes] and per-layer attention weights
    /// [batch, heads, seq_len + 1, seq_len + 1].
    pub fn forward(
        &self,
        tokens: Tensor<B, 2, burn::tensor::Int>,
        mask: Tensor<B, 2, Bool>,
    ) -> (Tensor<B, 2>, Vec<Tensor<B, 4>>) {
        let [batch, _seq_len] = tokens.dims();

        let x = self.embedding.forward(tokens);

        // Prepend the classification token
        let cls_tokens = self
            .cls_token
            .clone()
            .unsqueeze::<3>()
            .expand([batch, 1, self.d_model]);
        let x = Tensor::cat(vec![cls_tokens, x], 1);

        // The classification token is always valid
        let cls_mask =
            Tensor::<B, 2, burn::tensor::Int>::ones([batch, 1], &mask.device()).bool();
        let mask = Tensor::cat(vec![cls_mask, mask], 1);

        let mut x = self.pos_encoding.forward(x);
        let mut attentions = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (out, attn) = layer.forward(x, Some(mask.clone()));
            x = out;
            attentions.push(attn);
        }

        // Classify from the classification-token representation
        let x = self.norm.forward(x);
        let cls_rep = x
            .slice([0..batch, 0..1, 0..self.d_model])
            .reshape([batch, self.d_model]);
        let logits = self.cls_head.forward(cls_rep);

        (logits, attentions)
    }
}

impl<B: Backend> SequenceClassifier<B> for TransformerClassifier<B> {
    type State = ();

    fn init_state(&self, _batch_size: usize, _device: &B::Device) {}

    fn detach_state(&self, _state: ()) {}

    fn forward(&self, batch: &TextBatch<B>, _state: ()) -> (ClassifierOutput<B>, ()) {
        let (logits, attentions) = self.forward(batch.tokens.clone(), batch.padding_mask.clone());
        (
            ClassifierOutput {
                logits,
                attentions: Some(attentions),
            },
            (),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Int, TensorData};

    type TestBackend = NdArray<f32>;

    fn small_config() -> TransformerConfig {
        TransformerConfig {
            vocab_size: 50,
            n_classes: 3,
            d_model: 16,
            n_heads: 4,
            n_layers: 2,
            d_ff: 32,
            dropout: 0.0,
            max_seq_len: 12,
        }
    }

    fn full_mask(batch: usize, seq_len: usize) -> Tensor<TestBackend, 2, Bool> {
        Tensor::<TestBackend, 2, burn::tensor::Int>::ones([batch, seq_len], &Default::default())
            .bool()
    }

    #[test]
    fn test_forward_shape_and_attentions() {
        let device = Default::default();
        let model = TransformerClassifier::<TestBackend>::new(&device, small_config());

        let tokens = Tensor::<TestBackend, 2, Int>::ones([2, 10], &device);
        let (logits, attentions) = model.forward(tokens, full_mask(2, 10));

        assert_eq!(logits.dims(), [2, 3]);
        assert_eq!(attentions.len(), 2);
        for attn in &attentions {
            // Sequence length includes the classification token
            assert_eq!(attn.dims(), [2, 4, 11, 11]);
        }
    }

    #[test]
    fn test_forward_with_padding() {
        let device = Default::default();
        let model = TransformerClassifier::<TestBackend>::new(&device, small_config());

        let tokens = Tensor::<TestBackend, 2, Int>::ones([1, 6], &device);
        let mask = Tensor::<TestBackend, 1, Bool>::from_bool(
            TensorData::from([true, true, true, false, false, false].as_slice()),
            &device,
        )
        .reshape([1, 6]);

        let (logits, _) = model.forward(tokens, mask);
        assert_eq!(logits.dims(), [1, 3]);
    }

    #[test]
    fn test_positional_encoding_shape() {
        let device = Default::default();
        let pe = PositionalEncoding::<TestBackend>::new(&device, 20, 16);

        let x = Tensor::<TestBackend, 3>::zeros([2, 10, 16], &device);
        assert_eq!(pe.forward(x).dims(), [2, 10, 16]);
    }

    #[test]
    fn test_multi_head_attention() {
        let device = Default::default();
        let attn = MultiHeadAttention::<TestBackend>::new(&device, 16, 4, 0.0);

        let x = Tensor::<TestBackend, 3>::zeros([2, 10, 16], &device);
        let (out, weights) = attn.forward(x.clone(), x.clone(), x, None);

        assert_eq!(out.dims(), [2, 10, 16]);
        assert_eq!(weights.dims(), [2, 4, 10, 10]);
    }
}
