//! Classifier architectures
//!
//! Three interchangeable models over the same batch contract: a recurrent
//! classifier, a convolutional classifier and a transformer encoder.

pub mod conv;
pub mod recurrent;
pub mod transformer;

pub use conv::{CnnClassifier, CnnConfig};
pub use recurrent::{RnnClassifier, RnnConfig, RnnState};
pub use transformer::{TransformerClassifier, TransformerConfig};

use crate::data::TextBatch;
use crate::TextCatError;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::fmt;
use std::str::FromStr;

/// The supported classifier architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Recurrent,
    Convolutional,
    Transformer,
}

impl FromStr for ModelKind {
    type Err = TextCatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rnn" => Ok(ModelKind::Recurrent),
            "cnn" => Ok(ModelKind::Convolutional),
            "transformer" => Ok(ModelKind::Transformer),
            other => Err(TextCatError::UnsupportedModel(other.to_string())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Recurrent => write!(f, "rnn"),
            ModelKind::Convolutional => write!(f, "cnn"),
            ModelKind::Transformer => write!(f, "transformer"),
        }
    }
}

/// Result of one forward pass
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// Raw per-class scores: [batch, n_classes]. No softmax is applied; the
    /// loss function owns the probability interpretation.
    pub logits: Tensor<B, 2>,
    /// Per-layer attention weights, transformer only: [batch, heads, seq, seq]
    pub attentions: Option<Vec<Tensor<B, 4>>>,
}

impl<B: Backend> ClassifierOutput<B> {
    pub fn from_logits(logits: Tensor<B, 2>) -> Self {
        ClassifierOutput {
            logits,
            attentions: None,
        }
    }
}

/// Common contract shared by the classifier architectures
///
/// `State` is per-batch transient state threaded across iterations within an
/// epoch: the recurrent hidden/cell pair, `()` for stateless models. The
/// caller owns the state between forward calls and detaches it each iteration
/// to keep the computation graph bounded.
pub trait SequenceClassifier<B: Backend> {
    type State;

    /// Zero state sized for `batch_size`, created on `device`
    fn init_state(&self, batch_size: usize, device: &B::Device) -> Self::State;

    /// Sever the state from the computation graph of previous iterations
    fn detach_state(&self, state: Self::State) -> Self::State;

    fn forward(&self, batch: &TextBatch<B>, state: Self::State)
        -> (ClassifierOutput<B>, Self::State);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_identifiers_parse() {
        assert_eq!("rnn".parse::<ModelKind>().unwrap(), ModelKind::Recurrent);
        assert_eq!("CNN".parse::<ModelKind>().unwrap(), ModelKind::Convolutional);
        assert_eq!(
            "transformer".parse::<ModelKind>().unwrap(),
            ModelKind::Transformer
        );
    }

    #[test]
    fn test_unknown_identifier_is_configuration_error() {
        let err = "svm".parse::<ModelKind>().unwrap_err();
        match err {
            TextCatError::UnsupportedModel(name) => assert_eq!(name, "svm"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_display_round_trips() {
        for kind in [
            ModelKind::Recurrent,
            ModelKind::Convolutional,
            ModelKind::Transformer,
        ] {
            assert_eq!(kind.to_string().parse::<ModelKind>().unwrap(), kind);
        }
    }
}
