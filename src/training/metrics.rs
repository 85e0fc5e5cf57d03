//! Training metrics and history tracking

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Tensor};

/// Fraction of examples whose arg-max score matches the label
pub fn batch_accuracy<B: Backend>(
    logits: &Tensor<B, 2>,
    labels: &Tensor<B, 1, Int>,
) -> f64 {
    let batch_size = labels.dims()[0];
    if batch_size == 0 {
        return 0.0;
    }

    // argmax(1) returns [batch, 1], flatten to [batch] before comparing
    let predictions = logits.clone().argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predictions
        .equal(labels.clone())
        .int()
        .sum()
        .into_scalar()
        .elem();

    correct as f64 / batch_size as f64
}

/// Per-epoch loss and accuracy curves for training and validation
///
/// Append-only: one entry per completed epoch, consumed by the final report.
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub train_accuracies: Vec<f64>,
    pub val_accuracies: Vec<f64>,
    pub best_val_loss: f64,
    pub best_epoch: usize,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self {
            best_val_loss: f64::INFINITY,
            ..Default::default()
        }
    }

    /// Record metrics for a completed epoch
    pub fn record_epoch(
        &mut self,
        epoch: usize,
        train_loss: f64,
        train_accuracy: f64,
        val_loss: f64,
        val_accuracy: f64,
    ) {
        self.train_losses.push(train_loss);
        self.train_accuracies.push(train_accuracy);
        self.val_losses.push(val_loss);
        self.val_accuracies.push(val_accuracy);

        if val_loss < self.best_val_loss {
            self.best_val_loss = val_loss;
            self.best_epoch = epoch;
        }
    }

    /// Number of completed epochs
    pub fn len(&self) -> usize {
        self.train_losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_losses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batch_accuracy() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            [[2.0, 0.1, 0.1], [0.1, 3.0, 0.1], [0.1, 0.1, 1.0], [5.0, 0.1, 0.1]],
            &device,
        );
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 2, 1], &device);

        // Three of four arg-max predictions match
        let accuracy = batch_accuracy(&logits, &labels);
        assert!((accuracy - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_history_tracks_best_epoch() {
        let mut history = TrainingHistory::new();

        history.record_epoch(0, 1.0, 0.5, 0.9, 0.5);
        history.record_epoch(1, 0.8, 0.6, 0.7, 0.6);
        history.record_epoch(2, 0.7, 0.7, 0.75, 0.65);

        assert_eq!(history.len(), 3);
        assert_eq!(history.best_epoch, 1);
        assert!((history.best_val_loss - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_history_series_stay_parallel() {
        let mut history = TrainingHistory::new();
        history.record_epoch(0, 1.0, 0.5, 0.9, 0.5);

        assert_eq!(history.train_losses.len(), history.val_losses.len());
        assert_eq!(history.train_accuracies.len(), history.val_accuracies.len());
        assert_eq!(history.len(), 1);
    }
}
