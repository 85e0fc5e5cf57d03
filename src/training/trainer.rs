//! Shared training and validation loop
//!
//! One epoch/iteration loop driving any of the classifier architectures:
//! forward pass, cross-entropy loss, backpropagation, optimizer step, running
//! metrics, optional learning-rate scheduling and early stopping.

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use crate::data::{TextBatcher, TextDataset};
use crate::model::SequenceClassifier;
use crate::training::early_stopping::{EarlyStopping, StoppingDecision};
use crate::training::metrics::{batch_accuracy, TrainingHistory};
use crate::training::scheduler::ReduceOnPlateau;
use crate::{Result, TextCatError};

/// Loop parameters
#[derive(Debug, Clone)]
pub struct TrainSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Log training loss/accuracy every N iterations
    pub print_every: usize,
    /// Log validation loss/accuracy every N epochs
    pub print_validation_every: usize,
    /// Where the best model snapshot is persisted when early stopping is on
    pub checkpoint_path: Option<String>,
}

impl Default for TrainSettings {
    fn default() -> Self {
        TrainSettings {
            epochs: 20,
            batch_size: 32,
            learning_rate: 1e-3,
            print_every: 10,
            print_validation_every: 1,
            checkpoint_path: None,
        }
    }
}

/// Trainer for any sequence classifier
pub struct Trainer<B, M>
where
    B: AutodiffBackend,
    M: SequenceClassifier<B> + AutodiffModule<B>,
{
    model: M,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, M, B>,
    scheduler: Option<ReduceOnPlateau>,
    early_stopping: Option<EarlyStopping>,
    settings: TrainSettings,
    device: B::Device,
}

impl<B, M> Trainer<B, M>
where
    B: AutodiffBackend,
    M: SequenceClassifier<B> + AutodiffModule<B>,
    M::InnerModule: SequenceClassifier<B::InnerBackend>,
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn new(model: M, device: B::Device, settings: TrainSettings) -> Self {
        let optimizer = AdamConfig::new().init();

        Trainer {
            model,
            optimizer,
            scheduler: None,
            early_stopping: None,
            settings,
            device,
        }
    }

    /// Reduce the learning rate when the training loss plateaus
    pub fn with_scheduler(mut self, scheduler: ReduceOnPlateau) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Stop training after non-improving validation epochs
    pub fn with_early_stopping(mut self, early_stopping: EarlyStopping) -> Self {
        self.early_stopping = Some(early_stopping);
        self
    }

    /// Train the model, returning the best-validation snapshot and the
    /// per-epoch history
    pub fn fit(
        mut self,
        train_dataset: TextDataset,
        val_dataset: TextDataset,
    ) -> Result<(M, TrainingHistory)> {
        if train_dataset.is_empty() || val_dataset.is_empty() {
            return Err(TextCatError::Dataset(
                "Training and validation sets must be non-empty".to_string(),
            ));
        }

        let batcher_train = TextBatcher::<B>::new(self.device.clone());
        let train_loader = DataLoaderBuilder::new(batcher_train)
            .batch_size(self.settings.batch_size)
            .shuffle(42)
            .build(train_dataset);

        // Validation runs on the inner backend: no autodiff overhead and
        // dropout disabled via `model.valid()`
        let batcher_val = TextBatcher::<B::InnerBackend>::new(self.device.clone());
        let val_loader = DataLoaderBuilder::new(batcher_val)
            .batch_size(self.settings.batch_size)
            .build(val_dataset);

        let print_every = self.settings.print_every.max(1);
        let print_validation_every = self.settings.print_validation_every.max(1);

        let mut history = TrainingHistory::new();
        let mut best_model = self.model.clone();

        log::info!("Starting training for {} epochs", self.settings.epochs);

        for epoch in 0..self.settings.epochs {
            // Training phase
            let mut running_loss = 0.0f64;
            let mut running_accuracy = 0.0f64;
            let mut n_batches = 0usize;

            let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
            let mut state = self
                .model
                .init_state(self.settings.batch_size, &self.device);

            for (it, batch) in train_loader.iter().enumerate() {
                let batch = batch.to_device(&self.device);

                // Hidden state carries over between iterations but not
                // through the previous computation graph
                state = self.model.detach_state(state);
                let (output, next_state) = self.model.forward(&batch, state);
                state = next_state;

                let loss = loss_fn.forward(output.logits.clone(), batch.labels.clone());
                let loss_val: f64 = loss.clone().into_scalar().elem();
                let accuracy = batch_accuracy(&output.logits, &batch.labels);

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &self.model);

                let lr = self
                    .scheduler
                    .as_ref()
                    .map(|s| s.lr())
                    .unwrap_or(self.settings.learning_rate);
                self.model = self.optimizer.step(lr, self.model.clone(), grads);

                running_loss += loss_val;
                running_accuracy += accuracy;
                n_batches += 1;

                if (it + 1) % print_every == 0 {
                    log::info!(
                        "Iteration {} of epoch {} complete. Loss: {:.4}, Accuracy: {:.4}",
                        it + 1,
                        epoch + 1,
                        loss_val,
                        accuracy
                    );
                }
            }

            // The scheduler consumes the accumulated running loss, which only
            // needs to be comparable between epochs
            if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.step(running_loss);
            }

            let train_loss_mean = running_loss / n_batches as f64;
            let train_accuracy_mean = running_accuracy / n_batches as f64;

            // Validation phase
            let model_valid = self.model.valid();
            let loss_fn_valid = CrossEntropyLossConfig::new().init(&self.device);
            let mut val_state = model_valid.init_state(self.settings.batch_size, &self.device);

            let mut n_batch_validation = 0usize;
            let mut loss_validation = 0.0f64;
            let mut accuracy_validation = 0.0f64;

            for batch in val_loader.iter() {
                let batch = batch.to_device(&self.device);

                val_state = model_valid.detach_state(val_state);
                let (output, next_state) = model_valid.forward(&batch, val_state);
                val_state = next_state;

                let loss: f64 = loss_fn_valid
                    .forward(output.logits.clone(), batch.labels.clone())
                    .into_scalar()
                    .elem();

                loss_validation += loss;
                accuracy_validation += batch_accuracy(&output.logits, &batch.labels);
                n_batch_validation += 1;
            }

            let val_loss_mean = loss_validation / n_batch_validation as f64;
            let val_accuracy_mean = accuracy_validation / n_batch_validation as f64;

            if epoch % print_validation_every == 0 {
                log::info!(
                    "Validation: mean loss {:.4} || mean accuracy {:.4}",
                    val_loss_mean,
                    val_accuracy_mean
                );
            }

            let improved = val_loss_mean < history.best_val_loss;
            history.record_epoch(
                epoch,
                train_loss_mean,
                train_accuracy_mean,
                val_loss_mean,
                val_accuracy_mean,
            );
            if improved {
                best_model = self.model.clone();
            }

            if let Some(monitor) = self.early_stopping.as_mut() {
                // The monitor observes the accumulated validation loss
                match monitor.check(loss_validation, epoch) {
                    StoppingDecision::NewBest => {
                        best_model = self.model.clone();
                        if let Some(path) = self.settings.checkpoint_path.clone() {
                            Self::save_checkpoint(&self.model, &path)?;
                            log::info!("Saved checkpoint to {}", path);
                        }
                    }
                    StoppingDecision::NoImprovement { count, remaining } => {
                        log::debug!(
                            "No improvement for {} epochs, {} remaining",
                            count,
                            remaining
                        );
                    }
                    StoppingDecision::Stop => {
                        log::info!("Early stopping at epoch {}", epoch + 1);
                        break;
                    }
                }
            }
        }

        Ok((best_model, history))
    }

    fn save_checkpoint(model: &M, path: &str) -> Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(model.clone().into_record(), path.into())
            .map_err(|e| TextCatError::Config(format!("Failed to save checkpoint: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{TextDataset, TextSample};
    use crate::model::{
        CnnClassifier, CnnConfig, RnnClassifier, RnnConfig, TransformerClassifier,
        TransformerConfig,
    };
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    /// Corpus where the token identity fully determines the class
    fn synthetic_dataset(per_class: usize, n_classes: usize, seq_len: usize) -> TextDataset {
        let mut samples = Vec::new();
        for class in 0..n_classes {
            for i in 0..per_class {
                let mut tokens = vec![(class + 2) as i32; seq_len];
                // One varying position so samples within a class differ
                tokens[0] = ((i % 3) + 2 + n_classes) as i32;
                samples.push(TextSample {
                    mask: vec![true; seq_len],
                    tokens,
                    label: class,
                });
            }
        }
        TextDataset::from_samples(samples, n_classes)
    }

    fn settings(epochs: usize) -> TrainSettings {
        TrainSettings {
            epochs,
            batch_size: 4,
            learning_rate: 0.01,
            print_every: 1000,
            print_validation_every: 1000,
            checkpoint_path: None,
        }
    }

    fn assert_learned(history: &TrainingHistory, epochs: usize) {
        assert_eq!(history.len(), epochs);
        assert!(
            history.train_accuracies.iter().any(|&a| a >= 0.999),
            "never reached full training accuracy: {:?}",
            history.train_accuracies
        );
        // Validation means are per-batch averages, so they stay in [0, 1]
        // even when the final batch is smaller than the rest
        assert!(history
            .val_accuracies
            .iter()
            .all(|&a| (0.0..=1.0).contains(&a)));
        assert!(history.val_losses.iter().all(|&l| l.is_finite()));
    }

    #[test]
    fn test_rnn_learns_separable_corpus() {
        let device = Default::default();
        let config = RnnConfig {
            vocab_size: 32,
            n_classes: 2,
            embedding_dim: 8,
            hidden_dim: 16,
            n_layers: 1,
            dropout: 0.0,
        };
        let model = RnnClassifier::<TestBackend>::new(&device, config);

        let trainer = Trainer::new(model, device, settings(30));
        let (_, history) = trainer
            .fit(synthetic_dataset(6, 2, 6), synthetic_dataset(3, 2, 6))
            .unwrap();

        assert_learned(&history, 30);
    }

    #[test]
    fn test_cnn_learns_separable_corpus() {
        let device = Default::default();
        let config = CnnConfig {
            vocab_size: 32,
            n_classes: 2,
            embedding_dim: 8,
            num_filters: vec![8, 8],
            filter_sizes: vec![2, 3],
            dropout: 0.0,
        };
        let model = CnnClassifier::<TestBackend>::new(&device, config);

        let trainer = Trainer::new(model, device, settings(30));
        let (_, history) = trainer
            .fit(synthetic_dataset(6, 2, 6), synthetic_dataset(3, 2, 6))
            .unwrap();

        assert_learned(&history, 30);
    }

    #[test]
    fn test_transformer_learns_separable_corpus() {
        let device = Default::default();
        let config = TransformerConfig {
            vocab_size: 32,
            n_classes: 2,
            d_model: 16,
            n_heads: 2,
            n_layers: 1,
            d_ff: 32,
            dropout: 0.0,
            max_seq_len: 6,
        };
        let model = TransformerClassifier::<TestBackend>::new(&device, config);

        let trainer = Trainer::new(model, device, settings(40));
        let (_, history) = trainer
            .fit(synthetic_dataset(6, 2, 6), synthetic_dataset(3, 2, 6))
            .unwrap();

        assert_learned(&history, 40);
    }

    #[test]
    fn test_early_stopping_truncates_history() {
        let device = Default::default();
        let config = CnnConfig {
            vocab_size: 32,
            n_classes: 2,
            embedding_dim: 8,
            num_filters: vec![4],
            filter_sizes: vec![2],
            dropout: 0.0,
        };
        let model = CnnClassifier::<TestBackend>::new(&device, config);

        // An unreachable improvement threshold: the first epoch is the best,
        // patience runs out one epoch later
        let trainer = Trainer::new(model, device, settings(10))
            .with_early_stopping(EarlyStopping::new(1, 1e12));
        let (_, history) = trainer
            .fit(synthetic_dataset(4, 2, 6), synthetic_dataset(2, 2, 6))
            .unwrap();

        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_scheduler_is_wired_into_the_loop() {
        let device = Default::default();
        let config = CnnConfig {
            vocab_size: 32,
            n_classes: 2,
            embedding_dim: 8,
            num_filters: vec![4],
            filter_sizes: vec![2],
            dropout: 0.0,
        };
        let model = CnnClassifier::<TestBackend>::new(&device, config);

        let trainer = Trainer::new(model, device, settings(3))
            .with_scheduler(ReduceOnPlateau::new(0.01).with_patience(1));
        let (_, history) = trainer
            .fit(synthetic_dataset(4, 2, 6), synthetic_dataset(2, 2, 6))
            .unwrap();

        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_empty_validation_set_is_rejected() {
        let device = Default::default();
        let model = CnnClassifier::<TestBackend>::new(&device, CnnConfig {
            vocab_size: 32,
            n_classes: 2,
            embedding_dim: 8,
            num_filters: vec![4],
            filter_sizes: vec![2],
            dropout: 0.0,
        });

        let trainer = Trainer::new(model, device, settings(1));
        let result = trainer.fit(
            synthetic_dataset(4, 2, 6),
            TextDataset::from_samples(vec![], 2),
        );

        assert!(result.is_err());
    }
}
