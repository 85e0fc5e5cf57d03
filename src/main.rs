//! Text classification CLI
//!
//! Train recurrent, convolutional or transformer classifiers over a labelled
//! text corpus.
#![recursion_limit = "256"]

use clap::{Parser, Subcommand};
use textcat::{Config, Result};

#[derive(Parser)]
#[command(name = "textcat")]
#[command(about = "Text classification using deep learning", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Train a classifier
    Train {
        /// Model architecture: rnn, cnn or transformer
        #[arg(long, default_value = "rnn")]
        model: String,
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Override learning rate
        #[arg(long)]
        lr: Option<f64>,
        /// Override batch size
        #[arg(long)]
        batch_size: Option<usize>,
        /// Train on the GPU (wgpu backend) instead of the CPU
        #[arg(long)]
        gpu: bool,
        /// Disable early stopping
        #[arg(long)]
        no_early_stopping: bool,
        /// Reduce the learning rate when the training loss plateaus
        #[arg(long)]
        scheduler: bool,
        /// Override early stopping patience (epochs)
        #[arg(long)]
        patience: Option<usize>,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Show corpus statistics
    Stats,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Stats => commands::data_stats(&config),
        },
        Commands::Train {
            model,
            epochs,
            lr,
            batch_size,
            gpu,
            no_early_stopping,
            scheduler,
            patience,
        } => commands::train(
            &config,
            &model,
            epochs,
            lr,
            batch_size,
            gpu,
            no_early_stopping,
            scheduler,
            patience,
        ),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use burn::backend::{Autodiff, NdArray, Wgpu};
    use burn::module::{AutodiffModule, Module};
    use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
    use burn::tensor::backend::AutodiffBackend;
    use textcat::data::{TextDataset, Vocabulary};
    use textcat::model::{
        CnnClassifier, CnnConfig, ModelKind, RnnClassifier, RnnConfig, SequenceClassifier,
        TransformerClassifier, TransformerConfig,
    };
    use textcat::training::{report, EarlyStopping, ReduceOnPlateau, TrainSettings, Trainer};
    use textcat::TextCatError;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all("model")?;
        println!("Created data/ and model/ directories");

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Put JSON-lines corpora at data/train.jsonl and data/validation.jsonl");
        println!("     (one {{\"text\": \"...\", \"label\": 0}} object per line)");
        println!("  3. Run 'textcat train --model rnn' to train a classifier");

        Ok(())
    }

    pub fn data_stats(config: &Config) -> Result<()> {
        println!("Corpus Status");
        println!("───────────────────────────────");

        for (name, path) in [
            ("Training", &config.data.train_path),
            ("Validation", &config.data.validation_path),
        ] {
            match TextDataset::load_records(path) {
                Ok(records) => {
                    let mut counts = vec![0usize; config.model.n_classes];
                    let mut out_of_range = 0usize;
                    for record in &records {
                        match counts.get_mut(record.label) {
                            Some(count) => *count += 1,
                            None => out_of_range += 1,
                        }
                    }

                    println!("  {} ({}): {} samples", name, path, records.len());
                    for (label, count) in counts.iter().enumerate() {
                        println!("    class {}: {}", label, count);
                    }
                    if out_of_range > 0 {
                        println!("    out of range: {}", out_of_range);
                    }
                }
                Err(e) => println!("  {} ({}): {}", name, path, e),
            }
        }

        Ok(())
    }

    pub fn train(
        config: &Config,
        model: &str,
        epochs: Option<usize>,
        lr: Option<f64>,
        batch_size: Option<usize>,
        gpu: bool,
        no_early_stopping: bool,
        scheduler: bool,
        patience: Option<usize>,
    ) -> Result<()> {
        // Resolve the architecture before touching any data or weights
        let kind: ModelKind = model.parse()?;

        println!("Initializing {} training...", kind);

        // Build the vocabulary from the training corpus only
        let records = TextDataset::load_records(&config.data.train_path)?;
        let vocab = Vocabulary::build(
            records.iter().map(|r| r.text.as_str()),
            config.model.max_vocab,
        );
        log::info!("Vocabulary: {} tokens", vocab.len());

        let train_dataset = TextDataset::from_jsonl(
            &config.data.train_path,
            &vocab,
            config.model.max_seq_len,
            config.model.n_classes,
        )?;
        let val_dataset = TextDataset::from_jsonl(
            &config.data.validation_path,
            &vocab,
            config.model.max_seq_len,
            config.model.n_classes,
        )?;

        println!("  {} training samples", train_dataset.len());
        println!("  {} validation samples", val_dataset.len());

        if train_dataset.is_empty() || val_dataset.is_empty() {
            return Err(TextCatError::Config(
                "Not enough data for training. Check the corpus paths in the config.".to_string(),
            ));
        }

        // Persist the vocabulary next to the model
        if let Some(parent) = std::path::Path::new(&config.data.model_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        vocab.save(&format!("{}.vocab.json", config.data.model_path))?;

        let settings = TrainSettings {
            epochs: epochs.unwrap_or(config.training.epochs),
            batch_size: batch_size.unwrap_or(config.training.batch_size),
            learning_rate: lr.unwrap_or(config.training.learning_rate),
            print_every: config.training.print_every,
            print_validation_every: config.training.print_validation_every,
            checkpoint_path: Some(config.data.model_path.clone()),
        };

        let early_stopping = if no_early_stopping {
            None
        } else {
            let patience = patience.unwrap_or(config.training.early_stopping_patience);
            Some(EarlyStopping::new(patience, 0.0))
        };

        println!("  epochs: {}", settings.epochs);
        println!("  batch size: {}", settings.batch_size);
        println!("  learning rate: {}", settings.learning_rate);
        println!();

        if gpu {
            type GpuBackend = Autodiff<Wgpu<f32, i32>>;
            let device = burn::backend::wgpu::WgpuDevice::default();
            run_training::<GpuBackend>(
                kind,
                config,
                vocab.len(),
                settings,
                scheduler,
                early_stopping,
                train_dataset,
                val_dataset,
                device,
            )
        } else {
            type CpuBackend = Autodiff<NdArray<f32>>;
            run_training::<CpuBackend>(
                kind,
                config,
                vocab.len(),
                settings,
                scheduler,
                early_stopping,
                train_dataset,
                val_dataset,
                Default::default(),
            )
        }
    }

    fn run_training<B>(
        kind: ModelKind,
        config: &Config,
        vocab_size: usize,
        settings: TrainSettings,
        scheduler: bool,
        early_stopping: Option<EarlyStopping>,
        train_dataset: TextDataset,
        val_dataset: TextDataset,
        device: B::Device,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let model_cfg = &config.model;

        match kind {
            ModelKind::Recurrent => {
                let model = RnnClassifier::<B>::new(
                    &device,
                    RnnConfig {
                        vocab_size,
                        n_classes: model_cfg.n_classes,
                        embedding_dim: model_cfg.embedding_dim,
                        hidden_dim: model_cfg.hidden_dim,
                        n_layers: model_cfg.n_layers,
                        dropout: model_cfg.dropout,
                    },
                );
                fit_and_report(
                    model,
                    device,
                    &config.data.model_path,
                    settings,
                    scheduler,
                    early_stopping,
                    train_dataset,
                    val_dataset,
                )
            }
            ModelKind::Convolutional => {
                let model = CnnClassifier::<B>::new(
                    &device,
                    CnnConfig {
                        vocab_size,
                        n_classes: model_cfg.n_classes,
                        embedding_dim: model_cfg.embedding_dim,
                        num_filters: model_cfg.num_filters.clone(),
                        filter_sizes: model_cfg.filter_sizes.clone(),
                        dropout: model_cfg.dropout,
                    },
                );
                fit_and_report(
                    model,
                    device,
                    &config.data.model_path,
                    settings,
                    scheduler,
                    early_stopping,
                    train_dataset,
                    val_dataset,
                )
            }
            ModelKind::Transformer => {
                let model = TransformerClassifier::<B>::new(
                    &device,
                    TransformerConfig {
                        vocab_size,
                        n_classes: model_cfg.n_classes,
                        d_model: model_cfg.d_model,
                        n_heads: model_cfg.n_heads,
                        n_layers: model_cfg.n_encoder_layers,
                        d_ff: model_cfg.d_ff,
                        dropout: model_cfg.dropout,
                        max_seq_len: model_cfg.max_seq_len,
                    },
                );
                fit_and_report(
                    model,
                    device,
                    &config.data.model_path,
                    settings,
                    scheduler,
                    early_stopping,
                    train_dataset,
                    val_dataset,
                )
            }
        }
    }

    fn fit_and_report<B, M>(
        model: M,
        device: B::Device,
        model_path: &str,
        settings: TrainSettings,
        scheduler: bool,
        early_stopping: Option<EarlyStopping>,
        train_dataset: TextDataset,
        val_dataset: TextDataset,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        M: SequenceClassifier<B> + AutodiffModule<B>,
        M::InnerModule: SequenceClassifier<B::InnerBackend>,
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let learning_rate = settings.learning_rate;
        let mut trainer = Trainer::new(model, device, settings);
        if scheduler {
            trainer = trainer.with_scheduler(ReduceOnPlateau::new(learning_rate));
        }
        if let Some(monitor) = early_stopping {
            trainer = trainer.with_early_stopping(monitor);
        }

        let (best_model, history) = trainer.fit(train_dataset, val_dataset)?;

        // Persist the best snapshot
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(best_model.into_record(), model_path.into())
            .map_err(|e| TextCatError::Config(format!("Failed to save model: {}", e)))?;
        log::info!("Saved model to {}", model_path);

        println!("{}", report::render(&history));
        println!();
        println!("Training complete!");
        println!("  Best epoch:    {}", history.best_epoch + 1);
        println!("  Best val loss: {:.4}", history.best_val_loss);
        println!(
            "  Final accuracy: {:.1}%",
            history.val_accuracies.last().unwrap_or(&0.0) * 100.0
        );

        Ok(())
    }
}
