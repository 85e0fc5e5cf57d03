//! Model training
//!
//! Shared training/validation loop, metrics, early stopping, learning-rate
//! scheduling and the end-of-run report.

pub mod early_stopping;
pub mod metrics;
pub mod report;
pub mod scheduler;
pub mod trainer;

pub use early_stopping::{EarlyStopping, StoppingDecision};
pub use metrics::TrainingHistory;
pub use scheduler::ReduceOnPlateau;
pub use trainer::{TrainSettings, Trainer};
