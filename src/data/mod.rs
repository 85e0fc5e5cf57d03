//! Corpus loading, vocabulary and batching

pub mod dataset;
pub mod vocab;

pub use dataset::{TextBatch, TextBatcher, TextDataset, TextRecord, TextSample};
pub use vocab::Vocabulary;
