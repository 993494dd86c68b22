//! The Continuous Embedding Pipeline (§4.8, C8) and Bulk Embedding Generator
//! (§4.9, C9): the two offline vector-maintenance jobs that keep
//! `description_embedding` up to date across the corpus.

pub mod bulk;
pub mod continuous;

pub use bulk::{BulkEmbeddingGenerator, Checkpoint, RunReport};
pub use continuous::{classify_priority, ContinuousEmbeddingPipeline, CycleReport, EmbeddingPriority};
