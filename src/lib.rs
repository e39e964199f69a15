//! convoforge: synthetic goal-oriented dialogue dataset generator.
//!
//! This library drives a five-stage pipeline — experience generation,
//! multi-agent simulation, post-processing, dataset construction and
//! evaluation — with typed hand-off contracts, fallback recovery and
//! cross-stage statistics.

// Core modules
pub mod cli;
pub mod contract;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod stages;

// Re-export commonly used error types
pub use error::{ExportError, SchemaError, WorkerError};
pub use pipeline::{PipelineConfig, PipelineController, PipelineError};
