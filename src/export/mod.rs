//! Dataset export to the filesystem.

pub mod dataset;

pub use dataset::{DatasetExporter, ExportReport};
