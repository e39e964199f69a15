//! Writes the finalized dataset as JSON and JSONL with a manifest.
//!
//! Layout under the output directory:
//!
//! - `dataset.json` — pretty-printed array of items
//! - `dataset.jsonl` — one item per line, for streaming consumers
//! - `manifest.json` — counts, domains and quality statistics

use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ExportError;
use crate::pipeline::aggregator::{Aggregator, DatasetSummary};
use crate::stages::DatasetItem;

/// Manifest format version written alongside the dataset.
const FORMAT_VERSION: &str = "1.0";

/// Paths and counts of a completed export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub items_written: usize,
    pub json_path: PathBuf,
    pub jsonl_path: PathBuf,
    pub manifest_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    format_version: &'static str,
    generated_at: chrono::DateTime<Utc>,
    #[serde(flatten)]
    summary: &'a DatasetSummary,
    domains: Vec<&'a str>,
}

/// Exports dataset items to a directory.
pub struct DatasetExporter {
    output_dir: PathBuf,
}

impl DatasetExporter {
    /// Creates an exporter writing under `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Writes the dataset files and manifest.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::NoItems` for an empty dataset, or the
    /// underlying IO/serialization error.
    pub fn export(&self, items: &[DatasetItem]) -> Result<ExportReport, ExportError> {
        if items.is_empty() {
            return Err(ExportError::NoItems);
        }

        fs::create_dir_all(&self.output_dir)?;

        let json_path = self.output_dir.join("dataset.json");
        write_json(&json_path, &items)?;

        let jsonl_path = self.output_dir.join("dataset.jsonl");
        write_jsonl(&jsonl_path, items)?;

        let summary = Aggregator::dataset_summary(items);
        let mut domains: Vec<&str> = items.iter().map(|i| i.domain.as_str()).collect();
        domains.sort_unstable();
        domains.dedup();

        let manifest_path = self.output_dir.join("manifest.json");
        write_json(
            &manifest_path,
            &Manifest {
                format_version: FORMAT_VERSION,
                generated_at: Utc::now(),
                summary: &summary,
                domains,
            },
        )?;

        info!(
            items = items.len(),
            path = %self.output_dir.display(),
            "exported dataset"
        );

        Ok(ExportReport {
            items_written: items.len(),
            json_path,
            jsonl_path,
            manifest_path,
        })
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ExportError> {
    let rendered = serde_json::to_string_pretty(value)?;
    fs::write(path, rendered)?;
    Ok(())
}

fn write_jsonl(path: &Path, items: &[DatasetItem]) -> Result<(), ExportError> {
    let mut file = fs::File::create(path)?;
    for item in items {
        let line = serde_json::to_string(item)?;
        writeln!(file, "{}", line)?;
    }
    Ok(())
}
