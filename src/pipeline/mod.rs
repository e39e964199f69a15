//! Pipeline orchestration for synthetic dialogue generation.
//!
//! This module provides the orchestration core that sequences the five
//! pipeline stages, enforces their typed hand-off contracts, tracks
//! progress, applies the failure-fallback policy, and aggregates
//! cross-stage statistics.
//!
//! # Architecture
//!
//! - **Controller**: owns the stage order, the execution cursor and the
//!   accumulated [`state::PipelineState`]
//! - **Executor**: runs one stage worker under a timeout, validates both
//!   sides of the hand-off, substitutes fallback artifacts
//! - **Aggregator**: pure summaries derived from the accumulated state
//! - **Config**: configuration for a pipeline run
//! - **Progress**: phase-driven progress events and per-stage metrics
//!
//! # Pipeline Flow
//!
//! 1. The controller selects the stage at the cursor
//! 2. The executor validates the stage input against its contract
//! 3. The stage worker runs under a bounded timeout
//! 4. The output is validated (a violation counts as a worker failure)
//! 5. On worker failure a fallback artifact is substituted and the failure
//!    recorded; the run continues
//! 6. The controller merges the output, advances the cursor and refreshes
//!    the summary
//!
//! Only one stage executes at a time; stage *k+1* never begins before
//! stage *k*'s output has been validated and merged.
//!
//! # Example
//!
//! ```rust,ignore
//! use convoforge::pipeline::{PipelineConfig, PipelineController};
//!
//! let config = PipelineConfig::new()
//!     .with_domain("healthcare")
//!     .with_task("diagnose_fever")
//!     .with_num_experiences(4)
//!     .with_seed(7);
//!
//! let mut controller = PipelineController::new(config)?;
//! let report = controller.run_to_completion().await?;
//!
//! println!("status: {}", report.state.status());
//! if let Some(dataset) = report.summary.dataset {
//!     println!("items: {}", dataset.total_items);
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod controller;
pub mod executor;
pub mod progress;
pub mod state;

// Re-export main types for convenience
pub use aggregator::{Aggregator, DatasetSummary, FilterSummary, PipelineSummary};
pub use config::{ConfigError, PipelineConfig};
pub use controller::{
    PipelineController, PipelineError, PipelineReport, StageAdvance, StageTicket,
};
pub use executor::{StageExecutor, StageOutcome};
pub use progress::{ProgressEvent, ProgressHandle, ProgressSender, StageMetrics};
pub use state::{PipelineState, RunStatus};
