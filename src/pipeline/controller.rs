//! Pipeline controller: owns the ordered stage list, the execution cursor
//! and the accumulated state.
//!
//! The controller is a small state machine (`Idle → Running(k) →
//! Running(k+1) | Completed | Failed`). A stage's output is merged only
//! through a [`StageTicket`] carrying the epoch at which the stage was
//! started; `reset()` bumps the epoch, so results from calls that outlive a
//! reset are silently discarded instead of corrupting fresh state.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::SchemaError;
use crate::stages::{Stage, WorkerRegistry};

use super::aggregator::{Aggregator, PipelineSummary};
use super::config::{ConfigError, PipelineConfig};
use super::executor::{StageExecutor, StageOutcome};
use super::progress::{ProgressSender, StageMetrics};
use super::state::{PipelineState, RunStatus};

/// Errors surfaced by controller operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An operation was requested in a state that forbids it. Rejected
    /// synchronously; no state is mutated.
    #[error("invalid operation in state '{state}': {reason}")]
    InvalidState { state: RunStatus, reason: String },

    /// A stage input violated its contract; the run has failed.
    #[error("schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Identifies one in-flight stage execution.
///
/// Tickets are issued when a stage starts and must be presented to merge
/// its result; a ticket from before the last `reset()` no longer matches
/// the controller's epoch and its result is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTicket {
    stage: Stage,
    epoch: u64,
}

impl StageTicket {
    /// The stage this ticket was issued for.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The pipeline epoch at issue time.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Outcome of merging a stage result into the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAdvance {
    /// Output merged; the given stage is now active.
    Advanced(Stage),
    /// Output merged; all stages have completed.
    Completed,
    /// The result belonged to a stale epoch and was dropped.
    Discarded,
}

/// Snapshot of a finished (or failed) run for display and export.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub state: PipelineState,
    pub metrics: Vec<StageMetrics>,
    pub summary: PipelineSummary,
}

/// Drives the five pipeline stages in order.
pub struct PipelineController {
    executor: StageExecutor,
    state: PipelineState,
    metrics: Vec<StageMetrics>,
    summary: PipelineSummary,
    epoch: u64,
    run_id: Uuid,
}

impl PipelineController {
    /// Creates a controller with the built-in workers.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if the configuration is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let registry = WorkerRegistry::builtin(&config);
        Self::with_workers(config, registry)
    }

    /// Creates a controller with a custom worker registry.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if the configuration is invalid.
    pub fn with_workers(
        config: PipelineConfig,
        registry: WorkerRegistry,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let state = PipelineState::default();
        let summary = Aggregator::summarize(&state);

        Ok(Self {
            executor: StageExecutor::new(registry, &config),
            state,
            metrics: Vec::new(),
            summary,
            epoch: 0,
            run_id: Uuid::new_v4(),
        })
    }

    /// Forwards stage progress events to the given channel.
    pub fn with_progress_sender(mut self, sender: ProgressSender) -> Self {
        self.executor = self.executor.with_progress_sender(sender);
        self
    }

    /// Starts a run: transitions `Idle → Running` with the cursor at the
    /// first stage. No stage is executed yet.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` unless the controller is idle.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        if self.state.status != RunStatus::Idle {
            return Err(PipelineError::InvalidState {
                state: self.state.status,
                reason: "run() requires an idle pipeline; call reset() first".to_string(),
            });
        }

        self.state.status = RunStatus::Running;
        info!(run_id = %self.run_id, "pipeline run started");
        Ok(())
    }

    /// The stage the cursor points at while running.
    pub fn current_stage(&self) -> Option<Stage> {
        if self.state.status == RunStatus::Running {
            Stage::from_index(self.state.cursor)
        } else {
            None
        }
    }

    /// Issues a ticket for the currently active stage.
    ///
    /// Callers that drive stage execution themselves pass the ticket back
    /// to [`PipelineController::apply`] together with the executor outcome.
    pub fn ticket(&self) -> Option<StageTicket> {
        self.current_stage().map(|stage| StageTicket {
            stage,
            epoch: self.epoch,
        })
    }

    /// Executes the currently active stage and merges its result.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` when no stage is active, or
    /// `PipelineError::Schema` when the stage input is invalid — in that
    /// case the pipeline transitions to `Failed`.
    pub async fn execute_current(&mut self) -> Result<StageAdvance, PipelineError> {
        let ticket = self.ticket().ok_or_else(|| PipelineError::InvalidState {
            state: self.state.status,
            reason: "no stage is active; call run() first".to_string(),
        })?;

        let outcome = match self.executor.execute(ticket.stage, &self.state).await {
            Ok(outcome) => outcome,
            Err(schema) => {
                self.state.status = RunStatus::Failed;
                error!(
                    stage = %ticket.stage,
                    error = %schema,
                    "pipeline failed: stage input violated its contract"
                );
                return Err(schema.into());
            }
        };

        self.apply(ticket, outcome)
    }

    /// Merges a stage outcome produced under `ticket`.
    ///
    /// A ticket from a stale epoch is discarded without touching state —
    /// that is the normal fate of a call that outlived a `reset()`, so it
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` if the pipeline is not running
    /// or the ticket does not match the cursor (out-of-order merge).
    pub fn apply(
        &mut self,
        ticket: StageTicket,
        outcome: StageOutcome,
    ) -> Result<StageAdvance, PipelineError> {
        if ticket.epoch != self.epoch {
            debug!(
                stage = %ticket.stage,
                ticket_epoch = ticket.epoch,
                current_epoch = self.epoch,
                "discarding stage result from a stale epoch"
            );
            return Ok(StageAdvance::Discarded);
        }

        if self.state.status != RunStatus::Running {
            return Err(PipelineError::InvalidState {
                state: self.state.status,
                reason: "cannot merge a stage result while the pipeline is not running"
                    .to_string(),
            });
        }

        if ticket.stage.index() != self.state.cursor {
            return Err(PipelineError::InvalidState {
                state: self.state.status,
                reason: format!(
                    "stage '{}' does not match the cursor (expected '{}')",
                    ticket.stage,
                    Stage::from_index(self.state.cursor).map_or("<done>", Stage::name),
                ),
            });
        }

        info!(
            stage = %ticket.stage,
            items = outcome.output.item_count(),
            fallback = outcome.metrics.fallback_used,
            duration_ms = outcome.metrics.duration.as_millis() as u64,
            "stage completed"
        );

        self.state.merge(outcome.output);
        self.metrics.push(outcome.metrics);
        self.state.cursor += 1;
        self.summary = Aggregator::summarize(&self.state);

        if self.state.cursor == Stage::COUNT {
            self.state.status = RunStatus::Completed;
            info!(run_id = %self.run_id, "pipeline run completed");
            Ok(StageAdvance::Completed)
        } else {
            // Cursor strictly increases; from_index is always Some here.
            match Stage::from_index(self.state.cursor) {
                Some(next) => Ok(StageAdvance::Advanced(next)),
                None => Ok(StageAdvance::Completed),
            }
        }
    }

    /// Starts a run and drives every stage to completion.
    ///
    /// # Errors
    ///
    /// Returns the first `PipelineError` encountered; worker failures do
    /// not error (they are recovered via fallback and recorded in metrics).
    pub async fn run_to_completion(&mut self) -> Result<PipelineReport, PipelineError> {
        self.run()?;

        loop {
            match self.execute_current().await? {
                StageAdvance::Advanced(_) => continue,
                StageAdvance::Completed | StageAdvance::Discarded => break,
            }
        }

        Ok(self.report())
    }

    /// Clears all pipeline state and returns to `Idle`.
    ///
    /// Permitted from any state. Bumps the epoch so results of in-flight
    /// stage calls from before the reset are discarded when they arrive.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.state = PipelineState::default();
        self.metrics.clear();
        self.summary = Aggregator::summarize(&self.state);
        debug!(run_id = %self.run_id, epoch = self.epoch, "pipeline reset");
    }

    /// Read access to the accumulated state.
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Current run status.
    pub fn status(&self) -> RunStatus {
        self.state.status
    }

    /// Metrics for every stage completed so far, in execution order.
    pub fn metrics(&self) -> &[StageMetrics] {
        &self.metrics
    }

    /// Number of recorded worker failures for `stage` in this run.
    pub fn failure_count(&self, stage: Stage) -> usize {
        self.metrics
            .iter()
            .filter(|m| m.stage == stage && m.failure.is_some())
            .count()
    }

    /// Latest cross-stage summary.
    pub fn summary(&self) -> &PipelineSummary {
        &self.summary
    }

    /// Unique id of this controller instance's run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Snapshot of the current run for display and export.
    pub fn report(&self) -> PipelineReport {
        PipelineReport {
            run_id: self.run_id,
            state: self.state.clone(),
            metrics: self.metrics.clone(),
            summary: self.summary.clone(),
        }
    }
}
