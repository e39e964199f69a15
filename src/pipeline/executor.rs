//! Stage executor: runs exactly one stage to completion or fallback.
//!
//! The executor validates the input slice, invokes the stage worker under a
//! bounded timeout, validates the returned output, and on any worker
//! failure (timeout, error, contract violation) substitutes a fallback
//! artifact so the pipeline can proceed. Only input-side schema errors
//! propagate to the caller.

use std::time::Instant;

use tracing::{debug, warn};

use crate::contract::ContractValidator;
use crate::error::{SchemaError, WorkerError};
use crate::stages::fallback::FallbackSource;
use crate::stages::{GenerationSpec, Stage, StageOutput, WorkerRegistry};

use super::config::PipelineConfig;
use super::progress::{ProgressHandle, ProgressSender, StageMetrics};
use super::state::PipelineState;

/// Result of one stage execution: the (possibly fallback) output and its
/// execution record.
#[derive(Debug)]
pub struct StageOutcome {
    pub output: StageOutput,
    pub metrics: StageMetrics,
}

/// Runs individual stages against the accumulated pipeline state.
pub struct StageExecutor {
    registry: WorkerRegistry,
    fallback: FallbackSource,
    spec: GenerationSpec,
    timeout: std::time::Duration,
    progress_sender: Option<ProgressSender>,
}

impl StageExecutor {
    /// Creates an executor for the given worker registry and configuration.
    pub fn new(registry: WorkerRegistry, config: &PipelineConfig) -> Self {
        Self {
            registry,
            fallback: FallbackSource::new(),
            spec: config.generation_spec(),
            timeout: config.stage_timeout,
            progress_sender: None,
        }
    }

    /// Forwards progress events to the given channel.
    pub fn with_progress_sender(mut self, sender: ProgressSender) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    /// Executes one stage.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` only when the *input* slice of the pipeline
    /// state violates the stage's input contract; worker failures are
    /// recovered via fallback and recorded in the returned metrics.
    pub async fn execute(
        &self,
        stage: Stage,
        state: &PipelineState,
    ) -> Result<StageOutcome, SchemaError> {
        let request = state.request_for(stage, &self.spec);
        ContractValidator::validate_input(stage, &request)?;

        let handle = ProgressHandle::new(stage, self.progress_sender.clone());
        let worker = self.registry.worker(stage);
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.timeout,
            worker.run(request.clone(), handle.clone()),
        )
        .await
        {
            Ok(Ok(output)) => match ContractValidator::validate_output(stage, &request, &output) {
                Ok(()) => Ok(output),
                Err(violation) => Err(WorkerError::ContractViolation(violation)),
            },
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Err(WorkerError::Timeout(self.timeout)),
        };

        let (output, failure) = match result {
            Ok(output) => {
                debug!(stage = %stage, items = output.item_count(), "stage worker succeeded");
                (output, None)
            }
            Err(err) => {
                warn!(
                    stage = %stage,
                    error = %err,
                    "stage worker failed; substituting fallback artifact"
                );
                (self.fallback.artifact(stage, &request), Some(err.to_string()))
            }
        };

        handle.finish();

        let metrics = StageMetrics {
            stage,
            duration: started.elapsed(),
            estimated_tokens: output.estimated_tokens(),
            phases_completed: handle.completed(),
            fallback_used: failure.is_some(),
            failure,
        };

        Ok(StageOutcome { output, metrics })
    }
}
