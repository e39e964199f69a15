//! Phase-driven progress reporting for stage execution.
//!
//! Each stage declares a fixed ordered list of sub-phases. Workers call
//! [`ProgressHandle::complete_phase`] as they finish genuine sub-steps; the
//! reported percentage is `completed / total` phases and only ever
//! increases. Events are forwarded to an optional channel for display and
//! mirrored to tracing.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::stages::Stage;

/// A single progress notification for one stage sub-phase.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// Name of the phase that just completed.
    pub phase: &'static str,
    pub completed_phases: usize,
    pub total_phases: usize,
    /// Monotonically increasing percentage in 0..=100.
    pub percent: u8,
}

/// Channel end the controller hands out for progress consumption.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Worker-side handle for reporting sub-phase completions.
///
/// Cheap to clone; all clones share the same completion counter, so the
/// emitted percentage stays monotonic even when a worker fans out.
#[derive(Clone)]
pub struct ProgressHandle {
    stage: Stage,
    phases: &'static [&'static str],
    completed: Arc<AtomicUsize>,
    sender: Option<ProgressSender>,
}

impl ProgressHandle {
    /// Creates a handle for `stage`, forwarding events to `sender` if set.
    pub fn new(stage: Stage, sender: Option<ProgressSender>) -> Self {
        Self {
            stage,
            phases: stage.phases(),
            completed: Arc::new(AtomicUsize::new(0)),
            sender,
        }
    }

    /// Creates a handle that only logs, without a consumer channel.
    pub fn detached(stage: Stage) -> Self {
        Self::new(stage, None)
    }

    /// Marks the next sub-phase as completed and emits an event.
    ///
    /// Calls beyond the stage's phase count are ignored, so progress can
    /// never exceed 100%.
    pub fn complete_phase(&self) {
        let previous = self
            .completed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current < self.phases.len() {
                    Some(current + 1)
                } else {
                    None
                }
            });

        if let Ok(previous) = previous {
            self.emit(self.phases[previous], previous + 1);
        }
    }

    /// Number of phases completed so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Current percentage in 0..=100.
    pub fn percent(&self) -> u8 {
        percent(self.completed(), self.phases.len())
    }

    /// Forces the handle to 100%, emitting a final event if the worker
    /// stopped short (timeout, failure, fallback substitution).
    pub(crate) fn finish(&self) {
        let previous = self.completed.swap(self.phases.len(), Ordering::SeqCst);
        if previous < self.phases.len() {
            if let Some(last) = self.phases.last() {
                self.emit(last, self.phases.len());
            }
        }
    }

    fn emit(&self, phase: &'static str, completed: usize) {
        let event = ProgressEvent {
            stage: self.stage,
            phase,
            completed_phases: completed,
            total_phases: self.phases.len(),
            percent: percent(completed, self.phases.len()),
        };

        debug!(
            stage = %event.stage,
            phase = event.phase,
            percent = event.percent,
            "stage progress"
        );

        if let Some(sender) = &self.sender {
            // Receiver may have been dropped; progress is best-effort.
            let _ = sender.send(event);
        }
    }
}

fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed * 100) / total).min(100) as u8
}

/// Execution record for one completed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageMetrics {
    pub stage: Stage,
    /// Wall-clock duration of the stage execution.
    pub duration: Duration,
    /// Synthetic token/operation estimate for the produced batch.
    pub estimated_tokens: u64,
    pub phases_completed: usize,
    /// Whether the output is a fallback artifact.
    pub fallback_used: bool,
    /// The recorded worker failure, when fallback was applied.
    pub failure: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ProgressHandle::new(Stage::PostProcessing, Some(tx));
        let total = Stage::PostProcessing.phases().len();

        // Complete more phases than exist; extras are ignored.
        for _ in 0..total + 3 {
            handle.complete_phase();
        }

        assert_eq!(handle.completed(), total);
        assert_eq!(handle.percent(), 100);

        let mut last = 0;
        let mut events = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(event.percent >= last, "progress went backwards");
            last = event.percent;
            events += 1;
        }
        assert_eq!(events, total);
        assert_eq!(last, 100);
    }

    #[test]
    fn test_finish_jumps_to_complete() {
        let handle = ProgressHandle::detached(Stage::Simulation);
        handle.complete_phase();
        assert!(handle.percent() < 100);

        handle.finish();
        assert_eq!(handle.percent(), 100);

        // Finishing twice is a no-op.
        handle.finish();
        assert_eq!(handle.completed(), Stage::Simulation.phases().len());
    }

    #[test]
    fn test_clones_share_the_counter() {
        let handle = ProgressHandle::detached(Stage::Evaluation);
        let clone = handle.clone();

        handle.complete_phase();
        clone.complete_phase();

        assert_eq!(handle.completed(), 2);
        assert_eq!(clone.completed(), 2);
    }
}
