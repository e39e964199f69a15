//! Accumulated pipeline state.
//!
//! `PipelineState` is owned exclusively by the controller and mutated only
//! through stage-completion transitions. Stage outputs become readable only
//! once their producing stage has completed; before that the typed
//! accessors return `None`.

use serde::{Deserialize, Serialize};

use crate::stages::{
    Conversation, DatasetItem, EvaluationMetrics, Experience, FilteredConversation,
    GenerationSpec, Stage, StageOutput, StageRequest,
};

/// Run status of the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The ordered collection of all stage outputs plus the execution cursor.
///
/// A freshly constructed state and a reset state are equal; tests rely on
/// this equivalence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub(crate) status: RunStatus,
    /// Index of the next stage to execute; strictly increasing within a
    /// run, never exceeding [`Stage::COUNT`].
    pub(crate) cursor: usize,
    pub(crate) experiences: Vec<Experience>,
    pub(crate) conversations: Vec<Conversation>,
    pub(crate) verdicts: Vec<FilteredConversation>,
    pub(crate) dataset: Vec<DatasetItem>,
    pub(crate) evaluation: Option<EvaluationMetrics>,
}

impl PipelineState {
    /// Current run status.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Index of the next stage to execute (equals [`Stage::COUNT`] once
    /// completed).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the given stage has completed and merged its output.
    pub fn is_stage_complete(&self, stage: Stage) -> bool {
        stage.index() < self.cursor
    }

    /// Generated experiences, once experience generation has completed.
    pub fn experiences(&self) -> Option<&[Experience]> {
        self.is_stage_complete(Stage::ExperienceGeneration)
            .then_some(self.experiences.as_slice())
    }

    /// Simulated conversations, once simulation has completed.
    pub fn conversations(&self) -> Option<&[Conversation]> {
        self.is_stage_complete(Stage::Simulation)
            .then_some(self.conversations.as_slice())
    }

    /// Filter verdicts, once post-processing has completed.
    pub fn verdicts(&self) -> Option<&[FilteredConversation]> {
        self.is_stage_complete(Stage::PostProcessing)
            .then_some(self.verdicts.as_slice())
    }

    /// Dataset items, once dataset construction has completed.
    pub fn dataset(&self) -> Option<&[DatasetItem]> {
        self.is_stage_complete(Stage::DatasetConstruction)
            .then_some(self.dataset.as_slice())
    }

    /// The evaluation report, once evaluation has completed.
    pub fn evaluation(&self) -> Option<&EvaluationMetrics> {
        if self.is_stage_complete(Stage::Evaluation) {
            self.evaluation.as_ref()
        } else {
            None
        }
    }

    /// Builds the typed request for `stage` from the accumulated state.
    pub(crate) fn request_for(&self, stage: Stage, spec: &GenerationSpec) -> StageRequest {
        match stage {
            Stage::ExperienceGeneration => StageRequest::ExperienceGeneration { spec: spec.clone() },
            Stage::Simulation => StageRequest::Simulation {
                experiences: self.experiences.clone(),
            },
            Stage::PostProcessing => StageRequest::PostProcessing {
                conversations: self.conversations.clone(),
            },
            Stage::DatasetConstruction => StageRequest::DatasetConstruction {
                verdicts: self.verdicts.clone(),
                conversations: self.conversations.clone(),
                experiences: self.experiences.clone(),
            },
            Stage::Evaluation => StageRequest::Evaluation {
                dataset: self.dataset.clone(),
            },
        }
    }

    /// Merges a validated stage output into the state.
    pub(crate) fn merge(&mut self, output: StageOutput) {
        match output {
            StageOutput::Experiences(experiences) => self.experiences = experiences,
            StageOutput::Conversations(conversations) => self.conversations = conversations,
            StageOutput::Verdicts(verdicts) => self.verdicts = verdicts,
            StageOutput::Dataset(dataset) => self.dataset = dataset,
            StageOutput::Evaluation(metrics) => self.evaluation = Some(metrics),
        }
    }
}
