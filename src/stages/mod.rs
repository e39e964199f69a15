//! Stage definitions for the dialogue generation pipeline.
//!
//! The pipeline runs five stages in a fixed total order:
//!
//! 1. **Experience generation** — blueprint experiences from a domain/task
//!    catalog
//! 2. **Multi-agent simulation** — one dialogue per experience
//! 3. **Post-processing** — quality verdicts (kept/modified/removed)
//! 4. **Dataset construction** — surviving dialogues become dataset items
//! 5. **Evaluation** — aggregate quality metrics over the dataset
//!
//! Each stage is served by a [`StageWorker`]. Workers receive a typed
//! [`StageRequest`] built from the accumulated pipeline state and return a
//! typed [`StageOutput`]; both sides are checked by the contract validator
//! before the result is merged into pipeline state.

pub mod catalog;
pub mod dataset;
pub mod evaluation;
pub mod experience;
pub mod fallback;
pub mod postprocess;
pub mod simulation;
pub mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::WorkerError;
use crate::pipeline::progress::ProgressHandle;

pub use types::{
    Conversation, ConversationLength, ConversationMetadata, ConversationStatus, DatasetItem,
    DatasetItemMetadata, EvaluationCategories, EvaluationMetrics, Experience, FilterScores,
    FilterStatus, FilteredConversation, Persona, Turn, TurnConstraints,
};

/// One named step of the five-part pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExperienceGeneration,
    Simulation,
    PostProcessing,
    DatasetConstruction,
    Evaluation,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::ExperienceGeneration,
        Stage::Simulation,
        Stage::PostProcessing,
        Stage::DatasetConstruction,
        Stage::Evaluation,
    ];

    /// Number of stages in the pipeline.
    pub const COUNT: usize = Self::ALL.len();

    /// Zero-based position of this stage in the execution order.
    pub fn index(self) -> usize {
        match self {
            Stage::ExperienceGeneration => 0,
            Stage::Simulation => 1,
            Stage::PostProcessing => 2,
            Stage::DatasetConstruction => 3,
            Stage::Evaluation => 4,
        }
    }

    /// Looks up a stage by its position in the execution order.
    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    /// The stage that runs after this one, if any.
    pub fn next(self) -> Option<Stage> {
        Self::from_index(self.index() + 1)
    }

    /// Stable snake_case identifier.
    pub fn name(self) -> &'static str {
        match self {
            Stage::ExperienceGeneration => "experience_generation",
            Stage::Simulation => "simulation",
            Stage::PostProcessing => "post_processing",
            Stage::DatasetConstruction => "dataset_construction",
            Stage::Evaluation => "evaluation",
        }
    }

    /// Human-readable title.
    pub fn title(self) -> &'static str {
        match self {
            Stage::ExperienceGeneration => "Experience Generation",
            Stage::Simulation => "Multi-Agent Simulation",
            Stage::PostProcessing => "Post-Processing",
            Stage::DatasetConstruction => "Dataset Construction",
            Stage::Evaluation => "Evaluation",
        }
    }

    /// Ordered sub-phases a worker walks through while executing this stage.
    ///
    /// Progress is reported as completed phases over this list; the phase
    /// names are stable and surface in progress events and logs.
    pub fn phases(self) -> &'static [&'static str] {
        match self {
            Stage::ExperienceGeneration => &[
                "analyzing domain and task requirements",
                "generating diverse personas",
                "creating realistic situations",
                "defining clear objectives",
                "crafting conversation starters",
                "applying constraints and guidelines",
                "finalizing experience blueprints",
            ],
            Stage::Simulation => &[
                "initializing agents",
                "setting up conversation context",
                "generating first responses",
                "processing agent interactions",
                "monitoring goal progress",
                "completing conversations",
            ],
            Stage::PostProcessing => &[
                "duplicate detection",
                "quality threshold",
                "coherence check",
                "task success verification",
            ],
            Stage::DatasetConstruction => &[
                "structuring conversation data",
                "adding domain classifications",
                "incorporating persona information",
                "calculating metadata and statistics",
                "validating data integrity",
                "finalizing dataset format",
            ],
            Stage::Evaluation => &[
                "analyzing lexical diversity",
                "evaluating conversation coherence",
                "assessing task success rates",
                "measuring fluency and naturalness",
                "checking groundedness in personas",
                "computing domain distribution",
                "generating final evaluation report",
            ],
        }
    }

    /// Read-only description of the stage's purpose, shapes and options.
    pub fn descriptor(self) -> StageDescriptor {
        match self {
            Stage::ExperienceGeneration => StageDescriptor {
                stage: self,
                purpose: "Create structured blueprints with personas, situations, and goals",
                input_shape: "{ domain, task, num_experiences }",
                output_shape: "{ experiences: [Experience] }",
                options: &["domain", "task", "num_experiences", "seed"],
            },
            Stage::Simulation => StageDescriptor {
                stage: self,
                purpose: "Generate natural dialogues through goal-oriented agent interactions",
                input_shape: "{ experiences: [Experience] }",
                output_shape: "{ conversations: [Conversation] }",
                options: &["simulation_concurrency", "seed"],
            },
            Stage::PostProcessing => StageDescriptor {
                stage: self,
                purpose: "Filter, deduplicate, and ensure quality of generated dialogues",
                input_shape: "{ conversations: [Conversation] }",
                output_shape: "{ filtered_conversations: [FilteredConversation] }",
                options: &["keep_threshold", "modify_threshold"],
            },
            Stage::DatasetConstruction => StageDescriptor {
                stage: self,
                purpose: "Compile high-quality dialogues into a structured dataset",
                input_shape: "{ filtered_conversations, conversations, experiences }",
                output_shape: "{ dataset: [DatasetItem] }",
                options: &[],
            },
            Stage::Evaluation => StageDescriptor {
                stage: self,
                purpose: "Assess quality, diversity, and downstream task performance",
                input_shape: "{ dataset: [DatasetItem] }",
                output_shape: "{ metrics: EvaluationMetrics }",
                options: &[],
            },
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Read-only introspection record for one stage.
///
/// Used for documentation and discovery (the `stages` CLI command), never
/// for behavior.
#[derive(Debug, Clone, Serialize)]
pub struct StageDescriptor {
    pub stage: Stage,
    pub purpose: &'static str,
    pub input_shape: &'static str,
    pub output_shape: &'static str,
    pub options: &'static [&'static str],
}

/// Request parameters for the experience-generation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSpec {
    pub domain: String,
    pub task: String,
    pub num_experiences: usize,
}

/// Typed input handed to a stage worker, built from the accumulated
/// pipeline state.
#[derive(Debug, Clone)]
pub enum StageRequest {
    ExperienceGeneration {
        spec: GenerationSpec,
    },
    Simulation {
        experiences: Vec<Experience>,
    },
    PostProcessing {
        conversations: Vec<Conversation>,
    },
    DatasetConstruction {
        verdicts: Vec<FilteredConversation>,
        conversations: Vec<Conversation>,
        experiences: Vec<Experience>,
    },
    Evaluation {
        dataset: Vec<DatasetItem>,
    },
}

impl StageRequest {
    /// The stage this request targets.
    pub fn stage(&self) -> Stage {
        match self {
            StageRequest::ExperienceGeneration { .. } => Stage::ExperienceGeneration,
            StageRequest::Simulation { .. } => Stage::Simulation,
            StageRequest::PostProcessing { .. } => Stage::PostProcessing,
            StageRequest::DatasetConstruction { .. } => Stage::DatasetConstruction,
            StageRequest::Evaluation { .. } => Stage::Evaluation,
        }
    }
}

/// Typed artifact batch produced by a stage worker.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Experiences(Vec<Experience>),
    Conversations(Vec<Conversation>),
    Verdicts(Vec<FilteredConversation>),
    Dataset(Vec<DatasetItem>),
    Evaluation(EvaluationMetrics),
}

impl StageOutput {
    /// The stage that produces this output shape.
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Experiences(_) => Stage::ExperienceGeneration,
            StageOutput::Conversations(_) => Stage::Simulation,
            StageOutput::Verdicts(_) => Stage::PostProcessing,
            StageOutput::Dataset(_) => Stage::DatasetConstruction,
            StageOutput::Evaluation(_) => Stage::Evaluation,
        }
    }

    /// Number of artifacts in the batch (1 for the evaluation report).
    pub fn item_count(&self) -> usize {
        match self {
            StageOutput::Experiences(items) => items.len(),
            StageOutput::Conversations(items) => items.len(),
            StageOutput::Verdicts(items) => items.len(),
            StageOutput::Dataset(items) => items.len(),
            StageOutput::Evaluation(_) => 1,
        }
    }

    /// Synthetic token/operation estimate for resource bookkeeping.
    ///
    /// Conversations carry their own token counts; other artifacts are
    /// approximated from text volume at four characters per token.
    pub fn estimated_tokens(&self) -> u64 {
        fn text_tokens(chars: usize) -> u64 {
            (chars / 4) as u64
        }

        match self {
            StageOutput::Experiences(items) => items
                .iter()
                .map(|e| {
                    text_tokens(
                        e.situation.len() + e.goal.len() + e.conversation_starter.len(),
                    )
                })
                .sum(),
            StageOutput::Conversations(items) => {
                items.iter().map(|c| c.metadata.tokens_used).sum()
            }
            StageOutput::Verdicts(items) => {
                items.iter().map(|v| text_tokens(v.reason.len())).sum()
            }
            StageOutput::Dataset(items) => items
                .iter()
                .map(|i| text_tokens(i.turns.iter().map(|t| t.text.len()).sum()))
                .sum(),
            StageOutput::Evaluation(_) => 1,
        }
    }
}

/// Performs the actual transformation for one stage.
///
/// Workers are invoked by the stage executor under a bounded timeout. A
/// worker reports sub-phase completions through the [`ProgressHandle`] and
/// returns either a typed output batch or a [`WorkerError`]; the executor
/// recovers from worker errors with a fallback artifact.
#[async_trait]
pub trait StageWorker: Send + Sync {
    /// The stage this worker serves.
    fn stage(&self) -> Stage;

    /// Runs the stage transformation.
    async fn run(
        &self,
        request: StageRequest,
        progress: ProgressHandle,
    ) -> Result<StageOutput, WorkerError>;
}

/// Returned by a worker handed a request variant for a different stage.
///
/// The executor validates the request before dispatch, so hitting this is a
/// wiring bug; workers surface it as a plain failure instead of panicking.
pub(crate) fn unexpected_payload(stage: Stage, request: &StageRequest) -> WorkerError {
    WorkerError::Failed(format!(
        "worker for stage '{}' received a '{}' request",
        stage,
        request.stage()
    ))
}

/// One worker per stage, dispatched by the executor.
#[derive(Clone)]
pub struct WorkerRegistry {
    workers: [Arc<dyn StageWorker>; Stage::COUNT],
}

impl WorkerRegistry {
    /// Builds the registry of built-in deterministic workers.
    ///
    /// `seed` drives every seeded generator so identical configurations
    /// reproduce identical pipelines.
    pub fn builtin(config: &crate::pipeline::config::PipelineConfig) -> Self {
        Self {
            workers: [
                Arc::new(experience::ExperienceWriter::new(config.seed)),
                Arc::new(simulation::DialogueSimulator::new(
                    config.seed,
                    config.simulation_concurrency,
                )),
                Arc::new(postprocess::QualityReviewer::new(
                    config.keep_threshold,
                    config.modify_threshold,
                )),
                Arc::new(dataset::DatasetBuilder::new()),
                Arc::new(evaluation::DatasetEvaluator::new()),
            ],
        }
    }

    /// Replaces the worker for one stage (used to inject test doubles and
    /// alternative implementations).
    pub fn with_worker(mut self, stage: Stage, worker: Arc<dyn StageWorker>) -> Self {
        self.workers[stage.index()] = worker;
        self
    }

    /// The worker registered for `stage`.
    pub fn worker(&self, stage: Stage) -> &Arc<dyn StageWorker> {
        &self.workers[stage.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_total() {
        for (index, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), index);
            assert_eq!(Stage::from_index(index), Some(*stage));
        }
        assert_eq!(Stage::from_index(Stage::COUNT), None);
        assert_eq!(Stage::Evaluation.next(), None);
        assert_eq!(Stage::ExperienceGeneration.next(), Some(Stage::Simulation));
    }

    #[test]
    fn test_stage_display_snake_case() {
        assert_eq!(format!("{}", Stage::ExperienceGeneration), "experience_generation");
        assert_eq!(format!("{}", Stage::DatasetConstruction), "dataset_construction");
    }

    #[test]
    fn test_every_stage_has_phases_and_descriptor() {
        for stage in Stage::ALL {
            assert!(!stage.phases().is_empty(), "{stage} has no phases");
            let descriptor = stage.descriptor();
            assert_eq!(descriptor.stage, stage);
            assert!(!descriptor.purpose.is_empty());
        }
    }

    #[test]
    fn test_request_and_output_stage_mapping() {
        let request = StageRequest::Simulation {
            experiences: Vec::new(),
        };
        assert_eq!(request.stage(), Stage::Simulation);

        let output = StageOutput::Evaluation(EvaluationMetrics::empty());
        assert_eq!(output.stage(), Stage::Evaluation);
        assert_eq!(output.item_count(), 1);
    }
}
