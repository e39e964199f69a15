//! Input/output contract validation for pipeline stages.
//!
//! Validation is side-effect free: every check either passes or produces a
//! [`SchemaError`] naming the stage and offending field. Output validation
//! additionally enforces referential integrity between a batch and the
//! input it was derived from.

use std::collections::HashSet;

use crate::error::SchemaError;
use crate::stages::{
    Conversation, DatasetItem, EvaluationMetrics, Experience, Stage, StageOutput, StageRequest,
};

/// Validates stage inputs and outputs against their contracts.
pub struct ContractValidator;

impl ContractValidator {
    /// Validates a stage input before the worker is invoked.
    ///
    /// A failure here is a caller error: the accumulated state does not
    /// satisfy the stage's input contract, and the run must stop.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` naming the stage and the missing or invalid
    /// field.
    pub fn validate_input(stage: Stage, request: &StageRequest) -> Result<(), SchemaError> {
        ensure_payload(stage, request.stage())?;

        match request {
            StageRequest::ExperienceGeneration { spec } => {
                if spec.domain.trim().is_empty() {
                    return Err(SchemaError::MissingField {
                        stage,
                        field: "domain",
                    });
                }
                if spec.task.trim().is_empty() {
                    return Err(SchemaError::MissingField { stage, field: "task" });
                }
                if spec.num_experiences == 0 {
                    return Err(SchemaError::InvalidField {
                        stage,
                        field: "num_experiences",
                        reason: "must be at least 1".to_string(),
                    });
                }
            }
            StageRequest::Simulation { experiences } => {
                if experiences.is_empty() {
                    return Err(SchemaError::EmptyCollection {
                        stage,
                        field: "experiences",
                    });
                }
                validate_experiences(stage, "experiences", experiences)?;
            }
            StageRequest::PostProcessing { conversations } => {
                if conversations.is_empty() {
                    return Err(SchemaError::EmptyCollection {
                        stage,
                        field: "conversations",
                    });
                }
                validate_conversations(stage, "conversations", conversations)?;
            }
            StageRequest::DatasetConstruction {
                verdicts,
                conversations,
                experiences,
            } => {
                if verdicts.is_empty() {
                    return Err(SchemaError::EmptyCollection {
                        stage,
                        field: "filtered_conversations",
                    });
                }
                if conversations.is_empty() {
                    return Err(SchemaError::EmptyCollection {
                        stage,
                        field: "conversations",
                    });
                }
                if experiences.is_empty() {
                    return Err(SchemaError::EmptyCollection {
                        stage,
                        field: "experiences",
                    });
                }
            }
            // An empty dataset is legal: every conversation may have been
            // removed, and evaluation reports zeroed metrics.
            StageRequest::Evaluation { .. } => {}
        }

        Ok(())
    }

    /// Validates a worker's output against the stage's output contract.
    ///
    /// A failure here is a worker contract violation; the executor treats
    /// it as a recoverable worker error, not a caller error.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` describing the shape violation or broken
    /// reference.
    pub fn validate_output(
        stage: Stage,
        request: &StageRequest,
        output: &StageOutput,
    ) -> Result<(), SchemaError> {
        ensure_payload(stage, output.stage())?;

        match (request, output) {
            (
                StageRequest::ExperienceGeneration { spec },
                StageOutput::Experiences(experiences),
            ) => {
                if experiences.len() != spec.num_experiences {
                    return Err(SchemaError::InvalidField {
                        stage,
                        field: "experiences",
                        reason: format!(
                            "expected {} experiences, got {}",
                            spec.num_experiences,
                            experiences.len()
                        ),
                    });
                }
                validate_experiences(stage, "experiences", experiences)?;
                ensure_distinct_ids(stage, "experiences", experiences.iter().map(|e| &e.id))?;
            }
            (StageRequest::Simulation { experiences }, StageOutput::Conversations(conversations)) => {
                if conversations.len() != experiences.len() {
                    return Err(SchemaError::InvalidField {
                        stage,
                        field: "conversations",
                        reason: format!(
                            "expected one conversation per experience ({}), got {}",
                            experiences.len(),
                            conversations.len()
                        ),
                    });
                }
                validate_conversations(stage, "conversations", conversations)?;
                ensure_distinct_ids(stage, "conversations", conversations.iter().map(|c| &c.id))?;

                let known: HashSet<&str> = experiences.iter().map(|e| e.id.as_str()).collect();
                let mut referenced: HashSet<&str> = HashSet::new();
                for conversation in conversations {
                    if !known.contains(conversation.experience_id.as_str()) {
                        return Err(SchemaError::BrokenReference {
                            stage,
                            reason: format!(
                                "conversation '{}' references unknown experience '{}'",
                                conversation.id, conversation.experience_id
                            ),
                        });
                    }
                    if !referenced.insert(conversation.experience_id.as_str()) {
                        return Err(SchemaError::BrokenReference {
                            stage,
                            reason: format!(
                                "experience '{}' is referenced by more than one conversation",
                                conversation.experience_id
                            ),
                        });
                    }
                }
            }
            (StageRequest::PostProcessing { conversations }, StageOutput::Verdicts(verdicts)) => {
                if verdicts.len() != conversations.len() {
                    return Err(SchemaError::InvalidField {
                        stage,
                        field: "filtered_conversations",
                        reason: format!(
                            "expected one verdict per conversation ({}), got {}",
                            conversations.len(),
                            verdicts.len()
                        ),
                    });
                }
                ensure_distinct_ids(stage, "filtered_conversations", verdicts.iter().map(|v| &v.id))?;

                let known: HashSet<&str> = conversations.iter().map(|c| c.id.as_str()).collect();
                let mut judged: HashSet<&str> = HashSet::new();
                for verdict in verdicts {
                    if !known.contains(verdict.original_id.as_str()) {
                        return Err(SchemaError::BrokenReference {
                            stage,
                            reason: format!(
                                "verdict '{}' references unknown conversation '{}'",
                                verdict.id, verdict.original_id
                            ),
                        });
                    }
                    if !judged.insert(verdict.original_id.as_str()) {
                        return Err(SchemaError::BrokenReference {
                            stage,
                            reason: format!(
                                "conversation '{}' received more than one verdict",
                                verdict.original_id
                            ),
                        });
                    }
                    ensure_unit_interval(stage, "score", verdict.score)?;
                }
            }
            (
                StageRequest::DatasetConstruction { verdicts, .. },
                StageOutput::Dataset(items),
            ) => {
                let survivors: HashSet<&str> = verdicts
                    .iter()
                    .filter(|v| v.status.survives())
                    .map(|v| v.original_id.as_str())
                    .collect();
                if items.len() != survivors.len() {
                    return Err(SchemaError::InvalidField {
                        stage,
                        field: "dataset",
                        reason: format!(
                            "expected one item per surviving verdict ({}), got {}",
                            survivors.len(),
                            items.len()
                        ),
                    });
                }
                ensure_distinct_ids(stage, "dataset", items.iter().map(|i| &i.id))?;

                let mut used: HashSet<&str> = HashSet::new();
                for item in items {
                    if !survivors.contains(item.conv_id.as_str()) {
                        return Err(SchemaError::BrokenReference {
                            stage,
                            reason: format!(
                                "dataset item '{}' references conversation '{}' without a surviving verdict",
                                item.id, item.conv_id
                            ),
                        });
                    }
                    if !used.insert(item.conv_id.as_str()) {
                        return Err(SchemaError::BrokenReference {
                            stage,
                            reason: format!(
                                "conversation '{}' appears in more than one dataset item",
                                item.conv_id
                            ),
                        });
                    }
                    ensure_unit_interval(stage, "quality_score", item.metadata.quality_score)?;
                }
            }
            (StageRequest::Evaluation { dataset }, StageOutput::Evaluation(metrics)) => {
                validate_evaluation(stage, dataset, metrics)?;
            }
            // Both sides were already matched against the stage, so a
            // cross-variant pairing cannot be reached from the executor;
            // report it as a payload mismatch for direct callers.
            (request, output) => {
                return Err(SchemaError::PayloadMismatch {
                    stage,
                    expected: request.stage().name(),
                    actual: output.stage().name(),
                });
            }
        }

        Ok(())
    }
}

fn ensure_payload(stage: Stage, actual: Stage) -> Result<(), SchemaError> {
    if stage != actual {
        return Err(SchemaError::PayloadMismatch {
            stage,
            expected: stage.name(),
            actual: actual.name(),
        });
    }
    Ok(())
}

fn ensure_unit_interval(stage: Stage, field: &'static str, value: f64) -> Result<(), SchemaError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SchemaError::InvalidField {
            stage,
            field,
            reason: format!("must be within [0.0, 1.0], got {}", value),
        });
    }
    Ok(())
}

fn ensure_distinct_ids<'a>(
    stage: Stage,
    field: &'static str,
    ids: impl Iterator<Item = &'a String>,
) -> Result<(), SchemaError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(SchemaError::InvalidField {
                stage,
                field,
                reason: "contains an element with an empty id".to_string(),
            });
        }
        if !seen.insert(id.as_str()) {
            return Err(SchemaError::InvalidField {
                stage,
                field,
                reason: format!("duplicate id '{}'", id),
            });
        }
    }
    Ok(())
}

fn validate_experiences(
    stage: Stage,
    field: &'static str,
    experiences: &[Experience],
) -> Result<(), SchemaError> {
    for (index, experience) in experiences.iter().enumerate() {
        if experience.id.trim().is_empty() {
            return Err(SchemaError::InvalidField {
                stage,
                field,
                reason: format!("experience at index {} has an empty id", index),
            });
        }
        if experience.personas.len() < 2 {
            return Err(SchemaError::InvalidField {
                stage,
                field,
                reason: format!(
                    "experience '{}' needs at least 2 personas, has {}",
                    experience.id,
                    experience.personas.len()
                ),
            });
        }
        if experience.conversation_starter.trim().is_empty() {
            return Err(SchemaError::InvalidField {
                stage,
                field,
                reason: format!("experience '{}' has an empty conversation starter", experience.id),
            });
        }
        if experience.constraints.max_turns == 0 {
            return Err(SchemaError::InvalidField {
                stage,
                field,
                reason: format!("experience '{}' allows zero turns", experience.id),
            });
        }
    }
    Ok(())
}

fn validate_conversations(
    stage: Stage,
    field: &'static str,
    conversations: &[Conversation],
) -> Result<(), SchemaError> {
    for (index, conversation) in conversations.iter().enumerate() {
        if conversation.id.trim().is_empty() {
            return Err(SchemaError::InvalidField {
                stage,
                field,
                reason: format!("conversation at index {} has an empty id", index),
            });
        }
        if conversation.experience_id.trim().is_empty() {
            return Err(SchemaError::MissingField {
                stage,
                field: "experience_id",
            });
        }
        if conversation.turns.is_empty() {
            return Err(SchemaError::EmptyCollection {
                stage,
                field: "turns",
            });
        }
    }
    Ok(())
}

fn validate_evaluation(
    stage: Stage,
    dataset: &[DatasetItem],
    metrics: &EvaluationMetrics,
) -> Result<(), SchemaError> {
    for (field, value) in [
        ("overall_score", metrics.overall_score),
        ("diversity_score", metrics.diversity_score),
        ("coherence_score", metrics.coherence_score),
        ("task_success_rate", metrics.task_success_rate),
        ("fluency_score", metrics.fluency_score),
        ("groundedness_score", metrics.groundedness_score),
    ] {
        ensure_unit_interval(stage, field, value)?;
    }

    let counted: usize = metrics.categories.domain_distribution.values().sum();
    if counted != dataset.len() {
        return Err(SchemaError::InvalidField {
            stage,
            field: "domain_distribution",
            reason: format!(
                "distribution covers {} items but the dataset has {}",
                counted,
                dataset.len()
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::types::{
        ConversationMetadata, ConversationStatus, FilterScores, FilterStatus, Persona, Turn,
        TurnConstraints,
    };
    use crate::stages::{FilteredConversation, GenerationSpec};
    use chrono::Utc;

    fn spec_request(count: usize) -> StageRequest {
        StageRequest::ExperienceGeneration {
            spec: GenerationSpec {
                domain: "healthcare".to_string(),
                task: "diagnose_fever".to_string(),
                num_experiences: count,
            },
        }
    }

    fn experience(id: &str) -> Experience {
        Experience {
            id: id.to_string(),
            domain: "healthcare".to_string(),
            task: "diagnose_fever".to_string(),
            personas: vec![
                Persona::new("Dr. Sarah Chen", "doctor"),
                Persona::new("Alex Rodriguez", "patient"),
            ],
            situation: "Fever for three days".to_string(),
            goal: "Identify likely cause".to_string(),
            conversation_starter: "I've had a fever for three days.".to_string(),
            constraints: TurnConstraints {
                max_turns: 12,
                response_style: "concise".to_string(),
            },
        }
    }

    fn conversation(id: &str, experience_id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            experience_id: experience_id.to_string(),
            turns: vec![Turn {
                speaker: "Alex Rodriguez".to_string(),
                speaker_role: "patient".to_string(),
                text: "I've had a fever for three days.".to_string(),
                turn_id: 1,
                timestamp: Utc::now(),
            }],
            status: ConversationStatus::Completed,
            task_success: true,
            metadata: ConversationMetadata {
                total_turns: 1,
                duration_ms: 1000,
                tokens_used: 40,
            },
        }
    }

    fn verdict(id: &str, original_id: &str, status: FilterStatus) -> FilteredConversation {
        FilteredConversation {
            id: id.to_string(),
            original_id: original_id.to_string(),
            status,
            reason: "test".to_string(),
            score: 0.9,
            metadata: FilterScores {
                similarity_score: 0.1,
                fluency_score: 0.9,
                coherence_score: 0.9,
                task_success_score: 0.9,
            },
        }
    }

    #[test]
    fn test_empty_domain_rejected() {
        let request = StageRequest::ExperienceGeneration {
            spec: GenerationSpec {
                domain: "  ".to_string(),
                task: "diagnose_fever".to_string(),
                num_experiences: 2,
            },
        };
        let err = ContractValidator::validate_input(Stage::ExperienceGeneration, &request)
            .expect_err("empty domain must fail");
        assert!(matches!(err, SchemaError::MissingField { field: "domain", .. }));
    }

    #[test]
    fn test_empty_experience_batch_rejected() {
        let request = StageRequest::Simulation {
            experiences: Vec::new(),
        };
        let err = ContractValidator::validate_input(Stage::Simulation, &request)
            .expect_err("empty batch must fail");
        assert!(matches!(err, SchemaError::EmptyCollection { .. }));
    }

    #[test]
    fn test_payload_mismatch_rejected() {
        let request = StageRequest::Simulation {
            experiences: vec![experience("exp_001")],
        };
        let err = ContractValidator::validate_input(Stage::PostProcessing, &request)
            .expect_err("wrong payload must fail");
        assert!(matches!(err, SchemaError::PayloadMismatch { .. }));
    }

    #[test]
    fn test_experience_count_mismatch_rejected() {
        let request = spec_request(3);
        let output = StageOutput::Experiences(vec![experience("exp_001")]);
        let err = ContractValidator::validate_output(Stage::ExperienceGeneration, &request, &output)
            .expect_err("count mismatch must fail");
        assert!(matches!(err, SchemaError::InvalidField { .. }));
    }

    #[test]
    fn test_valid_simulation_output_accepted() {
        let request = StageRequest::Simulation {
            experiences: vec![experience("exp_001"), experience("exp_002")],
        };
        let output = StageOutput::Conversations(vec![
            conversation("conv_001", "exp_001"),
            conversation("conv_002", "exp_002"),
        ]);
        ContractValidator::validate_output(Stage::Simulation, &request, &output)
            .expect("valid output should pass");
    }

    #[test]
    fn test_unknown_experience_reference_rejected() {
        let request = StageRequest::Simulation {
            experiences: vec![experience("exp_001")],
        };
        let output = StageOutput::Conversations(vec![conversation("conv_001", "exp_999")]);
        let err = ContractValidator::validate_output(Stage::Simulation, &request, &output)
            .expect_err("unknown reference must fail");
        assert!(matches!(err, SchemaError::BrokenReference { .. }));
    }

    #[test]
    fn test_duplicate_experience_reference_rejected() {
        let request = StageRequest::Simulation {
            experiences: vec![experience("exp_001"), experience("exp_002")],
        };
        let output = StageOutput::Conversations(vec![
            conversation("conv_001", "exp_001"),
            conversation("conv_002", "exp_001"),
        ]);
        let err = ContractValidator::validate_output(Stage::Simulation, &request, &output)
            .expect_err("duplicate reference must fail");
        assert!(matches!(err, SchemaError::BrokenReference { .. }));
    }

    #[test]
    fn test_verdict_must_cover_every_conversation() {
        let request = StageRequest::PostProcessing {
            conversations: vec![
                conversation("conv_001", "exp_001"),
                conversation("conv_002", "exp_002"),
            ],
        };
        let output = StageOutput::Verdicts(vec![verdict("f_001", "conv_001", FilterStatus::Kept)]);
        let err = ContractValidator::validate_output(Stage::PostProcessing, &request, &output)
            .expect_err("missing verdict must fail");
        assert!(matches!(err, SchemaError::InvalidField { .. }));
    }

    #[test]
    fn test_dataset_item_requires_surviving_verdict() {
        let request = StageRequest::DatasetConstruction {
            verdicts: vec![
                verdict("f_001", "conv_001", FilterStatus::Removed),
                verdict("f_002", "conv_002", FilterStatus::Kept),
            ],
            conversations: vec![
                conversation("conv_001", "exp_001"),
                conversation("conv_002", "exp_002"),
            ],
            experiences: vec![experience("exp_001"), experience("exp_002")],
        };

        // Item referencing the removed conversation violates the contract.
        let bad_item = DatasetItem {
            id: "dataset_001".to_string(),
            conv_id: "conv_001".to_string(),
            domain: "healthcare".to_string(),
            task: "diagnose_fever".to_string(),
            personas: vec![
                Persona::new("Dr. Sarah Chen", "doctor"),
                Persona::new("Alex Rodriguez", "patient"),
            ],
            turns: conversation("conv_001", "exp_001").turns,
            task_success: true,
            metadata: crate::stages::DatasetItemMetadata {
                total_turns: 1,
                domain_category: "clinical_diagnosis".to_string(),
                creation_timestamp: Utc::now(),
                quality_score: 0.9,
            },
        };
        let output = StageOutput::Dataset(vec![bad_item]);
        let err = ContractValidator::validate_output(Stage::DatasetConstruction, &request, &output)
            .expect_err("removed verdict must not survive");
        assert!(matches!(err, SchemaError::BrokenReference { .. }));
    }

    #[test]
    fn test_evaluation_scores_must_be_unit_interval() {
        let request = StageRequest::Evaluation { dataset: vec![] };
        let mut metrics = EvaluationMetrics::empty();
        metrics.overall_score = 1.4;
        let output = StageOutput::Evaluation(metrics);
        let err = ContractValidator::validate_output(Stage::Evaluation, &request, &output)
            .expect_err("out-of-range score must fail");
        assert!(matches!(err, SchemaError::InvalidField { .. }));
    }

    #[test]
    fn test_evaluation_distribution_must_cover_dataset() {
        let request = StageRequest::Evaluation { dataset: vec![] };
        let mut metrics = EvaluationMetrics::empty();
        metrics
            .categories
            .domain_distribution
            .insert("healthcare".to_string(), 3);
        let output = StageOutput::Evaluation(metrics);
        let err = ContractValidator::validate_output(Stage::Evaluation, &request, &output)
            .expect_err("distribution mismatch must fail");
        assert!(matches!(err, SchemaError::InvalidField { .. }));
    }
}
