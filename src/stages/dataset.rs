//! Dataset construction: joins surviving verdicts back to their
//! conversations and experiences to produce exportable records.
//!
//! Only kept and modified verdicts enter the dataset; the quality score is
//! carried over from the verdict and task success from the source
//! conversation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;

use crate::error::WorkerError;
use crate::pipeline::progress::ProgressHandle;

use super::catalog;
use super::types::{Conversation, DatasetItem, DatasetItemMetadata, Experience};
use super::{unexpected_payload, Stage, StageOutput, StageRequest, StageWorker};

/// Built-in worker for the dataset-construction stage.
#[derive(Default)]
pub struct DatasetBuilder;

impl DatasetBuilder {
    /// Creates a dataset builder.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageWorker for DatasetBuilder {
    fn stage(&self) -> Stage {
        Stage::DatasetConstruction
    }

    async fn run(
        &self,
        request: StageRequest,
        progress: ProgressHandle,
    ) -> Result<StageOutput, WorkerError> {
        let StageRequest::DatasetConstruction {
            verdicts,
            conversations,
            experiences,
        } = &request
        else {
            return Err(unexpected_payload(self.stage(), &request));
        };

        let by_conversation: HashMap<&str, &Conversation> =
            conversations.iter().map(|c| (c.id.as_str(), c)).collect();
        let by_experience: HashMap<&str, &Experience> =
            experiences.iter().map(|e| (e.id.as_str(), e)).collect();
        progress.complete_phase(); // structuring conversation data

        let survivors: Vec<_> = verdicts.iter().filter(|v| v.status.survives()).collect();

        let mut sources = Vec::with_capacity(survivors.len());
        for verdict in &survivors {
            let conversation = by_conversation
                .get(verdict.original_id.as_str())
                .copied()
                .ok_or_else(|| {
                    WorkerError::Failed(format!(
                        "verdict '{}' references unknown conversation '{}'",
                        verdict.id, verdict.original_id
                    ))
                })?;
            let experience = by_experience
                .get(conversation.experience_id.as_str())
                .copied()
                .ok_or_else(|| {
                    WorkerError::Failed(format!(
                        "conversation '{}' references unknown experience '{}'",
                        conversation.id, conversation.experience_id
                    ))
                })?;
            sources.push((*verdict, conversation, experience));
        }
        progress.complete_phase(); // adding domain classifications

        progress.complete_phase(); // incorporating persona information

        let creation_timestamp = Utc::now();
        let items: Vec<DatasetItem> = sources
            .iter()
            .enumerate()
            .map(|(i, (verdict, conversation, experience))| DatasetItem {
                id: format!("dataset_{:03}", i + 1),
                conv_id: verdict.original_id.clone(),
                domain: experience.domain.clone(),
                task: experience.task.clone(),
                personas: experience.personas.clone(),
                turns: conversation.turns.clone(),
                task_success: conversation.task_success,
                metadata: DatasetItemMetadata {
                    total_turns: conversation.turns.len() as u32,
                    domain_category: catalog::domain_category(&experience.domain).to_string(),
                    creation_timestamp,
                    quality_score: verdict.score,
                },
            })
            .collect();
        progress.complete_phase(); // calculating metadata and statistics

        // The join above already proved every reference resolves; re-check
        // the produced records are internally consistent before handing off.
        for item in &items {
            if item.turns.is_empty() || item.personas.len() < 2 {
                return Err(WorkerError::Failed(format!(
                    "dataset item '{}' is structurally incomplete",
                    item.id
                )));
            }
        }
        progress.complete_phase(); // validating data integrity

        info!(
            items = items.len(),
            dropped = verdicts.len() - items.len(),
            "constructed dataset"
        );
        progress.complete_phase(); // finalizing dataset format

        Ok(StageOutput::Dataset(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::types::{
        ConversationMetadata, ConversationStatus, FilterScores, FilterStatus,
        FilteredConversation, Persona, Turn, TurnConstraints,
    };

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

    fn conversation(id: &str, experience_id: &str, task_success: bool) -> Conversation {
        Conversation {
            id: id.to_string(),
            experience_id: experience_id.to_string(),
            turns: vec![
                Turn {
                    speaker: "Alex Rodriguez".to_string(),
                    speaker_role: "patient".to_string(),
                    text: "I've had a fever for three days.".to_string(),
                    turn_id: 1,
                    timestamp: Utc::now(),
                },
                Turn {
                    speaker: "Dr. Sarah Chen".to_string(),
                    speaker_role: "doctor".to_string(),
                    text: "Let's go through your symptoms.".to_string(),
                    turn_id: 2,
                    timestamp: Utc::now(),
                },
            ],
            status: ConversationStatus::Completed,
            task_success,
            metadata: ConversationMetadata {
                total_turns: 2,
                duration_ms: 1500,
                tokens_used: 80,
            },
        }
    }

    fn verdict(id: &str, original_id: &str, status: FilterStatus, score: f64) -> FilteredConversation {
        FilteredConversation {
            id: id.to_string(),
            original_id: original_id.to_string(),
            status,
            reason: "test".to_string(),
            score,
            metadata: FilterScores {
                similarity_score: 0.2,
                fluency_score: 0.9,
                coherence_score: 0.9,
                task_success_score: 0.95,
            },
        }
    }

    fn request(verdicts: Vec<FilteredConversation>) -> StageRequest {
        StageRequest::DatasetConstruction {
            verdicts,
            conversations: vec![
                conversation("conv_001", "exp_001", true),
                conversation("conv_002", "exp_002", false),
                conversation("conv_003", "exp_003", true),
            ],
            experiences: vec![experience("exp_001"), experience("exp_002"), experience("exp_003")],
        }
    }

    #[tokio::test]
    async fn test_only_survivors_enter_dataset() {
        let builder = DatasetBuilder::new();
        let output = builder
            .run(
                request(vec![
                    verdict("filtered_001", "conv_001", FilterStatus::Kept, 0.95),
                    verdict("filtered_002", "conv_002", FilterStatus::Removed, 0.3),
                    verdict("filtered_003", "conv_003", FilterStatus::Modified, 0.81),
                ]),
                ProgressHandle::detached(Stage::DatasetConstruction),
            )
            .await
            .expect("construction should succeed");

        let StageOutput::Dataset(items) = output else {
            panic!("wrong output variant");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].conv_id, "conv_001");
        assert_eq!(items[1].conv_id, "conv_003");

        let avg_quality: f64 =
            items.iter().map(|i| i.metadata.quality_score).sum::<f64>() / items.len() as f64;
        assert!((avg_quality - (0.95 + 0.81) / 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_task_success_comes_from_conversation() {
        let builder = DatasetBuilder::new();
        let output = builder
            .run(
                request(vec![verdict(
                    "filtered_001",
                    "conv_002",
                    FilterStatus::Modified,
                    0.9,
                )]),
                ProgressHandle::detached(Stage::DatasetConstruction),
            )
            .await
            .expect("construction should succeed");

        let StageOutput::Dataset(items) = output else {
            panic!("wrong output variant");
        };
        // conv_002 did not reach its goal, regardless of its quality score.
        assert!(!items[0].task_success);
        assert_eq!(items[0].metadata.domain_category, "clinical_diagnosis");
    }

    #[tokio::test]
    async fn test_unknown_conversation_reference_fails() {
        let builder = DatasetBuilder::new();
        let result = builder
            .run(
                request(vec![verdict(
                    "filtered_001",
                    "conv_999",
                    FilterStatus::Kept,
                    0.9,
                )]),
                ProgressHandle::detached(Stage::DatasetConstruction),
            )
            .await;

        assert!(matches!(result, Err(WorkerError::Failed(_))));
    }

    #[tokio::test]
    async fn test_all_removed_yields_empty_dataset() {
        let builder = DatasetBuilder::new();
        let output = builder
            .run(
                request(vec![
                    verdict("filtered_001", "conv_001", FilterStatus::Removed, 0.2),
                    verdict("filtered_002", "conv_002", FilterStatus::Removed, 0.1),
                ]),
                ProgressHandle::detached(Stage::DatasetConstruction),
            )
            .await
            .expect("construction should succeed");

        assert_eq!(output.item_count(), 0);
    }
}
