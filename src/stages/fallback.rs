//! Fallback artifacts substituted when a stage worker fails.
//!
//! Availability over strictness: a worker failure never blocks the
//! pipeline. The substitute artifact is deterministic, sized consistently
//! with the request, and shaped to satisfy the stage's output contract so
//! downstream stages can proceed on filler data.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;

use super::catalog;
use super::types::{
    Conversation, ConversationLength, ConversationMetadata, ConversationStatus, DatasetItem,
    DatasetItemMetadata, EvaluationCategories, EvaluationMetrics, Experience, FilterScores,
    FilterStatus, FilteredConversation, Persona, Turn, TurnConstraints,
};
use super::{Stage, StageOutput, StageRequest};

/// Composite score assigned to fallback filter verdicts.
const FALLBACK_VERDICT_SCORE: f64 = 0.75;

/// Deterministic source of per-stage fallback artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSource;

impl FallbackSource {
    /// Creates a fallback source.
    pub fn new() -> Self {
        Self
    }

    /// Builds the substitute artifact for `stage`, sized to `request`.
    pub fn artifact(&self, stage: Stage, request: &StageRequest) -> StageOutput {
        let output = match request {
            StageRequest::ExperienceGeneration { spec } => {
                StageOutput::Experiences(fallback_experiences(spec.num_experiences))
            }
            StageRequest::Simulation { experiences } => {
                StageOutput::Conversations(fallback_conversations(experiences))
            }
            StageRequest::PostProcessing { conversations } => {
                StageOutput::Verdicts(fallback_verdicts(conversations))
            }
            StageRequest::DatasetConstruction {
                verdicts,
                conversations,
                experiences,
            } => StageOutput::Dataset(fallback_dataset(verdicts, conversations, experiences)),
            StageRequest::Evaluation { dataset } => {
                StageOutput::Evaluation(fallback_evaluation(dataset))
            }
        };
        debug_assert_eq!(output.stage(), stage);
        output
    }
}

/// Two canned experiences (a clinical visit and a refund call), cycled to
/// the requested count.
fn fallback_experiences(count: usize) -> Vec<Experience> {
    let fixtures = [
        Experience {
            id: String::new(),
            domain: "healthcare".to_string(),
            task: "diagnose_fever".to_string(),
            personas: vec![
                Persona::new("Dr. Sarah Chen", "doctor")
                    .with_traits(&["calm", "analytical", "empathetic"])
                    .with_background("Experienced family physician with 15 years of practice"),
                Persona::new("Alex Rodriguez", "patient")
                    .with_traits(&["worried", "cooperative", "detailed"])
                    .with_background("Software engineer experiencing fever symptoms"),
            ],
            situation: "Patient reports fever and cough symptoms for 3 days".to_string(),
            goal: "Doctor identifies likely cause and recommends appropriate tests or treatment"
                .to_string(),
            conversation_starter:
                "I've had a fever for three days and it's not improving. I also have a persistent cough."
                    .to_string(),
            constraints: TurnConstraints {
                max_turns: 12,
                response_style: "concise and clear".to_string(),
            },
        },
        Experience {
            id: String::new(),
            domain: "customer_support".to_string(),
            task: "refund_request".to_string(),
            personas: vec![
                Persona::new("Jennifer Walsh", "customer_service_agent")
                    .with_traits(&["patient", "solution-oriented", "professional"])
                    .with_background(
                        "Senior customer service representative with expertise in returns",
                    ),
                Persona::new("Michael Thompson", "customer")
                    .with_traits(&["frustrated", "determined", "polite"])
                    .with_background("Recent online shopper seeking refund for defective product"),
            ],
            situation: "Customer received a defective electronic device and wants a refund"
                .to_string(),
            goal: "Agent processes refund and maintains customer satisfaction".to_string(),
            conversation_starter:
                "I received my order yesterday, but the device isn't working properly. I'd like to return it for a refund."
                    .to_string(),
            constraints: TurnConstraints {
                max_turns: 10,
                response_style: "helpful and efficient".to_string(),
            },
        },
    ];

    (0..count)
        .map(|i| {
            let mut experience = fixtures[i % fixtures.len()].clone();
            experience.id = format!("fallback_exp_{:03}", i + 1);
            experience
        })
        .collect()
}

/// One short scripted conversation per input experience.
fn fallback_conversations(experiences: &[Experience]) -> Vec<Conversation> {
    let base_time = Utc::now();

    experiences
        .iter()
        .enumerate()
        .map(|(i, experience)| {
            let placeholder_lead = Persona::new("Assistant", "assistant");
            let placeholder_respondent = Persona::new("Participant", "participant");
            let lead = experience.lead().unwrap_or(&placeholder_lead);
            let respondent = experience.respondent().unwrap_or(&placeholder_respondent);
            let task = experience.task.replace('_', " ");

            let script = [
                (respondent, experience.conversation_starter.clone()),
                (
                    lead,
                    format!(
                        "I understand your concern. Let me help you with your {}. Can you provide more details?",
                        task
                    ),
                ),
                (
                    respondent,
                    "Thank you for helping. I've been dealing with this for a few days now."
                        .to_string(),
                ),
                (
                    lead,
                    format!(
                        "Based on what you've described, here is my recommendation: {}.",
                        experience.goal
                    ),
                ),
            ];

            let turns: Vec<Turn> = script
                .into_iter()
                .enumerate()
                .map(|(t, (persona, text))| Turn {
                    speaker: persona.name.clone(),
                    speaker_role: persona.role.clone(),
                    text,
                    turn_id: t as u32 + 1,
                    timestamp: base_time + ChronoDuration::seconds(30 * t as i64),
                })
                .collect();

            Conversation {
                id: format!("fallback_conv_{:03}", i + 1),
                experience_id: experience.id.clone(),
                status: ConversationStatus::Completed,
                task_success: true,
                metadata: ConversationMetadata {
                    total_turns: turns.len() as u32,
                    duration_ms: 3000,
                    tokens_used: 180,
                },
                turns,
            }
        })
        .collect()
}

/// Keeps every conversation with a neutral mid-band score.
fn fallback_verdicts(conversations: &[Conversation]) -> Vec<FilteredConversation> {
    conversations
        .iter()
        .enumerate()
        .map(|(i, conversation)| FilteredConversation {
            id: format!("fallback_filtered_{:03}", i + 1),
            original_id: conversation.id.clone(),
            status: FilterStatus::Kept,
            reason: "Fallback verdict: conversation retained without review".to_string(),
            score: FALLBACK_VERDICT_SCORE,
            metadata: FilterScores {
                similarity_score: 0.2,
                fluency_score: 0.8,
                coherence_score: 0.85,
                task_success_score: 0.8,
            },
        })
        .collect()
}

/// Joins surviving verdicts against whatever sources resolve; unresolvable
/// references fall back to a minimal placeholder record.
fn fallback_dataset(
    verdicts: &[FilteredConversation],
    conversations: &[Conversation],
    experiences: &[Experience],
) -> Vec<DatasetItem> {
    let by_conversation: HashMap<&str, &Conversation> =
        conversations.iter().map(|c| (c.id.as_str(), c)).collect();
    let by_experience: HashMap<&str, &Experience> =
        experiences.iter().map(|e| (e.id.as_str(), e)).collect();
    let creation_timestamp = Utc::now();

    verdicts
        .iter()
        .filter(|v| v.status.survives())
        .enumerate()
        .map(|(i, verdict)| {
            let conversation = by_conversation.get(verdict.original_id.as_str()).copied();
            let experience = conversation
                .and_then(|c| by_experience.get(c.experience_id.as_str()))
                .copied();

            let turns = conversation.map(|c| c.turns.clone()).unwrap_or_else(|| {
                vec![Turn {
                    speaker: "Participant".to_string(),
                    speaker_role: "participant".to_string(),
                    text: "Conversation content unavailable.".to_string(),
                    turn_id: 1,
                    timestamp: creation_timestamp,
                }]
            });
            let personas = experience.map(|e| e.personas.clone()).unwrap_or_else(|| {
                vec![
                    Persona::new("Assistant", "assistant"),
                    Persona::new("Participant", "participant"),
                ]
            });
            let domain = experience
                .map(|e| e.domain.clone())
                .unwrap_or_else(|| "general".to_string());

            DatasetItem {
                id: format!("fallback_dataset_{:03}", i + 1),
                conv_id: verdict.original_id.clone(),
                task: experience
                    .map(|e| e.task.clone())
                    .unwrap_or_else(|| "dialogue".to_string()),
                personas,
                task_success: conversation.map(|c| c.task_success).unwrap_or(false),
                metadata: DatasetItemMetadata {
                    total_turns: turns.len() as u32,
                    domain_category: catalog::domain_category(&domain).to_string(),
                    creation_timestamp,
                    quality_score: verdict.score,
                },
                domain,
                turns,
            }
        })
        .collect()
}

/// Neutral mid-band headline scores over honestly computed distributions.
fn fallback_evaluation(dataset: &[DatasetItem]) -> EvaluationMetrics {
    if dataset.is_empty() {
        return EvaluationMetrics::empty();
    }

    let mut domain_distribution: HashMap<String, usize> = HashMap::new();
    let mut success_by_domain: HashMap<String, (usize, usize)> = HashMap::new();
    for item in dataset {
        *domain_distribution.entry(item.domain.clone()).or_insert(0) += 1;
        let entry = success_by_domain.entry(item.domain.clone()).or_insert((0, 0));
        entry.1 += 1;
        if item.task_success {
            entry.0 += 1;
        }
    }
    let task_success_by_domain = success_by_domain
        .into_iter()
        .map(|(domain, (successes, total))| {
            (domain, successes as f64 / total.max(1) as f64)
        })
        .collect();

    let avg_turns =
        dataset.iter().map(|i| i.turns.len()).sum::<usize>() as f64 / dataset.len() as f64;

    EvaluationMetrics {
        overall_score: 0.5,
        diversity_score: 0.5,
        coherence_score: 0.5,
        task_success_rate: dataset.iter().filter(|i| i.task_success).count() as f64
            / dataset.len() as f64,
        fluency_score: 0.5,
        groundedness_score: 0.5,
        categories: EvaluationCategories {
            lexical_diversity: 0.0,
            conversation_length: ConversationLength {
                avg_turns,
                std_dev: 0.0,
            },
            domain_distribution,
            task_success_by_domain,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractValidator;
    use crate::stages::GenerationSpec;

    fn generation_request(count: usize) -> StageRequest {
        StageRequest::ExperienceGeneration {
            spec: GenerationSpec {
                domain: "healthcare".to_string(),
                task: "diagnose_fever".to_string(),
                num_experiences: count,
            },
        }
    }

    #[test]
    fn test_experiences_sized_to_request() {
        let source = FallbackSource::new();
        let output = source.artifact(Stage::ExperienceGeneration, &generation_request(5));

        let StageOutput::Experiences(experiences) = &output else {
            panic!("wrong output variant");
        };
        assert_eq!(experiences.len(), 5);
        // Fixtures cycle, ids stay distinct.
        assert_eq!(experiences[0].domain, experiences[2].domain);
        assert_ne!(experiences[0].id, experiences[2].id);
    }

    #[test]
    fn test_fallback_artifacts_satisfy_output_contract() {
        let source = FallbackSource::new();

        let request = generation_request(3);
        let experiences_output = source.artifact(Stage::ExperienceGeneration, &request);
        ContractValidator::validate_output(Stage::ExperienceGeneration, &request, &experiences_output)
            .expect("fallback experiences must pass the contract");

        let StageOutput::Experiences(experiences) = experiences_output else {
            panic!("wrong output variant");
        };
        let request = StageRequest::Simulation {
            experiences: experiences.clone(),
        };
        let conversations_output = source.artifact(Stage::Simulation, &request);
        ContractValidator::validate_output(Stage::Simulation, &request, &conversations_output)
            .expect("fallback conversations must pass the contract");

        let StageOutput::Conversations(conversations) = conversations_output else {
            panic!("wrong output variant");
        };
        let request = StageRequest::PostProcessing {
            conversations: conversations.clone(),
        };
        let verdicts_output = source.artifact(Stage::PostProcessing, &request);
        ContractValidator::validate_output(Stage::PostProcessing, &request, &verdicts_output)
            .expect("fallback verdicts must pass the contract");

        let StageOutput::Verdicts(verdicts) = verdicts_output else {
            panic!("wrong output variant");
        };
        let request = StageRequest::DatasetConstruction {
            verdicts,
            conversations,
            experiences,
        };
        let dataset_output = source.artifact(Stage::DatasetConstruction, &request);
        ContractValidator::validate_output(Stage::DatasetConstruction, &request, &dataset_output)
            .expect("fallback dataset must pass the contract");

        let StageOutput::Dataset(dataset) = dataset_output else {
            panic!("wrong output variant");
        };
        let request = StageRequest::Evaluation { dataset };
        let evaluation_output = source.artifact(Stage::Evaluation, &request);
        ContractValidator::validate_output(Stage::Evaluation, &request, &evaluation_output)
            .expect("fallback evaluation must pass the contract");
    }
}
