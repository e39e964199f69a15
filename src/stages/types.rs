//! Artifact types produced and consumed by the pipeline stages.
//!
//! Each stage hands a typed batch to its successor: experiences seed
//! conversations, conversations receive filter verdicts, surviving verdicts
//! become dataset items, and the dataset is scored into evaluation metrics.
//! All types serialize with snake_case field names on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named participant profile used to seed one side of a dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Display name, e.g. "Dr. Sarah Chen".
    pub name: String,
    /// Conversational role, e.g. "doctor" or "customer".
    pub role: String,
    /// Short trait descriptors shaping the persona's register.
    pub traits: Vec<String>,
    /// One-line biography grounding the persona.
    pub background: String,
}

impl Persona {
    /// Creates a persona with empty traits and background.
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            traits: Vec::new(),
            background: String::new(),
        }
    }

    /// Sets the trait descriptors.
    pub fn with_traits(mut self, traits: &[&str]) -> Self {
        self.traits = traits.iter().map(|t| (*t).to_string()).collect();
        self
    }

    /// Sets the background line.
    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }
}

/// Turn-count and style constraints attached to an experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnConstraints {
    /// Upper bound on the number of turns in the simulated dialogue.
    pub max_turns: u32,
    /// Free-form style instruction, e.g. "concise and clear".
    pub response_style: String,
}

/// A generation blueprint: personas, situation, goal and conversation seed.
///
/// Produced by the experience-generation stage and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub id: String,
    pub domain: String,
    pub task: String,
    /// At least two personas; by convention index 0 leads (doctor, agent,
    /// tutor) and index 1 responds (patient, customer, student).
    pub personas: Vec<Persona>,
    pub situation: String,
    pub goal: String,
    /// Opening line spoken by the responding persona.
    pub conversation_starter: String,
    pub constraints: TurnConstraints,
}

impl Experience {
    /// The persona that leads the dialogue, if present.
    pub fn lead(&self) -> Option<&Persona> {
        self.personas.first()
    }

    /// The persona that opens the dialogue, if present.
    pub fn respondent(&self) -> Option<&Persona> {
        self.personas.get(1)
    }
}

/// One utterance in a conversation, attributed to a speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: String,
    pub speaker_role: String,
    pub text: String,
    /// 1-based ordinal position within the conversation.
    pub turn_id: u32,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle status of a simulated conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Turns are still being produced.
    Generating,
    /// The dialogue ran to a natural close.
    Completed,
    /// Generation aborted before the dialogue closed.
    Failed,
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::Generating => write!(f, "generating"),
            ConversationStatus::Completed => write!(f, "completed"),
            ConversationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Resource bookkeeping attached to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub total_turns: u32,
    pub duration_ms: u64,
    pub tokens_used: u64,
}

/// A simulated multi-turn dialogue tied to one experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub experience_id: String,
    pub turns: Vec<Turn>,
    pub status: ConversationStatus,
    /// Whether the dialogue reached the experience's goal.
    pub task_success: bool,
    pub metadata: ConversationMetadata,
}

impl Conversation {
    /// Total number of turns.
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Whitespace-separated word count across all turns.
    pub fn word_count(&self) -> usize {
        self.turns
            .iter()
            .map(|t| t.text.split_whitespace().count())
            .sum()
    }
}

/// Verdict assigned to a conversation by the post-processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStatus {
    /// Passed all filters unchanged.
    Kept,
    /// Retained after minor repair; still enters the dataset.
    Modified,
    /// Failed quality checks; excluded from the dataset.
    Removed,
}

impl FilterStatus {
    /// Whether a conversation with this verdict enters the dataset.
    pub fn survives(self) -> bool {
        matches!(self, FilterStatus::Kept | FilterStatus::Modified)
    }
}

impl std::fmt::Display for FilterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterStatus::Kept => write!(f, "kept"),
            FilterStatus::Modified => write!(f, "modified"),
            FilterStatus::Removed => write!(f, "removed"),
        }
    }
}

/// Per-dimension quality sub-scores backing a filter verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterScores {
    /// Highest pairwise similarity to any other conversation in the batch.
    pub similarity_score: f64,
    pub fluency_score: f64,
    pub coherence_score: f64,
    pub task_success_score: f64,
}

/// A quality verdict on one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredConversation {
    pub id: String,
    /// Id of the conversation this verdict applies to.
    pub original_id: String,
    pub status: FilterStatus,
    /// Human-readable justification for the verdict.
    pub reason: String,
    /// Weighted composite quality score in [0, 1].
    pub score: f64,
    pub metadata: FilterScores,
}

/// Metadata block attached to a finalized dataset item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItemMetadata {
    pub total_turns: u32,
    /// Coarse category the item's domain belongs to.
    pub domain_category: String,
    pub creation_timestamp: DateTime<Utc>,
    /// Composite quality score carried over from the filter verdict.
    pub quality_score: f64,
}

/// A finalized, exportable dialogue record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub id: String,
    /// Id of the source conversation (whose verdict survived filtering).
    pub conv_id: String,
    pub domain: String,
    pub task: String,
    pub personas: Vec<Persona>,
    pub turns: Vec<Turn>,
    pub task_success: bool,
    pub metadata: DatasetItemMetadata,
}

/// Mean and standard deviation of conversation lengths, in turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationLength {
    pub avg_turns: f64,
    pub std_dev: f64,
}

/// Distribution-level breakdowns backing the headline evaluation scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCategories {
    /// Windowed type/token lexical diversity statistic (MTLD-style).
    pub lexical_diversity: f64,
    pub conversation_length: ConversationLength,
    /// Item counts per domain.
    pub domain_distribution: HashMap<String, usize>,
    /// Task-success rate per domain.
    pub task_success_by_domain: HashMap<String, f64>,
}

/// Aggregate quality report over the finalized dataset.
///
/// All headline scores are in [0, 1]. An empty dataset yields the zeroed
/// report from [`EvaluationMetrics::empty`] rather than NaN rates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub overall_score: f64,
    pub diversity_score: f64,
    pub coherence_score: f64,
    pub task_success_rate: f64,
    pub fluency_score: f64,
    pub groundedness_score: f64,
    pub categories: EvaluationCategories,
}

impl EvaluationMetrics {
    /// The all-zero report used for an empty dataset.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_status_survives() {
        assert!(FilterStatus::Kept.survives());
        assert!(FilterStatus::Modified.survives());
        assert!(!FilterStatus::Removed.survives());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", ConversationStatus::Generating), "generating");
        assert_eq!(format!("{}", ConversationStatus::Completed), "completed");
        assert_eq!(format!("{}", FilterStatus::Kept), "kept");
        assert_eq!(format!("{}", FilterStatus::Modified), "modified");
        assert_eq!(format!("{}", FilterStatus::Removed), "removed");
    }

    #[test]
    fn test_persona_builder() {
        let persona = Persona::new("Dr. Sarah Chen", "doctor")
            .with_traits(&["calm", "analytical"])
            .with_background("Family physician");

        assert_eq!(persona.name, "Dr. Sarah Chen");
        assert_eq!(persona.traits, vec!["calm", "analytical"]);
        assert_eq!(persona.background, "Family physician");
    }

    #[test]
    fn test_snake_case_wire_format() {
        let status = serde_json::to_string(&FilterStatus::Kept).expect("serialize");
        assert_eq!(status, "\"kept\"");

        let status = serde_json::to_string(&ConversationStatus::Failed).expect("serialize");
        assert_eq!(status, "\"failed\"");
    }

    #[test]
    fn test_conversation_word_count() {
        let conversation = Conversation {
            id: "conv_001".to_string(),
            experience_id: "exp_001".to_string(),
            turns: vec![
                Turn {
                    speaker: "Alex".to_string(),
                    speaker_role: "patient".to_string(),
                    text: "I have a fever".to_string(),
                    turn_id: 1,
                    timestamp: Utc::now(),
                },
                Turn {
                    speaker: "Dr. Chen".to_string(),
                    speaker_role: "doctor".to_string(),
                    text: "How long has it lasted?".to_string(),
                    turn_id: 2,
                    timestamp: Utc::now(),
                },
            ],
            status: ConversationStatus::Completed,
            task_success: true,
            metadata: ConversationMetadata {
                total_turns: 2,
                duration_ms: 1500,
                tokens_used: 20,
            },
        };

        assert_eq!(conversation.turn_count(), 2);
        assert_eq!(conversation.word_count(), 9);
    }
}
