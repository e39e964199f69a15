//! Post-processing: quality verdicts over a conversation batch.
//!
//! Every conversation receives exactly one verdict. Sub-scores are computed
//! deterministically from conversation features, so identical batches always
//! produce identical verdicts.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::info;

use crate::error::WorkerError;
use crate::pipeline::progress::ProgressHandle;

use super::types::{
    Conversation, ConversationStatus, FilterScores, FilterStatus, FilteredConversation,
};
use super::{unexpected_payload, Stage, StageOutput, StageRequest, StageWorker};

/// Weight of the dissimilarity component in the composite score.
const SIMILARITY_WEIGHT: f64 = 0.15;

/// Weight of the fluency component in the composite score.
const FLUENCY_WEIGHT: f64 = 0.3;

/// Weight of the coherence component in the composite score.
const COHERENCE_WEIGHT: f64 = 0.3;

/// Weight of the task-success component in the composite score.
const TASK_SUCCESS_WEIGHT: f64 = 0.25;

/// Average words per turn below which fluency degrades.
const FLUENCY_FLOOR_WORDS: f64 = 6.0;

/// Average words per turn above which fluency degrades.
const FLUENCY_CEILING_WORDS: f64 = 40.0;

/// Built-in worker for the post-processing stage.
pub struct QualityReviewer {
    keep_threshold: f64,
    modify_threshold: f64,
}

impl QualityReviewer {
    /// Creates a reviewer with the given keep/modify thresholds.
    pub fn new(keep_threshold: f64, modify_threshold: f64) -> Self {
        Self {
            keep_threshold,
            modify_threshold,
        }
    }

    fn verdict(&self, score: f64) -> (FilterStatus, &'static str) {
        if score >= self.keep_threshold {
            (
                FilterStatus::Kept,
                "High quality conversation with successful task completion",
            )
        } else if score >= self.modify_threshold {
            (
                FilterStatus::Modified,
                "Requires minor modifications for better coherence",
            )
        } else {
            (FilterStatus::Removed, "Does not meet quality thresholds")
        }
    }
}

#[async_trait]
impl StageWorker for QualityReviewer {
    fn stage(&self) -> Stage {
        Stage::PostProcessing
    }

    async fn run(
        &self,
        request: StageRequest,
        progress: ProgressHandle,
    ) -> Result<StageOutput, WorkerError> {
        let StageRequest::PostProcessing { conversations } = &request else {
            return Err(unexpected_payload(self.stage(), &request));
        };

        let similarity: Vec<f64> = conversations
            .iter()
            .map(|c| max_similarity(c, conversations))
            .collect();
        progress.complete_phase(); // duplicate detection

        let fluency: Vec<f64> = conversations.iter().map(fluency_score).collect();
        progress.complete_phase(); // quality threshold

        let coherence: Vec<f64> = conversations.iter().map(coherence_score).collect();
        progress.complete_phase(); // coherence check

        let verdicts: Vec<FilteredConversation> = conversations
            .iter()
            .enumerate()
            .map(|(i, conversation)| {
                let task_success_score = task_success_score(conversation);
                let score = SIMILARITY_WEIGHT * (1.0 - similarity[i])
                    + FLUENCY_WEIGHT * fluency[i]
                    + COHERENCE_WEIGHT * coherence[i]
                    + TASK_SUCCESS_WEIGHT * task_success_score;
                let score = score.clamp(0.0, 1.0);
                let (status, reason) = self.verdict(score);

                FilteredConversation {
                    id: format!("filtered_{:03}", i + 1),
                    original_id: conversation.id.clone(),
                    status,
                    reason: reason.to_string(),
                    score,
                    metadata: FilterScores {
                        similarity_score: similarity[i],
                        fluency_score: fluency[i],
                        coherence_score: coherence[i],
                        task_success_score,
                    },
                }
            })
            .collect();
        progress.complete_phase(); // task success verification

        let kept = verdicts
            .iter()
            .filter(|v| v.status == FilterStatus::Kept)
            .count();
        let removed = verdicts
            .iter()
            .filter(|v| v.status == FilterStatus::Removed)
            .count();
        info!(
            total = verdicts.len(),
            kept,
            modified = verdicts.len() - kept - removed,
            removed,
            "reviewed conversation batch"
        );

        Ok(StageOutput::Verdicts(verdicts))
    }
}

/// Highest Jaccard similarity between this conversation's token set and any
/// other conversation in the batch. A single-conversation batch scores 0.
fn max_similarity(conversation: &Conversation, batch: &[Conversation]) -> f64 {
    let own = token_set(conversation);
    batch
        .iter()
        .filter(|other| other.id != conversation.id)
        .map(|other| jaccard(&own, &token_set(other)))
        .fold(0.0, f64::max)
}

fn token_set(conversation: &Conversation) -> HashSet<String> {
    conversation
        .turns
        .iter()
        .flat_map(|t| t.text.split_whitespace())
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Fluency from average words per turn: 1.0 inside the comfortable band,
/// degrading linearly toward very terse or very rambling turns.
fn fluency_score(conversation: &Conversation) -> f64 {
    if conversation.turns.is_empty() {
        return 0.0;
    }
    let avg_words = conversation.word_count() as f64 / conversation.turns.len() as f64;
    if avg_words <= 0.0 {
        return 0.0;
    }

    let below = (avg_words / FLUENCY_FLOOR_WORDS).min(1.0);
    let above = (FLUENCY_CEILING_WORDS / avg_words).min(1.0);
    (below * above).clamp(0.0, 1.0)
}

/// Coherence from strict speaker alternation and non-empty utterances.
fn coherence_score(conversation: &Conversation) -> f64 {
    if conversation.turns.is_empty() {
        return 0.0;
    }

    let non_empty = conversation
        .turns
        .iter()
        .filter(|t| !t.text.trim().is_empty())
        .count() as f64
        / conversation.turns.len() as f64;

    if conversation.turns.len() == 1 {
        return non_empty;
    }

    let alternating = conversation
        .turns
        .windows(2)
        .filter(|pair| pair[0].speaker != pair[1].speaker)
        .count() as f64
        / (conversation.turns.len() - 1) as f64;

    alternating * non_empty
}

fn task_success_score(conversation: &Conversation) -> f64 {
    match (conversation.status, conversation.task_success) {
        (ConversationStatus::Completed, true) => 0.95,
        (ConversationStatus::Completed, false) => 0.5,
        _ => 0.2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::types::{ConversationMetadata, Turn};
    use chrono::Utc;

    fn conversation(id: &str, texts: &[(&str, &str)], task_success: bool) -> Conversation {
        let turns: Vec<Turn> = texts
            .iter()
            .enumerate()
            .map(|(i, (speaker, text))| Turn {
                speaker: (*speaker).to_string(),
                speaker_role: (*speaker).to_lowercase(),
                text: (*text).to_string(),
                turn_id: i as u32 + 1,
                timestamp: Utc::now(),
            })
            .collect();
        Conversation {
            id: id.to_string(),
            experience_id: format!("exp_{}", id),
            status: ConversationStatus::Completed,
            task_success,
            metadata: ConversationMetadata {
                total_turns: turns.len() as u32,
                duration_ms: 1000,
                tokens_used: 100,
            },
            turns,
        }
    }

    #[tokio::test]
    async fn test_one_verdict_per_conversation() {
        let reviewer = QualityReviewer::new(0.8, 0.6);
        let conversations = vec![
            conversation(
                "conv_001",
                &[
                    ("Alex", "I have had a fever for three days and a persistent cough"),
                    ("Dr. Chen", "Let me ask a few questions about when the symptoms started"),
                    ("Alex", "It started on Monday evening after I came back from a trip"),
                    ("Dr. Chen", "Based on that I recommend a test and rest for several days"),
                ],
                true,
            ),
            conversation(
                "conv_002",
                &[
                    ("Dana", "My booking was charged twice and I want one charge reversed"),
                    ("Omar", "I can see the duplicate charge and will reverse it right away"),
                    ("Dana", "Thank you, how long until the refund shows on my statement"),
                    ("Omar", "You should see the reversal within three business days"),
                ],
                false,
            ),
        ];

        let output = reviewer
            .run(
                StageRequest::PostProcessing { conversations },
                ProgressHandle::detached(Stage::PostProcessing),
            )
            .await
            .expect("review should succeed");

        let StageOutput::Verdicts(verdicts) = output else {
            panic!("wrong output variant");
        };
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].original_id, "conv_001");
        assert_eq!(verdicts[1].original_id, "conv_002");
        for verdict in &verdicts {
            assert!((0.0..=1.0).contains(&verdict.score));
            assert!(!verdict.reason.is_empty());
        }
        // Successful dialogue scores above the unsuccessful one.
        assert!(verdicts[0].score > verdicts[1].score);
    }

    #[tokio::test]
    async fn test_near_duplicates_score_high_similarity() {
        let reviewer = QualityReviewer::new(0.99, 0.98);
        let a = conversation(
            "conv_001",
            &[("A", "the exact same words repeated here"), ("B", "and the same reply too")],
            true,
        );
        let mut b = a.clone();
        b.id = "conv_002".to_string();

        let output = reviewer
            .run(
                StageRequest::PostProcessing {
                    conversations: vec![a, b],
                },
                ProgressHandle::detached(Stage::PostProcessing),
            )
            .await
            .expect("review should succeed");

        let StageOutput::Verdicts(verdicts) = output else {
            panic!("wrong output variant");
        };
        assert!((verdicts[0].metadata.similarity_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(verdicts[0].status, FilterStatus::Removed);
    }

    #[test]
    fn test_coherence_penalizes_monologue() {
        let broken = conversation(
            "conv_003",
            &[("A", "hello there"), ("A", "still me talking"), ("A", "and again")],
            true,
        );
        assert!(coherence_score(&broken) < f64::EPSILON);

        let clean = conversation("conv_004", &[("A", "hi"), ("B", "hello")], true);
        assert!((coherence_score(&clean) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fluency_band() {
        let terse = conversation("conv_005", &[("A", "hi"), ("B", "yes")], true);
        assert!(fluency_score(&terse) < 0.5);

        let comfortable = conversation(
            "conv_006",
            &[
                ("A", "I wanted to ask about the charge that appeared twice on my card"),
                ("B", "Of course, give me a moment to pull up the transaction history"),
            ],
            true,
        );
        assert!((fluency_score(&comfortable) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_conversation_has_zero_similarity() {
        let only = conversation("conv_007", &[("A", "hello"), ("B", "hi")], true);
        assert_eq!(max_similarity(&only, std::slice::from_ref(&only)), 0.0);
    }
}
