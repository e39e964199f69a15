//! Multi-agent simulation: one goal-oriented dialogue per experience.
//!
//! Conversations are generated through a bounded-concurrency queue (tokio
//! semaphore, concurrency 1 by default) so the observable behavior matches
//! strictly sequential generation while allowing the factor to be raised.
//! Each conversation draws from its own seeded RNG stream, so batches are
//! reproducible regardless of the concurrency factor.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

use crate::error::WorkerError;
use crate::pipeline::progress::ProgressHandle;

use super::types::{
    Conversation, ConversationMetadata, ConversationStatus, Experience, Persona, Turn,
};
use super::{unexpected_payload, Stage, StageOutput, StageRequest, StageWorker};

/// Seed salt so each stage draws an independent stream from the run seed.
const SEED_SALT: u64 = 0x53494d55; // "SIMU"

/// Probability that a simulated dialogue reaches its goal.
const TASK_SUCCESS_RATE: f64 = 0.8;

/// Wall-clock spacing between consecutive turn timestamps.
const TURN_SPACING_SECS: i64 = 30;

/// Built-in worker for the simulation stage.
pub struct DialogueSimulator {
    seed: u64,
    concurrency: usize,
}

impl DialogueSimulator {
    /// Creates a simulator with the given seed and concurrency factor.
    pub fn new(seed: u64, concurrency: usize) -> Self {
        Self {
            seed,
            concurrency: concurrency.max(1),
        }
    }

    fn conversation_seed(&self, index: usize) -> u64 {
        self.seed ^ SEED_SALT ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}

#[async_trait]
impl StageWorker for DialogueSimulator {
    fn stage(&self) -> Stage {
        Stage::Simulation
    }

    async fn run(
        &self,
        request: StageRequest,
        progress: ProgressHandle,
    ) -> Result<StageOutput, WorkerError> {
        let StageRequest::Simulation { experiences } = &request else {
            return Err(unexpected_payload(self.stage(), &request));
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let seeds: Vec<u64> = (0..experiences.len())
            .map(|i| self.conversation_seed(i))
            .collect();
        progress.complete_phase(); // initializing agents

        let contexts: Vec<DialogueContext> = experiences
            .iter()
            .enumerate()
            .map(|(index, experience)| DialogueContext::prepare(index, experience, seeds[index]))
            .collect::<Result<_, _>>()?;
        progress.complete_phase(); // setting up conversation context

        let base_time = Utc::now();
        let openings: Vec<Turn> = contexts
            .iter()
            .map(|ctx| ctx.opening_turn(base_time))
            .collect();
        progress.complete_phase(); // generating first responses

        let futures: Vec<_> = contexts
            .into_iter()
            .zip(openings)
            .map(|(ctx, opening)| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|e| WorkerError::Failed(format!("simulation queue closed: {}", e)))?;
                    Ok::<Conversation, WorkerError>(ctx.simulate(opening, base_time).await)
                }
            })
            .collect();
        let conversations: Vec<Conversation> =
            join_all(futures).await.into_iter().collect::<Result<_, _>>()?;
        progress.complete_phase(); // processing agent interactions

        let successes = conversations.iter().filter(|c| c.task_success).count();
        progress.complete_phase(); // monitoring goal progress

        info!(
            conversations = conversations.len(),
            successes,
            concurrency = self.concurrency,
            "simulated dialogues"
        );
        progress.complete_phase(); // completing conversations

        Ok(StageOutput::Conversations(conversations))
    }
}

/// Everything needed to simulate one conversation, captured up front.
struct DialogueContext {
    index: usize,
    experience: Experience,
    lead: Persona,
    respondent: Persona,
    rng: ChaCha8Rng,
}

impl DialogueContext {
    fn prepare(index: usize, experience: &Experience, seed: u64) -> Result<Self, WorkerError> {
        let lead = experience
            .lead()
            .cloned()
            .ok_or_else(|| WorkerError::Failed(format!("experience '{}' has no lead persona", experience.id)))?;
        let respondent = experience.respondent().cloned().ok_or_else(|| {
            WorkerError::Failed(format!(
                "experience '{}' has no responding persona",
                experience.id
            ))
        })?;

        Ok(Self {
            index,
            experience: experience.clone(),
            lead,
            respondent,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// The respondent opens with the experience's conversation starter.
    fn opening_turn(&self, base_time: DateTime<Utc>) -> Turn {
        Turn {
            speaker: self.respondent.name.clone(),
            speaker_role: self.respondent.role.clone(),
            text: self.experience.conversation_starter.clone(),
            turn_id: 1,
            timestamp: base_time,
        }
    }

    /// Generates the remaining turns and assembles the conversation.
    async fn simulate(mut self, opening: Turn, base_time: DateTime<Utc>) -> Conversation {
        let max_turns = self.experience.constraints.max_turns.max(2);
        let target_turns = self.rng.random_range(2..=4) * 2;
        let total_turns = target_turns.min(max_turns);

        let mut turns = vec![opening];
        for turn_id in 2..=total_turns {
            // Each turn is a suspension point, mirroring an out-of-process
            // generation call per utterance.
            tokio::task::yield_now().await;

            let closing = turn_id == total_turns;
            let (text, speaker) = if turn_id % 2 == 0 {
                (self.lead_line(turn_id, closing), &self.lead)
            } else {
                (self.respondent_line(turn_id), &self.respondent)
            };

            turns.push(Turn {
                speaker: speaker.name.clone(),
                speaker_role: speaker.role.clone(),
                text,
                turn_id,
                timestamp: base_time
                    + ChronoDuration::seconds(TURN_SPACING_SECS * (turn_id as i64 - 1)),
            });
        }

        let task_success = self.rng.random_bool(TASK_SUCCESS_RATE);
        let total_chars: usize = turns.iter().map(|t| t.text.len()).sum();

        Conversation {
            id: format!("conv_{:03}", self.index + 1),
            experience_id: self.experience.id.clone(),
            status: ConversationStatus::Completed,
            task_success,
            metadata: ConversationMetadata {
                total_turns: turns.len() as u32,
                duration_ms: turns.len() as u64 * 750,
                tokens_used: (total_chars / 4 + 50) as u64,
            },
            turns,
        }
    }

    fn lead_line(&mut self, turn_id: u32, closing: bool) -> String {
        let task = self.experience.task.replace('_', " ");
        if turn_id == 2 {
            return format!(
                "I understand your concern. Let me help you with your {}. Can you walk me through what's been happening?",
                task
            );
        }
        if closing {
            return format!(
                "Based on what you've described, here is what I suggest so that we reach a good outcome: {}. Please follow up if anything changes.",
                self.experience.goal
            );
        }
        let variants = [
            "Thanks, that helps. Let's go through this step by step so we don't miss anything.",
            "That's useful detail. A couple of follow-up questions before I recommend anything.",
            "Understood. Given the situation, there are two things I'd like to check first.",
        ];
        variants[self.rng.random_range(0..variants.len())].to_string()
    }

    fn respondent_line(&mut self, turn_id: u32) -> String {
        if turn_id == 3 {
            return format!(
                "Thank you for helping. To give you the full picture: {}.",
                self.experience.situation
            );
        }
        let variants = [
            "That makes sense. What should I do next?",
            "Okay, I can do that. Is there anything I should watch out for?",
            "I see. I just want to make sure this gets resolved properly.",
        ];
        variants[self.rng.random_range(0..variants.len())].to_string()
    }
}
