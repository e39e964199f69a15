//! Experience generation: composes dialogue blueprints from the catalog.
//!
//! Sampling is driven by a ChaCha8 RNG seeded from the pipeline seed, so the
//! same configuration always yields the same batch of experiences.

use async_trait::async_trait;
use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::error::WorkerError;
use crate::pipeline::progress::ProgressHandle;

use super::catalog::{self, DomainProfile, ScenarioTemplate, TaskProfile};
use super::types::{Experience, Persona, TurnConstraints};
use super::{unexpected_payload, Stage, StageOutput, StageRequest, StageWorker};

/// Seed salt so each stage draws an independent stream from the run seed.
const SEED_SALT: u64 = 0x45585047; // "EXPG"

/// Built-in worker for the experience-generation stage.
pub struct ExperienceWriter {
    seed: u64,
}

impl ExperienceWriter {
    /// Creates a writer seeded from the pipeline seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn compose(
        &self,
        profile: &'static DomainProfile,
        task: &'static TaskProfile,
        count: usize,
        progress: &ProgressHandle,
    ) -> Vec<Experience> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ SEED_SALT);

        // Persona pairs first, then scenarios, then constraints; each pass
        // corresponds to one declared sub-phase.
        let personas: Vec<(Persona, Persona)> = (0..count)
            .map(|_| {
                let lead = pick(&mut rng, profile.leads).to_persona();
                let respondent = pick(&mut rng, profile.respondents).to_persona();
                (lead, respondent)
            })
            .collect();
        progress.complete_phase(); // generating diverse personas

        let scenarios: Vec<&'static ScenarioTemplate> =
            (0..count).map(|_| pick(&mut rng, task.scenarios)).collect();
        progress.complete_phase(); // creating realistic situations

        let goals: Vec<String> = scenarios.iter().map(|s| s.goal.to_string()).collect();
        progress.complete_phase(); // defining clear objectives

        let starters: Vec<String> = scenarios.iter().map(|s| s.starter.to_string()).collect();
        progress.complete_phase(); // crafting conversation starters

        let constraints: Vec<TurnConstraints> = scenarios
            .iter()
            .map(|s| TurnConstraints {
                max_turns: rng.random_range(8..=14),
                response_style: s.style.to_string(),
            })
            .collect();
        progress.complete_phase(); // applying constraints and guidelines

        personas
            .into_iter()
            .zip(scenarios)
            .zip(goals)
            .zip(starters)
            .zip(constraints)
            .enumerate()
            .map(
                |(i, (((((lead, respondent), scenario), goal), starter), constraints))| {
                    Experience {
                        id: format!("exp_{:03}", i + 1),
                        domain: profile.id.to_string(),
                        task: task.id.to_string(),
                        personas: vec![lead, respondent],
                        situation: scenario.situation.to_string(),
                        goal,
                        conversation_starter: starter,
                        constraints,
                    }
                },
            )
            .collect()
    }
}

#[async_trait]
impl StageWorker for ExperienceWriter {
    fn stage(&self) -> Stage {
        Stage::ExperienceGeneration
    }

    async fn run(
        &self,
        request: StageRequest,
        progress: ProgressHandle,
    ) -> Result<StageOutput, WorkerError> {
        let StageRequest::ExperienceGeneration { spec } = &request else {
            return Err(unexpected_payload(self.stage(), &request));
        };

        let profile = catalog::domain(&spec.domain).ok_or_else(|| {
            WorkerError::Failed(format!("unsupported domain '{}'", spec.domain))
        })?;
        let task = profile.task(&spec.task).ok_or_else(|| {
            WorkerError::Failed(format!(
                "unsupported task '{}' for domain '{}'",
                spec.task, spec.domain
            ))
        })?;
        progress.complete_phase(); // analyzing domain and task requirements

        let experiences = self.compose(profile, task, spec.num_experiences, &progress);
        progress.complete_phase(); // finalizing experience blueprints

        info!(
            domain = %spec.domain,
            task = %spec.task,
            count = experiences.len(),
            "generated experience blueprints"
        );

        Ok(StageOutput::Experiences(experiences))
    }
}

fn pick<'a, T>(rng: &mut ChaCha8Rng, pool: &'a [T]) -> &'a T {
    &pool[rng.random_range(0..pool.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::GenerationSpec;

    fn request(domain: &str, task: &str, count: usize) -> StageRequest {
        StageRequest::ExperienceGeneration {
            spec: GenerationSpec {
                domain: domain.to_string(),
                task: task.to_string(),
                num_experiences: count,
            },
        }
    }

    #[tokio::test]
    async fn test_generates_requested_count() {
        let writer = ExperienceWriter::new(42);
        let progress = ProgressHandle::detached(Stage::ExperienceGeneration);

        let output = writer
            .run(request("healthcare", "diagnose_fever", 4), progress.clone())
            .await
            .expect("generation should succeed");

        let StageOutput::Experiences(experiences) = output else {
            panic!("wrong output variant");
        };
        assert_eq!(experiences.len(), 4);
        for (i, experience) in experiences.iter().enumerate() {
            assert_eq!(experience.id, format!("exp_{:03}", i + 1));
            assert_eq!(experience.domain, "healthcare");
            assert_eq!(experience.personas.len(), 2);
            assert!(experience.constraints.max_turns >= 8);
        }
        assert_eq!(progress.percent(), 100);
    }

    #[tokio::test]
    async fn test_same_seed_reproduces_batch() {
        let a = ExperienceWriter::new(7)
            .run(
                request("business", "negotiation", 3),
                ProgressHandle::detached(Stage::ExperienceGeneration),
            )
            .await
            .expect("generation should succeed");
        let b = ExperienceWriter::new(7)
            .run(
                request("business", "negotiation", 3),
                ProgressHandle::detached(Stage::ExperienceGeneration),
            )
            .await
            .expect("generation should succeed");

        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_domain_fails() {
        let writer = ExperienceWriter::new(42);
        let result = writer
            .run(
                request("astrology", "read_stars", 2),
                ProgressHandle::detached(Stage::ExperienceGeneration),
            )
            .await;

        assert!(matches!(result, Err(WorkerError::Failed(_))));
    }

    #[tokio::test]
    async fn test_unknown_task_fails() {
        let writer = ExperienceWriter::new(42);
        let result = writer
            .run(
                request("healthcare", "summon_rain", 2),
                ProgressHandle::detached(Stage::ExperienceGeneration),
            )
            .await;

        assert!(matches!(result, Err(WorkerError::Failed(_))));
    }
}
