//! Evaluation: aggregate quality metrics over the finalized dataset.
//!
//! All statistics are plain functions of the dataset batch. An empty
//! dataset yields the zeroed report; every rate is defined as 0 when its
//! denominator set is empty.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::error::WorkerError;
use crate::pipeline::progress::ProgressHandle;

use super::types::{
    ConversationLength, DatasetItem, EvaluationCategories, EvaluationMetrics,
};
use super::{unexpected_payload, Stage, StageOutput, StageRequest, StageWorker};

/// Type/token ratio floor for the lexical diversity measure.
const TTR_THRESHOLD: f64 = 0.72;

/// Built-in worker for the evaluation stage.
#[derive(Default)]
pub struct DatasetEvaluator;

impl DatasetEvaluator {
    /// Creates a dataset evaluator.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageWorker for DatasetEvaluator {
    fn stage(&self) -> Stage {
        Stage::Evaluation
    }

    async fn run(
        &self,
        request: StageRequest,
        progress: ProgressHandle,
    ) -> Result<StageOutput, WorkerError> {
        let StageRequest::Evaluation { dataset } = &request else {
            return Err(unexpected_payload(self.stage(), &request));
        };

        if dataset.is_empty() {
            info!("evaluating empty dataset; reporting zeroed metrics");
            return Ok(StageOutput::Evaluation(EvaluationMetrics::empty()));
        }

        let tokens = all_tokens(dataset);
        let lexical_diversity = lexical_diversity(&tokens);
        progress.complete_phase(); // analyzing lexical diversity

        let coherence_score = mean(dataset.iter().map(alternation_ratio));
        progress.complete_phase(); // evaluating conversation coherence

        let task_success_rate = ratio(
            dataset.iter().filter(|i| i.task_success).count(),
            dataset.len(),
        );
        progress.complete_phase(); // assessing task success rates

        let fluency_score = mean(dataset.iter().map(fluency));
        progress.complete_phase(); // measuring fluency and naturalness

        let groundedness_score = mean(dataset.iter().map(groundedness));
        progress.complete_phase(); // checking groundedness in personas

        let domain_distribution = domain_distribution(dataset);
        let task_success_by_domain = task_success_by_domain(dataset);
        let diversity_score = 0.5 * normalized_entropy(&domain_distribution)
            + 0.5 * (lexical_diversity / 100.0).min(1.0);
        progress.complete_phase(); // computing domain distribution

        let overall_score = 0.25 * task_success_rate
            + 0.2 * coherence_score
            + 0.2 * fluency_score
            + 0.2 * diversity_score
            + 0.15 * groundedness_score;

        let metrics = EvaluationMetrics {
            overall_score: overall_score.clamp(0.0, 1.0),
            diversity_score: diversity_score.clamp(0.0, 1.0),
            coherence_score,
            task_success_rate,
            fluency_score,
            groundedness_score,
            categories: EvaluationCategories {
                lexical_diversity,
                conversation_length: conversation_length(dataset),
                domain_distribution,
                task_success_by_domain,
            },
        };

        info!(
            items = dataset.len(),
            overall = metrics.overall_score,
            task_success_rate = metrics.task_success_rate,
            "evaluated dataset"
        );
        progress.complete_phase(); // generating final evaluation report

        Ok(StageOutput::Evaluation(metrics))
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn all_tokens(dataset: &[DatasetItem]) -> Vec<String> {
    dataset
        .iter()
        .flat_map(|item| item.turns.iter())
        .flat_map(|turn| turn.text.split_whitespace())
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Windowed type/token lexical diversity (MTLD forward pass): the mean
/// number of tokens a sequential segment sustains before its type/token
/// ratio drops below the threshold. Higher means richer vocabulary.
fn lexical_diversity(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }

    let mut factors = 0.0;
    let mut types: HashSet<&str> = HashSet::new();
    let mut segment_len = 0usize;

    for token in tokens {
        segment_len += 1;
        types.insert(token.as_str());
        let ttr = types.len() as f64 / segment_len as f64;
        if ttr < TTR_THRESHOLD {
            factors += 1.0;
            types.clear();
            segment_len = 0;
        }
    }

    if segment_len > 0 {
        // Partial factor for the trailing segment.
        let ttr = types.len() as f64 / segment_len as f64;
        factors += (1.0 - ttr) / (1.0 - TTR_THRESHOLD);
    }

    if factors == 0.0 {
        tokens.len() as f64
    } else {
        tokens.len() as f64 / factors
    }
}

fn alternation_ratio(item: &DatasetItem) -> f64 {
    if item.turns.len() < 2 {
        return if item.turns.is_empty() { 0.0 } else { 1.0 };
    }
    item.turns
        .windows(2)
        .filter(|pair| pair[0].speaker != pair[1].speaker)
        .count() as f64
        / (item.turns.len() - 1) as f64
}

fn fluency(item: &DatasetItem) -> f64 {
    if item.turns.is_empty() {
        return 0.0;
    }
    let words: usize = item
        .turns
        .iter()
        .map(|t| t.text.split_whitespace().count())
        .sum();
    let avg = words as f64 / item.turns.len() as f64;
    if avg <= 0.0 {
        return 0.0;
    }
    ((avg / 6.0).min(1.0) * (40.0 / avg).min(1.0)).clamp(0.0, 1.0)
}

/// Fraction of turns attributed to one of the item's declared personas.
fn groundedness(item: &DatasetItem) -> f64 {
    if item.turns.is_empty() {
        return 0.0;
    }
    let names: HashSet<&str> = item.personas.iter().map(|p| p.name.as_str()).collect();
    ratio(
        item.turns
            .iter()
            .filter(|t| names.contains(t.speaker.as_str()))
            .count(),
        item.turns.len(),
    )
}

fn domain_distribution(dataset: &[DatasetItem]) -> HashMap<String, usize> {
    let mut distribution: HashMap<String, usize> = HashMap::new();
    for item in dataset {
        *distribution.entry(item.domain.clone()).or_insert(0) += 1;
    }
    distribution
}

fn task_success_by_domain(dataset: &[DatasetItem]) -> HashMap<String, f64> {
    let mut totals: HashMap<&str, (usize, usize)> = HashMap::new();
    for item in dataset {
        let entry = totals.entry(item.domain.as_str()).or_insert((0, 0));
        entry.1 += 1;
        if item.task_success {
            entry.0 += 1;
        }
    }
    totals
        .into_iter()
        .map(|(domain, (successes, total))| (domain.to_string(), ratio(successes, total)))
        .collect()
}

/// Shannon entropy of the distribution normalized to [0, 1]; a single
/// domain scores 0, a perfectly even spread scores 1.
fn normalized_entropy(distribution: &HashMap<String, usize>) -> f64 {
    let total: usize = distribution.values().sum();
    if total == 0 || distribution.len() < 2 {
        return 0.0;
    }

    let entropy: f64 = distribution
        .values()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total as f64;
            -p * p.ln()
        })
        .sum();

    let max_entropy = (distribution.len() as f64).ln();
    (entropy / max_entropy).clamp(0.0, 1.0)
}

fn conversation_length(dataset: &[DatasetItem]) -> ConversationLength {
    if dataset.is_empty() {
        return ConversationLength::default();
    }

    let lengths: Vec<f64> = dataset.iter().map(|i| i.turns.len() as f64).collect();
    let avg_turns = lengths.iter().sum::<f64>() / lengths.len() as f64;
    let variance = lengths
        .iter()
        .map(|len| (len - avg_turns).powi(2))
        .sum::<f64>()
        / lengths.len() as f64;

    ConversationLength {
        avg_turns,
        std_dev: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::types::{DatasetItemMetadata, Persona, Turn};
    use chrono::Utc;

    fn item(id: &str, domain: &str, task_success: bool, texts: &[(&str, &str)]) -> DatasetItem {
        let turns: Vec<Turn> = texts
            .iter()
            .enumerate()
            .map(|(i, (speaker, text))| Turn {
                speaker: (*speaker).to_string(),
                speaker_role: "role".to_string(),
                text: (*text).to_string(),
                turn_id: i as u32 + 1,
                timestamp: Utc::now(),
            })
            .collect();
        DatasetItem {
            id: id.to_string(),
            conv_id: format!("conv_{}", id),
            domain: domain.to_string(),
            task: "task".to_string(),
            personas: vec![Persona::new("Ana", "lead"), Persona::new("Ben", "respondent")],
            task_success,
            metadata: DatasetItemMetadata {
                total_turns: turns.len() as u32,
                domain_category: "general_dialogue".to_string(),
                creation_timestamp: Utc::now(),
                quality_score: 0.9,
            },
            turns,
        }
    }

    #[tokio::test]
    async fn test_empty_dataset_yields_zeroed_metrics() {
        let evaluator = DatasetEvaluator::new();
        let output = evaluator
            .run(
                StageRequest::Evaluation { dataset: vec![] },
                ProgressHandle::detached(Stage::Evaluation),
            )
            .await
            .expect("evaluation should succeed");

        let StageOutput::Evaluation(metrics) = output else {
            panic!("wrong output variant");
        };
        assert_eq!(metrics, EvaluationMetrics::empty());
        assert_eq!(metrics.task_success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_scores_stay_in_unit_interval() {
        let evaluator = DatasetEvaluator::new();
        let dataset = vec![
            item(
                "001",
                "healthcare",
                true,
                &[
                    ("Ana", "I have had a fever for three days and a stubborn cough"),
                    ("Ben", "Let us review the symptoms together and decide on next steps"),
                ],
            ),
            item(
                "002",
                "education",
                false,
                &[
                    ("Ana", "This equation keeps going wrong somewhere in the middle"),
                    ("Ben", "Walk me through your last attempt one line at a time"),
                ],
            ),
        ];

        let output = evaluator
            .run(
                StageRequest::Evaluation { dataset },
                ProgressHandle::detached(Stage::Evaluation),
            )
            .await
            .expect("evaluation should succeed");

        let StageOutput::Evaluation(metrics) = output else {
            panic!("wrong output variant");
        };
        for score in [
            metrics.overall_score,
            metrics.diversity_score,
            metrics.coherence_score,
            metrics.task_success_rate,
            metrics.fluency_score,
            metrics.groundedness_score,
        ] {
            assert!((0.0..=1.0).contains(&score), "score out of range: {score}");
        }
        assert!((metrics.task_success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(metrics.categories.domain_distribution.len(), 2);
        assert_eq!(metrics.categories.conversation_length.avg_turns, 2.0);
        // Both personas speak, so attribution is fully grounded.
        assert!((metrics.groundedness_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lexical_diversity_rewards_variety() {
        let varied: Vec<String> = "the quick brown fox jumps over a lazy dog near the riverbank while evening light settles across quiet water and distant hills"
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let repetitive: Vec<String> = std::iter::repeat("same".to_string()).take(30).collect();

        assert!(lexical_diversity(&varied) > lexical_diversity(&repetitive));
        assert_eq!(lexical_diversity(&[]), 0.0);
    }

    #[test]
    fn test_normalized_entropy_bounds() {
        let mut even = HashMap::new();
        even.insert("a".to_string(), 5);
        even.insert("b".to_string(), 5);
        assert!((normalized_entropy(&even) - 1.0).abs() < 1e-9);

        let mut single = HashMap::new();
        single.insert("a".to_string(), 10);
        assert_eq!(normalized_entropy(&single), 0.0);
    }

    #[test]
    fn test_conversation_length_stddev() {
        let dataset = vec![
            item("001", "a", true, &[("Ana", "one"), ("Ben", "two")]),
            item(
                "002",
                "a",
                true,
                &[("Ana", "one"), ("Ben", "two"), ("Ana", "three"), ("Ben", "four")],
            ),
        ];
        let length = conversation_length(&dataset);
        assert!((length.avg_turns - 3.0).abs() < f64::EPSILON);
        assert!((length.std_dev - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rates_with_empty_denominators_are_zero() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(mean(std::iter::empty()), 0.0);
        assert_eq!(task_success_by_domain(&[]).len(), 0);
    }
}
