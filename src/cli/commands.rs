//! CLI command definitions for convoforge.
//!
//! Two commands: `run` drives the five-stage pipeline end to end, `stages`
//! prints the per-stage contracts for discovery.

use clap::Parser;
use std::time::Duration;
use tracing::info;

use crate::export::DatasetExporter;
use crate::pipeline::{PipelineConfig, PipelineController, ProgressEvent};
use crate::stages::Stage;

/// Synthetic goal-oriented dialogue dataset generator.
#[derive(Parser)]
#[command(name = "convoforge")]
#[command(about = "Generate, filter and evaluate synthetic goal-oriented dialogue datasets")]
#[command(version)]
#[command(
    long_about = "convoforge drives a five-stage pipeline: experience generation, multi-agent \
simulation, post-processing, dataset construction and evaluation.\n\nExample usage:\n  \
convoforge run --domain healthcare --task diagnose_fever --count 4 --export ./dataset"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full generation pipeline.
    Run(RunArgs),

    /// Describe each pipeline stage's purpose, shapes and options.
    Stages(StagesArgs),
}

/// Arguments for `convoforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Domain to generate dialogues for.
    #[arg(long, default_value = "healthcare")]
    pub domain: String,

    /// Task within the domain.
    #[arg(long, default_value = "diagnose_fever")]
    pub task: String,

    /// Number of experiences (and conversations) to generate.
    #[arg(long, default_value_t = 2)]
    pub count: usize,

    /// RNG seed; identical seeds reproduce identical runs.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Maximum conversations simulated concurrently.
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Per-stage timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Directory to export the finalized dataset into.
    #[arg(long)]
    pub export: Option<std::path::PathBuf>,

    /// Print the full pipeline report as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `convoforge stages`.
#[derive(Parser, Debug)]
pub struct StagesArgs {
    /// Print descriptors as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses CLI arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Stages(args) => describe_stages(args),
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::new()
        .with_domain(&args.domain)
        .with_task(&args.task)
        .with_num_experiences(args.count)
        .with_seed(args.seed)
        .with_simulation_concurrency(args.concurrency)
        .with_stage_timeout(Duration::from_secs(args.timeout_secs));
    if let Some(dir) = &args.export {
        config = config.with_export_dir(dir);
    }
    let export_dir = config.export_dir.clone();

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            info!(
                stage = %event.stage,
                phase = event.phase,
                percent = event.percent,
                "progress"
            );
        }
    });

    let mut controller = PipelineController::new(config)?.with_progress_sender(progress_tx);
    let report = controller.run_to_completion().await?;

    // Dropping the controller closes the progress channel so the printer
    // task can drain and exit.
    drop(controller);
    progress_task.await.ok();

    if let Some(dir) = export_dir {
        if let Some(items) = report.state.dataset() {
            if items.is_empty() {
                info!("dataset is empty; skipping export");
            } else {
                let export_report = DatasetExporter::new(dir).export(items)?;
                info!(
                    items = export_report.items_written,
                    path = %export_report.json_path.display(),
                    "dataset exported"
                );
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Pipeline {} ({})", report.state.status(), report.run_id);
    println!("  experiences:   {}", report.summary.experiences);
    println!("  conversations: {}", report.summary.conversations);
    if let Some(filter) = &report.summary.filter {
        println!(
            "  verdicts:      {} kept / {} modified / {} removed",
            filter.kept, filter.modified, filter.removed
        );
    }
    if let Some(dataset) = &report.summary.dataset {
        println!(
            "  dataset:       {} items, {} turns, mean quality {:.2}, success rate {:.2}",
            dataset.total_items,
            dataset.total_turns,
            dataset.mean_quality_score,
            dataset.task_success_rate
        );
    }
    if let Some(evaluation) = report.state.evaluation() {
        println!(
            "  evaluation:    overall {:.2}, diversity {:.2}, coherence {:.2}",
            evaluation.overall_score, evaluation.diversity_score, evaluation.coherence_score
        );
    }
    for metrics in &report.metrics {
        if let Some(failure) = &metrics.failure {
            println!("  warning:       {} fell back ({})", metrics.stage, failure);
        }
    }

    Ok(())
}

fn describe_stages(args: StagesArgs) -> anyhow::Result<()> {
    let descriptors: Vec<_> = Stage::ALL.iter().map(|s| s.descriptor()).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    for descriptor in descriptors {
        println!("{} ({})", descriptor.stage.title(), descriptor.stage);
        println!("  purpose: {}", descriptor.purpose);
        println!("  input:   {}", descriptor.input_shape);
        println!("  output:  {}", descriptor.output_shape);
        if !descriptor.options.is_empty() {
            println!("  options: {}", descriptor.options.join(", "));
        }
        println!();
    }

    Ok(())
}
