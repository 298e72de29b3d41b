use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use agentic_archive::archive::{
    ActionExecutor, Archiver, DecisionProtocol, LlmPlanner, Planner, RulePlanner, RuleTable,
    bootstrap_roots,
};
use agentic_archive::classifier::HttpClassifier;
use agentic_archive::config::{ArchiveConfig, PlannerKind};
use agentic_archive::llm::{LlmBackend, LlmConfig, create_provider};
use agentic_archive::storage::{DriveStorage, StorageBackend};
use agentic_archive::tools::ToolRegistry;

#[derive(Parser, Debug)]
#[command(name = "agentic-archive")]
#[command(about = "Archive classified business documents from a drop folder")]
#[command(version)]
struct Args {
    /// Planner to use (overrides ARCHIVE_PLANNER)
    #[arg(long, value_enum)]
    planner: Option<PlannerArg>,

    /// Classify and print each document's plan without moving anything
    #[arg(long)]
    dry_plan: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlannerArg {
    Rules,
    Llm,
}

impl From<PlannerArg> for PlannerKind {
    fn from(arg: PlannerArg) -> Self {
        match arg {
            PlannerArg::Rules => PlannerKind::Rules,
            PlannerArg::Llm => PlannerKind::Llm,
        }
    }
}

/// stderr always; a daily rolling file as well when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "agentic-archive.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = ArchiveConfig::from_env().context("loading configuration")?;
    if let Some(planner) = args.planner {
        config = config.with_planner(planner.into())?;
    }

    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📁 Agentic Archive v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Company: {} ({})", config.company.display_name, config.company.fiscal_id);
    eprintln!("   Planner: {:?}", config.planner);

    // ── Storage ──────────────────────────────────────────────────────────
    let storage: Arc<dyn StorageBackend> = Arc::new(DriveStorage::new(config.drive_token.clone()));
    let roots = bootstrap_roots(Arc::clone(&storage), &config.root_folder_id, &config.folders)
        .await
        .context("preparing folder structure")?;

    // ── Planner ──────────────────────────────────────────────────────────
    let rules = Arc::new(RuleTable::new(config.company.clone()));
    let planner: Arc<dyn Planner> = match config.planner {
        PlannerKind::Rules => Arc::new(RulePlanner::new(Arc::clone(&rules))),
        PlannerKind::Llm => {
            let api_key = config
                .anthropic_api_key
                .clone()
                .context("ANTHROPIC_API_KEY is required for the llm planner")?;
            let llm = create_provider(&LlmConfig {
                backend: LlmBackend::Anthropic,
                api_key,
                model: config.model.clone(),
            })?;
            eprintln!("   Model: {}", config.model);
            Arc::new(LlmPlanner::new(llm, &rules, &ToolRegistry::archive()))
        }
    };

    // ── Archiver ─────────────────────────────────────────────────────────
    let classifier = Arc::new(HttpClassifier::new(
        config.classifier_url.clone(),
        config.classifier_api_key.clone(),
    ));
    let executor = ActionExecutor::new(Arc::clone(&storage), roots.clone());
    let protocol = DecisionProtocol::new(planner, rules, executor);
    let mut archiver = Archiver::new(storage, classifier, protocol, &roots);
    if let Some(dir) = config.scratch_dir.clone() {
        archiver = archiver.with_scratch_dir(dir);
    }

    if args.dry_plan {
        for planned in archiver.dry_plan().await.context("listing drop folder")? {
            match planned.plan {
                Ok(actions) => {
                    let rendered: Vec<String> = actions.iter().map(ToString::to_string).collect();
                    println!("{}\t{}", planned.document.name, rendered.join(" -> "));
                }
                Err(reason) => {
                    println!("{}\tmove_to_unclassified(\"{}\")", planned.document.name, reason);
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = archiver.run().await.context("archive run")?;
    for outcome in report.failed() {
        eprintln!(
            "   FAILED: {} ({}): {}",
            outcome.document.name,
            outcome.document.id,
            outcome
                .incident
                .as_ref()
                .map(|i| i.error.as_str())
                .unwrap_or("unknown error")
        );
    }

    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
