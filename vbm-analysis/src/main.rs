//! vbm-analysis - command-line entry point
//!
//! Submits recordings to the analysis job controller and reports on stored
//! jobs. Every command opens the database under the resolved root folder.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use vbm_analysis::config::AnalysisSettings;
use vbm_analysis::db::{init_database_pool, JobStore};
use vbm_analysis::linguistic::models::ModelRegistry;
use vbm_analysis::models::AnalysisJob;
use vbm_analysis::vocal::VocalPipeline;
use vbm_analysis::workflow::{AnalysisServices, JobController};
use vbm_common::config::{load_toml_document, prepare_root_folder, resolve_root_folder, TomlConfig};

const ROOT_FOLDER_ENV: &str = "VBM_ROOT_FOLDER";

/// Command-line arguments for vbm-analysis
#[derive(Parser, Debug)]
#[command(name = "vbm-analysis")]
#[command(about = "Speech biomarker extraction for recorded voice samples")]
#[command(version)]
struct Args {
    /// Root folder holding the database and stored recordings
    #[arg(short, long, env = "VBM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a recording and print the finished job
    Analyze { file: PathBuf },
    /// Show one job
    Status { id: Uuid },
    /// Show which tier produced each metric
    Explain { id: Uuid },
    /// Re-run a failed job
    Retry { id: Uuid },
    /// List all jobs, newest first
    List,
    /// Summarize jobs completed in the last few days
    WeeklySummary {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Run the voice toolkit capability check
    Probe,
    /// Delete a job and its stored recording
    Delete { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let document = load_toml_document(args.config.as_deref()).context("Failed to load configuration")?;
    let toml_config = TomlConfig::from_document(&document).context("Invalid [logging] or root_folder")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vbm_analysis={}", toml_config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = AnalysisSettings::resolve(&document).context("Invalid analysis settings")?;

    if let Command::Probe = args.command {
        return print_probe(&settings);
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);
    let db_path = prepare_root_folder(&root_folder).context("Failed to prepare root folder")?;
    info!("Root folder: {}", root_folder.display());

    let pool = init_database_pool(&db_path)
        .await
        .context("Failed to initialize database")?;
    let store = JobStore::new(pool);

    let registry = Arc::new(ModelRegistry::load(&settings.transcriber));
    let services = Arc::new(AnalysisServices::new(settings.clone(), registry));
    let controller = Arc::new(
        JobController::new(store, services, settings, &root_folder)
            .context("Failed to start analysis controller")?,
    );
    controller
        .recover_orphaned_jobs()
        .await
        .context("Failed to recover abandoned jobs")?;

    let outcome = run_command(&controller, args.command).await;
    controller.shutdown().await.context("Controller shutdown failed")?;
    outcome
}

async fn run_command(controller: &Arc<JobController>, command: Command) -> Result<()> {
    match command {
        Command::Analyze { file } => {
            let job = controller
                .create_job(&file)
                .await
                .with_context(|| format!("Failed to submit {}", file.display()))?;
            let status = controller.run_job(job.id).await.context("Analysis failed")?;
            info!(job_id = %job.id, status = %status, "Analysis finished");
            print_job(&controller.get_job(job.id).await?)
        }
        Command::Status { id } => print_job(&controller.get_job(id).await?),
        Command::Explain { id } => {
            let job = controller.get_job(id).await?;
            let provenance = job.results.as_ref().map(|r| r.provenance());
            let report = json!({
                "id": job.id,
                "status": job.status,
                "provenance": provenance,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Retry { id } => {
            let handle = controller.retry(id).await.context("Retry rejected")?;
            let status = handle.await.context("Retry task failed")??;
            info!(job_id = %id, status = %status, "Retry finished");
            print_job(&controller.get_job(id).await?)
        }
        Command::List => {
            for job in controller.list_jobs().await? {
                println!(
                    "{}  {:<10}  {}  {}",
                    job.id,
                    job.status,
                    vbm_common::time::to_db_string(&job.created_at),
                    job.recording_path.display()
                );
            }
            Ok(())
        }
        Command::WeeklySummary { days } => {
            println!("{}", controller.weekly_summary(days).await?);
            Ok(())
        }
        Command::Delete { id } => {
            controller.delete_job(id).await?;
            println!("Deleted {}", id);
            Ok(())
        }
        Command::Probe => Ok(()),
    }
}

fn print_job(job: &AnalysisJob) -> Result<()> {
    let fields = job.results.as_ref().map(|r| r.field_map());
    let report = json!({
        "id": job.id,
        "status": job.status,
        "created_at": job.created_at,
        "updated_at": job.updated_at,
        "recording_path": job.recording_path,
        "error_message": job.error_message,
        "fields": fields,
        "results": job.results,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_probe(settings: &AnalysisSettings) -> Result<()> {
    let vocal = VocalPipeline::from_settings(settings);
    let report = vocal.probe();
    println!("toolkit: {}", report.toolkit);
    println!("available: {}", report.available);
    for (canary, error) in &report.failures {
        println!("  {}: {}", canary, error);
    }
    Ok(())
}
