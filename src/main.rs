use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bkjobs::config::AppConfig;
use bkjobs::core::engine::{EngineType, EngineWorkerFactory};
use bkjobs::core::{
    BackupMode, ClockScheduler, Collaborators, Coordinator, HeadlessPrompter, JobSummary,
    UiCommand, notifications, presentation,
};
use bkjobs::web::WebServer;
use bkjobs::{db, logging};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "bkjobs")]
#[command(about = "Scheduled backup jobs with a web control panel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator, scheduler and control panel
    Daemon(ServerArgs),
    /// Show the state of every backup on a running daemon
    Status {
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Print the effective configuration
    Config(ServerArgs),
}

#[derive(Args, Serialize)]
struct ServerArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    database_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    http_bind: Option<SocketAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    engine: Option<EngineType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    default_mode: Option<BackupMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    simulation: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let config = match &cli.command {
        Commands::Daemon(args) | Commands::Config(args) => AppConfig::new(config_path, Some(args))?,
        Commands::Status { .. } => AppConfig::new(config_path, None::<&ServerArgs>)?,
    };

    match &cli.command {
        Commands::Daemon(_) => {
            logging::init((&config).into());
            run_daemon(config).await.context("Failed to start daemon")?
        }
        Commands::Status { addr } => run_status(addr.unwrap_or(config.http_bind))
            .await
            .context("Failed to check status of daemon")?,
        Commands::Config(_) => print!(
            "{}",
            toml::to_string_pretty(&config).context("Failed to serialize config")?
        ),
    }

    Ok(())
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    info!(engine = ?config.effective_engine(), "bkjobs starting");

    let conn = db::init(&config.database_path)
        .await
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;

    let scheduler = Arc::new(ClockScheduler::new());
    scheduler.start(Duration::from_secs(config.scheduler_tick_secs.max(1)));

    let collab = Collaborators {
        store: Arc::new(db::SqliteStore::new(conn)),
        workers: Arc::new(EngineWorkerFactory::new(
            config.effective_engine(),
            config.duplicity_binary.clone(),
        )),
        scheduler: scheduler.clone(),
        prompter: Arc::new(HeadlessPrompter {
            default_mode: config.default_mode,
            auto_confirm_deletion: config.auto_confirm_deletion,
            restore_root: config.restore_root.clone(),
        }),
        notifier: notifications::create_notifier(&config.notifications),
    };

    let (panel, endpoint) = presentation::channel();
    let coordinator = tokio::spawn(Coordinator::new(collab, endpoint).run());

    // Register every entry and its schedule without waiting for a browser.
    panel.send(UiCommand::ControlPanelReady).await?;

    let web = WebServer::new(panel, config.http_bind);
    tokio::select! {
        result = web.start() => result.context("Control panel server failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            web.shutdown();
        }
    }

    scheduler.stop();
    coordinator.abort();
    Ok(())
}

async fn run_status(addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/api/backups", addr);
    let jobs: Vec<JobSummary> = reqwest::get(&url)
        .await
        .with_context(|| format!("Could not reach daemon at {}", addr))?
        .error_for_status()?
        .json()
        .await
        .context("Unexpected response from daemon")?;

    if jobs.is_empty() {
        println!("No backups configured.");
        return Ok(());
    }

    for job in jobs {
        let last = job
            .last_message
            .as_deref()
            .and_then(|m| m.lines().last())
            .unwrap_or("-");
        println!(
            "{:<38} {:<24} {:<11} {}",
            job.entry_id,
            job.title,
            job.lifecycle,
            last
        );
    }

    Ok(())
}
