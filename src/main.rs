//! # SegurosPy: Insurance Brokerage Backoffice
//!
//! Runs the scheduled backoffice jobs against the lead store.
//!
//! Usage:
//!   segurospy                          # Run the scheduler until Ctrl-C
//!   segurospy --config ./config.toml   # Custom config file
//!   segurospy --list-jobs              # Show registered jobs and next runs
//!   segurospy --run-job daily_report   # Run one job now and exit

mod lifecycle;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use segurospy_core::SegurosConfig;
use tracing_subscriber::EnvFilter;

use crate::lifecycle::Backoffice;

#[derive(Parser)]
#[command(
    name = "segurospy",
    version,
    about = "🛡️ SegurosPy: insurance brokerage backoffice scheduler"
)]
struct Cli {
    /// Config file (default: ~/.segurospy/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path, overrides the config file
    #[arg(long)]
    db_path: Option<String>,

    /// List registered jobs and exit
    #[arg(long)]
    list_jobs: bool,

    /// Run one job immediately and exit
    #[arg(long, value_name = "ID")]
    run_job: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "segurospy=debug,segurospy_core=debug,segurospy_db=debug,segurospy_channels=debug,segurospy_scheduler=debug"
    } else {
        "segurospy=info,segurospy_core=info,segurospy_db=info,segurospy_channels=info,segurospy_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => SegurosConfig::load_from(path)?,
        None => SegurosConfig::load()?,
    };
    config.apply_env_overrides();
    if let Some(db_path) = cli.db_path {
        config.database.path = db_path;
    }

    // Expand paths and make sure the database directory exists
    config.database.path = expand_path(&config.database.path);
    if let Some(parent) = Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let backoffice = Backoffice::build(&config)?;
    let offset = backoffice.scheduler().offset();

    if cli.list_jobs {
        println!("📅 Registered jobs (UTC offset {offset}):\n");
        for job in backoffice.scheduler().jobs() {
            let next = job
                .next_run
                .map(|at| at.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".into());
            println!("   {:<16} {:<28} {:<18} next: {next}", job.id, job.name, job.trigger.to_string());
        }
        return Ok(());
    }

    if let Some(job_id) = &cli.run_job {
        let report = backoffice.scheduler().run_now(job_id).await?;
        println!("✅ {job_id}: {}", report.summary);
        return Ok(());
    }

    println!("🛡️ SegurosPy v{}", env!("CARGO_PKG_VERSION"));
    println!("   🏢 Company:   {}", config.company.name);
    println!("   🗄️  Database:  {}", config.database.path);
    println!(
        "   📨 Telegram:  {}",
        if config.telegram.is_configured() { "configured" } else { "not configured" }
    );
    println!("   ⏰ Jobs:      {}", backoffice.scheduler().job_count());
    println!();

    backoffice.on_startup();
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    backoffice.on_shutdown().await;

    Ok(())
}
