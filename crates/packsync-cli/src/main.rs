//! packsync - Differential synchronizer for Minecraft pack installations
//!
//! Brings a local installation up to date against a published pack manifest,
//! fetching only changed content and removing files that left the active
//! packmode selection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use packsync_sync::{
    DirSource, InstallationState, JsonStateStore, StateStore, SyncEngine, SyncOutcome, SyncRequest,
    SyncResult,
};
use packsync_types::{Packmode, WorkerCount};
use std::path::PathBuf;
use tracing::info;

/// packsync - Differential synchronizer for Minecraft pack installations
#[derive(Parser)]
#[command(
    name = "packsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Differential synchronizer for Minecraft pack installations",
    long_about = "packsync compares a local pack installation against a published\n\
                  manifest and applies the minimal set of changes: new and updated\n\
                  files are fetched and verified, files outside the active packmode\n\
                  selection are removed, and everything else is left untouched."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize an installation against a pack release
    Sync {
        /// Pack release directory containing pack-manifest.json
        source: PathBuf,
        /// Installation directory to synchronize
        install_dir: PathBuf,
        /// Active packmodes (defaults to the installation's previous selection)
        #[arg(short, long)]
        packmode: Vec<String>,
        /// Number of concurrent downloads
        #[arg(short, long)]
        workers: Option<usize>,
        /// Compute and print the plan without applying it
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the change plan without applying it
    Plan {
        /// Pack release directory containing pack-manifest.json
        source: PathBuf,
        /// Installation directory to compare
        install_dir: PathBuf,
        /// Active packmodes
        #[arg(short, long)]
        packmode: Vec<String>,
    },
    /// Show what an installation currently contains
    Status {
        /// Installation directory to inspect
        install_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.quiet, cli.verbose)?;

    info!("packsync v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Sync {
            source,
            install_dir,
            packmode,
            workers,
            dry_run,
        } => {
            sync_command(source, install_dir, packmode, workers, dry_run, cli.quiet).await?;
        }
        Commands::Plan {
            source,
            install_dir,
            packmode,
        } => {
            sync_command(source, install_dir, packmode, None, true, cli.quiet).await?;
        }
        Commands::Status { install_dir } => {
            status_command(install_dir).await?;
        }
    }

    Ok(())
}

fn init_logging(debug: bool, quiet: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

async fn sync_command(
    source: PathBuf,
    install_dir: PathBuf,
    packmodes: Vec<String>,
    workers: Option<usize>,
    dry_run: bool,
    quiet: bool,
) -> Result<()> {
    let mut request = SyncRequest::new(&install_dir);
    if !packmodes.is_empty() {
        let parsed: Vec<Packmode> = packmodes
            .iter()
            .map(|name| Packmode::new(name).map_err(anyhow::Error::from))
            .collect::<Result<_>>()
            .context("invalid packmode selection")?;
        request = request.with_packmodes(parsed);
    }
    if let Some(count) = workers {
        request.options.workers = WorkerCount::new(count)
            .map_err(anyhow::Error::msg)
            .context("invalid worker count")?;
    }
    if dry_run {
        request = request.dry_run();
    }

    if !quiet {
        println!(
            "{} Syncing {} from {}",
            style("⟲").blue().bold(),
            style(install_dir.display()).cyan(),
            style(source.display()).cyan()
        );
        if dry_run {
            println!(
                "{} Dry run mode - no changes will be made",
                style("ℹ").yellow()
            );
        }
    }

    let engine = SyncEngine::new();

    // Ctrl-C requests cooperative cancellation; in-flight downloads are
    // discarded and the installation stays consistent.
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancellation requested, finishing current operations");
            cancel.cancel();
        }
    });

    let result = engine
        .sync(request, &DirSource::new(&source))
        .await
        .context("sync failed")?;

    if !quiet {
        print_result(&result);
    }

    info!("Sync {} finished", result.request_id);
    if !result.is_synced() && !dry_run {
        std::process::exit(1);
    }
    Ok(())
}

async fn status_command(install_dir: PathBuf) -> Result<()> {
    let store = JsonStateStore::for_install_dir(&install_dir);
    let state = store
        .load()
        .await
        .context("failed to read installation state")?
        .unwrap_or_else(InstallationState::fresh);

    println!("{}", style("Installation Status:").bold().underlined());
    println!("  Directory: {}", style(install_dir.display()).cyan());
    println!(
        "  Manifest version: {}",
        style(state.manifest_version).green()
    );
    println!(
        "  Active packmodes: {}",
        if state.active_packmodes.is_empty() {
            style("(never synced)".to_string()).yellow()
        } else {
            style(
                state
                    .active_packmodes
                    .iter()
                    .map(|p| p.as_str().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
            .green()
        }
    );
    println!("  Tracked files: {}", style(state.files.len()).green());

    Ok(())
}

fn print_result(result: &SyncResult) {
    match result.outcome {
        SyncOutcome::UpToDate => {
            println!(
                "{} Already up to date at {}",
                style("✓").green().bold(),
                style(result.manifest_version).green()
            );
            return;
        }
        SyncOutcome::DryRun => {
            println!();
            println!("{}", style("Planned operations:").bold().underlined());
            for op in &result.plan.ops {
                println!("  {op}");
            }
            println!("  {}", style(&result.plan).bold());
            return;
        }
        SyncOutcome::Applied => {}
    }

    println!();
    println!("{}", style("Sync Results:").bold().underlined());
    println!("  Target version: {}", style(result.manifest_version).green());
    println!("  Applied: {}", style(result.report.applied).green());
    println!(
        "  Failed: {}",
        if result.report.failed > 0 {
            style(result.report.failed).red()
        } else {
            style(result.report.failed).green()
        }
    );
    println!("  Skipped: {}", style(result.report.skipped).yellow());

    for failure in &result.report.failures {
        println!(
            "  {} {}: {}",
            style("✗").red().bold(),
            style(&failure.path).cyan(),
            failure.message
        );
    }

    if result.is_synced() {
        println!("{} Installation is up to date", style("✓").green());
    } else {
        println!(
            "{} Sync incomplete - run again to retry failed operations",
            style("⚠").yellow()
        );
    }
}
