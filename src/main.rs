use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use appcast_sync::app::{App, SyncError, UpsertRequest};
use appcast_sync::config::{validate_repository, Config, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(
    name = "appcast-sync",
    version,
    about = "Keep a Sparkle appcast in sync with GitHub releases"
)]
struct Args {
    /// Config file (defaults to ./appcast-sync.toml when present)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Appcast file to maintain (overrides feed_path from the config)
    #[arg(long, value_name = "FILE", global = true)]
    feed: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild every feed entry from the repository's published releases
    Sync {
        /// Repository as OWNER/NAME (overrides the config)
        #[arg(long, value_name = "OWNER/NAME")]
        repo: Option<String>,

        /// Print the resulting feed instead of writing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Insert or replace the entry for a single release
    Upsert {
        /// Version string, e.g. 1.0.3
        version: String,
        /// Download URL of the installer
        url: String,
        /// Installer size in bytes
        size: String,

        /// Print the resulting feed instead of writing it
        #[arg(long)]
        dry_run: bool,
    },
    /// List the entries of the current feed
    Show,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<Config> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(feed) = &args.feed {
        config.feed_path = feed.clone();
    }
    if let Command::Sync {
        repo: Some(repo), ..
    } = &args.command
    {
        config.repository = repo.clone();
    }
    Ok(config)
}

/// Prints the error and exits with the code its category maps to.
fn fail(error: SyncError) -> ! {
    eprintln!("Error: {error}");
    std::process::exit(error.exit_code());
}

/// A command whose arguments have been validated.
enum Plan {
    Sync { dry_run: bool },
    Upsert { request: UpsertRequest, dry_run: bool },
    Show,
}

/// Validates arguments before any file or network I/O.
fn plan(command: &Command) -> Result<Plan, SyncError> {
    match command {
        Command::Sync { repo, dry_run } => {
            if let Some(repo) = repo {
                validate_repository(repo).map_err(|e| SyncError::Usage(e.to_string()))?;
            }
            Ok(Plan::Sync { dry_run: *dry_run })
        }
        Command::Upsert {
            version,
            url,
            size,
            dry_run,
        } => Ok(Plan::Upsert {
            request: UpsertRequest::parse(version, url, size)?,
            dry_run: *dry_run,
        }),
        Command::Show => Ok(Plan::Show),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let plan = plan(&args.command).unwrap_or_else(|e| fail(e));
    let config = load_config(&args)?;
    let app = App::new(config).context("Failed to build HTTP client")?;
    let feed_path = app.config().feed_path.display().to_string();

    match plan {
        Plan::Sync { dry_run } => {
            let outcome = app.sync(dry_run, Utc::now()).await.unwrap_or_else(|e| fail(e));
            if dry_run {
                print!("{}", outcome.rendered);
                return Ok(());
            }
            if outcome.created {
                println!("Created new {feed_path}");
            }
            println!(
                "Updated {feed_path} with {} of {} releases",
                outcome.report.added.len(),
                outcome.fetched
            );
            for (tag, reason) in &outcome.report.skipped {
                println!("  skipped {tag}: {reason}");
            }
        }
        Plan::Upsert { request, dry_run } => {
            let outcome = app
                .upsert(&request, dry_run, Utc::now())
                .unwrap_or_else(|e| fail(e));
            if dry_run {
                print!("{}", outcome.rendered);
                return Ok(());
            }
            if outcome.report.replaced > 0 {
                println!("Replaced existing entry for version {}", outcome.version);
            }
            println!("Updated {feed_path} with version {}", outcome.version);
            println!("  URL: {}", request.url);
            println!("  Size: {} bytes", request.size);
        }
        Plan::Show => {
            let (doc, created) = app.load().unwrap_or_else(|e| fail(e));
            if created {
                println!("No feed at {feed_path}");
                return Ok(());
            }
            println!("{} ({} entries)", doc.title, doc.entries.len());
            for entry in &doc.entries {
                let enclosure = entry.enclosure.as_ref();
                let length = enclosure
                    .and_then(|e| e.length)
                    .map_or_else(|| "-".to_string(), |l| l.to_string());
                let url = enclosure.and_then(|e| e.url.as_deref()).unwrap_or("-");
                println!(
                    "{:<16} {:<32} {:>12}  {}",
                    entry.version,
                    entry.pub_date.as_deref().unwrap_or("-"),
                    length,
                    url
                );
            }
        }
    }

    Ok(())
}
