use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use feedmerge::config::Config;
use feedmerge::merge::{FeedMerger, MergeError};
use feedmerge::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/feedmerge/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedmerge"))
}

#[derive(Parser, Debug)]
#[command(name = "feedmerge", about = "Merge duplicate feed records")]
struct Args {
    /// Config file (default: ~/.config/feedmerge/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file, overrides the config file
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge the copy feed into the master feed and delete the copy
    Merge {
        /// ID of the feed that survives
        master_id: i64,
        /// ID of the duplicate feed to absorb
        copy_id: i64,
    },
    /// List feeds with their alternate URLs
    Feeds,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // RUST_LOG wins over the config file
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = match &args.db {
        Some(path) => path.clone(),
        None => {
            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)
                    .context("Failed to create config directory")?;
            }
            config.database_path(&config_dir)
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    match args.command {
        Command::Merge { master_id, copy_id } => {
            let report = match FeedMerger::new(&db, &db).merge(master_id, copy_id).await {
                Ok(report) => report,
                Err(e @ MergeError::Failed { stage, .. }) => {
                    tracing::error!(error = %e, stage = %stage, "Merge stopped part way, already committed steps are kept");
                    let hint = if stage.is_resumable() {
                        format!("Merge incomplete during {stage}; re-run the same merge to finish it")
                    } else {
                        format!(
                            "Merge incomplete during {stage}; the copy feed may already be deleted, \
                             so re-running will not help. Check that copy {copy_id} is gone and set \
                             the master's feed URLs by hand (the merged list is in the log)"
                        )
                    };
                    return Err(e).context(hint);
                }
                Err(e) => return Err(e.into()),
            };

            println!(
                "Merged {} into feed {} ({})",
                report.copy_url, report.master.id, report.master.url
            );
            println!(
                "  follows: {} found, {} moved, {} already on master",
                report.follows.found, report.follows.retargeted, report.follows.superseded
            );
            println!(
                "  pins: {} moved, {} dropped; {} articles removed",
                report.content.moved, report.content.dropped, report.content.deleted
            );
            println!("  feed urls: {}", report.master.feed_urls.join(", "));
        }
        Command::Feeds => {
            let feeds = db.list_feeds().await.context("Failed to load feeds")?;
            if feeds.is_empty() {
                println!("No feeds in {}", db_path.display());
            }
            for feed in feeds {
                println!("{:>6}  [{}] {}  {}", feed.id, feed.kind, feed.title, feed.url);
                for url in &feed.feed_urls {
                    println!("        {}", url);
                }
            }
        }
    }

    Ok(())
}
