use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::Confirm;
use std::path::PathBuf;
use tidal::registry::{UploadFailure, ViewChanges};
use tidal::{Config, FileRecord, FileRegistry, SearchOutcome, UploadFile};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Upload, list, search and delete files on a tidal backend.
#[derive(Debug, Parser)]
#[command(name = "tidal", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Work from the local cache only
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List files, newest first
    List,
    /// Search file names and contents
    Search {
        query: String,
        /// Let the backend search names and tags instead
        #[arg(long)]
        remote: bool,
    },
    /// Ask the backend a natural-language question about your files
    Ask { query: String },
    /// Upload one or more files
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete a file by id
    Delete {
        id: String,
        /// Don't ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Print the transcript of an audio or video file
    Transcript { id: String },
    /// Re-list periodically and report new files and tags
    Watch,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.offline {
        config.offline = true;
    }
    let registry = FileRegistry::from_config(&config).context("Failed to open file registry")?;

    match cli.command {
        Command::List => {
            let files = registry.list_files().await;
            if files.is_empty() {
                println!("{}", style("No files saved yet.").dim());
            }
            for file in &files {
                print_record(file);
            }
        }
        Command::Search { query, remote } => {
            let outcome = if remote {
                registry.search_remote(&query).await?
            } else {
                registry.search(&query).await
            };
            print_outcome(&outcome);
        }
        Command::Ask { query } => print_outcome(&registry.ask(&query).await?),
        Command::Upload { paths } => upload(&registry, &paths).await,
        Command::Delete { id, yes } => {
            let record = lookup(&registry, &id).await?;
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("Delete \"{}\"?", record.name))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("Cancelled.");
                return Ok(());
            }
            registry
                .delete_file(&record)
                .await
                .with_context(|| format!("Failed to delete \"{}\"", record.name))?;
            println!("Deleted {}.", style(&record.name).bold());
        }
        Command::Transcript { id } => {
            let record = lookup(&registry, &id).await?;
            match registry.transcript(&record).await? {
                Some(text) => println!("{text}"),
                None => println!("{}", style("Transcript not available yet.").dim()),
            }
        }
        Command::Watch => watch(&registry, &config).await?,
    }
    Ok(())
}

async fn lookup(registry: &FileRegistry, id: &str) -> Result<FileRecord> {
    registry.list_files().await;
    registry.find(id).ok_or_else(|| anyhow!("No file with id {id}"))
}

/// Paths that can't be read count as failed uploads; the rest still go.
async fn upload(registry: &FileRegistry, paths: &[PathBuf]) {
    let mut files = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();
    for path in paths {
        match UploadFile::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => unreadable.push(UploadFailure {
                name: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    let mut report = registry.upload_files(&files).await;
    report.failures.extend(unreadable);

    for failure in &report.failures {
        eprintln!(
            "{} {}: {}",
            style("Upload failed for").red(),
            failure.name,
            failure.message
        );
    }
    let target = if registry.is_offline() { "local cache" } else { "server" };
    println!("Uploaded {} file(s) to {target}.", report.succeeded);
}

async fn watch(registry: &FileRegistry, config: &Config) -> Result<()> {
    let mut ticker = tokio::time::interval(config.refresh_interval());
    info!(every = ?config.refresh_interval(), "watching for changes");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let changes = registry.refresh().await;
                print_changes(registry, &changes);
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                return Ok(());
            }
        }
    }
}

fn print_changes(registry: &FileRegistry, changes: &ViewChanges) {
    let name = |id: &String| registry.find(id).map(|r| r.name).unwrap_or_else(|| id.clone());
    for id in &changes.added {
        println!("{} {}", style("+").green(), name(id));
    }
    for id in &changes.removed {
        println!("{} {}", style("-").red(), id);
    }
    for id in &changes.retagged {
        let tags = registry.find(id).map(|r| r.tags.join(", ")).unwrap_or_default();
        println!("{} {} [{}]", style("~").yellow(), name(id), tags);
    }
}

fn print_outcome(outcome: &SearchOutcome) {
    match outcome {
        SearchOutcome::Prompt => println!("{}", style("Type to search filenames and file contents.").dim()),
        SearchOutcome::NoMatches => println!("{}", style("No matches found.").dim()),
        SearchOutcome::Matches(records) => records.iter().for_each(print_record),
    }
}

fn print_record(record: &FileRecord) {
    let created = DateTime::from_timestamp_millis(record.created)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    let mut line = format!("{}  {}  {}", style(&record.name).bold(), style(created).dim(), record.id);
    if let Some(size) = record.size {
        line.push_str(&format!("  {size} B"));
    }
    if !record.tags.is_empty() {
        line.push_str(&format!("  [{}]", record.tags.join(", ")));
    }
    println!("{line}");
}
