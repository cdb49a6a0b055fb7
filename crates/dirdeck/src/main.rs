//! Dirdeck CLI
//!
//! Command-line front end for the directory engine.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use dirdeck::config::{default_config_path, Config};
use dirdeck::{
    naming, BatchReport, Collaborators, DirectoryHandle, DirectoryLister, Entry, EntryRecord,
    SortKey, StateOptions,
};

/// Dirdeck - list and manage the contents of a directory.
#[derive(Parser, Debug)]
#[command(name = "dirdeck")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to operate in (defaults to the configured start directory)
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List a directory
    Ls {
        /// Directory to list (defaults to the working directory)
        dir: Option<PathBuf>,

        /// Sort key: name, date or type
        #[arg(long, short)]
        sort: Option<SortKey>,

        /// Sort in descending order
        #[arg(long)]
        desc: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Create a folder
    Mkdir {
        /// Folder name
        name: String,
    },

    /// Create an empty text file under a free name
    Touch {
        /// File name
        name: String,
    },

    /// Rename an entry
    Mv {
        /// Entry to rename
        item: PathBuf,

        /// New name (a single path component)
        new_name: String,
    },

    /// Delete entries
    Rm {
        /// Entries to delete
        #[arg(required = true)]
        items: Vec<PathBuf>,
    },

    /// Copy files or folders into the working directory
    Import {
        /// Sources to copy
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// Print the collision-free name for a path
    Resolve {
        /// Desired path
        path: PathBuf,
    },

    /// Inspect or write configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write the effective configuration to the configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing; the guard flushes the log file on drop
    let _guard = init_tracing(cli.verbose, &config)?;
    tracing::debug!("Using config file: {:?}", config_path);

    let working_dir = cli
        .directory
        .clone()
        .unwrap_or_else(|| config.browser.start_directory.clone());

    match cli.command {
        Commands::Ls {
            dir,
            sort,
            desc,
            json,
        } => {
            let dir = dir.map(|d| working_dir.join(d)).unwrap_or(working_dir);
            let key = sort.unwrap_or(config.browser.sort_key);
            let ascending = config.browser.sort_ascending && !desc;

            let options = StateOptions::from_config(&config).with_sort(key, ascending);
            let handle = open(StateOptions { directory: dir, ..options }).await?;
            let snapshot = handle.snapshot();

            if json {
                let records: Vec<EntryRecord> =
                    snapshot.entries.iter().map(Entry::to_record).collect();
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if snapshot.entries.is_empty() {
                println!("{} is empty.", snapshot.current_directory.display());
            } else {
                for entry in &snapshot.entries {
                    print_entry(entry);
                }
            }
        }
        Commands::Mkdir { name } => {
            let handle = open_in(&config, working_dir).await?;
            match handle.create_folder(&name).await? {
                Some(path) => println!("Created {}", path.display()),
                None => bail!("Folder name is empty"),
            }
        }
        Commands::Touch { name } => {
            let handle = open_in(&config, working_dir).await?;
            match handle.create_text_file(&name).await? {
                Some(path) => println!("Created {}", path.display()),
                None => bail!("File name is empty"),
            }
        }
        Commands::Mv { item, new_name } => {
            let handle = open_in(&config, working_dir.clone()).await?;
            let path = working_dir.join(&item);
            let entry = DirectoryLister::default()
                .entry_for(&path)
                .with_context(|| format!("Cannot rename {}", item.display()))?;

            match handle.rename(&entry, &new_name).await? {
                Some(to) => println!("Renamed {} to {}", entry.name, to.display()),
                None => bail!("New name is empty"),
            }
        }
        Commands::Rm { items } => {
            let handle = open_in(&config, working_dir.clone()).await?;
            let lister = DirectoryLister::default();
            let entries: Vec<Entry> = items
                .iter()
                .map(|item| {
                    let path = working_dir.join(item);
                    // Missing items still go through the batch so they are reported.
                    lister
                        .entry_for(&path)
                        .unwrap_or_else(|_| Entry::new(path, 0, None, false))
                })
                .collect();

            let report = handle.delete_many(entries).wait().await;
            finish_batch(&report, "Deleted")?;
        }
        Commands::Import { sources } => {
            let handle = open_in(&config, working_dir).await?;
            let sources = sources
                .iter()
                .map(std::path::absolute)
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to resolve import sources")?;

            let report = handle.import_many(sources).wait().await;
            finish_batch(&report, "Imported")?;
        }
        Commands::Resolve { path } => {
            let desired = working_dir.join(path);
            let resolved = naming::resolve(&desired);
            println!("{}", resolved.display());
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => print!("{}", config.to_toml()?),
            ConfigCommands::Path => println!("{}", config_path.display()),
            ConfigCommands::Init { force } => {
                if config_path.exists() && !force {
                    bail!(
                        "{} already exists; pass --force to overwrite it",
                        config_path.display()
                    );
                }
                config.save(&config_path)?;
                println!("Wrote {}", config_path.display());
            }
        },
    }

    Ok(())
}

/// Install the global subscriber.
///
/// Logs go to stderr, or to `general.log_file` when set. `RUST_LOG` takes
/// precedence over the configured level.
fn init_tracing(verbose: bool, config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.general.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(log_file) = &config.general.log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let file_name = log_file
        .file_name()
        .with_context(|| format!("log_file is not a file path: {}", log_file.display()))?;
    let log_dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::never(log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(Some(guard))
}

async fn open(options: StateOptions) -> anyhow::Result<DirectoryHandle> {
    let directory = options.directory.clone();
    DirectoryHandle::open(options, Collaborators::default())
        .await
        .with_context(|| format!("Failed to open {}", directory.display()))
}

async fn open_in(config: &Config, directory: PathBuf) -> anyhow::Result<DirectoryHandle> {
    open(StateOptions {
        directory,
        ..StateOptions::from_config(config)
    })
    .await
}

fn print_entry(entry: &Entry) {
    let size = if entry.is_directory {
        "-".to_string()
    } else {
        entry.size.to_string()
    };
    let suffix = if entry.is_directory { "/" } else { "" };
    println!("{:<10} {:>12}  {}{}", entry.type_label(), size, entry.name, suffix);
}

fn finish_batch(report: &BatchReport, verb: &str) -> anyhow::Result<()> {
    for path in &report.succeeded {
        println!("{} {}", verb, path.display());
    }

    if let Some(summary) = report.summary() {
        for failure in &report.failures {
            eprintln!("  {}", failure);
        }
        bail!(summary);
    }

    Ok(())
}
