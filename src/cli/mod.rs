use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::storage;

pub mod commands;

use self::commands::{CliContext, FolderArgs, NoteArgs, PrefsArgs, SearchArgs};

#[derive(Parser, Debug)]
#[command(
    name = "fnotes",
    version,
    about = "Notes organised in a folder tree, from the command line"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over FOLDERNOTES_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over FOLDERNOTES_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Quick-access counts, current selection and recent folders (default)
    Overview,
    /// Create, list, edit and organise notes
    Note(NoteArgs),
    /// Manage the folder tree and the current folder selection
    Folder(FolderArgs),
    /// Search notes by title, content or tag
    Search(SearchArgs),
    /// Show or change display preferences
    Prefs(PrefsArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let loader = ConfigLoader::discover()?;
    let config = loader.load_or_init()?;
    let store = storage::init(loader.paths(), &config.storage)?;

    let mut ctx = CliContext::open(Arc::new(config), store)?;
    let command = cli.command.unwrap_or(Commands::Overview);
    let output = commands::dispatch(&mut ctx, command)?;
    print!("{output}");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
