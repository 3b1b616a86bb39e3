use clap::{Parser, Subcommand};
use cursor_chat_export::catalog::{self, ViewerState};
use cursor_chat_export::exporter::{self, ExportFormat, RenderMode};
use cursor_chat_export::importer::RecordSource;
use cursor_chat_export::utils::{self, DEFAULT_KEY_PREFIX, LoadConfig};
use cursor_chat_export::{Catalog, CatalogEntry};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Browse, search and export Cursor AI chat history.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to Cursor's state.vscdb.
    /// Auto-detected if omitted.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Only load keys starting with this prefix. Pass "" to load every key.
    /// Defaults to "composerData:" if not set in config.
    #[arg(long, global = true, value_name = "PREFIX")]
    prefix: Option<String>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/cursor-chat-export/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read the live database instead of a temporary snapshot.
    #[arg(long, global = true)]
    no_snapshot: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List records, newest first.
    List {
        /// Show at most this many records.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print a single record.
    Show {
        /// Record id (key without prefix) or full key.
        id: String,

        #[arg(short, long, value_enum, default_value_t = RenderMode::Pretty)]
        mode: RenderMode,
    },

    /// Print the first record whose id, title or content contains TERM.
    Search {
        term: String,

        #[arg(short, long, value_enum, default_value_t = RenderMode::Pretty)]
        mode: RenderMode,
    },

    /// Write a record to a .json or .txt file.
    Export {
        /// Record id (key without prefix) or full key.
        id: String,

        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Output file. Defaults to cursor_chat_<id>.<ext> in the current directory.
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Count keys per prefix, to find which prefix holds the chats.
    Analyze,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    db_path: Option<PathBuf>,
    key_prefix: Option<String>,
    snapshot: Option<bool>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        utils::default_config_path().filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("cursor_chat_export=info"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| eyre!(err))?;

    Ok(())
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Merge CLI, config file and defaults
    let config = resolve_config(&cli, file_cfg, utils::default_db_path)?;

    run(cli.command, &config)
}

/// CLI flags win over the config file, which wins over built-in defaults.
fn resolve_config(
    cli: &Cli,
    file_cfg: FileConfig,
    default_db: impl FnOnce() -> Option<PathBuf>,
) -> Result<LoadConfig> {
    let db_path = cli
        .db
        .clone()
        .or(file_cfg.db_path)
        .or_else(default_db)
        .ok_or_else(|| {
            eyre!("Could not determine database path.\nUse --db to specify manually, or set db_path in config.toml.")
        })?;

    let key_prefix = cli
        .prefix
        .clone()
        .or(file_cfg.key_prefix)
        .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());

    Ok(LoadConfig {
        db_path,
        key_prefix,
        snapshot: !cli.no_snapshot && file_cfg.snapshot.unwrap_or(true),
    })
}

fn run(command: Command, config: &LoadConfig) -> Result<()> {
    match command {
        Command::Analyze => {
            let keys = config
                .store()
                .read_keys()
                .wrap_err("Failed to analyze database")?;
            let counts = catalog::analyze_prefixes(&keys);
            print!("{}", catalog::prefix_report(keys.len(), &counts));
        }
        Command::List { limit } => {
            let catalog = load_catalog(config)?;
            for entry in catalog.entries().iter().take(limit.unwrap_or(usize::MAX)) {
                let s = &entry.summary;
                println!("{}\t{}\t{}", s.id, s.display_date, s.display_title);
            }
        }
        Command::Show { id, mode } => {
            let catalog = load_catalog(config)?;
            let entry = lookup(&catalog, &id)?;
            println!("{}", exporter::render(&entry.record, mode));
        }
        Command::Search { term, mode } => {
            let mut state = ViewerState::new();
            let catalog = state
                .reload(&config.store(), &config.key_prefix)
                .wrap_err("Failed to load chat records")?;
            report_load(catalog);

            state.search(&term);
            match state.selected() {
                Some(entry) => {
                    eprintln!("Match: {}", entry.record.raw_key);
                    println!("{}", exporter::render(&entry.record, mode));
                }
                None => eprintln!("No matches found."),
            }
        }
        Command::Export { id, format, out } => {
            let catalog = load_catalog(config)?;
            let entry = lookup(&catalog, &id)?;
            let payload = exporter::export(&entry.record, format)
                .wrap_err_with(|| format!("Failed to export {}", entry.record.raw_key))?;
            let path = out.unwrap_or_else(|| {
                PathBuf::from(exporter::default_file_name(&entry.record.id, format))
            });
            exporter::write_export(&path, &payload)?;
            eprintln!("Exported to {}", path.display());
        }
    }

    Ok(())
}

fn load_catalog(config: &LoadConfig) -> Result<Catalog> {
    let catalog = catalog::load(&config.store(), &config.key_prefix)
        .wrap_err("Failed to load chat records")?;
    report_load(&catalog);
    Ok(catalog)
}

fn report_load(catalog: &Catalog) {
    let mut status = format!("Loaded {} chat records", catalog.len());
    if catalog.skipped() > 0 {
        status.push_str(&format!(" ({} skipped)", catalog.skipped()));
    }
    eprintln!("{}", status);
}

fn lookup<'a>(catalog: &'a Catalog, id: &str) -> Result<&'a CatalogEntry> {
    catalog
        .lookup(id)
        .ok_or_else(|| eyre!("No record with id or key {:?}", id))
}
