//! `stay`: host process for the Stay userscript runtime.
//!
//! Reads `stay.toml` (or the path given with `--config`), opens the SQLite
//! script store and runs one subcommand against it.
//!
//! # Usage
//!
//! ```text
//! stay install tidy-tabs.user.js
//! stay match https://example.com/inbox
//! stay export --out backup.json
//! stay sync both
//! ```

mod commands;
mod config;

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use stay_core::snapshot::ImportMode;
use stay_sync::SyncMode;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Stay userscript manager")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "stay.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Install a userscript file, or update the installed script of that name.
  Install {
    file:  PathBuf,
    /// Allow replacing a newer installed version.
    #[arg(long)]
    force: bool,
  },
  /// List installed scripts, most recently updated first.
  List,
  /// Print one script's metadata and source.
  Show {
    id:     Uuid,
    /// Print only the canonical header block.
    #[arg(long)]
    header: bool,
  },
  /// Print a script's version history, oldest first.
  History { id: Uuid },
  /// Uninstall a script and drop its stored values.
  Remove { id: Uuid },
  /// Show which scripts would run on a URL, in execution order.
  Match { url: String },
  /// Write every script and its stored values as a JSON snapshot.
  Export {
    /// Output file; stdout when omitted.
    #[arg(short, long)]
    out: Option<PathBuf>,
  },
  /// Load a snapshot written by `export`.
  Import {
    file: PathBuf,
    #[arg(long, default_value = "replace")]
    mode: ImportMode,
  },
  /// Reconcile with the configured remote once.
  Sync {
    #[arg(default_value = "pull")]
    mode: SyncMode,
  },
  /// Pull from the remote on the configured interval until interrupted.
  Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = config::load(&cli.config)?;
  let store = Arc::new(commands::open_store(&cfg.store_path)?);

  match cli.command {
    Command::Install { file, force } => commands::cmd_install(&store, &file, force),
    Command::List => commands::cmd_list(&store),
    Command::Show { id, header } => commands::cmd_show(&store, id, header),
    Command::History { id } => commands::cmd_history(&store, id),
    Command::Remove { id } => commands::cmd_remove(&store, id),
    Command::Match { url } => commands::cmd_match(store, &cfg, &url),
    Command::Export { out } => commands::cmd_export(&store, out.as_deref()),
    Command::Import { file, mode } => commands::cmd_import(&store, &file, mode),
    Command::Sync { mode } => commands::cmd_sync(store, &cfg, mode).await,
    Command::Watch => commands::cmd_watch(store, &cfg).await,
  }
}
