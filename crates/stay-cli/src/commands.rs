//! One function per subcommand. Each takes the opened store and prints its
//! result to stdout.

use std::{
  collections::BTreeSet,
  fs,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use stay_core::{
  script::{Grant, RuleKind, ScriptRecord},
  snapshot::{ImportMode, Snapshot},
  store::ScriptStore,
  version::Version,
};
use stay_runtime::{
  BridgeFactory, PageContext,
  dispatch::order_for_dispatch,
  host::{Document, HostError, StyleNodeId},
  transport::ReqwestTransport,
};
use stay_store_sqlite::SqliteStore;
use stay_sync::{HttpRemote, SyncEngine, SyncLedger, SyncMode, SyncReport};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StayConfig;

// ─── Store ───────────────────────────────────────────────────────────────────

pub fn open_store(path: &Path) -> anyhow::Result<SqliteStore> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  SqliteStore::open(path).with_context(|| format!("failed to open store at {path:?}"))
}

fn require<S: ScriptStore>(store: &S, id: Uuid) -> anyhow::Result<ScriptRecord> {
  store.get(id)?.with_context(|| format!("no script with id {id}"))
}

// ─── install ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Installed {
  pub record:   ScriptRecord,
  /// Version of the script this install replaced, if any.
  pub replaced: Option<String>,
}

/// Parse `source` and save it, updating the installed script of the same
/// name. A lower version than the installed one is refused unless `force`.
pub fn install<S: ScriptStore>(store: &S, source: &str, force: bool) -> anyhow::Result<Installed> {
  let mut draft = stay_userscript::parse(source).context("failed to parse userscript")?;

  let existing = store.list()?.into_iter().find(|m| m.name == draft.name);
  let replaced = match existing {
    Some(current) => {
      let incoming: Version = draft.version.parse()?;
      let installed: Version = current
        .version
        .parse()
        .with_context(|| format!("installed {} has an invalid version", current.name))?;
      if incoming < installed && !force {
        bail!(
          "{} {installed} is installed; refusing to downgrade to {incoming} (use --force)",
          current.name
        );
      }
      draft = draft.with_id(current.id);
      Some(current.version)
    }
    None => None,
  };

  let record = store.save(draft)?;
  Ok(Installed { record, replaced })
}

pub fn cmd_install(store: &SqliteStore, file: &Path, force: bool) -> anyhow::Result<()> {
  let source =
    fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
  let installed = install(store, &source, force)?;
  let r = &installed.record;
  match installed.replaced {
    Some(previous) if previous != r.version => {
      println!("updated {} {previous} -> {} ({})", r.name, r.version, r.id)
    }
    Some(_) => println!("reinstalled {} {} ({})", r.name, r.version, r.id),
    None => println!("installed {} {} ({})", r.name, r.version, r.id),
  }
  Ok(())
}

// ─── Inspection ──────────────────────────────────────────────────────────────

pub fn cmd_list(store: &SqliteStore) -> anyhow::Result<()> {
  for meta in store.list()? {
    println!(
      "{}  {:<32} {:<10} {:<15} {}",
      meta.id,
      meta.name,
      meta.version,
      meta.run_at.as_str(),
      meta.updated_at.to_rfc3339()
    );
  }
  Ok(())
}

pub fn cmd_show(store: &SqliteStore, id: Uuid, header_only: bool) -> anyhow::Result<()> {
  let record = require(store, id)?;
  if header_only {
    print!("{}", stay_userscript::render_header(&record.meta()));
    return Ok(());
  }
  println!("id:          {}", record.id);
  println!("name:        {}", record.name);
  println!("version:     {}", record.version);
  if !record.author.is_empty() {
    println!("author:      {}", record.author);
  }
  if !record.description.is_empty() {
    println!("description: {}", record.description);
  }
  println!("run-at:      {}", record.run_at);
  println!("grants:      {}", join(record.grants.iter()));
  for rule in &record.match_rules {
    let label = match rule.kind {
      RuleKind::Include => "include:",
      RuleKind::Exclude => "exclude:",
    };
    println!("{label:<13}{}", rule.pattern);
  }
  println!("updated:     {}", record.updated_at.to_rfc3339());
  println!();
  print!("{}", record.source_code);
  Ok(())
}

pub fn cmd_history(store: &SqliteStore, id: Uuid) -> anyhow::Result<()> {
  let history = store.history(id)?.with_context(|| format!("no script with id {id}"))?;
  for entry in history {
    match entry.changelog {
      Some(log) => println!("{}  {:<10} {log}", entry.recorded_at.to_rfc3339(), entry.version),
      None => println!("{}  {}", entry.recorded_at.to_rfc3339(), entry.version),
    }
  }
  Ok(())
}

pub fn cmd_remove(store: &SqliteStore, id: Uuid) -> anyhow::Result<()> {
  if !store.remove(id)? {
    bail!("no script with id {id}");
  }
  println!("removed {id}");
  Ok(())
}

// ─── match ───────────────────────────────────────────────────────────────────

/// A page with nothing to inject into; lets `match` build the bridges a real
/// page load would.
struct DetachedPage {
  url: String,
}

impl Document for DetachedPage {
  fn url(&self) -> &str { &self.url }

  fn append_stylesheet(&self, _css: &str) -> Result<StyleNodeId, HostError> {
    Err(HostError("no document attached".into()))
  }
}

pub fn cmd_match(store: Arc<SqliteStore>, config: &StayConfig, url: &str) -> anyhow::Result<()> {
  let scripts = order_for_dispatch(store.all_matching(url)?);
  if scripts.is_empty() {
    println!("no scripts match {url}");
    return Ok(());
  }

  let factory = BridgeFactory::new(Arc::clone(&store), config.runtime.bridge_options())
    .with_transport(Arc::new(ReqwestTransport::default()));
  let page = PageContext::new(Arc::new(DetachedPage { url: url.to_owned() }));
  for script in &scripts {
    let bridge = factory.build(script, &page);
    let present = bridge.capabilities();
    let missing: BTreeSet<Grant> = script.grants.difference(&present).copied().collect();
    print!(
      "{:<15} {} {} ({})  [{}]",
      script.run_at.as_str(),
      script.name,
      script.version,
      script.id,
      join(present.iter())
    );
    if missing.is_empty() {
      println!();
    } else {
      println!("  unavailable: {}", join(missing.iter()));
    }
  }
  Ok(())
}

fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
  let parts: Vec<String> = items.map(|i| i.to_string()).collect();
  if parts.is_empty() { "none".to_owned() } else { parts.join(", ") }
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

pub fn cmd_export(store: &SqliteStore, out: Option<&Path>) -> anyhow::Result<()> {
  let snapshot = store.export_all()?;
  let json = snapshot.to_json().context("failed to encode snapshot")?;
  match out {
    Some(path) => {
      fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
      info!(scripts = snapshot.scripts.len(), path = %path.display(), "exported");
    }
    None => println!("{json}"),
  }
  Ok(())
}

pub fn cmd_import(store: &SqliteStore, file: &Path, mode: ImportMode) -> anyhow::Result<()> {
  let raw =
    fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
  let snapshot = Snapshot::from_json(&raw)?;
  let summary = store.import_all(&snapshot, mode)?;
  println!(
    "imported {} script(s) ({mode}); kept {} newer local copies",
    summary.imported, summary.kept_local
  );
  Ok(())
}

// ─── Sync ────────────────────────────────────────────────────────────────────

type Engine = SyncEngine<SqliteStore, HttpRemote>;

fn load_ledger(path: &Path) -> anyhow::Result<SyncLedger> {
  if !path.exists() {
    return Ok(SyncLedger::new());
  }
  let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  SyncLedger::from_json(&raw).with_context(|| format!("corrupt sync ledger at {}", path.display()))
}

fn save_ledger(path: &Path, ledger: &SyncLedger) -> anyhow::Result<()> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent)?;
  }
  let json = ledger.to_json()?;
  fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn engine(store: Arc<SqliteStore>, config: &StayConfig) -> anyhow::Result<(Engine, PathBuf)> {
  let sync = &config.sync;
  let Some(base_url) = sync.base_url.clone() else {
    bail!("sync.base_url is not configured");
  };
  let remote = HttpRemote::new(base_url, sync.token.clone());
  let ledger = load_ledger(&sync.ledger_path)?;
  let engine = SyncEngine::with_ledger(store, remote, sync.options(), ledger);
  Ok((engine, sync.ledger_path.clone()))
}

fn print_report(report: &SyncReport) {
  println!(
    "{}: local +{} ~{} -{}, remote +{} ~{} -{}, {} unchanged",
    report.mode,
    report.local.created,
    report.local.updated,
    report.local.deleted,
    report.remote.created,
    report.remote.updated,
    report.remote.deleted,
    report.unchanged
  );
}

pub async fn cmd_sync(
  store: Arc<SqliteStore>,
  config: &StayConfig,
  mode: SyncMode,
) -> anyhow::Result<()> {
  let (engine, ledger_path) = engine(store, config)?;
  let result = engine.run(mode).await;
  // Remote writes that succeeded before a failure are in the ledger too.
  save_ledger(&ledger_path, &engine.ledger())?;
  let report = result?;
  print_report(&report);
  Ok(())
}

pub async fn cmd_watch(store: Arc<SqliteStore>, config: &StayConfig) -> anyhow::Result<()> {
  if !config.sync.enabled {
    bail!("sync.enabled is false; nothing to watch");
  }
  let (engine, ledger_path) = engine(store, config)?;
  let interval = config.sync.interval();
  info!(interval_secs = interval.as_secs(), "watching remote");

  let scheduler = engine.spawn_scheduler(interval);
  let mut checkpoint = tokio::time::interval(interval);
  loop {
    tokio::select! {
      signal = tokio::signal::ctrl_c() => {
        signal.context("failed to listen for ctrl-c")?;
        break;
      }
      _ = checkpoint.tick() => {
        if let Err(e) = save_ledger(&ledger_path, &engine.ledger()) {
          warn!(error = %e, "failed to persist sync ledger");
        }
      }
    }
  }

  info!("shutting down");
  engine.cancel();
  scheduler.abort();
  save_ledger(&ledger_path, &engine.ledger())
}
