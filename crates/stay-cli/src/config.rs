//! `stay.toml` plus `STAY_*` environment overrides.
//!
//! ```toml
//! store_path = "~/.local/share/stay/scripts.db"
//!
//! [sync]
//! enabled       = true
//! base_url      = "https://scripts.example.com/api"
//! token         = "..."
//! interval_secs = 900
//!
//! [runtime]
//! request_timeout_secs = 30
//! ```
//!
//! Nested keys are reachable from the environment with a double
//! underscore, e.g. `STAY_SYNC__TOKEN`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use serde::Deserialize;
use stay_runtime::BridgeOptions;
use stay_sync::{DEFAULT_MAX_PAYLOAD_BYTES, SyncOptions};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StayConfig {
  pub store_path: PathBuf,
  pub sync:       SyncConfig,
  pub runtime:    RuntimeConfig,
}

impl Default for StayConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("~/.local/share/stay/scripts.db"),
      sync:       SyncConfig::default(),
      runtime:    RuntimeConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Whether `watch` pulls on a timer.
  pub enabled:           bool,
  pub base_url:          Option<String>,
  pub token:             Option<String>,
  pub interval_secs:     u64,
  pub max_payload_bytes: usize,
  /// Where the last-synced timestamps are kept between runs.
  pub ledger_path:       PathBuf,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      enabled:           false,
      base_url:          None,
      token:             None,
      interval_secs:     900,
      max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
      ledger_path:       PathBuf::from("~/.local/share/stay/sync-ledger.json"),
    }
  }
}

impl SyncConfig {
  pub fn options(&self) -> SyncOptions {
    SyncOptions { enabled: self.enabled, max_payload_bytes: self.max_payload_bytes }
  }

  pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs.max(1)) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
  /// Applied to script network requests that set no timeout.
  pub request_timeout_secs: u64,
}

impl Default for RuntimeConfig {
  fn default() -> Self { Self { request_timeout_secs: 30 } }
}

impl RuntimeConfig {
  pub fn bridge_options(&self) -> BridgeOptions {
    BridgeOptions {
      default_timeout: Duration::from_secs(self.request_timeout_secs),
      ..BridgeOptions::default()
    }
  }
}

/// Read `path` (optional) layered under the environment, with `~` expanded
/// in every path setting.
pub fn load(path: &Path) -> anyhow::Result<StayConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("STAY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let mut cfg: StayConfig = settings
    .try_deserialize()
    .context("failed to deserialise StayConfig")?;
  cfg.store_path = expand_tilde(&cfg.store_path);
  cfg.sync.ledger_path = expand_tilde(&cfg.sync.ledger_path);
  Ok(cfg)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_temp(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("stay-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).unwrap();
    path
  }

  #[test]
  fn missing_file_gives_defaults() {
    let path = std::env::temp_dir().join(format!("absent-{}.toml", uuid::Uuid::new_v4()));
    let cfg = load(&path).unwrap();
    assert!(!cfg.sync.enabled);
    assert_eq!(cfg.sync.interval_secs, 900);
    assert_eq!(cfg.sync.max_payload_bytes, DEFAULT_MAX_PAYLOAD_BYTES);
    assert_eq!(cfg.runtime.bridge_options().default_timeout, Duration::from_secs(30));
    assert!(cfg.store_path.ends_with(".local/share/stay/scripts.db"));
  }

  #[test]
  fn file_overrides_nested_tables() {
    let path = write_temp(
      r#"
store_path = "/tmp/stay-test.db"

[sync]
enabled  = true
base_url = "https://example.com/api"

[runtime]
request_timeout_secs = 5
"#,
    );
    let cfg = load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(cfg.store_path, PathBuf::from("/tmp/stay-test.db"));
    assert!(cfg.sync.enabled);
    assert_eq!(cfg.sync.base_url.as_deref(), Some("https://example.com/api"));
    assert_eq!(cfg.sync.interval_secs, 900);
    assert!(cfg.sync.options().enabled);
    assert_eq!(cfg.runtime.request_timeout_secs, 5);
  }

  #[test]
  fn tilde_expands_against_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/a/b")), PathBuf::from(home).join("a/b"));
    assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
  }
}
