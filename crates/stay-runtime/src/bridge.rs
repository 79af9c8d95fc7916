//! The Capability Bridge: what one running script can reach.
//!
//! A [`Bridge`] is a composition of optional capability modules. Each module
//! is constructed by [`BridgeFactory::build`] only when the script's grants
//! contain it and the host supplied the collaborator it needs; every
//! accessor either returns the module or a [`CapabilityError`] naming the
//! missing grant. No call reaches a collaborator through an absent module.

use std::{
  collections::BTreeSet,
  fmt,
  sync::{Arc, Weak},
  time::Duration,
};

use serde::Serialize;
use stay_core::{
  script::{Grant, MatchRule, ScriptRecord},
  store::ScriptStore,
};
use uuid::Uuid;

use crate::{
  capability::{MenuApi, NetworkApi, StorageApi, StyleApi, TabApi, ValueStore},
  error::CapabilityError,
  host::{Document, TabOpener},
  menu::{MenuRegistry, RegistryRef},
  transport::Transport,
};

// ─── Info ────────────────────────────────────────────────────────────────────

/// Identifies the runtime instance scripts run under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
  pub name:       String,
  pub version:    String,
  pub runtime_id: Uuid,
}

/// Read-only snapshot of the executing script, available without a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptInfo {
  pub script_id:   Uuid,
  pub name:        String,
  pub version:     String,
  pub grants:      BTreeSet<Grant>,
  pub match_rules: Vec<MatchRule>,
  pub runtime:     RuntimeInfo,
}

impl ScriptInfo {
  fn from_record(record: &ScriptRecord, runtime: &RuntimeInfo) -> Self {
    Self {
      script_id:   record.id,
      name:        record.name.clone(),
      version:     record.version.clone(),
      grants:      record.grants.clone(),
      match_rules: record.match_rules.clone(),
      runtime:     runtime.clone(),
    }
  }
}

// ─── Page ────────────────────────────────────────────────────────────────────

/// Everything the host supplies about one page load.
#[derive(Clone)]
pub struct PageContext {
  pub url:      String,
  pub document: Arc<dyn Document>,
  pub menu:     MenuRegistry,
}

impl PageContext {
  /// A page with a fresh, empty menu registry.
  pub fn new(document: Arc<dyn Document>) -> Self {
    Self { url: document.url().to_owned(), document, menu: MenuRegistry::new() }
  }
}

impl fmt::Debug for PageContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PageContext").field("url", &self.url).finish_non_exhaustive()
  }
}

// ─── Bridge ──────────────────────────────────────────────────────────────────

pub(crate) struct BridgeInner {
  info:    ScriptInfo,
  storage: Option<StorageApi>,
  network: Option<NetworkApi>,
  style:   Option<StyleApi>,
  menu:    Option<MenuApi>,
  tab:     Option<TabApi>,
  page:    Option<Arc<dyn Document>>,
}

/// The per-execution sandbox handed to a script engine. Cheap to clone; all
/// clones are the same bridge.
#[derive(Clone)]
pub struct Bridge {
  inner: Arc<BridgeInner>,
}

fn require<T>(module: &Option<T>, capability: Grant) -> Result<&T, CapabilityError> {
  module.as_ref().ok_or(CapabilityError { capability })
}

impl Bridge {
  pub(crate) fn from_inner(inner: Arc<BridgeInner>) -> Self { Self { inner } }

  pub fn info(&self) -> &ScriptInfo { &self.inner.info }

  pub fn script_id(&self) -> Uuid { self.inner.info.script_id }

  pub fn storage(&self) -> Result<&StorageApi, CapabilityError> {
    require(&self.inner.storage, Grant::Storage)
  }

  pub fn network(&self) -> Result<&NetworkApi, CapabilityError> {
    require(&self.inner.network, Grant::Network)
  }

  pub fn style(&self) -> Result<&StyleApi, CapabilityError> {
    require(&self.inner.style, Grant::Style)
  }

  pub fn menu(&self) -> Result<&MenuApi, CapabilityError> {
    require(&self.inner.menu, Grant::Menu)
  }

  pub fn tab(&self) -> Result<&TabApi, CapabilityError> { require(&self.inner.tab, Grant::Tab) }

  /// The raw page handle.
  pub fn page(&self) -> Result<&Arc<dyn Document>, CapabilityError> {
    require(&self.inner.page, Grant::RawPageAccess)
  }

  /// Capabilities actually present on this bridge.
  pub fn capabilities(&self) -> BTreeSet<Grant> {
    let i = &self.inner;
    [
      (Grant::Storage, i.storage.is_some()),
      (Grant::Network, i.network.is_some()),
      (Grant::Style, i.style.is_some()),
      (Grant::Menu, i.menu.is_some()),
      (Grant::Tab, i.tab.is_some()),
      (Grant::RawPageAccess, i.page.is_some()),
    ]
    .into_iter()
    .filter_map(|(g, present)| present.then_some(g))
    .collect()
  }
}

impl fmt::Debug for Bridge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Bridge")
      .field("script_id", &self.script_id())
      .field("capabilities", &self.capabilities())
      .finish()
  }
}

// ─── Factory ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BridgeOptions {
  pub runtime_name:    String,
  pub runtime_version: String,
  /// Applied to network requests that carry no timeout of their own.
  pub default_timeout: Duration,
}

impl Default for BridgeOptions {
  fn default() -> Self {
    Self {
      runtime_name:    "stay".to_owned(),
      runtime_version: env!("CARGO_PKG_VERSION").to_owned(),
      default_timeout: Duration::from_secs(30),
    }
  }
}

/// Builds one [`Bridge`] per script execution from the host's collaborators.
#[derive(Clone)]
pub struct BridgeFactory {
  values:          Arc<dyn ValueStore>,
  transport:       Option<Arc<dyn Transport>>,
  tabs:            Option<Arc<dyn TabOpener>>,
  runtime:         RuntimeInfo,
  default_timeout: Duration,
}

impl BridgeFactory {
  pub fn new<S: ScriptStore + 'static>(store: Arc<S>, options: BridgeOptions) -> Self {
    Self {
      values:          store,
      transport:       None,
      tabs:            None,
      runtime:         RuntimeInfo {
        name:       options.runtime_name,
        version:    options.runtime_version,
        runtime_id: Uuid::new_v4(),
      },
      default_timeout: options.default_timeout,
    }
  }

  pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
    self.transport = Some(transport);
    self
  }

  pub fn with_tabs(mut self, tabs: Arc<dyn TabOpener>) -> Self {
    self.tabs = Some(tabs);
    self
  }

  pub fn runtime(&self) -> &RuntimeInfo { &self.runtime }

  /// Grants this factory can honour with the collaborators it was given.
  pub fn available(&self) -> BTreeSet<Grant> {
    Grant::ALL
      .into_iter()
      .filter(|g| match g {
        Grant::Network => self.transport.is_some(),
        Grant::Tab => self.tabs.is_some(),
        _ => true,
      })
      .collect()
  }

  /// A fresh bridge for one execution of `record` on `page`.
  pub fn build(&self, record: &ScriptRecord, page: &PageContext) -> Bridge {
    let granted = |g: Grant| record.is_granted(g);
    let inner = Arc::new_cyclic(|owner: &Weak<BridgeInner>| BridgeInner {
      info:    ScriptInfo::from_record(record, &self.runtime),
      storage: granted(Grant::Storage)
        .then(|| StorageApi::new(Arc::clone(&self.values), record.id)),
      network: self
        .transport
        .as_ref()
        .filter(|_| granted(Grant::Network))
        .map(|t| NetworkApi::new(Arc::clone(t), self.default_timeout)),
      style:   granted(Grant::Style).then(|| StyleApi::new(Arc::clone(&page.document))),
      menu:    granted(Grant::Menu)
        .then(|| MenuApi::new(record.id, RegistryRef::new(&page.menu), owner.clone())),
      tab:     self
        .tabs
        .as_ref()
        .filter(|_| granted(Grant::Tab))
        .map(|t| TabApi::new(Arc::clone(t))),
      page:    granted(Grant::RawPageAccess).then(|| Arc::clone(&page.document)),
    });
    Bridge::from_inner(inner)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use serde_json::json;
  use stay_core::script::ScriptDraft;
  use stay_store_sqlite::SqliteStore;

  use super::*;
  use crate::{
    Error, ScriptFailure,
    fakes::{FakeDocument, FakeTabs, FakeTransport},
    host::OpenTabOptions,
    transport::{NetworkOutcome, NetworkRequest},
  };

  struct Harness {
    store:     Arc<SqliteStore>,
    transport: Arc<FakeTransport>,
    tabs:      Arc<FakeTabs>,
    document:  Arc<FakeDocument>,
    factory:   BridgeFactory,
    page:      PageContext,
  }

  fn harness() -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let transport = Arc::new(FakeTransport::ok());
    let tabs = Arc::new(FakeTabs::default());
    let document = Arc::new(FakeDocument::new("https://www.example.com/"));
    let factory = BridgeFactory::new(Arc::clone(&store), BridgeOptions::default())
      .with_transport(transport.clone())
      .with_tabs(tabs.clone());
    let page = PageContext::new(document.clone());
    Harness { store, transport, tabs, document, factory, page }
  }

  impl Harness {
    fn script(&self, name: &str, grants: &[Grant]) -> ScriptRecord {
      let mut draft = ScriptDraft::new(name, "1.0.0", "").include("*");
      for g in grants {
        draft = draft.grant(*g);
      }
      self.store.save(draft).unwrap()
    }

    fn bridge(&self, record: &ScriptRecord) -> Bridge { self.factory.build(record, &self.page) }
  }

  #[tokio::test]
  async fn network_without_grant_makes_no_call() {
    let h = harness();
    let record = h.script("quiet", &[Grant::Storage]);
    let bridge = h.bridge(&record);

    let err = bridge.network().map(|_| ()).unwrap_err();
    assert_eq!(err, CapabilityError { capability: Grant::Network });
    assert_eq!(h.transport.calls(), 0);
  }

  #[tokio::test]
  async fn network_delivers_response() {
    let h = harness();
    let bridge = h.bridge(&h.script("fetcher", &[Grant::Network]));

    let outcome = bridge
      .network()
      .unwrap()
      .request(NetworkRequest::get("https://api.example.com/items"))
      .await;
    assert_eq!(outcome.response().map(|r| r.status), Some(200));
    assert_eq!(h.transport.calls(), 1);
  }

  #[tokio::test]
  async fn network_failure_is_an_outcome() {
    let h = harness();
    let transport = Arc::new(FakeTransport::failing("connection refused"));
    let factory = h.factory.clone().with_transport(transport);
    let bridge = factory.build(&h.script("fetcher", &[Grant::Network]), &h.page);

    let outcome = bridge.network().unwrap().request(NetworkRequest::get("https://x/")).await;
    assert!(matches!(outcome, NetworkOutcome::Failed(e) if e.0 == "connection refused"));
  }

  #[tokio::test(start_paused = true)]
  async fn network_timeout_is_distinguished() {
    let h = harness();
    let factory = h.factory.clone().with_transport(Arc::new(FakeTransport::hanging()));
    let bridge = factory.build(&h.script("slow", &[Grant::Network]), &h.page);

    let request = NetworkRequest::get("https://slow.example.com/").timeout(Duration::from_secs(5));
    let outcome = bridge.network().unwrap().request(request).await;
    assert_eq!(outcome, NetworkOutcome::TimedOut(Duration::from_secs(5)));
  }

  #[tokio::test]
  async fn network_callback_form() {
    let h = harness();
    let bridge = h.bridge(&h.script("fetcher", &[Grant::Network]));
    let seen = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&seen);
    bridge
      .network()
      .unwrap()
      .request_with(NetworkRequest::get("https://a/"), move |o| {
        *slot.lock().unwrap() = o.response().map(|r| r.status);
      })
      .await
      .unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(200));
  }

  #[test]
  fn storage_is_namespaced_per_script() {
    let h = harness();
    let a = h.bridge(&h.script("a", &[Grant::Storage]));
    let b = h.bridge(&h.script("b", &[Grant::Storage]));

    a.storage().unwrap().set("theme", json!("dark")).unwrap();
    assert_eq!(b.storage().unwrap().get("theme", json!(null)).unwrap(), json!(null));
    b.storage().unwrap().set("theme", json!("light")).unwrap();

    assert_eq!(a.storage().unwrap().get("theme", json!(null)).unwrap(), json!("dark"));
    assert_eq!(a.storage().unwrap().list_keys().unwrap(), ["theme"]);
    assert!(a.storage().unwrap().delete("theme").unwrap());
    assert_eq!(b.storage().unwrap().get("theme", json!(null)).unwrap(), json!("light"));
  }

  #[test]
  fn storage_without_grant_differs_from_empty() {
    let h = harness();
    let bridge = h.bridge(&h.script("a", &[]));
    assert_eq!(
      bridge.storage().map(|_| ()).unwrap_err(),
      CapabilityError { capability: Grant::Storage }
    );
  }

  #[test]
  fn storage_after_removal_reports_store_error() {
    let h = harness();
    let record = h.script("a", &[Grant::Storage]);
    let bridge = h.bridge(&record);
    h.store.remove(record.id).unwrap();
    assert!(matches!(bridge.storage().unwrap().set("k", json!(1)), Err(Error::Store(_))));
  }

  #[test]
  fn style_appends_every_time() {
    let h = harness();
    let bridge = h.bridge(&h.script("styler", &[Grant::Style]));
    let css = "body { color: red }";
    let first = bridge.style().unwrap().inject(css).unwrap();
    let second = bridge.style().unwrap().inject(css).unwrap();
    assert_ne!(first, second);
    assert_eq!(h.document.sheets(), [css, css]);
  }

  #[test]
  fn tab_needs_grant_and_collaborator() {
    let h = harness();
    let bridge = h.bridge(&h.script("opener", &[Grant::Tab]));
    bridge
      .tab()
      .unwrap()
      .open("https://docs.example.com/", OpenTabOptions { active: false })
      .unwrap();
    assert_eq!(h.tabs.opened(), [("https://docs.example.com/".to_owned(), false)]);

    let no_tabs = BridgeFactory::new(Arc::clone(&h.store), BridgeOptions::default());
    assert!(!no_tabs.available().contains(&Grant::Tab));
    let bridge = no_tabs.build(&h.script("opener2", &[Grant::Tab]), &h.page);
    assert_eq!(
      bridge.tab().map(|_| ()).unwrap_err(),
      CapabilityError { capability: Grant::Tab }
    );
  }

  #[test]
  fn page_handle_requires_raw_access() {
    let h = harness();
    let plain = h.bridge(&h.script("plain", &[Grant::Style]));
    assert!(plain.page().is_err());

    let raw = h.bridge(&h.script("raw", &[Grant::RawPageAccess]));
    assert_eq!(raw.page().unwrap().url(), "https://www.example.com/");
  }

  #[test]
  fn info_is_always_available() {
    let h = harness();
    let record = h.script("info", &[]);
    let bridge = h.bridge(&record);
    let info = bridge.info();
    assert_eq!(info.script_id, record.id);
    assert_eq!(info.name, "info");
    assert_eq!(info.runtime.name, "stay");
    assert!(bridge.capabilities().is_empty());

    let json = serde_json::to_value(info).unwrap();
    assert_eq!(json["matchRules"][0]["pattern"], "*");
  }

  #[test]
  fn menu_handlers_run_with_their_own_bridge() {
    let h = harness();
    let record = h.script("menu", &[Grant::Menu, Grant::Storage]);
    let bridge = h.bridge(&record);

    let id = bridge
      .menu()
      .unwrap()
      .register("Remember", |b: &Bridge| {
        b.storage().unwrap().set("clicked", json!(true)).unwrap();
      })
      .unwrap();
    drop(bridge);

    let commands = h.page.menu.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].label, "Remember");
    assert_eq!(commands[0].script_id, record.id);

    h.page.menu.invoke(id).unwrap();
    assert_eq!(h.store.value_get(record.id, "clicked").unwrap(), Some(json!(true)));
  }

  #[test]
  fn panicking_menu_handler_is_contained() {
    let h = harness();
    let record = h.script("flaky", &[Grant::Menu]);
    let bridge = h.bridge(&record);
    let menu = bridge.menu().unwrap();
    let bad = menu.register("Explode", |_: &Bridge| panic!("handler blew up")).unwrap();
    let good = menu.register("Fine", |_: &Bridge| {}).unwrap();

    match h.page.menu.invoke(bad) {
      Err(Error::Handler(err)) => {
        assert_eq!(err.script_id, record.id);
        assert_eq!(err.cause, ScriptFailure::Panicked("handler blew up".into()));
      }
      other => panic!("expected a contained handler failure, got {other:?}"),
    }
    assert_eq!(h.page.menu.commands().len(), 2);
    h.page.menu.invoke(good).unwrap();
  }

  #[test]
  fn scripts_cannot_unregister_each_others_commands() {
    let h = harness();
    let a = h.bridge(&h.script("a", &[Grant::Menu]));
    let b = h.bridge(&h.script("b", &[Grant::Menu]));

    let id = a.menu().unwrap().register("A", |_: &Bridge| {}).unwrap();
    assert!(!b.menu().unwrap().unregister(id).unwrap());
    assert_eq!(h.page.menu.commands().len(), 1);
    assert!(a.menu().unwrap().unregister(id).unwrap());
    assert!(h.page.menu.commands().is_empty());
    assert!(matches!(h.page.menu.invoke(id), Err(Error::UnknownCommand(_))));
  }

  #[test]
  fn menu_registration_after_page_close_fails() {
    let h = harness();
    let record = h.script("late", &[Grant::Menu]);
    let page = PageContext::new(h.document.clone());
    let bridge = h.factory.build(&record, &page);
    drop(page);
    assert!(matches!(
      bridge.menu().unwrap().register("x", |_: &Bridge| {}),
      Err(Error::PageClosed)
    ));
  }
}
