//! Injection Dispatcher.
//!
//! One [`PageDispatch`] per page-load event walks
//! `Idle → Matching → Ordering → Executing(i) → Done`:
//!
//! ```text
//! store.all_matching(url)          (newest first)
//!   └─ order_for_dispatch()        stable partition by run_at
//!        └─ for each script:
//!             cancelled?  → stop
//!             factory.build()      fresh bridge
//!             engine.execute()     failures and panics contained
//! ```
//!
//! Page dispatches share nothing mutable; the store is the only common
//! resource and is reached through its trait.

use std::{
  any::Any,
  future::Future,
  panic::AssertUnwindSafe,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
};

use futures::FutureExt as _;
use stay_core::{
  script::{RunAt, ScriptRecord},
  store::ScriptStore,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  bridge::{Bridge, BridgeFactory, PageContext},
  error::{ScriptExecutionError, ScriptFailure},
};

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Runs a script body against its bridge. How the body is evaluated is the
/// engine's business; the dispatcher only sees success or failure.
pub trait ScriptEngine: Send + Sync {
  fn execute<'a>(
    &'a self,
    script: &'a ScriptRecord,
    bridge: Bridge,
  ) -> impl Future<Output = Result<(), ScriptFailure>> + Send + 'a;
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
  Idle,
  Matching,
  Ordering,
  /// Running the script at this index of the ordered list.
  Executing(usize),
  Done,
}

struct Shared {
  cancelled: AtomicBool,
  state:     Mutex<DispatchState>,
}

/// Observes and cancels one page dispatch from outside it.
#[derive(Clone)]
pub struct DispatchHandle {
  shared: Arc<Shared>,
}

impl DispatchHandle {
  fn new() -> Self {
    Self {
      shared: Arc::new(Shared {
        cancelled: AtomicBool::new(false),
        state:     Mutex::new(DispatchState::Idle),
      }),
    }
  }

  /// Stop before the next script starts. A script already running is left
  /// to finish.
  pub fn cancel(&self) { self.shared.cancelled.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool { self.shared.cancelled.load(Ordering::SeqCst) }

  pub fn state(&self) -> DispatchState {
    *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set(&self, state: DispatchState) {
    *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
  pub script_id: Uuid,
  pub name:      String,
  pub run_at:    RunAt,
  pub result:    Result<(), ScriptExecutionError>,
}

/// Everything that happened during one page dispatch, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
  pub url:       String,
  pub outcomes:  Vec<ScriptOutcome>,
  /// Cancelled before every matched script had run.
  pub cancelled: bool,
}

impl DispatchReport {
  pub fn failures(&self) -> impl Iterator<Item = &ScriptExecutionError> {
    self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
  }

  pub fn succeeded(&self) -> usize { self.outcomes.iter().filter(|o| o.result.is_ok()).count() }
}

// ─── Ordering ────────────────────────────────────────────────────────────────

/// Group by `run_at` in page-construction order. The sort is stable, so each
/// group keeps the store's newest-first order.
pub fn order_for_dispatch(mut scripts: Vec<ScriptRecord>) -> Vec<ScriptRecord> {
  scripts.sort_by_key(|s| s.run_at);
  scripts
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_owned()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_owned()
  }
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

pub struct Dispatcher<S, E> {
  store:   Arc<S>,
  engine:  Arc<E>,
  factory: BridgeFactory,
}

impl<S, E> Dispatcher<S, E>
where
  S: ScriptStore + 'static,
  E: ScriptEngine,
{
  pub fn new(store: Arc<S>, engine: Arc<E>, factory: BridgeFactory) -> Self {
    Self { store, engine, factory }
  }

  /// Start a dispatch for `page`; nothing runs until [`PageDispatch::run`].
  pub fn begin(&self, page: PageContext) -> PageDispatch<'_, S, E> {
    PageDispatch { dispatcher: self, page, handle: DispatchHandle::new() }
  }

  /// Match, order and execute every applicable script for `page`.
  pub async fn dispatch(&self, page: PageContext) -> Result<DispatchReport> {
    self.begin(page).run().await
  }
}

/// One page-load's dispatch. Consumed by [`PageDispatch::run`].
pub struct PageDispatch<'d, S, E> {
  dispatcher: &'d Dispatcher<S, E>,
  page:       PageContext,
  handle:     DispatchHandle,
}

impl<S, E> PageDispatch<'_, S, E>
where
  S: ScriptStore + 'static,
  E: ScriptEngine,
{
  pub fn handle(&self) -> DispatchHandle { self.handle.clone() }

  pub fn state(&self) -> DispatchState { self.handle.state() }

  /// Match, order and execute. Cancellation is checked before every
  /// script, so a cancel skips the rest of the current `run_at` group as
  /// well as the later groups; a script that has started always finishes.
  pub async fn run(self) -> Result<DispatchReport> {
    let Self { dispatcher, page, handle } = self;
    let url = page.url.clone();

    handle.set(DispatchState::Matching);
    let matched = match dispatcher.store.all_matching(&url) {
      Ok(m) => m,
      Err(e) => {
        handle.set(DispatchState::Done);
        return Err(Error::store(e));
      }
    };
    debug!(%url, matched = matched.len(), "matched scripts for page");

    handle.set(DispatchState::Ordering);
    let ordered = order_for_dispatch(matched);

    let mut outcomes = Vec::with_capacity(ordered.len());
    let mut cancelled = false;
    for (i, script) in ordered.iter().enumerate() {
      if handle.is_cancelled() {
        cancelled = true;
        debug!(%url, remaining = ordered.len() - i, "dispatch cancelled");
        break;
      }
      handle.set(DispatchState::Executing(i));

      let bridge = dispatcher.factory.build(script, &page);
      let engine = &dispatcher.engine;
      let run = async move { engine.execute(script, bridge).await };
      let result = match AssertUnwindSafe(run).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ScriptFailure::Panicked(panic_message(payload.as_ref()))),
      };

      let result = result.map_err(|cause| {
        let err = ScriptExecutionError { script_id: script.id, cause };
        warn!(script_id = %script.id, name = %script.name, error = %err, "script failed");
        err
      });
      outcomes.push(ScriptOutcome {
        script_id: script.id,
        name: script.name.clone(),
        run_at: script.run_at,
        result,
      });
    }

    handle.set(DispatchState::Done);
    let report = DispatchReport { url, outcomes, cancelled };
    info!(
      url = %report.url,
      ran = report.outcomes.len(),
      failed = report.failures().count(),
      cancelled = report.cancelled,
      "page dispatch finished"
    );
    Ok(report)
  }
}
