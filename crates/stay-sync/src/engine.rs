//! [`SyncEngine`]: runs reconciliation passes, one at a time.
//!
//! A pass is:
//!
//! 1. load local records, list remote records
//! 2. [`plan`] against the ledger
//! 3. preflight every outgoing payload against the size limit
//! 4. push remote writes in order, stopping at the first failure
//! 5. apply every pulled change locally in one atomic batch
//! 6. advance the ledger
//!
//! The local store is only written in step 5, so any failure before it
//! leaves local state untouched.

use std::{
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use futures::{
  FutureExt as _,
  future::{BoxFuture, Shared},
};
use stay_core::{
  script::ScriptRecord,
  store::{ChangeSet, ScriptStore},
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result, SyncMode, SyncOptions, SyncReport,
  error::SyncPhase,
  ledger::SyncLedger,
  plan::{PullAction, PushAction, plan},
  remote::RemoteScripts,
};

type InFlight = Shared<BoxFuture<'static, Result<SyncReport>>>;

struct Inner<S, R> {
  store:     Arc<S>,
  remote:    R,
  options:   SyncOptions,
  ledger:    Mutex<SyncLedger>,
  in_flight: Mutex<Option<InFlight>>,
  cancelled: AtomicBool,
  enabled:   AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

/// Reconciles a local [`ScriptStore`] with a [`RemoteScripts`] collection.
/// Cheap to clone; clones share one engine.
pub struct SyncEngine<S, R> {
  inner: Arc<Inner<S, R>>,
}

impl<S, R> Clone for SyncEngine<S, R> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<S, R> SyncEngine<S, R>
where
  S: ScriptStore + 'static,
  R: RemoteScripts + 'static,
{
  pub fn new(store: Arc<S>, remote: R, options: SyncOptions) -> Self {
    Self::with_ledger(store, remote, options, SyncLedger::new())
  }

  /// Resume from a ledger persisted by an earlier run.
  pub fn with_ledger(store: Arc<S>, remote: R, options: SyncOptions, ledger: SyncLedger) -> Self {
    let enabled = options.enabled;
    Self {
      inner: Arc::new(Inner {
        store,
        remote,
        options,
        ledger: Mutex::new(ledger),
        in_flight: Mutex::new(None),
        cancelled: AtomicBool::new(false),
        enabled: AtomicBool::new(enabled),
      }),
    }
  }

  /// A copy of the current ledger, for the host to persist.
  pub fn ledger(&self) -> SyncLedger { lock(&self.inner.ledger).clone() }

  pub fn is_enabled(&self) -> bool { self.inner.enabled.load(Ordering::SeqCst) }

  /// Turn the recurring pull on or off. On-demand passes run either way.
  pub fn set_enabled(&self, enabled: bool) { self.inner.enabled.store(enabled, Ordering::SeqCst); }

  /// Stop the in-flight pass before its next remote call.
  pub fn cancel(&self) {
    if lock(&self.inner.in_flight).is_some() {
      info!("sync cancellation requested");
      self.inner.cancelled.store(true, Ordering::SeqCst);
    }
  }

  pub fn is_running(&self) -> bool { lock(&self.inner.in_flight).is_some() }

  pub async fn pull(&self) -> Result<SyncReport> { self.run(SyncMode::Pull).await }

  pub async fn push(&self) -> Result<SyncReport> { self.run(SyncMode::Push).await }

  pub async fn sync(&self) -> Result<SyncReport> { self.run(SyncMode::Both).await }

  /// Run a pass, or join the one already in flight and share its result.
  pub async fn run(&self, mode: SyncMode) -> Result<SyncReport> {
    let pass = {
      let mut slot = lock(&self.inner.in_flight);
      match slot.as_ref() {
        Some(pass) => {
          debug!(%mode, "joining in-flight sync");
          pass.clone()
        }
        None => {
          self.inner.cancelled.store(false, Ordering::SeqCst);
          let inner = Arc::clone(&self.inner);
          let pass = async move {
            let result = inner.reconcile(mode).await;
            lock(&inner.in_flight).take();
            result
          }
          .boxed()
          .shared();
          *slot = Some(pass.clone());
          pass
        }
      }
    };
    pass.await
  }

  /// Pull on every tick of `period` while the engine is enabled.
  pub fn spawn_scheduler(&self, period: Duration) -> JoinHandle<()> {
    let engine = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        if !engine.is_enabled() {
          continue;
        }
        match engine.pull().await {
          Ok(report) => debug!(?report, "scheduled pull finished"),
          Err(e) => warn!(error = %e, "scheduled pull failed"),
        }
      }
    })
  }
}

impl<S, R> Inner<S, R>
where
  S: ScriptStore + 'static,
  R: RemoteScripts + 'static,
{
  fn check_cancelled(&self, applied: &[Uuid]) -> Result<()> {
    if self.cancelled.load(Ordering::SeqCst) {
      return Err(Error::Cancelled { applied: applied.to_vec() });
    }
    Ok(())
  }

  fn preflight(&self, record: &ScriptRecord) -> Result<()> {
    let size = serde_json::to_vec(record)
      .map_err(|e| Error::sync(SyncPhase::Preflight, e, Vec::new()))?
      .len();
    let limit = self.options.max_payload_bytes;
    if size > limit {
      return Err(Error::PayloadTooLarge { id: record.id, size, limit });
    }
    Ok(())
  }

  async fn push_one(&self, action: &PushAction) -> Result<(), R::Error> {
    match action {
      PushAction::Create(record) => self.remote.create(record).await,
      PushAction::Update(record) => self.remote.update(record.id, record).await,
      PushAction::Delete(id) => self.remote.delete(*id).await,
    }
  }

  async fn reconcile(&self, mode: SyncMode) -> Result<SyncReport> {
    debug!(%mode, "sync pass starting");
    let local = self
      .store
      .records()
      .map_err(|e| Error::sync(SyncPhase::Load, e, Vec::new()))?;

    self.check_cancelled(&[])?;
    let remote = self
      .remote
      .list()
      .await
      .map_err(|e| Error::sync(SyncPhase::List, e, Vec::new()))?;

    let plan = {
      let ledger = lock(&self.ledger);
      plan(local, remote, &ledger, mode)
    };
    debug!(
      push = plan.push.len(),
      pull = plan.pull.len(),
      in_sync = plan.in_sync.len(),
      "sync plan ready"
    );

    for action in &plan.push {
      if let PushAction::Create(record) | PushAction::Update(record) = action {
        self.preflight(record)?;
      }
    }

    let mut report = SyncReport { mode, unchanged: plan.in_sync.len(), ..SyncReport::default() };
    let mut applied = Vec::new();
    for action in &plan.push {
      self.check_cancelled(&applied)?;
      if let Err(e) = self.push_one(action).await {
        warn!(script_id = %action.id(), error = %e, "remote write failed");
        return Err(Error::sync(SyncPhase::Push, e, applied));
      }
      debug!(script_id = %action.id(), ?action, "pushed");
      applied.push(action.id());

      let mut ledger = lock(&self.ledger);
      match action {
        PushAction::Create(r) => {
          ledger.record(r.id, r.updated_at);
          report.remote.created += 1;
        }
        PushAction::Update(r) => {
          ledger.record(r.id, r.updated_at);
          report.remote.updated += 1;
        }
        PushAction::Delete(id) => {
          ledger.forget(*id);
          report.remote.deleted += 1;
        }
      }
    }

    self.check_cancelled(&applied)?;
    let mut changes = ChangeSet::default();
    for action in &plan.pull {
      match action {
        PullAction::Upsert { record, created } => {
          changes.upserts.push(record.clone());
          if *created {
            report.local.created += 1;
          } else {
            report.local.updated += 1;
          }
        }
        PullAction::Delete(id) => {
          changes.deletes.push(*id);
          report.local.deleted += 1;
        }
      }
    }
    if !changes.is_empty() {
      self
        .store
        .apply(changes)
        .map_err(|e| Error::sync(SyncPhase::Apply, e, applied.clone()))?;
    }

    let mut ledger = lock(&self.ledger);
    for action in &plan.pull {
      match action {
        PullAction::Upsert { record, .. } => ledger.record(record.id, record.updated_at),
        PullAction::Delete(id) => ledger.forget(*id),
      }
    }
    for (id, at) in &plan.in_sync {
      ledger.record(*id, *at);
    }
    for id in &plan.forgotten {
      ledger.forget(*id);
    }
    drop(ledger);

    info!(
      %mode,
      local_created = report.local.created,
      local_updated = report.local.updated,
      local_deleted = report.local.deleted,
      remote_created = report.remote.created,
      remote_updated = report.remote.updated,
      remote_deleted = report.remote.deleted,
      unchanged = report.unchanged,
      "sync pass finished"
    );
    Ok(report)
  }
}
