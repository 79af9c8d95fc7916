//! Reconciliation planning: a pure function from (local, remote, ledger,
//! mode) to the writes each side needs.
//!
//! Per id, with `B` the ledger baseline:
//!
//! | local | remote | B    | action                                          |
//! |-------|--------|------|-------------------------------------------------|
//! | L     | R      | any  | equal → in sync; else the changed side wins,    |
//! |       |        |      | both changed → later `updatedAt` (tie: remote)  |
//! | L     | -      | none | push create                                     |
//! | L     | -      | B    | L changed since B → push create; else pull delete |
//! | -     | R      | none | pull create                                     |
//! | -     | R      | B    | R changed since B → pull create; else push delete |
//! | -     | -      | B    | forget                                          |
//!
//! Actions for the side the mode does not write are dropped, leaving the
//! ledger entry alone so a later pass still sees the change.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use stay_core::script::ScriptRecord;
use uuid::Uuid;

use crate::{SyncMode, ledger::SyncLedger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAction {
  Create(ScriptRecord),
  Update(ScriptRecord),
  Delete(Uuid),
}

impl PushAction {
  pub fn id(&self) -> Uuid {
    match self {
      Self::Create(r) | Self::Update(r) => r.id,
      Self::Delete(id) => *id,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullAction {
  Upsert { record: ScriptRecord, created: bool },
  Delete(Uuid),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
  pub push:      Vec<PushAction>,
  pub pull:      Vec<PullAction>,
  /// Ids whose two copies already agree, with the agreed `updatedAt`.
  pub in_sync:   Vec<(Uuid, DateTime<Utc>)>,
  /// Ledger entries for ids gone from both sides.
  pub forgotten: Vec<Uuid>,
}

enum Winner {
  Local,
  Remote,
}

fn changed_since(record: &ScriptRecord, baseline: Option<DateTime<Utc>>) -> bool {
  baseline != Some(record.updated_at)
}

/// Last writer wins; equal timestamps with different content go to the
/// remote copy.
fn last_writer(local: &ScriptRecord, remote: &ScriptRecord) -> Winner {
  if local.updated_at > remote.updated_at { Winner::Local } else { Winner::Remote }
}

pub fn plan(
  local: Vec<ScriptRecord>,
  remote: Vec<ScriptRecord>,
  ledger: &SyncLedger,
  mode: SyncMode,
) -> Plan {
  let mut local: BTreeMap<Uuid, ScriptRecord> = local.into_iter().map(|r| (r.id, r)).collect();
  let mut remote: BTreeMap<Uuid, ScriptRecord> = remote.into_iter().map(|r| (r.id, r)).collect();
  let ids: BTreeSet<Uuid> = local.keys().chain(remote.keys()).copied().chain(ledger.ids()).collect();

  let mut plan = Plan::default();
  for id in ids {
    let baseline = ledger.get(id);
    match (local.remove(&id), remote.remove(&id)) {
      (Some(l), Some(r)) => {
        if l == r {
          plan.in_sync.push((id, l.updated_at));
          continue;
        }
        let winner = match (changed_since(&l, baseline), changed_since(&r, baseline)) {
          (true, false) => Winner::Local,
          (false, true) => Winner::Remote,
          _ => last_writer(&l, &r),
        };
        match winner {
          Winner::Local => plan.push.push(PushAction::Update(l)),
          Winner::Remote => plan.pull.push(PullAction::Upsert { record: r, created: false }),
        }
      }
      (Some(l), None) => match baseline {
        Some(_) if !changed_since(&l, baseline) => plan.pull.push(PullAction::Delete(id)),
        _ => plan.push.push(PushAction::Create(l)),
      },
      (None, Some(r)) => match baseline {
        Some(_) if !changed_since(&r, baseline) => plan.push.push(PushAction::Delete(id)),
        _ => plan.pull.push(PullAction::Upsert { record: r, created: true }),
      },
      (None, None) => plan.forgotten.push(id),
    }
  }

  if !mode.pushes() {
    plan.push.clear();
  }
  if !mode.pulls() {
    plan.pull.clear();
  }
  plan
}
