//! The remote script collection the engine reconciles against.

use std::future::Future;

use stay_core::script::ScriptRecord;
use uuid::Uuid;

/// A remote collection of full script records addressed by id.
///
/// Every method is one network round trip. Authentication is the
/// implementor's concern.
pub trait RemoteScripts: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn list(&self) -> impl Future<Output = Result<Vec<ScriptRecord>, Self::Error>> + Send;

  fn create(&self, record: &ScriptRecord) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Replace the remote copy of `id` with `record`.
  fn update(
    &self,
    id: Uuid,
    record: &ScriptRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  fn delete(&self, id: Uuid) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
