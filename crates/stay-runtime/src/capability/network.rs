//! `network`: cross-origin requests through the host transport.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::transport::{NetworkOutcome, NetworkRequest, Transport};

#[derive(Clone)]
pub struct NetworkApi {
  transport:       Arc<dyn Transport>,
  default_timeout: Duration,
}

impl NetworkApi {
  pub(crate) fn new(transport: Arc<dyn Transport>, default_timeout: Duration) -> Self {
    Self { transport, default_timeout }
  }

  /// Send `request` and wait for its outcome. A request running past its
  /// timeout resolves to [`NetworkOutcome::TimedOut`] and is abandoned.
  pub async fn request(&self, request: NetworkRequest) -> NetworkOutcome {
    let limit = request.timeout.unwrap_or(self.default_timeout);
    let url = request.url.clone();
    let outcome = match tokio::time::timeout(limit, self.transport.send(request)).await {
      Ok(Ok(response)) => NetworkOutcome::Completed(response),
      Ok(Err(e)) => NetworkOutcome::Failed(e),
      Err(_) => NetworkOutcome::TimedOut(limit),
    };
    debug!(%url, completed = outcome.response().is_some(), "network request finished");
    outcome
  }

  /// Callback form: runs the request in the background and hands the outcome
  /// to `on_done`.
  pub fn request_with<F>(&self, request: NetworkRequest, on_done: F) -> JoinHandle<()>
  where
    F: FnOnce(NetworkOutcome) + Send + 'static,
  {
    let api = self.clone();
    tokio::spawn(async move { on_done(api.request(request).await) })
  }
}
