//! Network transport collaborator and the request/response shapes scripts
//! see through the `network` capability.

use std::{borrow::Cow, time::Duration};

use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::Method;
use thiserror::Error;
use tracing::debug;

/// Largest response body [`ReqwestTransport`] will buffer.
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

// ─── Request / response ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
  pub method:  String,
  pub url:     String,
  pub headers: Vec<(String, String)>,
  pub body:    Option<Bytes>,
  /// Overrides the bridge's default timeout.
  pub timeout: Option<Duration>,
}

impl NetworkRequest {
  pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      method:  method.into(),
      url:     url.into(),
      headers: Vec::new(),
      body:    None,
      timeout: None,
    }
  }

  pub fn get(url: impl Into<String>) -> Self { Self::new("GET", url) }

  pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
    Self::new("POST", url).body(body)
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = Some(body.into());
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
  pub status:    u16,
  pub headers:   Vec<(String, String)>,
  pub body:      Bytes,
  /// The URL after redirects.
  pub final_url: String,
}

impl NetworkResponse {
  pub fn text(&self) -> Cow<'_, str> { String::from_utf8_lossy(&self.body) }

  /// First header with `name`, compared case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// A request that reached no response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("network error: {0}")]
pub struct TransportError(pub String);

/// What a script receives from `network.request`. Failures are values, not
/// errors, so a script can branch on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkOutcome {
  Completed(NetworkResponse),
  Failed(TransportError),
  TimedOut(Duration),
}

impl NetworkOutcome {
  pub fn response(&self) -> Option<&NetworkResponse> {
    match self {
      Self::Completed(r) => Some(r),
      _ => None,
    }
  }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Performs the actual HTTP exchange. Timeouts are enforced by the caller.
pub trait Transport: Send + Sync {
  fn send(&self, request: NetworkRequest) -> BoxFuture<'_, Result<NetworkResponse, TransportError>>;
}

/// [`Transport`] over a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(client: reqwest::Client) -> Self { Self { client } }

  async fn perform(&self, request: NetworkRequest) -> Result<NetworkResponse, TransportError> {
    let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
      .map_err(|_| TransportError(format!("invalid method {:?}", request.method)))?;

    debug!(%method, url = %request.url, "sending request");
    let mut builder = self.client.request(method, &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| TransportError(e.to_string()))?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
      .collect();

    if response
      .content_length()
      .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
    {
      return Err(TransportError(format!(
        "response exceeds {MAX_RESPONSE_BYTES} bytes"
      )));
    }
    let body = response
      .bytes()
      .await
      .map_err(|e| TransportError(e.to_string()))?;
    if body.len() > MAX_RESPONSE_BYTES {
      return Err(TransportError(format!(
        "response exceeds {MAX_RESPONSE_BYTES} bytes"
      )));
    }

    Ok(NetworkResponse { status, headers, body, final_url })
  }
}

impl Transport for ReqwestTransport {
  fn send(&self, request: NetworkRequest) -> BoxFuture<'_, Result<NetworkResponse, TransportError>> {
    Box::pin(self.perform(request))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_collects_parts() {
    let req = NetworkRequest::post("https://api.example.com/x", "payload")
      .header("Accept", "application/json")
      .timeout(Duration::from_secs(2));
    assert_eq!(req.method, "POST");
    assert_eq!(req.body.as_deref(), Some(&b"payload"[..]));
    assert_eq!(req.timeout, Some(Duration::from_secs(2)));
  }

  #[test]
  fn header_lookup_ignores_case() {
    let res = NetworkResponse {
      status:    200,
      headers:   vec![("Content-Type".into(), "text/plain".into())],
      body:      Bytes::from_static(b"ok"),
      final_url: "https://example.com/".into(),
    };
    assert_eq!(res.header("content-type"), Some("text/plain"));
    assert_eq!(res.text(), "ok");
  }

  #[tokio::test]
  async fn invalid_method_fails_without_sending() {
    let transport = ReqwestTransport::default();
    let err = transport
      .send(NetworkRequest::new("NOT A METHOD", "https://example.com/"))
      .await
      .unwrap_err();
    assert!(err.0.contains("invalid method"));
  }
}
