//! [`RemoteScripts`] over HTTP.
//!
//! ```text
//! GET    {base}/scripts        → [ScriptRecord]
//! POST   {base}/scripts        ← ScriptRecord
//! PUT    {base}/scripts/{id}   ← ScriptRecord
//! DELETE {base}/scripts/{id}
//! ```
//!
//! Bodies are the camelCase JSON shape of [`ScriptRecord`]. A bearer token,
//! when configured, is attached to every request.

use reqwest::{RequestBuilder, Response, StatusCode};
use stay_core::script::ScriptRecord;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::remote::RemoteScripts;

#[derive(Debug, Error)]
pub enum HttpRemoteError {
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("remote returned {status}: {body}")]
  Status { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct HttpRemote {
  client:   reqwest::Client,
  base_url: String,
  token:    Option<String>,
}

impl HttpRemote {
  pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
    Self::with_client(reqwest::Client::new(), base_url, token)
  }

  pub fn with_client(
    client: reqwest::Client,
    base_url: impl Into<String>,
    token: Option<String>,
  ) -> Self {
    let base_url = base_url.into().trim_end_matches('/').to_owned();
    Self { client, base_url, token }
  }

  fn url(&self, path: &str) -> String { format!("{}/{path}", self.base_url) }

  fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  async fn send(&self, builder: RequestBuilder) -> Result<Response, HttpRemoteError> {
    let response = self.authed(builder).send().await?;
    if response.status().is_success() {
      return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(HttpRemoteError::Status { status, body })
  }
}

impl RemoteScripts for HttpRemote {
  type Error = HttpRemoteError;

  async fn list(&self) -> Result<Vec<ScriptRecord>, Self::Error> {
    let response = self.send(self.client.get(self.url("scripts"))).await?;
    let records: Vec<ScriptRecord> = response.json().await?;
    debug!(count = records.len(), "listed remote scripts");
    Ok(records)
  }

  async fn create(&self, record: &ScriptRecord) -> Result<(), Self::Error> {
    self.send(self.client.post(self.url("scripts")).json(record)).await?;
    Ok(())
  }

  async fn update(&self, id: Uuid, record: &ScriptRecord) -> Result<(), Self::Error> {
    self
      .send(self.client.put(self.url(&format!("scripts/{id}"))).json(record))
      .await?;
    Ok(())
  }

  async fn delete(&self, id: Uuid) -> Result<(), Self::Error> {
    match self.send(self.client.delete(self.url(&format!("scripts/{id}")))).await {
      Ok(_) => Ok(()),
      // Already gone is what we wanted.
      Err(HttpRemoteError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
        Ok(())
      }
      Err(e) => Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
  };

  use super::*;

  /// Answer one request with `status` and return the received request head,
  /// lowercased.
  async fn serve_once(status: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let task = tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut head = Vec::new();
      let mut chunk = [0u8; 1024];
      while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
          break;
        }
        head.extend_from_slice(&chunk[..n]);
      }
      let body = "nope";
      let response = format!(
        "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
      );
      socket.write_all(response.as_bytes()).await.unwrap();
      socket.shutdown().await.ok();
      String::from_utf8_lossy(&head).to_ascii_lowercase()
    });
    (base, task)
  }

  #[tokio::test]
  async fn delete_of_missing_script_succeeds_and_sends_token() {
    let (base, server) = serve_once("404 Not Found").await;
    let remote = HttpRemote::new(base, Some("secret-token".into()));
    let id = Uuid::new_v4();

    remote.delete(id).await.unwrap();

    let head = server.await.unwrap();
    assert!(head.starts_with(&format!("delete /scripts/{id} ")));
    assert!(head.contains("authorization: bearer secret-token"));
  }

  #[tokio::test]
  async fn other_failures_carry_status_and_body() {
    let (base, server) = serve_once("500 Internal Server Error").await;
    let remote = HttpRemote::new(base, Some("secret-token".into()));

    let err = remote.delete(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, HttpRemoteError::Status { status: 500, ref body } if body == "nope"));
    server.await.unwrap();
  }

  #[tokio::test]
  async fn no_token_sends_no_authorization() {
    let (base, server) = serve_once("401 Unauthorized").await;
    let remote = HttpRemote::new(base, None);

    let err = remote.list().await.unwrap_err();
    assert!(matches!(err, HttpRemoteError::Status { status: 401, .. }));
    let head = server.await.unwrap();
    assert!(head.starts_with("get /scripts "));
    assert!(!head.contains("authorization:"));
  }

  #[test]
  fn base_url_is_normalised() {
    let remote = HttpRemote::new("https://sync.example.com/api/", None);
    assert_eq!(remote.url("scripts"), "https://sync.example.com/api/scripts");
  }
}
