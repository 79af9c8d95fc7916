//! In-test host collaborators that record what they were asked to do.

use std::sync::{
  Mutex,
  atomic::{AtomicU64, AtomicUsize, Ordering},
};

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::{
  host::{Document, HostError, OpenTabOptions, StyleNodeId, TabOpener},
  transport::{NetworkRequest, NetworkResponse, Transport, TransportError},
};

pub struct FakeDocument {
  url:     String,
  next_id: AtomicU64,
  sheets:  Mutex<Vec<String>>,
}

impl FakeDocument {
  pub fn new(url: &str) -> Self {
    Self { url: url.to_owned(), next_id: AtomicU64::new(0), sheets: Mutex::default() }
  }

  pub fn sheets(&self) -> Vec<String> { self.sheets.lock().unwrap().clone() }
}

impl Document for FakeDocument {
  fn url(&self) -> &str { &self.url }

  fn append_stylesheet(&self, css: &str) -> Result<StyleNodeId, HostError> {
    self.sheets.lock().unwrap().push(css.to_owned());
    Ok(StyleNodeId(self.next_id.fetch_add(1, Ordering::SeqCst)))
  }
}

enum Behaviour {
  Respond,
  Fail(String),
  Hang,
}

pub struct FakeTransport {
  behaviour: Behaviour,
  calls:     AtomicUsize,
}

impl FakeTransport {
  fn with(behaviour: Behaviour) -> Self { Self { behaviour, calls: AtomicUsize::new(0) } }

  /// Answers every request with `200 ok`.
  pub fn ok() -> Self { Self::with(Behaviour::Respond) }

  pub fn failing(message: &str) -> Self { Self::with(Behaviour::Fail(message.to_owned())) }

  /// Never answers.
  pub fn hanging() -> Self { Self::with(Behaviour::Hang) }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl Transport for FakeTransport {
  fn send(&self, request: NetworkRequest) -> BoxFuture<'_, Result<NetworkResponse, TransportError>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Box::pin(async move {
      match &self.behaviour {
        Behaviour::Respond => Ok(NetworkResponse {
          status:    200,
          headers:   vec![("content-type".into(), "text/plain".into())],
          body:      Bytes::from_static(b"ok"),
          final_url: request.url,
        }),
        Behaviour::Fail(msg) => Err(TransportError(msg.clone())),
        Behaviour::Hang => futures::future::pending().await,
      }
    })
  }
}

#[derive(Default)]
pub struct FakeTabs {
  opened: Mutex<Vec<(String, bool)>>,
}

impl FakeTabs {
  pub fn opened(&self) -> Vec<(String, bool)> { self.opened.lock().unwrap().clone() }
}

impl TabOpener for FakeTabs {
  fn open(&self, url: &str, options: OpenTabOptions) -> Result<(), HostError> {
    self.opened.lock().unwrap().push((url.to_owned(), options.active));
    Ok(())
  }
}
