//! Scripted network for worker tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use url::Url;

use crate::net::Fetcher;
use crate::request::{Request, Response};

/// In-memory network with an online switch and a call counter.
///
/// Unscripted URLs answer 404 while online. Every call is counted, including
/// calls made while offline.
#[derive(Default)]
pub struct ScriptedNetwork {
  routes: Mutex<HashMap<String, Response>>,
  offline: AtomicBool,
  calls: AtomicUsize,
  held: Mutex<Option<Arc<Notify>>>,
  entered: Notify,
}

impl ScriptedNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Make every later fetch wait until the returned handle is notified.
  pub fn hold(&self) -> Arc<Notify> {
    let release = Arc::new(Notify::new());
    *self.held.lock().unwrap() = Some(Arc::clone(&release));
    release
  }

  /// Resolves once a fetch is parked on a hold.
  pub async fn entered(&self) {
    self.entered.notified().await
  }
}

impl Fetcher for ScriptedNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    let held = self.held.lock().unwrap().clone();
    if let Some(release) = held {
      self.entered.notify_one();
      release.notified().await;
    }

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable: {}", request.url));
    }

    let routes = self.routes.lock().unwrap();
    Ok(
      routes
        .get(request.url.as_str())
        .cloned()
        .unwrap_or_else(|| Response::new(404, "not found")),
    )
  }
}

impl Fetcher for Arc<ScriptedNetwork> {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.as_ref().fetch(request).await
  }
}

pub fn url(s: &str) -> Url {
  Url::parse(s).unwrap()
}
