//! The offline worker: classifies every request and answers it from the
//! network, the cache, or a synthetic fallback.
//!
//! - `classify`: pure request → category mapping
//! - `strategy`: one caching strategy per category
//! - `lifecycle`: install (pre-cache) and activate (stale partition sweep)
//! - `hooks`: background sync, push, notification clicks and messages

mod classify;
pub mod fallback;
mod hooks;
mod lifecycle;
mod strategy;

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use url::Url;

use crate::cache::{CacheLayer, CacheStorage, PartitionSet};
use crate::config::Config;
use crate::net::Fetcher;
use crate::request::{Request, RequestKey, Response};

pub use classify::{Category, Classifier};
pub use lifecycle::WorkerState;

/// Snapshot of the worker for status output.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
  pub state: WorkerState,
  pub version: String,
  pub skip_waiting: bool,
  pub clients_claimed: bool,
}

/// Request-intercepting cache worker.
pub struct ServiceWorker<S: CacheStorage, F: Fetcher> {
  cache: CacheLayer<S>,
  network: F,
  classifier: Classifier,
  origin: Url,
  precache: Vec<String>,
  max_dynamic_entries: usize,
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
  clients_claimed: AtomicBool,
  /// Fetches hold the read side, lifecycle events the write side
  gate: RwLock<()>,
}

impl<S: CacheStorage, F: Fetcher> ServiceWorker<S, F> {
  pub fn new(config: &Config, storage: S, network: F) -> Result<Self> {
    let partitions = PartitionSet::new(&config.cache.prefix, &config.cache.version);

    Ok(Self {
      cache: CacheLayer::new(storage, partitions),
      network,
      classifier: Classifier::new(config.routes.clone()),
      origin: config.origin()?.clone(),
      precache: config.precache.clone(),
      max_dynamic_entries: config.cache.max_dynamic_entries,
      state: Mutex::new(WorkerState::Parsed),
      skip_waiting: AtomicBool::new(false),
      clients_claimed: AtomicBool::new(false),
      gate: RwLock::new(()),
    })
  }

  pub fn origin(&self) -> &Url {
    &self.origin
  }

  pub fn partitions(&self) -> &PartitionSet {
    self.cache.partitions()
  }

  pub fn storage(&self) -> &S {
    self.cache.storage()
  }

  pub fn state(&self) -> Result<WorkerState> {
    Ok(*self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?)
  }

  fn set_state(&self, state: WorkerState) -> Result<()> {
    let mut current = self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    tracing::debug!(from = ?*current, to = ?state, "worker state change");
    *current = state;
    Ok(())
  }

  pub fn status(&self) -> Result<WorkerStatus> {
    Ok(WorkerStatus {
      state: self.state()?,
      version: self.partitions().version().to_string(),
      skip_waiting: self.skip_waiting.load(Ordering::SeqCst),
      clients_claimed: self.clients_claimed.load(Ordering::SeqCst),
    })
  }

  /// Resolve a site-relative path (or absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid URL {}: {}", path, e))
  }

  pub fn classify(&self, request: &Request) -> Option<Category> {
    self.classifier.classify(request)
  }

  /// Answer one request.
  ///
  /// Requests the worker does not intercept go straight to the network. An
  /// `Err` is the original network failure, returned only by the strategies
  /// that have no synthetic fallback.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Response> {
    let _gate = self.gate.read().await;

    let Some(category) = self.classify(request) else {
      tracing::trace!(method = %request.method, url = %request.url, "not intercepted");
      return self.network.fetch(request).await;
    };

    tracing::debug!(url = %request.url, category = category.as_str(), "intercepted");
    match category {
      Category::StaticAsset => self.cache_first(request).await,
      Category::Api => self.network_first_api(request).await,
      Category::ExternalResource => self.cache_first_external(request).await,
      Category::Navigation => self.network_first_navigation(request).await,
      Category::Dynamic => self.network_first_bounded(request).await,
    }
  }

  /// Fetch the origin root directly, bypassing every partition.
  pub async fn probe_origin(&self) -> Result<Response> {
    self.network.fetch(&Request::get(self.origin.clone())).await
  }

  fn offline_document_key(&self) -> Result<RequestKey> {
    Ok(RequestKey::new("GET", &self.resolve("/offline")?))
  }
}
