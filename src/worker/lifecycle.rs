//! Install and activate.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::Ordering;

use crate::cache::{CacheStorage, Partition};
use crate::net::Fetcher;
use crate::request::Request;

use super::ServiceWorker;

/// Worker lifecycle states, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
}

/// Outcome of pre-caching the shell.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
  pub cached: Vec<String>,
  pub failed: Vec<String>,
}

impl<S: CacheStorage, F: Fetcher> ServiceWorker<S, F> {
  /// Open the static partition and pre-cache the shell URLs.
  ///
  /// Pre-caching is best effort: a URL that fails or does not answer 200 is
  /// logged and skipped, and installation still completes. Installing again
  /// overwrites entries by key.
  pub async fn install(&self) -> Result<InstallReport> {
    let _gate = self.gate.write().await;
    self.set_state(WorkerState::Installing)?;

    let static_name = self.partitions().name(Partition::Static);
    if let Err(e) = self.storage().open(static_name) {
      tracing::warn!(partition = static_name, "failed to open static partition: {}", e);
    }

    let mut report = InstallReport::default();
    let mut requests = Vec::new();
    for path in &self.precache {
      match self.resolve(path) {
        Ok(url) => requests.push(Request::get(url)),
        Err(e) => {
          tracing::warn!("skipping pre-cache entry: {}", e);
          report.failed.push(path.clone());
        }
      }
    }

    let responses = join_all(requests.iter().map(|request| self.network.fetch(request))).await;

    for (request, result) in requests.iter().zip(responses) {
      match result {
        Ok(response) if response.is_cacheable() => {
          self
            .cache
            .store(Partition::Static, &request.key(), &response);
          report.cached.push(request.url.to_string());
        }
        Ok(response) => {
          tracing::warn!(url = %request.url, status = response.status, "pre-cache got non-200 response");
          report.failed.push(request.url.to_string());
        }
        Err(e) => {
          tracing::warn!(url = %request.url, "pre-cache failed: {}", e);
          report.failed.push(request.url.to_string());
        }
      }
    }

    self.skip_waiting.store(true, Ordering::SeqCst);
    self.set_state(WorkerState::Installed)?;

    tracing::info!(
      cached = report.cached.len(),
      failed = report.failed.len(),
      "worker installed"
    );
    Ok(report)
  }

  /// Delete every partition that does not belong to the current version,
  /// then take control of open clients. Returns the deleted names.
  pub async fn activate(&self) -> Result<Vec<String>> {
    let _gate = self.gate.write().await;

    let state = self.state()?;
    if !matches!(state, WorkerState::Installed | WorkerState::Activated) {
      return Err(eyre!("Cannot activate a worker in state {:?}", state));
    }
    self.set_state(WorkerState::Activating)?;

    let existing = match self.storage().partition_names() {
      Ok(names) => names,
      Err(e) => {
        tracing::warn!("failed to list partitions, skipping sweep: {}", e);
        Vec::new()
      }
    };

    let mut deleted = Vec::new();
    for name in self.partitions().stale(&existing) {
      match self.storage().delete_partition(name) {
        Ok(_) => {
          tracing::info!(partition = name, "deleted stale partition");
          deleted.push(name.to_string());
        }
        Err(e) => tracing::warn!(partition = name, "failed to delete stale partition: {}", e),
      }
    }

    self.clients_claimed.store(true, Ordering::SeqCst);
    self.set_state(WorkerState::Activated)?;

    tracing::info!(version = self.partitions().version(), "worker activated");
    Ok(deleted)
  }
}
