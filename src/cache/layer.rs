//! Cache layer that shields the strategies from storage failures.

use std::sync::Arc;

use crate::request::{RequestKey, Response};

use super::partition::{Partition, PartitionSet};
use super::storage::CacheStorage;
use super::trim::trim_partition;

/// Response headers that are never written to a partition.
const UNSTORED_HEADERS: &[&str] = &["set-cookie", "set-cookie2"];

/// Cache layer over a storage backend and one partition generation.
///
/// Every storage error is logged here and turned into a miss (reads) or a
/// no-op (writes), so a broken cache never fails a request.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  partitions: PartitionSet,
}

impl<S: CacheStorage> CacheLayer<S> {
  pub fn new(storage: S, partitions: PartitionSet) -> Self {
    Self {
      storage: Arc::new(storage),
      partitions,
    }
  }

  pub fn partitions(&self) -> &PartitionSet {
    &self.partitions
  }

  /// Direct access to the backend, for lifecycle and maintenance work.
  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Look up `key` in one partition.
  pub fn lookup(&self, partition: Partition, key: &RequestKey) -> Option<Response> {
    let name = self.partitions.name(partition);
    match self.storage.match_entry(name, key) {
      Ok(found) => found,
      Err(e) => {
        tracing::warn!(partition = name, %key, "cache read failed, treating as miss: {}", e);
        None
      }
    }
  }

  /// Look up `key` across all current partitions, static first.
  pub fn lookup_any(&self, key: &RequestKey) -> Option<Response> {
    [Partition::Static, Partition::Dynamic, Partition::General]
      .into_iter()
      .find_map(|partition| self.lookup(partition, key))
  }

  /// Write a response through to a partition, without its cookies.
  pub fn store(&self, partition: Partition, key: &RequestKey, response: &Response) {
    let name = self.partitions.name(partition);
    let mut stored = response.clone();
    stored
      .headers
      .retain(|(n, _)| !UNSTORED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(n)));

    if let Err(e) = self.storage.put(name, key, &stored) {
      tracing::warn!(partition = name, %key, "cache write failed, skipping: {}", e);
    }
  }

  /// Bound a partition to `max_entries`, evicting oldest insertions first.
  pub fn trim(&self, partition: Partition, max_entries: usize) {
    let name = self.partitions.name(partition);
    if let Err(e) = trim_partition(self.storage.as_ref(), name, max_entries) {
      tracing::warn!(partition = name, "cache trim failed: {}", e);
    }
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      partitions: self.partitions.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::{eyre::eyre, Result};
  use url::Url;

  /// Backend where every operation fails.
  struct BrokenStorage;

  impl CacheStorage for BrokenStorage {
    fn open(&self, _partition: &str) -> Result<()> {
      Err(eyre!("quota exceeded"))
    }
    fn has(&self, _partition: &str) -> Result<bool> {
      Err(eyre!("quota exceeded"))
    }
    fn partition_names(&self) -> Result<Vec<String>> {
      Err(eyre!("quota exceeded"))
    }
    fn delete_partition(&self, _partition: &str) -> Result<bool> {
      Err(eyre!("quota exceeded"))
    }
    fn match_entry(&self, _partition: &str, _key: &RequestKey) -> Result<Option<Response>> {
      Err(eyre!("corrupted partition"))
    }
    fn put(&self, _partition: &str, _key: &RequestKey, _response: &Response) -> Result<()> {
      Err(eyre!("quota exceeded"))
    }
    fn delete_entry(&self, _partition: &str, _key: &RequestKey) -> Result<bool> {
      Err(eyre!("quota exceeded"))
    }
    fn keys(&self, _partition: &str) -> Result<Vec<RequestKey>> {
      Err(eyre!("quota exceeded"))
    }
  }

  #[test]
  fn test_cookies_are_not_stored() {
    let layer = CacheLayer::new(crate::cache::MemoryStorage::new(), PartitionSet::new("t", "v1"));
    let key = RequestKey::new("GET", &Url::parse("https://example.org/api/auth/session").unwrap());
    let response = Response::new(200, "{}")
      .with_header("Content-Type", "application/json")
      .with_header("Set-Cookie", "session=abc; HttpOnly");

    layer.store(Partition::Dynamic, &key, &response);

    let stored = layer.lookup(Partition::Dynamic, &key).unwrap();
    assert_eq!(stored.header("set-cookie"), None);
    assert_eq!(stored.header("content-type"), Some("application/json"));
  }

  #[test]
  fn test_storage_errors_become_misses_and_noops() {
    let layer = CacheLayer::new(BrokenStorage, PartitionSet::new("t", "v1"));
    let key = RequestKey::new("GET", &Url::parse("https://example.org/").unwrap());

    layer.store(Partition::Dynamic, &key, &Response::new(200, "x"));
    layer.trim(Partition::Dynamic, 1);
    assert_eq!(layer.lookup(Partition::Dynamic, &key), None);
    assert_eq!(layer.lookup_any(&key), None);
  }
}
