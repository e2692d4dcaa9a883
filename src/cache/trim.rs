//! Entry-count bounding for a partition.

use color_eyre::Result;

use super::storage::CacheStorage;

/// Delete the oldest entries of `partition` until at most `max_entries` remain.
///
/// "Oldest" is insertion order, so this is FIFO: reading an entry does not
/// protect it from eviction. Returns the number of evicted entries.
pub fn trim_partition<S: CacheStorage + ?Sized>(
  storage: &S,
  partition: &str,
  max_entries: usize,
) -> Result<usize> {
  let keys = storage.keys(partition)?;
  if keys.len() <= max_entries {
    return Ok(0);
  }

  let excess = keys.len() - max_entries;
  let mut evicted = 0;
  for key in keys.iter().take(excess) {
    if storage.delete_entry(partition, key)? {
      evicted += 1;
    }
  }

  tracing::debug!(partition, evicted, max_entries, "trimmed partition");
  Ok(evicted)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::request::{RequestKey, Response};
  use url::Url;

  fn key(n: usize) -> RequestKey {
    RequestKey::new("GET", &Url::parse(&format!("https://example.org/u{}", n)).unwrap())
  }

  fn fill(storage: &MemoryStorage, range: std::ops::RangeInclusive<usize>) {
    for n in range {
      storage.put("p", &key(n), &Response::new(200, n.to_string())).unwrap();
    }
  }

  #[test]
  fn test_under_bound_is_untouched() {
    let storage = MemoryStorage::new();
    fill(&storage, 1..=3);

    assert_eq!(trim_partition(&storage, "p", 3).unwrap(), 0);
    assert_eq!(storage.keys("p").unwrap().len(), 3);
  }

  #[test]
  fn test_removes_oldest_excess() {
    let storage = MemoryStorage::new();
    fill(&storage, 1..=5);

    assert_eq!(trim_partition(&storage, "p", 2).unwrap(), 3);
    assert_eq!(storage.keys("p").unwrap(), vec![key(4), key(5)]);
  }

  #[test]
  fn test_eviction_ignores_reads() {
    let storage = MemoryStorage::new();
    fill(&storage, 1..=3);
    storage.match_entry("p", &key(1)).unwrap();
    fill(&storage, 4..=4);

    trim_partition(&storage, "p", 3).unwrap();
    assert_eq!(storage.keys("p").unwrap(), vec![key(2), key(3), key(4)]);
  }

  #[test]
  fn test_missing_partition() {
    let storage = MemoryStorage::new();
    assert_eq!(trim_partition(&storage, "absent", 0).unwrap(), 0);
  }
}
