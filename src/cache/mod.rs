//! Partitioned response cache.
//!
//! This module provides the storage side of the offline worker:
//! - Named, versioned partitions (static, dynamic, general)
//! - Entries keyed by request identity, kept in insertion order
//! - FIFO size bounding per partition
//! - A layer that turns storage failures into misses and no-ops

mod layer;
mod partition;
mod storage;
mod trim;

pub use layer::CacheLayer;
pub use partition::{Partition, PartitionSet};
pub use storage::{CacheStorage, MemoryStorage, SqliteStorage};
