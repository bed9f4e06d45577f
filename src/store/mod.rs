// ABOUTME: Pending-id stores deduplicating root ids between detection and rebuild
// ABOUTME: In-memory for single processes, SQLite-backed for durable shared queues

pub mod memory;
#[cfg(feature = "sqlite-store")]
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryIdSet;
#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteIdSet;

/// Ids per batch handed out by [`IdSet::get_all`] unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// A set of root ids waiting to be rebuilt.
///
/// Adding an id that is already pending is a no-op. `delete` removes exactly
/// the given ids, so ids added while a batch is being built survive for the
/// next pass.
#[async_trait]
pub trait IdSet: Send + Sync {
    async fn add(&self, ids: &[String]) -> Result<()>;

    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Every pending id at the time of the call, split into batches.
    async fn get_all(&self) -> Result<Vec<Vec<String>>>;
}

/// Splits `ids` into chunks of at most `batch_size` (at least one).
pub fn into_batches(ids: Vec<String>, batch_size: usize) -> Vec<Vec<String>> {
    ids.chunks(batch_size.max(1)).map(<[String]>::to_vec).collect()
}
