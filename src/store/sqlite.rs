// ABOUTME: Durable pending-id set on a SQLite file shared across processes
// ABOUTME: Wraps the sqlite-idset crate and runs its calls on the blocking pool

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlite_idset::PendingIds;

use super::{into_batches, IdSet, DEFAULT_BATCH_SIZE};

/// Pending ids persisted in a SQLite file.
///
/// Every process opening the same file and key shares one set, so several
/// producers can feed a single rebuild worker and pending work survives
/// restarts. Calls run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteIdSet {
    inner: Arc<Mutex<PendingIds>>,
    path: PathBuf,
    batch_size: usize,
}

impl SqliteIdSet {
    pub fn open(path: impl AsRef<Path>, key: &str) -> Result<Self> {
        let path = path.as_ref();
        let pending = PendingIds::open(path, key)?;
        tracing::debug!("Opened pending id set '{}' at {}", key, path.display());
        Ok(Self {
            inner: Arc::new(Mutex::new(pending)),
            path: path.to_path_buf(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&PendingIds) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let pending = inner
                .lock()
                .map_err(|_| anyhow!("pending id set lock poisoned"))?;
            op(&pending)
        })
        .await
        .context("pending id set task failed")?
    }
}

#[async_trait]
impl IdSet for SqliteIdSet {
    async fn add(&self, ids: &[String]) -> Result<()> {
        let ids = ids.to_vec();
        let added = self.run(move |pending| pending.add(&ids)).await?;
        tracing::trace!("Queued {} new pending ids", added);
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let ids = ids.to_vec();
        self.run(move |pending| pending.remove(&ids)).await?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Vec<String>>> {
        let snapshot = self.run(|pending| pending.snapshot()).await?;
        Ok(into_batches(snapshot, self.batch_size))
    }
}
