// ABOUTME: Process-local pending-id set kept in insertion order
// ABOUTME: Default store of the event aggregator; contents are lost on exit

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{into_batches, IdSet, DEFAULT_BATCH_SIZE};

#[derive(Default)]
struct Pending {
    order: Vec<String>,
    members: HashSet<String>,
}

/// Process-local pending ids, kept in insertion order. Lost on exit.
pub struct MemoryIdSet {
    pending: Mutex<Pending>,
    batch_size: usize,
}

impl MemoryIdSet {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            batch_size,
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.order.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Pending>> {
        self.pending
            .lock()
            .map_err(|_| anyhow!("pending id set lock poisoned"))
    }
}

impl Default for MemoryIdSet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdSet for MemoryIdSet {
    async fn add(&self, ids: &[String]) -> Result<()> {
        let mut pending = self.lock()?;
        for id in ids {
            if pending.members.insert(id.clone()) {
                pending.order.push(id.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut pending = self.lock()?;
        let mut removed = false;
        for id in ids {
            removed |= pending.members.remove(id);
        }
        if removed {
            let Pending { order, members } = &mut *pending;
            order.retain(|id| members.contains(id));
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Vec<String>>> {
        let snapshot = self.lock()?.order.clone();
        Ok(into_batches(snapshot, self.batch_size))
    }
}
