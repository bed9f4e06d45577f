// ABOUTME: Change delivery types and the callback trait for rebuilt entities
// ABOUTME: Includes a no-op handler and an adapter for async closures

use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rebuilt root entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upsert {
    pub id: String,
    pub object: Value,
}

/// Outcome of rebuilding one batch of pending ids.
///
/// Ids whose root row still exists are upserted with their current object;
/// the rest are deleted. Every id of the batch appears exactly once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changes {
    pub upsert: Vec<Upsert>,
    pub delete: Vec<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upsert.len() + self.delete.len()
    }
}

/// Receives rebuilt entities. An error keeps the batch pending so it is
/// delivered again on the next build.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_change(&self, changes: Changes) -> Result<()>;
}

/// Discards every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

#[async_trait]
impl ChangeHandler for NoopHandler {
    async fn on_change(&self, _changes: Changes) -> Result<()> {
        Ok(())
    }
}

/// [`ChangeHandler`] backed by an async closure. See [`change_handler_fn`].
pub struct FnHandler<F>(F);

/// Wraps an async closure as a [`ChangeHandler`].
///
/// ```
/// use entity_replicator::change_handler_fn;
///
/// let handler = change_handler_fn(|changes| async move {
///     println!("{} changes", changes.len());
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn change_handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Changes) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> ChangeHandler for FnHandler<F>
where
    F: Fn(Changes) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn on_change(&self, changes: Changes) -> Result<()> {
        (self.0)(changes).await
    }
}
