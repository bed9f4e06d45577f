// ABOUTME: Event aggregator - turns row changes into batched entity upserts and deletes
// ABOUTME: Resolves impacted ids, queues them, and rebuilds queued entities in batches

mod handler;
mod scheduler;

pub use handler::{change_handler_fn, ChangeHandler, Changes, FnHandler, NoopHandler, Upsert};
pub use scheduler::{BackgroundScheduler, BuildFuture, BuildScheduler, ImmediateScheduler};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::client::{id_string, string_column, QueryClient};
use crate::error::{Result, SyncError};
use crate::event::ChangeEvent;
use crate::impact::{resolve_impact, Impact};
use crate::normalize::{normalize_with, NormalizeOptions};
use crate::objects::build_objects_query;
use crate::schema::RootSchema;
use crate::store::{IdSet, MemoryIdSet};

/// Totals for one [`EventAggregator::build_objects`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub batches: usize,
    pub upserted: usize,
    pub deleted: usize,
}

struct Inner {
    schema: RootSchema,
    client: Arc<dyn QueryClient>,
    id_set: Arc<dyn IdSet>,
    handler: Arc<dyn ChangeHandler>,
    scheduler: Arc<dyn BuildScheduler>,
    normalize: NormalizeOptions,
}

/// Keeps denormalized root entities in step with row-level changes.
///
/// Each event is mapped to the root ids it may affect; those are queued in
/// an [`IdSet`] and a rebuild is requested from the [`BuildScheduler`]. A
/// rebuild drains the queue batch by batch, hands the rebuilt entities to
/// the [`ChangeHandler`], and only then removes the batch from the queue.
///
/// Cloning is cheap; clones share every collaborator.
#[derive(Clone)]
pub struct EventAggregator {
    inner: Arc<Inner>,
}

pub struct EventAggregatorBuilder {
    schema: RootSchema,
    client: Arc<dyn QueryClient>,
    id_set: Option<Arc<dyn IdSet>>,
    handler: Option<Arc<dyn ChangeHandler>>,
    scheduler: Option<Arc<dyn BuildScheduler>>,
    normalize: NormalizeOptions,
}

impl EventAggregatorBuilder {
    /// Pending-id store. Defaults to a fresh [`MemoryIdSet`].
    pub fn id_set(mut self, id_set: Arc<dyn IdSet>) -> Self {
        self.id_set = Some(id_set);
        self
    }

    /// Receiver of rebuilt entities. Defaults to [`NoopHandler`].
    pub fn on_change(mut self, handler: impl ChangeHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Defaults to [`ImmediateScheduler`].
    pub fn scheduler(mut self, scheduler: Arc<dyn BuildScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Drop structurally identical entries from built arrays.
    pub fn dedupe_arrays(mut self, dedupe: bool) -> Self {
        self.normalize.dedupe_arrays = dedupe;
        self
    }

    /// Validates the schema and assembles the aggregator.
    pub fn build(self) -> Result<EventAggregator> {
        self.schema.validate()?;
        Ok(EventAggregator {
            inner: Arc::new(Inner {
                schema: self.schema,
                client: self.client,
                id_set: self
                    .id_set
                    .unwrap_or_else(|| Arc::new(MemoryIdSet::new())),
                handler: self.handler.unwrap_or_else(|| Arc::new(NoopHandler)),
                scheduler: self
                    .scheduler
                    .unwrap_or_else(|| Arc::new(ImmediateScheduler)),
                normalize: self.normalize,
            }),
        })
    }
}

impl EventAggregator {
    pub fn builder(schema: RootSchema, client: Arc<dyn QueryClient>) -> EventAggregatorBuilder {
        EventAggregatorBuilder {
            schema,
            client,
            id_set: None,
            handler: None,
            scheduler: None,
            normalize: NormalizeOptions::default(),
        }
    }

    pub fn schema(&self) -> &RootSchema {
        &self.inner.schema
    }

    /// Queues every root id `event` may affect and requests a rebuild.
    ///
    /// Returns the distinct ids that were queued. Query and store failures
    /// are returned as is, before anything is scheduled.
    pub async fn handle_event(&self, event: &ChangeEvent) -> Result<Vec<String>> {
        let Impact { ids, query } = resolve_impact(&self.inner.schema, event);
        let direct = ids.len();

        let mut ids = ids;
        if let Some(query) = query {
            let compiled = query.compile();
            tracing::trace!(sql = %compiled.sql, "Resolving impacted ids");
            let rows = self
                .inner
                .client
                .query_compiled(&compiled)
                .await
                .map_err(SyncError::Query)?;
            ids.extend(string_column(&rows, "id"));
        }

        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));

        tracing::debug!(
            table = %event.table,
            action = event.action.as_str(),
            direct,
            queued = ids.len(),
            "Handled change event"
        );

        if !ids.is_empty() {
            self.inner.id_set.add(&ids).await.map_err(SyncError::Store)?;
        }

        let this = self.clone();
        self.inner
            .scheduler
            .schedule(Box::pin(async move { this.build_objects().await }))
            .await?;

        Ok(ids)
    }

    /// Rebuilds every pending id, one batch at a time.
    ///
    /// A batch leaves the queue only after the handler accepted it; the
    /// first failure stops the run with that batch and the following ones
    /// still pending.
    pub async fn build_objects(&self) -> Result<BuildReport> {
        let batches = self.inner.id_set.get_all().await.map_err(SyncError::Store)?;

        let mut report = BuildReport::default();
        for ids in batches {
            let changes = self.build_batch(&ids).await?;
            let (upserted, deleted) = (changes.upsert.len(), changes.delete.len());

            self.inner
                .handler
                .on_change(changes)
                .await
                .map_err(SyncError::Callback)?;
            self.inner
                .id_set
                .delete(&ids)
                .await
                .map_err(SyncError::Store)?;

            tracing::debug!(
                batch = ids.len(),
                upserted,
                deleted,
                "Delivered rebuilt batch"
            );
            report.batches += 1;
            report.upserted += upserted;
            report.deleted += deleted;
        }

        Ok(report)
    }

    async fn build_batch(&self, ids: &[String]) -> Result<Changes> {
        let compiled = build_objects_query(&self.inner.schema, ids).compile();
        tracing::trace!(sql = %compiled.sql, "Building objects");
        let rows = self
            .inner
            .client
            .query_compiled(&compiled)
            .await
            .map_err(SyncError::Query)?;

        let mut objects: HashMap<String, Value> = HashMap::with_capacity(rows.len());
        for mut row in rows {
            let Some(id) = row.get("id").and_then(id_string) else {
                tracing::warn!("Skipping object row without a usable id");
                continue;
            };
            let object = row.remove("object").unwrap_or(Value::Null);
            objects.insert(id, normalize_with(object, self.inner.normalize));
        }

        let mut changes = Changes::default();
        for id in ids {
            match objects.remove(id) {
                Some(object) => changes.upsert.push(Upsert {
                    id: id.clone(),
                    object,
                }),
                None => changes.delete.push(id.clone()),
            }
        }
        Ok(changes)
    }
}
