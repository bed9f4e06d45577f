// ABOUTME: Library root for entity-replicator
// ABOUTME: Compiles denormalized entity schemas into rebuild and change-impact SQL

//! Keeps denormalized JSON entities in sync with a normalized PostgreSQL
//! source.
//!
//! A [`RootSchema`] describes how one entity is assembled from several
//! tables. From it the crate derives two queries:
//!
//! - [`build_objects_query`] rebuilds the full JSON object of a batch of
//!   root ids in one statement.
//! - [`resolve_impact`] maps a single row change to the root ids it may
//!   affect, directly or through a reverse-join query.
//!
//! [`EventAggregator`] ties both together with a pending-id store and a
//! change handler.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod impact;
pub mod introspection;
pub mod normalize;
pub mod objects;
pub mod postgres;
pub mod schema;
pub mod sql;
pub mod store;
pub mod utils;

pub use aggregator::{
    change_handler_fn, BackgroundScheduler, BuildReport, BuildScheduler, ChangeHandler, Changes,
    EventAggregator, EventAggregatorBuilder, ImmediateScheduler, NoopHandler, Upsert,
};
pub use client::{QueryClient, Row};
pub use config::{StoreConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use event::{Action, ChangeEvent, RowData};
pub use impact::{resolve_impact, Impact};
pub use introspection::{introspect, Introspection, OutputShape, TableColumns};
pub use normalize::{normalize, normalize_with, NormalizeOptions};
pub use objects::{build_objects_query, build_objects_query_with, ObjectQueryOptions};
pub use schema::{RootSchema, Schema};
pub use sql::{CompiledQuery, QueryBuilder};
pub use store::{IdSet, MemoryIdSet};
#[cfg(feature = "sqlite-store")]
pub use store::SqliteIdSet;
