// ABOUTME: TOML configuration for wiring an event aggregator from files
// ABOUTME: Schema location, batch size, normalization and pending-id store selection

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregator::{EventAggregator, EventAggregatorBuilder};
use crate::client::QueryClient;
use crate::error::{Result, SyncError};
use crate::schema::RootSchema;
use crate::store::{IdSet, MemoryIdSet, DEFAULT_BATCH_SIZE};

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_store_key() -> String {
    "pending".to_string()
}

/// Where pending ids are kept.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    /// A SQLite file shared by every process using the same `key`.
    Sqlite {
        path: PathBuf,
        #[serde(default = "default_store_key")]
        key: String,
    },
}

/// Example:
///
/// ```toml
/// schema_path = "article.schema.json"
/// batch_size = 500
/// database_url = "postgresql://app@localhost/app"
///
/// [store]
/// kind = "sqlite"
/// path = "/var/lib/entity-replicator/pending.db"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// JSON or TOML file holding the root schema. Relative paths resolve
    /// against the directory of the config file.
    pub schema_path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub dedupe_arrays: bool,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl SyncConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(contents)
            .map_err(|e| SyncError::config(format!("invalid config: {}", e)))?;
        if config.batch_size == 0 {
            return Err(SyncError::config("batch_size must be at least 1"));
        }
        Ok(config)
    }

    /// Reads a config file and resolves relative paths in it against the
    /// file's directory.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::file(path, e))?;
        let mut config = Self::from_toml_str(&contents).map_err(|e| match e {
            SyncError::Config(message) => SyncError::file(path, message),
            other => other,
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.schema_path = base.join(&config.schema_path);
        if let StoreConfig::Sqlite { path, .. } = &mut config.store {
            *path = base.join(&*path);
        }
        Ok(config)
    }

    pub async fn load_schema(&self) -> Result<RootSchema> {
        RootSchema::load(&self.schema_path).await
    }

    pub fn open_store(&self) -> Result<Arc<dyn IdSet>> {
        match &self.store {
            StoreConfig::Memory => Ok(Arc::new(MemoryIdSet::with_batch_size(self.batch_size))),
            #[cfg(feature = "sqlite-store")]
            StoreConfig::Sqlite { path, key } => {
                let store = crate::store::SqliteIdSet::open(path, key)
                    .map_err(SyncError::Store)?
                    .with_batch_size(self.batch_size);
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "sqlite-store"))]
            StoreConfig::Sqlite { .. } => Err(SyncError::config(
                "store kind 'sqlite' requires the sqlite-store feature",
            )),
        }
    }

    /// Loads the schema, opens the store and returns a builder ready for a
    /// change handler.
    pub async fn aggregator_builder(
        &self,
        client: Arc<dyn QueryClient>,
    ) -> Result<EventAggregatorBuilder> {
        let schema = self.load_schema().await?;
        let id_set = self.open_store()?;
        Ok(EventAggregator::builder(schema, client)
            .id_set(id_set)
            .dedupe_arrays(self.dedupe_arrays))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_toml_str(r#"schema_path = "schema.json""#).unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!config.dedupe_arrays);
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_sqlite_store() {
        let config = SyncConfig::from_toml_str(
            r#"
            schema_path = "schema.json"
            batch_size = 10

            [store]
            kind = "sqlite"
            path = "pending.db"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("pending.db"),
                key: "pending".to_string(),
            }
        );
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            SyncConfig::from_toml_str(r#"schema_path = "s.json"
batch_size = 0"#),
            Err(SyncError::Config(_))
        ));
        assert!(SyncConfig::from_toml_str(r#"schema_path = "s.json"
unknown = 1"#)
        .is_err());
        assert!(SyncConfig::from_toml_str(
            r#"schema_path = "s.json"
[store]
kind = "redis""#
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_load_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let schema_path = dir.path().join("schema.json");
        tokio::fs::write(
            &schema_path,
            r#"{"table": "user", "primaryKey": "id", "schema": {"type": "column", "column": "name"}}"#,
        )
        .await
        .unwrap();
        let config_path = dir.path().join("replicator.toml");
        tokio::fs::write(
            &config_path,
            "schema_path = \"schema.json\"\n[store]\nkind = \"sqlite\"\npath = \"state/pending.db\"\n",
        )
        .await
        .unwrap();

        let config = SyncConfig::load(&config_path).await.unwrap();
        assert_eq!(config.schema_path, schema_path);
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: dir.path().join("state/pending.db"),
                key: "pending".to_string(),
            }
        );

        let schema = config.load_schema().await.unwrap();
        assert_eq!(schema.table, "user");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = SyncConfig::load(Path::new("/nonexistent/replicator.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::File { .. }));
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let config = SyncConfig::from_toml_str(
            r#"schema_path = "s.json"
batch_size = 1"#,
        )
        .unwrap();
        let store = config.open_store().unwrap();
        store
            .add(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }
}
