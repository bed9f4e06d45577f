// ABOUTME: PostgreSQL adapter - connections and the QueryClient implementation
// ABOUTME: TLS through native-tls, connection task errors surfaced via tracing

pub mod rows;

use anyhow::{Context, Result};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

use crate::client::{QueryClient, Row};
use crate::utils::{retry_with_backoff, strip_password_from_url, validate_connection_string};

pub use rows::{row_to_map, TextParam};

/// Open a connection to `url` and drive it on a background task.
///
/// TLS is negotiated according to the URL's `sslmode`. Errors on the
/// connection task after startup are logged, not returned.
pub async fn connect(url: &str) -> Result<Client> {
    validate_connection_string(url)?;

    let connector = TlsConnector::builder()
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(connector);

    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .with_context(|| format!("Failed to connect to {}", strip_password_from_url(url)))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(client)
}

/// [`connect`] with three retries and exponential backoff from one second.
pub async fn connect_with_retry(url: &str) -> Result<Client> {
    retry_with_backoff(|| connect(url), 3, Duration::from_secs(1)).await
}

#[async_trait]
impl QueryClient for Client {
    async fn query(&self, sql: &str, values: &[String]) -> Result<Vec<Row>> {
        let params: Vec<TextParam<'_>> = values.iter().map(|v| TextParam(v.as_str())).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        tracing::trace!(sql, values = values.len(), "Executing query");
        let rows = Client::query(self, sql, &refs)
            .await
            .with_context(|| format!("Query failed: {}", sql))?;

        rows.iter().map(row_to_map).collect()
    }
}
