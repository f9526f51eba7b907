//! Session context: placeholder generation and the schema registry
//!
//! One `Session` exists per connection/session and is injected into every
//! record built on it. It owns the two pieces of shared state the engine
//! needs: the monotonic placeholder counter and the read-mostly table
//! schema cache. There are no hidden globals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::schema::{SchemaSource, TableSchema};
use crate::Result;

/// Shared per-session state for records
#[derive(Debug, Default)]
pub struct Session {
    counter: AtomicU64,
    schemas: RwLock<HashMap<String, Arc<TableSchema>>>,
}

impl Session {
    /// Placeholder token prefix; tokens are `:ph1`, `:ph2`, ...
    pub const PLACEHOLDER_PREFIX: &'static str = ":ph";

    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Generate the next placeholder token.
    ///
    /// Tokens are unique for the lifetime of the session, even when several
    /// records build statements concurrently on the same connection.
    pub fn placeholder(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}", Self::PLACEHOLDER_PREFIX, n)
    }

    /// Get the schema for `table`, loading it through `source` on first use.
    ///
    /// The loaded schema is cached for the session; later calls share the
    /// same `Arc` without touching the source again.
    pub async fn schema<S>(&self, table: &str, source: &S) -> Result<Arc<TableSchema>>
    where
        S: SchemaSource,
    {
        if let Some(schema) = self.schemas.read().await.get(table) {
            return Ok(schema.clone());
        }
        let columns = source.load_columns(table).await?;
        let mut schemas = self.schemas.write().await;
        // a racing loader may have won; keep whichever landed first
        let schema = schemas
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(TableSchema::new(table, columns)));
        Ok(schema.clone())
    }
}
