//! A [`QueryExecutor`] over registered SQLite databases

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use query_pager_core::{ExecuteFuture, QueryExecutor, QueryRows};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, trace};

use crate::config::SqliteExecutorConfig;
use crate::error::{Error, Result};

/// Runs COUNT queries on read-only SQLite pools keyed by connection id.
///
/// ## State Management
///
/// - **`pools`**: one read-only pool per registered connection id
/// - **`closed`**: prevents use after [`close_all`](Self::close_all)
///
/// The pool map lock is only held to look up or swap a pool, never while a
/// query runs.
#[derive(Debug, Default)]
pub struct SqliteCountExecutor {
   pools: RwLock<IndexMap<String, Pool<Sqlite>>>,
   closed: AtomicBool,
}

impl SqliteCountExecutor {
   pub fn new() -> Self {
      Self::default()
   }

   /// Open `path` read-only and register it under `connection_id`.
   ///
   /// The file must already exist. Re-registering an id replaces its pool.
   pub async fn register(
      &self,
      connection_id: impl Into<String>,
      path: impl AsRef<Path>,
      config: &SqliteExecutorConfig,
   ) -> Result<()> {
      self.ensure_open()?;

      let path = path.as_ref();
      tokio::fs::metadata(path).await?;

      let options = SqliteConnectOptions::new().filename(path).read_only(true);
      let pool = SqlitePoolOptions::new()
         .max_connections(config.max_read_connections)
         .idle_timeout(config.idle_timeout)
         .connect_with(options)
         .await?;

      let connection_id = connection_id.into();
      debug!(
         connection_id = %connection_id,
         path = %path.display(),
         max_connections = config.max_read_connections,
         "Registered read-only count pool"
      );
      if let Some(previous) = self.register_pool(connection_id, pool) {
         previous.close().await;
      }
      Ok(())
   }

   /// Register an existing pool. Returns the pool it replaced, if any.
   pub fn register_pool(
      &self,
      connection_id: impl Into<String>,
      pool: Pool<Sqlite>,
   ) -> Option<Pool<Sqlite>> {
      self.pools.write().insert(connection_id.into(), pool)
   }

   /// Registered connection ids in registration order.
   pub fn connection_ids(&self) -> Vec<String> {
      self.pools.read().keys().cloned().collect()
   }

   /// Run `sql` on the pool registered as `connection_id`.
   pub async fn fetch_rows(&self, connection_id: &str, sql: &str) -> Result<QueryRows> {
      self.ensure_open()?;

      let pool = self
         .pools
         .read()
         .get(connection_id)
         .cloned()
         .ok_or_else(|| Error::UnknownConnection(connection_id.to_string()))?;

      trace!(connection_id, sql, "Running count query");
      let rows = sqlx::query(sql).fetch_all(&pool).await?;
      Ok(QueryRows::new(rows.iter().map(decode_row).collect()))
   }

   /// Close every pool. The executor rejects all later calls.
   pub async fn close_all(&self) {
      if self.closed.swap(true, Ordering::SeqCst) {
         return;
      }

      let pools: Vec<Pool<Sqlite>> = self.pools.write().drain(..).map(|(_, pool)| pool).collect();
      debug!("Closing {} count pool(s)", pools.len());
      for pool in pools {
         pool.close().await;
      }
   }

   fn ensure_open(&self) -> Result<()> {
      if self.closed.load(Ordering::SeqCst) {
         return Err(Error::ExecutorClosed);
      }
      Ok(())
   }
}

impl QueryExecutor for SqliteCountExecutor {
   fn execute<'a>(&'a self, connection_id: &'a str, sql: &'a str) -> ExecuteFuture<'a> {
      Box::pin(async move {
         self
            .fetch_rows(connection_id, sql)
            .await
            .map_err(query_pager_core::Error::from)
      })
   }
}

/// Decode a row positionally. SQLite is dynamically typed, so each column
/// is tried as integer, then real, then text.
fn decode_row(row: &SqliteRow) -> Vec<JsonValue> {
   (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &SqliteRow, idx: usize) -> JsonValue {
   if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
      return v.map(JsonValue::from).unwrap_or(JsonValue::Null);
   }
   if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
      return v
         .and_then(serde_json::Number::from_f64)
         .map(JsonValue::Number)
         .unwrap_or(JsonValue::Null);
   }
   if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
      return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
   }
   JsonValue::Null
}
