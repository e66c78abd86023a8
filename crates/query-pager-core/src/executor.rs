//! The injected capability used to run COUNT queries.
//!
//! The core never connects to a database. Whoever owns the connections
//! supplies a [`QueryExecutor`], either a type implementing the trait or any
//! `Fn(String, String) -> impl Future<Output = Result<QueryRows>>` closure.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::Result;

/// Rows returned by an executor, as ordered column values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
   pub rows: Vec<Vec<JsonValue>>,
}

impl QueryRows {
   pub fn new(rows: Vec<Vec<JsonValue>>) -> Self {
      Self { rows }
   }

   /// The first column of the first row, if any.
   pub fn first_value(&self) -> Option<&JsonValue> {
      self.rows.first().and_then(|row| row.first())
   }
}

/// Boxed future returned by [`QueryExecutor::execute`].
pub type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = Result<QueryRows>> + Send + 'a>>;

/// Runs SQL text against a connection the host application owns.
pub trait QueryExecutor: Send + Sync {
   fn execute<'a>(&'a self, connection_id: &'a str, sql: &'a str) -> ExecuteFuture<'a>;
}

impl<F, Fut> QueryExecutor for F
where
   F: Fn(String, String) -> Fut + Send + Sync,
   Fut: Future<Output = Result<QueryRows>> + Send + 'static,
{
   fn execute<'a>(&'a self, connection_id: &'a str, sql: &'a str) -> ExecuteFuture<'a> {
      Box::pin(self(connection_id.to_string(), sql.to_string()))
   }
}

/// Read a row count out of a result value.
///
/// Integers are taken as-is, floats are truncated and strings contribute
/// their leading decimal digits. Negative, empty or non-numeric values
/// yield `None`.
pub fn parse_count(value: &JsonValue) -> Option<u64> {
   match value {
      JsonValue::Number(n) => n.as_u64().or_else(|| {
         n.as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.trunc() as u64)
      }),
      JsonValue::String(s) => {
         let s = s.trim_start();
         let digits = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
         s[..digits].parse().ok()
      }
      _ => None,
   }
}
