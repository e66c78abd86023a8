//! Configuration for the read-only pools behind a [`SqliteCountExecutor`]
//!
//! [`SqliteCountExecutor`]: crate::SqliteCountExecutor

use std::time::Duration;

/// Pool settings applied to each registered database
///
/// # Examples
///
/// ```
/// use query_pager_sqlite::SqliteExecutorConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = SqliteExecutorConfig::default();
///
/// // Override just one field
/// let config = SqliteExecutorConfig {
///     max_read_connections: 2,
///     ..Default::default()
/// };
/// assert_eq!(config.idle_timeout, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct SqliteExecutorConfig {
   /// Maximum number of concurrent read connections per database
   ///
   /// COUNT queries for different statements of a batch may run at the same
   /// time; each holds one connection until it completes.
   ///
   /// Default: 6
   pub max_read_connections: u32,

   /// Idle timeout for pooled connections
   ///
   /// Connections that remain idle for this duration will be closed automatically.
   ///
   /// Default: 30 seconds
   pub idle_timeout: Duration,
}

impl Default for SqliteExecutorConfig {
   fn default() -> Self {
      Self {
         max_read_connections: 6,
         idle_timeout: Duration::from_secs(30),
      }
   }
}
