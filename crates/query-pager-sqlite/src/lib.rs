//! # query-pager-sqlite
//!
//! Runs the COUNT queries derived by `query-pager-core` against SQLite
//! databases through sqlx.
//!
//! ## Core Types
//!
//! - **[`SqliteCountExecutor`]**: a [`QueryExecutor`](query_pager_core::QueryExecutor)
//!   holding one read-only pool per connection id
//! - **[`SqliteExecutorConfig`]**: pool size and idle timeout
//! - **[`Error`]**: error type for registration and execution
//!
//! Pools are opened with `read_only(true)`, so a COUNT (or anything else
//! sent through the executor) can never modify the database.

mod config;
mod error;
mod executor;

// Re-export public types
pub use config::SqliteExecutorConfig;
pub use error::{Error, Result};
pub use executor::SqliteCountExecutor;
