//! Error types for query-pager-sqlite

use thiserror::Error;

/// Errors that may occur while running COUNT queries against SQLite
#[derive(Error, Debug)]
pub enum Error {
   /// IO error when accessing database files. Standard library IO errors
   /// are converted to this variant.
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),

   /// Error from the sqlx library. Standard sqlx errors are converted to this variant
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// No database was registered under this connection id
   #[error("unknown connection: {0}")]
   UnknownConnection(String),

   /// The executor has been closed and cannot be used
   #[error("executor has been closed")]
   ExecutorClosed,
}

impl Error {
   /// Machine-readable error code.
   pub fn error_code(&self) -> String {
      match self {
         Error::Io(_) => "IO_ERROR".to_string(),
         Error::Sqlx(_) => "SQLX_ERROR".to_string(),
         Error::UnknownConnection(_) => "UNKNOWN_CONNECTION".to_string(),
         Error::ExecutorClosed => "EXECUTOR_CLOSED".to_string(),
      }
   }
}

/// Executor failures surface to pagination as execution errors
impl From<Error> for query_pager_core::Error {
   fn from(err: Error) -> Self {
      query_pager_core::Error::Execution(err.to_string())
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
