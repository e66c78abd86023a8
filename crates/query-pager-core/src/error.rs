/// Result type alias for pagination operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for query pagination.
///
/// Analysis and rewriting never fail; these cover invalid caller input,
/// failures reported by an injected executor, and snapshot decoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Page numbers are 1-based.
   #[error("page number must be at least 1")]
   InvalidPage,

   /// Page size must be greater than zero.
   #[error("page size must be greater than zero")]
   InvalidPageSize,

   /// The injected executor failed to run a COUNT query.
   #[error("count query execution failed: {0}")]
   Execution(String),

   /// A batch snapshot could not be encoded or decoded.
   #[error("invalid pagination snapshot: {0}")]
   Snapshot(#[from] serde_json::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::InvalidPage => "INVALID_PAGE".to_string(),
         Error::InvalidPageSize => "INVALID_PAGE_SIZE".to_string(),
         Error::Execution(_) => "EXECUTION_FAILED".to_string(),
         Error::Snapshot(_) => "INVALID_SNAPSHOT".to_string(),
      }
   }
}
