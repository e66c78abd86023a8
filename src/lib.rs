//! # query-pager
//!
//! Page arbitrary SQL SELECT statements: LIMIT/OFFSET rewriting, COUNT
//! totals gated by a complexity heuristic, and page state for a batch of
//! statements.
//!
//! The heavy lifting lives in [`query_pager_core`]; this crate bundles its
//! components behind one configuration and writes COUNT outcomes back into
//! batch state. With the `sqlite` feature (on by default) it also re-exports
//! a read-only SQLite executor.
//!
//! # Example
//!
//! ```
//! use query_pager::Builder;
//!
//! let mut tools = Builder::new().default_page_size(25).build();
//! tools.initialize(&["SELECT * FROM users ORDER BY id"]).unwrap();
//!
//! let page = tools.paginate(0, Some(3), None).unwrap().unwrap();
//! assert_eq!(page.query, "SELECT * FROM users LIMIT 25 OFFSET 50 ORDER BY id");
//! ```

use std::sync::Arc;
use std::time::Duration;

use query_pager_core::{ComplexityScorer, PaginationContext, SqlPaginationRewriter};

mod config;
mod tools;

pub use config::PaginationConfig;
pub use tools::PaginationTools;

pub use query_pager_core::*;

#[cfg(feature = "sqlite")]
pub use query_pager_sqlite as sqlite;

/// Builder for [`PaginationTools`].
///
/// # Example
///
/// ```
/// use query_pager::Builder;
/// use std::time::Duration;
///
/// let tools = Builder::new()
///     .cache_size(500)
///     .cache_ttl(Duration::from_secs(60))
///     .max_complexity(5)
///     .build();
/// assert_eq!(tools.generator().cache_statistics().capacity, 500);
/// ```
#[derive(Debug, Default)]
pub struct Builder {
   config: PaginationConfig,
   scorer: Option<Arc<dyn ComplexityScorer>>,
   rewriter: Option<Arc<dyn SqlPaginationRewriter>>,
}

impl Builder {
   /// Create a new builder instance.
   pub fn new() -> Self {
      Self::default()
   }

   /// Replace the whole configuration.
   pub fn config(mut self, config: PaginationConfig) -> Self {
      self.config = config;
      self
   }

   pub fn cache_size(mut self, cache_size: usize) -> Self {
      self.config.cache_size = cache_size;
      self
   }

   pub fn cache_ttl(mut self, cache_ttl: Duration) -> Self {
      self.config.cache_ttl = cache_ttl;
      self
   }

   pub fn default_page_size(mut self, page_size: u64) -> Self {
      self.config.default_page_size = page_size;
      self
   }

   pub fn max_complexity(mut self, max_complexity: u32) -> Self {
      self.config.max_complexity = max_complexity;
      self
   }

   /// Use a custom complexity scorer for builders, analysis and COUNT gating.
   pub fn scorer(mut self, scorer: impl ComplexityScorer + 'static) -> Self {
      self.scorer = Some(Arc::new(scorer));
      self
   }

   /// Use a custom SQL rewriter for page and COUNT queries.
   pub fn rewriter(mut self, rewriter: impl SqlPaginationRewriter + 'static) -> Self {
      self.rewriter = Some(Arc::new(rewriter));
      self
   }

   /// Build the tools. Every component shares the same scorer and rewriter.
   pub fn build(self) -> PaginationTools {
      let mut context = PaginationContext::default();
      if let Some(scorer) = self.scorer {
         context.scorer = scorer;
      }
      if let Some(rewriter) = self.rewriter {
         context.rewriter = rewriter;
      }
      PaginationTools::new(self.config, context)
   }
}

/// Pagination tools with the default configuration.
pub fn init() -> PaginationTools {
   Builder::new().build()
}
