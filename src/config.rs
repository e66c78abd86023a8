use std::time::Duration;

use query_pager_core::count::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_MAX_COUNT_COMPLEXITY};
use query_pager_core::batch::DEFAULT_PAGE_SIZE;

/// Settings shared by every component of a [`PaginationTools`](crate::PaginationTools)
///
/// # Examples
///
/// ```
/// use query_pager::PaginationConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = PaginationConfig::default();
///
/// // Override just one field
/// let config = PaginationConfig {
///     default_page_size: 50,
///     ..Default::default()
/// };
/// assert_eq!(config.cache_ttl, Duration::from_secs(300));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
   /// Maximum number of cached COUNT totals
   ///
   /// The oldest entry is evicted when the cache is full. Zero disables caching.
   ///
   /// Default: 100
   pub cache_size: usize,

   /// How long a cached COUNT total stays valid
   ///
   /// Default: 5 minutes
   pub cache_ttl: Duration,

   /// Page size for statements without a LIMIT of their own
   ///
   /// Default: 20
   pub default_page_size: u64,

   /// Highest complexity score that still gets a live COUNT
   ///
   /// Default: 8
   pub max_complexity: u32,
}

impl Default for PaginationConfig {
   fn default() -> Self {
      Self {
         cache_size: DEFAULT_CACHE_CAPACITY,
         cache_ttl: DEFAULT_CACHE_TTL,
         default_page_size: DEFAULT_PAGE_SIZE,
         max_complexity: DEFAULT_MAX_COUNT_COMPLEXITY,
      }
   }
}
