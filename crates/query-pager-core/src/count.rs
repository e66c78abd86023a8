//! COUNT query generation, execution and caching.
//!
//! [`CountQueryGenerator`] decides from a [`ComplexityAnalysis`] whether a
//! total-row COUNT can be derived for a statement and how. Totals obtained
//! through an injected [`QueryExecutor`] are kept in a bounded [`CountCache`]
//! keyed by connection and normalized query text.
//!
//! Strategy dispatch:
//!
//! | Strategy | COUNT query |
//! |---|---|
//! | `DIRECT_TRANSFORM` | leading `SELECT … FROM` becomes `SELECT COUNT(*) FROM` |
//! | `SIMPLE_SUBQUERY` | wrapped when DISTINCT or GROUP BY is present, else direct |
//! | `OPTIMIZED_SUBQUERY` | wrapped, with a grouped select list narrowed first |
//! | `CACHED_ESTIMATE` | none, only a cached or external total applies |
//! | `SKIP` | none |

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::Result;
use crate::complexity::{ComplexityAnalysis, CountStrategy, QueryFeatures};
use crate::executor::{QueryExecutor, parse_count};
use crate::pagination::PaginationContext;

/// Maximum number of cached totals.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// How long a cached total stays usable.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Analyzer score above which no COUNT is generated unless forced.
pub const DEFAULT_MAX_COUNT_COMPLEXITY: u32 = 8;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Canonical form of a query for cache keys: whitespace runs collapsed to
/// one space, lowercased, trailing terminator removed.
pub fn normalize_query(query: &str) -> String {
   let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
   match collapsed.strip_suffix(';') {
      Some(body) => body.trim_end().to_string(),
      None => collapsed,
   }
}

/// 64-bit FNV-1a.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
   bytes
      .iter()
      .fold(FNV_OFFSET_BASIS, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

type CacheKey = (String, u64);

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
   count: u64,
   inserted_at: Instant,
}

/// Bounded, time-limited store of COUNT results.
///
/// Eviction removes the oldest insertion when full; reads never refresh an
/// entry. Expired entries are dropped lazily on lookup or by [`sweep`].
///
/// [`sweep`]: CountCache::sweep
#[derive(Debug)]
pub struct CountCache {
   entries: IndexMap<CacheKey, CacheEntry>,
   capacity: usize,
   ttl: Duration,
}

impl Default for CountCache {
   fn default() -> Self {
      Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
   }
}

impl CountCache {
   pub fn new(capacity: usize, ttl: Duration) -> Self {
      Self {
         entries: IndexMap::with_capacity(capacity.min(DEFAULT_CACHE_CAPACITY)),
         capacity,
         ttl,
      }
   }

   fn key(query: &str, connection_id: &str) -> CacheKey {
      (
         connection_id.to_string(),
         fnv1a_64(normalize_query(query).as_bytes()),
      )
   }

   /// Cached total for `(query, connection_id)` if present and not expired.
   pub fn get(&mut self, query: &str, connection_id: &str) -> Option<u64> {
      self.get_at(query, connection_id, Instant::now())
   }

   fn get_at(&mut self, query: &str, connection_id: &str, now: Instant) -> Option<u64> {
      let key = Self::key(query, connection_id);
      let entry = *self.entries.get(&key)?;

      if now.saturating_duration_since(entry.inserted_at) > self.ttl {
         self.entries.shift_remove(&key);
         trace!(connection_id, "Expired count cache entry dropped");
         return None;
      }

      trace!(connection_id, count = entry.count, "Count cache hit");
      Some(entry.count)
   }

   /// Store a total, evicting the oldest insertion when full.
   pub fn insert(&mut self, query: &str, connection_id: &str, count: u64) {
      self.insert_at(query, connection_id, count, Instant::now());
   }

   fn insert_at(&mut self, query: &str, connection_id: &str, count: u64, now: Instant) {
      if self.capacity == 0 {
         return;
      }

      let key = Self::key(query, connection_id);
      // Re-inserting moves the key to the back of the eviction order
      self.entries.shift_remove(&key);

      while self.entries.len() >= self.capacity {
         if self.entries.shift_remove_index(0).is_some() {
            debug!("Evicted oldest count cache entry");
         }
      }

      self.entries.insert(
         key,
         CacheEntry {
            count,
            inserted_at: now,
         },
      );
   }

   /// Drop every expired entry. Returns how many were removed.
   pub fn sweep(&mut self) -> usize {
      self.sweep_at(Instant::now())
   }

   fn sweep_at(&mut self, now: Instant) -> usize {
      let before = self.entries.len();
      let ttl = self.ttl;
      self
         .entries
         .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) <= ttl);
      let removed = before - self.entries.len();
      if removed > 0 {
         debug!(removed, "Swept expired count cache entries");
      }
      removed
   }

   pub fn clear(&mut self) {
      self.entries.clear();
   }

   pub fn len(&self) -> usize {
      self.entries.len()
   }

   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }

   pub fn capacity(&self) -> usize {
      self.capacity
   }

   pub fn ttl(&self) -> Duration {
      self.ttl
   }
}

/// Snapshot of cache occupancy and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
   pub size: usize,
   pub capacity: usize,
   pub ttl: Duration,
}

/// Options for [`CountQueryGenerator::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountOptions {
   /// Connection the statement runs on. Without one the cache is bypassed.
   pub connection_id: Option<String>,

   /// Consult the cache before analyzing (default: true)
   pub use_cache: bool,

   /// Highest analyzer score that still gets a COUNT (default: 8)
   pub max_complexity: u32,

   /// Generate even for uncountable or too-complex statements (default: false)
   pub force_generate: bool,
}

impl Default for CountOptions {
   fn default() -> Self {
      Self {
         connection_id: None,
         use_cache: true,
         max_complexity: DEFAULT_MAX_COUNT_COMPLEXITY,
         force_generate: false,
      }
   }
}

impl CountOptions {
   /// Default options bound to a connection.
   pub fn for_connection(connection_id: impl Into<String>) -> Self {
      Self {
         connection_id: Some(connection_id.into()),
         ..Self::default()
      }
   }

   fn connection(&self) -> Option<&str> {
      self.connection_id.as_deref().filter(|id| !id.is_empty())
   }
}

/// Outcome of COUNT generation for one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountQueryResult {
   /// The COUNT statement to execute, if one was produced.
   pub query: Option<String>,
   pub strategy: CountStrategy,
   pub from_cache: bool,
   pub cached_result: Option<u64>,
   pub analysis: Option<ComplexityAnalysis>,
   /// Why no COUNT was produced.
   pub reason: Option<String>,
   pub warnings: Vec<String>,
   pub optimization_hints: Vec<String>,
   /// Failure text for [`CountStrategy::Error`] records.
   pub error: Option<String>,
   /// Set on batch results.
   pub original_query: Option<String>,
   /// Set on batch results.
   pub query_index: Option<usize>,
}

impl CountQueryResult {
   fn empty(strategy: CountStrategy) -> Self {
      Self {
         query: None,
         strategy,
         from_cache: false,
         cached_result: None,
         analysis: None,
         reason: None,
         warnings: Vec::new(),
         optimization_hints: Vec::new(),
         error: None,
         original_query: None,
         query_index: None,
      }
   }

   fn cached(count: u64) -> Self {
      Self {
         from_cache: true,
         cached_result: Some(count),
         ..Self::empty(CountStrategy::Cached)
      }
   }

   fn skipped(analysis: ComplexityAnalysis, reason: String) -> Self {
      Self {
         reason: Some(reason),
         warnings: analysis.warnings.clone(),
         analysis: Some(analysis),
         ..Self::empty(CountStrategy::Skip)
      }
   }

   fn failed(index: usize, original_query: &str, message: String) -> Self {
      Self {
         error: Some(message),
         original_query: Some(original_query.to_string()),
         query_index: Some(index),
         ..Self::empty(CountStrategy::Error)
      }
   }

   /// Whether a COUNT statement still has to be run to learn the total.
   pub fn needs_execution(&self) -> bool {
      !self.from_cache && self.query.is_some()
   }
}

/// Derives, runs and caches COUNT queries.
#[derive(Debug)]
pub struct CountQueryGenerator {
   cache: Mutex<CountCache>,
   context: PaginationContext,
}

impl Default for CountQueryGenerator {
   fn default() -> Self {
      Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
   }
}

impl CountQueryGenerator {
   pub fn new(cache_capacity: usize, cache_ttl: Duration) -> Self {
      Self::with_context(cache_capacity, cache_ttl, PaginationContext::default())
   }

   /// A generator using a custom scorer and rewriter.
   pub fn with_context(cache_capacity: usize, cache_ttl: Duration, context: PaginationContext) -> Self {
      Self {
         cache: Mutex::new(CountCache::new(cache_capacity, cache_ttl)),
         context,
      }
   }

   /// Decide whether and how to count `query`.
   ///
   /// A live cache entry short-circuits analysis entirely. Otherwise the
   /// statement is analyzed and skipped when uncountable or above
   /// `max_complexity`, unless `force_generate` is set.
   pub fn generate(&self, query: &str, options: &CountOptions) -> CountQueryResult {
      if let Some(count) = self.cached_count(query, options) {
         return CountQueryResult::cached(count);
      }

      let analysis = self.context.scorer.analyze(query);

      if !analysis.is_countable && !options.force_generate {
         return CountQueryResult::skipped(analysis, "query is not countable".to_string());
      }

      if analysis.score > options.max_complexity && !options.force_generate {
         let reason = format!(
            "complexity score {} exceeds limit {}",
            analysis.score, options.max_complexity
         );
         return CountQueryResult::skipped(analysis, reason);
      }

      let strategy = analysis.recommended_strategy;
      CountQueryResult {
         query: self.count_query_for(query, strategy, &analysis.features),
         strategy,
         warnings: analysis.warnings.clone(),
         optimization_hints: analysis.optimization_hints.clone(),
         analysis: Some(analysis),
         ..CountQueryResult::empty(strategy)
      }
   }

   fn cached_count(&self, query: &str, options: &CountOptions) -> Option<u64> {
      if !options.use_cache {
         return None;
      }
      let connection_id = options.connection()?;
      self.cache.lock().get(query, connection_id)
   }

   fn count_query_for(
      &self,
      query: &str,
      strategy: CountStrategy,
      features: &QueryFeatures,
   ) -> Option<String> {
      let rewriter = &self.context.rewriter;

      match strategy {
         CountStrategy::DirectTransform => {
            Some(rewriter.direct_count(&rewriter.strip_pagination(query)))
         }
         CountStrategy::SimpleSubquery => {
            let cleaned = rewriter.strip_pagination(query);
            if features.has_group_by || features.has_distinct {
               Some(rewriter.wrap_count(&cleaned))
            } else {
               Some(rewriter.direct_count(&cleaned))
            }
         }
         CountStrategy::OptimizedSubquery => {
            let cleaned = rewriter.strip_pagination(query);
            if features.has_group_by {
               Some(rewriter.wrap_count(&rewriter.reduce_to_grouping(&cleaned)))
            } else {
               Some(rewriter.wrap_count(&cleaned))
            }
         }
         CountStrategy::CachedEstimate => {
            debug!("Query too complex for a live COUNT, relying on cached estimates");
            None
         }
         CountStrategy::Skip | CountStrategy::Error | CountStrategy::Cached => None,
      }
   }

   /// Run [`generate`](Self::generate) over a batch.
   ///
   /// Entries are trimmed first; blank entries yield `None`. A panic while
   /// handling one entry becomes an `ERROR` record for that entry only.
   pub fn generate_batch<Q: AsRef<str>>(
      &self,
      queries: &[Q],
      options: &CountOptions,
   ) -> Vec<Option<CountQueryResult>> {
      queries
         .iter()
         .enumerate()
         .map(|(index, query)| {
            let query = query.as_ref().trim();
            if query.is_empty() {
               return None;
            }

            let result = match catch_unwind(AssertUnwindSafe(|| self.generate(query, options))) {
               Ok(result) => CountQueryResult {
                  original_query: Some(query.to_string()),
                  query_index: Some(index),
                  ..result
               },
               Err(payload) => {
                  let message = panic_message(payload.as_ref());
                  warn!(index, error = %message, "Failed to generate COUNT query");
                  CountQueryResult::failed(index, query, message)
               }
            };
            Some(result)
         })
         .collect()
   }

   /// Resolve the total for a generated COUNT, surfacing executor failures.
   ///
   /// Cached results return without I/O and a missing COUNT query yields 0.
   /// Otherwise the first column of the first row is parsed (0 when it is
   /// not a count) and cached under `(original_query, connection_id)`.
   pub async fn try_execute_count_query<E>(
      &self,
      executor: &E,
      connection_id: &str,
      info: &CountQueryResult,
      original_query: &str,
   ) -> Result<u64>
   where
      E: QueryExecutor + ?Sized,
   {
      if info.from_cache {
         return Ok(info.cached_result.unwrap_or(0));
      }

      let Some(count_query) = info.query.as_deref() else {
         return Ok(0);
      };

      let rows = executor.execute(connection_id, count_query).await?;
      let count = rows.first_value().and_then(parse_count).unwrap_or(0);

      if !connection_id.is_empty() {
         self.cache.lock().insert(original_query, connection_id, count);
      }

      Ok(count)
   }

   /// Like [`try_execute_count_query`](Self::try_execute_count_query), but
   /// an executor failure is logged and reported as 0.
   pub async fn execute_count_query_with_cache<E>(
      &self,
      executor: &E,
      connection_id: &str,
      info: &CountQueryResult,
      original_query: &str,
   ) -> u64
   where
      E: QueryExecutor + ?Sized,
   {
      match self
         .try_execute_count_query(executor, connection_id, info, original_query)
         .await
      {
         Ok(count) => count,
         Err(e) => {
            warn!(connection_id, error = %e, "COUNT query execution failed");
            0
         }
      }
   }

   pub fn cache_statistics(&self) -> CacheStatistics {
      let cache = self.cache.lock();
      CacheStatistics {
         size: cache.len(),
         capacity: cache.capacity(),
         ttl: cache.ttl(),
      }
   }

   /// Drop expired cache entries now. Returns how many were removed.
   pub fn cleanup_cache(&self) -> usize {
      self.cache.lock().sweep()
   }

   pub fn clear_cache(&self) {
      self.cache.lock().clear();
   }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
   if let Some(message) = payload.downcast_ref::<&str>() {
      (*message).to_string()
   } else if let Some(message) = payload.downcast_ref::<String>() {
      message.clone()
   } else {
      "unknown error while generating COUNT query".to_string()
   }
}
