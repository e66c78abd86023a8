use std::collections::BTreeMap;

use futures::future::join_all;
use query_pager_core::{
   BatchOptions, BatchTracker, ComplexityAnalysis, CountOptions, CountQueryGenerator,
   CountQueryResult, PaginatedQuery, PaginationBuilder, PaginationContext, QueryExecutor, Result,
   StateUpdate,
};
use tracing::{debug, warn};

use crate::config::PaginationConfig;

/// The pagination components of one batch, sharing a single configuration
/// and a single scorer/rewriter pair.
///
/// Create one with [`Builder`](crate::Builder). COUNT refreshes write their
/// outcome (total, loading flag, failure text) straight into the tracker's
/// state for that position.
#[derive(Debug)]
pub struct PaginationTools {
   config: PaginationConfig,
   context: PaginationContext,
   generator: CountQueryGenerator,
   tracker: BatchTracker,
}

impl PaginationTools {
   pub(crate) fn new(config: PaginationConfig, context: PaginationContext) -> Self {
      let defaults = BatchOptions {
         default_page_size: config.default_page_size,
         ..BatchOptions::default()
      };

      Self {
         generator: CountQueryGenerator::with_context(
            config.cache_size,
            config.cache_ttl,
            context.clone(),
         ),
         tracker: BatchTracker::with_context(context.clone(), defaults),
         context,
         config,
      }
   }

   pub fn config(&self) -> &PaginationConfig {
      &self.config
   }

   /// A standalone builder for `query` using this bundle's scorer and rewriter.
   pub fn create_builder(&self, query: &str) -> PaginationBuilder {
      PaginationBuilder::with_context(query, self.context.clone())
   }

   pub fn analyze_complexity(&self, query: &str) -> ComplexityAnalysis {
      self.context.scorer.analyze(query)
   }

   /// Count options bound to `connection_id` with the configured maximum
   /// complexity.
   pub fn count_options(&self, connection_id: &str) -> CountOptions {
      CountOptions {
         max_complexity: self.config.max_complexity,
         ..CountOptions::for_connection(connection_id)
      }
   }

   pub fn generate_count(&self, query: &str, connection_id: &str) -> CountQueryResult {
      self.generator.generate(query, &self.count_options(connection_id))
   }

   pub fn generator(&self) -> &CountQueryGenerator {
      &self.generator
   }

   pub fn tracker(&self) -> &BatchTracker {
      &self.tracker
   }

   pub fn tracker_mut(&mut self) -> &mut BatchTracker {
      &mut self.tracker
   }

   /// Register a batch with the configured default page size.
   pub fn initialize<Q: AsRef<str>>(&mut self, queries: &[Q]) -> Result<usize> {
      let options = BatchOptions {
         default_page_size: self.config.default_page_size,
         ..BatchOptions::default()
      };
      self.tracker.initialize(queries, &options)
   }

   pub fn paginate(
      &mut self,
      index: usize,
      page: Option<u64>,
      page_size: Option<u64>,
   ) -> Result<Option<PaginatedQuery>> {
      self.tracker.get_paginated_query(index, page, page_size)
   }

   /// Resolve the total for one registered position and store it.
   ///
   /// Returns `Ok(None)` when the position is not registered, when no live
   /// COUNT exists for it (the reason lands in `count_error`) or when the
   /// executor fails (the failure text lands in `count_error`). Only invalid
   /// tracker input is an `Err`.
   pub async fn refresh_count<E>(
      &mut self,
      index: usize,
      executor: &E,
      connection_id: &str,
   ) -> Result<Option<u64>>
   where
      E: QueryExecutor + ?Sized,
   {
      let Some(state) = self.tracker.get_state(index) else {
         return Ok(None);
      };

      let info = self.generate_count(&state.original_query, connection_id);
      if !info.from_cache && info.query.is_none() {
         self.record_skip(index, &info)?;
         return Ok(None);
      }

      self.tracker.update_state(index, &StateUpdate::new().count_loading(true))?;
      let outcome = self
         .generator
         .try_execute_count_query(executor, connection_id, &info, &state.original_query)
         .await;
      self.record_outcome(index, outcome)
   }

   /// [`refresh_count`](Self::refresh_count) for every registered position,
   /// running the COUNT queries concurrently.
   pub async fn refresh_all_counts<E>(
      &mut self,
      executor: &E,
      connection_id: &str,
   ) -> Result<BTreeMap<usize, Option<u64>>>
   where
      E: QueryExecutor + ?Sized,
   {
      let mut results = BTreeMap::new();
      let mut pending = Vec::new();

      for (index, state) in self.tracker.get_all_states() {
         let info = self.generate_count(&state.original_query, connection_id);
         if !info.from_cache && info.query.is_none() {
            self.record_skip(index, &info)?;
            results.insert(index, None);
            continue;
         }
         self.tracker.update_state(index, &StateUpdate::new().count_loading(true))?;
         pending.push((index, state.original_query, info));
      }

      debug!(pending = pending.len(), skipped = results.len(), "Refreshing batch counts");

      let generator = &self.generator;
      let outcomes = join_all(pending.iter().map(|(_, query, info)| {
         generator.try_execute_count_query(executor, connection_id, info, query)
      }))
      .await;

      for ((index, _, _), outcome) in pending.iter().zip(outcomes) {
         let total = self.record_outcome(*index, outcome)?;
         results.insert(*index, total);
      }
      Ok(results)
   }

   fn record_skip(&mut self, index: usize, info: &CountQueryResult) -> Result<()> {
      let reason = info
         .reason
         .clone()
         .unwrap_or_else(|| format!("no live COUNT for strategy {}", info.strategy));
      debug!(index, reason = %reason, "Skipping count refresh");

      self
         .tracker
         .update_state(index, &StateUpdate::new().count_loading(false).count_error(reason))?;
      Ok(())
   }

   fn record_outcome(&mut self, index: usize, outcome: Result<u64>) -> Result<Option<u64>> {
      match outcome {
         Ok(total) => {
            let update = StateUpdate::new()
               .total_records(total)
               .count_loading(false)
               .clear_count_error();
            self.tracker.update_state(index, &update)?;
            Ok(Some(total))
         }
         Err(e) => {
            warn!(index, error = %e, "Count refresh failed");
            let update = StateUpdate::new().count_loading(false).count_error(e.to_string());
            self.tracker.update_state(index, &update)?;
            Ok(None)
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::Builder;

   #[test]
   fn count_options_carry_max_complexity() {
      let tools = Builder::new().max_complexity(3).build();
      let options = tools.count_options("main");

      assert_eq!(options.connection_id.as_deref(), Some("main"));
      assert_eq!(options.max_complexity, 3);
      assert!(options.use_cache);
   }

   #[test]
   fn initialize_uses_configured_page_size() {
      let mut tools = Builder::new().default_page_size(50).build();
      tools.initialize(&["SELECT * FROM users"]).unwrap();

      assert_eq!(tools.tracker().get_state(0).unwrap().page_size, 50);
   }

   #[test]
   fn create_builder_shares_rewriter() {
      let tools = PaginationTools::new(PaginationConfig::default(), PaginationContext::default());
      let builder = tools.create_builder("SELECT * FROM users ORDER BY id");

      assert_eq!(
         builder.build_paginated_query(2, 5, true),
         "SELECT * FROM users LIMIT 5 OFFSET 5 ORDER BY id"
      );
   }
}
