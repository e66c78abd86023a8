//! Per-statement pagination state for a batch of statements.
//!
//! A [`BatchTracker`] registers every paginable statement of an ordered batch
//! under its position and keeps a [`PaginationState`] next to the statement's
//! [`PaginationBuilder`]. Each position moves through
//! [`PaginationPhase::Unregistered`] → `Registered` → `Counted` (once totals
//! arrive) → `Registered` (after a reset) and finally back to `Unregistered`
//! when the tracker is cleaned up.
//!
//! The tracker is plain `&mut self` state; callers serialize their own
//! updates per position.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pagination::{PaginationBuilder, PaginationContext};
use crate::{Error, Result};

/// Page size used when a statement carries no usable limit of its own.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// How a user-written LIMIT is treated when paginating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserLimitMode {
   /// The user's LIMIT becomes the page size.
   #[default]
   Preserve,
   /// The configured page size replaces the user's LIMIT.
   Override,
   /// Reserved for interactive hosts. Behaves like `Preserve`.
   AskUser,
}

impl UserLimitMode {
   pub fn respects_user_limit(self) -> bool {
      !matches!(self, UserLimitMode::Override)
   }
}

/// Options for [`BatchTracker::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchOptions {
   /// Page size for statements without a user limit (default: 20)
   pub default_page_size: u64,

   /// Use a statement's own LIMIT as its page size (default: true)
   pub respect_user_limit: bool,

   /// Register nothing when false (default: true)
   pub enable_pagination: bool,
}

impl Default for BatchOptions {
   fn default() -> Self {
      Self {
         default_page_size: DEFAULT_PAGE_SIZE,
         respect_user_limit: true,
         enable_pagination: true,
      }
   }
}

impl BatchOptions {
   pub fn with_user_limit_mode(mut self, mode: UserLimitMode) -> Self {
      self.respect_user_limit = mode.respects_user_limit();
      self
   }
}

/// Mutable pagination progress of one registered statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
   pub current_page: u64,
   pub page_size: u64,
   pub total_records: u64,
   pub total_pages: u64,
   pub has_more: bool,
   pub is_count_loading: bool,
   pub count_error: Option<String>,
   pub original_query: String,
   pub has_user_limit: bool,
   pub user_limit: Option<u64>,
   pub user_offset: Option<u64>,
   /// Structure-complexity from the statement's pagination profile.
   pub complexity: u32,
}

impl PaginationState {
   fn clear_counts(&mut self) {
      self.current_page = 1;
      self.total_records = 0;
      self.total_pages = 0;
      self.has_more = false;
      self.is_count_loading = false;
      self.count_error = None;
   }
}

fn total_pages(total_records: u64, page_size: u64) -> u64 {
   if total_records == 0 || page_size == 0 {
      0
   } else {
      total_records.div_ceil(page_size)
   }
}

/// Fields to merge into a [`PaginationState`]. `None` leaves a field as is.
///
/// ```
/// use query_pager_core::batch::StateUpdate;
///
/// let update = StateUpdate::new().total_records(100).current_page(3);
/// assert_eq!(update.total_records, Some(100));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateUpdate {
   pub current_page: Option<u64>,
   pub page_size: Option<u64>,
   pub total_records: Option<u64>,
   pub total_pages: Option<u64>,
   pub has_more: Option<bool>,
   pub is_count_loading: Option<bool>,
   /// `Some(None)` clears a stored error.
   pub count_error: Option<Option<String>>,
}

impl StateUpdate {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn current_page(mut self, page: u64) -> Self {
      self.current_page = Some(page);
      self
   }

   pub fn page_size(mut self, page_size: u64) -> Self {
      self.page_size = Some(page_size);
      self
   }

   pub fn total_records(mut self, total_records: u64) -> Self {
      self.total_records = Some(total_records);
      self
   }

   pub fn total_pages(mut self, total_pages: u64) -> Self {
      self.total_pages = Some(total_pages);
      self
   }

   pub fn has_more(mut self, has_more: bool) -> Self {
      self.has_more = Some(has_more);
      self
   }

   pub fn count_loading(mut self, loading: bool) -> Self {
      self.is_count_loading = Some(loading);
      self
   }

   pub fn count_error(mut self, error: impl Into<String>) -> Self {
      self.count_error = Some(Some(error.into()));
      self
   }

   pub fn clear_count_error(mut self) -> Self {
      self.count_error = Some(None);
      self
   }

   fn validate(&self) -> Result<()> {
      if self.current_page == Some(0) {
         return Err(Error::InvalidPage);
      }
      if self.page_size == Some(0) {
         return Err(Error::InvalidPageSize);
      }
      Ok(())
   }

   /// Merge into `state`, then recompute total pages and has-more in that
   /// order.
   fn apply(&self, state: &mut PaginationState) {
      if let Some(page) = self.current_page {
         state.current_page = page;
      }
      if let Some(page_size) = self.page_size {
         state.page_size = page_size;
      }
      if let Some(total_records) = self.total_records {
         state.total_records = total_records;
      }
      if let Some(pages) = self.total_pages {
         state.total_pages = pages;
      }
      if let Some(has_more) = self.has_more {
         state.has_more = has_more;
      }
      if let Some(loading) = self.is_count_loading {
         state.is_count_loading = loading;
      }
      if let Some(error) = &self.count_error {
         state.count_error = error.clone();
      }

      let recount = self.total_records.is_some() || self.page_size.is_some();
      if recount {
         state.total_pages = total_pages(state.total_records, state.page_size);
      }
      if recount || self.current_page.is_some() || self.total_pages.is_some() {
         state.has_more = state.current_page < state.total_pages;
      }
   }
}

/// Where a position is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaginationPhase {
   /// No builder at this position.
   Unregistered,
   /// Registered, no totals known.
   Registered,
   /// Totals were supplied by an update.
   Counted,
}

/// Metadata returned with a page query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
   pub index: usize,
   pub current_page: u64,
   pub page_size: u64,
   pub has_user_limit: bool,
   pub user_limit: Option<u64>,
   pub complexity: u32,
   /// Whether a basic COUNT query accompanies the page query.
   pub needs_count: bool,
}

/// A page query for one registered statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedQuery {
   pub query: String,
   pub count_query: Option<String>,
   pub original_query: String,
   pub meta: PaginationMeta,
}

/// Aggregate view over the registered statements.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatistics {
   /// Statements passed to the last initialization.
   pub total_queries: usize,
   /// Statements registered for pagination.
   pub paginable_queries: usize,
   pub queries_with_user_limit: usize,
   /// Mean structure-complexity (0 when nothing is registered).
   pub average_complexity: f64,
}

/// [`PaginationState`] without the statement text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPaginationState {
   pub current_page: u64,
   pub page_size: u64,
   pub total_records: u64,
   pub total_pages: u64,
   pub has_more: bool,
   pub is_count_loading: bool,
   pub count_error: Option<String>,
   pub has_user_limit: bool,
   pub user_limit: Option<u64>,
   pub user_offset: Option<u64>,
   pub complexity: u32,
   /// Whether the statement's own LIMIT drives its pages. Snapshots written
   /// without it restore as `true`.
   #[serde(default = "respect_user_limit_default")]
   pub respect_user_limit: bool,
}

fn respect_user_limit_default() -> bool {
   true
}

impl From<&PaginationState> for SavedPaginationState {
   fn from(state: &PaginationState) -> Self {
      Self {
         current_page: state.current_page,
         page_size: state.page_size,
         total_records: state.total_records,
         total_pages: state.total_pages,
         has_more: state.has_more,
         is_count_loading: state.is_count_loading,
         count_error: state.count_error.clone(),
         has_user_limit: state.has_user_limit,
         user_limit: state.user_limit,
         user_offset: state.user_offset,
         complexity: state.complexity,
         respect_user_limit: respect_user_limit_default(),
      }
   }
}

impl SavedPaginationState {
   fn validate(&self) -> Result<()> {
      if self.current_page == 0 {
         return Err(Error::InvalidPage);
      }
      if self.page_size == 0 {
         return Err(Error::InvalidPageSize);
      }
      Ok(())
   }

   fn restore_into(&self, state: &mut PaginationState) {
      state.current_page = self.current_page;
      state.page_size = self.page_size;
      state.total_records = self.total_records;
      state.total_pages = self.total_pages;
      state.has_more = self.has_more;
      state.is_count_loading = self.is_count_loading;
      state.count_error = self.count_error.clone();
      state.has_user_limit = self.has_user_limit;
      state.user_limit = self.user_limit;
      state.user_offset = self.user_offset;
      state.complexity = self.complexity;
   }
}

/// Serializable pagination progress of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSnapshot {
   /// `(position, statement)` for every registered position.
   pub queries: Vec<(usize, String)>,
   /// `(position, state)` for every registered position.
   pub states: Vec<(usize, SavedPaginationState)>,
}

impl BatchSnapshot {
   pub fn to_json(&self) -> Result<String> {
      Ok(serde_json::to_string(self)?)
   }

   pub fn from_json(json: &str) -> Result<Self> {
      Ok(serde_json::from_str(json)?)
   }
}

#[derive(Debug, Clone)]
struct Registration {
   builder: PaginationBuilder,
   state: PaginationState,
   respect_user_limit: bool,
   counted: bool,
}

/// Tracks pagination state for each paginable statement of a batch.
#[derive(Debug, Default)]
pub struct BatchTracker {
   registrations: BTreeMap<usize, Registration>,
   batch_size: usize,
   context: PaginationContext,
   defaults: BatchOptions,
}

impl BatchTracker {
   pub fn new() -> Self {
      Self::default()
   }

   /// A tracker with a custom scorer and rewriter. `defaults` apply when a
   /// snapshot is imported.
   pub fn with_context(context: PaginationContext, defaults: BatchOptions) -> Self {
      Self {
         registrations: BTreeMap::new(),
         batch_size: 0,
         context,
         defaults,
      }
   }

   /// Register every paginable statement of `queries` by position.
   ///
   /// Blank and non-SELECT statements are skipped, as is everything when
   /// pagination is disabled. Registrations left from an earlier batch are
   /// replaced or, when their position no longer registers, dropped.
   /// Returns the number of statements registered by this call.
   pub fn initialize<Q: AsRef<str>>(&mut self, queries: &[Q], options: &BatchOptions) -> Result<usize> {
      if options.default_page_size == 0 {
         return Err(Error::InvalidPageSize);
      }

      self.batch_size = queries.len();
      self.registrations.retain(|&index, _| index < queries.len());
      let mut registered = 0;

      for (index, query) in queries.iter().enumerate() {
         let query = query.as_ref().trim();
         if query.is_empty() || !options.enable_pagination {
            self.registrations.remove(&index);
            continue;
         }

         let builder = PaginationBuilder::with_context(query, self.context.clone());
         if !builder.is_paginable() {
            self.registrations.remove(&index);
            continue;
         }

         let profile = builder.profile();
         let page_size = match profile.user_limit {
            Some(limit) if options.respect_user_limit && limit > 0 => limit,
            _ => options.default_page_size,
         };

         let state = PaginationState {
            current_page: 1,
            page_size,
            total_records: 0,
            total_pages: 0,
            has_more: false,
            is_count_loading: false,
            count_error: None,
            original_query: profile.original_query.clone(),
            has_user_limit: profile.has_user_limit,
            user_limit: profile.user_limit,
            user_offset: profile.user_offset,
            complexity: profile.complexity,
         };

         self.registrations.insert(
            index,
            Registration {
               builder,
               state,
               respect_user_limit: options.respect_user_limit,
               counted: false,
            },
         );
         registered += 1;
      }

      debug!(
         total = queries.len(),
         paginable = registered,
         "Initialized batch pagination"
      );
      Ok(registered)
   }

   /// Build the page query for a position.
   ///
   /// A supplied `page` or `page_size` is stored first; omitted values fall
   /// back to the stored state. Returns `Ok(None)` for unregistered
   /// positions.
   pub fn get_paginated_query(
      &mut self,
      index: usize,
      page: Option<u64>,
      page_size: Option<u64>,
   ) -> Result<Option<PaginatedQuery>> {
      let update = StateUpdate {
         current_page: page,
         page_size,
         ..StateUpdate::default()
      };
      let Some(registration) = self.registrations.get_mut(&index) else {
         return Ok(None);
      };
      update.validate()?;
      update.apply(&mut registration.state);

      let state = &registration.state;
      let builder = &registration.builder;
      let query = builder.build_paginated_query(
         state.current_page,
         state.page_size,
         registration.respect_user_limit,
      );
      let count_query = builder.build_count_query();

      Ok(Some(PaginatedQuery {
         query,
         meta: PaginationMeta {
            index,
            current_page: state.current_page,
            page_size: state.page_size,
            has_user_limit: state.has_user_limit,
            user_limit: state.user_limit,
            complexity: state.complexity,
            needs_count: count_query.is_some(),
         },
         count_query,
         original_query: state.original_query.clone(),
      }))
   }

   /// Merge `update` into a position's state. Returns `Ok(false)` when the
   /// position is not registered.
   pub fn update_state(&mut self, index: usize, update: &StateUpdate) -> Result<bool> {
      update.validate()?;

      let Some(registration) = self.registrations.get_mut(&index) else {
         return Ok(false);
      };
      update.apply(&mut registration.state);
      if update.total_records.is_some() {
         registration.counted = true;
      }
      Ok(true)
   }

   pub fn get_state(&self, index: usize) -> Option<PaginationState> {
      self.registrations.get(&index).map(|r| r.state.clone())
   }

   pub fn get_all_states(&self) -> BTreeMap<usize, PaginationState> {
      self
         .registrations
         .iter()
         .map(|(index, r)| (*index, r.state.clone()))
         .collect()
   }

   pub fn is_enabled(&self, index: usize) -> bool {
      self.registrations.contains_key(&index)
   }

   pub fn phase(&self, index: usize) -> PaginationPhase {
      match self.registrations.get(&index) {
         None => PaginationPhase::Unregistered,
         Some(r) if r.counted => PaginationPhase::Counted,
         Some(_) => PaginationPhase::Registered,
      }
   }

   /// Back to page 1 with no counts. Returns false for unregistered
   /// positions.
   pub fn reset(&mut self, index: usize) -> bool {
      match self.registrations.get_mut(&index) {
         Some(registration) => {
            registration.state.clear_counts();
            registration.counted = false;
            true
         }
         None => false,
      }
   }

   pub fn reset_all(&mut self) {
      for registration in self.registrations.values_mut() {
         registration.state.clear_counts();
         registration.counted = false;
      }
   }

   pub fn statistics(&self) -> BatchStatistics {
      let registered = self.registrations.len();
      let with_user_limit = self
         .registrations
         .values()
         .filter(|r| r.state.has_user_limit)
         .count();
      let average_complexity = if registered == 0 {
         0.0
      } else {
         let total: f64 = self
            .registrations
            .values()
            .map(|r| f64::from(r.state.complexity))
            .sum();
         total / registered as f64
      };

      BatchStatistics {
         total_queries: self.batch_size,
         paginable_queries: registered,
         queries_with_user_limit: with_user_limit,
         average_complexity,
      }
   }

   /// Drop every registration.
   pub fn cleanup(&mut self) {
      self.registrations.clear();
      self.batch_size = 0;
   }

   pub fn export_snapshot(&self) -> BatchSnapshot {
      BatchSnapshot {
         queries: self
            .registrations
            .iter()
            .map(|(index, r)| (*index, r.state.original_query.clone()))
            .collect(),
         states: self
            .registrations
            .iter()
            .map(|(index, r)| {
               let saved = SavedPaginationState {
                  respect_user_limit: r.respect_user_limit,
                  ..SavedPaginationState::from(&r.state)
               };
               (*index, saved)
            })
            .collect(),
      }
   }

   /// Re-register `queries` with the tracker's defaults, then overlay the
   /// saved states (including the user-limit mode) of positions that
   /// registered again.
   ///
   /// The snapshot is validated before anything is discarded.
   pub fn import_snapshot<Q: AsRef<str>>(&mut self, snapshot: &BatchSnapshot, queries: &[Q]) -> Result<()> {
      for (_, saved) in &snapshot.states {
         saved.validate()?;
      }

      self.cleanup();
      let defaults = self.defaults.clone();
      self.initialize(queries, &defaults)?;

      for (index, saved) in &snapshot.states {
         if let Some(registration) = self.registrations.get_mut(index) {
            saved.restore_into(&mut registration.state);
            registration.respect_user_limit = saved.respect_user_limit;
            registration.counted = saved.total_records > 0;
         }
      }
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn tracker_with(queries: &[&str]) -> BatchTracker {
      let mut tracker = BatchTracker::new();
      tracker.initialize(queries, &BatchOptions::default()).unwrap();
      tracker
   }

   // ─── initialize ───

   #[test]
   fn registers_only_paginable_statements() {
      let tracker = tracker_with(&[
         "SELECT * FROM users",
         "INSERT INTO logs (m) VALUES (1)",
         "   ",
         "SELECT * FROM t LIMIT 50",
      ]);

      assert!(tracker.is_enabled(0));
      assert!(!tracker.is_enabled(1));
      assert!(!tracker.is_enabled(2));
      assert_eq!(tracker.get_state(0).unwrap().page_size, 20);
      assert_eq!(tracker.get_state(3).unwrap().page_size, 50);
   }

   #[test]
   fn override_mode_ignores_user_limit_for_page_size() {
      let mut tracker = BatchTracker::new();
      let options = BatchOptions {
         default_page_size: 25,
         ..BatchOptions::default()
      }
      .with_user_limit_mode(UserLimitMode::Override);
      tracker.initialize(&["SELECT * FROM t LIMIT 50"], &options).unwrap();

      assert_eq!(tracker.get_state(0).unwrap().page_size, 25);
      let page = tracker.get_paginated_query(0, Some(2), None).unwrap().unwrap();
      assert_eq!(page.query, "SELECT * FROM t LIMIT 25 OFFSET 25");
   }

   #[test]
   fn ask_user_mode_behaves_like_preserve() {
      let options = BatchOptions::default().with_user_limit_mode(UserLimitMode::AskUser);
      assert!(options.respect_user_limit);
   }

   #[test]
   fn disabled_pagination_registers_nothing() {
      let mut tracker = BatchTracker::new();
      let options = BatchOptions {
         enable_pagination: false,
         ..BatchOptions::default()
      };
      assert_eq!(tracker.initialize(&["SELECT 1"], &options).unwrap(), 0);
      assert!(!tracker.is_enabled(0));
   }

   #[test]
   fn reinitialize_drops_positions_that_no_longer_register() {
      let mut tracker = tracker_with(&["SELECT * FROM a", "SELECT * FROM b", "SELECT * FROM c"]);

      tracker
         .initialize(&["DELETE FROM a", "SELECT * FROM b"], &BatchOptions::default())
         .unwrap();

      assert!(!tracker.is_enabled(0));
      assert!(tracker.is_enabled(1));
      assert!(!tracker.is_enabled(2));
      let stats = tracker.statistics();
      assert_eq!(stats.total_queries, 2);
      assert_eq!(stats.paginable_queries, 1);
   }

   #[test]
   fn zero_default_page_size_is_rejected() {
      let mut tracker = BatchTracker::new();
      let options = BatchOptions {
         default_page_size: 0,
         ..BatchOptions::default()
      };
      let err = tracker.initialize(&["SELECT 1"], &options).unwrap_err();
      assert_eq!(err.error_code(), "INVALID_PAGE_SIZE");
   }

   #[test]
   fn zero_user_limit_falls_back_to_default_page_size() {
      let tracker = tracker_with(&["SELECT * FROM t LIMIT 0"]);
      assert_eq!(tracker.get_state(0).unwrap().page_size, 20);
   }

   // ─── get_paginated_query ───

   #[test]
   fn paginated_query_persists_arguments() {
      let mut tracker = tracker_with(&["SELECT * FROM users ORDER BY id"]);

      let page = tracker.get_paginated_query(0, Some(3), Some(10)).unwrap().unwrap();
      assert_eq!(page.query, "SELECT * FROM users LIMIT 10 OFFSET 20 ORDER BY id");
      assert_eq!(page.count_query.as_deref(), Some("SELECT COUNT(*) FROM users"));
      assert!(page.meta.needs_count);
      assert_eq!(page.meta.current_page, 3);

      let state = tracker.get_state(0).unwrap();
      assert_eq!((state.current_page, state.page_size), (3, 10));

      let again = tracker.get_paginated_query(0, None, None).unwrap().unwrap();
      assert_eq!(again.query, page.query);
   }

   #[test]
   fn paginated_query_for_unregistered_position() {
      let mut tracker = tracker_with(&["DELETE FROM t"]);
      assert!(tracker.get_paginated_query(0, None, None).unwrap().is_none());
      assert!(tracker.get_paginated_query(7, Some(1), None).unwrap().is_none());
      assert!(tracker.get_paginated_query(0, Some(0), None).unwrap().is_none());
      assert!(tracker.get_paginated_query(7, None, Some(0)).unwrap().is_none());
   }

   #[test]
   fn paginated_query_rejects_invalid_arguments() {
      let mut tracker = tracker_with(&["SELECT * FROM t"]);
      assert!(matches!(
         tracker.get_paginated_query(0, Some(0), None),
         Err(Error::InvalidPage)
      ));
      assert!(matches!(
         tracker.get_paginated_query(0, None, Some(0)),
         Err(Error::InvalidPageSize)
      ));
      assert_eq!(tracker.get_state(0).unwrap().current_page, 1);
   }

   #[test]
   fn respected_user_limit_pages_from_user_offset() {
      let mut tracker = tracker_with(&["SELECT * FROM users LIMIT 100, 20"]);
      let page = tracker.get_paginated_query(0, Some(2), None).unwrap().unwrap();

      assert_eq!(page.query, "SELECT * FROM users LIMIT 20 OFFSET 120");
      assert!(page.meta.has_user_limit);
      assert_eq!(page.meta.user_limit, Some(20));
   }

   // ─── update_state ───

   #[test]
   fn totals_drive_pages_and_has_more() {
      let mut tracker = tracker_with(&["SELECT * FROM users"]);

      assert!(tracker.update_state(0, &StateUpdate::new().total_records(100)).unwrap());
      let state = tracker.get_state(0).unwrap();
      assert_eq!(state.total_pages, 5);
      assert!(state.has_more);

      tracker.update_state(0, &StateUpdate::new().current_page(5)).unwrap();
      assert!(!tracker.get_state(0).unwrap().has_more);

      tracker.update_state(0, &StateUpdate::new().current_page(3)).unwrap();
      assert!(tracker.get_state(0).unwrap().has_more);
   }

   #[test]
   fn page_size_change_recomputes_pages() {
      let mut tracker = tracker_with(&["SELECT * FROM users"]);
      tracker.update_state(0, &StateUpdate::new().total_records(101)).unwrap();
      tracker.update_state(0, &StateUpdate::new().page_size(50)).unwrap();

      let state = tracker.get_state(0).unwrap();
      assert_eq!(state.total_pages, 3);
      assert!(state.has_more);
   }

   #[test]
   fn zero_records_means_zero_pages() {
      let mut tracker = tracker_with(&["SELECT * FROM users"]);
      tracker.update_state(0, &StateUpdate::new().total_records(0)).unwrap();

      let state = tracker.get_state(0).unwrap();
      assert_eq!(state.total_pages, 0);
      assert!(!state.has_more);
   }

   #[test]
   fn explicit_total_pages_updates_has_more() {
      let mut tracker = tracker_with(&["SELECT * FROM users"]);
      tracker.update_state(0, &StateUpdate::new().total_pages(4)).unwrap();

      let state = tracker.get_state(0).unwrap();
      assert_eq!(state.total_pages, 4);
      assert!(state.has_more);
   }

   #[test]
   fn count_error_can_be_set_and_cleared() {
      let mut tracker = tracker_with(&["SELECT * FROM users"]);
      tracker
         .update_state(0, &StateUpdate::new().count_loading(true))
         .unwrap();
      tracker
         .update_state(0, &StateUpdate::new().count_loading(false).count_error("timeout"))
         .unwrap();
      assert_eq!(tracker.get_state(0).unwrap().count_error.as_deref(), Some("timeout"));

      tracker
         .update_state(0, &StateUpdate::new().clear_count_error())
         .unwrap();
      assert_eq!(tracker.get_state(0).unwrap().count_error, None);
   }

   #[test]
   fn update_of_unregistered_position_is_ignored() {
      let mut tracker = tracker_with(&["UPDATE t SET a = 1"]);
      assert!(!tracker.update_state(0, &StateUpdate::new().total_records(5)).unwrap());
   }

   #[test]
   fn invalid_update_is_rejected_without_changes() {
      let mut tracker = tracker_with(&["SELECT * FROM users"]);
      let update = StateUpdate::new().total_records(10).page_size(0);

      assert!(matches!(tracker.update_state(0, &update), Err(Error::InvalidPageSize)));
      assert_eq!(tracker.get_state(0).unwrap().total_records, 0);
   }

   // ─── lifecycle ───

   #[test]
   fn phases_follow_counts_resets_and_cleanup() {
      let mut tracker = tracker_with(&["SELECT * FROM users"]);
      assert_eq!(tracker.phase(0), PaginationPhase::Registered);
      assert_eq!(tracker.phase(1), PaginationPhase::Unregistered);

      tracker.update_state(0, &StateUpdate::new().total_records(40)).unwrap();
      assert_eq!(tracker.phase(0), PaginationPhase::Counted);

      tracker.update_state(0, &StateUpdate::new().current_page(2)).unwrap();
      assert!(tracker.reset(0));
      assert_eq!(tracker.phase(0), PaginationPhase::Registered);
      let state = tracker.get_state(0).unwrap();
      assert_eq!((state.current_page, state.total_records, state.total_pages), (1, 0, 0));
      assert_eq!(state.page_size, 20);

      tracker.cleanup();
      assert_eq!(tracker.phase(0), PaginationPhase::Unregistered);
      assert!(tracker.get_all_states().is_empty());
   }

   #[test]
   fn reset_all_keeps_registrations() {
      let mut tracker = tracker_with(&["SELECT * FROM a", "SELECT * FROM b"]);
      for index in 0..2 {
         tracker
            .update_state(index, &StateUpdate::new().total_records(99).current_page(2))
            .unwrap();
      }

      tracker.reset_all();
      assert!(!tracker.reset(5));
      for state in tracker.get_all_states().values() {
         assert_eq!(state.current_page, 1);
         assert_eq!(state.total_records, 0);
         assert!(!state.has_more);
      }
      assert!(tracker.is_enabled(1));
   }

   #[test]
   fn statistics_average_structure_complexity() {
      let tracker = tracker_with(&[
         "SELECT DISTINCT a FROM t",
         "SELECT * FROM t LIMIT 5",
         "VACUUM",
      ]);
      let stats = tracker.statistics();

      assert_eq!(stats.total_queries, 3);
      assert_eq!(stats.paginable_queries, 2);
      assert_eq!(stats.queries_with_user_limit, 1);
      assert!((stats.average_complexity - 1.0).abs() < f64::EPSILON);
   }

   #[test]
   fn statistics_of_empty_tracker() {
      let stats = BatchTracker::new().statistics();
      assert_eq!(stats.paginable_queries, 0);
      assert_eq!(stats.average_complexity, 0.0);
   }

   // ─── snapshots ───

   #[test]
   fn snapshot_json_omits_nothing_needed_for_restore() {
      let mut tracker = tracker_with(&["SELECT * FROM users", "SELECT 1"]);
      tracker.update_state(0, &StateUpdate::new().total_records(42)).unwrap();

      let json = tracker.export_snapshot().to_json().unwrap();
      let snapshot = BatchSnapshot::from_json(&json).unwrap();

      assert_eq!(snapshot.queries[0], (0, "SELECT * FROM users".to_string()));
      assert_eq!(snapshot.states[0].1.total_records, 42);
      assert!(!json.contains("originalQuery"));
   }

   #[test]
   fn import_rejects_invalid_saved_state() {
      let mut tracker = tracker_with(&["SELECT * FROM users"]);
      let mut snapshot = tracker.export_snapshot();
      snapshot.states[0].1.current_page = 0;

      let err = tracker.import_snapshot(&snapshot, &["SELECT * FROM users"]).unwrap_err();
      assert_eq!(err.error_code(), "INVALID_PAGE");
      assert!(tracker.is_enabled(0));
   }

   #[test]
   fn import_ignores_positions_that_no_longer_register() {
      let mut tracker = tracker_with(&["SELECT * FROM users"]);
      tracker.update_state(0, &StateUpdate::new().total_records(8)).unwrap();
      let snapshot = tracker.export_snapshot();

      let mut fresh = BatchTracker::new();
      fresh.import_snapshot(&snapshot, &["DELETE FROM users"]).unwrap();
      assert!(fresh.get_all_states().is_empty());
   }

   #[test]
   fn import_restores_override_mode() {
      let queries = ["SELECT * FROM t LIMIT 50"];
      let options = BatchOptions {
         default_page_size: 25,
         ..BatchOptions::default()
      }
      .with_user_limit_mode(UserLimitMode::Override);

      let mut tracker = BatchTracker::new();
      tracker.initialize(&queries, &options).unwrap();
      let before = tracker.get_paginated_query(0, Some(2), None).unwrap().unwrap();
      assert_eq!(before.query, "SELECT * FROM t LIMIT 25 OFFSET 25");

      let snapshot = BatchSnapshot::from_json(&tracker.export_snapshot().to_json().unwrap()).unwrap();
      assert!(!snapshot.states[0].1.respect_user_limit);

      let mut restored = BatchTracker::new();
      restored.import_snapshot(&snapshot, &queries).unwrap();
      let after = restored.get_paginated_query(0, None, None).unwrap().unwrap();

      assert_eq!(after, before);
      assert_eq!(restored.get_all_states(), tracker.get_all_states());
   }

   #[test]
   fn snapshot_without_user_limit_mode_restores_preserve() {
      let mut tracker = tracker_with(&["SELECT * FROM t LIMIT 50"]);
      let json = tracker
         .export_snapshot()
         .to_json()
         .unwrap()
         .replace(",\"respectUserLimit\":true", "");
      assert!(!json.contains("respectUserLimit"));

      let snapshot = BatchSnapshot::from_json(&json).unwrap();
      assert!(snapshot.states[0].1.respect_user_limit);

      tracker.import_snapshot(&snapshot, &["SELECT * FROM t LIMIT 50"]).unwrap();
      let page = tracker.get_paginated_query(0, Some(2), None).unwrap().unwrap();
      assert_eq!(page.query, "SELECT * FROM t LIMIT 50 OFFSET 50");
   }

   #[test]
   fn invalid_snapshot_json() {
      let err = BatchSnapshot::from_json("{\"queries\": 3}").unwrap_err();
      assert_eq!(err.error_code(), "INVALID_SNAPSHOT");
   }
}
