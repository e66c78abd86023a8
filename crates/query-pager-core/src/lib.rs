//! Pagination, complexity analysis and COUNT derivation for arbitrary SQL
//! SELECT statements.
//!
//! The crate never talks to a database. It rewrites statement text, judges
//! how risky a COUNT of that text would be, and keeps per-statement page
//! state for a batch of statements. Running a COUNT goes through an
//! injected [`QueryExecutor`].
//!
//! # Components
//!
//! - [`complexity`]: feature extraction and scoring ([`analyze`])
//! - [`pagination`]: [`PaginationBuilder`] and the [`SqlPaginationRewriter`] seam
//! - [`count`]: [`CountQueryGenerator`] with its TTL cache
//! - [`batch`]: [`BatchTracker`] for batch-wide page state
//!
//! # Example
//!
//! ```
//! use query_pager_core::{BatchOptions, BatchTracker, StateUpdate};
//!
//! let mut tracker = BatchTracker::new();
//! tracker
//!    .initialize(&["SELECT * FROM users", "DELETE FROM logs"], &BatchOptions::default())
//!    .unwrap();
//!
//! let page = tracker.get_paginated_query(0, Some(2), None).unwrap().unwrap();
//! assert_eq!(page.query, "SELECT * FROM users LIMIT 20 OFFSET 20");
//!
//! tracker.update_state(0, &StateUpdate::new().total_records(45)).unwrap();
//! assert_eq!(tracker.get_state(0).unwrap().total_pages, 3);
//! ```

mod error;
mod scan;

pub mod batch;
pub mod complexity;
pub mod count;
pub mod executor;
pub mod pagination;

pub use batch::{
   BatchOptions, BatchSnapshot, BatchStatistics, BatchTracker, PaginatedQuery, PaginationMeta,
   PaginationPhase, PaginationState, SavedPaginationState, StateUpdate, UserLimitMode,
};
pub use complexity::{
   ComplexityAnalysis, ComplexityLevel, ComplexityReport, ComplexityScorer, CountStrategy,
   HeuristicScorer, QueryFeatures, QueryStructure, analyze, generate_report,
};
pub use count::{CacheStatistics, CountCache, CountOptions, CountQueryGenerator, CountQueryResult};
pub use error::{Error, Result};
pub use executor::{ExecuteFuture, QueryExecutor, QueryRows};
pub use pagination::{
   HeuristicRewriter, PaginationBuilder, PaginationContext, PaginationProfile,
   SqlPaginationRewriter, UserLimit,
};
