//! LIMIT/OFFSET pagination for already-written SELECT statements.
//!
//! A [`PaginationBuilder`] wraps one statement and freezes a
//! [`PaginationProfile`] at construction: whether the statement is a
//! paginable SELECT, which trailing `LIMIT` the user wrote (if any) and a
//! lightweight structural summary. From that profile it emits page-bounded
//! rewrites and a basic COUNT rewrite.
//!
//! All text manipulation goes through a [`SqlPaginationRewriter`]. The
//! default [`HeuristicRewriter`] works on patterns and a quote-aware scanner
//! rather than a parser, so some shapes are knowingly out of reach:
//!
//! - a `LIMIT` that is not the last clause (for example inside a subquery)
//!   is not treated as a user limit;
//! - the direct COUNT rewrite replaces everything up to the first `FROM`
//!   word it sees, even one inside a string literal or a nested SELECT in
//!   the select list;
//! - a trailing `LIMIT` is recognized even inside a trailing `--` comment,
//!   so `SELECT * FROM t -- LIMIT 5` pages by rewriting the comment and
//!   the resulting statement has no real `LIMIT`.
//!
//! # Example
//!
//! ```
//! use query_pager_core::pagination::PaginationBuilder;
//!
//! let builder = PaginationBuilder::new("SELECT * FROM users WHERE age > 18 ORDER BY created_at DESC");
//! assert_eq!(
//!    builder.build_paginated_query(2, 10, true),
//!    "SELECT * FROM users WHERE age > 18 LIMIT 10 OFFSET 10 ORDER BY created_at DESC"
//! );
//! ```

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::complexity::{ComplexityScorer, HeuristicScorer, QueryStructure};
use crate::scan::{
   FROM, GROUP_BY, HAVING, LIMIT, ORDER_BY, first_top_level, last_top_level, skip_leading_trivia,
   split_top_level_commas,
};

/// Structure-complexity above which a builder declines its basic COUNT rewrite.
pub const DEFAULT_BASIC_COUNT_COMPLEXITY_LIMIT: u32 = 5;

/// Alias given to the derived table of a wrapped COUNT query.
pub const COUNT_SUBQUERY_ALIAS: &str = "count_subquery";

/// A `LIMIT` clause found at the very end of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLimit {
   /// Row count requested by the user.
   pub limit: u64,
   /// Rows skipped by the user (0 when no offset was written).
   pub offset: u64,
   /// The clause exactly as written, e.g. `LIMIT 100, 20`.
   pub clause: String,
   /// Byte range of `clause` within the inspected statement.
   pub span: Range<usize>,
}

/// Text transformations needed to paginate and count a statement.
///
/// Implementations must be total: malformed input produces a best-effort
/// string (often the input itself), never a panic.
pub trait SqlPaginationRewriter: Send + Sync + fmt::Debug {
   /// Whether the statement, after leading whitespace and comments, starts
   /// with the SELECT keyword.
   fn is_select(&self, query: &str) -> bool;

   /// Find a user-written `LIMIT` at the end of the statement, ignoring a
   /// trailing terminator.
   fn detect_user_limit(&self, query: &str) -> Option<UserLimit>;

   /// Add a `LIMIT` to a statement without one, keeping a trailing top-level
   /// ORDER BY as the last clause and preserving a terminator.
   fn apply_limit(&self, query: &str, limit: u64, offset: u64) -> String;

   /// Replace the clause at `span` with `LIMIT <limit> OFFSET <offset>`.
   fn replace_limit(&self, query: &str, span: Range<usize>, limit: u64, offset: u64) -> String;

   /// Remove the terminator and any trailing top-level ORDER BY / LIMIT.
   fn strip_pagination(&self, query: &str) -> String;

   /// Turn the leading `SELECT … FROM` of a cleaned statement into
   /// `SELECT COUNT(*) FROM`.
   fn direct_count(&self, cleaned: &str) -> String;

   /// `SELECT COUNT(*) FROM (<cleaned>) AS count_subquery`.
   fn wrap_count(&self, cleaned: &str) -> String {
      format!("SELECT COUNT(*) FROM ({cleaned}) AS {COUNT_SUBQUERY_ALIAS}")
   }

   /// Narrow the select list of a grouped statement to its grouping columns.
   fn reduce_to_grouping(&self, cleaned: &str) -> String;
}

struct RewritePatterns {
   /// Trailing `LIMIT` shapes in priority order.
   user_limit: [Regex; 3],
   select_from: Regex,
   alias: Regex,
}

fn rewrite_patterns() -> &'static RewritePatterns {
   static PATTERNS: OnceLock<RewritePatterns> = OnceLock::new();
   PATTERNS.get_or_init(|| {
      let compile = |pattern: &str| Regex::new(pattern).expect("invalid regex");
      RewritePatterns {
         user_limit: [
            // LIMIT n OFFSET m
            compile(r"(?i)\b(?P<clause>LIMIT\s+(?P<limit>\d+)\s+OFFSET\s+(?P<offset>\d+))\s*$"),
            // LIMIT m, n
            compile(r"(?i)\b(?P<clause>LIMIT\s+(?P<offset>\d+)\s*,\s*(?P<limit>\d+))\s*$"),
            // LIMIT n
            compile(r"(?i)\b(?P<clause>LIMIT\s+(?P<limit>\d+))\s*$"),
         ],
         select_from: compile(r"(?is)^\s*SELECT\s+.*?\s+FROM\s+"),
         alias: compile(r#"(?i)\bAS\s+["`\[]?([A-Za-z_][A-Za-z0-9_]*)"#),
      }
   })
}

/// Split a trailing `;` off a statement, returning the body and whether a
/// terminator was present.
fn split_terminator(query: &str) -> (&str, bool) {
   let trimmed = query.trim_end();
   match trimmed.strip_suffix(';') {
      Some(body) => (body.trim_end(), true),
      None => (trimmed, false),
   }
}

fn limit_clause(limit: u64, offset: u64) -> String {
   if offset > 0 {
      format!("LIMIT {limit} OFFSET {offset}")
   } else {
      format!("LIMIT {limit}")
   }
}

/// Whether a grouping term names a select-list alias or a column position,
/// either of which stops meaning the same thing once the select list is
/// narrowed.
fn refers_to_select_list(term: &str, select_list: &str) -> bool {
   let term = term.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'));
   if !term.is_empty() && term.bytes().all(|b| b.is_ascii_digit()) {
      return true;
   }
   rewrite_patterns()
      .alias
      .captures_iter(select_list)
      .filter_map(|caps| caps.get(1))
      .any(|alias| alias.as_str().eq_ignore_ascii_case(term))
}

fn user_limit_from(caps: &Captures<'_>) -> Option<UserLimit> {
   let clause = caps.name("clause")?;
   let limit = caps.name("limit")?.as_str().parse().ok()?;
   let offset = match caps.name("offset") {
      Some(m) => m.as_str().parse().ok()?,
      None => 0,
   };

   Some(UserLimit {
      limit,
      offset,
      clause: clause.as_str().to_string(),
      span: clause.range(),
   })
}

/// The default pattern- and scanner-based rewriter.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicRewriter;

impl SqlPaginationRewriter for HeuristicRewriter {
   fn is_select(&self, query: &str) -> bool {
      let rest = &query.as_bytes()[skip_leading_trivia(query)..];
      rest
         .get(..6)
         .is_some_and(|word| word.eq_ignore_ascii_case(b"SELECT"))
         && rest
            .get(6)
            .is_none_or(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
   }

   fn detect_user_limit(&self, query: &str) -> Option<UserLimit> {
      let (body, _) = split_terminator(query);
      rewrite_patterns()
         .user_limit
         .iter()
         .find_map(|re| re.captures(body))
         .and_then(|caps| user_limit_from(&caps))
   }

   fn apply_limit(&self, query: &str, limit: u64, offset: u64) -> String {
      let (body, terminated) = split_terminator(query);
      let clause = limit_clause(limit, offset);

      let mut paginated = match last_top_level(body, ORDER_BY) {
         Some((start, _)) => {
            format!("{} {clause} {}", body[..start].trim_end(), &body[start..])
         }
         None => format!("{body} {clause}"),
      };

      if terminated {
         paginated.push(';');
      }
      paginated
   }

   fn replace_limit(&self, query: &str, span: Range<usize>, limit: u64, offset: u64) -> String {
      match (query.get(..span.start), query.get(span.end..)) {
         (Some(head), Some(tail)) if span.start <= span.end => {
            format!("{head}LIMIT {limit} OFFSET {offset}{tail}")
         }
         _ => self.apply_limit(query, limit, offset),
      }
   }

   fn strip_pagination(&self, query: &str) -> String {
      let (body, _) = split_terminator(query);
      let cut = [last_top_level(body, ORDER_BY), last_top_level(body, LIMIT)]
         .into_iter()
         .flatten()
         .map(|(start, _)| start)
         .min();

      match cut {
         Some(cut) => body[..cut].trim_end().to_string(),
         None => body.to_string(),
      }
   }

   fn direct_count(&self, cleaned: &str) -> String {
      let re = &rewrite_patterns().select_from;
      if re.is_match(cleaned) {
         re.replace(cleaned, "SELECT COUNT(*) FROM ").into_owned()
      } else {
         self.wrap_count(cleaned)
      }
   }

   fn reduce_to_grouping(&self, cleaned: &str) -> String {
      let Some((_, group_end)) = last_top_level(cleaned, GROUP_BY) else {
         return cleaned.to_string();
      };
      // HAVING may reference select-list aliases
      if last_top_level(cleaned, HAVING).is_some_and(|(start, _)| start > group_end) {
         return cleaned.to_string();
      }
      let Some((from_start, _)) = first_top_level(cleaned, FROM) else {
         return cleaned.to_string();
      };

      let fields = cleaned[group_end..].trim();
      if fields.is_empty() || from_start > group_end {
         return cleaned.to_string();
      }
      let select_list = &cleaned[..from_start];
      if split_top_level_commas(fields)
         .into_iter()
         .any(|term| refers_to_select_list(term, select_list))
      {
         return cleaned.to_string();
      }
      format!("SELECT {fields} {}", &cleaned[from_start..])
   }
}

/// Collaborators shared by builders, generators and trackers.
#[derive(Debug, Clone)]
pub struct PaginationContext {
   pub scorer: Arc<dyn ComplexityScorer>,
   pub rewriter: Arc<dyn SqlPaginationRewriter>,
   /// A builder only emits its basic COUNT rewrite at or below this
   /// structure-complexity.
   pub count_complexity_limit: u32,
}

impl Default for PaginationContext {
   fn default() -> Self {
      Self {
         scorer: Arc::new(HeuristicScorer),
         rewriter: Arc::new(HeuristicRewriter),
         count_complexity_limit: DEFAULT_BASIC_COUNT_COMPLEXITY_LIMIT,
      }
   }
}

/// Everything a builder learned about its statement at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationProfile {
   /// The trimmed statement.
   pub original_query: String,
   pub is_paginable: bool,
   pub is_select: bool,
   pub has_user_limit: bool,
   pub user_limit: Option<u64>,
   pub user_offset: Option<u64>,
   /// The user's LIMIT clause as written.
   pub limit_clause: Option<String>,
   pub structure: QueryStructure,
   /// Structure-complexity on the builder's own scale.
   pub complexity: u32,
}

/// Pagination rewrites for a single statement.
#[derive(Debug, Clone)]
pub struct PaginationBuilder {
   profile: PaginationProfile,
   limit_span: Option<Range<usize>>,
   context: PaginationContext,
}

impl PaginationBuilder {
   /// Profile `query` with the default heuristics.
   pub fn new(query: &str) -> Self {
      Self::with_context(query, PaginationContext::default())
   }

   /// Profile `query` with a custom scorer and rewriter.
   pub fn with_context(query: &str, context: PaginationContext) -> Self {
      let query = query.trim();
      let rewriter = &context.rewriter;

      if !rewriter.is_select(query) {
         return Self {
            profile: PaginationProfile {
               original_query: query.to_string(),
               ..PaginationProfile::default()
            },
            limit_span: None,
            context,
         };
      }

      let user_limit = rewriter.detect_user_limit(query);
      let structure = context.scorer.structure(query);
      let complexity = context.scorer.structure_complexity(&structure);

      let profile = PaginationProfile {
         original_query: query.to_string(),
         is_paginable: true,
         is_select: true,
         has_user_limit: user_limit.is_some(),
         user_limit: user_limit.as_ref().map(|l| l.limit),
         user_offset: user_limit.as_ref().map(|l| l.offset),
         limit_clause: user_limit.as_ref().map(|l| l.clause.clone()),
         structure,
         complexity,
      };

      Self {
         profile,
         limit_span: user_limit.map(|l| l.span),
         context,
      }
   }

   /// Borrow the frozen profile.
   pub fn profile(&self) -> &PaginationProfile {
      &self.profile
   }

   /// An owned copy of the profile.
   pub fn get_pagination_profile(&self) -> PaginationProfile {
      self.profile.clone()
   }

   pub fn is_paginable(&self) -> bool {
      self.profile.is_paginable
   }

   /// Rewrite the statement to fetch one page.
   ///
   /// Pages are 1-based; page 0 is treated as page 1. With a user limit and
   /// `respect_user_limit`, the user's LIMIT becomes the page size and the
   /// user's OFFSET shifts every page. Otherwise `page_size` wins.
   /// Non-paginable statements are returned unchanged.
   pub fn build_paginated_query(&self, page: u64, page_size: u64, respect_user_limit: bool) -> String {
      let profile = &self.profile;
      if !profile.is_paginable {
         return profile.original_query.clone();
      }

      let skipped_pages = page.max(1) - 1;
      let rewriter = &self.context.rewriter;

      match (&self.limit_span, profile.user_limit) {
         (Some(span), Some(user_limit)) if respect_user_limit => {
            let offset = skipped_pages
               .saturating_mul(user_limit)
               .saturating_add(profile.user_offset.unwrap_or(0));
            rewriter.replace_limit(&profile.original_query, span.clone(), user_limit, offset)
         }
         (Some(span), _) => {
            let offset = skipped_pages.saturating_mul(page_size);
            rewriter.replace_limit(&profile.original_query, span.clone(), page_size, offset)
         }
         (None, _) => {
            let offset = skipped_pages.saturating_mul(page_size);
            rewriter.apply_limit(&profile.original_query, page_size, offset)
         }
      }
   }

   /// A basic COUNT rewrite, or `None` when the statement is not paginable
   /// or structurally too complex to count this way.
   pub fn build_count_query(&self) -> Option<String> {
      let profile = &self.profile;
      if !profile.is_paginable || profile.complexity > self.context.count_complexity_limit {
         return None;
      }

      let rewriter = &self.context.rewriter;
      let cleaned = rewriter.strip_pagination(&profile.original_query);

      if profile.structure.has_group_by {
         Some(rewriter.wrap_count(&cleaned))
      } else {
         Some(rewriter.direct_count(&cleaned))
      }
   }
}
