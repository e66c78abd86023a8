//! Heuristic SQL complexity analysis.
//!
//! Maps raw SQL text to a set of structural features, an additive complexity
//! score, a [`ComplexityLevel`], and a recommended [`CountStrategy`] for
//! deriving a total-row COUNT query. Nothing here parses SQL: features are
//! detected with case-insensitive patterns plus a quote- and comment-aware
//! byte scanner, so malformed input simply yields fewer detected features.
//!
//! # Example
//!
//! ```
//! use query_pager_core::complexity::{CountStrategy, analyze};
//!
//! let analysis = analyze("SELECT *, ROW_NUMBER() OVER (ORDER BY id) FROM users");
//! assert!(!analysis.is_countable);
//! assert_eq!(analysis.recommended_strategy, CountStrategy::Skip);
//! ```

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::scan::{FROM, match_keyword, scan_code};

/// Highest score still rated [`ComplexityLevel::Simple`].
pub const SIMPLE_MAX_SCORE: u32 = 0;
/// Highest score still rated [`ComplexityLevel::Moderate`].
pub const MODERATE_MAX_SCORE: u32 = 3;
/// Highest score still rated [`ComplexityLevel::Complex`].
pub const COMPLEX_MAX_SCORE: u32 = 8;
/// Highest score still rated [`ComplexityLevel::VeryComplex`].
pub const VERY_COMPLEX_MAX_SCORE: u32 = 15;
/// Parenthesis nesting beyond this depth makes a query uncountable.
pub const MAX_COUNTABLE_NESTING: u32 = 3;

const REPORT_QUERY_PREVIEW_CHARS: usize = 200;

/// Keywords that end a FROM clause at the clause's own depth.
const FROM_CLAUSE_TERMINATORS: &[&[&[u8]]] = &[
   &[b"WHERE"],
   &[b"GROUP"],
   &[b"ORDER"],
   &[b"LIMIT"],
   &[b"HAVING"],
   &[b"UNION"],
   &[b"EXCEPT"],
   &[b"INTERSECT"],
   &[b"WINDOW"],
   &[b"OFFSET"],
   &[b"FETCH"],
];

/// Coarse complexity bucket derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplexityLevel {
   Simple,
   Moderate,
   Complex,
   VeryComplex,
   ExtremelyComplex,
}

impl ComplexityLevel {
   pub fn from_score(score: u32) -> Self {
      match score {
         s if s <= SIMPLE_MAX_SCORE => ComplexityLevel::Simple,
         s if s <= MODERATE_MAX_SCORE => ComplexityLevel::Moderate,
         s if s <= COMPLEX_MAX_SCORE => ComplexityLevel::Complex,
         s if s <= VERY_COMPLEX_MAX_SCORE => ComplexityLevel::VeryComplex,
         _ => ComplexityLevel::ExtremelyComplex,
      }
   }

   /// Identifier shared with other modules and serialized forms.
   pub fn as_str(self) -> &'static str {
      match self {
         ComplexityLevel::Simple => "SIMPLE",
         ComplexityLevel::Moderate => "MODERATE",
         ComplexityLevel::Complex => "COMPLEX",
         ComplexityLevel::VeryComplex => "VERY_COMPLEX",
         ComplexityLevel::ExtremelyComplex => "EXTREMELY_COMPLEX",
      }
   }
}

impl fmt::Display for ComplexityLevel {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// How a COUNT query is (or is not) derived for a statement.
///
/// The analyzer only ever recommends the first five; `Error` and `Cached`
/// are produced by the count generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountStrategy {
   /// Rewrite the leading `SELECT … FROM` into `SELECT COUNT(*) FROM`.
   DirectTransform,
   /// Wrap in a COUNT subquery when DISTINCT or GROUP BY demand it.
   SimpleSubquery,
   /// Wrap in a COUNT subquery, trimming the SELECT list first when grouped.
   OptimizedSubquery,
   /// Too expensive to count live; rely on a cached or external estimate.
   CachedEstimate,
   /// Do not count.
   Skip,
   /// Generation failed for this statement.
   Error,
   /// The total came from the count cache.
   Cached,
}

impl CountStrategy {
   /// Identifier shared with other modules and serialized forms.
   pub fn as_str(self) -> &'static str {
      match self {
         CountStrategy::DirectTransform => "DIRECT_TRANSFORM",
         CountStrategy::SimpleSubquery => "SIMPLE_SUBQUERY",
         CountStrategy::OptimizedSubquery => "OPTIMIZED_SUBQUERY",
         CountStrategy::CachedEstimate => "CACHED_ESTIMATE",
         CountStrategy::Skip => "SKIP",
         CountStrategy::Error => "ERROR",
         CountStrategy::Cached => "CACHED",
      }
   }
}

impl fmt::Display for CountStrategy {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// Features extracted from one SQL string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFeatures {
   pub has_distinct: bool,
   pub has_group_by: bool,
   pub has_having: bool,
   pub has_order_by: bool,
   pub has_limit: bool,
   pub has_union: bool,
   pub has_subquery: bool,
   pub has_window_function: bool,
   pub has_cte: bool,
   pub has_explicit_join: bool,
   /// Comma-separated tables in a FROM clause.
   pub has_implicit_join: bool,
   pub has_aggregate_function: bool,
   pub has_analytic_function: bool,
   pub has_exists: bool,
   pub has_in: bool,
   pub has_case: bool,
   /// Maximum parenthesis depth over the whole string.
   pub nesting_depth: u32,
   /// FROM keywords + JOIN keywords + commas separating FROM-clause tables.
   pub table_count: u32,
   /// SELECT keywords beyond the first.
   pub subquery_count: u32,
   pub join_count: u32,
}

/// Compiled patterns, built once on first use.
struct Patterns {
   distinct: Regex,
   group_by: Regex,
   having: Regex,
   order_by: Regex,
   limit: Regex,
   union: Regex,
   window: Regex,
   cte: Regex,
   join: Regex,
   typed_join: Regex,
   aggregate: Regex,
   analytic: Regex,
   exists: Regex,
   in_list: Regex,
   case: Regex,
   select: Regex,
   from: Regex,
   derived_table: Regex,
}

fn patterns() -> &'static Patterns {
   static PATTERNS: OnceLock<Patterns> = OnceLock::new();
   PATTERNS.get_or_init(|| {
      let compile = |pattern: &str| Regex::new(pattern).expect("invalid regex");
      Patterns {
         distinct: compile(r"(?i)\bDISTINCT\b"),
         group_by: compile(r"(?i)\bGROUP\s+BY\b"),
         having: compile(r"(?i)\bHAVING\b"),
         order_by: compile(r"(?i)\bORDER\s+BY\b"),
         limit: compile(r"(?i)\bLIMIT\b"),
         union: compile(r"(?i)\bUNION\b"),
         window: compile(r"(?i)\bOVER\s*\("),
         cte: compile(r"(?i)\bWITH\s+\w+"),
         join: compile(r"(?i)\bJOIN\b"),
         typed_join: compile(r"(?i)\b(?:INNER|LEFT|RIGHT|FULL|CROSS)\s+JOIN\b"),
         aggregate: compile(r"(?i)\b(?:COUNT|SUM|AVG|MIN|MAX|GROUP_CONCAT|ARRAY_AGG)\s*\("),
         analytic: compile(
            r"(?i)\b(?:ROW_NUMBER|RANK|DENSE_RANK|LAG|LEAD|FIRST_VALUE|LAST_VALUE)\s*\(",
         ),
         exists: compile(r"(?i)\bEXISTS\s*\("),
         in_list: compile(r"(?i)\bIN\s*\("),
         case: compile(r"(?i)\bCASE\s+\w"),
         select: compile(r"(?i)\bSELECT\b"),
         from: compile(r"(?i)\bFROM\b"),
         derived_table: compile(r"(?is)\bSELECT\b.*\bFROM\s*\([^)]*\bSELECT\b"),
      }
   })
}

fn count_matches(re: &Regex, query: &str) -> u32 {
   u32::try_from(re.find_iter(query).count()).unwrap_or(u32::MAX)
}

/// Running maximum of open-minus-close parentheses across the raw string.
fn nesting_depth(query: &str) -> u32 {
   let mut depth: i64 = 0;
   let mut max_depth: i64 = 0;
   for ch in query.chars() {
      match ch {
         '(' => {
            depth += 1;
            max_depth = max_depth.max(depth);
         }
         ')' => depth -= 1,
         _ => {}
      }
   }
   u32::try_from(max_depth).unwrap_or(u32::MAX)
}

/// Count commas that separate tables inside FROM clauses.
///
/// A FROM clause opened at depth `d` collects commas at depth `d` until a
/// terminating keyword at that depth or the `)` closing its group. Commas in
/// function arguments or nested subqueries belong to other clauses.
fn from_clause_commas(query: &str) -> u32 {
   let mut open: Vec<i32> = Vec::new();
   let mut commas = 0u32;

   scan_code(query, |bytes, i, depth| {
      match bytes[i] {
         b')' => open.retain(|d| *d < depth),
         b',' => {
            if open.last() == Some(&depth) {
               commas += 1;
            }
         }
         _ if match_keyword(bytes, i, FROM).is_some() => open.push(depth),
         _ => {
            if open.last() == Some(&depth)
               && FROM_CLAUSE_TERMINATORS
                  .iter()
                  .any(|kw| match_keyword(bytes, i, kw).is_some())
            {
               open.pop();
            }
         }
      }
      None::<()>
   });

   commas
}

impl QueryFeatures {
   /// Extract features from raw SQL text.
   pub fn extract(query: &str) -> Self {
      let p = patterns();
      let select_count = count_matches(&p.select, query);
      let join_count = count_matches(&p.join, query);
      let from_commas = from_clause_commas(query);

      Self {
         has_distinct: p.distinct.is_match(query),
         has_group_by: p.group_by.is_match(query),
         has_having: p.having.is_match(query),
         has_order_by: p.order_by.is_match(query),
         has_limit: p.limit.is_match(query),
         has_union: p.union.is_match(query),
         has_subquery: select_count > 1,
         has_window_function: p.window.is_match(query),
         has_cte: p.cte.is_match(query),
         has_explicit_join: join_count > 0,
         has_implicit_join: from_commas > 0,
         has_aggregate_function: p.aggregate.is_match(query),
         has_analytic_function: p.analytic.is_match(query),
         has_exists: p.exists.is_match(query),
         has_in: p.in_list.is_match(query),
         has_case: p.case.is_match(query),
         nesting_depth: nesting_depth(query),
         table_count: count_matches(&p.from, query)
            .saturating_add(join_count)
            .saturating_add(from_commas),
         subquery_count: select_count.saturating_sub(1),
         join_count,
      }
   }

   /// Additive complexity score.
   pub fn score(&self) -> u32 {
      let mut score: u32 = 0;
      let mut add_if = |cond: bool, weight: u32| {
         if cond {
            score = score.saturating_add(weight);
         }
      };

      add_if(self.has_distinct, 2);
      add_if(self.has_group_by, 2);
      add_if(self.has_having, 1);

      add_if(self.has_union, 4);
      add_if(self.has_window_function, 4);
      add_if(self.has_cte, 3);
      add_if(self.has_analytic_function, 3);

      add_if(self.has_explicit_join, 1);
      add_if(self.has_implicit_join, 2);

      add_if(self.has_exists, 1);
      add_if(self.has_in, 1);
      add_if(self.has_case, 1);

      score
         .saturating_add(self.join_count)
         .saturating_add(self.nesting_depth.saturating_mul(2))
         .saturating_add(self.subquery_count)
         .saturating_add(self.table_count.saturating_sub(3))
   }

   /// Whether a COUNT can be derived without changing the result's meaning.
   pub fn is_countable(&self) -> bool {
      !(self.has_window_function
         || self.has_analytic_function
         || self.has_union
         || self.nesting_depth > MAX_COUNTABLE_NESTING)
   }

   fn warnings(&self, score: u32) -> Vec<String> {
      let mut warnings = Vec::new();

      if self.has_window_function {
         warnings.push("query uses window functions; an exact COUNT cannot be derived".to_string());
      }
      if self.has_union {
         warnings.push("COUNT of a UNION query may be inaccurate".to_string());
      }
      if self.nesting_depth > MAX_COUNTABLE_NESTING {
         warnings.push("query nesting is too deep and may hurt performance".to_string());
      }
      if self.subquery_count > 2 {
         warnings.push("multiple subqueries may make the COUNT query slow".to_string());
      }
      if score > VERY_COMPLEX_MAX_SCORE {
         warnings.push("query is too complex; simplify it or skip the COUNT".to_string());
      }

      warnings
   }

   fn optimization_hints(&self) -> Vec<String> {
      let mut hints = Vec::new();

      if self.has_distinct && !self.has_group_by {
         hints.push("consider an index that supports the DISTINCT columns".to_string());
      }
      if self.has_implicit_join {
         hints.push("prefer explicit JOIN syntax over comma-separated tables".to_string());
      }
      if self.join_count > 3 {
         hints.push("check index coverage for multi-table joins".to_string());
      }
      if self.has_subquery && !self.has_exists {
         hints.push("consider rewriting subqueries as JOINs".to_string());
      }
      if self.has_order_by && self.has_limit {
         hints.push("ORDER BY with LIMIT benefits from an index on the sort columns".to_string());
      }

      hints
   }
}

/// Result of analyzing one query. Recomputed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityAnalysis {
   pub features: QueryFeatures,
   pub score: u32,
   pub level: ComplexityLevel,
   pub is_countable: bool,
   pub recommended_strategy: CountStrategy,
   pub warnings: Vec<String>,
   pub optimization_hints: Vec<String>,
}

impl ComplexityAnalysis {
   /// Derive the full analysis from a feature set.
   pub fn from_features(features: QueryFeatures) -> Self {
      let score = features.score();
      let is_countable = features.is_countable();
      let recommended_strategy = recommended_strategy(is_countable, score);

      Self {
         warnings: features.warnings(score),
         optimization_hints: features.optimization_hints(),
         features,
         score,
         level: ComplexityLevel::from_score(score),
         is_countable,
         recommended_strategy,
      }
   }
}

fn recommended_strategy(is_countable: bool, score: u32) -> CountStrategy {
   if !is_countable {
      return CountStrategy::Skip;
   }
   match score {
      s if s <= SIMPLE_MAX_SCORE => CountStrategy::DirectTransform,
      s if s <= MODERATE_MAX_SCORE => CountStrategy::SimpleSubquery,
      s if s <= COMPLEX_MAX_SCORE => CountStrategy::OptimizedSubquery,
      s if s <= VERY_COMPLEX_MAX_SCORE => CountStrategy::CachedEstimate,
      _ => CountStrategy::Skip,
   }
}

/// Analyze a query with the default heuristics. Never fails.
pub fn analyze(query: &str) -> ComplexityAnalysis {
   ComplexityAnalysis::from_features(QueryFeatures::extract(query))
}

/// The lighter structural feature set a pagination builder keeps in its
/// profile. Only used to gate the builder's own basic COUNT rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStructure {
   pub has_distinct: bool,
   pub has_group_by: bool,
   pub has_having: bool,
   pub has_order_by: bool,
   pub has_union: bool,
   /// A SELECT used as a derived table in FROM.
   pub has_subquery: bool,
   pub has_window_function: bool,
   /// A join written with its kind (`INNER`, `LEFT`, `RIGHT`, `FULL`, `CROSS`).
   pub has_join: bool,
   pub has_aggregate_function: bool,
}

impl QueryStructure {
   pub fn extract(query: &str) -> Self {
      let p = patterns();
      Self {
         has_distinct: p.distinct.is_match(query),
         has_group_by: p.group_by.is_match(query),
         has_having: p.having.is_match(query),
         has_order_by: p.order_by.is_match(query),
         has_union: p.union.is_match(query),
         has_subquery: p.derived_table.is_match(query),
         has_window_function: p.window.is_match(query),
         has_join: p.typed_join.is_match(query),
         has_aggregate_function: p.aggregate.is_match(query),
      }
   }

   /// Structure-complexity on the builder's own scale, which is
   /// independent of [`QueryFeatures::score`].
   pub fn weighted_score(&self) -> u32 {
      [
         (self.has_distinct, 2),
         (self.has_group_by, 2),
         (self.has_having, 1),
         (self.has_union, 3),
         (self.has_subquery, 2),
         (self.has_window_function, 3),
         (self.has_join, 1),
      ]
      .into_iter()
      .filter(|(present, _)| *present)
      .map(|(_, weight)| weight)
      .sum()
   }
}

/// Source of complexity judgements for both the pagination builder and the
/// count generator.
///
/// The two consumers still use separate scales: the builder compares
/// [`ComplexityScorer::structure_complexity`] against its basic-count limit
/// and the generator compares [`ComplexityAnalysis::score`] against its
/// maximum complexity.
pub trait ComplexityScorer: Send + Sync + fmt::Debug {
   /// Full analysis used to choose a COUNT strategy.
   fn analyze(&self, query: &str) -> ComplexityAnalysis;

   /// Lightweight structure recorded in a pagination profile.
   fn structure(&self, query: &str) -> QueryStructure;

   /// Score of a structure on the builder's scale.
   fn structure_complexity(&self, structure: &QueryStructure) -> u32 {
      structure.weighted_score()
   }
}

/// The default pattern-based scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl ComplexityScorer for HeuristicScorer {
   fn analyze(&self, query: &str) -> ComplexityAnalysis {
      analyze(query)
   }

   fn structure(&self, query: &str) -> QueryStructure {
      QueryStructure::extract(query)
   }
}

/// A human-facing summary of an analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityReport {
   #[serde(flatten)]
   pub analysis: ComplexityAnalysis,
   /// The query, truncated to 200 characters.
   pub query: String,
   /// RFC 3339 UTC timestamp of when the report was produced.
   pub generated_at: String,
   pub summary: String,
}

/// Analyze a query and package the result with a preview and summary line.
pub fn generate_report(query: &str) -> ComplexityReport {
   let analysis = analyze(query);
   let now = OffsetDateTime::now_utc();
   let generated_at = now
      .format(&Rfc3339)
      .unwrap_or_else(|_| now.unix_timestamp().to_string());

   ComplexityReport {
      query: preview(query),
      generated_at,
      summary: summarize(&analysis),
      analysis,
   }
}

fn preview(query: &str) -> String {
   match query.char_indices().nth(REPORT_QUERY_PREVIEW_CHARS) {
      Some((cut, _)) => format!("{}...", &query[..cut]),
      None => query.to_string(),
   }
}

fn plural(count: u32, singular: &str, plural: &str) -> String {
   format!("{} {}", count, if count == 1 { singular } else { plural })
}

fn summarize(analysis: &ComplexityAnalysis) -> String {
   let features = &analysis.features;
   let mut summary = format!("complexity {} (score {})", analysis.level, analysis.score);

   if analysis.is_countable {
      summary.push_str(&format!(
         ", recommended strategy {}",
         analysis.recommended_strategy
      ));
   } else {
      summary.push_str(", not countable");
   }

   let mut key_features = Vec::new();
   if features.has_group_by {
      key_features.push("GROUP BY".to_string());
   }
   if features.has_explicit_join {
      key_features.push(plural(features.join_count, "join", "joins"));
   }
   if features.has_subquery {
      key_features.push(plural(features.subquery_count, "subquery", "subqueries"));
   }
   if features.has_window_function {
      key_features.push("window function".to_string());
   }

   if !key_features.is_empty() {
      summary.push_str(", includes: ");
      summary.push_str(&key_features.join(", "));
   }

   summary
}

#[cfg(test)]
mod tests {
   use super::*;

   // ─── levels and strategies ───

   #[test]
   fn level_thresholds() {
      assert_eq!(ComplexityLevel::from_score(0), ComplexityLevel::Simple);
      assert_eq!(ComplexityLevel::from_score(1), ComplexityLevel::Moderate);
      assert_eq!(ComplexityLevel::from_score(3), ComplexityLevel::Moderate);
      assert_eq!(ComplexityLevel::from_score(4), ComplexityLevel::Complex);
      assert_eq!(ComplexityLevel::from_score(8), ComplexityLevel::Complex);
      assert_eq!(ComplexityLevel::from_score(9), ComplexityLevel::VeryComplex);
      assert_eq!(ComplexityLevel::from_score(15), ComplexityLevel::VeryComplex);
      assert_eq!(ComplexityLevel::from_score(16), ComplexityLevel::ExtremelyComplex);
   }

   #[test]
   fn strategy_thresholds() {
      assert_eq!(recommended_strategy(true, 0), CountStrategy::DirectTransform);
      assert_eq!(recommended_strategy(true, 3), CountStrategy::SimpleSubquery);
      assert_eq!(recommended_strategy(true, 8), CountStrategy::OptimizedSubquery);
      assert_eq!(recommended_strategy(true, 15), CountStrategy::CachedEstimate);
      assert_eq!(recommended_strategy(true, 16), CountStrategy::Skip);
      assert_eq!(recommended_strategy(false, 0), CountStrategy::Skip);
   }

   #[test]
   fn identifiers_serialize_screaming_snake_case() {
      assert_eq!(
         serde_json::to_string(&CountStrategy::OptimizedSubquery).unwrap(),
         "\"OPTIMIZED_SUBQUERY\""
      );
      assert_eq!(
         serde_json::to_string(&ComplexityLevel::ExtremelyComplex).unwrap(),
         "\"EXTREMELY_COMPLEX\""
      );
      assert_eq!(CountStrategy::Cached.to_string(), "CACHED");
   }

   // ─── analyze ───

   #[test]
   fn simple_select() {
      let analysis = analyze("SELECT * FROM users");

      assert_eq!(analysis.score, 0);
      assert_eq!(analysis.level, ComplexityLevel::Simple);
      assert!(analysis.is_countable);
      assert_eq!(analysis.recommended_strategy, CountStrategy::DirectTransform);
      assert_eq!(analysis.features.table_count, 1);
      assert!(analysis.warnings.is_empty());
      assert!(analysis.optimization_hints.is_empty());
   }

   #[test]
   fn distinct_select() {
      let analysis = analyze("SELECT DISTINCT department FROM users");

      assert!(analysis.features.has_distinct);
      assert_eq!(analysis.score, 2);
      assert_eq!(analysis.recommended_strategy, CountStrategy::SimpleSubquery);
      assert_eq!(analysis.optimization_hints.len(), 1);
   }

   #[test]
   fn group_by_with_aggregate() {
      // GROUP BY +2, COUNT(*) parentheses give nesting 1 (+2)
      let analysis = analyze("SELECT status, COUNT(*) FROM users GROUP BY status");

      assert!(analysis.features.has_group_by);
      assert!(analysis.features.has_aggregate_function);
      assert_eq!(analysis.features.nesting_depth, 1);
      assert_eq!(analysis.score, 4);
      assert_eq!(analysis.level, ComplexityLevel::Complex);
      assert_eq!(analysis.recommended_strategy, CountStrategy::OptimizedSubquery);
   }

   #[test]
   fn window_function_is_not_countable() {
      let analysis = analyze("SELECT *, ROW_NUMBER() OVER (ORDER BY id) FROM users");

      assert!(analysis.features.has_window_function);
      assert!(analysis.features.has_analytic_function);
      assert!(!analysis.is_countable);
      assert_eq!(analysis.recommended_strategy, CountStrategy::Skip);
      assert!(analysis.warnings[0].contains("window"));
   }

   #[test]
   fn explicit_join() {
      let analysis =
         analyze("SELECT u.*, p.name FROM users u LEFT JOIN profiles p ON u.id = p.user_id");

      assert!(analysis.features.has_explicit_join);
      assert!(!analysis.features.has_implicit_join);
      assert_eq!(analysis.features.join_count, 1);
      assert_eq!(analysis.features.table_count, 2);
      assert_eq!(analysis.score, 2);
   }

   #[test]
   fn implicit_join_suggests_explicit_syntax() {
      let analysis = analyze("SELECT * FROM users u, orders o WHERE u.id = o.user_id");

      assert!(analysis.features.has_implicit_join);
      assert_eq!(analysis.features.table_count, 2);
      assert_eq!(analysis.score, 2);
      assert!(
         analysis
            .optimization_hints
            .iter()
            .any(|hint| hint.contains("explicit JOIN"))
      );
   }

   #[test]
   fn many_comma_tables_add_table_penalty() {
      // implicit join +2, table_count 4 → +1
      let analysis = analyze("SELECT * FROM a, b, c, d");

      assert_eq!(analysis.features.table_count, 4);
      assert_eq!(analysis.score, 3);
   }

   #[test]
   fn select_list_commas_are_not_tables() {
      let features = QueryFeatures::extract("SELECT COALESCE(a, b), c, d FROM t WHERE x IN (1, 2)");

      assert!(!features.has_implicit_join);
      assert_eq!(features.table_count, 1);
   }

   #[test]
   fn commas_inside_derived_table_from_clause_count() {
      let features = QueryFeatures::extract("SELECT * FROM (SELECT a, b FROM t1, t2) x");

      assert!(features.has_implicit_join);
      // two FROM keywords + one comma
      assert_eq!(features.table_count, 3);
   }

   #[test]
   fn commas_in_string_literals_are_ignored() {
      let features = QueryFeatures::extract("SELECT * FROM t WHERE name = 'a, b'");
      assert!(!features.has_implicit_join);
   }

   #[test]
   fn in_subquery() {
      // IN +1, nesting 1 (+2), one subquery (+1)
      let analysis = analyze("SELECT * FROM users WHERE id IN (SELECT user_id FROM orders)");

      assert!(analysis.features.has_subquery);
      assert!(analysis.features.has_in);
      assert_eq!(analysis.features.subquery_count, 1);
      assert_eq!(analysis.score, 4);
      assert!(
         analysis
            .optimization_hints
            .iter()
            .any(|hint| hint.contains("JOIN"))
      );
   }

   #[test]
   fn exists_case_and_cte_weights() {
      // EXISTS +1, nesting 1 (+2), one subquery (+1)
      assert_eq!(analyze("SELECT * FROM t WHERE EXISTS (SELECT 1 FROM u)").score, 4);
      // CASE +1
      assert_eq!(analyze("SELECT CASE WHEN a > 1 THEN 'x' ELSE 'y' END FROM t").score, 1);
      // CTE +3, nesting 1 (+2), one subquery (+1)
      let cte = analyze("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent");
      assert!(cte.features.has_cte);
      assert_eq!(cte.score, 6);
   }

   #[test]
   fn union_is_not_countable() {
      let analysis = analyze("SELECT id FROM a UNION SELECT id FROM b");

      assert!(analysis.features.has_union);
      assert_eq!(analysis.score, 5);
      assert!(!analysis.is_countable);
      assert_eq!(analysis.recommended_strategy, CountStrategy::Skip);
      assert!(analysis.warnings.iter().any(|w| w.contains("UNION")));
   }

   #[test]
   fn deep_nesting_is_not_countable() {
      let analysis = analyze(
         "SELECT * FROM t WHERE a IN (SELECT b FROM u WHERE c IN (SELECT d FROM v \
          WHERE e IN (SELECT f FROM w WHERE g IN (SELECT h FROM x))))",
      );

      assert_eq!(analysis.features.nesting_depth, 4);
      assert!(!analysis.is_countable);
      assert_eq!(analysis.recommended_strategy, CountStrategy::Skip);
      assert!(analysis.warnings.iter().any(|w| w.contains("nesting")));
      assert!(analysis.warnings.iter().any(|w| w.contains("subqueries")));
   }

   #[test]
   fn very_complex_countable_query_recommends_cached_estimate() {
      let analysis = analyze(
         "SELECT DISTINCT a.x FROM a JOIN b ON a.id = b.id JOIN c ON b.id = c.id \
          WHERE a.y IN (SELECT y FROM d) GROUP BY a.x HAVING COUNT(*) > 1",
      );

      assert_eq!(analysis.features.table_count, 4);
      assert_eq!(analysis.score, 13);
      assert_eq!(analysis.level, ComplexityLevel::VeryComplex);
      assert_eq!(analysis.recommended_strategy, CountStrategy::CachedEstimate);
   }

   #[test]
   fn malformed_input_degrades_gracefully() {
      let analysis = analyze(")) SELECT ((( 'unterminated");
      assert_eq!(analysis.features.nesting_depth, 1);

      let empty = analyze("");
      assert_eq!(empty.score, 0);
      assert_eq!(empty.features.subquery_count, 0);
   }

   // ─── monotonicity ───

   #[test]
   fn adding_union_never_decreases_score() {
      let base = "SELECT * FROM users u, orders o WHERE u.id = o.user_id";
      let with_union = format!("{base} UNION SELECT * FROM archived_users");
      assert!(analyze(&with_union).score >= analyze(base).score);
   }

   #[test]
   fn adding_window_function_never_decreases_score() {
      let base = "SELECT id, total FROM orders WHERE total > 10";
      let with_window = "SELECT id, total, SUM(total) OVER (PARTITION BY id) FROM orders WHERE total > 10";
      assert!(analyze(with_window).score > analyze(base).score);
   }

   #[test]
   fn adding_nesting_never_decreases_score() {
      let base = "SELECT * FROM a, b, c, d, e";
      let wrapped = format!("SELECT * FROM ({base}) AS inner_rows");
      let twice = format!("SELECT * FROM ({wrapped}) AS outer_rows");

      assert!(analyze(&wrapped).score >= analyze(base).score);
      assert!(analyze(&twice).score >= analyze(&wrapped).score);
   }

   // ─── structure ───

   #[test]
   fn structure_weights() {
      let structure = QueryStructure::extract(
         "SELECT DISTINCT a, ROW_NUMBER() OVER (ORDER BY a) FROM t GROUP BY a",
      );

      assert!(structure.has_distinct);
      assert!(structure.has_group_by);
      assert!(structure.has_window_function);
      assert_eq!(structure.weighted_score(), 7);
   }

   #[test]
   fn structure_detects_derived_table_subquery_only() {
      assert!(QueryStructure::extract("SELECT * FROM (SELECT id FROM t) x").has_subquery);
      assert!(!QueryStructure::extract("SELECT * FROM t WHERE id IN (SELECT id FROM u)").has_subquery);
   }

   // ─── report ───

   #[test]
   fn report_summarizes_key_features() {
      let report = generate_report(
         "SELECT u.id, COUNT(*) FROM users u JOIN orders o ON o.user_id = u.id GROUP BY u.id",
      );

      assert!(report.summary.starts_with("complexity "));
      assert!(report.summary.contains("GROUP BY"));
      assert!(report.summary.contains("1 join"));
      assert!(report.generated_at.contains('T'));
   }

   #[test]
   fn report_truncates_long_queries() {
      let query = format!("SELECT * FROM t WHERE note = '{}'", "x".repeat(300));
      let report = generate_report(&query);

      assert_eq!(report.query.chars().count(), 203);
      assert!(report.query.ends_with("..."));
   }

   #[test]
   fn report_for_uncountable_query() {
      let report = generate_report("SELECT id FROM a UNION SELECT id FROM b");
      assert!(report.summary.contains("not countable"));
   }
}
