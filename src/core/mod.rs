//! Core value types and pure algorithms.
//!
//! Nothing in here performs I/O: the fusion, follow-up and text helpers are
//! shared by the recommender, the router and the worker-side tools.

pub mod filters;
pub mod followup;
pub mod fusion;
pub mod text;
pub mod turn;

pub use filters::Filters;
pub use followup::{ResolvedQuery, is_follow_up, resolve_query};
pub use fusion::{DEFAULT_RRF_K, FusionPolicy, Pick, RankedPick, fuse, reciprocal_rank_fusion};
pub use turn::{ChatTurn, TurnRole};

use regex::Regex;

/// Compiles one of the crate's built-in patterns.
///
/// Built-in patterns are string literals exercised by unit tests, so a
/// compile failure is a programming error rather than a runtime condition.
pub(crate) fn builtin_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| unreachable!("invalid built-in pattern {pattern}: {e}"))
}
