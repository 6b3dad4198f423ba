//! Reciprocal Rank Fusion over two ranked pick lists.
//!
//! An item at 1-based rank `r` contributes `1 / (r + k)`. Items present in
//! both lists sum both contributions. The fused list is ordered by
//! descending score with ties kept in first-encountered order (filter list
//! first, then semantic-only items), deduplicated by id, stripped of ids
//! the session has already seen, and only then truncated.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Standard RRF damping constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Suffix appended to the reason of picks found by both strategies.
const DUAL_PROVENANCE_NOTE: &str = "matched by both filter and semantic search";

/// A ranked result from one search strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    /// Product id.
    pub id: String,
    /// Display name, if the tool provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Opaque human-readable reason.
    #[serde(default)]
    pub reason: String,
}

impl Pick {
    /// Creates a pick with an id and reason.
    #[must_use]
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            reason: reason.into(),
        }
    }
}

/// A pick produced by the fusion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPick {
    /// Product id.
    pub id: String,
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Reason, annotated when both strategies returned the id.
    pub reason: String,
    /// 1-based rank in the filter list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_rank: Option<usize>,
    /// 1-based rank in the semantic list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_rank: Option<usize>,
    /// Summed RRF score.
    pub fusion_score: f64,
}

/// Fusion parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionPolicy {
    /// RRF damping constant.
    pub k: f64,
    /// Maximum picks returned after exclusion.
    pub limit: usize,
}

impl FusionPolicy {
    /// Policy with the default `k` and the given limit.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            k: DEFAULT_RRF_K,
            limit,
        }
    }
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self::with_limit(10)
    }
}

/// RRF contribution of a 1-based rank.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rrf_score(rank: usize, k: f64) -> f64 {
    1.0 / (rank as f64 + k)
}

/// Fuses two ranked lists with Reciprocal Rank Fusion.
///
/// Repeated ids inside one list keep their first (best) rank. The result
/// is sorted by descending score and contains each id once.
#[must_use]
pub fn reciprocal_rank_fusion(filter_picks: &[Pick], semantic_picks: &[Pick], k: f64) -> Vec<RankedPick> {
    let mut fused: Vec<RankedPick> = Vec::with_capacity(filter_picks.len() + semantic_picks.len());
    let mut index: HashMap<&str, usize> = HashMap::new();

    for (pos, pick) in filter_picks.iter().enumerate() {
        if index.contains_key(pick.id.as_str()) {
            continue;
        }
        let rank = pos + 1;
        index.insert(pick.id.as_str(), fused.len());
        fused.push(RankedPick {
            id: pick.id.clone(),
            name: pick.name.clone(),
            reason: pick.reason.clone(),
            filter_rank: Some(rank),
            semantic_rank: None,
            fusion_score: rrf_score(rank, k),
        });
    }

    for (pos, pick) in semantic_picks.iter().enumerate() {
        let rank = pos + 1;
        match index.get(pick.id.as_str()) {
            Some(&slot) => {
                let entry = &mut fused[slot];
                if entry.semantic_rank.is_some() {
                    continue;
                }
                entry.semantic_rank = Some(rank);
                entry.fusion_score += rrf_score(rank, k);
                if entry.name.is_none() {
                    entry.name.clone_from(&pick.name);
                }
                entry.reason = annotate_dual(&entry.reason, &pick.reason);
            }
            None => {
                index.insert(pick.id.as_str(), fused.len());
                fused.push(RankedPick {
                    id: pick.id.clone(),
                    name: pick.name.clone(),
                    reason: pick.reason.clone(),
                    filter_rank: None,
                    semantic_rank: Some(rank),
                    fusion_score: rrf_score(rank, k),
                });
            }
        }
    }

    // `sort_by` is stable, so equal scores keep first-encountered order.
    fused.sort_by(|a, b| b.fusion_score.total_cmp(&a.fusion_score));
    fused
}

fn annotate_dual(filter_reason: &str, semantic_reason: &str) -> String {
    let base = if filter_reason.is_empty() {
        semantic_reason
    } else {
        filter_reason
    };
    if base.is_empty() {
        DUAL_PROVENANCE_NOTE.to_string()
    } else {
        format!("{base} ({DUAL_PROVENANCE_NOTE})")
    }
}

/// Keeps the first occurrence of each id.
#[must_use]
pub fn dedupe_by_id(picks: Vec<RankedPick>) -> Vec<RankedPick> {
    let mut seen = HashSet::new();
    picks
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect()
}

/// Drops picks whose id is in `seen_ids`.
#[must_use]
pub fn exclude_seen(picks: Vec<RankedPick>, seen_ids: &HashSet<String>) -> Vec<RankedPick> {
    picks
        .into_iter()
        .filter(|p| !seen_ids.contains(&p.id))
        .collect()
}

/// Full fusion pipeline: RRF, dedupe, seen-exclusion, truncation.
#[must_use]
pub fn fuse(
    filter_picks: &[Pick],
    semantic_picks: &[Pick],
    seen_ids: &HashSet<String>,
    policy: FusionPolicy,
) -> Vec<RankedPick> {
    let fused = reciprocal_rank_fusion(filter_picks, semantic_picks, policy.k);
    let mut picks = exclude_seen(dedupe_by_id(fused), seen_ids);
    picks.truncate(policy.limit);
    picks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn picks(ids: &[&str]) -> Vec<Pick> {
        ids.iter().map(|id| Pick::new(*id, format!("reason {id}"))).collect()
    }

    fn ids(ranked: &[RankedPick]) -> Vec<&str> {
        ranked.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_rrf_example_ordering() {
        let fused = reciprocal_rank_fusion(&picks(&["a", "b"]), &picks(&["b", "c"]), DEFAULT_RRF_K);
        assert_eq!(ids(&fused), vec!["b", "a", "c"]);

        let score = |id: &str| fused.iter().find(|p| p.id == id).map(|p| p.fusion_score);
        assert!((score("a").unwrap_or_default() - 1.0 / 61.0).abs() < 1e-12);
        assert!((score("b").unwrap_or_default() - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((score("c").unwrap_or_default() - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn test_dual_provenance_annotation() {
        let fused = reciprocal_rank_fusion(&picks(&["a", "b"]), &picks(&["b", "c"]), DEFAULT_RRF_K);
        let b = &fused[0];
        assert_eq!(b.filter_rank, Some(2));
        assert_eq!(b.semantic_rank, Some(1));
        assert!(b.reason.starts_with("reason b"));
        assert!(b.reason.contains(DUAL_PROVENANCE_NOTE));
        assert!(!fused[1].reason.contains(DUAL_PROVENANCE_NOTE));
    }

    #[test]
    fn test_ties_keep_first_encountered_order() {
        // x and y both sit at rank 1 of their own list.
        let fused = reciprocal_rank_fusion(&picks(&["x"]), &picks(&["y"]), DEFAULT_RRF_K);
        assert_eq!(ids(&fused), vec!["x", "y"]);
    }

    #[test]
    fn test_seen_exclusion() {
        let seen: HashSet<String> = ["a", "b"].iter().map(ToString::to_string).collect();
        let out = fuse(&picks(&["a", "b", "c"]), &[], &seen, FusionPolicy::with_limit(10));
        assert_eq!(ids(&out), vec!["c"]);
    }

    #[test]
    fn test_exclusion_happens_before_truncation() {
        let seen: HashSet<String> = ["a"].iter().map(ToString::to_string).collect();
        let out = fuse(&picks(&["a", "b", "c"]), &[], &seen, FusionPolicy::with_limit(2));
        assert_eq!(ids(&out), vec!["b", "c"]);
    }

    #[test]
    fn test_duplicates_within_one_list_keep_best_rank() {
        let fused = reciprocal_rank_fusion(&picks(&["a", "a", "b"]), &[], DEFAULT_RRF_K);
        assert_eq!(ids(&fused), vec!["a", "b"]);
        assert_eq!(fused[0].filter_rank, Some(1));
        assert_eq!(fused[1].filter_rank, Some(3));
    }

    #[test]
    fn test_one_side_empty() {
        let out = fuse(&[], &picks(&["s1", "s2"]), &HashSet::new(), FusionPolicy::with_limit(5));
        assert_eq!(ids(&out), vec!["s1", "s2"]);
        assert!(fuse(&[], &[], &HashSet::new(), FusionPolicy::default()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_fused_scores_are_descending_and_unique(
            left in proptest::collection::vec("[a-f]", 0..12),
            right in proptest::collection::vec("[a-f]", 0..12),
        ) {
            let l: Vec<Pick> = left.iter().map(|id| Pick::new(id.clone(), "")).collect();
            let r: Vec<Pick> = right.iter().map(|id| Pick::new(id.clone(), "")).collect();
            let fused = reciprocal_rank_fusion(&l, &r, DEFAULT_RRF_K);

            for pair in fused.windows(2) {
                prop_assert!(pair[0].fusion_score >= pair[1].fusion_score);
            }
            let unique: HashSet<&str> = fused.iter().map(|p| p.id.as_str()).collect();
            prop_assert_eq!(unique.len(), fused.len());
        }
    }
}
