//! Hybrid recommender.
//!
//! One turn runs the filter and semantic searches concurrently, fuses the
//! two ranked lists with Reciprocal Rank Fusion, drops everything the
//! session has already been shown, and writes the updated state back to
//! session memory.
//!
//! Either search may fail independently; the surviving list is still fused
//! and returned. Session read/write failures are logged and treated as an
//! empty session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::{ChatTurn, Filters, FusionPolicy, RankedPick, fuse, resolve_query};
use crate::gateway::{ResponseMetadata, ToolBackend};
use crate::memory::{Keywords, SessionSnapshot, SessionStore};
use crate::tools::{FILTER_SEARCH, SEMANTIC_SEARCH, SearchArgs};

/// Inputs of one recommendation turn.
#[derive(Debug, Clone)]
pub struct TurnInput<'a> {
    /// Session id.
    pub session_id: &'a str,
    /// Current utterance.
    pub utterance: &'a str,
    /// Prior turns, oldest first, excluding the current one.
    pub history: &'a [ChatTurn],
    /// Filters inferred for this turn by the router.
    pub turn_filters: Filters,
    /// Matches to skip, as requested in the utterance (`offset: 10`).
    pub offset: usize,
    /// Fusion constant and page size.
    pub policy: FusionPolicy,
}

/// Result of one recommendation turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Query actually searched.
    pub query: String,
    /// Whether the utterance was a "show more" follow-up.
    pub follow_up: bool,
    /// Effective filters after layering.
    pub filters: Filters,
    /// Fused picks, best first.
    pub picks: Vec<RankedPick>,
    /// Filter search provenance, absent when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_source: Option<ResponseMetadata>,
    /// Semantic search provenance, absent when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_source: Option<ResponseMetadata>,
    /// Offset the next follow-up continues from.
    pub next_offset: usize,
}

/// Hybrid recommender over a tool backend and a session store.
#[derive(Clone)]
pub struct Recommender {
    backend: Arc<dyn ToolBackend>,
    store: Arc<dyn SessionStore>,
}

impl Recommender {
    /// Creates a recommender.
    #[must_use]
    pub fn new(backend: Arc<dyn ToolBackend>, store: Arc<dyn SessionStore>) -> Self {
        Self { backend, store }
    }

    /// The session store this recommender writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Runs one turn.
    ///
    /// # Steps
    ///
    /// 1. Load the session snapshot
    /// 2. Resolve the effective query (follow-ups reuse the last query)
    /// 3. Layer filters: session < history < current turn
    /// 4. Run filter and semantic search concurrently, excluding seen ids
    /// 5. Fuse, dedupe, exclude seen ids, truncate
    /// 6. Write the updated snapshot back
    pub async fn recommend(&self, input: &TurnInput<'_>) -> Recommendation {
        let started = Instant::now();
        let snapshot = self.load(input.session_id).await;

        let resolved = resolve_query(
            input.utterance,
            snapshot.last_query.as_deref(),
            input.history,
        );

        let history_keywords = Keywords::extract(input.history);
        let turn_keywords = Keywords::extract(&[ChatTurn::user(input.utterance)]);
        let session_filters = snapshot.filters.clone().unwrap_or_default();
        let turn_filters = turn_keywords.to_filters().overlay(&input.turn_filters);
        let filters = Filters::layered([
            &session_filters,
            &history_keywords.to_filters(),
            &turn_filters,
        ]);

        let prior_seen = snapshot.seen_ids.clone().unwrap_or_default();
        let seen: HashSet<String> = prior_seen.iter().cloned().collect();
        // Tools drop excluded ids before skipping, so follow-ups page through
        // exclusion and only an explicit offset is forwarded.
        let offset = if resolved.follow_up {
            snapshot.next_offset.unwrap_or(0)
        } else {
            input.offset
        };

        let filter_args = SearchArgs {
            query: resolved.query.clone(),
            filters: filters.clone(),
            offset: input.offset,
            limit: Some(input.policy.limit),
            exclude_ids: prior_seen.clone(),
        };
        let semantic_args = filter_args.clone();

        let (filter_result, semantic_result) = tokio::join!(
            self.backend.search(FILTER_SEARCH, &filter_args),
            self.backend.search(SEMANTIC_SEARCH, &semantic_args),
        );
        if filter_result.is_none() {
            debug!(session = input.session_id, "filter search returned nothing usable");
        }
        if semantic_result.is_none() {
            debug!(session = input.session_id, "semantic search returned nothing usable");
        }

        let filter_picks = filter_result
            .as_ref()
            .map(|r| r.picks.as_slice())
            .unwrap_or_default();
        let semantic_picks = semantic_result
            .as_ref()
            .map(|r| r.picks.as_slice())
            .unwrap_or_default();
        let picks = fuse(filter_picks, semantic_picks, &seen, input.policy);

        let shown: Vec<String> = picks.iter().map(|p| p.id.clone()).collect();
        let mut seen_ids = prior_seen;
        for id in &shown {
            if !seen.contains(id) {
                seen_ids.push(id.clone());
            }
        }
        let next_offset = offset + shown.len();

        let keywords = snapshot
            .keywords
            .clone()
            .unwrap_or_default()
            .overlay(&history_keywords)
            .overlay(&turn_keywords);

        let updated = SessionSnapshot {
            filters: Some(filters.clone()),
            keywords: Some(keywords),
            last_query: Some(resolved.query.clone()),
            last_picks: Some(shown),
            next_offset: Some(next_offset),
            seen_ids: Some(seen_ids),
            ..snapshot
        };
        if let Err(e) = self.store.set(input.session_id, updated).await {
            warn!(session = input.session_id, error = %e, "failed to persist session");
        }

        info!(
            session = input.session_id,
            query = %resolved.query,
            follow_up = resolved.follow_up,
            picks = picks.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "recommendation complete"
        );

        Recommendation {
            query: resolved.query,
            follow_up: resolved.follow_up,
            filters,
            picks,
            filter_source: filter_result.map(|r| r.metadata),
            semantic_source: semantic_result.map(|r| r.metadata),
            next_offset,
        }
    }

    async fn load(&self, session_id: &str) -> SessionSnapshot {
        match self.store.get(session_id).await {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                warn!(session = session_id, error = %e, "failed to read session; starting fresh");
                SessionSnapshot::default()
            }
        }
    }
}

impl std::fmt::Debug for Recommender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recommender")
            .field("store", &self.store.backend())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::core::Pick;
    use crate::gateway::RecommendationResponse;
    use crate::memory::LocalStore;
    use crate::tools::catalog::fixtures;
    use crate::tools::{GenerateImageArgs, ImageRender, ToolRegistry};

    /// Backend with canned lists that records the arguments it was sent.
    #[derive(Default)]
    struct Scripted {
        filter: Option<Vec<Pick>>,
        semantic: Option<Vec<Pick>>,
        calls: Mutex<Vec<(String, SearchArgs)>>,
    }

    #[async_trait]
    impl ToolBackend for Scripted {
        async fn search(&self, tool: &str, args: &SearchArgs) -> Option<RecommendationResponse> {
            self.calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((tool.to_string(), args.clone()));
            let picks = if tool == FILTER_SEARCH {
                self.filter.clone()
            } else {
                self.semantic.clone()
            }?;
            Some(RecommendationResponse {
                picks: picks
                    .into_iter()
                    .filter(|p| !args.exclude_ids.contains(&p.id))
                    .collect(),
                metadata: ResponseMetadata::default(),
            })
        }

        async fn generate_image(&self, _: &GenerateImageArgs) -> Option<ImageRender> {
            None
        }
    }

    fn picks(ids: &[&str]) -> Option<Vec<Pick>> {
        Some(ids.iter().map(|id| Pick::new(*id, "r")).collect())
    }

    fn store() -> Arc<LocalStore> {
        Arc::new(LocalStore::new(Duration::from_secs(60), 16))
    }

    fn input<'a>(utterance: &'a str, history: &'a [ChatTurn]) -> TurnInput<'a> {
        TurnInput {
            session_id: "s1",
            utterance,
            history,
            turn_filters: Filters::default(),
            offset: 0,
            policy: FusionPolicy::with_limit(10),
        }
    }

    fn ids(rec: &Recommendation) -> Vec<&str> {
        rec.picks.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_fuses_both_sources_and_writes_back() {
        let backend = Arc::new(Scripted {
            filter: picks(&["a", "b"]),
            semantic: picks(&["b", "c"]),
            ..Scripted::default()
        });
        let store = store();
        let recommender = Recommender::new(backend, store.clone());

        let rec = recommender.recommend(&input("tinta azul para sala", &[])).await;
        assert_eq!(ids(&rec), vec!["b", "a", "c"]);
        assert_eq!(rec.next_offset, 3);
        assert_eq!(rec.filters.color.as_deref(), Some("azul"));
        assert_eq!(rec.filters.room_type.as_deref(), Some("sala"));

        let snapshot = store.get("s1").await.ok().flatten().unwrap_or_default();
        assert_eq!(snapshot.last_query.as_deref(), Some("tinta azul para sala"));
        assert_eq!(snapshot.last_picks, Some(vec!["b".into(), "a".into(), "c".into()]));
        assert_eq!(snapshot.seen_ids, Some(vec!["b".into(), "a".into(), "c".into()]));
        assert_eq!(snapshot.next_offset, Some(3));
        assert!(snapshot.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_one_failed_source_still_returns_the_other() {
        let backend = Arc::new(Scripted {
            filter: None,
            semantic: picks(&["c", "d"]),
            ..Scripted::default()
        });
        let recommender = Recommender::new(backend, store());
        let rec = recommender.recommend(&input("algo calmo", &[])).await;
        assert_eq!(ids(&rec), vec!["c", "d"]);
        assert!(rec.filter_source.is_none());
        assert!(rec.semantic_source.is_some());
    }

    #[tokio::test]
    async fn test_follow_up_reuses_query_and_excludes_seen() {
        let backend = Arc::new(Scripted {
            filter: picks(&["a", "b", "c"]),
            semantic: picks(&["a", "b", "c"]),
            ..Scripted::default()
        });
        let store = store();
        store
            .set(
                "s1",
                SessionSnapshot {
                    last_query: Some("tinta azul para sala".to_string()),
                    seen_ids: Some(vec!["a".to_string(), "b".to_string()]),
                    next_offset: Some(2),
                    ..SessionSnapshot::default()
                },
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        let recommender = Recommender::new(backend.clone(), store.clone());
        let rec = recommender.recommend(&input("mostre mais opções", &[])).await;

        assert!(rec.follow_up);
        assert_eq!(rec.query, "tinta azul para sala");
        assert_eq!(ids(&rec), vec!["c"]);
        assert_eq!(rec.next_offset, 3);

        let calls = backend
            .calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(_, args)| args.query == "tinta azul para sala"));
        assert!(calls.iter().all(|(_, args)| args.exclude_ids == ["a", "b"]));

        let snapshot = store.get("s1").await.ok().flatten().unwrap_or_default();
        assert_eq!(
            snapshot.seen_ids,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[tokio::test]
    async fn test_explicit_offset_reaches_both_searches() {
        let backend = Arc::new(Scripted {
            filter: picks(&["k", "l"]),
            semantic: picks(&["l", "m"]),
            ..Scripted::default()
        });
        let store = store();
        let recommender = Recommender::new(backend.clone(), store.clone());

        let mut turn = input("tinta azul offset: 10", &[]);
        turn.offset = 10;
        let rec = recommender.recommend(&turn).await;
        assert_eq!(rec.next_offset, 13);

        let calls = backend
            .calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(_, args)| args.offset == 10));

        let snapshot = store.get("s1").await.ok().flatten().unwrap_or_default();
        assert_eq!(snapshot.next_offset, Some(13));
    }

    #[tokio::test]
    async fn test_filter_precedence() {
        let backend = Arc::new(Scripted::default());
        let store = store();
        store
            .set(
                "s1",
                SessionSnapshot {
                    filters: Some(Filters {
                        color: Some("verde".to_string()),
                        finish: Some("fosco".to_string()),
                        ..Filters::default()
                    }),
                    ..SessionSnapshot::default()
                },
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        let history = [ChatTurn::user("quero algo para o quarto, cor azul")];
        let mut turn = input("na verdade prefiro a sala", &history);
        turn.turn_filters.line = Some("premium".to_string());

        let rec = Recommender::new(backend, store).recommend(&turn).await;
        assert_eq!(rec.filters.finish.as_deref(), Some("fosco"));
        assert_eq!(rec.filters.color.as_deref(), Some("azul"));
        assert_eq!(rec.filters.room_type.as_deref(), Some("sala"));
        assert_eq!(rec.filters.line.as_deref(), Some("premium"));
        assert!(rec.picks.is_empty());
    }

    #[tokio::test]
    async fn test_with_builtin_tools() {
        let registry = Arc::new(ToolRegistry::builtin(Arc::new(fixtures::sample())));
        let recommender = Recommender::new(registry, store());

        let first = recommender.recommend(&input("tinta azul para sala", &[])).await;
        assert!(first.picks.iter().any(|p| p.id == "p1"));
        assert!(first.picks.iter().any(|p| p.id == "p2"));

        let more = recommender.recommend(&input("mostre mais", &[])).await;
        assert!(more.picks.iter().all(|p| !first.picks.iter().any(|f| f.id == p.id)));
    }
}
