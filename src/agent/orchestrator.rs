//! Per-turn orchestration.
//!
//! Coordinates one conversational turn: keyword extraction → routing →
//! recommendation and/or scene render → outcome. Nothing here fails: a
//! router that finds nothing, a worker that is down, or a session store
//! that errors all degrade to fewer results, and an empty action list
//! asks the caller to request clarification.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::router::{IntentRouter, RouteRequest, RouterAction, route_or_empty};
use crate::config::Config;
use crate::core::{ChatTurn, FusionPolicy, is_follow_up};
use crate::gateway::ToolBackend;
use crate::memory::{Keywords, SessionStore};
use crate::recommender::{Recommendation, Recommender, TurnInput};
use crate::tools::{FILTER_SEARCH, ImageRender, SearchArgs};

/// Result of one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    /// Keywords extracted from the conversation including this turn.
    pub keywords: Keywords,
    /// Actions chosen for this turn.
    pub actions: Vec<RouterAction>,
    /// Fused recommendation, when a search action ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    /// Scene render request, when an image action ran and succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRender>,
    /// No action applied; the caller should ask the user to clarify.
    pub needs_clarification: bool,
}

/// Orchestrates routing, tool execution and session write-back.
pub struct Orchestrator {
    router: Arc<dyn IntentRouter>,
    backend: Arc<dyn ToolBackend>,
    recommender: Recommender,
    multi_turn: FusionPolicy,
    one_shot: FusionPolicy,
}

impl Orchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        router: Arc<dyn IntentRouter>,
        backend: Arc<dyn ToolBackend>,
        store: Arc<dyn SessionStore>,
        config: &Config,
    ) -> Self {
        Self {
            router,
            recommender: Recommender::new(Arc::clone(&backend), store),
            backend,
            multi_turn: config.fusion_policy(false),
            one_shot: config.fusion_policy(true),
        }
    }

    /// Handles one turn.
    ///
    /// `history` holds the prior turns, oldest first, without the current
    /// utterance. `one_shot` selects the smaller page size used outside a
    /// multi-turn conversation.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        utterance: &str,
        history: &[ChatTurn],
        one_shot: bool,
    ) -> TurnOutcome {
        let start = Instant::now();

        let mut turns = history.to_vec();
        turns.push(ChatTurn::user(utterance));
        let keywords = Keywords::extract(&turns);

        let actions = if is_follow_up(utterance) {
            debug!(session = session_id, "follow-up turn, forcing search");
            vec![RouterAction::search(
                FILTER_SEARCH,
                &SearchArgs {
                    query: utterance.to_string(),
                    ..SearchArgs::default()
                },
                1.0,
                "follow-up continues the previous search",
            )]
        } else {
            route_or_empty(&*self.router, &RouteRequest::new(utterance, &keywords)).await
        };

        if actions.is_empty() {
            info!(session = session_id, "no action for turn; asking for clarification");
            return TurnOutcome {
                keywords,
                needs_clarification: true,
                ..TurnOutcome::default()
            };
        }

        let search = actions.iter().find(|a| !a.is_image()).map(RouterAction::search_args);
        let image = actions.iter().find(|a| a.is_image()).map(RouterAction::image_args);

        let base_policy = if one_shot { self.one_shot } else { self.multi_turn };
        let recommend = async {
            let args = search?;
            let policy = args
                .limit
                .map_or(base_policy, |limit| FusionPolicy { limit, ..base_policy });
            let input = TurnInput {
                session_id,
                utterance,
                history,
                turn_filters: args.filters,
                offset: args.offset,
                policy,
            };
            Some(self.recommender.recommend(&input).await)
        };
        let render = async {
            let args = image?;
            self.backend.generate_image(&args).await
        };
        let (recommendation, image) = tokio::join!(recommend, render);

        info!(
            session = session_id,
            actions = actions.len(),
            picks = recommendation.as_ref().map_or(0, |r| r.picks.len()),
            image = image.is_some(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "turn handled"
        );

        TurnOutcome {
            keywords,
            actions,
            recommendation,
            image,
            needs_clarification: false,
        }
    }

    /// Forgets a session.
    pub async fn reset_session(&self, session_id: &str) {
        if let Err(e) = self.recommender.store().reset(session_id).await {
            warn!(session = session_id, error = %e, "failed to reset session");
        }
    }

    /// The router used for non-follow-up turns.
    #[must_use]
    pub fn router(&self) -> &dyn IntentRouter {
        &*self.router
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("router", &self.router.name())
            .field("recommender", &self.recommender)
            .field("multi_turn", &self.multi_turn)
            .field("one_shot", &self.one_shot)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agent::rules::RuleRouter;
    use crate::memory::LocalStore;
    use crate::tools::ToolRegistry;
    use crate::tools::catalog::fixtures;

    fn orchestrator() -> Orchestrator {
        let config = Config::builder()
            .memory_ttl(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| unreachable!());
        Orchestrator::new(
            Arc::new(RuleRouter),
            Arc::new(ToolRegistry::builtin(Arc::new(fixtures::sample()))),
            Arc::new(LocalStore::new(Duration::from_secs(60), 8)),
            &config,
        )
    }

    #[tokio::test]
    async fn test_unroutable_turn_asks_for_clarification() {
        let outcome = orchestrator().handle_turn("s1", "bom dia", &[], false).await;
        assert!(outcome.needs_clarification);
        assert!(outcome.actions.is_empty());
        assert!(outcome.recommendation.is_none());
        assert!(outcome.image.is_none());
    }

    #[tokio::test]
    async fn test_search_turn_then_follow_up() {
        let orchestrator = orchestrator();
        let first = orchestrator
            .handle_turn("s1", "quero ver tintas, cor:azul", &[], true)
            .await;
        assert!(!first.needs_clarification);
        let shown = first.recommendation.map(|r| r.picks).unwrap_or_default();
        assert!(!shown.is_empty());
        assert!(shown.len() <= 5);

        let history = [
            ChatTurn::user("quero ver tintas, cor:azul"),
            ChatTurn::assistant("Aqui estão algumas opções."),
        ];
        let more = orchestrator
            .handle_turn("s1", "mostre mais opções", &history, true)
            .await;
        assert_eq!(more.actions.len(), 1);
        assert_eq!(more.actions[0].tool, FILTER_SEARCH);
        let rec = more.recommendation.unwrap_or_default();
        assert!(rec.follow_up);
        assert_eq!(rec.query, "quero ver tintas, cor:azul");
        assert!(rec.picks.iter().all(|p| !shown.iter().any(|s| s.id == p.id)));
    }

    #[tokio::test]
    async fn test_offset_hint_is_forwarded() {
        let outcome = orchestrator()
            .handle_turn("s3", "quero ver tintas, cor:azul offset: 1", &[], false)
            .await;
        assert!(outcome.actions.iter().all(|a| a.search_args().offset == 1));
        let rec = outcome.recommendation.unwrap_or_default();
        assert_eq!(rec.next_offset, 1 + rec.picks.len());
    }

    #[tokio::test]
    async fn test_image_request_skips_search() {
        let outcome = orchestrator()
            .handle_turn("s2", "cor:verde ambiente:quarto, gere uma imagem", &[], false)
            .await;
        assert_eq!(outcome.actions.len(), 1);
        assert!(outcome.recommendation.is_none());
        let image = outcome.image.unwrap_or_else(|| unreachable!());
        assert_eq!(image.room, "quarto");
    }
}
