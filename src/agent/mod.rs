//! Intent routing and the per-turn pipeline.
//!
//! Routes a conversational turn to the catalog tools through a pluggable
//! LLM provider abstraction backed by OpenAI-compatible APIs, with a
//! deterministic rule router as the fallback.
//!
//! # Architecture
//!
//! ```text
//! utterance + history → Orchestrator
//!   ├── Keywords::extract (recency wins)
//!   ├── IntentRouter
//!   │   └── WithFallback(ModelRouter, RuleRouter) → ≤ 2 RouterActions
//!   ├── search action → Recommender (filter ∥ semantic → RRF → session)
//!   ├── image action  → ToolBackend::generate_image
//!   └── TurnOutcome (or needs_clarification)
//! ```
//!
//! # Feature Gate
//!
//! The model router needs the `openai` feature (on by default). Without it
//! only the rule router is available.

#[cfg(feature = "openai")]
pub mod classifier;
pub mod config;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod router;
pub mod rules;
pub mod swatch;

#[cfg(feature = "openai")]
pub use classifier::ModelRouter;
pub use config::RouterConfig;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use prompt::PromptSet;
pub use provider::{LlmProvider, create_provider};
pub use router::{IntentRouter, MAX_ACTIONS, RouteRequest, RouterAction, WithFallback};
pub use rules::{RuleHints, RuleRouter};
