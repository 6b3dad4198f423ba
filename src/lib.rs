//! # huebridge
//!
//! Conversational paint recommendations over a JSON-RPC tool worker.
//!
//! Each user turn flows through:
//!
//! 1. **Keyword extraction** ([`memory::Keywords`]): room, colour, style,
//!    mood and tags from the recent conversation.
//! 2. **Intent routing** ([`agent::IntentRouter`]): a model-based router
//!    with a deterministic rule fallback picks at most two tools.
//! 3. **Tool execution** ([`gateway::ToolGateway`]): filter search,
//!    semantic search and scene rendering run in a child process spoken to
//!    over newline-delimited JSON-RPC 2.0 ([`rpc`]).
//! 4. **Fusion** ([`core::fuse`]): Reciprocal Rank Fusion (k = 60) with
//!    dedupe and exclusion of products the session has already seen.
//! 5. **Session memory** ([`memory::SessionStore`]): filters, last query,
//!    seen ids and pagination survive between turns with a TTL.
//!
//! Failures below the CLI never surface as errors: a dead worker, a slow
//! model or an unreachable store degrade the turn to fewer results.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use huebridge::agent::{Orchestrator, RuleRouter};
//! use huebridge::config::Config;
//! use huebridge::memory::open_store;
//! use huebridge::tools::{Catalog, ToolRegistry};
//!
//! # async fn run() -> huebridge::Result<()> {
//! let config = Config::from_env()?;
//! let catalog = Catalog::load(std::path::Path::new("products.json"))?;
//! let orchestrator = Orchestrator::new(
//!     Arc::new(RuleRouter),
//!     Arc::new(ToolRegistry::builtin(Arc::new(catalog))),
//!     open_store(&config).await,
//!     &config,
//! );
//! let outcome = orchestrator
//!     .handle_turn("session-1", "tinta azul fosca para a sala", &[], true)
//!     .await;
//! println!("{:?}", outcome.recommendation);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod recommender;
pub mod rpc;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{ToolBackend, ToolGateway};
pub use recommender::{Recommendation, Recommender};
