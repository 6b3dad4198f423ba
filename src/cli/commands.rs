//! CLI command implementations.
//!
//! Each command resolves [`Config`] once, builds the pieces it needs and
//! bridges into async code with a private tokio runtime.

use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::agent::router::route_or_empty;
use crate::agent::{IntentRouter, Orchestrator, PromptSet, RouteRequest, RuleRouter, TurnOutcome};
use crate::cli::output::{OutputFormat, format_actions, format_outcome, format_tools};
use crate::cli::parser::{Cli, Commands, SessionArgs};
use crate::config::Config;
use crate::core::ChatTurn;
use crate::error::{CommandError, Error, Result};
use crate::gateway::{ToolBackend, ToolGateway};
use crate::memory::{Keywords, open_store};
use crate::rpc::ToolDispatcher;
use crate::tools::{Catalog, ToolRegistry};

/// Executes the CLI command.
///
/// # Returns
///
/// Output to print on stdout. Commands that stream their output (`worker`,
/// `chat`) return an empty string.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the catalog or history
/// file cannot be read, or the command itself fails.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let config = build_config(cli)?;

    match &cli.command {
        Commands::Worker => cmd_worker(&config),
        Commands::Route {
            utterance,
            rules_only,
        } => cmd_route(utterance, *rules_only, format),
        Commands::Ask {
            utterance,
            session,
            history,
            one_shot,
        } => cmd_ask(
            &config,
            &AskParams {
                utterance,
                session,
                history: history.as_deref(),
                one_shot: *one_shot,
            },
            format,
        ),
        Commands::Chat { session } => cmd_chat(&config, session, format),
        Commands::Tools { in_process } => cmd_tools(&config, *in_process, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Parameters for the ask command.
#[derive(Debug, Clone, Copy)]
struct AskParams<'a> {
    utterance: &'a str,
    session: &'a SessionArgs,
    history: Option<&'a Path>,
    one_shot: bool,
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut builder = Config::builder();
    if let Some(path) = &cli.catalog {
        builder = builder.catalog_path(path.clone());
    }
    Ok(builder.from_env().build()?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

fn load_registry(config: &Config) -> Result<ToolRegistry> {
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => {
            warn!("no catalog configured; searches will return nothing");
            Catalog::default()
        }
    };
    debug!(products = catalog.len(), "catalog loaded");
    Ok(ToolRegistry::builtin(Arc::new(catalog)))
}

/// Model router with rule fallback when a provider is configured, rules
/// only otherwise.
fn build_router(rules_only: bool) -> Arc<dyn IntentRouter> {
    if rules_only {
        return Arc::new(RuleRouter);
    }

    #[cfg(feature = "openai")]
    {
        use crate::agent::{ModelRouter, RouterConfig, WithFallback, create_provider};
        use crate::error::AgentError;

        let provider = RouterConfig::from_env()
            .and_then(|config| create_provider(&config).map(|provider| (config, provider)));
        match provider {
            Ok((config, provider)) => {
                let prompts = PromptSet::load(config.prompt_dir.as_deref());
                let model = ModelRouter::new(provider, &config, prompts.router);
                return Arc::new(WithFallback::new(model, RuleRouter));
            }
            Err(AgentError::ApiKeyMissing) => debug!("no API key; routing with keyword rules"),
            Err(e) => warn!(error = %e, "model router unavailable; routing with keyword rules"),
        }
    }

    Arc::new(RuleRouter)
}

/// Orchestrator plus the worker it talks to, if any.
struct Session {
    orchestrator: Orchestrator,
    gateway: Option<Arc<ToolGateway>>,
}

impl Session {
    async fn open(config: &Config, args: &SessionArgs) -> Result<Self> {
        let (backend, gateway) = if args.in_process {
            (Arc::new(load_registry(config)?) as Arc<dyn ToolBackend>, None)
        } else {
            let gateway = Arc::new(ToolGateway::new(config.worker(), config.call_timeout));
            if !gateway.enable().await {
                warn!(
                    command = %config.worker_command,
                    "tool worker unavailable; turns will return no products"
                );
            }
            (Arc::clone(&gateway) as Arc<dyn ToolBackend>, Some(gateway))
        };

        let store = open_store(config).await;
        let router = build_router(args.rules_only);
        let orchestrator = Orchestrator::new(router, backend, store, config);
        info!(router = orchestrator.router().name(), "session ready");
        Ok(Self {
            orchestrator,
            gateway,
        })
    }

    async fn close(self) {
        if let Some(gateway) = self.gateway {
            gateway.disable().await;
        }
    }
}

fn render_outcome(outcome: &TurnOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_outcome(outcome),
        OutputFormat::Json | OutputFormat::Ndjson => format.to_json(outcome),
    }
}

fn read_history(path: &Path) -> Result<Vec<ChatTurn>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        CommandError::InvalidArgument(format!("history file {}: {e}", path.display())).into()
    })
}

fn cmd_worker(config: &Config) -> Result<String> {
    let registry = load_registry(config)?;
    info!(tools = registry.len(), "worker serving on stdio");

    let dispatcher = ToolDispatcher::new(registry);
    let rt = runtime()?;
    rt.block_on(async {
        tokio::select! {
            served = dispatcher.serve_stdio() => served,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; worker stopping");
                Ok(())
            }
        }
    })?;
    Ok(String::new())
}

fn cmd_route(utterance: &str, rules_only: bool, format: OutputFormat) -> Result<String> {
    let router = build_router(rules_only);
    let keywords = Keywords::extract(&[ChatTurn::user(utterance)]);

    let rt = runtime()?;
    let actions = rt.block_on(route_or_empty(
        &*router,
        &RouteRequest::new(utterance, &keywords),
    ));

    match format {
        OutputFormat::Text => {
            let mut output = format!("Router: {}\n", router.name());
            if !keywords.is_empty() {
                let _ = writeln!(output, "Keywords: {}", keywords.summary());
            }
            output.push_str(&format_actions(&actions));
            Ok(output)
        }
        OutputFormat::Json | OutputFormat::Ndjson => Ok(format.to_json(&json!({
            "router": router.name(),
            "keywords": keywords,
            "actions": actions,
        }))),
    }
}

fn cmd_ask(config: &Config, params: &AskParams<'_>, format: OutputFormat) -> Result<String> {
    let history = params
        .history
        .map(read_history)
        .transpose()?
        .unwrap_or_default();

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let session = Session::open(config, params.session).await?;
        let outcome = session
            .orchestrator
            .handle_turn(
                &params.session.session,
                params.utterance,
                &history,
                params.one_shot,
            )
            .await;
        session.close().await;
        Ok::<_, Error>(outcome)
    })?;

    Ok(render_outcome(&outcome, format))
}

fn cmd_chat(config: &Config, args: &SessionArgs, format: OutputFormat) -> Result<String> {
    let rt = runtime()?;
    rt.block_on(async {
        let session = Session::open(config, args).await?;
        let mut history: Vec<ChatTurn> = Vec::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            let utterance = line.trim();
            match utterance {
                "" => continue,
                "/quit" | "/exit" => break,
                "/reset" => {
                    session.orchestrator.reset_session(&args.session).await;
                    history.clear();
                    writeln!(std::io::stdout().lock(), "Session reset.")?;
                    continue;
                }
                _ => {}
            }

            let outcome = session
                .orchestrator
                .handle_turn(&args.session, utterance, &history, false)
                .await;
            let reply = format_outcome(&outcome);
            {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(render_outcome(&outcome, format).as_bytes())?;
                stdout.flush()?;
            }
            history.push(ChatTurn::user(utterance));
            history.push(ChatTurn::assistant(reply));
        }

        session.close().await;
        Ok::<_, Error>(())
    })?;
    Ok(String::new())
}

fn cmd_tools(config: &Config, in_process: bool, format: OutputFormat) -> Result<String> {
    let tools = if in_process {
        load_registry(config)?.descriptors()
    } else {
        let rt = runtime()?;
        rt.block_on(async {
            let gateway = ToolGateway::new(config.worker(), config.call_timeout);
            if !gateway.enable().await {
                return Err(CommandError::ExecutionFailed(format!(
                    "tool worker `{}` did not start",
                    config.worker_command
                )));
            }
            let tools = gateway.list_tools().await;
            gateway.disable().await;
            Ok(tools)
        })?
    };

    match format {
        OutputFormat::Text => Ok(format_tools(&tools)),
        OutputFormat::Json | OutputFormat::Ndjson => Ok(format.to_json(&tools)),
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str("  ");
                output.push_str(path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown"));
                output.push('\n');
            }
            output.push_str("\nEdit these files to customize the router prompt.\n");
            Ok(output)
        }
        OutputFormat::Json | OutputFormat::Ndjson => Ok(format.to_json(&json!({
            "directory": target_dir.to_string_lossy(),
            "written": written
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
            "count": written.len(),
        }))),
    }
}
