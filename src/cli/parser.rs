//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// huebridge: conversational paint recommendations.
///
/// Routes each utterance to catalog search tools and/or a scene render,
/// fuses the results and remembers what each session has already seen.
#[derive(Parser, Debug)]
#[command(name = "huebridge")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Product catalog (JSON array of products).
    #[arg(short, long, env = "HUEBRIDGE_CATALOG", global = true)]
    pub catalog: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json, ndjson).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the catalog tools over JSON-RPC on stdin/stdout.
    ///
    /// This is the process the gateway spawns; it is rarely started by hand.
    #[command(after_help = r#"Examples:
  huebridge worker --catalog products.json
  echo '{"jsonrpc":"2.0","id":1,"method":"tools/list"}' | huebridge worker
"#)]
    Worker,

    /// Show which tools an utterance would be routed to.
    #[command(after_help = r#"Examples:
  huebridge route "tinta azul fosca para a sala"
  huebridge route "gere uma imagem do quarto em verde" --rules-only
  huebridge --format json route "show me satin paints" | jq '.actions[].tool'
"#)]
    Route {
        /// The user utterance.
        utterance: String,

        /// Skip the model router and use the keyword rules only.
        #[arg(long)]
        rules_only: bool,
    },

    /// Run one conversational turn and print the recommendation.
    #[command(after_help = r#"Examples:
  huebridge ask "quero tinta azul para o quarto"
  huebridge ask "mostre mais opções" --session s1 --history turns.json
  huebridge ask "cor:verde acabamento:fosco" --one-shot --in-process
  huebridge --format json ask "tinta para madeira" | jq '.recommendation.picks'
"#)]
    Ask {
        /// The user utterance.
        utterance: String,

        #[command(flatten)]
        session: SessionArgs,

        /// Prior turns as a JSON array of `{role, content}` objects.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Use the smaller one-shot page size.
        #[arg(long)]
        one_shot: bool,
    },

    /// Interactive conversation on stdin, one utterance per line.
    ///
    /// `/reset` forgets the session, `/quit` or end of input exits.
    #[command(after_help = r#"Examples:
  huebridge chat
  huebridge chat --session living-room --in-process
"#)]
    Chat {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// List the tools the worker advertises.
    #[command(after_help = r#"Examples:
  huebridge tools
  huebridge tools --in-process --format json
"#)]
    Tools {
        /// Read descriptors from the in-process registry instead of a worker.
        #[arg(long)]
        in_process: bool,
    },

    /// Write the default router prompt to a directory for customization.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  huebridge init-prompts                 # ~/.config/huebridge/prompts
  huebridge init-prompts --dir ./prompts
"#)]
    InitPrompts {
        /// Target directory.
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

/// Options shared by the conversational commands.
#[derive(clap::Args, Debug, Clone)]
pub struct SessionArgs {
    /// Session identifier used for memory.
    #[arg(short, long, default_value = "default")]
    pub session: String,

    /// Run tools in this process instead of spawning a worker.
    #[arg(long)]
    pub in_process: bool,

    /// Skip the model router and use the keyword rules only.
    #[arg(long)]
    pub rules_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "huebridge",
            "--format",
            "json",
            "ask",
            "tinta azul",
            "--session",
            "s1",
            "--one-shot",
            "--in-process",
        ])
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(cli.format, "json");
        match cli.command {
            Commands::Ask {
                utterance,
                session,
                one_shot,
                history,
            } => {
                assert_eq!(utterance, "tinta azul");
                assert_eq!(session.session, "s1");
                assert!(session.in_process);
                assert!(!session.rules_only);
                assert!(one_shot);
                assert!(history.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_catalog_is_global() {
        let cli = Cli::try_parse_from(["huebridge", "worker", "--catalog", "p.json"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(cli.catalog, Some(PathBuf::from("p.json")));
        assert!(matches!(cli.command, Commands::Worker));
    }
}
