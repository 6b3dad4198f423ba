//! CLI layer for huebridge.
//!
//! Provides the command-line interface using clap: the stdio tool worker,
//! one-shot routing and recommendation commands, and an interactive chat.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, SessionArgs};
