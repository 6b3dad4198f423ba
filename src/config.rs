//! Runtime configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::FusionPolicy;
use crate::error::ConfigError;
use crate::rpc::WorkerCommand;

/// Default session TTL in seconds.
const DEFAULT_MEMORY_TTL_SECS: u64 = 1800;
/// Default maximum number of sessions held in process.
const DEFAULT_MEMORY_MAX_ENTRIES: usize = 500;
/// Default caller-side bound on one tool call.
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
/// Default pick limit for multi-turn conversations.
const DEFAULT_MULTI_TURN_LIMIT: usize = 10;
/// Default pick limit for one-shot requests.
const DEFAULT_ONE_SHOT_LIMIT: usize = 5;
/// Subcommand the worker binary is started with.
const DEFAULT_WORKER_ARG: &str = "worker";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Session TTL, renewed on every read and write.
    pub memory_ttl: Duration,
    /// Maximum sessions kept by the in-process backend.
    pub memory_max_entries: usize,
    /// Remote session store URL; `None` selects the in-process backend.
    pub redis_url: Option<String>,
    /// Worker program.
    pub worker_command: String,
    /// Worker arguments.
    pub worker_args: Vec<String>,
    /// Product catalog passed to the worker.
    pub catalog_path: Option<PathBuf>,
    /// Caller-side bound on one tool call.
    pub call_timeout: Duration,
    /// Pick limit for multi-turn conversations.
    pub multi_turn_limit: usize,
    /// Pick limit for one-shot requests.
    pub one_shot_limit: usize,
}

impl Config {
    /// Creates a new builder for `Config`.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero TTL or capacity.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env().build()
    }

    /// Command line used to spawn the worker.
    ///
    /// A configured catalog is appended as `--catalog PATH` unless the
    /// arguments already name one.
    #[must_use]
    pub fn worker(&self) -> WorkerCommand {
        let mut args = self.worker_args.clone();
        if let Some(path) = &self.catalog_path {
            if !args.iter().any(|a| a == "--catalog") {
                args.push("--catalog".to_string());
                args.push(path.display().to_string());
            }
        }
        WorkerCommand::new(self.worker_command.clone(), args)
    }

    /// Fusion policy for a conversation style.
    #[must_use]
    pub const fn fusion_policy(&self, one_shot: bool) -> FusionPolicy {
        FusionPolicy::with_limit(if one_shot {
            self.one_shot_limit
        } else {
            self.multi_turn_limit
        })
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    memory_ttl: Option<Duration>,
    memory_max_entries: Option<usize>,
    redis_url: Option<String>,
    worker_command: Option<String>,
    worker_args: Option<Vec<String>>,
    catalog_path: Option<PathBuf>,
    call_timeout: Option<Duration>,
    multi_turn_limit: Option<usize>,
    one_shot_limit: Option<usize>,
}

impl ConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.memory_ttl.is_none() {
            self.memory_ttl = env_parse::<u64>("HUEBRIDGE_MEMORY_TTL_SECS").map(Duration::from_secs);
        }
        if self.memory_max_entries.is_none() {
            self.memory_max_entries = env_parse("HUEBRIDGE_MEMORY_MAX_ENTRIES");
        }
        if self.redis_url.is_none() {
            self.redis_url = env_value("HUEBRIDGE_REDIS_URL");
        }
        if self.worker_command.is_none() {
            self.worker_command = env_value("HUEBRIDGE_WORKER_CMD");
        }
        if self.worker_args.is_none() {
            self.worker_args = std::env::var("HUEBRIDGE_WORKER_ARGS")
                .ok()
                .map(|v| v.split_whitespace().map(str::to_string).collect());
        }
        if self.catalog_path.is_none() {
            self.catalog_path = std::env::var("HUEBRIDGE_CATALOG").ok().map(PathBuf::from);
        }
        if self.call_timeout.is_none() {
            self.call_timeout =
                env_parse::<u64>("HUEBRIDGE_CALL_TIMEOUT_SECS").map(Duration::from_secs);
        }
        self
    }

    /// Sets the session TTL.
    #[must_use]
    pub const fn memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory_ttl = Some(ttl);
        self
    }

    /// Sets the in-process session capacity.
    #[must_use]
    pub const fn memory_max_entries(mut self, n: usize) -> Self {
        self.memory_max_entries = Some(n);
        self
    }

    /// Sets the remote session store URL.
    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Sets the worker program.
    #[must_use]
    pub fn worker_command(mut self, command: impl Into<String>) -> Self {
        self.worker_command = Some(command.into());
        self
    }

    /// Sets the worker arguments.
    #[must_use]
    pub fn worker_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.worker_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the catalog path.
    #[must_use]
    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    /// Sets the caller-side call timeout.
    #[must_use]
    pub const fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Sets the multi-turn pick limit.
    #[must_use]
    pub const fn multi_turn_limit(mut self, n: usize) -> Self {
        self.multi_turn_limit = Some(n);
        self
    }

    /// Sets the one-shot pick limit.
    #[must_use]
    pub const fn one_shot_limit(mut self, n: usize) -> Self {
        self.one_shot_limit = Some(n);
        self
    }

    /// Builds the [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero TTL, zero capacity or
    /// zero call timeout.
    pub fn build(self) -> Result<Config, ConfigError> {
        let memory_ttl = self
            .memory_ttl
            .unwrap_or(Duration::from_secs(DEFAULT_MEMORY_TTL_SECS));
        if memory_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                field: "memory_ttl",
                message: "must be greater than zero".to_string(),
            });
        }

        let memory_max_entries = self.memory_max_entries.unwrap_or(DEFAULT_MEMORY_MAX_ENTRIES);
        if memory_max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "memory_max_entries",
                message: "must be at least 1".to_string(),
            });
        }

        let call_timeout = self
            .call_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS));
        if call_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "call_timeout",
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Config {
            memory_ttl,
            memory_max_entries,
            redis_url: self.redis_url,
            worker_command: self.worker_command.unwrap_or_else(current_exe),
            worker_args: self
                .worker_args
                .unwrap_or_else(|| vec![DEFAULT_WORKER_ARG.to_string()]),
            catalog_path: self.catalog_path,
            call_timeout,
            multi_turn_limit: self.multi_turn_limit.unwrap_or(DEFAULT_MULTI_TURN_LIMIT),
            one_shot_limit: self.one_shot_limit.unwrap_or(DEFAULT_ONE_SHOT_LIMIT),
        })
    }
}

/// Unset and blank variables both read as `None`.
fn env_value(key: &str) -> Option<String> {
    non_blank(std::env::var(key).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn current_exe() -> String {
    std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = Config::builder().build().unwrap_or_else(|_| unreachable!());
        assert_eq!(config.memory_ttl, Duration::from_secs(DEFAULT_MEMORY_TTL_SECS));
        assert_eq!(config.memory_max_entries, DEFAULT_MEMORY_MAX_ENTRIES);
        assert_eq!(config.worker_args, vec!["worker".to_string()]);
        assert_eq!(config.fusion_policy(false).limit, 10);
        assert_eq!(config.fusion_policy(true).limit, 5);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_builder_rejects_zero_values() {
        assert!(Config::builder().memory_max_entries(0).build().is_err());
        assert!(Config::builder().memory_ttl(Duration::ZERO).build().is_err());
        assert!(Config::builder().call_timeout(Duration::ZERO).build().is_err());
    }

    #[test]
    fn test_worker_command_appends_catalog() {
        let config = Config::builder()
            .worker_command("huebridge")
            .catalog_path("/tmp/catalog.json")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let worker = config.worker();
        assert_eq!(worker.program, "huebridge");
        assert_eq!(worker.args, vec!["worker", "--catalog", "/tmp/catalog.json"]);
    }

    #[test]
    fn test_explicit_catalog_arg_is_kept() {
        let config = Config::builder()
            .worker_args(["worker", "--catalog", "a.json"])
            .catalog_path("b.json")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.worker().args, vec!["worker", "--catalog", "a.json"]);
    }

    #[test]
    fn test_blank_env_values_count_as_unset() {
        assert_eq!(non_blank(Some(String::new())), None);
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("/usr/bin/huebridge".to_string())).as_deref(), Some("/usr/bin/huebridge"));
    }
}
