//! Configuration management for weaver.
//!
//! Configuration is read from environment variables:
//! - `WEAVER_SENIOR_CLI` - Optional. Senior CLI executable. Defaults to `claude`.
//! - `WEAVER_SENIOR_MODEL` - Optional. Model passed to the senior CLI.
//! - `WEAVER_SENIOR_TIMEOUT_SECS` - Optional. Per-call timeout. Defaults to `300`.
//! - `WEAVER_JUNIOR_URL` - Optional. OpenAI-compatible base URL. Defaults to `http://localhost:1234/v1`.
//! - `WEAVER_JUNIOR_MODEL` - Optional. Defaults to `local-model`.
//! - `WEAVER_JUNIOR_API_KEY` - Optional. Bearer token for the junior endpoint.
//! - `WEAVER_JUNIOR_TIMEOUT_SECS` - Optional. Defaults to `120`.
//! - `WEAVER_JUNIOR_MAX_TOKENS` - Optional. Defaults to `4096`.
//! - `WEAVER_JUNIOR_TEMPERATURE` - Optional. Defaults to `0.7`.
//! - `WEAVER_MAX_HOPS` - Optional. Agent-to-agent hop bound. Defaults to `5`.
//! - `WEAVER_TURN_LIMIT` - Optional. Conversation turn limit. Defaults to `100`.
//! - `WEAVER_SENIOR_CONTEXT_TURNS` / `WEAVER_JUNIOR_CONTEXT_TURNS` - Optional. Defaults to `50` / `20`.
//! - `WEAVER_JUNIOR_CONTEXT_CHARS` - Optional. Character budget for junior context windows.
//! - `WEAVER_INJECT_NOTES` - Optional. Inject notepad context into junior messages. Defaults to `true`.
//! - `WEAVER_NOTEPAD_DIR` - Optional. Local notepad root. Defaults to `$HOME/.weaver`.
//! - `WEAVER_NOTEPAD_URL` - Optional. Remote document store for the notepad.
//! - `WEAVER_NOTEPAD_DATABASE` / `WEAVER_NOTEPAD_USER` / `WEAVER_NOTEPAD_PASSWORD` - Remote credentials.
//! - `WEAVER_NOTEPAD_AUTHOR` - Optional. Author recorded on notes. Defaults to `orchestrator`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::agent::claudecode::ClaudeCodeConfig;
use crate::agent::openai::OpenAiCompatConfig;
use crate::notepad::{NotepadConfig, RemoteNotepadConfig};
use crate::orchestrator::OrchestratorConfig;
use crate::util::{env_var_bool, home_dir};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Top-level weaver configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Senior agent (CLI subprocess)
    pub senior: ClaudeCodeConfig,

    /// Junior agent (OpenAI-compatible HTTP endpoint)
    pub junior: OpenAiCompatConfig,

    /// Hop bound and context window sizes
    pub orchestrator: OrchestratorConfig,

    /// Maximum turns kept in the conversation
    pub turn_limit: usize,

    /// Shared notepad storage
    pub notepad: NotepadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            senior: ClaudeCodeConfig::default(),
            junior: OpenAiCompatConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            turn_limit: 100,
            notepad: NotepadConfig {
                root: PathBuf::from(home_dir()).join(".weaver"),
                author: "orchestrator".to_string(),
                remote: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a numeric or URL variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let senior = ClaudeCodeConfig {
            cli_path: std::env::var("WEAVER_SENIOR_CLI").unwrap_or(defaults.senior.cli_path),
            model: std::env::var("WEAVER_SENIOR_MODEL").ok(),
            timeout: Duration::from_secs(parse_env("WEAVER_SENIOR_TIMEOUT_SECS", 300u64)?),
            ..defaults.senior
        };

        let base_url = std::env::var("WEAVER_JUNIOR_URL").unwrap_or(defaults.junior.base_url);
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidValue("WEAVER_JUNIOR_URL".to_string(), e.to_string())
        })?;

        let junior = OpenAiCompatConfig {
            base_url,
            model: std::env::var("WEAVER_JUNIOR_MODEL").unwrap_or(defaults.junior.model),
            api_key: std::env::var("WEAVER_JUNIOR_API_KEY").ok(),
            timeout: Duration::from_secs(parse_env("WEAVER_JUNIOR_TIMEOUT_SECS", 120u64)?),
            max_tokens: parse_env("WEAVER_JUNIOR_MAX_TOKENS", defaults.junior.max_tokens)?,
            temperature: parse_env("WEAVER_JUNIOR_TEMPERATURE", defaults.junior.temperature)?,
            ..defaults.junior
        };

        let max_hops: usize = parse_env("WEAVER_MAX_HOPS", defaults.orchestrator.max_hops)?;
        if max_hops == 0 {
            return Err(ConfigError::InvalidValue(
                "WEAVER_MAX_HOPS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let orchestrator = OrchestratorConfig {
            max_hops,
            senior_context_turns: parse_env(
                "WEAVER_SENIOR_CONTEXT_TURNS",
                defaults.orchestrator.senior_context_turns,
            )?,
            junior_context_turns: parse_env(
                "WEAVER_JUNIOR_CONTEXT_TURNS",
                defaults.orchestrator.junior_context_turns,
            )?,
            junior_context_chars: parse_optional_env("WEAVER_JUNIOR_CONTEXT_CHARS")?,
            inject_notes: env_var_bool("WEAVER_INJECT_NOTES", defaults.orchestrator.inject_notes),
            ..defaults.orchestrator
        };

        let turn_limit: usize = parse_env("WEAVER_TURN_LIMIT", defaults.turn_limit)?;
        if turn_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "WEAVER_TURN_LIMIT".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let remote = match std::env::var("WEAVER_NOTEPAD_URL") {
            Ok(url) => {
                url::Url::parse(&url).map_err(|e| {
                    ConfigError::InvalidValue("WEAVER_NOTEPAD_URL".to_string(), e.to_string())
                })?;
                Some(RemoteNotepadConfig {
                    base_url: url,
                    database: std::env::var("WEAVER_NOTEPAD_DATABASE")
                        .unwrap_or_else(|_| "_system".to_string()),
                    username: std::env::var("WEAVER_NOTEPAD_USER")
                        .unwrap_or_else(|_| "root".to_string()),
                    password: std::env::var("WEAVER_NOTEPAD_PASSWORD").unwrap_or_default(),
                    ..RemoteNotepadConfig::default()
                })
            }
            Err(_) => None,
        };

        let notepad = NotepadConfig {
            root: std::env::var("WEAVER_NOTEPAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.notepad.root),
            author: std::env::var("WEAVER_NOTEPAD_AUTHOR").unwrap_or(defaults.notepad.author),
            remote,
        };

        Ok(Self {
            senior,
            junior,
            orchestrator,
            turn_limit,
            notepad,
        })
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_optional_env<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(None),
    }
}
