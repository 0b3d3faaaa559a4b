//! Configuration loading, validation, and management for Blockmind.
//!
//! Loads configuration from `~/.blockmind/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.blockmind/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider. Empty means infer it from the model name.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Providers tried in order after the default one fails
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_providers: Vec<String>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Who the agent is and how it is prompted
    #[serde(default)]
    pub profile: ProfileConfig,

    /// Turn loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// History limits and persistence
    #[serde(default)]
    pub history: HistoryConfig,

    /// Self-prompting pacing
    #[serde(default)]
    pub self_prompt: SelfPromptConfig,

    /// Scripted task definition, if the agent is running one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("fallback_providers", &self.fallback_providers)
            .field("providers", &self.providers)
            .field("profile", &self.profile)
            .field("agent", &self.agent)
            .field("history", &self.history)
            .field("self_prompt", &self.self_prompt)
            .field("task", &self.task)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Per-request timeout when used in a fallback chain
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    60
}

/// The agent's identity and prompt templates.
///
/// Templates may reference `$NAME`, `$COMMAND_DOCS`, `$STATS`, `$INVENTORY`,
/// `$SELF_PROMPT` and `$TO_SUMMARIZE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// System prompt for conversation turns
    #[serde(default = "default_conversing_prompt")]
    pub conversing: String,

    /// System prompt for the history memorize request
    #[serde(default = "default_saving_memory_prompt")]
    pub saving_memory: String,

    /// User-turn text issued on every self-prompt turn
    #[serde(default = "default_self_prompt_template")]
    pub self_prompt: String,

    /// Other autonomous agents sharing the world
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<String>,
}

fn default_agent_name() -> String {
    "andy".into()
}

fn default_conversing_prompt() -> String {
    "You are a playful block-world bot named $NAME that can converse with players, see, move, \
mine, build, and interact with the world by using commands. Act human-like, be brief, and \
don't give instructions unless asked. Do not use code blocks. To run a command, write it \
in your reply, e.g. !collectBlocks(\"oak_log\", 4). Only one command per reply. Any text \
after the command is ignored.\n$SELF_PROMPT\n$STATS\n$INVENTORY\n$COMMAND_DOCS"
        .into()
}

fn default_saving_memory_prompt() -> String {
    "You are a block-world bot named $NAME that has just been in a long conversation. \
Summarize the most important facts from the turns below so you can continue the \
conversation: record goals, places, people and what happened. Be extremely brief, \
no longer than a few sentences. Do not write commands.\n$TO_SUMMARIZE"
        .into()
}

fn default_self_prompt_template() -> String {
    "You are self-prompting with the goal: '$SELF_PROMPT'. Your next response MUST contain a \
command with this syntax: !commandName. Respond:"
        .into()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            conversing: default_conversing_prompt(),
            saving_memory: default_saving_memory_prompt(),
            self_prompt: default_self_prompt_template(),
            peers: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Per-message turn budget. -1 means unbounded.
    #[serde(default = "default_max_commands")]
    pub max_commands: i64,

    /// Speak the full model response when it carries a command
    #[serde(default)]
    pub verbose_commands: bool,

    /// Consecutive nonexistent commands tolerated in one message before
    /// the turn loop gives up
    #[serde(default = "default_max_hallucinations")]
    pub max_hallucinations: u32,

    /// Retries after a failed model request
    #[serde(default = "default_gateway_retries")]
    pub gateway_retries: u32,

    /// Maximum behavior log characters flushed into history
    #[serde(default = "default_behavior_log_max_chars")]
    pub behavior_log_max_chars: usize,

    /// Heartbeat period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Chat prefixes produced by world feedback that are never treated as messages
    #[serde(default = "default_ignore_messages")]
    pub ignore_messages: Vec<String>,

    /// Wait after spawning before acting
    #[serde(default = "default_spawn_settle_ms")]
    pub spawn_settle_ms: u64,

    /// Wait between inventory bootstrap commands
    #[serde(default = "default_inventory_settle_ms")]
    pub inventory_settle_ms: u64,

    /// Message handled on startup when no session is resumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_message: Option<String>,

    /// Timeout applied to long-running actions, in seconds. 0 disables it.
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
}

fn default_max_commands() -> i64 {
    -1
}
fn default_max_hallucinations() -> u32 {
    3
}
fn default_gateway_retries() -> u32 {
    1
}
fn default_behavior_log_max_chars() -> usize {
    500
}
fn default_tick_interval_ms() -> u64 {
    300
}
fn default_ignore_messages() -> Vec<String> {
    [
        "Set own game mode to",
        "Set the time to",
        "Set the difficulty to",
        "Teleported ",
        "Set the weather to",
        "Gamerule ",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_spawn_settle_ms() -> u64 {
    1000
}
fn default_inventory_settle_ms() -> u64 {
    500
}
fn default_action_timeout_secs() -> u64 {
    600
}

impl AgentConfig {
    /// The turn budget, `None` when unbounded.
    pub fn turn_budget(&self) -> Option<u32> {
        if self.max_commands < 0 {
            None
        } else {
            Some(self.max_commands as u32)
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_commands: default_max_commands(),
            verbose_commands: false,
            max_hallucinations: default_max_hallucinations(),
            gateway_retries: default_gateway_retries(),
            behavior_log_max_chars: default_behavior_log_max_chars(),
            tick_interval_ms: default_tick_interval_ms(),
            ignore_messages: default_ignore_messages(),
            spawn_settle_ms: default_spawn_settle_ms(),
            inventory_settle_ms: default_inventory_settle_ms(),
            init_message: None,
            action_timeout_secs: default_action_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Serialized size above which history is compacted
    #[serde(default = "default_history_max_chars")]
    pub max_chars: usize,

    /// Most turns folded into one summary
    #[serde(default = "default_summary_chunk_size")]
    pub summary_chunk_size: usize,

    /// Most recent turns compaction never touches
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Longest summary kept
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,

    /// Where session files live. Defaults to `~/.blockmind/sessions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,
}

fn default_history_max_chars() -> usize {
    16_000
}
fn default_summary_chunk_size() -> usize {
    5
}
fn default_keep_recent() -> usize {
    4
}
fn default_max_summary_chars() -> usize {
    1_000
}

impl HistoryConfig {
    pub fn resolved_session_dir(&self) -> PathBuf {
        self.session_dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions"))
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_chars: default_history_max_chars(),
            summary_chunk_size: default_summary_chunk_size(),
            keep_recent: default_keep_recent(),
            max_summary_chars: default_max_summary_chars(),
            session_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfPromptConfig {
    /// Minimum gap between self-prompt turns
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Consecutive turns without a command before self-prompting stops
    #[serde(default = "default_error_budget")]
    pub error_budget: u32,
}

fn default_cooldown_ms() -> u64 {
    2000
}
fn default_error_budget() -> u32 {
    3
}

impl Default for SelfPromptConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            error_budget: default_error_budget(),
        }
    }
}

/// The kind of scripted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Harvest,
    Techtree,
    Construction,
}

/// A scripted task: goal, starting inventory and restrictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub kind: TaskKind,

    /// Item the agent must end up holding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default = "default_number_of_target")]
    pub number_of_target: u32,

    /// Items given to each agent on startup, keyed by agent name
    #[serde(default)]
    pub initial_inventory: HashMap<String, HashMap<String, u32>>,

    /// Every agent taking part, the current one included
    #[serde(default)]
    pub agent_names: Vec<String>,

    /// Commands that do not exist for the agent, keyed by agent name or `*`
    #[serde(default)]
    pub blocked_actions: HashMap<String, Vec<String>>,
}

fn default_number_of_target() -> u32 {
    1
}

impl TaskConfig {
    /// Commands blocked for `agent`: its own list plus the shared `*` list.
    pub fn blocked_for(&self, agent: &str) -> Vec<String> {
        let mut blocked = Vec::new();
        for key in ["*", agent] {
            if let Some(list) = self.blocked_actions.get(key) {
                for name in list {
                    if !blocked.contains(name) {
                        blocked.push(name.clone());
                    }
                }
            }
        }
        blocked
    }

    pub fn inventory_for(&self, agent: &str) -> HashMap<String, u32> {
        self.initial_inventory.get(agent).cloned().unwrap_or_default()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.blockmind/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `BLOCKMIND_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    /// - `ANTHROPIC_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("BLOCKMIND_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("BLOCKMIND_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("BLOCKMIND_MODEL") {
            config.default_model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Read `path` without environment overrides. A missing file yields the
    /// defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// `~/.blockmind`, holding `config.toml` and the session directory.
    pub fn config_dir() -> PathBuf {
        home_dir().join(".blockmind")
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let history = &self.history;
        let checks = [
            (
                (0.0..=2.0).contains(&self.default_temperature),
                "default_temperature must be within 0.0..=2.0",
            ),
            (!self.profile.name.trim().is_empty(), "profile.name must not be empty"),
            (self.agent.tick_interval_ms > 0, "agent.tick_interval_ms must be > 0"),
            (self.agent.max_hallucinations > 0, "agent.max_hallucinations must be > 0"),
            (
                history.summary_chunk_size >= 2,
                "history.summary_chunk_size must be at least 2",
            ),
            (
                history.max_summary_chars < history.max_chars / 2,
                "history.max_summary_chars must be less than half of history.max_chars",
            ),
            (
                self.task
                    .as_ref()
                    .is_none_or(|t| t.kind != TaskKind::Harvest || t.target.is_some()),
                "harvest tasks need a target",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, problem)) => Err(ConfigError::Invalid((*problem).to_string())),
            None => Ok(()),
        }
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Commands blocked for the configured agent.
    pub fn blocked_commands(&self) -> Vec<String> {
        self.task
            .as_ref()
            .map(|t| t.blocked_for(&self.profile.name))
            .unwrap_or_default()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            fallback_providers: vec![],
            providers: HashMap::new(),
            profile: ProfileConfig::default(),
            agent: AgentConfig::default(),
            history: HistoryConfig::default(),
            self_prompt: SelfPromptConfig::default(),
            task: None,
        }
    }
}

fn home_dir() -> PathBuf {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid config TOML: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
