//! Configuration loading, validation, and management for lorebot.
//!
//! Loads configuration from `./lorebot.toml` (or the path in
//! `LOREBOT_CONFIG`) with environment variable overrides for secrets.
//! Validates all settings at startup; components re-check their own
//! parameters when constructed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lorebot.toml";

/// The root configuration structure.
///
/// Maps directly to `lorebot.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language-model generation
    #[serde(default)]
    pub ai: AiConfig,

    /// Embedding function shared by the cache and the corpus
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Answer cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Query rate limiting
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Membership lists
    #[serde(default)]
    pub groups: GroupsConfig,

    /// Pending consent requests
    #[serde(default)]
    pub requests: RequestsConfig,

    /// Corpus (vector store)
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Filesystem scope for admin save/load
    #[serde(default)]
    pub storage: StorageConfig,

    /// Discord adapter
    #[serde(default)]
    pub discord: DiscordConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── AI ──────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Ask the model to write an answer (true) or list retrieved segments (false)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Provider name ("groq", "openai", "ollama", ...)
    #[serde(default = "default_ai_provider")]
    pub provider: String,

    /// Model identifier
    #[serde(default = "default_ai_model")]
    pub model: String,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// API key (falls back to `LOREBOT_API_KEY` / `GROQ_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sampling temperature in `[0, 1]`
    #[serde(default)]
    pub temperature: f32,

    /// Character budget for the whole prompt; must exceed the system prompt
    #[serde(default = "default_max_input_characters")]
    pub max_input_characters: Option<usize>,

    /// Truncate answers to this many characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_characters: Option<usize>,

    /// System prompt for every generation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Refuse to answer when the corpus returns nothing
    #[serde(default = "default_true")]
    pub require_context: bool,
}

fn default_ai_provider() -> String {
    "groq".into()
}
fn default_ai_model() -> String {
    "llama-3.1-8b-instant".into()
}
fn default_max_input_characters() -> Option<usize> {
    Some(5000)
}
fn default_system_prompt() -> String {
    "You are a chatbot that answers questions about the corpus you were given. \
     Provide a concise and accurate answer to the question below, using ONLY the \
     context listed below. Do NOT generate, assume, or make up any details beyond \
     the given context."
        .into()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_ai_provider(),
            model: default_ai_model(),
            api_url: None,
            api_key: None,
            temperature: 0.0,
            max_input_characters: default_max_input_characters(),
            max_output_characters: None,
            system_prompt: default_system_prompt(),
            require_context: true,
        }
    }
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_input_characters", &self.max_input_characters)
            .field("max_output_characters", &self.max_output_characters)
            .field("require_context", &self.require_context)
            .finish()
    }
}

// ── Embedding ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "hash" (local, deterministic) or "openai" (OpenAI-compatible endpoint)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Model name for remote embedders
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector dimensionality
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Override the embedding endpoint base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

fn default_embedding_provider() -> String {
    "hash".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            api_url: None,
        }
    }
}

// ── Cache ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum entries; `<= 0` disables caching
    #[serde(default = "default_cache_size")]
    pub max_size: i64,

    /// Seconds until entries expire; `None` = never
    #[serde(default = "default_expiration")]
    pub expiration_secs: Option<f64>,

    /// Minimum cosine similarity for a semantic hit; `>= 1` disables it
    #[serde(default = "default_similarity_threshold")]
    pub semantic_similarity_threshold: f64,

    /// Where the cache is saved/loaded by default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,
}

fn default_cache_size() -> i64 {
    100
}
fn default_expiration() -> Option<f64> {
    Some(3600.0)
}
fn default_similarity_threshold() -> f64 {
    0.96
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_size(),
            expiration_secs: default_expiration(),
            semantic_similarity_threshold: default_similarity_threshold(),
            filepath: None,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.max_size > 0
    }
}

// ── Cooldown ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Cooldown length; absent or `<= 0` disables the limiter
    #[serde(default = "default_cooldown_duration")]
    pub duration_secs: Option<f64>,

    /// Sliding window width
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: f64,

    /// Queries allowed inside the window before the cooldown starts
    #[serde(default = "default_max_queries")]
    pub max_queries_before_activation: u32,
}

fn default_cooldown_duration() -> Option<f64> {
    Some(120.0)
}
fn default_check_interval() -> f64 {
    20.0
}
fn default_max_queries() -> u32 {
    2
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_cooldown_duration(),
            check_interval_secs: default_check_interval(),
            max_queries_before_activation: default_max_queries(),
        }
    }
}

impl CooldownConfig {
    pub fn is_enabled(&self) -> bool {
        matches!(self.duration_secs, Some(d) if d > 0.0)
            && self.check_interval_secs > 0.0
            && self.max_queries_before_activation > 0
    }
}

// ── Groups ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsConfig {
    #[serde(default = "default_blocked_path")]
    pub blocked_path: Option<PathBuf>,

    #[serde(default = "default_trusted_path")]
    pub trusted_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permitting_path: Option<PathBuf>,

    /// Users treated as owners in addition to the platform's application owners
    #[serde(default)]
    pub owner_ids: Vec<u64>,
}

fn default_blocked_path() -> Option<PathBuf> {
    Some(PathBuf::from("./data/blockedIDs.txt"))
}
fn default_trusted_path() -> Option<PathBuf> {
    Some(PathBuf::from("./data/trustedIDs.txt"))
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            blocked_path: default_blocked_path(),
            trusted_path: default_trusted_path(),
            permitting_path: None,
            owner_ids: Vec::new(),
        }
    }
}

// ── Requests ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permitting_path: Option<PathBuf>,

    /// Maximum open requests per ledger
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_max_pending() -> usize {
    500
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            corpus_path: None,
            permitting_path: None,
            max_pending: default_max_pending(),
        }
    }
}

// ── Corpus ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Where the corpus is loaded from at startup and saved to by default
    #[serde(default = "default_corpus_path")]
    pub path: Option<PathBuf>,

    /// Minimum relevance in `[0, 1]` for a segment to be returned
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,

    /// Target segment size in characters; `None` stores documents whole
    #[serde(default = "default_segment_size")]
    pub segment_size: Option<usize>,

    /// Segments returned per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_corpus_path() -> Option<PathBuf> {
    Some(PathBuf::from("./data/corpus.jsonl"))
}
fn default_min_relevance() -> f32 {
    0.55
}
fn default_segment_size() -> Option<usize> {
    Some(512)
}
fn default_max_results() -> usize {
    4
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: default_corpus_path(),
            min_relevance: default_min_relevance(),
            segment_size: default_segment_size(),
            max_results: default_max_results(),
        }
    }
}

// ── Storage ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// The only directory admin save/load commands may touch
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

// ── Discord ─────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token (falls back to `DISCORD_BOT_TOKEN`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Server the bot answers in; used to build message links
    #[serde(default)]
    pub guild_id: u64,

    /// The bot's own user id, so it ignores itself
    #[serde(default)]
    pub bot_user_id: u64,

    /// Messages starting with these are meant for other bots
    #[serde(default = "default_other_bot_prefixes")]
    pub other_bot_prefixes: Vec<String>,

    /// Reaction trusted users add to request a message be added to the corpus
    #[serde(default = "default_request_emoji")]
    pub request_addition_emoji: String,

    /// Maximum characters per message
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
}

fn default_other_bot_prefixes() -> Vec<String> {
    vec!["!".into(), "!!".into()]
}
fn default_request_emoji() -> String {
    "↪️".into()
}
fn default_message_limit() -> usize {
    2000
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            guild_id: 0,
            bot_user_id: 0,
            other_bot_prefixes: default_other_bot_prefixes(),
            request_addition_emoji: default_request_emoji(),
            message_limit: default_message_limit(),
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("guild_id", &self.guild_id)
            .field("bot_user_id", &self.bot_user_id)
            .field("other_bot_prefixes", &self.other_bot_prefixes)
            .field("request_addition_emoji", &self.request_addition_emoji)
            .field("message_limit", &self.message_limit)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `LOREBOT_CONFIG` or `./lorebot.toml`.
    ///
    /// Also checks environment variables for secrets:
    /// - `DISCORD_BOT_TOKEN`
    /// - `LOREBOT_API_KEY` (highest priority), then `GROQ_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("LOREBOT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// `./lorebot.toml`
    pub fn default_path() -> PathBuf {
        PathBuf::from(".").join(DEFAULT_CONFIG_FILE)
    }

    /// Fill unset secrets from the environment.
    pub fn apply_env(&mut self) {
        if self.ai.api_key.is_none() {
            self.ai.api_key = std::env::var("LOREBOT_API_KEY")
                .ok()
                .or_else(|| std::env::var("GROQ_API_KEY").ok());
        }
        if self.discord.bot_token.is_none() {
            self.discord.bot_token = std::env::var("DISCORD_BOT_TOKEN").ok();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if !(0.0..=1.0).contains(&self.ai.temperature) {
            return fail("ai.temperature must be between 0.0 and 1.0");
        }
        if self.ai.system_prompt.trim().is_empty() {
            return fail("ai.system_prompt must not be empty");
        }
        if let Some(max) = self.ai.max_input_characters {
            if max <= self.ai.system_prompt.chars().count() {
                return fail("ai.max_input_characters must exceed the system prompt length");
            }
        }
        if self.ai.max_output_characters == Some(0) {
            return fail("ai.max_output_characters must be > 0");
        }

        if self.embedding.dimensions == 0 {
            return fail("embedding.dimensions must be > 0");
        }

        if matches!(self.cache.expiration_secs, Some(t) if t <= 0.0) {
            return fail("cache.expiration_secs must be > 0");
        }
        if !(0.0..=1.0).contains(&self.cache.semantic_similarity_threshold) {
            return fail("cache.semantic_similarity_threshold must be between 0.0 and 1.0");
        }

        if !(0.0..=1.0).contains(&self.corpus.min_relevance) {
            return fail("corpus.min_relevance must be between 0.0 and 1.0");
        }
        if self.corpus.segment_size == Some(0) {
            return fail("corpus.segment_size must be > 0");
        }
        if self.corpus.max_results == 0 {
            return fail("corpus.max_results must be > 0");
        }

        if self.requests.max_pending == 0 {
            return fail("requests.max_pending must be > 0");
        }

        if self.discord.message_limit == 0 {
            return fail("discord.message_limit must be > 0");
        }
        if self.discord.request_addition_emoji.is_empty() {
            return fail("discord.request_addition_emoji must not be empty");
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for lorebot_core::Error {
    fn from(err: ConfigError) -> Self {
        lorebot_core::Error::config(err.to_string())
    }
}
