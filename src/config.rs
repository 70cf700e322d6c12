//! Configuration parsing and validation for chat-relay.
//!
//! Values come from three layers, later layers winning:
//! built-in defaults, an optional TOML file, then environment variables.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::moderation::DEFAULT_MAX_MESSAGE_CHARS;
use crate::proxy::types::MAX_TEMPERATURE;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub moderation: ModerationConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed by CORS. Empty allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Address to bind, e.g. "0.0.0.0:8080".
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Completion provider and default model parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible API, without `/chat/completions`.
    pub base_url: String,
    /// Bearer token. May contain `${VAR}` references.
    pub api_key: Option<ApiKey>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout_secs: u64,
    /// Upper bound on a whole upstream exchange, streaming body included.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
        }
    }
}

/// Moderation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// JSON array of banned words. Must exist at startup.
    pub banned_words_path: PathBuf,
    pub max_message_chars: usize,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            banned_words_path: PathBuf::from("config/banned_words.json"),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }
}

/// How relayed fragments are grouped into outbound frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushPolicy {
    /// One frame per upstream fragment.
    #[default]
    Eager,
    /// Hold text until a sentence terminator or newline arrives.
    Sentence,
}

impl FromStr for FlushPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(FlushPolicy::Eager),
            "sentence" => Ok(FlushPolicy::Sentence),
            other => Err(format!("unknown flush policy '{}'", other)),
        }
    }
}

/// Stream relay settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub flush_policy: FlushPolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ApiKey::from)
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' referenced by '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}

/// Expand all `${VAR}` references in `input` using `lookup`.
///
/// Fails on the first missing variable, an unclosed `${`, or an empty name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env_error = |var: &str, message: String| ConfigError::EnvVar {
        var: var.to_string(),
        field: field.to_string(),
        message,
    };

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after
            .find('}')
            .ok_or_else(|| env_error("<unclosed>", "unclosed '${' reference".to_string()))?;

        let name = &after[..end];
        if name.is_empty() {
            return Err(env_error("", "empty variable name in '${}'".to_string()));
        }

        let value = lookup(name).ok_or_else(|| env_error(name, "variable is not set".to_string()))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Parse `raw` into `target`, logging and keeping the old value on failure.
fn override_parsed<T>(target: &mut T, var: &str, raw: &str)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(e) => tracing::warn!(var = %var, value = %raw, error = %e, "Ignoring invalid environment override"),
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`Config::load`], with a custom environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                toml::from_str(&content)?
            }
            None => Config::default(),
        };

        config.apply_env_with(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, without environment overrides.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR}` in the API key, then apply environment overrides.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = &self.upstream.api_key {
            if key.expose_secret().contains("${") {
                let expanded = expand_env_vars_with(key.expose_secret(), "upstream.api_key", &lookup)?;
                self.upstream.api_key = Some(ApiKey::from(expanded));
            }
        }

        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.upstream.api_key = Some(ApiKey::from(key));
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.is_empty()) {
            self.upstream.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|m| !m.is_empty()) {
            self.upstream.model = model;
        }
        if let Some(raw) = lookup("OPENAI_TEMPERATURE") {
            override_parsed(&mut self.upstream.temperature, "OPENAI_TEMPERATURE", &raw);
        }
        if let Some(raw) = lookup("OPENAI_MAX_TOKENS") {
            override_parsed(&mut self.upstream.max_tokens, "OPENAI_MAX_TOKENS", &raw);
        }
        if let Some(raw) = lookup("PORT") {
            override_parsed(&mut self.server.port, "PORT", &raw);
        }
        if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
            self.server.cors_allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(path) = lookup("BANNED_WORDS_PATH").filter(|p| !p.is_empty()) {
            self.moderation.banned_words_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("STREAM_FLUSH_POLICY") {
            override_parsed(&mut self.stream.flush_policy, "STREAM_FLUSH_POLICY", &raw);
        }

        Ok(())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "upstream.base_url must not be empty".to_string(),
            ));
        }

        if self.upstream.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "upstream.max_tokens must be positive".to_string(),
            ));
        }

        if !(0.0..=MAX_TEMPERATURE).contains(&self.upstream.temperature) {
            return Err(ConfigError::Validation(format!(
                "upstream.temperature must be between 0 and {}, got {}",
                MAX_TEMPERATURE, self.upstream.temperature
            )));
        }

        if let Some(origin) = self
            .server
            .cors_allowed_origins
            .iter()
            .find(|o| axum::http::HeaderValue::from_str(o).is_err())
        {
            return Err(ConfigError::Validation(format!(
                "server.cors_allowed_origins contains an invalid origin: {:?}",
                origin
            )));
        }

        if self.moderation.max_message_chars == 0 {
            return Err(ConfigError::Validation(
                "moderation.max_message_chars must be positive".to_string(),
            ));
        }

        if self.upstream.api_key.is_none() {
            tracing::warn!("No upstream API key configured - requests will be sent unauthenticated");
        }

        Ok(())
    }
}
