use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::protocol::models::{DEFAULT_MODEL, JsonSchema, TurnDetection};

/// Shipped in config.example.yaml; a key equal to this is treated as unset.
pub const PLACEHOLDER_API_KEY: &str = "YOUR_OPENAI_API_KEY_HERE";

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

const DEFAULT_BIND: &str = "127.0.0.1:8080";

const DEFAULT_INSTRUCTIONS: &str = "You are a helpful voice assistant. Keep answers short and \
     conversational, and use the available tools whenever they can help.";

/// Top-level configuration, loaded from YAML once at startup and immutable
/// afterwards. Every section has workable defaults so a minimal file (or no
/// file at all, with the key in the environment) is enough to run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub resilience: ResilienceConfig,
    pub tools: Vec<ToolConfig>,
    /// When true, an invalid tool entry aborts startup instead of being
    /// skipped with a warning.
    pub strict_tools: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub model: String,
    pub realtime_url: String,
    pub voice: String,
    pub transcription_model: String,
    /// Inline system prompt. A readable `system_prompt_file` takes
    /// precedence.
    pub instructions: Option<String>,
    pub system_prompt_file: Option<PathBuf>,
    pub temperature: f32,
    pub max_response_output_tokens: Option<u32>,
    pub turn_detection: TurnDetection,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: PLACEHOLDER_API_KEY.to_string(),
            model: DEFAULT_MODEL.to_string(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            voice: "alloy".to_string(),
            transcription_model: "gpt-4o-transcribe".to_string(),
            instructions: None,
            system_prompt_file: None,
            temperature: 0.8,
            max_response_output_tokens: Some(4096),
            turn_detection: TurnDetection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub timeout: TimeoutConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub enabled: bool,
    pub duration_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts per call, the first one included.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_ratio: f64,
    pub minimum_throughput: usize,
    pub sampling_duration_ms: u64,
    pub break_duration_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_ratio: 0.5,
            minimum_throughput: 10,
            sampling_duration_ms: 30_000,
            break_duration_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Http,
    Mcp,
    #[default]
    Builtin,
}

/// One tool entry. `method`, `url`, and `headers` only apply to the `http`
/// and `mcp` kinds; `description` and `parameters` fall back to builtin
/// defaults where those exist.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ToolKind,
    pub description: Option<String>,
    pub parameters: Option<JsonSchema>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl AppConfig {
    /// Reads and parses the YAML file, then applies environment overrides.
    ///
    /// # Errors
    /// Returns `Error::Configuration` when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            Error::Configuration(format!("Cannot read config file {}: {err}", path.display()))
        })?;
        let mut config: Self = serde_yaml::from_str(&raw).map_err(|err| {
            Error::Configuration(format!("Cannot parse config file {}: {err}", path.display()))
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults so
    /// the relay can run from the environment alone.
    ///
    /// # Errors
    /// Returns `Error::Configuration` when an existing file cannot be read
    /// or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.upstream.api_key = key;
            }
        }
    }

    /// Instructions for the upstream session: the prompt file when readable
    /// and non-empty, then the inline setting, then a stock prompt.
    #[must_use]
    pub fn resolve_instructions(&self) -> String {
        if let Some(path) = &self.upstream.system_prompt_file {
            match std::fs::read_to_string(path) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::info!("Loaded instructions from {}", path.display());
                    return text.trim().to_string();
                }
                Ok(_) => {
                    tracing::warn!("Prompt file {} is empty, falling back", path.display());
                }
                Err(err) => {
                    tracing::warn!(
                        "Cannot read prompt file {}: {err}, falling back",
                        path.display()
                    );
                }
            }
        }
        if let Some(instructions) = &self.upstream.instructions {
            if !instructions.trim().is_empty() {
                return instructions.clone();
            }
        }
        DEFAULT_INSTRUCTIONS.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("voxgate-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_are_complete() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.upstream.model, DEFAULT_MODEL);
        assert_eq!(config.upstream.realtime_url, DEFAULT_REALTIME_URL);
        assert_eq!(config.upstream.transcription_model, "gpt-4o-transcribe");
        assert_eq!(config.upstream.max_response_output_tokens, Some(4096));
        assert!(config.resilience.retry.enabled);
        assert_eq!(config.resilience.retry.initial_delay_ms, 200);
        assert_eq!(config.resilience.circuit_breaker.minimum_throughput, 10);
        assert!(config.tools.is_empty());
        assert!(!config.strict_tools);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = r#"
upstream:
  voice: verse
tools:
  - name: search
    type: http
    url: https://example.com/search
    headers:
      X-Api-Key: secret
  - name: calculate
    type: builtin
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.upstream.voice, "verse");
        assert_eq!(config.upstream.model, DEFAULT_MODEL);
        assert_eq!(config.tools.len(), 2);
        assert_eq!(config.tools[0].kind, ToolKind::Http);
        assert_eq!(config.tools[0].headers["X-Api-Key"], "secret");
        assert_eq!(config.tools[1].kind, ToolKind::Builtin);
        assert_eq!(config.tools[1].method, None);
    }

    #[test]
    fn unreadable_config_is_a_configuration_error() {
        let missing = Path::new("/definitely/not/here.yaml");
        assert!(matches!(
            AppConfig::load(missing),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn prompt_file_wins_over_inline_instructions() {
        let path = temp_file("prompt.txt", "Speak like a pirate.\n");
        let mut config = AppConfig::default();
        config.upstream.system_prompt_file = Some(path.clone());
        config.upstream.instructions = Some("Inline prompt".to_string());

        assert_eq!(config.resolve_instructions(), "Speak like a pirate.");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_prompt_file_falls_back_to_inline_then_default() {
        let mut config = AppConfig::default();
        config.upstream.system_prompt_file = Some(PathBuf::from("/nope/prompt.txt"));
        config.upstream.instructions = Some("Inline prompt".to_string());
        assert_eq!(config.resolve_instructions(), "Inline prompt");

        config.upstream.instructions = None;
        assert_eq!(config.resolve_instructions(), DEFAULT_INSTRUCTIONS);
    }
}
