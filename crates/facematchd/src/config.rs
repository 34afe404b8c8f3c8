use facematch_chat::{ChatSettings, ResponderConfig};
use facematch_core::matcher::{DEFAULT_FLOOR_CONFIDENCE, DEFAULT_UNKNOWN_CONFIDENCE};
use facematch_core::{BboxMode, DimensionPolicy, MatchPolicy, RecognizeOptions};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Euclidean tolerance for the bundled ArcFace extractor.
///
/// Its descriptors are unit vectors, so distance is `sqrt(2 - 2 * cos)`; 1.1 accepts
/// pairs with cosine similarity of about 0.4 or better.
pub const ARCFACE_TOLERANCE: f32 = 1.1;

/// File read when `FACEMATCH_CONFIG` is unset and it exists in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "facematch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration: defaults, then an optional TOML file, then `FACEMATCH_*` variables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub matching: MatchingConfig,
    pub models: ModelsConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0:8000).
    pub bind: String,
    /// Request body cap; base64 images are large.
    pub max_body_bytes: usize,
    /// Per-request processing timeout, 0 disables it.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            max_body_bytes: 20 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Euclidean distance below which a match is accepted.
    pub tolerance: f32,
    pub unknown_confidence: f32,
    pub floor_confidence: f32,
    /// Fail requests on descriptor length mismatch instead of skipping the descriptor.
    pub strict_dimensions: bool,
    pub bbox_mode: BboxMode,
    /// Expected enrollment descriptor length; 0 takes it from the first valid record.
    pub descriptor_dim: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tolerance: ARCFACE_TOLERANCE,
            unknown_confidence: DEFAULT_UNKNOWN_CONFIDENCE,
            floor_confidence: DEFAULT_FLOOR_CONFIDENCE,
            strict_dimensions: false,
            bbox_mode: BboxMode::Absolute,
            descriptor_dim: facematch_core::onnx::ARCFACE_DESCRIPTOR_DIM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory containing det_10g.onnx and w600k_r50.onnx.
    pub dir: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: facematch_core::default_model_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub top_k: usize,
    pub timeout_secs: u64,
    /// Usually supplied through `OPENAI_API_KEY` rather than the file.
    pub api_key: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let responder = ResponderConfig::default();
        Self {
            api_base: responder.api_base,
            model: responder.model,
            temperature: responder.temperature,
            top_k: facematch_chat::DEFAULT_TOP_K,
            timeout_secs: responder.timeout.as_secs(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for environment variables.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file = match lookup("FACEMATCH_CONFIG") {
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        let mut config = match &file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&lookup);
        config.validate()?;

        tracing::debug!(file = ?file, "configuration loaded");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override individual fields from `FACEMATCH_*` variables.
    pub fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        let server = &mut self.server;
        if let Some(v) = lookup("FACEMATCH_BIND") {
            server.bind = v;
        }
        env_parse(lookup, "FACEMATCH_MAX_BODY_BYTES", &mut server.max_body_bytes);
        env_parse(lookup, "FACEMATCH_REQUEST_TIMEOUT_SECS", &mut server.request_timeout_secs);

        let matching = &mut self.matching;
        env_parse(lookup, "FACEMATCH_TOLERANCE", &mut matching.tolerance);
        env_parse(lookup, "FACEMATCH_UNKNOWN_CONFIDENCE", &mut matching.unknown_confidence);
        env_parse(lookup, "FACEMATCH_FLOOR_CONFIDENCE", &mut matching.floor_confidence);
        env_parse(lookup, "FACEMATCH_BBOX_MODE", &mut matching.bbox_mode);
        env_parse(lookup, "FACEMATCH_DESCRIPTOR_DIM", &mut matching.descriptor_dim);
        if let Some(v) = lookup("FACEMATCH_STRICT_DIMENSIONS") {
            matching.strict_dimensions = v != "0" && !v.eq_ignore_ascii_case("false");
        }

        if let Some(v) = lookup("FACEMATCH_MODEL_DIR") {
            self.models.dir = PathBuf::from(v);
        }

        let chat = &mut self.chat;
        if let Some(v) = lookup("FACEMATCH_CHAT_API_BASE") {
            chat.api_base = v;
        }
        if let Some(v) = lookup("FACEMATCH_CHAT_MODEL") {
            chat.model = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            chat.api_key = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.matching;
        if !(m.tolerance.is_finite() && m.tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!("tolerance must be > 0, got {}", m.tolerance)));
        }
        for (name, value) in [
            ("unknown_confidence", m.unknown_confidence),
            ("floor_confidence", m.floor_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be > 0".into()));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind address '{}': {e}", self.server.bind)))
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            tolerance: self.matching.tolerance,
            unknown_confidence: self.matching.unknown_confidence,
            floor_confidence: self.matching.floor_confidence,
            dimensions: if self.matching.strict_dimensions {
                DimensionPolicy::Strict
            } else {
                DimensionPolicy::Skip
            },
        }
    }

    pub fn recognize_options(&self) -> RecognizeOptions {
        RecognizeOptions {
            policy: self.match_policy(),
            bbox_mode: self.matching.bbox_mode,
        }
    }

    pub fn expected_dim(&self) -> Option<usize> {
        Some(self.matching.descriptor_dim).filter(|&d| d > 0)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        Some(self.server.request_timeout_secs)
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }

    pub fn responder_config(&self) -> ResponderConfig {
        ResponderConfig {
            api_base: self.chat.api_base.clone(),
            api_key: self.chat.api_key.clone(),
            model: self.chat.model.clone(),
            temperature: self.chat.temperature,
            timeout: Duration::from_secs(self.chat.timeout_secs.max(1)),
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            top_k: self.chat.top_k.max(1),
            ..ChatSettings::default()
        }
    }
}

/// Parse `key` into `slot`, keeping the current value when unset or unparseable.
fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
        }
    }
}
