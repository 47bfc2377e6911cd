//! Engine configuration

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use signmotion_core::{BoneMap, RetargetMethod};
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub playback: PlaybackConfig,
    pub retarget: RetargetConfig,
}

/// Translation backend endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST base URL, e.g. `http://localhost:8000/api/v1`
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Public origin the stream address is rewritten to
    pub stream_origin: String,

    /// Development origin the backend reports in stream addresses
    pub local_stream_origin: String,

    /// Static bearer token (refresh is handled outside the engine)
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout: 30,
            stream_origin: "wss://localhost:8000".to_string(),
            local_stream_origin: "ws://localhost:8000".to_string(),
            token: None,
        }
    }
}

/// Streaming session and reconnect policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_reconnect_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub connect_timeout_ms: u64,
    /// Inbound frames larger than this are dropped
    pub max_message_bytes: usize,
    /// Delay before the active conversation id clears after a terminal status
    pub completion_grace_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            connect_timeout_ms: 10_000,
            max_message_bytes: 10 * 1024 * 1024,
            completion_grace_ms: 100,
        }
    }
}

impl SessionConfig {
    /// Backoff before reconnect number `attempt` (1-based):
    /// `min(base * 2^attempt, max)`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }
}

/// Real-time playback driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub tick_interval_ms: u64,
    /// Landmark sequences shorter than this are held until it elapses
    pub min_total_ms: f64,
    /// Convert landmark sequences to bone rotations before playing on a rig
    pub retarget_landmarks: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            min_total_ms: signmotion_core::playback::MIN_TOTAL_MS,
            retarget_landmarks: true,
        }
    }
}

impl PlaybackConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetConfig {
    pub method: RetargetMethod,
    /// Target skeleton bone names; Ready Player Me names when absent
    pub bone_map: Option<BoneMap>,
}

impl RetargetConfig {
    pub fn bone_map(&self) -> BoneMap {
        self.bone_map.clone().unwrap_or_default()
    }
}

impl EngineConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from string (JSON, then TOML)
    pub fn from_str(content: &str) -> Result<Self, EngineError> {
        if let Ok(config) = serde_json::from_str::<EngineConfig>(content) {
            return Ok(config);
        }

        toml::from_str::<EngineConfig>(content)
            .map_err(|e| EngineError::Config(format!("Unknown format: {}", e)))
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `SIGNMOTION_*` environment overrides on top of this config
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SIGNMOTION_API_URL") {
            self.api.base_url = url;
        }

        if let Ok(origin) = std::env::var("SIGNMOTION_STREAM_ORIGIN") {
            self.api.stream_origin = origin;
        }

        if let Ok(token) = std::env::var("SIGNMOTION_TOKEN") {
            if !token.is_empty() {
                self.api.token = Some(token);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let base = url::Url::parse(&self.api.base_url)
            .map_err(|e| format!("Invalid API base URL '{}': {}", self.api.base_url, e))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err("API base URL must use http or https".to_string());
        }

        let origin = url::Url::parse(&self.api.stream_origin)
            .map_err(|e| format!("Invalid stream origin '{}': {}", self.api.stream_origin, e))?;
        if !matches!(origin.scheme(), "ws" | "wss") {
            return Err("Stream origin must use ws or wss".to_string());
        }

        if self.api.timeout == 0 {
            return Err("API timeout must be greater than 0".to_string());
        }

        if self.session.base_delay_ms == 0 {
            return Err("Reconnect base delay must be greater than 0".to_string());
        }

        if self.session.max_delay_ms < self.session.base_delay_ms {
            return Err("Reconnect max delay cannot be less than the base delay".to_string());
        }

        if self.session.connect_timeout_ms == 0 {
            return Err("Connect timeout must be greater than 0".to_string());
        }

        if self.session.max_message_bytes == 0 {
            return Err("Max message size must be greater than 0".to_string());
        }

        if self.playback.tick_interval_ms == 0 || self.playback.tick_interval_ms > 1000 {
            return Err("Tick interval must be between 1 and 1000 ms".to_string());
        }

        if !self.playback.min_total_ms.is_finite() || self.playback.min_total_ms < 0.0 {
            return Err("Minimum playback time must be a non-negative number".to_string());
        }

        if let Some(ref map) = self.retarget.bone_map {
            if map.is_empty() {
                return Err("Bone map cannot be empty if provided".to_string());
            }
            map.validate()?;
        }

        Ok(())
    }
}
