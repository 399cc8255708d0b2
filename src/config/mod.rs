use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ai: AiConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Base URL of the speech-to-text / extraction service.
    pub base_url: String,
    /// Read timeout for transcription and extraction calls, in milliseconds.
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            timeout_ms: 300_000,
            connect_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Upper bound on accepted audio uploads, in bytes.
    pub max_audio_bytes: u64,
    /// Directory holding uploaded audio until the pipeline releases it.
    /// Empty string means the platform data dir default.
    pub temp_upload_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_audio_bytes: 500 * 1024 * 1024,
            temp_upload_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_retry_attempts: u32,
    pub initial_backoff_ms: u64,
    /// How many processed sibling meetings feed the previous-context payload.
    pub context_siblings_limit: usize,
    pub progress_topic_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            initial_backoff_ms: 1000,
            context_siblings_limit: 3,
            progress_topic_prefix: "/topic/meetings/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3900 }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config.with_env_overrides());
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config.with_env_overrides())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("MINUTED_AI_BASE_URL") {
            if !url.is_empty() {
                self.ai.base_url = url;
            }
        }
        self
    }

    pub fn temp_upload_dir(&self) -> Result<PathBuf> {
        if self.storage.temp_upload_dir.is_empty() {
            global::temp_upload_dir()
        } else {
            Ok(PathBuf::from(&self.storage.temp_upload_dir))
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ai.base_url, "http://localhost:5001");
        assert_eq!(config.ai.timeout_ms, 300_000);
        assert_eq!(config.pipeline.max_retry_attempts, 3);
        assert_eq!(config.pipeline.initial_backoff_ms, 1000);
        assert_eq!(config.pipeline.context_siblings_limit, 3);
        assert_eq!(config.storage.max_audio_bytes, 500 * 1024 * 1024);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ai]
            base_url = "http://ai.internal:5001"
            "#,
        )
        .unwrap();
        assert_eq!(config.ai.base_url, "http://ai.internal:5001");
        assert_eq!(config.ai.timeout_ms, 300_000);
        assert_eq!(config.pipeline.progress_topic_prefix, "/topic/meetings/");
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.ai.base_url, config.ai.base_url);
    }
}
