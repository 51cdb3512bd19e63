// src/config.rs
use crate::errors::{GradingError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for the Replicate prediction backend.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_base: String,
    pub api_token: String,
    pub model_version: String,
}

/// Configuration for an OpenAI-compatible chat completions backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    Replicate(ReplicateConfig),
    OpenAI(OpenAIConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Replicate(_) => "replicate",
            BackendConfig::OpenAI(_) => "openai",
        }
    }
}

/// Timing knobs for the grading pipeline.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GradingSettings {
    pub poll_interval_ms: u64,
    pub job_timeout_secs: u64,
    /// 0 disables the batch-wide deadline.
    pub batch_deadline_secs: u64,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            job_timeout_secs: 300,
            batch_deadline_secs: 900,
        }
    }
}

impl GradingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        (self.batch_deadline_secs > 0).then(|| Duration::from_secs(self.batch_deadline_secs))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_u64("GRADER_POLL_INTERVAL_MS")? {
            self.poll_interval_ms = v;
        }
        if let Some(v) = env_u64("GRADER_JOB_TIMEOUT_SECS")? {
            self.job_timeout_secs = v;
        }
        if let Some(v) = env_u64("GRADER_BATCH_DEADLINE_SECS")? {
            self.batch_deadline_secs = v;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    grading: Option<GradingSettings>,
}

/// High-level application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub grading: GradingSettings,
    pub database_url: Option<String>,
    pub bind_addr: String,
}

impl AppConfig {
    /// Load configuration from environment variables, layering an optional
    /// `GRADER_CONFIG` TOML file underneath the grading settings.
    pub fn from_env() -> Result<Self> {
        let backend_name =
            std::env::var("GRADER_BACKEND").unwrap_or_else(|_| "replicate".to_string());

        let backend = match backend_name.trim().to_lowercase().as_str() {
            "replicate" => {
                let api_token = std::env::var("REPLICATE_API_TOKEN").map_err(|_| {
                    GradingError::Config("REPLICATE_API_TOKEN must be set".to_string())
                })?;
                let api_base = std::env::var("REPLICATE_API_BASE")
                    .unwrap_or_else(|_| "https://api.replicate.com".to_string());
                let model_version = std::env::var("REPLICATE_MODEL").map_err(|_| {
                    GradingError::Config("REPLICATE_MODEL must be set".to_string())
                })?;
                BackendConfig::Replicate(ReplicateConfig { api_base, api_token, model_version })
            }
            "openai" => {
                let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
                    GradingError::Config("OPENAI_API_KEY must be set".to_string())
                })?;
                let api_base = std::env::var("OPENAI_API_BASE")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
                let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
                BackendConfig::OpenAI(OpenAIConfig { api_base, api_key, model })
            }
            other => return Err(GradingError::ProviderNotFound(other.to_string())),
        };

        let mut grading = match std::env::var("GRADER_CONFIG") {
            Ok(path) => load_grading_file(Path::new(&path))?,
            Err(_) => GradingSettings::default(),
        };
        grading.apply_env()?;

        Ok(AppConfig {
            backend,
            grading,
            database_url: std::env::var("DATABASE_URL").ok(),
            bind_addr: std::env::var("GRADER_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}

/// Reads the `[grading]` table of a TOML file; absent keys keep their defaults.
pub fn load_grading_file(path: &Path) -> Result<GradingSettings> {
    let contents = std::fs::read_to_string(path)?;
    parse_grading_toml(&contents)
}

fn parse_grading_toml(contents: &str) -> Result<GradingSettings> {
    let file: FileConfig = toml::from_str(contents)?;
    Ok(file.grading.unwrap_or_default())
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| GradingError::Config(format!("{} must be a whole number, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grading_toml_overrides_defaults() {
        let settings = parse_grading_toml(
            r#"
            [grading]
            poll_interval_ms = 250
            batch_deadline_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(settings.poll_interval(), Duration::from_millis(250));
        assert_eq!(settings.job_timeout(), Duration::from_secs(300));
        assert_eq!(settings.batch_deadline(), None);
    }

    #[test]
    fn test_missing_grading_table_uses_defaults() {
        let settings = parse_grading_toml("").unwrap();
        assert_eq!(settings, GradingSettings::default());
        assert_eq!(settings.batch_deadline(), Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        assert!(matches!(
            parse_grading_toml("[grading\npoll_interval_ms = 1"),
            Err(GradingError::TomlParse(_))
        ));
    }
}
