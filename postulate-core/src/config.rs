use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PostulateConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    /// Sales-training backend (sessions, chat, checkpoints, client profiles)
    pub training_url: String,
    /// Research-copilot backend (agents, knowledge graph, uploads)
    pub research_url: String,
    pub timeout_seconds: u64,
    /// Retries for idempotent reads only
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            training_url: "http://localhost:5000/api".to_string(),
            research_url: "http://localhost:8000/ps".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_ms: 250,
        }
    }
}

/// Strategy metadata sent when a replay has no alternate path selected.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DefaultPathConfig {
    pub speaker: String,
    pub strategy: String,
    pub technique_used: String,
    pub rationale: String,
    pub expected_outcome: String,
}

impl Default for DefaultPathConfig {
    fn default() -> Self {
        Self {
            speaker: "salesman".to_string(),
            strategy: "Consultative Selling".to_string(),
            technique_used: "Active Listening".to_string(),
            rationale: "Builds trust and identifies client needs".to_string(),
            expected_outcome: "Client agrees to a follow-up meeting".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReplayConfig {
    #[serde(default)]
    pub default_path: DefaultPathConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub node_spacing_x: i64,
    pub node_spacing_y: i64,
    /// Row width in pixels before a branch level wraps
    pub max_width: i64,
    pub branch_gap: i64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_spacing_x: 250,
            node_spacing_y: 200,
            max_width: 1500,
            branch_gap: 100,
        }
    }
}

impl PostulateConfig {
    /// Load a TOML file, then overlay `POSTULATE__SECTION__KEY` variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("POSTULATE").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    /// Like `load`, but a missing file falls back to built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("POSTULATE").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_backend_ports() {
        let config = PostulateConfig::default();
        assert_eq!(config.api.training_url, "http://localhost:5000/api");
        assert_eq!(config.api.research_url, "http://localhost:8000/ps");
        assert_eq!(config.layout.max_width / config.layout.node_spacing_x, 6);
        assert_eq!(config.replay.default_path.strategy, "Consultative Selling");
    }

    #[test]
    fn test_load_partial_file_keeps_other_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            r#"
[api]
training_url = "http://trainer.internal/api"
research_url = "http://copilot.internal/ps"
timeout_seconds = 5
max_retries = 0
retry_delay_ms = 10

[replay.default_path]
speaker = "salesman"
strategy = "Challenger"
technique_used = "Reframing"
rationale = "Shifts the client's view of the problem"
expected_outcome = "Client reconsiders the status quo"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = PostulateConfig::load(&path).expect("config should load");

        assert_eq!(config.api.training_url, "http://trainer.internal/api");
        assert_eq!(config.api.max_retries, 0);
        assert_eq!(config.replay.default_path.strategy, "Challenger");
        assert_eq!(config.layout, LayoutConfig::default());
        assert_eq!(config.service.log_level, "info");
    }

    #[test]
    fn test_partial_section_fills_missing_keys() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            r#"
[api]
training_url = "http://trainer.internal/api"

[replay.default_path]
strategy = "Challenger"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = PostulateConfig::load(&path).expect("partial sections should load");

        assert_eq!(config.api.training_url, "http://trainer.internal/api");
        assert_eq!(config.api.research_url, "http://localhost:8000/ps");
        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.replay.default_path.strategy, "Challenger");
        assert_eq!(config.replay.default_path.speaker, "salesman");
    }

    #[test]
    fn test_single_env_key_overrides_defaults() {
        std::env::set_var("POSTULATE__API__RETRY_DELAY_MS", "40");
        let config = PostulateConfig::load_or_default("/nonexistent/postulate-env-config");
        std::env::remove_var("POSTULATE__API__RETRY_DELAY_MS");

        let config = config.expect("single env key should load");
        assert_eq!(config.api.retry_delay_ms, 40);
        assert_eq!(config.api.research_url, "http://localhost:8000/ps");
        assert_eq!(config.api.max_retries, 2);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = PostulateConfig::load_or_default("/nonexistent/postulate-config")
            .expect("missing file is not an error");
        assert_eq!(config.api.timeout_seconds, 30);
    }
}
