use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub concurrency: ConcurrencyConfig,
    pub orchestrator: OrchestratorConfig,
    pub retry: RetryConfig,
    pub lock: LockConfig,
    pub llm: LlmConfig,
    pub ocr: OcrConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Named concurrency gate permit counts (§4.C). Names recognized by the
/// gate are fixed (`ocr`, `llm`, `file-gen`); this struct only carries their
/// configured capacities.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub ocr: usize,
    pub llm: usize,
    pub file_gen: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub poll_interval_secs: u64,
    pub batch_limit_documents: i64,
    pub batch_limit_files: i64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub stuck_threshold_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: i64,
}

/// Per-type serializer tuning (§4.D): how long a waiter polls before
/// declaring `LockTimeout`, how often it polls, and after how long an
/// unrefreshed holder is considered abandoned (our approximation of
/// Postgres's "auto-released on connection loss", see SPEC_FULL.md §4.A.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub wait_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub poll_interval_secs: u64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub stale_after_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub api_base: String,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Command line arguments for configuration overrides. Subcommands live in
/// [`crate::cli`]; this struct only covers config-file/env-style overrides
/// that apply regardless of which mode is selected.
#[derive(Parser, Debug, Clone)]
#[command(name = "docflow")]
pub struct ConfigArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<String>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Logging level (overrides config file, e.g., "info,docflow=debug")
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file
    /// support.
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with `DOCFLOW_`)
    /// 3. Configuration file (`docflow.toml`)
    /// 4. Default values
    pub fn load(args: &ConfigArgs) -> Result<Self, anyhow::Error> {
        let config_path = args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(args);
        config.validate()?;

        Ok(config)
    }

    /// Supported environment variables:
    /// - `DOCFLOW_DATABASE_URL`
    /// - `DOCFLOW_LOG_LEVEL`
    /// - `DOCFLOW_LLM_API_BASE`, `DOCFLOW_LLM_API_KEY`, `DOCFLOW_LLM_MODEL`
    /// - `DOCFLOW_OCR_API_BASE`
    fn apply_env_overrides(&mut self) {
        if let Ok(db_url) = std::env::var("DOCFLOW_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }
        if let Ok(level) = std::env::var("DOCFLOW_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }
        if let Ok(base) = std::env::var("DOCFLOW_LLM_API_BASE") {
            self.llm.api_base = base;
            tracing::info!("Override llm.api_base from env");
        }
        if let Ok(key) = std::env::var("DOCFLOW_LLM_API_KEY") {
            self.llm.api_key = Some(key);
            tracing::info!("Override llm.api_key from env");
        }
        if let Ok(model) = std::env::var("DOCFLOW_LLM_MODEL") {
            self.llm.model = model;
            tracing::info!("Override llm.model from env: {}", self.llm.model);
        }
        if let Ok(base) = std::env::var("DOCFLOW_OCR_API_BASE") {
            self.ocr.api_base = base;
            tracing::info!("Override ocr.api_base from env");
        }
    }

    fn apply_cli_overrides(&mut self, args: &ConfigArgs) {
        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
            tracing::info!("Override database.url from CLI");
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.database.url.is_empty() {
            anyhow::bail!("database.url cannot be empty");
        }
        if self.concurrency.ocr == 0 || self.concurrency.llm == 0 || self.concurrency.file_gen == 0 {
            anyhow::bail!("concurrency gate capacities must all be > 0");
        }
        if self.retry.max_retries <= 0 {
            anyhow::bail!("retry.max_retries must be > 0");
        }
        if self.orchestrator.poll_interval_secs == 0 {
            anyhow::bail!("orchestrator.poll_interval_secs must be > 0");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/docflow.toml", "docflow.toml", "./conf/docflow.toml"];
        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/docflow.db".to_string() }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { ocr: 3, llm: 5, file_gen: 2 }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            batch_limit_documents: 50,
            batch_limit_files: 20,
            stuck_threshold_secs: 600,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { wait_timeout_secs: 300, poll_interval_secs: 1, stale_after_secs: 60 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "default".to_string(),
            timeout_secs: 120,
            max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { api_base: "http://localhost:9000".to_string(), timeout_secs: 60 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,docflow=debug".to_string(), file: Some("logs/docflow.log".to_string()) }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_human_durations() {
        assert_eq!(parse_duration_to_secs("30s").unwrap(), 30);
        assert_eq!(parse_duration_to_secs("5m").unwrap(), 300);
        assert_eq!(parse_duration_to_secs("1h").unwrap(), 3600);
        assert_eq!(parse_duration_to_secs("45").unwrap(), 45);
    }

    // Mutates process-global env vars, so it must not interleave with any
    // other test touching DOCFLOW_* env vars.
    #[test]
    #[serial_test::serial]
    fn env_overrides_apply_on_top_of_defaults() {
        std::env::set_var("DOCFLOW_DATABASE_URL", "sqlite://override.db");
        std::env::set_var("DOCFLOW_LOG_LEVEL", "trace");

        let mut cfg = Config::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.database.url, "sqlite://override.db");
        assert_eq!(cfg.logging.level, "trace");

        std::env::remove_var("DOCFLOW_DATABASE_URL");
        std::env::remove_var("DOCFLOW_LOG_LEVEL");
    }
}
