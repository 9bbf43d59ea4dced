/// `load_config` module: loads the static YAML config, injects secrets from the
/// environment and rejects values the pipeline cannot run with.
///
/// # Responsibilities
/// - Parse the user-supplied YAML into typed sections (`github`, `rate_limits`, `retry`)
/// - Inject `GITHUB_TOKEN` and an optional `GITHUB_API_URL` override from the environment
/// - Fail with clear diagnostics on unreadable files, bad YAML or invalid numbers
///
/// Every section is optional; a missing file section falls back to the defaults.
/// Secrets never come from the file.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{ensure, Result};
use git_bulk_core::ratelimit::ApiLimits;
use git_bulk_core::retry::RetryConfig;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::github::DEFAULT_API_URL;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GitHubSection {
    pub api_url: String,
    /// Only ever filled from `GITHUB_TOKEN`.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
            backoff_factor: defaults.backoff_factor,
        }
    }
}

impl RetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_factor: self.backoff_factor,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub github: GitHubSection,
    pub rate_limits: ApiLimits,
    /// Absent means remote calls are not retried.
    pub retry: Option<RetrySection>,
}

/// Loads a static YAML config file (no secrets) and injects secrets from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = if config_content.trim().is_empty() {
        CliConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    finalise(config)
}

/// Defaults plus environment, for runs without `--config`.
pub fn config_from_env() -> Result<CliConfig> {
    info!("No config file given, using defaults and environment");
    finalise(CliConfig::default())
}

fn finalise(mut config: CliConfig) -> Result<CliConfig> {
    if let Ok(url) = env::var("GITHUB_API_URL") {
        if !url.trim().is_empty() {
            config.github.api_url = url;
        }
    }
    config.github.token = env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());

    validate(&config)?;
    info!(
        api_url = %config.github.api_url,
        token_set = config.github.token.is_some(),
        retry = config.retry.is_some(),
        "Configuration ready"
    );
    Ok(config)
}

fn validate(config: &CliConfig) -> Result<()> {
    ensure!(
        !config.github.api_url.trim().is_empty(),
        "github.api_url must not be empty"
    );

    let limits = &config.rate_limits;
    ensure!(
        limits.core_requests_per_hour > 0
            && limits.search_requests_per_minute > 0
            && limits.graphql_points_per_hour > 0,
        "rate_limits quotas must be greater than zero"
    );
    ensure!(
        limits.core_burst > 0 && limits.search_burst > 0 && limits.graphql_burst > 0,
        "rate_limits bursts must be greater than zero"
    );

    if let Some(retry) = &config.retry {
        ensure!(
            retry.backoff_factor.is_finite() && retry.backoff_factor >= 1.0,
            "retry.backoff_factor must be at least 1.0, got {}",
            retry.backoff_factor
        );
        ensure!(
            retry.initial_backoff_ms <= retry.max_backoff_ms,
            "retry.initial_backoff_ms ({}) must not exceed retry.max_backoff_ms ({})",
            retry.initial_backoff_ms,
            retry.max_backoff_ms
        );
    }
    Ok(())
}
