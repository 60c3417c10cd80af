//! Runtime configuration for the orchestration core.
//!
//! This is deliberately thin: argument parsing and a user-facing config
//! file format are the embedding binary's concern. The core only needs a
//! handful of knobs, loadable from TOML via [`load_config`]/[`load_config_str`]
//! or constructed directly for tests.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::args::WorkerConfig;

fn default_poll_interval_millis() -> u64 {
    15_000
}

fn default_attempt_timeout_secs() -> u64 {
    3600
}

fn default_log_verbosity() -> String {
    "info".to_string()
}

fn default_luci_project() -> String {
    "cros".to_string()
}

fn default_logdog_host() -> String {
    "logs.chromium.org".to_string()
}

/// Runtime knobs for the [`Runner`](crate::runner::Runner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Cadence at which live tasks are polled for their current state.
    /// Tests shrink this well below the production default of 15s.
    #[serde(
        default = "default_poll_interval_millis",
        rename = "poll_interval_millis"
    )]
    poll_interval_millis: u64,

    /// Upper bound on how far out a request's absolute deadline may be
    /// placed when the caller doesn't supply one directly.
    #[serde(
        default = "default_attempt_timeout_secs",
        rename = "default_attempt_timeout_secs"
    )]
    default_attempt_timeout_secs: u64,

    #[serde(default = "default_log_verbosity")]
    log_verbosity: String,

    #[serde(default)]
    worker: WorkerConfigToml,
}

/// Serde-friendly mirror of [`WorkerConfig`]; the core type doesn't derive
/// `Serialize`/`Deserialize` itself since it's an `ArgsGenerator` input, not
/// wire data, but the embedding config file still needs to set it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkerConfigToml {
    #[serde(default = "default_luci_project")]
    luci_project: String,
    #[serde(default = "default_logdog_host")]
    logdog_host: String,
}

impl Default for WorkerConfigToml {
    fn default() -> Self {
        Self {
            luci_project: default_luci_project(),
            logdog_host: default_logdog_host(),
        }
    }
}

impl RunnerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn default_attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.default_attempt_timeout_secs)
    }

    pub fn log_level(&self) -> Level {
        self.log_verbosity.parse().unwrap_or(Level::INFO)
    }

    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            luci_project: self.worker.luci_project.clone(),
            logdog_host: self.worker.logdog_host.clone(),
        }
    }

    /// Overrides the poll cadence; test harnesses use this to drive the
    /// loop in milliseconds instead of production's 15s default.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_millis = interval.as_millis().max(1) as u64;
        self
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_millis: default_poll_interval_millis(),
            default_attempt_timeout_secs: default_attempt_timeout_secs(),
            log_verbosity: default_log_verbosity(),
            worker: WorkerConfigToml::default(),
        }
    }
}

/// Loads a [`RunnerConfig`] from a TOML file.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    load_config_str(&content)
}

/// Loads a [`RunnerConfig`] from a TOML string.
pub fn load_config_str(content: &str) -> Result<RunnerConfig> {
    let expanded = expand_env_value(content).map_err(|e| anyhow::anyhow!(e))?;
    toml::from_str(&expanded).context("failed to parse runner config")
}

/// Expands environment variable references in a string value.
///
/// Syntax:
/// - `${VAR}` - required, fails if VAR is not set
/// - `${VAR:-default}` - optional, uses "default" if VAR not set
/// - `$$` - escaped dollar sign (becomes single `$`)
fn expand_env_value(value: &str) -> Result<String, String> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let mut var_content = String::new();
                    let mut found_close = false;

                    for c in chars.by_ref() {
                        if c == '}' {
                            found_close = true;
                            break;
                        }
                        var_content.push(c);
                    }

                    if !found_close {
                        return Err(format!("unclosed variable reference: ${{{var_content}"));
                    }

                    let (var_name, default_value) = if let Some(idx) = var_content.find(":-") {
                        let (name, rest) = var_content.split_at(idx);
                        (name, Some(&rest[2..]))
                    } else {
                        (var_content.as_str(), None)
                    };

                    if var_name.is_empty() {
                        return Err("empty variable name in ${}".to_string());
                    }

                    match std::env::var(var_name) {
                        Ok(val) => result.push_str(&val),
                        Err(_) => {
                            if let Some(default) = default_value {
                                result.push_str(default);
                            } else {
                                return Err(format!(
                                    "required environment variable not set: {var_name}"
                                ));
                            }
                        }
                    }
                }
                _ => result.push('$'),
            }
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_poll_cadence_spec() {
        let config = RunnerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
    }

    #[test]
    fn with_poll_interval_overrides_for_tests() {
        let config = RunnerConfig::default().with_poll_interval(Duration::from_millis(50));
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn load_config_str_parses_minimal_toml() {
        let config = load_config_str("poll_interval_millis = 5000\n").unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn expand_env_value_default_used_when_unset() -> Result<(), String> {
        let result = expand_env_value("${_RUNNER_TEST_MISSING:-fallback}")?;
        assert_eq!(result, "fallback");
        Ok(())
    }

    #[test]
    fn expand_env_value_escaped_dollar() -> Result<(), String> {
        let result = expand_env_value("price is $$100")?;
        assert_eq!(result, "price is $100");
        Ok(())
    }

    #[test]
    fn expand_env_value_required_missing_errors() {
        let result = expand_env_value("${_RUNNER_TEST_NONEXISTENT}");
        assert!(result.is_err());
    }
}
