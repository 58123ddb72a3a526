use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Configuration for one notification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bucket holding the WAF log batches
    pub bucket: String,
    /// SQS queue delivering object-created notifications
    pub queue_url: String,
    /// Rule IDs whose blocked requests are counted
    pub allowed_rule_ids: Vec<String>,
    /// Slack webhook URLs that receive the summary
    pub slack_webhooks: Vec<String>,
    /// IPInfo API token
    pub ipinfo_token: String,
    /// Records per notification page
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    100
}

impl Config {
    /// Load configuration from `WAFWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let batch_size = match std::env::var("WAFWATCH_BATCH_SIZE") {
            Ok(raw) => raw.parse().map_err(|err| ConfigError::InvalidValue {
                field: "WAFWATCH_BATCH_SIZE",
                message: format!("{}", err),
            })?,
            Err(_) => default_batch_size(),
        };

        let config = Config {
            bucket: require_var("WAFWATCH_BUCKET")?,
            queue_url: require_var("WAFWATCH_SQS_QUEUE_URL")?,
            allowed_rule_ids: parse_list(&require_var("WAFWATCH_ALLOWED_RULE_IDS")?),
            slack_webhooks: parse_list(&require_var("WAFWATCH_SLACK_WEBHOOKS")?),
            ipinfo_token: require_var("WAFWATCH_IPINFO_TOKEN")?,
            batch_size,
        };

        config.validate()
    }

    /// Load configuration from a TOML file. Intended for local runs; the
    /// deployed job is configured through the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.allowed_rule_ids.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "allowed_rule_ids",
                message: "at least one rule ID is required".to_string(),
            });
        }
        if self.slack_webhooks.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "slack_webhooks",
                message: "at least one webhook is required".to_string(),
            });
        }
        Ok(self)
    }
}

fn require_var(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

/// Split a comma-separated value, trimming whitespace and dropping empty
/// segments.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
