use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::client::{ClientConfig, PoolConfig};
use crate::loader::DEFAULT_PLAN_FILE;
use crate::utils::{parse_bool_flag, parse_duration_string};

/// Errors raised while reading configuration from the environment.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    #[error("Invalid {name}: '{value}'. {message}")]
    Invalid {
        name: &'static str,
        value: String,
        message: String,
    },
}

/// Output format of diagnostic logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Main configuration for a plan run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding requests/, tasks/, steps/ and the plan file
    pub plan_dir: PathBuf,
    pub plan_file: String,
    pub skip_tls_verify: bool,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
    pub custom_headers: Option<String>,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let plan_dir = non_empty_var("PLAN_DIR")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("PLAN_DIR"))?;

        let plan_file =
            non_empty_var("PLAN_FILE").unwrap_or_else(|| DEFAULT_PLAN_FILE.to_string());

        let skip_tls_verify = match non_empty_var("SKIP_TLS_VERIFY") {
            Some(raw) => parse_bool_flag(&raw).map_err(|message| ConfigError::Invalid {
                name: "SKIP_TLS_VERIFY",
                value: raw,
                message,
            })?,
            None => false,
        };

        let pool_max_idle_per_host = match non_empty_var("POOL_MAX_IDLE_PER_HOST") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "POOL_MAX_IDLE_PER_HOST",
                value: raw.clone(),
                message: "Must be a non-negative integer.".to_string(),
            })?,
            None => PoolConfig::default().max_idle_per_host,
        };

        let pool_idle_timeout = duration_var("POOL_IDLE_TIMEOUT")?
            .unwrap_or(PoolConfig::default().idle_timeout);
        let request_timeout = duration_var("REQUEST_TIMEOUT")?;

        let log_format = match non_empty_var("LOG_FORMAT").as_deref().map(str::to_lowercase) {
            None => LogFormat::Text,
            Some(format) if format == "text" => LogFormat::Text,
            Some(format) if format == "json" => LogFormat::Json,
            Some(format) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: format,
                    message: "Use 'text' or 'json'.".to_string(),
                })
            }
        };

        Ok(Config {
            plan_dir,
            plan_file,
            skip_tls_verify,
            client_cert_path: non_empty_var("CLIENT_CERT_PATH"),
            client_key_path: non_empty_var("CLIENT_KEY_PATH"),
            custom_headers: non_empty_var("CUSTOM_HEADERS"),
            pool_max_idle_per_host,
            pool_idle_timeout,
            request_timeout,
            log_format,
        })
    }

    /// Creates a ClientConfig from this Config.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            skip_tls_verify: self.skip_tls_verify,
            client_cert_path: self.client_cert_path.clone(),
            client_key_path: self.client_key_path.clone(),
            custom_headers: self.custom_headers.clone(),
            pool_config: PoolConfig {
                max_idle_per_host: self.pool_max_idle_per_host,
                idle_timeout: self.pool_idle_timeout,
                ..PoolConfig::default()
            },
            request_timeout: self.request_timeout,
        }
    }

    /// Logs the configuration summary. Stdout is reserved for report lines.
    pub fn log_summary(&self) {
        info!(
            plan_dir = %self.plan_dir.display(),
            plan_file = %self.plan_file,
            skip_tls_verify = self.skip_tls_verify,
            mtls = self.client_cert_path.is_some() && self.client_key_path.is_some(),
            custom_headers = self.custom_headers.is_some(),
            pool_max_idle_per_host = self.pool_max_idle_per_host,
            pool_idle_timeout = ?self.pool_idle_timeout,
            request_timeout = ?self.request_timeout,
            "Loaded configuration"
        );
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn duration_var(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    non_empty_var(name)
        .map(|raw| {
            parse_duration_string(&raw).map_err(|message| ConfigError::Invalid {
                name,
                value: raw.clone(),
                message,
            })
        })
        .transpose()
}
