//! Configuration management for vcenter-exporter.
//!
//! This module handles loading and validating configuration files. It supports
//! YAML, JSON, and TOML formats; all options live under a `main` section.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::cli::Args;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_LISTEN_PORT: u16 = 8000;
pub const DEFAULT_VCENTER_HOST: &str = "localhost";
pub const DEFAULT_VCENTER_PORT: u16 = 443;
pub const DEFAULT_INTERVAL_SECS: u64 = 20;
pub const DEFAULT_ANNOTATION_MARKER: &str = "^name:";
pub const DEFAULT_COUNTER_LEVEL: i32 = 4;
pub const DEFAULT_INTERVAL_ID: i32 = 20;
pub const DEFAULT_API_RELEASE: &str = "8.0.1.0";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Locations probed when no `--config` is given.
const DEFAULT_CONFIG_PATHS: [&str; 6] = [
    "/etc/vcenter-exporter/config.yaml",
    "/etc/vcenter-exporter/config.yml",
    "/etc/vcenter-exporter/config.json",
    "./vcenter-exporter.yaml",
    "./vcenter-exporter.yml",
    "./vcenter-exporter.json",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("{0}")]
    Invalid(String),
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub main: MainConfig,
}

/// The `main` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainConfig {
    // vCenter connection
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
    pub ignore_ssl: Option<bool>,
    #[serde(alias = "api-release")]
    pub api_release: Option<String>,
    #[serde(alias = "request-timeout")]
    pub request_timeout: Option<u64>,

    // Logging
    pub log: Option<String>,

    // Sampling
    /// Counter full names to sample; all counters when unset or empty.
    #[serde(alias = "vm-metrics")]
    pub vm_metrics: Option<Vec<String>>,
    /// Seconds between poll cycles.
    pub interval: Option<u64>,
    #[serde(alias = "counter-level")]
    pub counter_level: Option<i32>,
    #[serde(alias = "interval-id")]
    pub interval_id: Option<i32>,

    // Labels
    /// Regex removed from vcenter and host names before they become labels.
    #[serde(alias = "strip-pattern")]
    pub strip_pattern: Option<String>,
    /// Regex an annotation must match at its start for the VM to be sampled.
    #[serde(alias = "annotation-marker")]
    pub annotation_marker: Option<String>,

    // Metrics endpoint
    #[serde(alias = "listen-port")]
    pub listen_port: Option<u16>,
    pub bind: Option<String>,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            host: Some(DEFAULT_VCENTER_HOST.into()),
            user: Some("administrator@vsphere.local".into()),
            password: Some("password".into()),
            port: Some(DEFAULT_VCENTER_PORT),
            ignore_ssl: Some(true),
            api_release: Some(DEFAULT_API_RELEASE.into()),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            log: Some("info".into()),
            vm_metrics: None,
            interval: Some(DEFAULT_INTERVAL_SECS),
            counter_level: Some(DEFAULT_COUNTER_LEVEL),
            interval_id: Some(DEFAULT_INTERVAL_ID),
            strip_pattern: None,
            annotation_marker: Some(DEFAULT_ANNOTATION_MARKER.into()),
            listen_port: Some(DEFAULT_LISTEN_PORT),
            bind: Some(DEFAULT_BIND_ADDR.into()),
        }
    }
}

impl MainConfig {
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_VCENTER_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_VCENTER_PORT)
    }

    pub fn ignore_ssl(&self) -> bool {
        self.ignore_ssl.unwrap_or(true)
    }

    pub fn api_release(&self) -> &str {
        self.api_release.as_deref().unwrap_or(DEFAULT_API_RELEASE)
    }

    pub fn request_timeout(&self) -> u64 {
        self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    pub fn interval(&self) -> u64 {
        self.interval.unwrap_or(DEFAULT_INTERVAL_SECS)
    }

    pub fn counter_level(&self) -> i32 {
        self.counter_level.unwrap_or(DEFAULT_COUNTER_LEVEL)
    }

    pub fn interval_id(&self) -> i32 {
        self.interval_id.unwrap_or(DEFAULT_INTERVAL_ID)
    }

    pub fn annotation_marker(&self) -> &str {
        self.annotation_marker
            .as_deref()
            .unwrap_or(DEFAULT_ANNOTATION_MARKER)
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT)
    }

    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }
}

/// Validate effective config at startup.
pub fn validate_effective_config(cfg: &Config) -> Result<(), ConfigError> {
    let main = &cfg.main;

    if main.host().trim().is_empty() {
        return Err(ConfigError::Invalid("main.host must not be empty".into()));
    }

    if main.interval() == 0 {
        return Err(ConfigError::Invalid(
            "main.interval must be at least 1 second".into(),
        ));
    }

    if main.request_timeout() == 0 {
        return Err(ConfigError::Invalid(
            "main.request_timeout must be at least 1 second".into(),
        ));
    }

    let level = main.counter_level();
    if !(1..=4).contains(&level) {
        return Err(ConfigError::Invalid(format!(
            "Invalid main.counter_level {}, expected 1-4",
            level
        )));
    }

    if let Err(e) = Regex::new(main.annotation_marker()) {
        return Err(ConfigError::Invalid(format!(
            "Invalid main.annotation_marker: {}",
            e
        )));
    }

    if let Some(pattern) = main.strip_pattern.as_deref() {
        if let Err(e) = Regex::new(pattern) {
            return Err(ConfigError::Invalid(format!(
                "Invalid main.strip_pattern: {}",
                e
            )));
        }
    }

    if let Some(level) = main.log.as_deref() {
        if !matches!(
            level.to_ascii_lowercase().as_str(),
            "off" | "error" | "warn" | "warning" | "info" | "debug" | "trace"
        ) {
            return Err(ConfigError::Invalid(format!(
                "Invalid main.log '{}', expected off/error/warn/info/debug/trace",
                level
            )));
        }
    }

    Ok(())
}

/// Resolves configuration from the CLI arguments, a config file, or defaults.
pub fn resolve_config(args: &Args) -> Result<Config, ConfigError> {
    load_config(args.config.as_deref())
}

/// Loads a config file, choosing the format by extension (YAML by default).
/// Without an explicit path the default locations are probed; if none exists
/// the built-in defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            Some(p) => PathBuf::from(p),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    let parse_err = |reason: String| ConfigError::Parse {
        path: path.clone(),
        reason,
    };

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        Some("toml") => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        _ => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
    };

    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}
