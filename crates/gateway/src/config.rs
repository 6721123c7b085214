//! Gateway configuration.
//!
//! The whole configuration is one JSON document: the listening address and a list of
//! services. It is loaded and validated once at startup and never changes afterwards.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const WILDCARD: &str = "*";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path} error: {source}")]
    Read { path: String, source: io::Error },

    #[error("parse config error: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid service '{service}': {reason}")]
    InvalidService { service: String, reason: String },
}

impl ConfigError {
    pub fn invalid_service<N: ToString, S: ToString>(service: N, reason: S) -> Self {
        Self::InvalidService { service: service.to_string(), reason: reason.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_address")]
    pub address: String,
    pub services: Vec<ServiceConfig>,
}

/// Policy of one ICAP service, mounted at `icap://<host>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Sent in the `Service` header; the name when empty.
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub req_mode: bool,
    #[serde(default)]
    pub resp_mode: bool,

    #[serde(default = "default_true")]
    pub preview_enabled: bool,
    #[serde(default = "default_preview_bytes")]
    pub preview_bytes: usize,
    #[serde(default = "default_transfer_preview")]
    pub transfer_preview: String,

    /// Largest body in bytes that is scanned, 0 for no limit.
    #[serde(default)]
    pub max_file_size: u64,
    #[serde(default)]
    pub return_original_if_max_file_size_exceeded: bool,

    #[serde(default = "default_process_extensions")]
    pub process_extensions: Vec<String>,
    #[serde(default)]
    pub reject_extensions: Vec<String>,
    #[serde(default)]
    pub bypass_extensions: Vec<String>,
    #[serde(default)]
    pub return_400_if_file_ext_rejected: bool,

    /// Pass the original message through when scanning fails, instead of an error status.
    #[serde(default)]
    pub fail_open: bool,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    #[serde(default = "default_status_check_timeout_ms")]
    pub status_check_timeout_ms: u64,
    #[serde(default = "default_status_check_interval_ms")]
    pub status_check_interval_ms: u64,

    #[serde(default = "default_block_http_response_code")]
    pub block_http_response_code: u16,
    #[serde(default = "default_true")]
    pub block_http_body: bool,

    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub shadow: Option<BackendConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Never modifies anything.
    #[default]
    Echo,
    /// Blocks bodies containing one of the byte patterns.
    Signature { signatures: Vec<SignatureConfig> },
    /// Forwards requests to another ICAP service.
    RemoteIcap {
        endpoint: String,
        #[serde(default = "default_remote_timeout_ms")]
        timeout_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureConfig {
    pub name: String,
    pub pattern: String,
}

fn default_address() -> String {
    "0.0.0.0:1344".to_string()
}

fn default_true() -> bool {
    true
}

fn default_preview_bytes() -> usize {
    1024
}

fn default_transfer_preview() -> String {
    WILDCARD.to_string()
}

fn default_process_extensions() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

fn default_scan_timeout_ms() -> u64 {
    30_000
}

fn default_status_check_timeout_ms() -> u64 {
    10_000
}

fn default_status_check_interval_ms() -> u64 {
    500
}

fn default_block_http_response_code() -> u16 {
    403
}

fn default_remote_timeout_ms() -> u64 {
    30_000
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for service in &self.services {
            service.validate()?;
            if !names.insert(service.name.as_str()) {
                return Err(ConfigError::invalid_service(&service.name, "duplicated service name"));
            }
        }
        Ok(())
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::invalid_service(&self.name, reason));

        if self.name.is_empty() || !self.name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            return invalid("name may only contain ascii letters, digits, '-', '_' and '.'");
        }
        if !self.req_mode && !self.resp_mode {
            return invalid("neither REQMOD nor RESPMOD is enabled");
        }
        if self.preview_enabled && self.preview_bytes == 0 {
            return invalid("preview_bytes must be positive when preview is enabled");
        }
        if self.status_check_interval_ms == 0 {
            return invalid("status_check_interval_ms must be positive");
        }
        if !(100..600).contains(&self.block_http_response_code) {
            return invalid("block_http_response_code is not an http status");
        }

        let lists = [&self.process_extensions, &self.reject_extensions, &self.bypass_extensions];

        let wildcards = lists.iter().filter(|list| list.len() == 1 && list[0] == WILDCARD).count();
        if wildcards != 1 {
            return invalid("exactly one of process, reject and bypass extensions must be [\"*\"]");
        }

        let mut seen = HashSet::new();
        for extension in lists.iter().flat_map(|list| list.iter()) {
            let extension = normalize_extension(extension);
            if extension == WILDCARD {
                continue;
            }
            if !seen.insert(extension.clone()) {
                return Err(ConfigError::invalid_service(&self.name, format!("extension '{extension}' is listed twice")));
            }
        }

        Ok(())
    }

    /// The `Service` header value.
    pub fn caption(&self) -> &str {
        if self.caption.is_empty() { &self.name } else { &self.caption }
    }

    #[inline]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    #[inline]
    pub fn status_check_timeout(&self) -> Duration {
        Duration::from_millis(self.status_check_timeout_ms)
    }

    #[inline]
    pub fn status_check_interval(&self) -> Duration {
        Duration::from_millis(self.status_check_interval_ms)
    }
}

/// Lowercases an extension and strips a leading dot.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}
