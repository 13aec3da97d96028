//! # Server Configuration Module
//!
//! Configuration consumed by the dispatcher when it stamps conventional headers,
//! picks worker pools, and renders generic error bodies.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `ROUTEFLOW_DATE_HEADER` | `true` | Stamp a `Date` header when absent |
//! | `ROUTEFLOW_SERVER_HEADER` | unset | Value of the `Server` header stamped when absent |
//! | `ROUTEFLOW_THREAD_SELECTION` | `manual` | `auto`, `io`, `blocking` or `manual` |
//! | `ROUTEFLOW_ERROR_FORMAT` | `json` | `json`, `problem` (RFC 7807) or `none` |
//!
//! ## YAML
//!
//! ```yaml
//! date_header: true
//! server_header: routeflow
//! thread_selection: auto
//! error_format: problem
//! ```

use crate::worker_pool::ThreadSelection;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Body format of generic error responses (no error route handled the failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFormat {
    /// `{"error": "...", "status": 500, "path": "/..."}` as `application/json`
    #[default]
    Json,
    /// RFC 7807 problem details as `application/problem+json`
    Problem,
    /// Status and headers only
    None,
}

impl ErrorFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "problem" | "problem+json" => Some(Self::Problem),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// Dispatcher-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub date_header: bool,
    pub server_header: Option<String>,
    pub thread_selection: ThreadSelection,
    pub error_format: ErrorFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            date_header: true,
            server_header: None,
            thread_selection: ThreadSelection::Manual,
            error_format: ErrorFormat::Json,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let date_header = env::var("ROUTEFLOW_DATE_HEADER")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.date_header);
        let server_header = env::var("ROUTEFLOW_SERVER_HEADER")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let thread_selection = env::var("ROUTEFLOW_THREAD_SELECTION")
            .ok()
            .and_then(|v| ThreadSelection::parse(&v))
            .unwrap_or(defaults.thread_selection);
        let error_format = env::var("ROUTEFLOW_ERROR_FORMAT")
            .ok()
            .and_then(|v| ErrorFormat::parse(&v))
            .unwrap_or(defaults.error_format);

        Self {
            date_header,
            server_header,
            thread_selection,
            error_format,
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("invalid server configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
