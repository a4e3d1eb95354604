use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use url::Url;

use crate::error::{GatewayError, Result};
use crate::rate_limit::{PolicyLimits, WindowLimit};

// Paths served by the gateway itself
pub const RESERVED_PATHS: [&str; 2] = ["/health", "/metrics"];

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "limit-gateway")]
#[command(about = "Admission-controlled reverse proxy")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 9191)]
    pub port: u16,

    // Route table file
    #[arg(short, long, default_value = "proxy.json")]
    pub config: PathBuf,

    // Write logs to this file instead of stdout
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// One entry of the route table as written on disk
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct RouteEntry {
    relative_path: String,
    remote: String,
}

// Route table file format
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct RouteFile {
    #[serde(alias = "wecom_hook_url")]
    webhook_url: String,
    #[serde(alias = "proxys")]
    routes: Vec<RouteEntry>,
    #[serde(default)]
    limits: PolicyLimits,
    #[serde(default = "default_insecure_skip_verify")]
    insecure_skip_verify: bool,
}

fn default_insecure_skip_verify() -> bool {
    true
}

/// A validated route: requests on `path` go to `upstream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub upstream: Url,
}

/// Validated gateway configuration. Read-only after startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub routes: Vec<Route>,
    pub webhook_url: Url,
    pub limits: PolicyLimits,
    /// Skip certificate validation toward upstreams.
    pub insecure_skip_verify: bool,
}

impl GatewayConfig {
    /// Load the route table from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: RouteFile = serde_json::from_str(contents)?;

        if file.routes.is_empty() {
            return Err(GatewayError::Config("no routes configured".to_string()));
        }

        // same matcher axum registers routes with, so anything it would refuse fails here
        let mut matcher = matchit::Router::new();
        for reserved in RESERVED_PATHS {
            matcher
                .insert(reserved, ())
                .map_err(|e| GatewayError::Config(format!("route {reserved:?}: {e}")))?;
        }

        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(file.routes.len());
        for entry in file.routes {
            if !entry.relative_path.starts_with('/') {
                return Err(GatewayError::Config(format!(
                    "relativePath {:?} must start with '/'",
                    entry.relative_path
                )));
            }
            if entry
                .relative_path
                .split('/')
                .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
            {
                return Err(GatewayError::Config(format!(
                    "relativePath {:?} uses ':'/'*' captures, write them as {{name}} or {{*name}}",
                    entry.relative_path
                )));
            }
            if RESERVED_PATHS.contains(&entry.relative_path.as_str()) {
                return Err(GatewayError::Config(format!(
                    "relativePath {:?} is reserved",
                    entry.relative_path
                )));
            }
            if !seen.insert(entry.relative_path.clone()) {
                return Err(GatewayError::Config(format!(
                    "duplicate relativePath {:?}",
                    entry.relative_path
                )));
            }
            matcher.insert(entry.relative_path.as_str(), ()).map_err(|e| {
                GatewayError::Config(format!("relativePath {:?}: {e}", entry.relative_path))
            })?;

            let upstream = parse_url("remote", &entry.remote)?;
            if !matches!(upstream.scheme(), "http" | "https") || upstream.host_str().is_none() {
                return Err(GatewayError::Config(format!(
                    "remote {:?} must be an absolute http(s) URL",
                    entry.remote
                )));
            }

            routes.push(Route {
                path: entry.relative_path,
                upstream,
            });
        }

        let webhook_url = parse_url("webhookUrl", &file.webhook_url)?;

        validate_limit("minute", file.limits.minute)?;
        validate_limit("hour", file.limits.hour)?;

        Ok(Self {
            routes,
            webhook_url,
            limits: file.limits,
            insecure_skip_verify: file.insecure_skip_verify,
        })
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|source| GatewayError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })
}

fn validate_limit(name: &str, limit: WindowLimit) -> Result<()> {
    if limit.span_seconds <= 0 || limit.max_count == 0 {
        return Err(GatewayError::Config(format!(
            "{name} limit needs a positive span and maximum"
        )));
    }
    Ok(())
}
