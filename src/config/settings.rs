use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::usage::MetricOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub http: HttpConfig,
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub listen: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize { 10 * 1024 * 1024 }

/// Backend that unmatched requests are forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL, e.g. "http://127.0.0.1:9000"
    pub url: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_seconds: u64,
}

fn default_upstream_timeout() -> u64 { 30 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default = "default_namespace")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub subsystem: Option<String>,
    /// Latency buckets in seconds (default: Prometheus defaults)
    #[serde(default)]
    pub buckets: Option<Vec<f64>>,
    /// Count scrapes of the metrics endpoint itself
    #[serde(default)]
    pub track_metrics_endpoint: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            namespace: default_namespace(),
            subsystem: None,
            buckets: None,
            track_metrics_endpoint: false,
        }
    }
}

fn default_metrics_path() -> String { "/metrics".to_string() }
fn default_namespace() -> Option<String> { Some("usage".to_string()) }

impl MetricsConfig {
    pub fn options(&self) -> MetricOptions {
        MetricOptions {
            namespace: self.namespace.clone().filter(|s| !s.is_empty()),
            subsystem: self.subsystem.clone().filter(|s| !s.is_empty()),
            buckets: self.buckets.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_format() -> LogFormat { LogFormat::Json }
fn default_log_level() -> String { "info".to_string() }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_seconds: default_grace_period(),
        }
    }
}

fn default_grace_period() -> u64 { 30 }

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.metrics.path.starts_with('/') {
            anyhow::bail!("metrics.path must start with '/': {}", self.metrics.path);
        }
        if let Some(buckets) = &self.metrics.buckets {
            if buckets.is_empty() {
                anyhow::bail!("metrics.buckets must not be empty");
            }
            if buckets.windows(2).any(|w| w[0] >= w[1]) {
                anyhow::bail!("metrics.buckets must be strictly increasing");
            }
        }
        if let Some(upstream) = &self.upstream {
            if !upstream.url.starts_with("http://") && !upstream.url.starts_with("https://") {
                anyhow::bail!("upstream.url must be an http(s) URL: {}", upstream.url);
            }
        }
        Ok(())
    }
}
