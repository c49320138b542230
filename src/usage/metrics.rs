use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

use super::registry::{Instrument, MetricsRegistry, RegisterError};
use crate::error::{Result, UsageError};

pub const REQUESTS_TOTAL: &str = "requests_total";
pub const REQUESTS_BY_IP: &str = "requests_by_ip_total";
pub const REQUESTS_BY_URL: &str = "requests_by_url_total";
pub const REQUESTS_BY_HEADERS: &str = "requests_by_headers_total";
pub const REQUEST_DURATION: &str = "request_duration_seconds";

/// Naming and bucket options for the instrument set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricOptions {
    pub namespace: Option<String>,
    pub subsystem: Option<String>,
    /// Latency buckets in seconds. `None` uses the Prometheus defaults.
    pub buckets: Option<Vec<f64>>,
}

impl MetricOptions {
    fn counter_opts(&self, name: &str, help: &str) -> Opts {
        let mut opts = Opts::new(name, help);
        if let Some(ns) = &self.namespace {
            opts = opts.namespace(ns.clone());
        }
        if let Some(ss) = &self.subsystem {
            opts = opts.subsystem(ss.clone());
        }
        opts
    }

    fn histogram_opts(&self, name: &str, help: &str) -> HistogramOpts {
        let buckets = self
            .buckets
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| prometheus::DEFAULT_BUCKETS.to_vec());
        HistogramOpts::from(self.counter_opts(name, help)).buckets(buckets)
    }
}

/// The five request instruments.
///
/// Cloning is cheap; clones update the same underlying series.
#[derive(Clone)]
pub struct MetricSet {
    pub requests_total: IntCounterVec,
    pub requests_by_ip: IntCounterVec,
    pub requests_by_url: IntCounterVec,
    pub requests_by_headers: IntCounterVec,
    pub request_duration: HistogramVec,
}

impl MetricSet {
    /// Build the instruments and register them with `registry`.
    ///
    /// Instruments already registered under the same name are adopted, so
    /// running this again against a long-lived registry (config reload)
    /// continues the existing series. Any other registration failure is
    /// returned and nothing after it is registered.
    pub fn initialize(registry: &MetricsRegistry, options: &MetricOptions) -> Result<Self> {
        let requests_total = adopt_counter(
            registry,
            IntCounterVec::new(
                options.counter_opts(
                    REQUESTS_TOTAL,
                    "Total number of HTTP requests by status code, method, host and path",
                ),
                &["status_code", "method", "host", "path"],
            )?,
        )?;

        let requests_by_ip = adopt_counter(
            registry,
            IntCounterVec::new(
                options.counter_opts(REQUESTS_BY_IP, "Total number of requests by client IP address"),
                &["client_ip", "status_code", "method"],
            )?,
        )?;

        let requests_by_url = adopt_counter(
            registry,
            IntCounterVec::new(
                options.counter_opts(
                    REQUESTS_BY_URL,
                    "Total number of requests by exact URL path and query parameters",
                ),
                &["full_url", "method", "status_code"],
            )?,
        )?;

        let requests_by_headers = adopt_counter(
            registry,
            IntCounterVec::new(
                options.counter_opts(
                    REQUESTS_BY_HEADERS,
                    "Total number of requests by specific header values",
                ),
                &["header_name", "header_value", "method", "status_code"],
            )?,
        )?;

        let request_duration = adopt_histogram(
            registry,
            options.histogram_opts(REQUEST_DURATION, "HTTP request duration in seconds"),
            &["method", "status_code", "host"],
        )?;

        Ok(Self {
            requests_total,
            requests_by_ip,
            requests_by_url,
            requests_by_headers,
            request_duration,
        })
    }
}

fn adopt_counter(registry: &MetricsRegistry, counter: IntCounterVec) -> Result<IntCounterVec> {
    let instrument = Instrument::Counter(counter.clone());
    let name = instrument.fq_name();
    match registry.register(instrument) {
        Ok(()) => Ok(counter),
        Err(RegisterError::AlreadyRegistered {
            existing: Instrument::Counter(existing),
        }) => {
            tracing::debug!(metric = %name, "metric already registered, using existing");
            Ok(existing)
        }
        Err(e) => Err(UsageError::registration(&name, e)),
    }
}

fn adopt_histogram(
    registry: &MetricsRegistry,
    opts: HistogramOpts,
    label_names: &[&str],
) -> Result<HistogramVec> {
    let buckets = opts.buckets.clone();
    let histogram = HistogramVec::new(opts, label_names)?;
    let instrument = Instrument::Histogram {
        vec: histogram.clone(),
        buckets: buckets.clone(),
    };
    let name = instrument.fq_name();
    match registry.register(instrument) {
        Ok(()) => Ok(histogram),
        Err(RegisterError::AlreadyRegistered {
            existing:
                Instrument::Histogram {
                    vec: existing,
                    buckets: active,
                },
        }) => {
            // Buckets are fixed at first registration
            if active != buckets {
                tracing::warn!(
                    metric = %name,
                    configured = ?buckets,
                    active = ?active,
                    "histogram already registered with different buckets, keeping existing buckets"
                );
            } else {
                tracing::debug!(metric = %name, "metric already registered, using existing");
            }
            Ok(existing)
        }
        Err(e) => Err(UsageError::registration(&name, e)),
    }
}
