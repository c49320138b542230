use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;

use super::client_ip::resolve_client_ip;
use super::headers::tracked_header_labels;
use super::metrics::{MetricOptions, MetricSet};
use super::registry::MetricsRegistry;
use crate::error::Result;

/// What the recorder needs to know about one completed request.
#[derive(Debug, Clone, Default)]
pub struct RequestSnapshot {
    pub method: String,
    pub host: String,
    pub path: String,
    /// Path plus query string, as requested.
    pub full_url: String,
    /// Transport peer, `host:port` or `[v6]:port`.
    pub peer_addr: String,
    pub headers: HeaderMap,
    pub status_code: u16,
    pub elapsed_seconds: f64,
}

impl RequestSnapshot {
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_seconds = elapsed.as_secs_f64();
        self
    }
}

/// Record one completed request against `set`.
///
/// Never fails: with no instrument set the request is logged and dropped.
pub fn record_request(set: Option<&MetricSet>, snapshot: &RequestSnapshot) {
    let Some(set) = set else {
        tracing::error!(
            method = %snapshot.method,
            path = %snapshot.path,
            "usage metrics not initialized, request not recorded"
        );
        return;
    };

    let status_code = snapshot.status_code.to_string();
    let method = snapshot.method.as_str();
    let host = snapshot.host.as_str();
    let client_ip = resolve_client_ip(&snapshot.headers, &snapshot.peer_addr);

    set.requests_total
        .with_label_values(&[status_code.as_str(), method, host, snapshot.path.as_str()])
        .inc();
    set.requests_by_ip
        .with_label_values(&[client_ip.as_str(), status_code.as_str(), method])
        .inc();
    set.requests_by_url
        .with_label_values(&[snapshot.full_url.as_str(), method, status_code.as_str()])
        .inc();
    set.request_duration
        .with_label_values(&[method, status_code.as_str(), host])
        .observe(snapshot.elapsed_seconds);

    for (header_name, header_value) in tracked_header_labels(&snapshot.headers) {
        set.requests_by_headers
            .with_label_values(&[header_name, header_value.as_str(), method, status_code.as_str()])
            .inc();
    }

    tracing::debug!(
        client_ip = %client_ip,
        method = %method,
        url = %snapshot.full_url,
        status = %status_code,
        duration = snapshot.elapsed_seconds,
        "collected usage metrics"
    );
}

/// Per-request entry point bound to one instrument set.
#[derive(Clone, Default)]
pub struct UsageRecorder {
    metrics: Option<Arc<MetricSet>>,
}

impl UsageRecorder {
    pub fn new(metrics: MetricSet) -> Self {
        Self {
            metrics: Some(Arc::new(metrics)),
        }
    }

    /// A recorder with no instruments. Every `record` call logs and no-ops.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Initialize the instrument set against `registry` and bind to it.
    pub fn initialize(registry: &MetricsRegistry, options: &MetricOptions) -> Result<Self> {
        Ok(Self::new(MetricSet::initialize(registry, options)?))
    }

    pub fn is_enabled(&self) -> bool {
        self.metrics.is_some()
    }

    pub fn metrics(&self) -> Option<&MetricSet> {
        self.metrics.as_deref()
    }

    pub fn record(&self, snapshot: &RequestSnapshot) {
        record_request(self.metrics(), snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn recorder() -> (MetricsRegistry, UsageRecorder) {
        let registry = MetricsRegistry::new();
        let recorder = UsageRecorder::initialize(&registry, &MetricOptions::default()).unwrap();
        (registry, recorder)
    }

    fn snapshot() -> RequestSnapshot {
        RequestSnapshot {
            method: "GET".to_string(),
            host: "example.com".to_string(),
            path: "/api/v1/users".to_string(),
            full_url: "/api/v1/users?page=2".to_string(),
            peer_addr: "192.168.1.100:54321".to_string(),
            headers: HeaderMap::new(),
            status_code: 200,
            elapsed_seconds: 0.042,
        }
    }

    #[test]
    fn test_record_updates_every_instrument() {
        let (_, recorder) = recorder();
        recorder.record(&snapshot());

        let set = recorder.metrics().unwrap();
        assert_eq!(
            set.requests_total
                .with_label_values(&["200", "GET", "example.com", "/api/v1/users"])
                .get(),
            1
        );
        assert_eq!(
            set.requests_by_ip
                .with_label_values(&["192.168.1.100", "200", "GET"])
                .get(),
            1
        );
        assert_eq!(
            set.requests_by_url
                .with_label_values(&["/api/v1/users?page=2", "GET", "200"])
                .get(),
            1
        );
        let duration = set
            .request_duration
            .with_label_values(&["GET", "200", "example.com"]);
        assert_eq!(duration.get_sample_count(), 1);
        assert!((duration.get_sample_sum() - 0.042).abs() < 1e-9);
    }

    #[test]
    fn test_authorization_recorded_as_present() {
        let (registry, recorder) = recorder();
        let mut snap = snapshot();
        snap.headers
            .insert("authorization", HeaderValue::from_static("Bearer xyz"));
        recorder.record(&snap);

        let set = recorder.metrics().unwrap();
        assert_eq!(
            set.requests_by_headers
                .with_label_values(&["Authorization", "present", "GET", "200"])
                .get(),
            1
        );
        assert!(!registry.encode_text().unwrap().contains("xyz"));
    }

    #[test]
    fn test_long_header_value_truncated() {
        let (_, recorder) = recorder();
        let mut snap = snapshot();
        let long = "b".repeat(150);
        snap.headers
            .insert("user-agent", HeaderValue::from_str(&long).unwrap());
        recorder.record(&snap);

        let expected = format!("{}...", "b".repeat(100));
        let set = recorder.metrics().unwrap();
        assert_eq!(
            set.requests_by_headers
                .with_label_values(&["User-Agent", expected.as_str(), "GET", "200"])
                .get(),
            1
        );
    }

    #[test]
    fn test_untracked_header_not_recorded() {
        let (registry, recorder) = recorder();
        let mut snap = snapshot();
        snap.headers
            .insert("x-custom-header", HeaderValue::from_static("custom-value"));
        recorder.record(&snap);

        let text = registry.encode_text().unwrap();
        assert!(!text.contains("X-Custom-Header"));
        assert!(!text.contains("custom-value"));
    }

    #[test]
    fn test_disabled_recorder_is_noop() {
        let recorder = UsageRecorder::disabled();
        assert!(!recorder.is_enabled());
        recorder.record(&snapshot());
        record_request(None, &snapshot());
    }

    #[test]
    fn test_with_elapsed() {
        let snap = snapshot().with_elapsed(Duration::from_millis(1500));
        assert!((snap.elapsed_seconds - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_records_are_exact() {
        let (_, recorder) = recorder();
        let threads = 8;
        let per_thread = 250;

        std::thread::scope(|s| {
            for _ in 0..threads {
                let recorder = recorder.clone();
                s.spawn(move || {
                    for _ in 0..per_thread {
                        recorder.record(&snapshot());
                    }
                });
            }
        });

        let set = recorder.metrics().unwrap();
        let n = (threads * per_thread) as u64;
        assert_eq!(
            set.requests_total
                .with_label_values(&["200", "GET", "example.com", "/api/v1/users"])
                .get(),
            n
        );
        assert_eq!(
            set.request_duration
                .with_label_values(&["GET", "200", "example.com"])
                .get_sample_count(),
            n
        );
    }
}
