#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use std::path::PathBuf;
use std::sync::Arc;

use usage_meter::AppState;
use usage_meter::config::{
    HttpConfig, MetricsConfig, ObservabilityConfig, Settings, ShutdownConfig, UpstreamConfig,
};
use usage_meter::usage::MetricsRegistry;

pub fn test_settings() -> Settings {
    Settings {
        http: HttpConfig {
            listen: "127.0.0.1:0".to_string(),
            max_body_bytes: 1024 * 1024,
        },
        upstream: None,
        metrics: MetricsConfig::default(),
        observability: ObservabilityConfig::default(),
        shutdown: ShutdownConfig::default(),
    }
}

pub fn settings_with_upstream(url: &str) -> Settings {
    let mut settings = test_settings();
    settings.upstream = Some(UpstreamConfig {
        url: url.to_string(),
        timeout_seconds: 5,
    });
    settings
}

pub fn test_state(settings: Settings) -> Arc<AppState> {
    AppState::new(settings, MetricsRegistry::new(), None).expect("Failed to build state")
}

pub fn test_state_with_config(settings: Settings, config_path: PathBuf) -> Arc<AppState> {
    AppState::new(settings, MetricsRegistry::new(), Some(config_path))
        .expect("Failed to build state")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Sum of every sample of `name` in a text exposition.
pub fn metric_sum(text: &str, name: &str) -> f64 {
    samples(text, name).map(|(_, value)| value).sum()
}

/// Sum of the samples of `name` whose labels include all of `labels`.
pub fn metric_value(text: &str, name: &str, labels: &[(&str, &str)]) -> f64 {
    samples(text, name)
        .filter(|(line, _)| {
            labels
                .iter()
                .all(|(k, v)| line.contains(&format!("{}=\"{}\"", k, v)))
        })
        .map(|(_, value)| value)
        .sum()
}

fn samples<'a>(text: &'a str, name: &'a str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .filter(move |line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .filter_map(|line| {
            let value = line.rsplit(' ').next()?.parse::<f64>().ok()?;
            Some((line, value))
        })
}
