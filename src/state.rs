use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prometheus::{IntCounterVec, Opts};
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::error::{Result, UsageError};
use crate::usage::{Instrument, MetricsRegistry, RegisterError, UsageRecorder};

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub registry: MetricsRegistry,
    pub recorder: RwLock<UsageRecorder>,
    pub upstream: Option<reqwest::Client>,
    config_reloads: IntCounterVec,
    config_path: Option<PathBuf>,
    shutting_down: AtomicBool,
}

impl AppState {
    /// Build state and initialize usage metrics against `registry`.
    ///
    /// A registration failure is returned to the caller, which decides
    /// whether to abort startup or run with `UsageRecorder::disabled()`.
    pub fn new(
        settings: Settings,
        registry: MetricsRegistry,
        config_path: Option<PathBuf>,
    ) -> Result<Arc<Self>> {
        let recorder = UsageRecorder::initialize(&registry, &settings.metrics.options())?;
        Self::with_recorder(settings, registry, recorder, config_path)
    }

    pub fn with_recorder(
        settings: Settings,
        registry: MetricsRegistry,
        recorder: UsageRecorder,
        config_path: Option<PathBuf>,
    ) -> Result<Arc<Self>> {
        let config_reloads = register_reload_counter(&registry)?;

        let upstream = match &settings.upstream {
            Some(upstream) => Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(upstream.timeout_seconds))
                    .build()?,
            ),
            None => None,
        };

        Ok(Arc::new(Self {
            settings,
            registry,
            recorder: RwLock::new(recorder),
            upstream,
            config_reloads,
            config_path,
            shutting_down: AtomicBool::new(false),
        }))
    }

    pub fn trigger_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Current recorder. Cheap to clone; holds no lock once returned.
    pub async fn recorder(&self) -> UsageRecorder {
        self.recorder.read().await.clone()
    }

    /// Re-read the config file and re-initialize usage metrics.
    ///
    /// Instruments that already exist in the registry are adopted, so
    /// counters continue across reloads. On failure the previous recorder
    /// stays in place.
    pub async fn reload_config(&self) -> Result<Vec<String>> {
        let result = self.reload_metrics().await;
        let status = if result.is_ok() { "success" } else { "error" };
        self.config_reloads.with_label_values(&[status]).inc();
        result
    }

    async fn reload_metrics(&self) -> Result<Vec<String>> {
        let options = match &self.config_path {
            Some(path) => Settings::load(path)
                .map_err(|e| UsageError::Config(format!("{}: {}", path.display(), e)))?
                .metrics
                .options(),
            None => self.settings.metrics.options(),
        };

        let recorder = UsageRecorder::initialize(&self.registry, &options)?;
        *self.recorder.write().await = recorder;
        tracing::info!(
            namespace = options.namespace.as_deref().unwrap_or(""),
            "reloaded usage metrics"
        );

        Ok(vec!["metrics".to_string()])
    }
}

fn register_reload_counter(registry: &MetricsRegistry) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(
        Opts::new("config_reload_total", "Total number of configuration reloads"),
        &["status"],
    )?;
    match registry.register(Instrument::Counter(counter.clone())) {
        Ok(()) => Ok(counter),
        Err(RegisterError::AlreadyRegistered {
            existing: Instrument::Counter(existing),
        }) => Ok(existing),
        Err(e) => Err(UsageError::registration("config_reload_total", e)),
    }
}
