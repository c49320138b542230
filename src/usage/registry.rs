//! Shared metrics registry with idempotent registration.
//!
//! `prometheus::Registry` reports a duplicate registration as a bare
//! `Error::AlreadyReg`. Re-initializing against a long-lived registry needs the
//! already-registered instrument back, so this wrapper keeps a handle to every
//! instrument it registered and hands it out with the duplicate error.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};
use thiserror::Error;

/// A registrable, labeled instrument.
#[derive(Clone)]
pub enum Instrument {
    Counter(IntCounterVec),
    /// Histogram vec plus the bucket bounds it was built with.
    Histogram { vec: HistogramVec, buckets: Vec<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter,
    Histogram,
}

impl Instrument {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            Self::Counter(_) => InstrumentKind::Counter,
            Self::Histogram { .. } => InstrumentKind::Histogram,
        }
    }

    /// Bucket upper bounds, for histograms.
    pub fn buckets(&self) -> Option<&[f64]> {
        match self {
            Self::Counter(_) => None,
            Self::Histogram { buckets, .. } => Some(buckets.as_slice()),
        }
    }

    /// Fully-qualified name, including namespace and subsystem.
    pub fn fq_name(&self) -> String {
        self.with_desc(|desc| desc.fq_name.clone())
    }

    pub fn label_names(&self) -> Vec<String> {
        self.with_desc(|desc| desc.variable_labels.clone())
    }

    fn with_desc<T>(&self, f: impl Fn(&prometheus::core::Desc) -> T) -> T {
        let descs = match self {
            Self::Counter(c) => c.desc(),
            Self::Histogram { vec, .. } => vec.desc(),
        };
        // Metric vecs always carry exactly one descriptor.
        f(descs[0])
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Self::Counter(c) => Box::new(c.clone()),
            Self::Histogram { vec, .. } => Box::new(vec.clone()),
        }
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("kind", &self.kind())
            .field("name", &self.fq_name())
            .field("labels", &self.label_names())
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum RegisterError {
    /// An instrument with the same name and label schema is already
    /// registered. `existing` is the live handle to adopt.
    #[error("metric already registered")]
    AlreadyRegistered { existing: Instrument },

    #[error(transparent)]
    Backend(#[from] prometheus::Error),
}

/// Cloneable handle to a process-wide registry. Clones share state.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Registry,
    registered: Arc<Mutex<HashMap<String, Instrument>>>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Wrap an existing registry. Collectors registered on it directly are
    /// not adoptable; registering over them is reported as a backend error.
    pub fn with_registry(inner: Registry) -> Self {
        Self {
            inner,
            registered: Arc::default(),
        }
    }

    pub fn register(&self, instrument: Instrument) -> Result<(), RegisterError> {
        let name = instrument.fq_name();
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match self.inner.register(instrument.collector()) {
            Ok(()) => {
                registered.insert(name, instrument);
                Ok(())
            }
            Err(prometheus::Error::AlreadyReg) => {
                let Some(existing) = registered.get(&name) else {
                    return Err(RegisterError::Backend(prometheus::Error::AlreadyReg));
                };
                if existing.label_names() != instrument.label_names() {
                    return Err(RegisterError::Backend(prometheus::Error::Msg(format!(
                        "{} already registered with labels {:?}, refusing {:?}",
                        name,
                        existing.label_names(),
                        instrument.label_names()
                    ))));
                }
                Err(RegisterError::AlreadyRegistered {
                    existing: existing.clone(),
                })
            }
            Err(e) => Err(RegisterError::Backend(e)),
        }
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner.gather()
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn encode_text(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Registry {
        &self.inner
    }
}
