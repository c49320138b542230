use thiserror::Error;

use crate::usage::RegisterError;

#[derive(Error, Debug)]
pub enum UsageError {
    // Metrics errors
    #[error("failed to register metric {name}: {source}")]
    Registration {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("metric {name} is already registered as a different instrument type")]
    InstrumentMismatch { name: String },

    #[error("invalid metric definition: {0}")]
    InvalidMetric(#[from] prometheus::Error),

    // Proxy errors
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("request body rejected: {0}")]
    Body(String),

    // Config errors
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, UsageError>;

impl UsageError {
    pub(crate) fn registration(name: &str, err: RegisterError) -> Self {
        match err {
            RegisterError::AlreadyRegistered { .. } => Self::InstrumentMismatch {
                name: name.to_string(),
            },
            RegisterError::Backend(source) => Self::Registration {
                name: name.to_string(),
                source,
            },
        }
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Body(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
