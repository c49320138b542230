//! Per-request usage accounting: client IP resolution, the labeled
//! instrument set and the recorder that feeds it.

mod client_ip;
mod headers;
mod metrics;
mod recorder;
mod registry;

pub use client_ip::{peer_host, resolve_client_ip};
pub use headers::{MAX_HEADER_VALUE_LEN, TRACKED_HEADERS, header_label_value, tracked_header_labels};
pub use metrics::*;
pub use recorder::*;
pub use registry::*;
