mod handlers;
mod routes;
mod usage;

pub use routes::*;
pub use usage::{snapshot_request, usage_metrics};
