pub mod api;
pub mod config;
pub mod error;
pub mod observability;
pub mod usage;

mod state;

pub use config::*;
pub use state::*;
