pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::Config;
pub use error::HarvestError;
pub use events::{AuditEvent, AuditSink, LogSink};
pub use types::*;
