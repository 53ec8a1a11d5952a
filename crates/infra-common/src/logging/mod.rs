//! Logging infrastructure built on `tracing`.

mod setup;

pub use setup::{parse_log_level, setup_logging, LoggingConfig, LoggingError};
