//! Common infrastructure for the VKYC signaling stack.
//!
//! Currently this crate provides the logging layer shared by
//! `vkyc-signal-core` and `vkyc-session-core`: a small configuration
//! type and a one-shot `tracing-subscriber` setup routine.

pub mod logging;

pub use logging::{setup_logging, LoggingConfig};
