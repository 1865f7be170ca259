//! Shared utilities for Strata binaries.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingError};
