//! Structured logging setup.
//!
//! - [`logger`] - `env_logger` configuration with aligned, colored output

pub mod logger;
