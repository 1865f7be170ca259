//! Top-level error type shared across crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrataError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
}
