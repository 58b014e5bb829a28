//! Error types for the QLX harmonic-fingerprint pipeline.
//!
//! Every fallible core operation returns [`Error`]. The core never retries,
//! never logs, and never produces a partial artifact: a failure means
//! nothing was written or returned.

use thiserror::Error;

/// Result type alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy for the QLX core (see design doc §7).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed seed, non-finite input, length mismatch, or unknown enum value.
    #[error("invalid input: {0}")]
    InputError(String),

    /// Canonicalization or parsing rejected a value (non-finite float, duplicate
    /// key, non-UTF-8 string, or an unknown member during parse).
    #[error("encoding error: {0}")]
    EncodingError(String),

    /// Missing key, wrong key length, hex decode failure, or signature mismatch.
    #[error("signature error: {0}")]
    SignatureError(String),

    /// A KDF refused the requested parameters after exhausting its fallback
    /// strategy (e.g. scrypt memory degraded down to its floor and still failed).
    #[error("resource limit exceeded: {0} (attempted {attempted}, floor {floor})")]
    ResourceLimit {
        /// Human-readable description of what was attempted.
        detail: String,
        /// The parameter value that was attempted.
        attempted: u64,
        /// The floor value below which the implementation refuses to degrade further.
        floor: u64,
        #[source]
        source: Option<Box<Error>>,
    },
}

impl Error {
    /// Construct an [`Error::InputError`].
    pub fn input<T: std::fmt::Display>(msg: T) -> Self {
        Self::InputError(msg.to_string())
    }

    /// Construct an [`Error::EncodingError`].
    pub fn encoding<T: std::fmt::Display>(msg: T) -> Self {
        Self::EncodingError(msg.to_string())
    }

    /// Construct an [`Error::SignatureError`].
    pub fn signature<T: std::fmt::Display>(msg: T) -> Self {
        Self::SignatureError(msg.to_string())
    }

    /// Construct an [`Error::ResourceLimit`].
    pub fn resource_limit<T: std::fmt::Display>(detail: T, attempted: u64, floor: u64) -> Self {
        Self::ResourceLimit {
            detail: detail.to_string(),
            attempted,
            floor,
            source: None,
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Self::SignatureError(format!("hex decode failed: {err}"))
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        Self::SignatureError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(Error::input("bad seed").to_string(), "invalid input: bad seed");
        assert_eq!(
            Error::encoding("duplicate key").to_string(),
            "encoding error: duplicate key"
        );
    }
}
