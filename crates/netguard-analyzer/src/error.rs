//! Error types for the analyzer

use thiserror::Error;

/// Analyzer errors
///
/// Packet analysis itself is infallible; these cover configuration and
/// output serialization.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Invalid or unreadable configuration
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for the analyzer
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Structural problem found while decoding a packet.
///
/// Recorded on the [`PacketContext`](crate::PacketContext) as a tamper
/// indicator; never surfaced as an `Err`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// Zero-length capture
    #[error("empty packet")]
    EmptyPacket,

    /// IP version nibble is neither 4 nor 6
    #[error("unsupported IP version {0}")]
    UnsupportedVersion(u8),

    /// Fewer bytes than the fixed header of `layer`
    #[error("{layer} header too short: need {needed} bytes, have {available}")]
    HeaderTooShort {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    /// Header-length field points outside the captured bytes
    #[error("{layer} header length {declared} out of bounds ({available} bytes available)")]
    HeaderLengthOutOfBounds {
        layer: &'static str,
        declared: usize,
        available: usize,
    },
}
