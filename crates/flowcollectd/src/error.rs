//! Error types for flowcollectd
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Structured error types with contextual information
//! - AU-3: Content of Audit Records - Errors include sufficient detail for audit

use crate::templates::TemplateFamily;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors surfaced by the collector pipeline itself
///
/// Per-packet decode failures never appear here; they are contained by the
/// decode loop and reported through logs and metrics.
///
/// # NIST Controls
/// - SI-11(a): Generate error messages providing information necessary for corrective actions
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Bind address could not be resolved to a socket address
    #[error("Invalid bind address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// UDP socket could not be created or bound
    /// NIST: SC-7 (Boundary Protection) - Network listener errors
    #[error("Failed to bind UDP socket on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// UDP receive failed; fatal to the ingestor
    #[error("UDP receive failed on {address}: {source}")]
    Socket {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    /// NIST: CM-6 (Configuration Settings) - Configuration validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lifecycle misuse, e.g. starting the decode loop twice
    #[error("Invalid collector state: {0}")]
    State(String),

    /// A pipeline task panicked or was aborted
    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Prometheus registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Outcome of a failed decode attempt
///
/// The variants map onto the decode loop's handling: `UnsupportedVersion`
/// is discarded, `TemplateNotRecognized` is held for retry and `Malformed`
/// is dropped as a transient fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Leading version field is not NetFlow v1/v5/v9 or IPFIX
    #[error("Unsupported export version {0}")]
    UnsupportedVersion(u16),

    /// A data set references a template the exporter has not announced yet
    #[error("{family} template {template_id} not recognized")]
    TemplateNotRecognized {
        family: TemplateFamily,
        template_id: u16,
    },

    /// Truncated or inconsistent packet contents
    /// NIST: SI-10 (Information Input Validation) - Reject malformed input
    #[error("Malformed {context}: {reason}")]
    Malformed {
        context: &'static str,
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(context: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            context,
            reason: reason.into(),
        }
    }

    /// Whether a later template announcement could make this packet decodable
    pub fn is_template_miss(&self) -> bool {
        matches!(self, Self::TemplateNotRecognized { .. })
    }
}

/// Retrieval failure on the output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Nothing became available within the requested wait
    #[error("no decoded packet available")]
    Empty,

    /// The decode loop is gone and every queued packet has been consumed
    #[error("output channel closed")]
    Closed,
}
