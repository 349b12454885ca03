//! Domain error types
//!
//! This module defines the error hierarchy for anonymize-it. Every fatal
//! condition the pipeline can hit has its own variant so the CLI can name the
//! failing stage and field. Backend errors are wrapped in [`SourceError`] and
//! [`SinkError`] and never expose third-party HTTP client types.

use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Main error type
///
/// This is the primary error type used throughout the library.
#[derive(Debug, Error)]
pub enum AnonymizeError {
    /// Missing or malformed source, dest, or masking directive
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A directive names a strategy that has no registered generator
    #[error("Provider resolution error: field '{field}' uses unknown provider '{provider}'")]
    ProviderResolution { field: String, provider: String },

    /// Provider inference could not settle on a single type for a field
    #[error("Provider inference error: field '{field}': {message}")]
    ProviderInference { field: String, message: String },

    /// Source store errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Destination sink errors
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// A sensitive field was also given a generator or bucket strategy
    #[error("Policy conflict: field '{field}' is marked sensitive but is also masked with '{strategy}'")]
    PolicyConflict { field: String, strategy: String },

    /// A value reached the transformer that the enumeration pass never saw
    #[error("Unmapped value error: field '{field}' holds a value absent from the value map (digest {value_digest})")]
    UnmappedValue { field: String, value_digest: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Any fatal error, tagged with the pipeline stage that raised it
    #[error("{stage} stage failed: {source}")]
    Pipeline {
        stage: PipelineStage,
        #[source]
        source: Box<AnonymizeError>,
    },
}

/// Pipeline stage used to tag fatal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Pre-flight validation of the configured source and sink
    Init,
    /// Value map enumeration, provider inference, and resolution
    Mapping,
    /// Batch streaming, transformation, and sink writes
    Streaming,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Mapping => write!(f, "mapping"),
            Self::Streaming => write!(f, "streaming"),
        }
    }
}

/// Source store errors
///
/// Errors raised while counting, enumerating, or scanning the source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to connect to the source
    #[error("Failed to connect to source: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Invalid response from the source
    #[error("Invalid response from source: {0}")]
    InvalidResponse(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// A stored document could not be read as a record
    #[error("Invalid record format: {0}")]
    InvalidFormat(String),
}

/// Destination sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to connect to the sink
    #[error("Failed to connect to sink: {0}")]
    ConnectionFailed(String),

    /// Failed to write a batch
    #[error("Failed to write batch: {0}")]
    WriteFailed(String),

    /// Some documents of a bulk request were rejected
    #[error("Bulk operation failed: {successful}/{total} succeeded")]
    BulkOperationFailed { successful: usize, total: usize },

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

impl AnonymizeError {
    /// Whether the error is worth retrying
    ///
    /// Connectivity failures, timeouts, throttling (429) and server errors
    /// are transient; everything else fails immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Source(e) => matches!(
                e,
                SourceError::ConnectionFailed(_)
                    | SourceError::Timeout(_)
                    | SourceError::ServerError { .. }
                    | SourceError::ClientError { status: 429, .. }
            ),
            Self::Sink(e) => matches!(
                e,
                SinkError::ConnectionFailed(_)
                    | SinkError::Timeout(_)
                    | SinkError::ServerError { .. }
                    | SinkError::ClientError { status: 429, .. }
            ),
            _ => false,
        }
    }

    /// Tag the error with the stage it occurred in
    ///
    /// Errors that already carry a stage are returned unchanged.
    pub fn at_stage(self, stage: PipelineStage) -> Self {
        match self {
            Self::Pipeline { .. } => self,
            other => Self::Pipeline {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any stage tag removed
    pub fn root(&self) -> &AnonymizeError {
        match self {
            Self::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is a pre-flight configuration class error
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.root(),
            Self::Configuration(_)
                | Self::Validation(_)
                | Self::ProviderResolution { .. }
                | Self::PolicyConflict { .. }
        )
    }

    /// Whether this is a source or sink connectivity error
    pub fn is_connectivity(&self) -> bool {
        matches!(self.root(), Self::Source(_) | Self::Sink(_))
    }
}

/// Short, non-reversible digest of a sensitive value for diagnostics
pub fn value_digest(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

// Conversion from std::io::Error
impl From<std::io::Error> for AnonymizeError {
    fn from(err: std::io::Error) -> Self {
        AnonymizeError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for AnonymizeError {
    fn from(err: serde_json::Error) -> Self {
        AnonymizeError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for AnonymizeError {
    fn from(err: toml::de::Error) -> Self {
        AnonymizeError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnonymizeError::Configuration("source not defined".to_string());
        assert_eq!(err.to_string(), "Configuration error: source not defined");
    }

    #[test]
    fn test_source_error_conversion() {
        let source_err = SourceError::ConnectionFailed("Network error".to_string());
        let err: AnonymizeError = source_err.into();
        assert!(matches!(err, AnonymizeError::Source(_)));
    }

    #[test]
    fn test_sink_error_conversion() {
        let sink_err = SinkError::BulkOperationFailed {
            successful: 3,
            total: 5,
        };
        let err: AnonymizeError = sink_err.into();
        assert!(matches!(err, AnonymizeError::Sink(_)));
        assert!(err.to_string().contains("3/5"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AnonymizeError::from(SourceError::Timeout("10s".to_string())).is_transient());
        assert!(AnonymizeError::from(SinkError::ServerError {
            status: 503,
            message: "unavailable".to_string()
        })
        .is_transient());
        assert!(AnonymizeError::from(SourceError::ClientError {
            status: 429,
            message: "slow down".to_string()
        })
        .is_transient());
        assert!(!AnonymizeError::from(SourceError::ClientError {
            status: 400,
            message: "bad query".to_string()
        })
        .is_transient());
        assert!(!AnonymizeError::Configuration("x".to_string()).is_transient());
    }

    #[test]
    fn test_stage_tagging_names_stage_and_field() {
        let err = AnonymizeError::PolicyConflict {
            field: "message".to_string(),
            strategy: "ipv4".to_string(),
        }
        .at_stage(PipelineStage::Mapping);

        let rendered = err.to_string();
        assert!(rendered.starts_with("mapping stage failed"));
        assert!(rendered.contains("'message'"));
        assert!(err.is_configuration());

        // Re-tagging keeps the original stage
        let retagged = err.at_stage(PipelineStage::Streaming);
        assert!(retagged.to_string().starts_with("mapping stage failed"));
    }

    #[test]
    fn test_value_digest_hides_value() {
        let digest = value_digest("10.0.0.1");
        assert_eq!(digest.len(), 12);
        assert!(!digest.contains("10.0.0.1"));
        assert_eq!(digest, value_digest("10.0.0.1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: AnonymizeError = io_err.into();
        assert!(matches!(err, AnonymizeError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: AnonymizeError = toml_err.into();
        assert!(matches!(err, AnonymizeError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = AnonymizeError::Validation("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
