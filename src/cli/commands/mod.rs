//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod anonymize;
pub mod init;
pub mod providers;
pub mod validate;

use crate::domain::AnonymizeError;

/// Exit code for a successful run
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for configuration, provider resolution and policy conflict errors
pub const EXIT_CONFIGURATION: i32 = 2;
/// Exit code for source or sink connectivity errors
pub const EXIT_CONNECTION: i32 = 4;
/// Exit code for any other fatal error
pub const EXIT_FATAL: i32 = 5;
/// Exit code for a run stopped by SIGINT or SIGTERM
pub const EXIT_INTERRUPTED: i32 = 130;

/// Maps a fatal error to its process exit code
pub fn exit_code_for(error: &AnonymizeError) -> i32 {
    if error.is_configuration() {
        EXIT_CONFIGURATION
    } else if error.is_connectivity() {
        EXIT_CONNECTION
    } else {
        EXIT_FATAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PipelineStage, SinkError, SourceError};
    use test_case::test_case;

    #[test_case(AnonymizeError::Configuration("dest is not defined".into()) => EXIT_CONFIGURATION; "configuration")]
    #[test_case(AnonymizeError::ProviderResolution { field: "a".into(), provider: "alias".into() } => EXIT_CONFIGURATION; "provider resolution")]
    #[test_case(AnonymizeError::PolicyConflict { field: "a".into(), strategy: "word".into() } => EXIT_CONFIGURATION; "policy conflict")]
    #[test_case(AnonymizeError::Source(SourceError::ConnectionFailed("refused".into())) => EXIT_CONNECTION; "source")]
    #[test_case(AnonymizeError::Sink(SinkError::Timeout("slow".into())) => EXIT_CONNECTION; "sink")]
    #[test_case(AnonymizeError::UnmappedValue { field: "a".into(), value_digest: "00".into() } => EXIT_FATAL; "unmapped")]
    fn test_exit_code_for(error: AnonymizeError) -> i32 {
        exit_code_for(&error.at_stage(PipelineStage::Streaming))
    }
}
