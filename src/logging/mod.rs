//! Logging and observability
//!
//! Structured logging through `tracing`: a console layer plus an optional
//! JSON file layer with daily or hourly rotation. Original field values are
//! never logged; only field names, counts and value digests appear.
//!
//! # Example
//!
//! ```no_run
//! use anonymize_it::logging::init_logging;
//! use anonymize_it::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(field = "user.ip", values = 2, "Value map built");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, parse_log_level, LoggingGuard};

/// Log streaming progress as `emitted / total_expected`
///
/// The percentage is only reported when the expected total is known and
/// non-zero.
///
/// # Example
///
/// ```no_run
/// use anonymize_it::log_batch_progress;
///
/// log_batch_progress!(2500_u64, Some(10_000_u64));
/// log_batch_progress!(2500_u64, None::<u64>);
/// ```
#[macro_export]
macro_rules! log_batch_progress {
    ($emitted:expr, $total:expr) => {
        match $total {
            Some(total) if total > 0 => tracing::info!(
                emitted = $emitted,
                total_expected = total,
                progress_pct = format!("{:.1}", $emitted as f64 / total as f64 * 100.0),
                "Progress"
            ),
            _ => tracing::info!(emitted = $emitted, "Progress"),
        }
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use anonymize_it::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying operation"
        );
    };
    ($attempt:expr, $max_attempts:expr, $operation:expr, $error:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            operation = $operation,
            error = %$error,
            "Retrying operation"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use anonymize_it::log_error_with_context;
/// use anonymize_it::domain::AnonymizeError;
///
/// let error = AnonymizeError::Configuration("source is not defined".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
