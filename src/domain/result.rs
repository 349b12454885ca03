//! Result type alias for anonymize-it
//!
//! This module provides a convenient Result type alias that uses
//! [`AnonymizeError`] as the error type.

use super::errors::AnonymizeError;

/// Result type alias for anonymize-it operations
///
/// # Examples
///
/// ```
/// use anonymize_it::domain::result::Result;
/// use anonymize_it::domain::errors::AnonymizeError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(AnonymizeError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, AnonymizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(AnonymizeError::Validation("test error".to_string()));
        assert!(result.is_err());
    }
}
