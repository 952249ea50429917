//! Result type alias for deid
//!
//! This module provides a convenient Result type alias that uses DeidError
//! as the error type.

use super::errors::DeidError;

/// Result type alias for deid operations
///
/// # Examples
///
/// ```
/// use deid::domain::result::Result;
/// use deid::domain::errors::{DeidError, ProcessingError};
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ProcessingError::Crypto("bad key".to_string()).into())
/// }
/// ```
pub type Result<T> = std::result::Result<T, DeidError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ProcessingError;

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(ProcessingError::Crypto("x".to_string()).into());
        assert!(result.is_err());
    }

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}
