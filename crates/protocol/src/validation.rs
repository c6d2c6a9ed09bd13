//! Field and payload validation for outbound frames

use crate::fields::{FRAME_DELIMITER, LIST_DELIMITER, TERMINATOR};
use thiserror::Error;

/// Validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Field `{0}` contains the frame delimiter")]
    ContainsDelimiter(&'static str),

    #[error("Field `{0}` contains the line terminator")]
    ContainsTerminator(&'static str),

    #[error("Field `{0}` starts or ends with `|`")]
    EdgePipe(&'static str),

    #[error("Command must not be empty")]
    EmptyCommand,

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Default maximum size of one inbound frame, terminator excluded (8KB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8192;

/// Maximum allowed response payload size (64KB)
pub const MAX_PAYLOAD_SIZE: usize = 65536;

/// Validate one request field: it must survive the top-level split intact.
///
/// A `|` at either edge would merge with the neighbouring `||` and move the
/// split point, so it is rejected along with the delimiter itself.
pub fn validate_field(name: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.contains(TERMINATOR) {
        return Err(ValidationError::ContainsTerminator(name));
    }
    if value.contains(FRAME_DELIMITER) {
        return Err(ValidationError::ContainsDelimiter(name));
    }
    if value.starts_with(LIST_DELIMITER) || value.ends_with(LIST_DELIMITER) {
        return Err(ValidationError::EdgePipe(name));
    }
    Ok(())
}

/// Validate the data field of a request. It is the last top-level field, so
/// it may carry `||` sub-levels; only the terminator is rejected.
pub fn validate_data(value: &str) -> Result<(), ValidationError> {
    if value.contains(TERMINATOR) {
        return Err(ValidationError::ContainsTerminator("data"));
    }
    Ok(())
}

/// Validate a response payload. Payloads carry `||`-joined records, so only
/// the terminator and the size cap are checked.
pub fn validate_payload(payload: &str) -> Result<(), ValidationError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ValidationError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    if payload.contains(TERMINATOR) {
        return Err(ValidationError::ContainsTerminator("payload"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_field() {
        assert!(validate_field("data", "alice&secret").is_ok());
        assert!(validate_field("token", "").is_ok());
    }

    #[test]
    fn test_field_with_delimiter() {
        let result = validate_field("data", "a||b");
        assert_eq!(result, Err(ValidationError::ContainsDelimiter("data")));
    }

    #[test]
    fn test_field_with_terminator() {
        let result = validate_field("command", "LOGIN\r\n");
        assert_eq!(result, Err(ValidationError::ContainsTerminator("command")));
    }

    #[test]
    fn test_field_with_edge_pipe() {
        assert_eq!(
            validate_field("command", "A|"),
            Err(ValidationError::EdgePipe("command"))
        );
        assert_eq!(
            validate_field("token", "|b"),
            Err(ValidationError::EdgePipe("token"))
        );
        assert!(validate_field("token", "a|b").is_ok());
    }

    #[test]
    fn test_data_may_hold_delimiters() {
        assert!(validate_data("bob||secret||student").is_ok());
        assert_eq!(
            validate_data("x\r\ny"),
            Err(ValidationError::ContainsTerminator("data"))
        );
    }

    #[test]
    fn test_payload_may_hold_delimiters() {
        assert!(validate_payload("LOGIN_SUCCESS||abc||student").is_ok());
    }

    #[test]
    fn test_payload_too_large() {
        let payload = "x".repeat(MAX_PAYLOAD_SIZE + 1);
        let result = validate_payload(&payload);
        assert!(matches!(result, Err(ValidationError::PayloadTooLarge { .. })));
    }
}
