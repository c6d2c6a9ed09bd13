//! Request and response frames

use crate::fields::{FRAME_DELIMITER, TERMINATOR, split_fields_n};
use crate::validation::{ValidationError, validate_data, validate_field, validate_payload};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Unknown status code: {0}")]
    UnknownStatus(u16),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Response status catalog
///
/// The catalog is closed: codes outside it are rejected when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 2000,
    /// Reserved for chunked transfers; no handler emits it
    ChunkOk = 2001,
    BadRequest = 4000,
    Conflict = 4001,
    TokenMissing = 4010,
    TokenInvalid = 4011,
    Forbidden = 4030,
    NotFound = 4040,
    WrongPassword = 4041,
    /// Also used for "resource in a conflicting state"
    UsernameExists = 4090,
    InternalError = 5000,
}

impl StatusCode {
    /// Numeric wire value
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Look up a wire value in the catalog
    pub fn from_code(code: u16) -> Option<Self> {
        let status = match code {
            2000 => Self::Ok,
            2001 => Self::ChunkOk,
            4000 => Self::BadRequest,
            4001 => Self::Conflict,
            4010 => Self::TokenMissing,
            4011 => Self::TokenInvalid,
            4030 => Self::Forbidden,
            4040 => Self::NotFound,
            4041 => Self::WrongPassword,
            4090 => Self::UsernameExists,
            5000 => Self::InternalError,
            _ => return None,
        };
        Some(status)
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::ChunkOk)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One client request: `COMMAND||TOKEN||DATA`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub command: String,
    /// Empty for commands that need no identity
    pub token: String,
    /// Command-specific payload, still encoded with `||`, `&` and `|`
    pub data: String,
}

impl Request {
    pub fn new(
        command: impl Into<String>,
        token: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            token: token.into(),
            data: data.into(),
        }
    }

    /// Serialize to one terminated frame
    pub fn to_frame(&self) -> Result<String, CodecError> {
        build_request(&self.command, &self.token, &self.data)
    }
}

/// One server response: `STATUS||PAYLOAD`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub payload: String,
}

impl Response {
    pub fn new(status: StatusCode, payload: impl Into<String>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }

    pub fn ok(payload: impl Into<String>) -> Self {
        Self::new(StatusCode::Ok, payload)
    }

    /// Serialize to one terminated frame
    pub fn to_frame(&self) -> Result<String, CodecError> {
        build_response(self.status, &self.payload)
    }

    /// Payload split on the frame delimiter
    pub fn fields(&self) -> Vec<String> {
        crate::fields::split_fields(&self.payload, FRAME_DELIMITER)
    }
}

/// Build a request frame. Command and token may not contain `||` or start
/// or end with `|`; the data field is split last, so it may carry `||`, `&`
/// and `|` sub-levels. No field may contain the terminator.
pub fn build_request(command: &str, token: &str, data: &str) -> Result<String, CodecError> {
    if command.is_empty() {
        return Err(ValidationError::EmptyCommand.into());
    }
    validate_field("command", command)?;
    validate_field("token", token)?;
    validate_data(data)?;

    Ok(format!(
        "{command}{FRAME_DELIMITER}{token}{FRAME_DELIMITER}{data}{TERMINATOR}"
    ))
}

/// Build a response frame; the payload is omitted when empty.
pub fn build_response(status: StatusCode, payload: &str) -> Result<String, CodecError> {
    validate_payload(payload)?;

    if payload.is_empty() {
        Ok(format!("{}{TERMINATOR}", status.code()))
    } else {
        Ok(format!(
            "{}{FRAME_DELIMITER}{payload}{TERMINATOR}",
            status.code()
        ))
    }
}

/// Parse one request frame (terminator already stripped).
///
/// Missing trailing fields default to empty; only non-text input fails.
pub fn parse_request(frame: &[u8]) -> Result<Request, CodecError> {
    let text = frame_text(frame)?;
    let mut fields = split_fields_n(text, FRAME_DELIMITER, 3).into_iter();

    Ok(Request {
        command: fields.next().unwrap_or_default(),
        token: fields.next().unwrap_or_default(),
        data: fields.next().unwrap_or_default(),
    })
}

/// Parse one response frame (terminator already stripped).
///
/// A non-numeric status field decodes to `0`, which is outside the catalog
/// and therefore reported as [`CodecError::UnknownStatus`].
pub fn parse_response(frame: &[u8]) -> Result<Response, CodecError> {
    let text = frame_text(frame)?;
    let mut fields = split_fields_n(text, FRAME_DELIMITER, 2).into_iter();

    let code = decode_status(&fields.next().unwrap_or_default());
    let status = StatusCode::from_code(code).ok_or(CodecError::UnknownStatus(code))?;

    Ok(Response {
        status,
        payload: fields.next().unwrap_or_default(),
    })
}

/// Decode a numeric status field, `0` when it is not a number
pub fn decode_status(field: &str) -> u16 {
    field.trim().parse().unwrap_or(0)
}

fn frame_text(frame: &[u8]) -> Result<&str, CodecError> {
    let text = std::str::from_utf8(frame).map_err(|_| CodecError::InvalidUtf8)?;
    Ok(text.strip_suffix(TERMINATOR).unwrap_or(text))
}
