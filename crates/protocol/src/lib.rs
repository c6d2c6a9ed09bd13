//! Meeting Protocol - Framing and field encoding
//!
//! This crate defines the text protocol spoken between clients and the
//! meeting server:
//! - `split_fields`: delimiter-based tokenizer reused at every nesting level
//! - `Request`/`Response`: one frame each, `COMMAND||TOKEN||DATA\r\n` and
//!   `STATUS||PAYLOAD\r\n`
//! - `StatusCode`: the closed status catalog
//! - `FrameBuffer`: bounded terminator scanner for stream transports
//! - `Role`/`TokenClaims`: identity carried inside bearer tokens

mod auth;
mod buffer;
mod fields;
mod frame;
mod validation;

pub use auth::*;
pub use buffer::*;
pub use fields::*;
pub use frame::*;
pub use validation::*;
