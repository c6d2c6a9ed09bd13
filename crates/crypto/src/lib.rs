//! Meeting Crypto - Tokens and credentials
//!
//! This crate provides:
//! - HMAC-SHA256 signing with constant-time verification
//! - Stateless bearer tokens (issue/validate, 24h lifetime)
//! - SHA-256 password hashing

mod hmac_auth;
mod password;
mod token;

pub use hmac_auth::*;
pub use password::*;
pub use token::*;
