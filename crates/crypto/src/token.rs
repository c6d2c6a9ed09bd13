//! Stateless bearer tokens
//!
//! A token is `base64(plain) "." base64(hmac)` where `plain` is
//! `user_id:username:role:issued_at:nonce`. The server keeps no session
//! table: a token stays valid until it ages out, and logout is advisory.

use crate::hmac_auth::{HmacAuthenticator, HmacError, SECRET_LEN};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use meeting_protocol::{Role, TokenClaims, join_fields, split_fields};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::trace;

/// Separates the plain token fields
pub const TOKEN_FIELD_DELIMITER: &str = ":";

/// Separates the encoded claims from the encoded signature
pub const SIGNATURE_SEPARATOR: char = '.';

/// Length of the random nonce embedded in each token
pub const NONCE_LENGTH: usize = 16;

/// Default token lifetime (24 hours)
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;

/// Tokens issued further than this in the future are rejected
pub const MAX_CLOCK_SKEW_SECS: u64 = 300;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token missing")]
    Missing,

    #[error("Token malformed")]
    Malformed,

    #[error("Token signature missing")]
    Unsigned,

    #[error("Token signature invalid")]
    BadSignature,

    #[error("Token expired: issued {age}s ago")]
    Expired { age: u64 },

    #[error("Token issued in the future")]
    NotYetValid,

    #[error("Signing failed: {0}")]
    Signing(#[from] HmacError),
}

/// Validation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Lifetime in seconds
    pub ttl_secs: u64,

    /// Accept legacy tokens that carry no signature
    pub accept_unsigned: bool,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            accept_unsigned: false,
        }
    }
}

/// Issues and validates bearer tokens
#[derive(Debug, Clone)]
pub struct TokenService {
    hmac: HmacAuthenticator,
    policy: TokenPolicy,
}

impl TokenService {
    pub fn new(secret: [u8; SECRET_LEN], policy: TokenPolicy) -> Self {
        Self {
            hmac: HmacAuthenticator::new(secret),
            policy,
        }
    }

    /// Issue a token stamped with the current time
    pub fn issue(&self, user_id: i64, username: &str, role: Role) -> Result<String, TokenError> {
        self.issue_at(user_id, username, role, unix_now())
    }

    /// Issue a token stamped with `now` (seconds since epoch)
    pub fn issue_at(
        &self,
        user_id: i64,
        username: &str,
        role: Role,
        now: u64,
    ) -> Result<String, TokenError> {
        let plain = join_fields(
            [
                user_id.to_string(),
                username.to_owned(),
                role.to_string(),
                now.to_string(),
                generate_nonce(),
            ],
            TOKEN_FIELD_DELIMITER,
        );
        let signature = self.hmac.compute(plain.as_bytes())?;

        Ok(format!(
            "{}{SIGNATURE_SEPARATOR}{}",
            STANDARD.encode(plain),
            STANDARD.encode(signature)
        ))
    }

    /// Validate a token against the current time
    pub fn validate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.validate_at(token, unix_now())
    }

    /// Validate a token against `now` (seconds since epoch)
    pub fn validate_at(&self, token: &str, now: u64) -> Result<TokenClaims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        let (body, signature) = match token.split_once(SIGNATURE_SEPARATOR) {
            Some((body, signature)) => (body, Some(signature)),
            None => (token, None),
        };

        let plain = STANDARD.decode(body).map_err(|_| TokenError::Malformed)?;

        match signature {
            Some(signature) => {
                let signature = STANDARD
                    .decode(signature)
                    .map_err(|_| TokenError::Malformed)?;
                self.hmac
                    .verify(&plain, &signature)
                    .map_err(|_| TokenError::BadSignature)?;
            }
            None if self.policy.accept_unsigned => {
                trace!("Accepting unsigned legacy token");
            }
            None => return Err(TokenError::Unsigned),
        }

        let plain = String::from_utf8(plain).map_err(|_| TokenError::Malformed)?;
        let claims = parse_claims(&plain)?;

        if claims.issued_at > now.saturating_add(MAX_CLOCK_SKEW_SECS) {
            return Err(TokenError::NotYetValid);
        }
        let age = now.saturating_sub(claims.issued_at);
        if age >= self.policy.ttl_secs {
            return Err(TokenError::Expired { age });
        }

        Ok(claims)
    }
}

/// Decode the first four positional fields; the nonce is not needed.
fn parse_claims(plain: &str) -> Result<TokenClaims, TokenError> {
    let fields = split_fields(plain, TOKEN_FIELD_DELIMITER);
    let [user_id, username, role, issued_at, ..] = fields.as_slice() else {
        return Err(TokenError::Malformed);
    };

    if username.is_empty() {
        return Err(TokenError::Malformed);
    }

    Ok(TokenClaims {
        user_id: user_id.parse().map_err(|_| TokenError::Malformed)?,
        username: username.clone(),
        role: role.parse().map_err(|_| TokenError::Malformed)?,
        issued_at: issued_at.parse().map_err(|_| TokenError::Malformed)?,
    })
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

/// Seconds since the Unix epoch
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_767_225_600;

    fn service() -> TokenService {
        TokenService::new([7u8; 32], TokenPolicy::default())
    }

    fn plain_token(plain: &str) -> String {
        STANDARD.encode(plain)
    }

    #[test]
    fn test_issue_validate_roundtrip() {
        let tokens = service();
        let token = tokens.issue_at(7, "alice", Role::Student, T0).unwrap();

        let claims = tokens.validate_at(&token, T0 + 60).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.issued_at, T0);
    }

    #[test]
    fn test_validate_current_time() {
        let tokens = service();
        let token = tokens.issue(7, "alice", Role::Student).unwrap();
        assert_eq!(tokens.validate(&token).unwrap().user_id, 7);
    }

    #[test]
    fn test_token_is_transport_safe() {
        let token = service().issue_at(1, "bob", Role::Teacher, T0).unwrap();
        assert!(!token.contains("||"));
        assert!(!token.contains('\r'));
        assert!(!token.contains('\n'));
        assert!(!token.contains('&'));
    }

    #[test]
    fn test_expiry_boundary() {
        let tokens = service();
        let token = tokens.issue_at(7, "alice", Role::Student, T0).unwrap();

        assert!(tokens.validate_at(&token, T0).is_ok());
        assert!(tokens.validate_at(&token, T0 + 86_399).is_ok());
        assert_eq!(
            tokens.validate_at(&token, T0 + 86_400),
            Err(TokenError::Expired { age: 86_400 })
        );
        assert!(tokens.validate_at(&token, T0 + 200_000).is_err());
    }

    #[test]
    fn test_future_token_rejected() {
        let tokens = service();
        let token = tokens.issue_at(7, "alice", Role::Student, T0 + 3_600).unwrap();
        assert_eq!(tokens.validate_at(&token, T0), Err(TokenError::NotYetValid));
    }

    #[test]
    fn test_empty_and_undecodable_input() {
        let tokens = service();
        assert_eq!(tokens.validate_at("", T0), Err(TokenError::Missing));
        assert_eq!(tokens.validate_at("   ", T0), Err(TokenError::Missing));
        assert_eq!(tokens.validate_at("!!!not-base64", T0), Err(TokenError::Malformed));
        assert_eq!(tokens.validate_at("abc.%%%", T0), Err(TokenError::Malformed));
    }

    #[test]
    fn test_same_identity_gets_distinct_tokens() {
        let tokens = service();
        let a = tokens.issue_at(7, "alice", Role::Student, T0).unwrap();
        let b = tokens.issue_at(7, "alice", Role::Student, T0).unwrap();
        assert_ne!(a, b);
        assert_eq!(
            tokens.validate_at(&a, T0).unwrap(),
            tokens.validate_at(&b, T0).unwrap()
        );
    }

    #[test]
    fn test_tokens_do_not_interfere() {
        let tokens = service();
        let a = tokens.issue_at(7, "alice", Role::Student, T0).unwrap();
        let b = tokens.issue_at(9, "bob", Role::Teacher, T0).unwrap();

        let claims_a = tokens.validate_at(&a, T0 + 1).unwrap();
        let claims_b = tokens.validate_at(&b, T0 + 1).unwrap();
        assert_eq!((claims_a.user_id, claims_a.role), (7, Role::Student));
        assert_eq!((claims_b.user_id, claims_b.role), (9, Role::Teacher));
    }

    #[test]
    fn test_forged_unsigned_token_rejected() {
        let forged = plain_token(&format!("1:mallory:teacher:{T0}:xxxxxxxxxxxxxxxx"));
        assert_eq!(service().validate_at(&forged, T0), Err(TokenError::Unsigned));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let tokens = service();
        let token = tokens.issue_at(7, "alice", Role::Student, T0).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let tampered = format!(
            "{}.{signature}",
            plain_token(&format!("7:alice:teacher:{T0}:abcdefghijklmnop"))
        );
        assert_eq!(tokens.validate_at(&tampered, T0), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = service().issue_at(7, "alice", Role::Student, T0).unwrap();
        let other = TokenService::new([8u8; 32], TokenPolicy::default());
        assert_eq!(other.validate_at(&token, T0), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_legacy_unsigned_tokens_when_enabled() {
        let tokens = TokenService::new(
            [7u8; 32],
            TokenPolicy {
                accept_unsigned: true,
                ..TokenPolicy::default()
            },
        );

        let legacy = plain_token(&format!("12:carol:student:{T0}:abcdefghijklmnop"));
        let claims = tokens.validate_at(&legacy, T0 + 10).unwrap();
        assert_eq!(claims.user_id, 12);
        assert_eq!(claims.username, "carol");

        // four fields are enough; the nonce is never checked
        let short = plain_token(&format!("12:carol:student:{T0}"));
        assert!(tokens.validate_at(&short, T0).is_ok());

        let three = plain_token("12:carol:student");
        assert_eq!(tokens.validate_at(&three, T0), Err(TokenError::Malformed));
    }

    #[test]
    fn test_unparsable_fields_rejected() {
        let tokens = TokenService::new(
            [7u8; 32],
            TokenPolicy {
                accept_unsigned: true,
                ..TokenPolicy::default()
            },
        );
        for plain in [
            format!("x:carol:student:{T0}"),
            format!("1:carol:admin:{T0}"),
            "1:carol:student:yesterday".to_owned(),
            format!("1::student:{T0}"),
        ] {
            assert_eq!(
                tokens.validate_at(&plain_token(&plain), T0),
                Err(TokenError::Malformed),
                "{plain}"
            );
        }
    }

    #[test]
    fn test_nonce_shape() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LENGTH);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
