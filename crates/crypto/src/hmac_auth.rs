//! HMAC-SHA256 authentication

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Secret key length in bytes
pub const SECRET_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HmacError {
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid hex key")]
    InvalidHex,

    #[error("HMAC verification failed")]
    VerificationFailed,
}

/// HMAC-SHA256 authenticator
#[derive(Clone)]
pub struct HmacAuthenticator {
    secret: [u8; SECRET_LEN],
}

impl HmacAuthenticator {
    /// Create a new authenticator with the given secret
    pub fn new(secret: [u8; SECRET_LEN]) -> Self {
        Self { secret }
    }

    /// Compute HMAC for the given data
    pub fn compute(&self, data: &[u8]) -> Result<[u8; 32], HmacError> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }

    /// Verify HMAC in constant time
    pub fn verify(&self, data: &[u8], expected: &[u8]) -> Result<(), HmacError> {
        let mut mac = self.mac()?;
        mac.update(data);
        mac.verify_slice(expected)
            .map_err(|_| HmacError::VerificationFailed)
    }

    fn mac(&self) -> Result<HmacSha256, HmacError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| HmacError::InvalidKeyLength(self.secret.len()))
    }
}

impl std::fmt::Debug for HmacAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacAuthenticator").finish_non_exhaustive()
    }
}

/// Decode a hex-encoded 32-byte secret (as stored in configuration)
pub fn decode_secret(hex_secret: &str) -> Result<[u8; SECRET_LEN], HmacError> {
    let bytes = hex::decode(hex_secret.trim()).map_err(|_| HmacError::InvalidHex)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| HmacError::InvalidKeyLength(len))
}

/// Generate a fresh random secret
pub fn random_secret() -> [u8; SECRET_LEN] {
    let mut secret = [0u8; SECRET_LEN];
    rand::Rng::fill(&mut rand::thread_rng(), &mut secret);
    secret
}
