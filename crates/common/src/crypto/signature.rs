//! HMAC-SHA256 helpers
//!
//! Signature verification always goes through [`constant_time_eq`]; never
//! compare computed digests with `==`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signing key must not be empty")]
    EmptyKey,

    #[error("invalid signing key")]
    InvalidKey,
}

/// Compute the raw HMAC-SHA256 digest of `parts` concatenated in order.
///
/// # Errors
/// Returns [`SignatureError::EmptyKey`] for an empty key.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 32], SignatureError> {
    if key.is_empty() {
        return Err(SignatureError::EmptyKey);
    }

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SignatureError::InvalidKey)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Lowercase hex form of [`hmac_sha256`].
///
/// # Errors
/// Returns [`SignatureError::EmptyKey`] for an empty key.
pub fn hmac_sha256_hex(key: &[u8], parts: &[&[u8]]) -> Result<String, SignatureError> {
    hmac_sha256(key, parts).map(hex::encode)
}

/// Constant-time byte comparison.
///
/// Length differences return `false` immediately; lengths of signatures are
/// public.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
