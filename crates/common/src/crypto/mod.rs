//! Keyed hashing primitives for request signing and verification.

pub mod signature;

pub use signature::{constant_time_eq, hmac_sha256, hmac_sha256_hex, SignatureError};
