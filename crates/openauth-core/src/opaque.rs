//! Opaque credential generation
//!
//! Authorization codes, access tokens and refresh tokens are independent
//! random values with no embedded structure. Logs only ever carry a
//! fingerprint of them.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::constants::CREDENTIAL_BYTES;

/// Generate a cryptographically random credential.
///
/// `CREDENTIAL_BYTES` random bytes encoded as URL-safe base64 without
/// padding (43 characters).
pub fn generate() -> String {
    let mut bytes = [0u8; CREDENTIAL_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Short, non-reversible identifier for a credential, safe to log.
pub fn fingerprint(value: &str) -> String {
    let hash = Sha256::digest(value.as_bytes());
    hex::encode(&hash[..4])
}
