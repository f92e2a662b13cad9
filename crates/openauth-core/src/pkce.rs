//! PKCE (Proof Key for Code Exchange) per RFC 7636
//!
//! A client may bind an authorization code to a secret verifier by sending
//! `code_challenge = BASE64URL(SHA256(verifier))` on the authorize request.
//! The code can then only be exchanged by a caller that presents the
//! verifier. Only the S256 method is accepted; `plain` offers no protection
//! against an intercepted authorize request.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use ring::constant_time;
use sha2::{Digest, Sha256};

use crate::constants::PKCE_METHOD_S256;
use crate::error::{Error, Result};

/// Generate a PKCE code verifier for a client.
///
/// 64 random bytes as URL-safe base64 (86 characters), inside the 43-128
/// range RFC 7636 allows.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Check a presented verifier against the challenge recorded at authorize time.
pub fn verify(verifier: &str, challenge: &str) -> bool {
    if !(43..=128).contains(&verifier.len()) {
        return false;
    }
    let computed = compute_challenge(verifier);
    constant_time::verify_slices_are_equal(computed.as_bytes(), challenge.as_bytes()).is_ok()
}

/// Validate the challenge parameters of an authorize request.
///
/// Returns the challenge to record on the code, if any. A method without a
/// challenge, a method other than S256, or a challenge that is not a
/// 43-character base64url value is an invalid request. A missing method
/// defaults to S256.
pub fn accept_challenge(
    challenge: Option<&str>,
    method: Option<&str>,
) -> Result<Option<String>> {
    let Some(challenge) = challenge else {
        if method.is_some() {
            return Err(Error::InvalidRequest(
                "code_challenge_method given without code_challenge".into(),
            ));
        }
        return Ok(None);
    };

    let method = method.unwrap_or(PKCE_METHOD_S256);
    if method != PKCE_METHOD_S256 {
        return Err(Error::InvalidRequest(format!(
            "unsupported code_challenge_method: {method}"
        )));
    }

    let well_formed = challenge.len() == 43
        && challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !well_formed {
        return Err(Error::InvalidRequest(
            "code_challenge must be a base64url SHA-256 digest".into(),
        ));
    }

    Ok(Some(challenge.to_owned()))
}
