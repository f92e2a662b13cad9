//! Authorization codes (RFC 6749 §4.1.2)

use serde::Serialize;

use crate::pkce;
use crate::scope::Scope;
use crate::store::Rejection;

/// A stored authorization code.
///
/// `consumed` moves from false to true exactly once; a consumed code is kept
/// until it expires so that a replay is reported as a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub value: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// Resource owner who approved the authorize request
    pub user_id: String,
    pub scope: Scope,
    pub issued_at: i64,
    pub expires_at: i64,
    pub consumed: bool,
    /// S256 PKCE challenge, when the client sent one
    pub code_challenge: Option<String>,
}

/// Authorize response: the code plus the caller's `state`, echoed unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Code {
    pub code: String,
    pub state: String,
}

/// Everything an exchange must match, evaluated inside the store's
/// check-and-set.
#[derive(Debug, Clone)]
pub struct CodeCondition {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_verifier: Option<String>,
    pub now: i64,
}

impl CodeCondition {
    pub fn check(&self, code: &AuthorizationCode) -> Result<(), Rejection> {
        if code.expires_at <= self.now {
            return Err(Rejection::CodeExpired);
        }
        if code.consumed {
            return Err(Rejection::CodeConsumed);
        }
        if code.client_id != self.client_id {
            return Err(Rejection::ClientMismatch);
        }
        if code.redirect_uri != self.redirect_uri {
            return Err(Rejection::RedirectMismatch);
        }
        if let Some(challenge) = &code.code_challenge {
            let verifier = self
                .code_verifier
                .as_deref()
                .ok_or(Rejection::VerifierMissing)?;
            if !pkce::verify(verifier, challenge) {
                return Err(Rejection::VerifierMismatch);
            }
        }
        Ok(())
    }
}
