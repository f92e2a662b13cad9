//! Storage contracts for codes and tokens
//!
//! Every state transition that must happen at most once is a conditional
//! mutation here: the store evaluates the condition and applies the change
//! as one step, so two callers racing on the same code or refresh token
//! cannot both win. Adapters backed by a database implement these as a
//! transaction or a conditional update affecting exactly one row.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn GrantStore>`).

use std::future::Future;
use std::pin::Pin;

use crate::code::{AuthorizationCode, CodeCondition};
use crate::token::{RefreshCondition, TokenRecord};

/// Failures of the storage backend itself.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Builds the token minted by a successful code redemption.
pub type MintFromCode<'a> = &'a (dyn Fn(&AuthorizationCode) -> TokenRecord + Send + Sync);

/// Builds the successor record of a successful refresh rotation.
pub type MintFromParent<'a> = &'a (dyn Fn(&TokenRecord) -> TokenRecord + Send + Sync);

/// Why a conditional mutation was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("authorization code is unknown")]
    UnknownCode,
    #[error("authorization code has already been used")]
    CodeConsumed,
    #[error("authorization code has expired")]
    CodeExpired,
    #[error("authorization code was issued to another client")]
    ClientMismatch,
    #[error("redirect_uri does not match the authorization request")]
    RedirectMismatch,
    #[error("code_verifier is required")]
    VerifierMissing,
    #[error("code_verifier does not match the code challenge")]
    VerifierMismatch,
    #[error("refresh token is unknown")]
    UnknownRefreshToken,
    #[error("refresh token has already been used")]
    RefreshRotated,
    #[error("refresh token has expired")]
    RefreshExpired,
    #[error("refresh token was issued to another client")]
    RefreshClientMismatch,
    #[error("token has been revoked")]
    ParentRevoked,
}

/// Result of a compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome<T> {
    /// The condition held and the mutation was applied
    Applied(T),
    /// The condition failed; nothing was changed
    Rejected(Rejection),
}

/// Result of a revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    Revoked,
    AlreadyRevoked,
    NotFound,
}

/// Persistence for authorization codes.
pub trait CodeStore: Send + Sync {
    /// Insert a new, unconsumed code.
    fn create_code(&self, code: AuthorizationCode) -> StoreFuture<'_, ()>;

    /// Read a code without changing it.
    fn get_code<'a>(&'a self, value: &'a str) -> StoreFuture<'a, Option<AuthorizationCode>>;

    /// Mark a code consumed if `condition` holds. Returns the code as it was
    /// recorded at issuance.
    fn consume_code<'a>(
        &'a self,
        value: &'a str,
        condition: &'a CodeCondition,
    ) -> StoreFuture<'a, CasOutcome<AuthorizationCode>>;

    /// Delete codes whose `expires_at` is at or before `now`. Returns how many
    /// were removed.
    fn sweep_expired_codes(&self, now: i64) -> StoreFuture<'_, usize>;
}

/// Persistence for tokens.
pub trait TokenStore: Send + Sync {
    /// Insert a token pair as one unit.
    fn create_token(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

    /// Read a token by its access token.
    fn get_token<'a>(&'a self, access_token: &'a str) -> StoreFuture<'a, Option<TokenRecord>>;

    /// Retire `refresh_token` and insert the record `mint` builds from its
    /// parent, if `condition` holds. Returns the new record.
    fn rotate_refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        condition: &'a RefreshCondition,
        mint: MintFromParent<'a>,
    ) -> StoreFuture<'a, CasOutcome<TokenRecord>>;

    /// Flip `revoked` to true.
    fn revoke_token<'a>(&'a self, access_token: &'a str) -> StoreFuture<'a, Revocation>;

    /// Delete records that can no longer validate or refresh.
    fn sweep_expired_tokens(&self, now: i64) -> StoreFuture<'_, usize>;
}

/// A store holding both codes and tokens, able to consume a code and insert
/// the token minted from it atomically.
pub trait GrantStore: CodeStore + TokenStore {
    /// Consume the code if `condition` holds and insert `mint(code)` in the
    /// same step. On rejection or failure neither happens. Returns the new
    /// token record.
    fn redeem_code<'a>(
        &'a self,
        value: &'a str,
        condition: &'a CodeCondition,
        mint: MintFromCode<'a>,
    ) -> StoreFuture<'a, CasOutcome<TokenRecord>>;
}
