//! Engine defaults
//!
//! Lifetimes are in seconds. The engine policy starts from these values and
//! the server config may override them.

/// `token_type` reported on every issued token
pub const TOKEN_TYPE: &str = "bearer";

/// Default access token lifetime (1 hour)
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Default refresh token lifetime (30 days)
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;

/// Default authorization code lifetime
pub const DEFAULT_AUTH_CODE_TTL_SECS: i64 = 600;

/// Upper bound on the authorization code lifetime (RFC 6749 §4.1.2 recommends 10 minutes)
pub const MAX_AUTH_CODE_TTL_SECS: i64 = 600;

/// Upper bound on access and refresh token lifetimes (10 years)
pub const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 24 * 3600;

/// Random bytes behind each authorization code, access token and refresh token
pub const CREDENTIAL_BYTES: usize = 32;

/// The only PKCE challenge method accepted
pub const PKCE_METHOD_S256: &str = "S256";
