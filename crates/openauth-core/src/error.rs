//! Error taxonomy for authorization and token operations
//!
//! Business-rule messages coming back from collaborators travel in
//! `Rejected` and are displayed without any added wording. Storage failures
//! are wrapped in `Internal` together with what the engine was doing.

use crate::store::StoreError;

/// Errors from authorization, code and token operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid client: {0}")]
    InvalidClient(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    Rejected(String),

    #[error("internal error while {context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: StoreError,
    },
}

impl Error {
    /// Wrap a storage failure with the operation that hit it.
    ///
    /// Intended for `map_err(Error::storage("consuming authorization code"))`.
    pub fn storage(context: &'static str) -> impl FnOnce(StoreError) -> Error {
        move |source| Error::Internal {
            context: context.to_owned(),
            source,
        }
    }

    /// OAuth2 error code (RFC 6749 §5.2) reported to clients.
    pub fn oauth_code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) | Error::Rejected(_) => "invalid_request",
            Error::UnsupportedGrantType(_) => "unsupported_grant_type",
            Error::InvalidGrant(_) | Error::InvalidCredentials(_) => "invalid_grant",
            Error::InvalidToken(_) => "invalid_token",
            Error::InvalidClient(_) => "invalid_client",
            Error::Internal { .. } => "server_error",
        }
    }

    /// Message safe to show the caller.
    ///
    /// Internal failures keep their context in logs only.
    pub fn description(&self) -> String {
        match self {
            Error::NotFound(msg)
            | Error::InvalidRequest(msg)
            | Error::UnsupportedGrantType(msg)
            | Error::InvalidGrant(msg)
            | Error::InvalidToken(msg)
            | Error::InvalidClient(msg)
            | Error::InvalidCredentials(msg)
            | Error::Rejected(msg) => msg.clone(),
            Error::Internal { .. } => "internal server error".into(),
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
