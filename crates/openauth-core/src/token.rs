//! Token model
//!
//! `Token` is the serialized form handed to clients. `TokenRecord` is what
//! the store keeps: the token plus the state only the token manager may
//! change (revocation and refresh rotation).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::scope::Scope;
use crate::store::Rejection;

/// OAuth2 grant types (RFC 6749 §1.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    Implicit,
    #[serde(alias = "password")]
    ResourceOwnerPasswordCredentials,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub const ALL: [GrantType; 5] = [
        GrantType::AuthorizationCode,
        GrantType::Implicit,
        GrantType::ResourceOwnerPasswordCredentials,
        GrantType::ClientCredentials,
        GrantType::RefreshToken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::Implicit => "implicit",
            GrantType::ResourceOwnerPasswordCredentials => "resource_owner_password_credentials",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
        }
    }

    /// Whether tokens minted under this grant carry a refresh token.
    ///
    /// Implicit and client credentials tokens never do (RFC 6749 §4.2.2, §4.4.3).
    pub fn is_refreshable(&self) -> bool {
        matches!(
            self,
            GrantType::AuthorizationCode
                | GrantType::ResourceOwnerPasswordCredentials
                | GrantType::RefreshToken
        )
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "implicit" => Ok(GrantType::Implicit),
            "resource_owner_password_credentials" | "password" => {
                Ok(GrantType::ResourceOwnerPasswordCredentials)
            }
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(Error::UnsupportedGrantType(other.to_owned())),
        }
    }
}

/// A user's access token as returned to the client.
///
/// `create_at` is unix seconds; `expires_in` is a delta in seconds from
/// `create_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub user_id: String,
    pub grant_type: GrantType,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub create_at: i64,
    pub expires_in: i64,
    pub scope: Scope,
}

impl Token {
    /// Unix second at which the access token stops validating.
    pub fn expires_at(&self) -> i64 {
        self.create_at.saturating_add(self.expires_in)
    }
}

/// Stored state of a token.
///
/// `revoked` and `refresh_rotated` only ever move from false to true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub token: Token,
    /// Client the token was issued to. A refresh must present the same client.
    pub client_id: Option<String>,
    pub revoked: bool,
    pub refresh_rotated: bool,
    /// Absolute expiry of the refresh token, when there is one
    pub refresh_expires_at: Option<i64>,
}

impl TokenRecord {
    pub fn new(token: Token, refresh_expires_at: Option<i64>) -> Self {
        Self {
            token,
            client_id: None,
            revoked: false,
            refresh_rotated: false,
            refresh_expires_at,
        }
    }

    /// Bind the record to the client it was issued to.
    pub fn issued_to(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    /// Whether the access token is usable at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        !self.revoked && now < self.token.expires_at()
    }

    /// Whether the record can still matter to anyone at `now`.
    ///
    /// A record is dead once its access token has expired and its refresh
    /// token is absent, spent, revoked or expired.
    pub fn is_dead(&self, now: i64) -> bool {
        if now < self.token.expires_at() {
            return false;
        }
        match self.refresh_expires_at {
            Some(refresh_expiry) => {
                self.revoked || self.refresh_rotated || now >= refresh_expiry
            }
            None => true,
        }
    }
}

/// Predicate a refresh token must satisfy to be rotated.
#[derive(Debug, Clone)]
pub struct RefreshCondition {
    pub now: i64,
    /// Authenticated client presenting the refresh token, if any
    pub client_id: Option<String>,
}

impl RefreshCondition {
    pub fn check(&self, parent: &TokenRecord) -> Result<(), Rejection> {
        if parent.client_id != self.client_id {
            return Err(Rejection::RefreshClientMismatch);
        }
        if parent.revoked {
            return Err(Rejection::ParentRevoked);
        }
        if parent.refresh_rotated {
            return Err(Rejection::RefreshRotated);
        }
        match parent.refresh_expires_at {
            Some(expiry) if self.now < expiry => Ok(()),
            Some(_) => Err(Rejection::RefreshExpired),
            None => Err(Rejection::UnknownRefreshToken),
        }
    }
}
