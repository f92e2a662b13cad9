//! Token manager
//!
//! Owns every token transition: issuance, validation, refresh rotation and
//! revocation. Tokens are opaque; all state lives in the store and every
//! validation reads it, so a revocation is visible to the next call.
//!
//! Refresh rotation:
//! - the old refresh token is retired and a new record (new access token,
//!   new refresh token) is inserted in one storage step
//! - the new record keeps the parent's user, client, grant type and scope
//! - only the client the parent was issued to may rotate it
//! - the parent's access token stays valid until it expires or is revoked

use std::sync::Arc;

use openauth_core::opaque::{self, fingerprint};
use openauth_core::{
    AuthorizationCode, CasOutcome, Error, GrantStore, GrantType, RefreshCondition, Result,
    Revocation, Scope, TOKEN_TYPE, Token, TokenRecord, TokenStore, unix_now,
};
use tracing::{debug, info, warn};

use crate::codes::{AuthCodeManager, CodeExchange};
use crate::metrics;
use crate::policy::Policy;
use crate::resolver::ScopeResolver;

#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn GrantStore>,
    resolver: ScopeResolver,
    codes: AuthCodeManager,
    policy: Arc<Policy>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn GrantStore>,
        resolver: ScopeResolver,
        codes: AuthCodeManager,
        policy: Arc<Policy>,
    ) -> Self {
        Self {
            store,
            resolver,
            codes,
            policy,
        }
    }

    /// Issue a token scoped to a domain; `NotFound` when the domain does not exist.
    pub async fn issue_token_with_domain(
        &self,
        user_id: &str,
        domain_id: &str,
        grant: GrantType,
    ) -> Result<Token> {
        let scope = self.resolver.resolve_domain_scope(domain_id).await?;
        self.issue_token(user_id, None, grant, scope).await
    }

    /// Issue a token scoped to a project; `NotFound` when the project does not exist.
    pub async fn issue_token_with_project(
        &self,
        user_id: &str,
        project_id: &str,
        grant: GrantType,
    ) -> Result<Token> {
        let scope = self.resolver.resolve_project_scope(project_id).await?;
        self.issue_token(user_id, None, grant, scope).await
    }

    /// Issue a token against an already resolved scope. `client_id` is the
    /// authenticated client the token is bound to, if any.
    pub async fn issue_token(
        &self,
        user_id: &str,
        client_id: Option<&str>,
        grant: GrantType,
        scope: Scope,
    ) -> Result<Token> {
        if user_id.is_empty() {
            return Err(Error::InvalidRequest("user_id is required".into()));
        }
        let record = self.mint(user_id, client_id, grant, scope, unix_now());
        let token = record.token.clone();
        self.store
            .create_token(record)
            .await
            .map_err(Error::storage("persisting token"))?;
        issued(&token);
        Ok(token)
    }

    /// Exchange an authorization code for a token bound to the code's scope.
    ///
    /// Code consumption and token creation are one storage operation: either
    /// the code is consumed and its token exists, or neither happened.
    pub async fn issue_token_by_code(&self, exchange: &CodeExchange) -> Result<Token> {
        let now = unix_now();
        let mint = |code: &AuthorizationCode| {
            self.mint(
                &code.user_id,
                Some(code.client_id.as_str()),
                GrantType::AuthorizationCode,
                code.scope.clone(),
                now,
            )
        };
        let record = self.codes.redeem(exchange, &mint).await?;
        issued(&record.token);
        Ok(record.token)
    }

    /// Return the token if it exists, is not revoked and has not expired.
    pub async fn validate_token(&self, access_token: &str) -> Result<Token> {
        let record = self
            .store
            .get_token(access_token)
            .await
            .map_err(Error::storage("loading token for validation"))?;

        let now = unix_now();
        let outcome = match record {
            None => Err(Error::InvalidToken("token not found".into())),
            Some(r) if r.revoked => Err(Error::InvalidToken("token has been revoked".into())),
            Some(r) if !r.is_active(now) => Err(Error::InvalidToken("token has expired".into())),
            Some(r) => Ok(r.token),
        };

        match &outcome {
            Ok(token) => {
                metrics::record_validation("valid");
                debug!(user_id = %token.user_id, token = %fingerprint(access_token), "token validated");
            }
            Err(e) => {
                metrics::record_validation("invalid");
                debug!(token = %fingerprint(access_token), reason = %e, "token rejected");
            }
        }
        outcome
    }

    /// Rotate a refresh token into a new token record.
    ///
    /// `client_id` is the authenticated client presenting the token and must
    /// be the one the token was issued to (`None` for unbound tokens). At most
    /// one of several concurrent calls with the same refresh token succeeds;
    /// the rest get `InvalidGrant`.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: Option<&str>,
    ) -> Result<Token> {
        let now = unix_now();
        let condition = RefreshCondition {
            now,
            client_id: client_id.map(str::to_owned),
        };
        let mint = |parent: &TokenRecord| {
            self.mint(
                &parent.token.user_id,
                parent.client_id.as_deref(),
                parent.token.grant_type,
                parent.token.scope.clone(),
                now,
            )
        };

        let outcome = self
            .store
            .rotate_refresh(refresh_token, &condition, &mint)
            .await
            .map_err(Error::storage("rotating refresh token"))?;

        match outcome {
            CasOutcome::Applied(record) => {
                metrics::record_refresh("success");
                info!(
                    user_id = %record.token.user_id,
                    grant_type = %record.token.grant_type,
                    scope = %record.token.scope,
                    old_refresh = %fingerprint(refresh_token),
                    token = %fingerprint(&record.token.access_token),
                    "refreshed token"
                );
                Ok(record.token)
            }
            CasOutcome::Rejected(rejection) => {
                metrics::record_refresh("rejected");
                warn!(refresh = %fingerprint(refresh_token), reason = %rejection, "refresh rejected");
                Err(Error::InvalidGrant(rejection.to_string()))
            }
        }
    }

    /// Revoke an access token. Revoking twice is not an error; revoking an
    /// unknown token is `NotFound`.
    pub async fn revoke_token(&self, access_token: &str) -> Result<()> {
        let outcome = self
            .store
            .revoke_token(access_token)
            .await
            .map_err(Error::storage("revoking token"))?;

        match outcome {
            Revocation::Revoked => {
                metrics::record_revocation();
                info!(token = %fingerprint(access_token), "revoked token");
                Ok(())
            }
            Revocation::AlreadyRevoked => {
                debug!(token = %fingerprint(access_token), "token already revoked");
                Ok(())
            }
            Revocation::NotFound => Err(Error::NotFound("token not found".into())),
        }
    }

    /// Build a fresh token record. Refreshable grants get a refresh token
    /// while the refresh grant is enabled.
    fn mint(
        &self,
        user_id: &str,
        client_id: Option<&str>,
        grant: GrantType,
        scope: Scope,
        now: i64,
    ) -> TokenRecord {
        let refreshable =
            grant.is_refreshable() && self.policy.is_enabled(GrantType::RefreshToken);
        let (refresh_token, refresh_expires_at) = if refreshable {
            (
                Some(opaque::generate()),
                Some(now.saturating_add(self.policy.refresh_token_ttl_secs)),
            )
        } else {
            (None, None)
        };

        TokenRecord::new(
            Token {
                user_id: user_id.to_owned(),
                grant_type: grant,
                access_token: opaque::generate(),
                refresh_token,
                token_type: TOKEN_TYPE.to_owned(),
                create_at: now,
                expires_in: self.policy.access_token_ttl_secs,
                scope,
            },
            refresh_expires_at,
        )
        .issued_to(client_id.map(str::to_owned))
    }
}

fn issued(token: &Token) {
    metrics::record_issued(token.grant_type);
    info!(
        user_id = %token.user_id,
        grant_type = %token.grant_type,
        scope = %token.scope,
        token = %fingerprint(&token.access_token),
        expires_in = token.expires_in,
        refreshable = token.refresh_token.is_some(),
        "issued token"
    );
}
