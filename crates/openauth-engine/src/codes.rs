//! Authorization code manager
//!
//! Issues short-lived, single-use codes and is the only component that
//! consumes them. Consumption is delegated to the store as one conditional
//! update, so among concurrent exchanges of the same code exactly one wins.

use std::sync::Arc;

use openauth_core::opaque::{self, fingerprint};
use openauth_core::store::MintFromCode;
use openauth_core::{
    Application, AuthorizationCode, CasOutcome, Code, CodeCondition, CodeStore, Error, GrantStore,
    MAX_AUTH_CODE_TTL_SECS, Result, Scope, TokenRecord, pkce, unix_now,
};
use tracing::{info, warn};

use crate::metrics;

/// Parameters of an authorize request that survive onto the code.
#[derive(Debug, Clone)]
pub struct CodeRequest {
    pub redirect_uri: String,
    pub user_id: String,
    pub scope: Scope,
    /// Opaque client value echoed back unchanged
    pub state: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// What a client presents to exchange a code.
#[derive(Debug, Clone)]
pub struct CodeExchange {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_verifier: Option<String>,
}

impl CodeExchange {
    fn condition(&self, now: i64) -> CodeCondition {
        CodeCondition {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            code_verifier: self.code_verifier.clone(),
            now,
        }
    }
}

#[derive(Clone)]
pub struct AuthCodeManager {
    store: Arc<dyn GrantStore>,
    ttl_secs: i64,
}

impl AuthCodeManager {
    /// `ttl_secs` is clamped to 1..=600.
    pub fn new(store: Arc<dyn GrantStore>, ttl_secs: i64) -> Self {
        Self {
            store,
            ttl_secs: ttl_secs.clamp(1, MAX_AUTH_CODE_TTL_SECS),
        }
    }

    /// Issue a code for `app`.
    ///
    /// Fails with `InvalidRequest` when the redirect URI is not registered for
    /// the application or the PKCE parameters are malformed.
    pub async fn issue_auth_code(&self, app: &Application, request: &CodeRequest) -> Result<Code> {
        if !app.allows_redirect(&request.redirect_uri) {
            return Err(Error::InvalidRequest(format!(
                "redirect_uri {} is not registered for client {}",
                request.redirect_uri, app.client_id
            )));
        }
        if request.user_id.is_empty() {
            return Err(Error::InvalidRequest("user_id is required".into()));
        }
        let code_challenge = pkce::accept_challenge(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )?;

        let issued_at = unix_now();
        let code = AuthorizationCode {
            value: opaque::generate(),
            client_id: app.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            user_id: request.user_id.clone(),
            scope: request.scope.clone(),
            issued_at,
            expires_at: issued_at + self.ttl_secs,
            consumed: false,
            code_challenge,
        };
        let value = code.value.clone();

        self.store
            .create_code(code)
            .await
            .map_err(Error::storage("persisting authorization code"))?;

        info!(
            client_id = %app.client_id,
            user_id = %request.user_id,
            scope = %request.scope,
            code = %fingerprint(&value),
            expires_in = self.ttl_secs,
            "issued authorization code"
        );

        Ok(Code {
            code: value,
            state: request.state.clone(),
        })
    }

    /// Consume a code, returning it as recorded at issuance.
    ///
    /// Unknown, expired, consumed or mismatched codes fail with `InvalidGrant`.
    pub async fn exchange_code(&self, exchange: &CodeExchange) -> Result<AuthorizationCode> {
        let condition = exchange.condition(unix_now());
        let outcome = self
            .store
            .consume_code(&exchange.code, &condition)
            .await
            .map_err(Error::storage("consuming authorization code"))?;
        settle(exchange, outcome)
    }

    /// Consume a code and insert the token `mint` builds from it as one
    /// storage operation. Used by the token manager so that a consumed code
    /// always has its token.
    pub(crate) async fn redeem(
        &self,
        exchange: &CodeExchange,
        mint: MintFromCode<'_>,
    ) -> Result<TokenRecord> {
        let condition = exchange.condition(unix_now());
        let outcome = self
            .store
            .redeem_code(&exchange.code, &condition, mint)
            .await
            .map_err(|e| {
                warn!(error = %e, client_id = %exchange.client_id, "code redemption failed in storage");
                Error::storage("redeeming authorization code")(e)
            })?;
        settle(exchange, outcome)
    }
}

fn settle<T>(exchange: &CodeExchange, outcome: CasOutcome<T>) -> Result<T> {
    match outcome {
        CasOutcome::Applied(value) => {
            metrics::record_code_exchange("success");
            Ok(value)
        }
        CasOutcome::Rejected(rejection) => {
            metrics::record_code_exchange("rejected");
            warn!(
                client_id = %exchange.client_id,
                code = %fingerprint(&exchange.code),
                reason = %rejection,
                "authorization code exchange rejected"
            );
            Err(Error::InvalidGrant(rejection.to_string()))
        }
    }
}
