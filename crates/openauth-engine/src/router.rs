//! Grant router
//!
//! Entry point for the two OAuth2 endpoints. `authorize` handles the
//! front-channel step (`response_type=code` or `token`), `token` dispatches
//! the back-channel request on `grant_type`.
//!
//! The resource owner is authenticated by the identity verifier on every
//! authorize request; a caller never names the user directly. Tokens are
//! bound to the client that obtained them, and only that client may
//! refresh them.

use std::sync::Arc;

use openauth_core::{
    Application, ApplicationRegistry, Code, Error, GrantType, IdentityVerifier, Result,
    ScopeRequest, Token,
};
use tracing::debug;

use crate::codes::{AuthCodeManager, CodeExchange, CodeRequest};
use crate::policy::Policy;
use crate::resolver::ScopeResolver;
use crate::tokens::TokenManager;

/// Front-channel authorization request.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    /// Resource owner credentials, checked against the identity verifier
    pub username: Option<String>,
    pub password: Option<String>,
    pub scope: ScopeRequest,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AuthorizeResponse {
    Code(Code),
    Token(Token),
}

/// Back-channel token request. Which fields matter depends on `grant_type`.
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub code_verifier: Option<String>,
    pub scope: ScopeRequest,
}

#[derive(Clone)]
pub struct GrantRouter {
    policy: Arc<Policy>,
    applications: Arc<dyn ApplicationRegistry>,
    identity: Arc<dyn IdentityVerifier>,
    resolver: ScopeResolver,
    codes: AuthCodeManager,
    tokens: TokenManager,
}

impl GrantRouter {
    pub fn new(
        policy: Arc<Policy>,
        applications: Arc<dyn ApplicationRegistry>,
        identity: Arc<dyn IdentityVerifier>,
        resolver: ScopeResolver,
        codes: AuthCodeManager,
        tokens: TokenManager,
    ) -> Self {
        Self {
            policy,
            applications,
            identity,
            resolver,
            codes,
            tokens,
        }
    }

    /// Issue a code or, for `response_type=token`, an implicit token.
    pub async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizeResponse> {
        let grant = match request.response_type.as_str() {
            "code" => GrantType::AuthorizationCode,
            "token" => GrantType::Implicit,
            other => {
                return Err(Error::UnsupportedGrantType(format!(
                    "response_type {other:?}"
                )));
            }
        };
        self.policy.ensure_enabled(grant)?;

        let app = self.applications.get_application(&request.client_id).await?;
        if !app.allows_redirect(&request.redirect_uri) {
            return Err(Error::InvalidRequest(format!(
                "redirect_uri {} is not registered for client {}",
                request.redirect_uri, app.client_id
            )));
        }
        let user_id = self.resource_owner(request).await?;
        let scope = self.resolver.resolve(&request.scope).await?;
        debug!(
            client_id = %app.client_id,
            %user_id,
            %grant,
            %scope,
            "authorize request accepted"
        );

        match grant {
            GrantType::Implicit => self
                .tokens
                .issue_token(&user_id, Some(app.client_id.as_str()), GrantType::Implicit, scope)
                .await
                .map(AuthorizeResponse::Token),
            _ => self
                .codes
                .issue_auth_code(
                    &app,
                    &CodeRequest {
                        redirect_uri: request.redirect_uri.clone(),
                        user_id,
                        scope,
                        state: request.state.clone(),
                        code_challenge: request.code_challenge.clone(),
                        code_challenge_method: request.code_challenge_method.clone(),
                    },
                )
                .await
                .map(AuthorizeResponse::Code),
        }
    }

    /// Handle a token endpoint request.
    pub async fn token(&self, request: &TokenRequest) -> Result<Token> {
        let grant: GrantType = request.grant_type.parse()?;
        self.policy.ensure_enabled(grant)?;

        match grant {
            GrantType::AuthorizationCode => {
                let client_id = required(&request.client_id, "client_id")?;
                let app = self.client(client_id).await?;
                app.authenticate(request.client_secret.as_deref(), false)?;

                let exchange = CodeExchange {
                    code: required(&request.code, "code")?.to_owned(),
                    client_id: app.client_id,
                    redirect_uri: required(&request.redirect_uri, "redirect_uri")?.to_owned(),
                    code_verifier: request.code_verifier.clone(),
                };
                self.tokens.issue_token_by_code(&exchange).await
            }
            GrantType::ResourceOwnerPasswordCredentials => {
                let client_id = self.optional_client(request).await?;
                let username = required(&request.username, "username")?;
                let password = required(&request.password, "password")?;
                let user_id = self.identity.verify_password(username, password).await?;
                let scope = self.resolver.resolve(&request.scope).await?;
                self.tokens
                    .issue_token(&user_id, client_id.as_deref(), grant, scope)
                    .await
            }
            GrantType::ClientCredentials => {
                let client_id = required(&request.client_id, "client_id")?;
                let app = self.client(client_id).await?;
                app.authenticate(request.client_secret.as_deref(), true)?;
                let scope = self.resolver.resolve(&request.scope).await?;
                self.tokens
                    .issue_token(&app.client_id, Some(app.client_id.as_str()), grant, scope)
                    .await
            }
            GrantType::RefreshToken => {
                let refresh_token = required(&request.refresh_token, "refresh_token")?;
                let client_id = self.optional_client(request).await?;
                self.tokens
                    .refresh_token(refresh_token, client_id.as_deref())
                    .await
            }
            GrantType::Implicit => Err(Error::UnsupportedGrantType(
                "implicit tokens are issued by the authorization endpoint".into(),
            )),
        }
    }

    /// Authenticate the resource owner of an authorize request.
    async fn resource_owner(&self, request: &AuthorizeRequest) -> Result<String> {
        match (request.username.as_deref(), request.password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() => {
                self.identity.verify_password(username, password).await
            }
            _ => Err(Error::InvalidRequest(
                "resource owner credentials are required".into(),
            )),
        }
    }

    /// Authenticate the client when the request names one. Returns its id.
    async fn optional_client(&self, request: &TokenRequest) -> Result<Option<String>> {
        let Some(client_id) = request.client_id.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let app = self.client(client_id).await?;
        app.authenticate(request.client_secret.as_deref(), false)?;
        Ok(Some(app.client_id))
    }

    /// Look up a client at the token endpoint, where an unknown client is an
    /// authentication failure rather than a missing resource.
    async fn client(&self, client_id: &str) -> Result<Application> {
        match self.applications.get_application(client_id).await {
            Err(Error::NotFound(_)) => Err(Error::InvalidClient(format!(
                "client {client_id} is not registered"
            ))),
            other => other,
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::InvalidRequest(format!("{name} is required"))),
    }
}
