//! Service facade
//!
//! `Engine` is built from explicitly passed collaborators and storage and
//! implements the `Service` contract. Clones share all state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use openauth_core::{
    Application, ApplicationRegistry, Code, Directory, GrantStore, GrantType, IdentityVerifier,
    Result, Token,
};

use crate::codes::{AuthCodeManager, CodeExchange, CodeRequest};
use crate::policy::Policy;
use crate::resolver::ScopeResolver;
use crate::router::{AuthorizeRequest, AuthorizeResponse, GrantRouter, TokenRequest};
use crate::tokens::TokenManager;

/// Future returned by `Service` operations.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Token and code lifecycle operations.
///
/// Uses `Pin<Box<dyn Future>>` return types so callers can hold an
/// `Arc<dyn Service>`.
pub trait Service: Send + Sync {
    /// Issue a password-grant token scoped to a project.
    fn issue_token_with_project<'a>(
        &'a self,
        user_id: &'a str,
        project_id: &'a str,
    ) -> EngineFuture<'a, Token>;

    /// Issue a password-grant token scoped to a domain.
    fn issue_token_with_domain<'a>(
        &'a self,
        user_id: &'a str,
        domain_id: &'a str,
    ) -> EngineFuture<'a, Token>;

    fn issue_token_by_code<'a>(&'a self, exchange: &'a CodeExchange) -> EngineFuture<'a, Token>;

    fn issue_auth_code<'a>(
        &'a self,
        app: &'a Application,
        request: &'a CodeRequest,
    ) -> EngineFuture<'a, Code>;

    fn validate_token<'a>(&'a self, access_token: &'a str) -> EngineFuture<'a, Token>;

    /// Rotate a refresh token that is not bound to a client. Tokens issued
    /// to a client are refreshed through the token endpoint, which
    /// authenticates that client.
    fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> EngineFuture<'a, Token>;

    fn revoke_token<'a>(&'a self, access_token: &'a str) -> EngineFuture<'a, ()>;
}

/// External systems the engine consults but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub domains: Arc<dyn Directory>,
    pub projects: Arc<dyn Directory>,
    pub applications: Arc<dyn ApplicationRegistry>,
    pub identity: Arc<dyn IdentityVerifier>,
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn GrantStore>,
    codes: AuthCodeManager,
    tokens: TokenManager,
    router: GrantRouter,
}

impl Engine {
    pub fn new(policy: Policy, collaborators: Collaborators, store: Arc<dyn GrantStore>) -> Self {
        let policy = Arc::new(policy);
        let resolver = ScopeResolver::new(collaborators.domains, collaborators.projects);
        let codes = AuthCodeManager::new(store.clone(), policy.auth_code_ttl_secs);
        let tokens = TokenManager::new(
            store.clone(),
            resolver.clone(),
            codes.clone(),
            policy.clone(),
        );
        let router = GrantRouter::new(
            policy,
            collaborators.applications,
            collaborators.identity,
            resolver,
            codes.clone(),
            tokens.clone(),
        );
        Self {
            store,
            codes,
            tokens,
            router,
        }
    }

    pub fn router(&self) -> &GrantRouter {
        &self.router
    }

    /// The backing store, for the expiry sweep.
    pub fn store(&self) -> Arc<dyn GrantStore> {
        self.store.clone()
    }

    pub async fn authorize(&self, request: &AuthorizeRequest) -> Result<AuthorizeResponse> {
        self.router.authorize(request).await
    }

    pub async fn token(&self, request: &TokenRequest) -> Result<Token> {
        self.router.token(request).await
    }
}

impl Service for Engine {
    fn issue_token_with_project<'a>(
        &'a self,
        user_id: &'a str,
        project_id: &'a str,
    ) -> EngineFuture<'a, Token> {
        Box::pin(self.tokens.issue_token_with_project(
            user_id,
            project_id,
            GrantType::ResourceOwnerPasswordCredentials,
        ))
    }

    fn issue_token_with_domain<'a>(
        &'a self,
        user_id: &'a str,
        domain_id: &'a str,
    ) -> EngineFuture<'a, Token> {
        Box::pin(self.tokens.issue_token_with_domain(
            user_id,
            domain_id,
            GrantType::ResourceOwnerPasswordCredentials,
        ))
    }

    fn issue_token_by_code<'a>(&'a self, exchange: &'a CodeExchange) -> EngineFuture<'a, Token> {
        Box::pin(self.tokens.issue_token_by_code(exchange))
    }

    fn issue_auth_code<'a>(
        &'a self,
        app: &'a Application,
        request: &'a CodeRequest,
    ) -> EngineFuture<'a, Code> {
        Box::pin(self.codes.issue_auth_code(app, request))
    }

    fn validate_token<'a>(&'a self, access_token: &'a str) -> EngineFuture<'a, Token> {
        Box::pin(self.tokens.validate_token(access_token))
    }

    fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> EngineFuture<'a, Token> {
        Box::pin(self.tokens.refresh_token(refresh_token, None))
    }

    fn revoke_token<'a>(&'a self, access_token: &'a str) -> EngineFuture<'a, ()> {
        Box::pin(self.tokens.revoke_token(access_token))
    }
}
