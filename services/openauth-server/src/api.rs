//! OAuth2 HTTP endpoints
//!
//! Thin adapters between axum extractors and the engine. Every engine call
//! runs under the configured request timeout; a missed deadline becomes
//! `503 temporarily_unavailable` and drops the in-flight future, which the
//! storage layer tolerates.
//!
//! HTTP Basic credentials identify the resource owner on `/oauth2/authorize`
//! and the client on `/oauth2/token`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use openauth_core::ScopeRequest;
use openauth_engine::{AuthorizeRequest, AuthorizeResponse, Engine, Service, TokenRequest};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::ApiError;
use crate::metrics;

/// Request counters reported by `/health`
#[derive(Debug, Clone)]
pub struct RequestStats {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Shared state for the OAuth endpoints
#[derive(Clone)]
pub struct ApiState {
    pub engine: Engine,
    pub timeout: Duration,
    pub stats: RequestStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizeQuery {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub domain_id: Option<String>,
    pub project_id: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenForm {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub code_verifier: Option<String>,
    pub domain_id: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AccessTokenForm {
    pub access_token: String,
}

/// Decrements the in-flight gauge when the request finishes or is dropped.
struct InFlight(Arc<AtomicU64>);

impl InFlight {
    fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Run `work` under the request deadline and render its outcome.
async fn respond<T, F>(state: &ApiState, endpoint: &'static str, work: F) -> Response
where
    F: Future<Output = Result<T, ApiError>>,
    T: IntoResponse,
{
    let started = Instant::now();
    state.stats.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = InFlight::enter(&state.stats.in_flight);

    let outcome = match tokio::time::timeout(state.timeout, work).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ApiError::Timeout(state.timeout)),
    };

    let response = match outcome {
        Ok(body) => body.into_response(),
        Err(e) => {
            state.stats.errors_total.fetch_add(1, Ordering::Relaxed);
            debug!(endpoint, error = %e, code = e.code(), "request failed");
            e.into_response()
        }
    };
    metrics::record_request(
        endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

#[instrument(skip_all, fields(request_id = %request_id, client_id = tracing::field::Empty))]
pub async fn authorize(
    state: &ApiState,
    headers: &HeaderMap,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
    request_id: String,
) -> Response {
    respond(state, "authorize", async {
        let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
        tracing::Span::current().record("client_id", query.client_id.as_str());
        let (username, password) = basic_credentials(headers)?.unzip();
        let request = AuthorizeRequest {
            response_type: query.response_type,
            client_id: query.client_id,
            redirect_uri: query.redirect_uri,
            state: query.state,
            username,
            password,
            scope: ScopeRequest {
                domain_id: query.domain_id,
                project_id: query.project_id,
            },
            code_challenge: query.code_challenge,
            code_challenge_method: query.code_challenge_method,
        };
        let response = match state.engine.authorize(&request).await? {
            AuthorizeResponse::Code(code) => Json(code).into_response(),
            AuthorizeResponse::Token(token) => Json(token).into_response(),
        };
        Ok::<_, ApiError>(response)
    })
    .await
}

#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn token(
    state: &ApiState,
    headers: &HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
    request_id: String,
) -> Response {
    respond(state, "token", async {
        let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let request = token_request(headers, form)?;
        let token = state.engine.token(&request).await?;
        Ok::<_, ApiError>(Json(token))
    })
    .await
}

#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn validate(
    state: &ApiState,
    form: Result<Form<AccessTokenForm>, FormRejection>,
    request_id: String,
) -> Response {
    respond(state, "validate", async {
        let access_token = access_token(form)?;
        let token = state.engine.validate_token(&access_token).await?;
        Ok::<_, ApiError>(Json(token))
    })
    .await
}

#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn revoke(
    state: &ApiState,
    form: Result<Form<AccessTokenForm>, FormRejection>,
    request_id: String,
) -> Response {
    respond(state, "revoke", async {
        let access_token = access_token(form)?;
        state.engine.revoke_token(&access_token).await?;
        Ok::<_, ApiError>(StatusCode::NO_CONTENT)
    })
    .await
}

fn access_token(form: Result<Form<AccessTokenForm>, FormRejection>) -> Result<String, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if form.access_token.is_empty() {
        return Err(ApiError::BadRequest("access_token is required".into()));
    }
    Ok(form.access_token)
}

/// Merge HTTP Basic client credentials into the form. A client may
/// authenticate with one method only.
fn token_request(headers: &HeaderMap, form: TokenForm) -> Result<TokenRequest, ApiError> {
    let mut client_id = form.client_id;
    let mut client_secret = form.client_secret;

    if let Some((basic_id, basic_secret)) = basic_credentials(headers)? {
        if client_secret.is_some() {
            return Err(ApiError::BadRequest(
                "client credentials given in both the Authorization header and the body".into(),
            ));
        }
        if client_id.as_deref().is_some_and(|id| id != basic_id) {
            return Err(ApiError::BadRequest(
                "client_id does not match the Authorization header".into(),
            ));
        }
        client_id = Some(basic_id);
        client_secret = Some(basic_secret);
    }

    Ok(TokenRequest {
        grant_type: form.grant_type,
        code: form.code,
        redirect_uri: form.redirect_uri,
        client_id,
        client_secret,
        username: form.username,
        password: form.password,
        refresh_token: form.refresh_token,
        code_verifier: form.code_verifier,
        scope: ScopeRequest {
            domain_id: form.domain_id,
            project_id: form.project_id,
        },
    })
}

/// Parse `Authorization: Basic base64(id:secret)`.
fn basic_credentials(headers: &HeaderMap) -> Result<Option<(String, String)>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let malformed = || ApiError::BadRequest("malformed Basic authorization header".into());

    let value = value.to_str().map_err(|_| malformed())?;
    let Some(encoded) = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))
    else {
        return Ok(None);
    };
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (id, secret) = decoded.split_once(':').ok_or_else(malformed)?;
    Ok(Some((id.to_owned(), secret.to_owned())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(id: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn basic_credentials_fill_the_client() {
        let form = TokenForm {
            grant_type: "client_credentials".into(),
            domain_id: Some("d1".into()),
            ..Default::default()
        };
        let request = token_request(&basic("c1", "s3:cret"), form).unwrap();
        assert_eq!(request.client_id.as_deref(), Some("c1"));
        assert_eq!(request.client_secret.as_deref(), Some("s3:cret"));
        assert_eq!(request.scope, ScopeRequest::domain("d1"));
    }

    #[test]
    fn two_authentication_methods_are_rejected() {
        let form = TokenForm {
            grant_type: "client_credentials".into(),
            client_secret: Some("body-secret".into()),
            ..Default::default()
        };
        assert!(matches!(
            token_request(&basic("c1", "s"), form),
            Err(ApiError::BadRequest(_))
        ));

        let form = TokenForm {
            grant_type: "client_credentials".into(),
            client_id: Some("other".into()),
            ..Default::default()
        };
        assert!(token_request(&basic("c1", "s"), form).is_err());
    }

    #[test]
    fn bearer_header_is_not_client_authentication() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(basic_credentials(&headers).unwrap().is_none());
    }

    #[test]
    fn garbage_basic_header_is_bad_request() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(basic_credentials(&headers).is_err());

        let mut headers = HeaderMap::new();
        let no_colon = format!("Basic {}", STANDARD.encode("c1"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&no_colon).unwrap());
        assert!(basic_credentials(&headers).is_err());
    }

    #[test]
    fn in_flight_guard_balances() {
        let counter = Arc::new(AtomicU64::new(0));
        {
            let _a = InFlight::enter(&counter);
            let _b = InFlight::enter(&counter);
            assert_eq!(counter.load(Ordering::Relaxed), 2);
        }
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
