//! openauth server
//!
//! Single-binary OAuth2 authorization server:
//! 1. Loads domains, projects, applications and users from TOML
//! 2. Builds the engine over an in-memory grant store
//! 3. Serves the authorize, token, validate and revoke endpoints
//! 4. Sweeps expired codes and tokens in the background

mod api;
mod config;
mod error;
mod metrics;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use openauth_core::MemoryStore;
use openauth_engine::{Engine, spawn_sweep_task};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{AccessTokenForm, ApiState, AuthorizeQuery, RequestStats, TokenForm};
use crate::config::Config;

/// How long in-flight requests get to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    api: ApiState,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/oauth2/authorize", get(authorize_handler))
        .route("/oauth2/token", post(token_handler))
        .route("/oauth2/validate", post(validate_handler))
        .route("/oauth2/revoke", post(revoke_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting openauth-server");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        domains = config.domains.len(),
        projects = config.projects.len(),
        applications = config.applications.len(),
        users = config.users.len(),
        enabled_grants = ?config.oauth.enabled_grants,
        "configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(config.policy(), config.collaborators(), store);
    let sweeper = spawn_sweep_task(
        engine.store(),
        Duration::from_secs(config.oauth.sweep_interval_secs),
    );

    let stats = RequestStats::new();
    let app_state = AppState {
        api: ApiState {
            engine,
            timeout: Duration::from_secs(config.server.request_timeout_secs),
            stats: stats.clone(),
        },
        prometheus: prometheus_handle,
    };
    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires: notify the
    // server to drain, then race the drain against DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());
    sweeper.abort();

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = stats.in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

async fn authorize_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> Response {
    api::authorize(&state.api, &headers, query, request_id()).await
}

async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    api::token(&state.api, &headers, form, request_id()).await
}

async fn validate_handler(
    State(state): State<AppState>,
    form: Result<Form<AccessTokenForm>, FormRejection>,
) -> Response {
    api::validate(&state.api, form, request_id()).await
}

async fn revoke_handler(
    State(state): State<AppState>,
    form: Result<Form<AccessTokenForm>, FormRejection>,
) -> Response {
    api::revoke(&state.api, form, request_id()).await
}

/// Health endpoint: status, uptime and request counters.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = &state.api.stats;
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": stats.started_at.elapsed().as_secs(),
        "requests_served": stats.requests_total.load(Ordering::Relaxed),
        "errors_total": stats.errors_total.load(Ordering::Relaxed),
        "in_flight": stats.in_flight.load(Ordering::Relaxed),
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine as _;
    use openauth_core::{Directory, DirectoryEntry, LookupFuture, pkce};
    use openauth_engine::Collaborators;
    use tower::ServiceExt;

    const CONFIG: &str = r#"
[server]
listen_addr = "127.0.0.1:0"
request_timeout_secs = 2

[[domains]]
id = "d1"

[[projects]]
id = "p1"

[[applications]]
client_id = "c1"
client_secret = "c1-secret"
redirect_uris = ["https://x/cb"]

[[applications]]
client_id = "pub1"
redirect_uris = ["https://pub/cb"]

[[users]]
username = "alice"
user_id = "u-alice"
password_sha256 = "cefd4bcd86ca3d6d9d1064593870b4cd4fdb3fef0136b1c43684cb7f58a29036"
"#;

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    fn state_with(collaborators: Collaborators, timeout: Duration) -> AppState {
        let config = Config::parse(CONFIG).unwrap();
        let engine = Engine::new(
            config.policy(),
            collaborators,
            Arc::new(MemoryStore::new()),
        );
        AppState {
            api: ApiState {
                engine,
                timeout,
                stats: RequestStats::new(),
            },
            prometheus: test_prometheus_handle(),
        }
    }

    fn test_app() -> Router {
        let config = Config::parse(CONFIG).unwrap();
        build_router(state_with(config.collaborators(), Duration::from_secs(2)), 1000)
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn basic(id: &str, secret: &str) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{id}:{secret}"));
        format!("Basic {encoded}")
    }

    /// Authorize request made on behalf of alice.
    fn owner_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("authorization", basic("alice", "alice-pw"))
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn authorize_code(app: &Router, scope: &str) -> String {
        let (status, json) = send(
            app,
            owner_request(&format!(
                "/oauth2/authorize?response_type=code&client_id=c1&redirect_uri=https://x/cb&state=st-1&{scope}"
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "authorize failed: {json}");
        assert_eq!(json["state"], "st-1");
        json["code"].as_str().unwrap().to_owned()
    }

    fn code_exchange(code: &str) -> String {
        format!(
            "grant_type=authorization_code&code={code}&redirect_uri=https://x/cb&client_id=c1&client_secret=c1-secret"
        )
    }

    #[tokio::test]
    async fn code_flow_over_http() {
        let app = test_app();
        let code = authorize_code(&app, "domain_id=d1").await;

        let (status, token) = send(&app, post_form("/oauth2/token", &code_exchange(&code))).await;
        assert_eq!(status, StatusCode::OK, "token failed: {token}");
        assert_eq!(token["scope"]["domain_id"], "d1");
        assert!(token["scope"].get("project_id").is_none());
        assert_eq!(token["token_type"], "bearer");
        assert_eq!(token["grant_type"], "authorization_code");
        assert_eq!(token["user_id"], "u-alice");

        let (status, err) = send(&app, post_form("/oauth2/token", &code_exchange(&code))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "invalid_grant");
        assert_eq!(
            err["error_description"],
            "authorization code has already been used"
        );
    }

    #[tokio::test]
    async fn validate_revoke_validate() {
        let app = test_app();
        let code = authorize_code(&app, "project_id=p1").await;
        let (_, token) = send(&app, post_form("/oauth2/token", &code_exchange(&code))).await;
        let access = token["access_token"].as_str().unwrap();

        let (status, validated) = send(
            &app,
            post_form("/oauth2/validate", &format!("access_token={access}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(validated["scope"]["project_id"], "p1");

        let (status, _) = send(
            &app,
            post_form("/oauth2/revoke", &format!("access_token={access}")),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, err) = send(
            &app,
            post_form("/oauth2/validate", &format!("access_token={access}")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err["error"], "invalid_token");

        let (status, err) = send(&app, post_form("/oauth2/revoke", "access_token=nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"], "not_found");

        let (status, err) = send(&app, post_form("/oauth2/validate", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "invalid_request");
    }

    #[tokio::test]
    async fn unknown_domain_is_404() {
        let app = test_app();
        let (status, err) = send(
            &app,
            owner_request("/oauth2/authorize?response_type=code&client_id=c1&redirect_uri=https://x/cb&state=s&domain_id=ghost"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error_description"], "domain ghost not found");
    }

    #[tokio::test]
    async fn password_grant_with_basic_client_auth() {
        let app = test_app();
        let as_client = |id: &str, secret: &str, body: String| {
            Request::builder()
                .method("POST")
                .uri("/oauth2/token")
                .header("content-type", "application/x-www-form-urlencoded")
                .header("authorization", basic(id, secret))
                .body(Body::from(body))
                .unwrap()
        };
        let request = as_client(
            "c1",
            "c1-secret",
            "grant_type=password&username=alice&password=alice-pw&domain_id=d1".into(),
        );
        let (status, token) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK, "got: {token}");
        assert_eq!(token["grant_type"], "resource_owner_password_credentials");
        let refresh = token["refresh_token"].as_str().unwrap().to_owned();
        let body = format!("grant_type=refresh_token&refresh_token={refresh}");

        let (status, err) = send(&app, as_client("ghost-client", "whatever", body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err["error"], "invalid_client");

        let (status, err) = send(&app, post_form("/oauth2/token", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "invalid_grant");
        assert_eq!(
            err["error_description"],
            "refresh token was issued to another client"
        );

        let (status, _) = send(&app, as_client("c1", "c1-secret", body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, err) = send(&app, as_client("c1", "c1-secret", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn client_errors_map_to_oauth_codes() {
        let app = test_app();

        let (status, err) = send(
            &app,
            post_form(
                "/oauth2/token",
                "grant_type=client_credentials&client_id=c1&client_secret=wrong&domain_id=d1",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err["error"], "invalid_client");

        let (status, err) = send(&app, post_form("/oauth2/token", "grant_type=implicit")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "unsupported_grant_type");

        let (status, err) = send(
            &app,
            owner_request("/oauth2/authorize?response_type=code&client_id=c1&redirect_uri=https://x/cb&state=s&domain_id=d1&project_id=p1"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "invalid_request");
    }

    #[tokio::test]
    async fn public_client_pkce_over_http() {
        let app = test_app();
        let verifier = pkce::generate_verifier();
        let challenge = pkce::compute_challenge(&verifier);

        let (status, json) = send(
            &app,
            owner_request(&format!(
                "/oauth2/authorize?response_type=code&client_id=pub1&redirect_uri=https://pub/cb&state=s&project_id=p1&code_challenge={challenge}&code_challenge_method=S256"
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "got: {json}");
        let code = json["code"].as_str().unwrap();

        let body = format!(
            "grant_type=authorization_code&code={code}&redirect_uri=https://pub/cb&client_id=pub1&code_verifier={verifier}"
        );
        let (status, token) = send(&app, post_form("/oauth2/token", &body)).await;
        assert_eq!(status, StatusCode::OK, "got: {token}");
        assert_eq!(token["scope"]["project_id"], "p1");
    }

    #[tokio::test]
    async fn implicit_authorize_returns_token() {
        let app = test_app();
        let (status, token) = send(
            &app,
            owner_request("/oauth2/authorize?response_type=token&client_id=c1&redirect_uri=https://x/cb&state=s&domain_id=d1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(token["grant_type"], "implicit");
        assert!(token.get("refresh_token").is_none());
    }

    #[tokio::test]
    async fn anonymous_authorize_is_refused() {
        let app = test_app();
        for response_type in ["token", "code"] {
            let uri = format!(
                "/oauth2/authorize?response_type={response_type}&client_id=c1&redirect_uri=https://x/cb&state=s&user_id=root-admin&domain_id=d1"
            );
            let (status, err) = send(&app, get_request(&uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "got: {err}");
            assert_eq!(err["error"], "invalid_request");
            assert!(err.get("access_token").is_none());
            assert!(err.get("code").is_none());

            let forged = Request::builder()
                .uri(&uri)
                .header("authorization", basic("alice", "not-her-password"))
                .body(Body::empty())
                .unwrap();
            let (status, err) = send(&app, forged).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(err["error"], "invalid_grant");
        }

        // a user_id parameter never overrides the authenticated owner
        let (status, token) = send(
            &app,
            owner_request("/oauth2/authorize?response_type=token&client_id=c1&redirect_uri=https://x/cb&state=s&user_id=root-admin&domain_id=d1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(token["user_id"], "u-alice");
    }

    /// Domain directory that never answers in time.
    struct StalledDirectory;

    impl Directory for StalledDirectory {
        fn kind(&self) -> &'static str {
            "domain"
        }

        fn exists<'a>(&'a self, _id: &'a str) -> LookupFuture<'a, bool> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(true)
            })
        }

        fn get<'a>(&'a self, id: &'a str) -> LookupFuture<'a, DirectoryEntry> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(DirectoryEntry {
                    id: id.to_owned(),
                    name: String::new(),
                    enabled: true,
                })
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_503() {
        let mut collaborators = Config::parse(CONFIG).unwrap().collaborators();
        collaborators.domains = Arc::new(StalledDirectory);
        let app = build_router(state_with(collaborators, Duration::from_secs(1)), 1000);

        let (status, err) = send(
            &app,
            owner_request("/oauth2/authorize?response_type=code&client_id=c1&redirect_uri=https://x/cb&state=s&domain_id=d1"),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err["error"], "temporarily_unavailable");
    }

    #[tokio::test]
    async fn health_counts_requests() {
        let app = test_app();
        authorize_code(&app, "domain_id=d1").await;
        send(&app, post_form("/oauth2/validate", "access_token=nope")).await;

        let (status, health) = send(&app, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["requests_served"], 2);
        assert_eq!(health["errors_total"], 1);
        assert_eq!(health["in_flight"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let response = test_app().oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; version=0.0.4; charset=utf-8"
        );
    }
}
