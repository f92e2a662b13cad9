//! Configuration types and loading
//!
//! Config path precedence: `--config` CLI arg > `CONFIG_PATH` env var >
//! `openauth.toml`. Client secrets may be given inline or through
//! `client_secret_file` so they stay out of the TOML.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::Secret;
use openauth_core::{
    Application, DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_AUTH_CODE_TTL_SECS,
    DEFAULT_REFRESH_TOKEN_TTL_SECS, DirectoryEntry, GrantType, MAX_AUTH_CODE_TTL_SECS,
    MAX_TOKEN_TTL_SECS, MemoryApplications, MemoryDirectory, MemoryIdentity,
};
use openauth_engine::{Collaborators, Policy};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub domains: Vec<TargetConfig>,
    #[serde(default)]
    pub projects: Vec<TargetConfig>,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Deadline applied to every engine call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Token and code lifetimes, in seconds, and the enabled grants.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub auth_code_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub enabled_grants: Vec<GrantType>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            auth_code_ttl_secs: DEFAULT_AUTH_CODE_TTL_SECS,
            sweep_interval_secs: 60,
            enabled_grants: GrantType::ALL.to_vec(),
        }
    }
}

/// A domain or project
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A registered client application
#[derive(Debug, Deserialize)]
pub struct ApplicationConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<Secret<String>>,
    /// File holding the client secret (alternative to `client_secret`)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub redirect_uris: Vec<String>,
}

/// A resource owner for the password grant
#[derive(Debug, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub user_id: String,
    /// Lowercase hex SHA-256 of the password
    pub password_sha256: String,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.validate()?;
        config.resolve_secrets()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.server.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        let oauth = &self.oauth;
        for (name, value) in [
            ("access_token_ttl_secs", oauth.access_token_ttl_secs),
            ("refresh_token_ttl_secs", oauth.refresh_token_ttl_secs),
            ("auth_code_ttl_secs", oauth.auth_code_ttl_secs),
        ] {
            if value <= 0 {
                return Err(common::Error::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        for (name, value) in [
            ("access_token_ttl_secs", oauth.access_token_ttl_secs),
            ("refresh_token_ttl_secs", oauth.refresh_token_ttl_secs),
        ] {
            if value > MAX_TOKEN_TTL_SECS {
                return Err(common::Error::Config(format!(
                    "{name} must be at most {MAX_TOKEN_TTL_SECS}, got: {value}"
                )));
            }
        }
        if oauth.auth_code_ttl_secs > MAX_AUTH_CODE_TTL_SECS {
            return Err(common::Error::Config(format!(
                "auth_code_ttl_secs must be at most {MAX_AUTH_CODE_TTL_SECS}, got: {}",
                oauth.auth_code_ttl_secs
            )));
        }
        if oauth.sweep_interval_secs == 0 {
            return Err(common::Error::Config(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }

        ensure_unique("domain", self.domains.iter().map(|d| d.id.as_str()))?;
        ensure_unique("project", self.projects.iter().map(|p| p.id.as_str()))?;
        ensure_unique(
            "application",
            self.applications.iter().map(|a| a.client_id.as_str()),
        )?;
        ensure_unique("user", self.users.iter().map(|u| u.username.as_str()))?;

        for app in &self.applications {
            if app.redirect_uris.is_empty() {
                return Err(common::Error::Config(format!(
                    "application {} must register at least one redirect_uri",
                    app.client_id
                )));
            }
            for uri in &app.redirect_uris {
                if !uri.starts_with("http://") && !uri.starts_with("https://") {
                    return Err(common::Error::Config(format!(
                        "redirect_uri must start with http:// or https://, got: {uri}"
                    )));
                }
            }
            if app.client_secret.is_some() && app.client_secret_file.is_some() {
                return Err(common::Error::Config(format!(
                    "application {} sets both client_secret and client_secret_file",
                    app.client_id
                )));
            }
        }

        for user in &self.users {
            let digest = &user.password_sha256;
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(common::Error::Config(format!(
                    "password_sha256 for user {} must be 64 hex characters",
                    user.username
                )));
            }
        }
        Ok(())
    }

    /// Read `client_secret_file` entries. An empty file means a public client.
    fn resolve_secrets(&mut self) -> common::Result<()> {
        for app in &mut self.applications {
            let Some(ref secret_file) = app.client_secret_file else {
                continue;
            };
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                app.client_secret = Some(Secret::new(secret));
            }
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("openauth.toml")
    }

    pub fn policy(&self) -> Policy {
        Policy {
            access_token_ttl_secs: self.oauth.access_token_ttl_secs,
            refresh_token_ttl_secs: self.oauth.refresh_token_ttl_secs,
            auth_code_ttl_secs: self.oauth.auth_code_ttl_secs,
            enabled_grants: self.oauth.enabled_grants.iter().copied().collect(),
        }
    }

    /// In-memory collaborators holding the configured records.
    pub fn collaborators(&self) -> Collaborators {
        let entries = |targets: &[TargetConfig]| -> Vec<DirectoryEntry> {
            targets
                .iter()
                .map(|t| DirectoryEntry {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    enabled: t.enabled,
                })
                .collect()
        };

        let applications = self.applications.iter().map(|a| Application {
            client_id: a.client_id.clone(),
            client_secret: a.client_secret.clone(),
            redirect_uris: a.redirect_uris.clone(),
        });

        let identity = self
            .users
            .iter()
            .fold(MemoryIdentity::new(), |identity, u| {
                identity.with_user(&u.username, &u.user_id, &u.password_sha256)
            });

        Collaborators {
            domains: Arc::new(MemoryDirectory::new("domain", entries(&self.domains))),
            projects: Arc::new(MemoryDirectory::new("project", entries(&self.projects))),
            applications: Arc::new(MemoryApplications::new(applications)),
            identity: Arc::new(identity),
        }
    }
}

fn ensure_unique<'a>(kind: &'static str, ids: impl Iterator<Item = &'a str>) -> common::Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(common::Error::Duplicate {
                kind,
                id: id.to_owned(),
            });
        }
    }
    Ok(())
}
