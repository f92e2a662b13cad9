//! Collaborator contracts and their in-memory implementations
//!
//! The engine does not own domains, projects, applications or user
//! credentials. It reaches them through these traits. The `Memory*` types
//! hold a fixed set of records and back the server's config-driven
//! deployment as well as the engine tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use common::Secret;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Future returned by collaborator lookups.
pub type LookupFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A domain or project record as far as the engine cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

/// Existence lookups for one kind of scope target (domains or projects).
pub trait Directory: Send + Sync {
    /// Human-readable kind used in error messages ("domain", "project").
    fn kind(&self) -> &'static str;

    fn exists<'a>(&'a self, id: &'a str) -> LookupFuture<'a, bool>;

    /// Fetch a record; `Error::NotFound` when absent.
    fn get<'a>(&'a self, id: &'a str) -> LookupFuture<'a, DirectoryEntry>;
}

/// A registered client application.
#[derive(Debug, Clone)]
pub struct Application {
    pub client_id: String,
    /// Absent for public clients
    pub client_secret: Option<Secret<String>>,
    pub redirect_uris: Vec<String>,
}

impl Application {
    /// Exact-match check against the registered redirect URIs.
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    /// Authenticate a client presenting `secret`.
    ///
    /// Confidential clients must present their secret. Public clients pass
    /// unless `require_secret` is set (client credentials grant).
    pub fn authenticate(&self, secret: Option<&str>, require_secret: bool) -> Result<()> {
        match (&self.client_secret, secret) {
            (Some(expected), Some(presented)) if expected.matches(presented) => Ok(()),
            (Some(_), _) => Err(Error::InvalidClient(format!(
                "client {} failed authentication",
                self.client_id
            ))),
            (None, _) if require_secret => Err(Error::InvalidClient(format!(
                "client {} is public and cannot use this grant",
                self.client_id
            ))),
            (None, _) => Ok(()),
        }
    }
}

/// Registry of client applications.
pub trait ApplicationRegistry: Send + Sync {
    /// `Error::NotFound` when the client is not registered.
    fn get_application<'a>(&'a self, client_id: &'a str) -> LookupFuture<'a, Application>;
}

/// Resource owner password verification.
pub trait IdentityVerifier: Send + Sync {
    /// Returns the user id on success, `Error::InvalidCredentials` otherwise.
    fn verify_password<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> LookupFuture<'a, String>;
}

/// Fixed set of domains or projects.
pub struct MemoryDirectory {
    kind: &'static str,
    entries: HashMap<String, DirectoryEntry>,
}

impl MemoryDirectory {
    pub fn new(kind: &'static str, entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        Self {
            kind,
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }
}

impl Directory for MemoryDirectory {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn exists<'a>(&'a self, id: &'a str) -> LookupFuture<'a, bool> {
        Box::pin(async move { Ok(self.entries.contains_key(id)) })
    }

    fn get<'a>(&'a self, id: &'a str) -> LookupFuture<'a, DirectoryEntry> {
        Box::pin(async move {
            self.entries
                .get(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("{} {id} not found", self.kind)))
        })
    }
}

/// Fixed set of applications keyed by client id.
pub struct MemoryApplications {
    apps: HashMap<String, Application>,
}

impl MemoryApplications {
    pub fn new(apps: impl IntoIterator<Item = Application>) -> Self {
        Self {
            apps: apps.into_iter().map(|a| (a.client_id.clone(), a)).collect(),
        }
    }
}

impl ApplicationRegistry for MemoryApplications {
    fn get_application<'a>(&'a self, client_id: &'a str) -> LookupFuture<'a, Application> {
        Box::pin(async move {
            self.apps
                .get(client_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("application {client_id} not found")))
        })
    }
}

struct UserEntry {
    user_id: String,
    password_sha256: String,
}

/// Fixed set of users with SHA-256 password digests.
#[derive(Default)]
pub struct MemoryIdentity {
    users: HashMap<String, UserEntry>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user by the lowercase hex SHA-256 of their password.
    pub fn with_user(
        mut self,
        username: impl Into<String>,
        user_id: impl Into<String>,
        password_sha256: impl Into<String>,
    ) -> Self {
        self.users.insert(
            username.into(),
            UserEntry {
                user_id: user_id.into(),
                password_sha256: password_sha256.into().to_ascii_lowercase(),
            },
        );
        self
    }

    /// Lowercase hex SHA-256 of a password, the form `with_user` expects.
    pub fn digest(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }
}

impl IdentityVerifier for MemoryIdentity {
    fn verify_password<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> LookupFuture<'a, String> {
        Box::pin(async move {
            let presented = Secret::new(Self::digest(password));
            match self.users.get(username) {
                Some(user) if presented.matches(&user.password_sha256) => Ok(user.user_id.clone()),
                _ => Err(Error::InvalidCredentials(
                    "username or password is incorrect".into(),
                )),
            }
        })
    }
}
