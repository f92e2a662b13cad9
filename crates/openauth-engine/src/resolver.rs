//! Scope resolution
//!
//! Turns a requested domain or project id into a `Scope`, after checking the
//! id is well formed and the target exists and is enabled. Existence is the
//! directory's `exists` answer; `get` is only consulted for known ids.

use std::sync::Arc;

use openauth_core::{Directory, Error, Result, Scope, ScopeRequest};
use tracing::debug;

/// Resolves requested scope targets against the domain and project directories.
#[derive(Clone)]
pub struct ScopeResolver {
    domains: Arc<dyn Directory>,
    projects: Arc<dyn Directory>,
}

impl ScopeResolver {
    pub fn new(domains: Arc<dyn Directory>, projects: Arc<dyn Directory>) -> Self {
        Self { domains, projects }
    }

    pub async fn resolve_domain_scope(&self, domain_id: &str) -> Result<Scope> {
        lookup(self.domains.as_ref(), domain_id).await?;
        Ok(Scope::Domain(domain_id.to_owned()))
    }

    pub async fn resolve_project_scope(&self, project_id: &str) -> Result<Scope> {
        lookup(self.projects.as_ref(), project_id).await?;
        Ok(Scope::Project(project_id.to_owned()))
    }

    /// Resolve a request carrying exactly one of `domain_id` / `project_id`.
    pub async fn resolve(&self, request: &ScopeRequest) -> Result<Scope> {
        match (request.domain_id.as_deref(), request.project_id.as_deref()) {
            (Some(domain_id), None) => self.resolve_domain_scope(domain_id).await,
            (None, Some(project_id)) => self.resolve_project_scope(project_id).await,
            (Some(_), Some(_)) => Err(Error::InvalidRequest(
                "malformed scope: give either domain_id or project_id, not both".into(),
            )),
            (None, None) => Err(Error::InvalidRequest(
                "malformed scope: domain_id or project_id is required".into(),
            )),
        }
    }
}

async fn lookup(directory: &dyn Directory, id: &str) -> Result<()> {
    let kind = directory.kind();
    if id.is_empty() || id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidRequest(format!("malformed {kind} id: {id:?}")));
    }

    if !directory.exists(id).await? {
        return Err(Error::NotFound(format!("{kind} {id} not found")));
    }
    let entry = directory.get(id).await?;
    if !entry.enabled {
        return Err(Error::InvalidRequest(format!("{kind} {id} is disabled")));
    }
    debug!(kind, id, name = %entry.name, "resolved scope target");
    Ok(())
}
