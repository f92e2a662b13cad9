//! Shared fixtures for engine tests.

use std::sync::Arc;

use common::Secret;
use openauth_core::{
    Application, DirectoryEntry, MemoryApplications, MemoryDirectory, MemoryIdentity, MemoryStore,
};

use crate::codes::CodeExchange;
use crate::policy::Policy;
use crate::resolver::ScopeResolver;
use crate::service::{Collaborators, Engine};

fn entry(id: &str, enabled: bool) -> DirectoryEntry {
    DirectoryEntry {
        id: id.into(),
        name: format!("{id} name"),
        enabled,
    }
}

/// Domains `d1` (enabled) and `d-off` (disabled); project `p1`.
pub fn domains() -> Arc<MemoryDirectory> {
    Arc::new(MemoryDirectory::new(
        "domain",
        [entry("d1", true), entry("d-off", false)],
    ))
}

pub fn projects() -> Arc<MemoryDirectory> {
    Arc::new(MemoryDirectory::new("project", [entry("p1", true)]))
}

pub fn resolver() -> ScopeResolver {
    ScopeResolver::new(domains(), projects())
}

/// Client `c1` with secret `c1-secret`, redirecting to `https://x/cb`.
pub fn confidential_app() -> Application {
    Application {
        client_id: "c1".into(),
        client_secret: Some(Secret::new("c1-secret".to_string())),
        redirect_uris: vec!["https://x/cb".into()],
    }
}

/// Public client `pub1`, redirecting to `https://pub/cb`.
pub fn public_app() -> Application {
    Application {
        client_id: "pub1".into(),
        client_secret: None,
        redirect_uris: vec!["https://pub/cb".into()],
    }
}

pub fn exchange_for(code: &str) -> CodeExchange {
    CodeExchange {
        code: code.into(),
        client_id: "c1".into(),
        redirect_uri: "https://x/cb".into(),
        code_verifier: None,
    }
}

pub fn collaborators() -> Collaborators {
    Collaborators {
        domains: domains(),
        projects: projects(),
        applications: Arc::new(MemoryApplications::new([confidential_app(), public_app()])),
        identity: Arc::new(
            MemoryIdentity::new().with_user("alice", "u-alice", MemoryIdentity::digest("alice-pw")),
        ),
    }
}

pub fn engine_with(policy: Policy) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Engine::new(policy, collaborators(), store.clone()), store)
}

pub fn engine() -> (Engine, Arc<MemoryStore>) {
    engine_with(Policy::default())
}
