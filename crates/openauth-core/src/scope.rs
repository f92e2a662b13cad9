//! Authorization scope
//!
//! A scope is either a domain or a project, never both and never neither.
//! The enum makes any other shape unrepresentable; its serialized form is a
//! single-key object, `{"domain_id": ".."}` or `{"project_id": ".."}`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The authorization boundary a code or token is valid for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "domain_id")]
    Domain(String),
    #[serde(rename = "project_id")]
    Project(String),
}

impl Scope {
    pub fn domain_id(&self) -> Option<&str> {
        match self {
            Scope::Domain(id) => Some(id),
            Scope::Project(_) => None,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        match self {
            Scope::Project(id) => Some(id),
            Scope::Domain(_) => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Domain(id) => write!(f, "domain:{id}"),
            Scope::Project(id) => write!(f, "project:{id}"),
        }
    }
}

/// An unvalidated scope as it arrives on a request.
///
/// Both fields are optional on the wire; the scope resolver decides whether
/// the combination is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScopeRequest {
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ScopeRequest {
    pub fn domain(id: impl Into<String>) -> Self {
        Self {
            domain_id: Some(id.into()),
            project_id: None,
        }
    }

    pub fn project(id: impl Into<String>) -> Self {
        Self {
            domain_id: None,
            project_id: Some(id.into()),
        }
    }
}
