//! Issuance policy: lifetimes and enabled grant types

use std::collections::HashSet;

use openauth_core::{
    DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_AUTH_CODE_TTL_SECS, DEFAULT_REFRESH_TOKEN_TTL_SECS,
    Error, GrantType, Result,
};

/// Lifetimes are in seconds.
#[derive(Debug, Clone)]
pub struct Policy {
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub auth_code_ttl_secs: i64,
    pub enabled_grants: HashSet<GrantType>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            auth_code_ttl_secs: DEFAULT_AUTH_CODE_TTL_SECS,
            enabled_grants: GrantType::ALL.into_iter().collect(),
        }
    }
}

impl Policy {
    /// Same policy with only `grants` enabled.
    pub fn with_grants(mut self, grants: impl IntoIterator<Item = GrantType>) -> Self {
        self.enabled_grants = grants.into_iter().collect();
        self
    }

    pub fn is_enabled(&self, grant: GrantType) -> bool {
        self.enabled_grants.contains(&grant)
    }

    pub fn ensure_enabled(&self, grant: GrantType) -> Result<()> {
        if self.is_enabled(grant) {
            Ok(())
        } else {
            Err(Error::UnsupportedGrantType(format!("{grant} is disabled")))
        }
    }
}
