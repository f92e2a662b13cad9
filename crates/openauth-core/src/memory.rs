//! In-memory storage adapter
//!
//! Codes and tokens live in two maps, each behind a tokio Mutex. Every
//! check-and-set acquires the locks it needs (always codes before tokens),
//! then evaluates and mutates without another await point. A caller that is
//! cancelled while waiting for a lock has changed nothing; once the locks
//! are held the operation runs to completion.
//!
//! Nothing is persisted. A restart forgets every code and token, which
//! invalidates them all.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::code::{AuthorizationCode, CodeCondition};
use crate::opaque::fingerprint;
use crate::store::{
    CasOutcome, CodeStore, GrantStore, MintFromCode, MintFromParent, Rejection, Revocation,
    StoreError, StoreFuture, TokenStore,
};
use crate::token::{RefreshCondition, TokenRecord};

#[derive(Default)]
struct TokenTable {
    by_access: HashMap<String, TokenRecord>,
    /// refresh token → access token of the record that carries it
    by_refresh: HashMap<String, String>,
}

impl TokenTable {
    fn insert(&mut self, record: TokenRecord) -> Result<(), StoreError> {
        let access = record.token.access_token.clone();
        if self.by_access.contains_key(&access) {
            return Err(StoreError::Duplicate(format!(
                "access token {}",
                fingerprint(&access)
            )));
        }
        if let Some(refresh) = &record.token.refresh_token {
            if self.by_refresh.contains_key(refresh) {
                return Err(StoreError::Duplicate(format!(
                    "refresh token {}",
                    fingerprint(refresh)
                )));
            }
            self.by_refresh.insert(refresh.clone(), access.clone());
        }
        self.by_access.insert(access, record);
        Ok(())
    }
}

/// Code and token store held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    codes: Mutex<HashMap<String, AuthorizationCode>>,
    tokens: Mutex<TokenTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of codes currently held, consumed or not.
    pub async fn code_count(&self) -> usize {
        self.codes.lock().await.len()
    }

    /// Number of token records currently held.
    pub async fn token_count(&self) -> usize {
        self.tokens.lock().await.by_access.len()
    }
}

impl CodeStore for MemoryStore {
    fn create_code(&self, code: AuthorizationCode) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut codes = self.codes.lock().await;
            if codes.contains_key(&code.value) {
                return Err(StoreError::Duplicate(format!(
                    "authorization code {}",
                    fingerprint(&code.value)
                )));
            }
            codes.insert(code.value.clone(), code);
            Ok(())
        })
    }

    fn get_code<'a>(&'a self, value: &'a str) -> StoreFuture<'a, Option<AuthorizationCode>> {
        Box::pin(async move { Ok(self.codes.lock().await.get(value).cloned()) })
    }

    fn consume_code<'a>(
        &'a self,
        value: &'a str,
        condition: &'a CodeCondition,
    ) -> StoreFuture<'a, CasOutcome<AuthorizationCode>> {
        Box::pin(async move {
            let mut codes = self.codes.lock().await;
            let Some(code) = codes.get_mut(value) else {
                return Ok(CasOutcome::Rejected(Rejection::UnknownCode));
            };
            if let Err(rejection) = condition.check(code) {
                return Ok(CasOutcome::Rejected(rejection));
            }
            code.consumed = true;
            Ok(CasOutcome::Applied(code.clone()))
        })
    }

    fn sweep_expired_codes(&self, now: i64) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let mut codes = self.codes.lock().await;
            let before = codes.len();
            codes.retain(|_, code| code.expires_at > now);
            let removed = before - codes.len();
            debug!(removed, remaining = codes.len(), "swept expired authorization codes");
            Ok(removed)
        })
    }
}

impl TokenStore for MemoryStore {
    fn create_token(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.tokens.lock().await.insert(record) })
    }

    fn get_token<'a>(&'a self, access_token: &'a str) -> StoreFuture<'a, Option<TokenRecord>> {
        Box::pin(async move { Ok(self.tokens.lock().await.by_access.get(access_token).cloned()) })
    }

    fn rotate_refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        condition: &'a RefreshCondition,
        mint: MintFromParent<'a>,
    ) -> StoreFuture<'a, CasOutcome<TokenRecord>> {
        Box::pin(async move {
            let mut table = self.tokens.lock().await;
            let Some(parent_access) = table.by_refresh.get(refresh_token).cloned() else {
                return Ok(CasOutcome::Rejected(Rejection::UnknownRefreshToken));
            };
            let Some(parent) = table.by_access.get(&parent_access) else {
                return Ok(CasOutcome::Rejected(Rejection::UnknownRefreshToken));
            };
            if let Err(rejection) = condition.check(parent) {
                return Ok(CasOutcome::Rejected(rejection));
            }

            let successor = mint(parent);
            table.insert(successor.clone())?;
            if let Some(parent) = table.by_access.get_mut(&parent_access) {
                parent.refresh_rotated = true;
            }
            Ok(CasOutcome::Applied(successor))
        })
    }

    fn revoke_token<'a>(&'a self, access_token: &'a str) -> StoreFuture<'a, Revocation> {
        Box::pin(async move {
            let mut table = self.tokens.lock().await;
            let outcome = match table.by_access.get_mut(access_token) {
                None => Revocation::NotFound,
                Some(record) if record.revoked => Revocation::AlreadyRevoked,
                Some(record) => {
                    record.revoked = true;
                    Revocation::Revoked
                }
            };
            Ok(outcome)
        })
    }

    fn sweep_expired_tokens(&self, now: i64) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let mut table = self.tokens.lock().await;
            let TokenTable {
                by_access,
                by_refresh,
            } = &mut *table;
            let before = by_access.len();
            by_access.retain(|_, record| {
                let dead = record.is_dead(now);
                if dead {
                    if let Some(refresh) = &record.token.refresh_token {
                        by_refresh.remove(refresh);
                    }
                }
                !dead
            });
            let removed = before - by_access.len();
            debug!(removed, remaining = by_access.len(), "swept expired tokens");
            Ok(removed)
        })
    }
}

impl GrantStore for MemoryStore {
    fn redeem_code<'a>(
        &'a self,
        value: &'a str,
        condition: &'a CodeCondition,
        mint: MintFromCode<'a>,
    ) -> StoreFuture<'a, CasOutcome<TokenRecord>> {
        Box::pin(async move {
            let mut codes = self.codes.lock().await;
            let mut table = self.tokens.lock().await;

            let Some(code) = codes.get_mut(value) else {
                return Ok(CasOutcome::Rejected(Rejection::UnknownCode));
            };
            if let Err(rejection) = condition.check(code) {
                return Ok(CasOutcome::Rejected(rejection));
            }

            let record = mint(code);
            table.insert(record.clone())?;
            code.consumed = true;
            Ok(CasOutcome::Applied(record))
        })
    }
}
