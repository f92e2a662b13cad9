//! Core data model and storage contracts for the openauth engine
//!
//! Everything the authorization engine needs below its business logic lives
//! here: the scope, code and token types, the error taxonomy, opaque
//! credential generation, PKCE helpers, the collaborator traits the engine
//! calls out to, and the storage traits with their in-memory adapter.
//!
//! Single-use semantics are expressed at the storage boundary:
//! 1. `CodeStore::consume_code` flips an authorization code to consumed
//! 2. `GrantStore::redeem_code` consumes a code and inserts its token as one unit
//! 3. `TokenStore::rotate_refresh` retires a refresh token and inserts its successor
//!
//! Each of these evaluates its condition and applies its mutation in one
//! indivisible step, so concurrent callers resolve to exactly one winner.

pub mod clock;
pub mod code;
pub mod constants;
pub mod directory;
pub mod error;
pub mod memory;
pub mod opaque;
pub mod pkce;
pub mod scope;
pub mod store;
pub mod token;

pub use clock::unix_now;
pub use code::{AuthorizationCode, Code, CodeCondition};
pub use constants::*;
pub use directory::{
    Application, ApplicationRegistry, Directory, DirectoryEntry, IdentityVerifier, LookupFuture,
    MemoryApplications, MemoryDirectory, MemoryIdentity,
};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use scope::{Scope, ScopeRequest};
pub use store::{CasOutcome, CodeStore, GrantStore, Rejection, Revocation, StoreError, TokenStore};
pub use token::{GrantType, RefreshCondition, Token, TokenRecord};
