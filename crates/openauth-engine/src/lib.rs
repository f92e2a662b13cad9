//! Authorization and token lifecycle engine
//!
//! Issues authorization codes, exchanges them for tokens, validates,
//! refreshes and revokes tokens. Every token and code is bound to exactly one
//! scope (a domain or a project).
//!
//! Request flow:
//! 1. `GrantRouter::authorize` checks the client, redirect URI and scope, then
//!    issues a code (`response_type=code`) or an implicit token
//! 2. `GrantRouter::token` dispatches on `grant_type`
//! 3. `AuthCodeManager` owns code consumption, `TokenManager` owns every
//!    token transition
//! 4. `spawn_sweep_task` deletes expired codes and dead tokens out of band
//!
//! `Engine` wires the pieces together from explicitly passed collaborators
//! and storage and exposes the `Service` surface.

pub mod codes;
pub mod metrics;
pub mod policy;
pub mod resolver;
pub mod router;
pub mod service;
pub mod sweep;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

pub use codes::{AuthCodeManager, CodeExchange, CodeRequest};
pub use policy::Policy;
pub use resolver::ScopeResolver;
pub use router::{AuthorizeRequest, AuthorizeResponse, GrantRouter, TokenRequest};
pub use service::{Collaborators, Engine, EngineFuture, Service};
pub use sweep::{SweepReport, spawn_sweep_task, sweep_once};
pub use tokens::TokenManager;
