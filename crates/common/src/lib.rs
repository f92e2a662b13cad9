//! Common types shared by the openauth crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
