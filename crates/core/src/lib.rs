//! `stockflow-core`: shared domain primitives.
//!
//! Identifiers and the business error taxonomy used by every other crate.
//! No IO lives here.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{MovementId, ProductId, UserId};
