//! Authenticate a bearer credential, then authorize the resolved identity.
//!
//! - No IO
//! - No panics
//! - CPU-only: never suspends

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use stockflow_core::UserId;

use crate::{JwtClaims, JwtValidator, Role};

/// The authenticated actor, trusted for the rest of the request.
///
/// Built from the token alone; role changes in the user store take effect
/// only once previously issued tokens expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject_id: UserId,
    pub username: String,
    pub role: Role,
}

impl From<JwtClaims> for Identity {
    fn from(claims: JwtClaims) -> Self {
        Self {
            subject_id: claims.sub,
            username: claims.username,
            role: claims.role,
        }
    }
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Gate failures. The first two must stay distinguishable: "log in" versus
/// "log in again".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no credential presented")]
    Unauthenticated,

    #[error("invalid or expired credential")]
    InvalidCredential,

    #[error("access denied for role '{role}'")]
    Forbidden { role: Role },
}

/// Verify a bearer token and return the embedded identity.
///
/// `None` or a blank token is [`AuthError::Unauthenticated`]; anything the
/// validator rejects (bad signature, malformed, expired) is
/// [`AuthError::InvalidCredential`].
pub fn authenticate(
    validator: &dyn JwtValidator,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Identity, AuthError> {
    let token = match token.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Err(AuthError::Unauthenticated),
    };

    let claims = validator.validate(token, now).map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        AuthError::InvalidCredential
    })?;

    Ok(Identity::from(claims))
}

/// Check the identity's role against the roles allowed for an operation.
///
/// An empty `allowed` slice admits any authenticated identity.
pub fn authorize(identity: &Identity, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.is_empty() || allowed.contains(&identity.role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden {
            role: identity.role,
        })
    }
}
