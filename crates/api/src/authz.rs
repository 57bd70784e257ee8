//! Route-level role checks, run after the gate has authenticated the caller.

use stockflow_auth::{Role, authorize};

use crate::app::errors::ApiError;
use crate::context::RequestContext;

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Fail with `Forbidden` unless the caller's role is in `allowed`.
///
/// An empty slice admits any authenticated caller.
pub fn require_roles(ctx: &RequestContext, allowed: &[Role]) -> Result<(), ApiError> {
    authorize(ctx.identity(), allowed).map_err(|e| {
        tracing::debug!(user_id = %ctx.actor_id(), role = %ctx.role(), "role check failed");
        ApiError::from(e)
    })
}
