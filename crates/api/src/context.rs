use stockflow_auth::{Identity, Role};
use stockflow_core::UserId;

/// The authenticated caller, attached to every protected request.
///
/// Immutable once the gate has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    identity: Identity,
}

impl RequestContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The id every ledger entry of this request is attributed to.
    pub fn actor_id(&self) -> UserId {
        self.identity.subject_id
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }
}
