use crate::Id;
use serde::{Deserialize, Serialize};

/// The already-authenticated caller of every domain operation.
///
/// Resolved by the external auth collaborator; the core never checks
/// credentials. All reads and writes are scoped to `tenant_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub tenant_id: Id,
    pub user_id: Id,
}

impl Identity {
    pub fn new(tenant_id: Id, user_id: Id) -> Self {
        Self { tenant_id, user_id }
    }
}
