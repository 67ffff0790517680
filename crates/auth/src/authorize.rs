use std::collections::BTreeSet;

use thiserror::Error;

use bizdesk_core::TenantId;

use crate::{PermissionName, Role};

/// A role's permission set as resolved at session time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPermissions {
    pub active_tenant_id: Option<TenantId>,
    pub role: Role,
    pub permissions: BTreeSet<PermissionName>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Check a resolved role permission set against a required permission.
///
/// Pure set membership: no IO, no panics. System roles pass the tenant check
/// for any tenant; tenant roles only inside their own tenant.
pub fn authorize(session: &SessionPermissions, required: &PermissionName) -> Result<(), AuthzError> {
    if let Some(role_tenant) = session.role.tenant_id {
        if session.active_tenant_id != Some(role_tenant) {
            return Err(AuthzError::TenantMismatch);
        }
    }

    if session.permissions.contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
