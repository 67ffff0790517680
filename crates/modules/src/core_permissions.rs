//! Permissions owned by the platform itself (module key `general`).

use bizdesk_auth::{PermissionDef, PermissionName, RoleKind};

use crate::RoleGrants;

/// Core permission table, always in effect regardless of active modules.
#[derive(Debug, Clone)]
pub struct CorePermissions {
    pub permissions: Vec<PermissionDef>,
    pub grants: RoleGrants,
}

impl CorePermissions {
    pub fn empty() -> Self {
        Self {
            permissions: Vec::new(),
            grants: RoleGrants::new(),
        }
    }

    pub fn standard() -> Self {
        Self {
            permissions: vec![
                PermissionDef::new("manage-companies", "Manage companies"),
                PermissionDef::new("manage-plans", "Manage plans"),
                PermissionDef::new("manage-add-ons", "Manage add-ons"),
                PermissionDef::new("manage-users", "Manage users"),
                PermissionDef::new("create-users", "Create users"),
                PermissionDef::new("edit-users", "Edit users"),
                PermissionDef::new("delete-users", "Delete users"),
                PermissionDef::new("manage-roles", "Manage roles"),
                PermissionDef::new("manage-company-settings", "Manage company settings"),
            ],
            grants: RoleGrants::new()
                .grant(
                    RoleKind::SuperAdmin,
                    &["manage-companies", "manage-plans", "manage-add-ons"],
                )
                .grant(
                    RoleKind::Company,
                    &[
                        "manage-users",
                        "create-users",
                        "edit-users",
                        "delete-users",
                        "manage-roles",
                        "manage-company-settings",
                    ],
                ),
        }
    }

    pub fn for_role(&self, role: &RoleKind) -> &[PermissionName] {
        self.grants.for_role(role)
    }
}

impl Default for CorePermissions {
    fn default() -> Self {
        Self::standard()
    }
}
