use bizdesk_auth::{PermissionDef, RoleKind};

use crate::{ModuleDescriptor, RoleGrants, StaticModule};

pub fn plugin() -> StaticModule {
    StaticModule::new(
        ModuleDescriptor::new("Crm", "CRM", 20)
            .with_prices(1200, 12000)
            .with_package("crm"),
        vec![
            PermissionDef::new("manage-crm", "Manage CRM"),
            PermissionDef::new("manage-leads", "Manage leads"),
            PermissionDef::new("create-leads", "Create leads"),
            PermissionDef::new("edit-leads", "Edit leads"),
            PermissionDef::new("delete-leads", "Delete leads"),
            PermissionDef::new("manage-deals", "Manage deals"),
            PermissionDef::new("create-deals", "Create deals"),
            PermissionDef::new("manage-contacts", "Manage contacts"),
        ],
        RoleGrants::new()
            .grant(
                RoleKind::Company,
                &[
                    "manage-crm",
                    "manage-leads",
                    "create-leads",
                    "edit-leads",
                    "delete-leads",
                    "manage-deals",
                    "create-deals",
                    "manage-contacts",
                ],
            )
            .grant(
                RoleKind::Staff,
                &["manage-crm", "manage-leads", "create-leads", "edit-leads", "manage-contacts"],
            )
            .grant(RoleKind::Client, &["manage-deals"]),
    )
}
