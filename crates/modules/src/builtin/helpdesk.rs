//! Helpdesk and its categories add-on.
//!
//! The categories module is sold separately and seeds right after Helpdesk.

use bizdesk_auth::{PermissionDef, RoleKind};

use crate::{ModuleDescriptor, RoleGrants, StaticModule};

pub fn plugin() -> StaticModule {
    StaticModule::new(
        ModuleDescriptor::new("Helpdesk", "Helpdesk", 30)
            .with_prices(900, 9000)
            .with_package("helpdesk"),
        vec![
            PermissionDef::new("manage-helpdesk", "Manage helpdesk"),
            PermissionDef::new("manage-helpdesk-tickets", "Manage tickets"),
            PermissionDef::new("create-helpdesk-tickets", "Create tickets"),
            PermissionDef::new("reply-helpdesk-tickets", "Reply to tickets"),
            PermissionDef::new("delete-helpdesk-tickets", "Delete tickets"),
        ],
        // Agents look up requesters in the shared contact book owned by CRM.
        RoleGrants::new()
            .grant(
                RoleKind::Company,
                &[
                    "manage-helpdesk",
                    "manage-helpdesk-tickets",
                    "create-helpdesk-tickets",
                    "reply-helpdesk-tickets",
                    "delete-helpdesk-tickets",
                    "manage-contacts",
                ],
            )
            .grant(
                RoleKind::Staff,
                &["manage-helpdesk-tickets", "reply-helpdesk-tickets", "manage-contacts"],
            )
            .grant(
                RoleKind::Client,
                &["manage-helpdesk-tickets", "create-helpdesk-tickets", "reply-helpdesk-tickets"],
            ),
    )
}

pub fn categories_plugin() -> StaticModule {
    StaticModule::new(
        ModuleDescriptor::new("HelpdeskCategories", "Helpdesk Categories", 31)
            .with_prices(300, 3000)
            .with_package("helpdesk-categories"),
        vec![
            PermissionDef::new("manage-helpdesk-categories", "Manage ticket categories"),
            PermissionDef::new("create-helpdesk-categories", "Create ticket categories"),
            PermissionDef::new("edit-helpdesk-categories", "Edit ticket categories"),
            PermissionDef::new("delete-helpdesk-categories", "Delete ticket categories"),
        ],
        RoleGrants::new()
            .grant(
                RoleKind::Company,
                &[
                    "manage-helpdesk-categories",
                    "create-helpdesk-categories",
                    "edit-helpdesk-categories",
                    "delete-helpdesk-categories",
                ],
            )
            .grant(
                RoleKind::Staff,
                &[
                    "manage-helpdesk-categories",
                    "create-helpdesk-categories",
                    "edit-helpdesk-categories",
                ],
            ),
    )
}
