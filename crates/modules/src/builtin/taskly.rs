use bizdesk_auth::{PermissionDef, RoleKind};

use crate::{ModuleDescriptor, RoleGrants, StaticModule};

pub fn plugin() -> StaticModule {
    StaticModule::new(
        ModuleDescriptor::new("Taskly", "Project Management", 50)
            .with_prices(1000, 10000)
            .with_package("taskly"),
        vec![
            PermissionDef::new("manage-projects", "Manage projects"),
            PermissionDef::new("create-projects", "Create projects"),
            PermissionDef::new("edit-projects", "Edit projects"),
            PermissionDef::new("delete-projects", "Delete projects"),
            PermissionDef::new("manage-tasks", "Manage tasks"),
            PermissionDef::new("create-tasks", "Create tasks"),
            PermissionDef::new("edit-tasks", "Edit tasks"),
            PermissionDef::new("manage-bugs", "Manage bug reports"),
        ],
        RoleGrants::new()
            .grant(
                RoleKind::Company,
                &[
                    "manage-projects",
                    "create-projects",
                    "edit-projects",
                    "delete-projects",
                    "manage-tasks",
                    "create-tasks",
                    "edit-tasks",
                    "manage-bugs",
                ],
            )
            .grant(
                RoleKind::Staff,
                &["manage-projects", "manage-tasks", "create-tasks", "edit-tasks", "manage-bugs"],
            )
            .grant(RoleKind::Client, &["manage-projects", "manage-bugs"]),
    )
}
