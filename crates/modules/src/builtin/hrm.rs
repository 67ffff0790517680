use bizdesk_auth::{PermissionDef, RoleKind};

use crate::{ModuleDescriptor, RoleGrants, StaticModule};

pub fn plugin() -> StaticModule {
    StaticModule::new(
        ModuleDescriptor::new("Hrm", "HRM", 10)
            .with_prices(1500, 15000)
            .with_package("hrm"),
        vec![
            PermissionDef::new("manage-hrm", "Manage HRM"),
            PermissionDef::new("manage-employees", "Manage employees"),
            PermissionDef::new("create-employees", "Create employees"),
            PermissionDef::new("edit-employees", "Edit employees"),
            PermissionDef::new("delete-employees", "Delete employees"),
            PermissionDef::new("manage-attendance", "Manage attendance"),
            PermissionDef::new("manage-leaves", "Manage leaves"),
            PermissionDef::new("create-leaves", "Apply for leave"),
            PermissionDef::new("approve-leaves", "Approve leaves"),
            PermissionDef::new("manage-holidays", "Manage holidays"),
            PermissionDef::new("manage-payroll", "Manage payroll"),
        ],
        RoleGrants::new()
            .grant(
                RoleKind::Company,
                &[
                    "manage-hrm",
                    "manage-employees",
                    "create-employees",
                    "edit-employees",
                    "delete-employees",
                    "manage-attendance",
                    "manage-leaves",
                    "approve-leaves",
                    "manage-holidays",
                    "manage-payroll",
                ],
            )
            .grant(
                RoleKind::Staff,
                &[
                    "manage-hrm",
                    "manage-attendance",
                    "manage-leaves",
                    "create-leaves",
                    "manage-holidays",
                ],
            )
            .grant(RoleKind::Client, &["manage-holidays"]),
    )
}
