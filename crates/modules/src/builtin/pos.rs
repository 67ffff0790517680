use bizdesk_auth::{PermissionDef, RoleKind};

use crate::{ModuleDescriptor, RoleGrants, StaticModule};

pub fn plugin() -> StaticModule {
    StaticModule::new(
        ModuleDescriptor::new("Pos", "POS", 40)
            .with_prices(2000, 20000)
            .with_package("pos"),
        vec![
            PermissionDef::new("manage-pos", "Manage POS"),
            PermissionDef::new("create-pos-orders", "Create POS orders"),
            PermissionDef::new("manage-pos-reports", "View POS reports"),
            PermissionDef::new("manage-warehouses", "Manage warehouses"),
            PermissionDef::new("manage-purchases", "Manage purchases"),
        ],
        RoleGrants::new()
            .grant(
                RoleKind::Company,
                &[
                    "manage-pos",
                    "create-pos-orders",
                    "manage-pos-reports",
                    "manage-warehouses",
                    "manage-purchases",
                ],
            )
            .grant(RoleKind::Staff, &["manage-pos", "create-pos-orders"])
            .grant(RoleKind::Vendor, &["manage-purchases"]),
    )
}
