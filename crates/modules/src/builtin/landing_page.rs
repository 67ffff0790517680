//! Marketing site editor. Superadmin only.

use bizdesk_auth::{PermissionDef, RoleKind};

use crate::{ModuleDescriptor, RoleGrants, StaticModule};

pub fn plugin() -> StaticModule {
    StaticModule::new(
        ModuleDescriptor::new("LandingPage", "Landing Page", 5)
            .with_package("landing-page")
            .admin_only(),
        vec![
            PermissionDef::new("manage-landing-page", "Manage landing page"),
            PermissionDef::new("edit-landing-page", "Edit landing page"),
        ],
        RoleGrants::new().grant(
            RoleKind::SuperAdmin,
            &["manage-landing-page", "edit-landing-page"],
        ),
    )
}
