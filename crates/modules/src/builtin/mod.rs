//! Modules compiled into the platform.
//!
//! Each module owns its permission declarations and its static role table.
//! Add a module by writing a `plugin()` constructor and listing it in [`all`].

use std::sync::Arc;

use crate::{CollisionPolicy, ModulePlugin, ModuleRegistry, RegistryError};

pub mod crm;
pub mod helpdesk;
pub mod hrm;
pub mod landing_page;
pub mod pos;
pub mod taskly;

pub fn all() -> Vec<Arc<dyn ModulePlugin>> {
    vec![
        Arc::new(hrm::plugin()),
        Arc::new(crm::plugin()),
        Arc::new(helpdesk::plugin()),
        Arc::new(helpdesk::categories_plugin()),
        Arc::new(pos::plugin()),
        Arc::new(taskly::plugin()),
        Arc::new(landing_page::plugin()),
    ]
}

/// Registry of every built-in module plus the standard core permissions.
pub fn registry(policy: CollisionPolicy) -> Result<ModuleRegistry, RegistryError> {
    ModuleRegistry::builder()
        .collision_policy(policy)
        .register_all(all())
        .build()
}
