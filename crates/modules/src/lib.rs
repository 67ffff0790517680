//! Module domain: catalog entries, manifests, plans, the plugin capability
//! interface and the compiled registry the propagation engine walks.
//!
//! Pure domain logic (no IO). Filesystem discovery and persistence live in
//! `bizdesk-infra`.

pub mod add_on;
pub mod builtin;
pub mod core_permissions;
pub mod descriptor;
pub mod manifest;
pub mod plan;
pub mod plugin;
pub mod registry;
pub mod state;

pub use add_on::AddOn;
pub use bizdesk_core::ModuleKey;
pub use core_permissions::CorePermissions;
pub use descriptor::ModuleDescriptor;
pub use manifest::{ManifestError, ModuleManifest};
pub use plan::{Plan, PlanDraft, PlanValidationError};
pub use plugin::{ModulePlugin, PluginError, RoleGrants, StaticModule};
pub use registry::{
    CollisionPolicy, ModuleIndex, ModuleRegistry, ModuleRegistryBuilder, PermissionCollision,
    RegistryError,
};
pub use state::{ModuleState, ModuleTransition, TransitionError};
