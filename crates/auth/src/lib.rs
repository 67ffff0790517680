//! `bizdesk-auth`: permission catalog and role store domain types.
//!
//! Decoupled from storage: infra persists these, external UIs read role
//! permission sets at session time and gate features with [`authorize`].

pub mod authorize;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, SessionPermissions, authorize};
pub use permissions::{Permission, PermissionDef, PermissionName};
pub use roles::{Role, RoleKind};
