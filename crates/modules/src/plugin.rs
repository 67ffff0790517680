//! The capability interface every module implements.

use std::collections::BTreeSet;

use thiserror::Error;

use bizdesk_auth::{PermissionDef, PermissionName, RoleKind};
use bizdesk_core::TenantId;

use crate::ModuleDescriptor;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("module '{module}' failed: {message}")]
pub struct PluginError {
    pub module: String,
    pub message: String,
}

impl PluginError {
    pub fn new(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// Static role → permission table a module contributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGrants {
    grants: Vec<(RoleKind, Vec<PermissionName>)>,
}

impl RoleGrants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add permissions for a role (merges with earlier grants for the same role).
    pub fn grant(mut self, role: RoleKind, permissions: &[&'static str]) -> Self {
        let names = permissions.iter().map(|&p| PermissionName::from_static(p));
        match self.grants.iter_mut().find(|(r, _)| *r == role) {
            Some((_, existing)) => {
                for name in names {
                    if !existing.contains(&name) {
                        existing.push(name);
                    }
                }
            }
            None => self.grants.push((role, names.collect())),
        }
        self
    }

    pub fn for_role(&self, role: &RoleKind) -> &[PermissionName] {
        self.grants
            .iter()
            .find(|(r, _)| r == role)
            .map(|(_, p)| p.as_slice())
            .unwrap_or(&[])
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleKind> {
        self.grants.iter().map(|(r, _)| r)
    }

    /// Every permission named anywhere in the table.
    pub fn referenced(&self) -> BTreeSet<PermissionName> {
        self.grants
            .iter()
            .flat_map(|(_, p)| p.iter().cloned())
            .collect()
    }
}

/// A module's contract with the propagation engine.
///
/// Permission rows and role links are derived by the engine from
/// [`declared_permissions`](ModulePlugin::declared_permissions) and
/// [`role_grants`](ModulePlugin::role_grants); the hooks cover anything else a
/// module needs to do. Hooks run inside the activation unit of work, so an
/// error rolls the module's activation back.
pub trait ModulePlugin: Send + Sync {
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Permissions this module owns.
    fn declared_permissions(&self) -> &[PermissionDef];

    /// Which permissions each role gets while the module is active. May name
    /// permissions owned by other modules (shared permissions).
    fn role_grants(&self) -> &RoleGrants;

    fn on_activate(&self, _tenant_id: TenantId) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_deactivate(&self, _tenant_id: TenantId) -> Result<(), PluginError> {
        Ok(())
    }

    /// Package-level seeding run once per module during bootstrap.
    fn seed(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// A module defined entirely by static tables (no hooks).
#[derive(Debug, Clone)]
pub struct StaticModule {
    descriptor: ModuleDescriptor,
    permissions: Vec<PermissionDef>,
    grants: RoleGrants,
}

impl StaticModule {
    pub fn new(descriptor: ModuleDescriptor, permissions: Vec<PermissionDef>, grants: RoleGrants) -> Self {
        Self {
            descriptor,
            permissions,
            grants,
        }
    }
}

impl ModulePlugin for StaticModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn declared_permissions(&self) -> &[PermissionDef] {
        &self.permissions
    }

    fn role_grants(&self) -> &RoleGrants {
        &self.grants
    }
}
