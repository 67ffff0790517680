//! Permission propagation: deriving role permission sets from the active
//! module set.
//!
//! A role's expected set is `core grants ∪ grants of every active module for
//! that role ∪ manual overrides`. Linking (on activation) only adds to that set;
//! recalculation replaces the stored set with it, which is what removes
//! exclusive permissions on deactivation while keeping shared ones.
//!
//! Permission rows are always ensured before any link is attempted, and
//! modules are always processed in registry seeding order.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use bizdesk_auth::{PermissionName, Role, RoleKind};
use bizdesk_core::{ModuleKey, RoleId, TenantId};
use bizdesk_events::{GivePermissionToRole, ModuleEvent};
use bizdesk_modules::{ModuleRegistry, PluginError};

use crate::StoreError;
use crate::store::{Store, StoreTx, active_modules};

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("role {0} not found")]
    RoleNotFound(RoleId),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A role whose stored permissions differ from the recalculated set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDrift {
    pub role_id: RoleId,
    pub role: RoleKind,
    /// Expected but not linked.
    pub missing: BTreeSet<PermissionName>,
    /// Linked but no longer granted.
    pub extra: BTreeSet<PermissionName>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub permissions_created: usize,
    pub roles_updated: Vec<RoleKind>,
}

pub struct PropagationEngine<S> {
    store: Arc<S>,
    registry: Arc<ModuleRegistry>,
}

impl<S> PropagationEngine<S> {
    pub fn new(store: Arc<S>, registry: Arc<ModuleRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Create the `general` permission rows if absent.
    pub fn ensure_core_permissions<T: StoreTx>(&self, tx: &mut T) -> Result<usize, StoreError> {
        let mut created = 0;
        for permission in self.registry.core_permissions() {
            if tx.first_or_create_permission(&permission)?.created {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Create every permission row `module` needs (its own, then shared ones it
    /// references). Existing rows keep their original owner.
    pub fn ensure_module_permissions<T: StoreTx>(
        &self,
        tx: &mut T,
        module: &ModuleKey,
    ) -> Result<usize, StoreError> {
        let mut created = 0;
        for permission in self.registry.required_permissions(module) {
            let row = tx.first_or_create_permission(&permission)?;
            if row.created {
                created += 1;
            } else if row.value.module != permission.module {
                warn!(
                    permission = %permission.name,
                    owner = %row.value.module,
                    module = %permission.module,
                    "stored permission row is owned by another module"
                );
            }
        }
        Ok(created)
    }

    /// The module listener: ensure its permission rows, then link its grants
    /// to the tenant's existing roles. Returns the number of new links.
    ///
    /// A role that does not exist yet is skipped; it picks the grants up when
    /// it is created (`GivePermissionToRole`) or on the next repair.
    pub fn link_module<T: StoreTx>(
        &self,
        tx: &mut T,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<usize, StoreError> {
        let Some(plugin) = self.registry.get(module) else {
            debug!(module = %module, "module has no compiled plugin; nothing to link");
            return Ok(0);
        };
        self.ensure_module_permissions(tx, module)?;

        let grants = plugin.role_grants();
        let mut linked = 0;
        for kind in grants.roles() {
            let Some(role) = tx.role_by_name(Some(tenant_id), kind)? else {
                debug!(
                    tenant_id = %tenant_id,
                    module = %module,
                    role = %kind,
                    "role not created yet; skipping until it is"
                );
                continue;
            };
            for permission in grants.for_role(kind) {
                if tx.link_permission(role.id, permission)? {
                    linked += 1;
                }
            }
        }
        Ok(linked)
    }

    /// Link `module` and run its activation hook, all inside `tx`.
    pub fn activate_in<T: StoreTx>(
        &self,
        tx: &mut T,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<usize, PropagationError> {
        let linked = self.link_module(tx, tenant_id, module)?;
        if let Some(plugin) = self.registry.get(module) {
            plugin.on_activate(tenant_id)?;
        }
        Ok(linked)
    }

    /// What `role` should hold right now.
    pub fn expected_permissions<T: StoreTx>(
        &self,
        tx: &mut T,
        role: &Role,
    ) -> Result<BTreeSet<PermissionName>, StoreError> {
        let modules: Vec<ModuleKey> = match role.tenant_id {
            Some(tenant_id) => active_modules(tx, tenant_id)?,
            // The system role sees every platform (admin-only) module.
            None => self
                .registry
                .iter()
                .filter(|(_, p)| p.descriptor().for_admin)
                .map(|(_, p)| p.descriptor().key.clone())
                .collect(),
        };
        let mut expected = self.registry.expected_for_role(&modules, &role.name);
        expected.extend(tx.overrides(role.id)?);
        Ok(expected)
    }

    /// Replace `role`'s stored set with the expected one. Returns whether
    /// anything changed.
    pub fn recalculate_role_in<T: StoreTx>(&self, tx: &mut T, role: &Role) -> Result<bool, StoreError> {
        let expected = self.expected_permissions(tx, role)?;
        for name in &expected {
            if tx.permission(name)?.is_none() {
                if let Some(permission) = self.registry.permission(name) {
                    tx.first_or_create_permission(permission)?;
                }
            }
        }
        let current = tx.role_permissions(role.id)?;
        if current == expected {
            return Ok(false);
        }
        tx.replace_role_permissions(role.id, &expected)?;
        Ok(true)
    }

    /// Recalculate every role of the tenant inside `tx`.
    pub fn recalculate_in<T: StoreTx>(
        &self,
        tx: &mut T,
        tenant_id: TenantId,
    ) -> Result<Vec<RoleKind>, StoreError> {
        let mut changed = Vec::new();
        for role in tx.tenant_roles(tenant_id)? {
            if self.recalculate_role_in(tx, &role)? {
                changed.push(role.name.clone());
            }
        }
        Ok(changed)
    }

    fn drift_in<T: StoreTx>(&self, tx: &mut T, tenant_id: TenantId) -> Result<Vec<RoleDrift>, StoreError> {
        let mut out = Vec::new();
        for role in tx.tenant_roles(tenant_id)? {
            let expected = self.expected_permissions(tx, &role)?;
            let current = tx.role_permissions(role.id)?;
            if expected != current {
                out.push(RoleDrift {
                    role_id: role.id,
                    role: role.name.clone(),
                    missing: expected.difference(&current).cloned().collect(),
                    extra: current.difference(&expected).cloned().collect(),
                });
            }
        }
        Ok(out)
    }
}

impl<S: Store> PropagationEngine<S> {
    /// Rebuild every role of the tenant. Running it twice without activation
    /// changes is a no-op. Returns the roles whose set changed.
    pub fn recalculate(&self, tenant_id: TenantId) -> Result<Vec<RoleKind>, PropagationError> {
        let mut tx = self.store.begin()?;
        let changed = self.recalculate_in(&mut tx, tenant_id)?;
        tx.commit()?;
        if !changed.is_empty() {
            info!(tenant_id = %tenant_id, roles = changed.len(), "recalculated role permissions");
        }
        Ok(changed)
    }

    /// Roles whose stored permission set differs from the recalculated one.
    pub fn drift(&self, tenant_id: TenantId) -> Result<Vec<RoleDrift>, PropagationError> {
        let mut tx = self.store.begin()?;
        Ok(self.drift_in(&mut tx, tenant_id)?)
    }

    /// Ensure permission rows for the core and every active module, then
    /// recalculate. Converges tenants left incomplete by failed listeners or
    /// roles created out of order.
    pub fn repair(&self, tenant_id: TenantId) -> Result<RepairReport, PropagationError> {
        let mut tx = self.store.begin()?;
        let mut report = RepairReport {
            permissions_created: self.ensure_core_permissions(&mut tx)?,
            ..RepairReport::default()
        };
        let active = active_modules(&mut tx, tenant_id)?;
        for module in self.registry.in_seeding_order(&active) {
            report.permissions_created += self.ensure_module_permissions(&mut tx, &module)?;
        }
        report.roles_updated = self.recalculate_in(&mut tx, tenant_id)?;
        tx.commit()?;

        info!(
            tenant_id = %tenant_id,
            permissions_created = report.permissions_created,
            roles_updated = report.roles_updated.len(),
            "tenant repaired"
        );
        Ok(report)
    }

    /// Login hook: repair only when drift exists.
    pub fn on_login(&self, tenant_id: TenantId) -> Result<Option<RepairReport>, PropagationError> {
        let drift = self.drift(tenant_id)?;
        if drift.is_empty() {
            return Ok(None);
        }
        debug!(tenant_id = %tenant_id, roles = drift.len(), "drift detected at login");
        self.repair(tenant_id).map(Some)
    }

    /// Link the grants of `modules` to one role. Modules not active for the
    /// role's tenant (or, for the system role, not admin-only) are ignored.
    pub fn give_permission_to_role(
        &self,
        role_id: RoleId,
        modules: &[ModuleKey],
    ) -> Result<usize, PropagationError> {
        let mut tx = self.store.begin()?;
        let role = tx.role(role_id)?.ok_or(PropagationError::RoleNotFound(role_id))?;

        self.ensure_core_permissions(&mut tx)?;
        let mut linked = 0;
        for permission in self.registry.core_grants(&role.name) {
            if tx.link_permission(role.id, permission)? {
                linked += 1;
            }
        }

        for module in self.registry.in_seeding_order(modules) {
            let eligible = match role.tenant_id {
                Some(tenant_id) => tx.activation(tenant_id, &module)?.is_some(),
                None => self
                    .registry
                    .get(&module)
                    .is_some_and(|p| p.descriptor().for_admin),
            };
            if !eligible {
                continue;
            }
            let Some(plugin) = self.registry.get(&module) else {
                continue;
            };
            self.ensure_module_permissions(&mut tx, &module)?;
            for permission in plugin.role_grants().for_role(&role.name) {
                if tx.link_permission(role.id, permission)? {
                    linked += 1;
                }
            }
        }
        tx.commit()?;
        Ok(linked)
    }

    /// Apply a module signal. Safe to replay.
    pub fn handle(&self, event: &ModuleEvent) -> Result<(), PropagationError> {
        match event {
            ModuleEvent::DefaultData(e) => {
                let mut tx = self.store.begin()?;
                for module in self.registry.in_seeding_order(&e.modules) {
                    if tx.activation(e.tenant_id, &module)?.is_some() {
                        self.link_module(&mut tx, e.tenant_id, &module)?;
                    }
                }
                tx.commit()?;
            }
            ModuleEvent::GivePermissionToRole(e) => {
                self.give_permission_to_role(e.role_id, &e.modules)?;
            }
            ModuleEvent::ModulesDeactivated(e) => {
                self.recalculate(e.tenant_id)?;
            }
        }
        Ok(())
    }

    /// Build the signal that brings `role` up to date with the tenant's active
    /// modules.
    pub fn role_signal(&self, role: &Role) -> Result<ModuleEvent, PropagationError> {
        let modules = match role.tenant_id {
            Some(tenant_id) => {
                let mut tx = self.store.begin()?;
                active_modules(&mut tx, tenant_id)?
            }
            None => self
                .registry
                .iter()
                .filter(|(_, p)| p.descriptor().for_admin)
                .map(|(_, p)| p.descriptor().key.clone())
                .collect(),
        };
        Ok(ModuleEvent::GivePermissionToRole(GivePermissionToRole {
            role_id: role.id,
            role_name: role.name.to_string(),
            tenant_id: role.tenant_id,
            modules: self.registry.in_seeding_order(&modules),
            occurred_at: Utc::now(),
        }))
    }
}
