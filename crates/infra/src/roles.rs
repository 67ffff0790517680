//! Role store operations: creation, manual overrides, session resolution.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use bizdesk_auth::{PermissionName, Role, RoleKind, SessionPermissions};
use bizdesk_core::{DomainError, RoleId, TenantId};
use bizdesk_events::{EventBus, EventEnvelope, ModuleEvent};

use crate::propagation::{PropagationEngine, PropagationError};
use crate::store::{Store, StoreTx};
use crate::StoreError;

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("role {0} not found")]
    NotFound(RoleId),

    #[error("role '{0}' is a system role and cannot be edited")]
    NotEditable(RoleKind),

    #[error("permission '{0}' does not exist")]
    UnknownPermission(PermissionName),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Propagation(#[from] PropagationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct RoleService<S, B> {
    engine: Arc<PropagationEngine<S>>,
    bus: B,
}

impl<S, B> RoleService<S, B>
where
    S: Store,
    B: EventBus<EventEnvelope<ModuleEvent>>,
{
    pub fn new(engine: Arc<PropagationEngine<S>>, bus: B) -> Self {
        Self { engine, bus }
    }

    /// Create a tenant role (idempotent) and bring it up to date with the
    /// tenant's active modules through a `GivePermissionToRole` signal.
    pub fn create_role(&self, tenant_id: TenantId, kind: RoleKind) -> Result<Role, RoleError> {
        let candidate = Role::for_tenant(tenant_id, kind)?;
        let mut tx = self.engine.store().begin()?;
        tx.ensure_tenant(tenant_id)?;
        let role = tx.insert_role_if_absent(&candidate)?;
        tx.commit()?;

        let signal = self.engine.role_signal(&role.value)?;
        self.engine.handle(&signal)?;
        if role.created {
            info!(tenant_id = %tenant_id, role = %role.value.name, "role created");
        }
        if let Err(err) = self
            .bus
            .publish(EventEnvelope::wrap(signal.tenant_id(), signal))
        {
            warn!(error = ?err, "module event publication failed");
        }
        Ok(role.value)
    }

    /// Create the standard tenant roles (company, staff, client, vendor).
    pub fn create_standard_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, RoleError> {
        RoleKind::TENANT_STANDARD
            .into_iter()
            .map(|kind| self.create_role(tenant_id, kind))
            .collect()
    }

    /// Give `role_id` a permission outside the module grant tables. Overrides
    /// survive recalculation and module deactivation.
    pub fn grant_override(&self, role_id: RoleId, permission: &PermissionName) -> Result<bool, RoleError> {
        let mut tx = self.engine.store().begin()?;
        let role = editable_role(&mut tx, role_id)?;

        if tx.permission(permission)?.is_none() {
            let known = self
                .engine
                .registry()
                .permission(permission)
                .ok_or_else(|| RoleError::UnknownPermission(permission.clone()))?;
            tx.first_or_create_permission(known)?;
        }
        let added = tx.add_override(role.id, permission)?;
        tx.link_permission(role.id, permission)?;
        tx.commit()?;

        info!(role_id = %role_id, permission = %permission, "override granted");
        Ok(added)
    }

    /// Remove an override. The permission stays linked if an active module
    /// still grants it.
    pub fn revoke_override(&self, role_id: RoleId, permission: &PermissionName) -> Result<bool, RoleError> {
        let mut tx = self.engine.store().begin()?;
        let role = editable_role(&mut tx, role_id)?;
        let removed = tx.remove_override(role.id, permission)?;
        self.engine.recalculate_role_in(&mut tx, &role)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Resolve what a user holding `role_id` may do inside `active_tenant`.
    pub fn session(&self, role_id: RoleId, active_tenant: Option<TenantId>) -> Result<SessionPermissions, RoleError> {
        let mut tx = self.engine.store().begin()?;
        let role = tx.role(role_id)?.ok_or(RoleError::NotFound(role_id))?;
        let permissions = tx.role_permissions(role.id)?;
        Ok(SessionPermissions {
            active_tenant_id: active_tenant,
            role,
            permissions,
        })
    }
}

fn editable_role<T: StoreTx>(tx: &mut T, role_id: RoleId) -> Result<Role, RoleError> {
    let role = tx.role(role_id)?.ok_or(RoleError::NotFound(role_id))?;
    if !role.editable {
        return Err(RoleError::NotEditable(role.name));
    }
    Ok(role)
}
