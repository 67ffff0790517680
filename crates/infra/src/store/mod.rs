//! Unit-of-work storage boundary.
//!
//! Every mutation goes through a [`StoreTx`]. A transaction that is dropped
//! without [`StoreTx::commit`] rolls back, which is how a failed module
//! activation leaves no partially linked state behind.
//!
//! Write operations that can race (ledger rows, permission rows, role links,
//! roles) use insert-or-ignore semantics so concurrent callers converge on one
//! row instead of failing.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_auth::{Permission, PermissionName, Role, RoleKind};
use bizdesk_core::{ModuleKey, PlanId, RoleId, TenantId};
use bizdesk_modules::{AddOn, Plan, PlanDraft};

use crate::StoreError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// A module turned on for a tenant (one ledger row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub tenant_id: TenantId,
    pub module: ModuleKey,
    pub activated_at: DateTime<Utc>,
}

impl ActivationRecord {
    pub fn new(tenant_id: TenantId, module: ModuleKey) -> Self {
        Self {
            tenant_id,
            module,
            activated_at: Utc::now(),
        }
    }
}

/// Result of an insert-or-ignore write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted<T> {
    pub value: T,
    /// `false` when the row already existed and was left untouched.
    pub created: bool,
}

pub trait Store: Send + Sync {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError>;
}

pub trait StoreTx {
    // AddOn catalog (global)

    fn insert_add_on_if_absent(&mut self, add_on: &AddOn) -> Result<bool, StoreError>;

    fn add_on(&mut self, module: &ModuleKey) -> Result<Option<AddOn>, StoreError>;

    /// Catalog rows in seeding order.
    fn add_ons(&mut self) -> Result<Vec<AddOn>, StoreError>;

    // Plans

    fn insert_plan(&mut self, draft: PlanDraft) -> Result<Plan, StoreError>;

    fn plan(&mut self, id: PlanId) -> Result<Option<Plan>, StoreError>;

    // Tenants

    fn ensure_tenant(&mut self, tenant_id: TenantId) -> Result<(), StoreError>;

    fn tenants(&mut self) -> Result<Vec<TenantId>, StoreError>;

    fn set_tenant_plan(&mut self, tenant_id: TenantId, plan_id: PlanId) -> Result<(), StoreError>;

    fn tenant_plan(&mut self, tenant_id: TenantId) -> Result<Option<PlanId>, StoreError>;

    // Activation ledger

    /// Insert the `(tenant, module)` row, or return the existing one.
    fn insert_activation(
        &mut self,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<Upserted<ActivationRecord>, StoreError>;

    fn delete_activation(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<bool, StoreError>;

    fn activation(
        &mut self,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<Option<ActivationRecord>, StoreError>;

    fn activations(&mut self, tenant_id: TenantId) -> Result<Vec<ActivationRecord>, StoreError>;

    /// Remember that a module was switched off (drives the `Deactivated` state).
    fn mark_deactivated(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<(), StoreError>;

    fn clear_deactivated(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<(), StoreError>;

    fn is_deactivated(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<bool, StoreError>;

    // Permission catalog (global)

    /// Create the row unless a permission with that name exists; the existing
    /// row (and its owner) wins.
    fn first_or_create_permission(
        &mut self,
        permission: &Permission,
    ) -> Result<Upserted<Permission>, StoreError>;

    fn permission(&mut self, name: &PermissionName) -> Result<Option<Permission>, StoreError>;

    fn permissions(&mut self) -> Result<Vec<Permission>, StoreError>;

    // Roles

    /// Insert the role unless one with the same `(tenant, name)` exists.
    fn insert_role_if_absent(&mut self, role: &Role) -> Result<Upserted<Role>, StoreError>;

    fn role(&mut self, id: RoleId) -> Result<Option<Role>, StoreError>;

    fn role_by_name(
        &mut self,
        tenant_id: Option<TenantId>,
        name: &RoleKind,
    ) -> Result<Option<Role>, StoreError>;

    fn tenant_roles(&mut self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError>;

    // Role <-> permission links

    fn link_permission(&mut self, role_id: RoleId, permission: &PermissionName) -> Result<bool, StoreError>;

    fn role_permissions(&mut self, role_id: RoleId) -> Result<BTreeSet<PermissionName>, StoreError>;

    fn replace_role_permissions(
        &mut self,
        role_id: RoleId,
        permissions: &BTreeSet<PermissionName>,
    ) -> Result<(), StoreError>;

    // Manual overrides

    fn add_override(&mut self, role_id: RoleId, permission: &PermissionName) -> Result<bool, StoreError>;

    fn remove_override(&mut self, role_id: RoleId, permission: &PermissionName) -> Result<bool, StoreError>;

    fn overrides(&mut self, role_id: RoleId) -> Result<BTreeSet<PermissionName>, StoreError>;

    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

/// Module keys of a tenant's ledger rows.
pub fn active_modules<T: StoreTx + ?Sized>(
    tx: &mut T,
    tenant_id: TenantId,
) -> Result<Vec<ModuleKey>, StoreError> {
    Ok(tx
        .activations(tenant_id)?
        .into_iter()
        .map(|r| r.module)
        .collect())
}
