use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use bizdesk_auth::{Permission, PermissionName, Role, RoleKind};
use bizdesk_core::{ModuleKey, PlanId, RoleId, TenantId};
use bizdesk_modules::{AddOn, Plan, PlanDraft};

use super::{ActivationRecord, Store, StoreTx, Upserted};
use crate::StoreError;

#[derive(Debug, Clone, Default)]
struct State {
    add_ons: BTreeMap<ModuleKey, AddOn>,
    plans: BTreeMap<PlanId, Plan>,
    tenants: BTreeMap<TenantId, Option<PlanId>>,
    ledger: BTreeMap<(TenantId, ModuleKey), ActivationRecord>,
    deactivated: BTreeSet<(TenantId, ModuleKey)>,
    permissions: BTreeMap<PermissionName, Permission>,
    roles: BTreeMap<RoleId, Role>,
    links: BTreeMap<RoleId, BTreeSet<PermissionName>>,
    overrides: BTreeMap<RoleId, BTreeSet<PermissionName>>,
}

/// In-memory store.
///
/// Intended for tests/dev. Transactions are serialized: `begin` takes the
/// lock and works on a copy of the state, `commit` swaps the copy in.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    type Tx<'a>
        = InMemoryTx<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError> {
        let guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))?;
        let work = guard.clone();
        Ok(InMemoryTx { guard, work })
    }
}

pub struct InMemoryTx<'a> {
    guard: MutexGuard<'a, State>,
    work: State,
}

impl StoreTx for InMemoryTx<'_> {
    fn insert_add_on_if_absent(&mut self, add_on: &AddOn) -> Result<bool, StoreError> {
        if self.work.add_ons.contains_key(&add_on.module) {
            return Ok(false);
        }
        self.work.add_ons.insert(add_on.module.clone(), add_on.clone());
        Ok(true)
    }

    fn add_on(&mut self, module: &ModuleKey) -> Result<Option<AddOn>, StoreError> {
        Ok(self.work.add_ons.get(module).cloned())
    }

    fn add_ons(&mut self) -> Result<Vec<AddOn>, StoreError> {
        let mut out: Vec<AddOn> = self.work.add_ons.values().cloned().collect();
        out.sort_by(AddOn::seeding_order);
        Ok(out)
    }

    fn insert_plan(&mut self, draft: PlanDraft) -> Result<Plan, StoreError> {
        let next = self
            .work
            .plans
            .keys()
            .next_back()
            .map(|id| id.get() + 1)
            .unwrap_or(1);
        let plan = draft.into_plan(PlanId::new(next));
        self.work.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    fn plan(&mut self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        Ok(self.work.plans.get(&id).cloned())
    }

    fn ensure_tenant(&mut self, tenant_id: TenantId) -> Result<(), StoreError> {
        self.work.tenants.entry(tenant_id).or_insert(None);
        Ok(())
    }

    fn tenants(&mut self) -> Result<Vec<TenantId>, StoreError> {
        Ok(self.work.tenants.keys().copied().collect())
    }

    fn set_tenant_plan(&mut self, tenant_id: TenantId, plan_id: PlanId) -> Result<(), StoreError> {
        if !self.work.plans.contains_key(&plan_id) {
            return Err(StoreError::NotFound(format!("plan {plan_id}")));
        }
        self.work.tenants.insert(tenant_id, Some(plan_id));
        Ok(())
    }

    fn tenant_plan(&mut self, tenant_id: TenantId) -> Result<Option<PlanId>, StoreError> {
        Ok(self.work.tenants.get(&tenant_id).copied().flatten())
    }

    fn insert_activation(
        &mut self,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<Upserted<ActivationRecord>, StoreError> {
        let key = (tenant_id, module.clone());
        if let Some(existing) = self.work.ledger.get(&key) {
            return Ok(Upserted {
                value: existing.clone(),
                created: false,
            });
        }
        let record = ActivationRecord::new(tenant_id, module.clone());
        self.work.ledger.insert(key, record.clone());
        Ok(Upserted {
            value: record,
            created: true,
        })
    }

    fn delete_activation(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<bool, StoreError> {
        Ok(self
            .work
            .ledger
            .remove(&(tenant_id, module.clone()))
            .is_some())
    }

    fn activation(
        &mut self,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<Option<ActivationRecord>, StoreError> {
        Ok(self.work.ledger.get(&(tenant_id, module.clone())).cloned())
    }

    fn activations(&mut self, tenant_id: TenantId) -> Result<Vec<ActivationRecord>, StoreError> {
        Ok(self
            .work
            .ledger
            .range((tenant_id, ModuleKey::from_static(""))..)
            .take_while(|((t, _), _)| *t == tenant_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn mark_deactivated(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<(), StoreError> {
        self.work.deactivated.insert((tenant_id, module.clone()));
        Ok(())
    }

    fn clear_deactivated(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<(), StoreError> {
        self.work.deactivated.remove(&(tenant_id, module.clone()));
        Ok(())
    }

    fn is_deactivated(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<bool, StoreError> {
        Ok(self.work.deactivated.contains(&(tenant_id, module.clone())))
    }

    fn first_or_create_permission(
        &mut self,
        permission: &Permission,
    ) -> Result<Upserted<Permission>, StoreError> {
        if let Some(existing) = self.work.permissions.get(&permission.name) {
            return Ok(Upserted {
                value: existing.clone(),
                created: false,
            });
        }
        self.work
            .permissions
            .insert(permission.name.clone(), permission.clone());
        Ok(Upserted {
            value: permission.clone(),
            created: true,
        })
    }

    fn permission(&mut self, name: &PermissionName) -> Result<Option<Permission>, StoreError> {
        Ok(self.work.permissions.get(name).cloned())
    }

    fn permissions(&mut self) -> Result<Vec<Permission>, StoreError> {
        Ok(self.work.permissions.values().cloned().collect())
    }

    fn insert_role_if_absent(&mut self, role: &Role) -> Result<Upserted<Role>, StoreError> {
        let existing = self
            .work
            .roles
            .values()
            .find(|r| r.tenant_id == role.tenant_id && r.name == role.name);
        if let Some(existing) = existing {
            return Ok(Upserted {
                value: existing.clone(),
                created: false,
            });
        }
        self.work.roles.insert(role.id, role.clone());
        Ok(Upserted {
            value: role.clone(),
            created: true,
        })
    }

    fn role(&mut self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.work.roles.get(&id).cloned())
    }

    fn role_by_name(
        &mut self,
        tenant_id: Option<TenantId>,
        name: &RoleKind,
    ) -> Result<Option<Role>, StoreError> {
        Ok(self
            .work
            .roles
            .values()
            .find(|r| r.tenant_id == tenant_id && &r.name == name)
            .cloned())
    }

    fn tenant_roles(&mut self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError> {
        Ok(self
            .work
            .roles
            .values()
            .filter(|r| r.tenant_id == Some(tenant_id))
            .cloned()
            .collect())
    }

    fn link_permission(&mut self, role_id: RoleId, permission: &PermissionName) -> Result<bool, StoreError> {
        if !self.work.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        if !self.work.permissions.contains_key(permission) {
            return Err(StoreError::NotFound(format!("permission {permission}")));
        }
        Ok(self
            .work
            .links
            .entry(role_id)
            .or_default()
            .insert(permission.clone()))
    }

    fn role_permissions(&mut self, role_id: RoleId) -> Result<BTreeSet<PermissionName>, StoreError> {
        Ok(self.work.links.get(&role_id).cloned().unwrap_or_default())
    }

    fn replace_role_permissions(
        &mut self,
        role_id: RoleId,
        permissions: &BTreeSet<PermissionName>,
    ) -> Result<(), StoreError> {
        if let Some(missing) = permissions
            .iter()
            .find(|p| !self.work.permissions.contains_key(*p))
        {
            return Err(StoreError::NotFound(format!("permission {missing}")));
        }
        self.work.links.insert(role_id, permissions.clone());
        Ok(())
    }

    fn add_override(&mut self, role_id: RoleId, permission: &PermissionName) -> Result<bool, StoreError> {
        Ok(self
            .work
            .overrides
            .entry(role_id)
            .or_default()
            .insert(permission.clone()))
    }

    fn remove_override(&mut self, role_id: RoleId, permission: &PermissionName) -> Result<bool, StoreError> {
        Ok(self
            .work
            .overrides
            .get_mut(&role_id)
            .is_some_and(|set| set.remove(permission)))
    }

    fn overrides(&mut self, role_id: RoleId) -> Result<BTreeSet<PermissionName>, StoreError> {
        Ok(self.work.overrides.get(&role_id).cloned().unwrap_or_default())
    }

    fn commit(self) -> Result<(), StoreError> {
        let Self { mut guard, work } = self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &'static str) -> ModuleKey {
        ModuleKey::from_static(k)
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().unwrap();
            tx.insert_activation(TenantId::new(1), &key("Hrm")).unwrap();
        }
        let mut tx = store.begin().unwrap();
        assert!(tx.activations(TenantId::new(1)).unwrap().is_empty());
    }

    #[test]
    fn ledger_insert_is_idempotent_and_tenant_scoped() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().unwrap();
        let first = tx.insert_activation(TenantId::new(1), &key("Hrm")).unwrap();
        let second = tx.insert_activation(TenantId::new(1), &key("Hrm")).unwrap();
        tx.insert_activation(TenantId::new(2), &key("Crm")).unwrap();
        tx.commit().unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.value, second.value);

        let mut tx = store.begin().unwrap();
        let t1: Vec<_> = tx
            .activations(TenantId::new(1))
            .unwrap()
            .into_iter()
            .map(|r| r.module)
            .collect();
        assert_eq!(t1, vec![key("Hrm")]);
    }

    #[test]
    fn first_permission_owner_wins() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().unwrap();
        let crm = Permission::new("manage-contacts".into(), key("Crm"), "Contacts");
        let helpdesk = Permission::new("manage-contacts".into(), key("Helpdesk"), "Contacts");

        assert!(tx.first_or_create_permission(&crm).unwrap().created);
        let again = tx.first_or_create_permission(&helpdesk).unwrap();
        assert!(!again.created);
        assert_eq!(again.value.module, key("Crm"));
    }

    #[test]
    fn roles_are_unique_per_tenant_and_name() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().unwrap();
        let a = Role::for_tenant(TenantId::new(1), RoleKind::Staff).unwrap();
        let b = Role::for_tenant(TenantId::new(1), RoleKind::Staff).unwrap();
        let c = Role::for_tenant(TenantId::new(2), RoleKind::Staff).unwrap();

        assert!(tx.insert_role_if_absent(&a).unwrap().created);
        let dup = tx.insert_role_if_absent(&b).unwrap();
        assert!(!dup.created);
        assert_eq!(dup.value.id, a.id);
        assert!(tx.insert_role_if_absent(&c).unwrap().created);
        assert_eq!(tx.tenant_roles(TenantId::new(1)).unwrap().len(), 1);
    }

    #[test]
    fn linking_requires_existing_permission_row() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().unwrap();
        let role = tx
            .insert_role_if_absent(&Role::for_tenant(TenantId::new(1), RoleKind::Staff).unwrap())
            .unwrap()
            .value;
        let err = tx.link_permission(role.id, &"manage-hrm".into()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
