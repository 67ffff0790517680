//! Activation ledger service.
//!
//! Each module activation or deactivation is one unit of work: the ledger
//! write, permission upserts, role links and the plugin hook commit together
//! or not at all. Bulk operations run one unit per module, keep going when one
//! fails and report the failures. Events are published only after commit.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use bizdesk_core::{ModuleKey, PlanId, TenantId};
use bizdesk_events::{DefaultData, EventBus, EventEnvelope, ModuleEvent, ModulesDeactivated};
use bizdesk_modules::{AddOn, ModuleState, ModuleTransition, TransitionError};

use crate::propagation::{PropagationEngine, PropagationError, RepairReport};
use crate::store::{ActivationRecord, Store, StoreTx, active_modules};
use crate::StoreError;

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("module '{0}' is not in the catalog")]
    UnknownModule(ModuleKey),

    #[error("module '{0}' is disabled")]
    Disabled(ModuleKey),

    #[error("module '{0}' is reserved for the platform administrator")]
    AdminOnly(ModuleKey),

    #[error("plan {0} not found")]
    PlanNotFound(PlanId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Propagation(#[from] PropagationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of activating several modules.
#[derive(Debug, Default)]
pub struct BulkActivation {
    /// Newly created ledger rows (already-active modules are not listed).
    pub activated: Vec<ActivationRecord>,
    pub failed: Vec<(ModuleKey, ActivationError)>,
}

/// Outcome of moving a tenant onto a plan.
#[derive(Debug)]
pub struct PlanApplication {
    pub plan_id: PlanId,
    pub activated: Vec<ModuleKey>,
    pub deactivated: Vec<ModuleKey>,
    pub failed: Vec<(ModuleKey, ActivationError)>,
}

pub struct ActivationService<S, B> {
    engine: Arc<PropagationEngine<S>>,
    bus: B,
}

impl<S, B> ActivationService<S, B>
where
    S: Store,
    B: EventBus<EventEnvelope<ModuleEvent>>,
{
    pub fn new(engine: Arc<PropagationEngine<S>>, bus: B) -> Self {
        Self { engine, bus }
    }

    pub fn engine(&self) -> &Arc<PropagationEngine<S>> {
        &self.engine
    }

    /// Turn `module` on for the tenant. Idempotent: an already active module
    /// returns its existing record and emits nothing.
    pub fn activate(
        &self,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<ActivationRecord, ActivationError> {
        let (record, created) = self.activate_unit(tenant_id, module)?;
        if created {
            self.publish(ModuleEvent::DefaultData(DefaultData {
                tenant_id,
                modules: vec![module.clone()],
                occurred_at: Utc::now(),
            }));
        }
        Ok(record)
    }

    /// Activate several modules in catalog priority order, one unit each.
    pub fn activate_many(&self, tenant_id: TenantId, modules: &[ModuleKey]) -> Result<BulkActivation, ActivationError> {
        let ordered = self.in_catalog_order(modules)?;
        let mut outcome = BulkActivation::default();
        for module in ordered {
            match self.activate_unit(tenant_id, &module) {
                Ok((record, true)) => outcome.activated.push(record),
                Ok((_, false)) => {}
                Err(err) => {
                    error!(tenant_id = %tenant_id, module = %module, error = %err, "module activation failed");
                    outcome.failed.push((module, err));
                }
            }
        }
        if !outcome.activated.is_empty() {
            self.publish(ModuleEvent::DefaultData(DefaultData {
                tenant_id,
                modules: outcome.activated.iter().map(|r| r.module.clone()).collect(),
                occurred_at: Utc::now(),
            }));
        }
        Ok(outcome)
    }

    /// Turn `module` off. Exclusive permissions are unlinked; permissions
    /// another active module still grants (and manual overrides) stay.
    /// Returns `false` when the module was not active (no-op).
    pub fn deactivate(&self, tenant_id: TenantId, module: &ModuleKey) -> Result<bool, ActivationError> {
        let removed = self.deactivate_unit(tenant_id, module)?;
        if removed {
            self.publish(ModuleEvent::ModulesDeactivated(ModulesDeactivated {
                tenant_id,
                modules: vec![module.clone()],
                occurred_at: Utc::now(),
            }));
        }
        Ok(removed)
    }

    /// Move the tenant onto `plan_id`: activate plan modules not yet active,
    /// deactivate active modules the plan no longer contains and record the
    /// tenant's plan.
    pub fn apply_plan(&self, tenant_id: TenantId, plan_id: PlanId) -> Result<PlanApplication, ActivationError> {
        let (plan, active) = {
            let mut tx = self.engine.store().begin()?;
            let plan = tx.plan(plan_id)?.ok_or(ActivationError::PlanNotFound(plan_id))?;
            (plan, active_modules(&mut tx, tenant_id)?)
        };

        let wanted: BTreeSet<&ModuleKey> = plan.modules.iter().collect();
        let mut application = PlanApplication {
            plan_id,
            activated: Vec::new(),
            deactivated: Vec::new(),
            failed: Vec::new(),
        };

        for module in active.iter().filter(|m| !wanted.contains(m)) {
            match self.deactivate_unit(tenant_id, module) {
                Ok(true) => application.deactivated.push(module.clone()),
                Ok(false) => {}
                Err(err) => {
                    error!(tenant_id = %tenant_id, module = %module, error = %err, "module deactivation failed");
                    application.failed.push((module.clone(), err));
                }
            }
        }
        if !application.deactivated.is_empty() {
            self.publish(ModuleEvent::ModulesDeactivated(ModulesDeactivated {
                tenant_id,
                modules: application.deactivated.clone(),
                occurred_at: Utc::now(),
            }));
        }

        let missing: Vec<ModuleKey> = plan
            .modules
            .iter()
            .filter(|m| !active.contains(m))
            .cloned()
            .collect();
        let bulk = self.activate_many(tenant_id, &missing)?;
        application.activated = bulk.activated.into_iter().map(|r| r.module).collect();
        application.failed.extend(bulk.failed);

        let mut tx = self.engine.store().begin()?;
        tx.ensure_tenant(tenant_id)?;
        tx.set_tenant_plan(tenant_id, plan_id)?;
        tx.commit()?;

        info!(
            tenant_id = %tenant_id,
            plan_id = %plan_id,
            activated = application.activated.len(),
            deactivated = application.deactivated.len(),
            failed = application.failed.len(),
            "plan applied"
        );
        Ok(application)
    }

    pub fn module_state(&self, tenant_id: TenantId, module: &ModuleKey) -> Result<ModuleState, ActivationError> {
        let mut tx = self.engine.store().begin()?;
        Ok(state_in(&mut tx, tenant_id, module)?)
    }

    /// Every catalog entry with its state for the tenant, in seeding order.
    pub fn modules(&self, tenant_id: TenantId) -> Result<Vec<(AddOn, ModuleState)>, ActivationError> {
        let mut tx = self.engine.store().begin()?;
        let mut out = Vec::new();
        for add_on in tx.add_ons()? {
            let state = state_in(&mut tx, tenant_id, &add_on.module)?;
            out.push((add_on, state));
        }
        Ok(out)
    }

    /// Login-triggered convergence; see [`PropagationEngine::on_login`].
    pub fn on_login(&self, tenant_id: TenantId) -> Result<Option<RepairReport>, ActivationError> {
        Ok(self.engine.on_login(tenant_id)?)
    }

    fn activate_unit(
        &self,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<(ActivationRecord, bool), ActivationError> {
        let mut tx = self.engine.store().begin()?;
        let add_on = tx
            .add_on(module)?
            .ok_or_else(|| ActivationError::UnknownModule(module.clone()))?;
        if add_on.for_admin {
            return Err(ActivationError::AdminOnly(module.clone()));
        }
        if !add_on.is_enable {
            return Err(ActivationError::Disabled(module.clone()));
        }

        let state = state_in(&mut tx, tenant_id, module)?;
        state.transition(ModuleTransition::Activate)?;
        if let Some(existing) = tx.activation(tenant_id, module)? {
            return Ok((existing, false));
        }

        tx.ensure_tenant(tenant_id)?;
        let record = tx.insert_activation(tenant_id, module)?;
        if !record.created {
            // Lost a race with a concurrent activation of the same pair.
            return Ok((record.value, false));
        }
        tx.clear_deactivated(tenant_id, module)?;
        let linked = self.engine.activate_in(&mut tx, tenant_id, module)?;
        tx.commit()?;

        info!(tenant_id = %tenant_id, module = %module, linked, "module activated");
        Ok((record.value, true))
    }

    fn deactivate_unit(&self, tenant_id: TenantId, module: &ModuleKey) -> Result<bool, ActivationError> {
        let mut tx = self.engine.store().begin()?;
        if tx.activation(tenant_id, module)?.is_none() {
            return Ok(false);
        }
        tx.delete_activation(tenant_id, module)?;
        tx.mark_deactivated(tenant_id, module)?;
        if let Some(plugin) = self.engine.registry().get(module) {
            plugin
                .on_deactivate(tenant_id)
                .map_err(PropagationError::from)?;
        }
        let changed = self.engine.recalculate_in(&mut tx, tenant_id)?;
        tx.commit()?;

        info!(tenant_id = %tenant_id, module = %module, roles = changed.len(), "module deactivated");
        Ok(true)
    }

    fn in_catalog_order(&self, modules: &[ModuleKey]) -> Result<Vec<ModuleKey>, ActivationError> {
        let mut tx = self.engine.store().begin()?;
        let catalog = tx.add_ons()?;
        let mut seen = BTreeSet::new();
        let mut ordered: Vec<ModuleKey> = catalog
            .iter()
            .filter(|a| modules.contains(&a.module))
            .map(|a| a.module.clone())
            .collect();
        seen.extend(ordered.iter().cloned());
        // Unknown keys go last and fail in their own unit.
        for module in modules {
            if seen.insert(module.clone()) {
                ordered.push(module.clone());
            }
        }
        Ok(ordered)
    }

    fn publish(&self, event: ModuleEvent) {
        let envelope = EventEnvelope::wrap(event.tenant_id(), event);
        let event_type = envelope.event_type().to_string();
        if let Err(err) = self.bus.publish(envelope) {
            warn!(event_type = %event_type, error = ?err, "module event publication failed");
        }
    }
}

fn state_in<T: StoreTx>(tx: &mut T, tenant_id: TenantId, module: &ModuleKey) -> Result<ModuleState, StoreError> {
    if tx.add_on(module)?.is_none() {
        return Ok(ModuleState::Uninstalled);
    }
    if tx.activation(tenant_id, module)?.is_some() {
        return Ok(ModuleState::Activated);
    }
    if tx.is_deactivated(tenant_id, module)? {
        return Ok(ModuleState::Deactivated);
    }
    Ok(ModuleState::Available)
}
