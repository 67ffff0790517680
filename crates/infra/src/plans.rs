use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use bizdesk_core::{ModuleKey, PlanId};
use bizdesk_modules::{Plan, PlanDraft, PlanValidationError};

use crate::store::{Store, StoreTx};
use crate::StoreError;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Validation(#[from] PlanValidationError),

    #[error("plan {0} not found")]
    NotFound(PlanId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct PlanService<S> {
    store: Arc<S>,
}

impl<S: Store> PlanService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Store a plan after checking every module against the AddOn catalog.
    pub fn create_plan(&self, draft: PlanDraft) -> Result<Plan, PlanError> {
        let mut tx = self.store.begin()?;
        let catalog: HashMap<ModuleKey, bool> = tx
            .add_ons()?
            .into_iter()
            .map(|a| (a.module, a.for_admin))
            .collect();
        draft.validate(|key| catalog.get(key).copied())?;

        let plan = tx.insert_plan(draft)?;
        tx.commit()?;
        info!(plan_id = %plan.id, plan = %plan.name, modules = plan.modules.len(), "plan created");
        Ok(plan)
    }

    pub fn plan(&self, id: PlanId) -> Result<Plan, PlanError> {
        let mut tx = self.store.begin()?;
        tx.plan(id)?.ok_or(PlanError::NotFound(id))
    }
}
