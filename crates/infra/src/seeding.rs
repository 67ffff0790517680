//! Package seeding and platform bootstrap.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use bizdesk_auth::{Role, RoleKind};
use bizdesk_core::{DomainError, ModuleKey};
use bizdesk_modules::PluginError;

use crate::catalog_sync::CatalogSync;
use crate::propagation::PropagationEngine;
use crate::store::{Store, StoreTx};
use crate::StoreError;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("module '{0}' is not in the catalog")]
    UnknownModule(ModuleKey),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default)]
pub struct BootstrapReport {
    /// Catalog rows created by this run.
    pub catalog_added: Vec<ModuleKey>,
    pub seeded: Vec<ModuleKey>,
    pub failed: Vec<(ModuleKey, SeedError)>,
    pub superadmin_permissions: usize,
}

pub struct Seeder<S> {
    engine: Arc<PropagationEngine<S>>,
}

impl<S: Store> Seeder<S> {
    pub fn new(engine: Arc<PropagationEngine<S>>) -> Self {
        Self { engine }
    }

    /// Seed one package: create its permission rows and run its seed hook.
    /// Returns the number of permission rows created.
    pub fn seed_package(&self, module: &ModuleKey) -> Result<usize, SeedError> {
        let mut tx = self.engine.store().begin()?;
        if tx.add_on(module)?.is_none() {
            return Err(SeedError::UnknownModule(module.clone()));
        }
        let Some(plugin) = self.engine.registry().get(module) else {
            debug!(module = %module, "no compiled plugin; nothing to seed");
            return Ok(0);
        };
        let created = self.engine.ensure_module_permissions(&mut tx, module)?;
        plugin.seed()?;
        tx.commit()?;

        info!(module = %module, permissions_created = created, "package seeded");
        Ok(created)
    }

    /// Catalog every compiled module, seed each enabled module in priority
    /// order and set up the system role. A failing package is logged and
    /// reported; the rest still run.
    pub fn bootstrap(&self) -> Result<BootstrapReport, SeedError> {
        let sync = CatalogSync::new(self.engine.store().clone()).sync_registry(self.engine.registry())?;
        let mut report = BootstrapReport {
            catalog_added: sync.added,
            ..BootstrapReport::default()
        };

        let catalog = {
            let mut tx = self.engine.store().begin()?;
            self.engine.ensure_core_permissions(&mut tx)?;
            let catalog = tx.add_ons()?;
            tx.commit()?;
            catalog
        };

        for add_on in catalog.iter().filter(|a| a.is_enable) {
            match self.seed_package(&add_on.module) {
                Ok(_) => report.seeded.push(add_on.module.clone()),
                Err(err) => {
                    error!(module = %add_on.module, error = %err, "package seed failed");
                    report.failed.push((add_on.module.clone(), err));
                }
            }
        }

        let mut tx = self.engine.store().begin()?;
        let role = tx.insert_role_if_absent(&Role::system(RoleKind::SuperAdmin)?)?.value;
        self.engine.recalculate_role_in(&mut tx, &role)?;
        report.superadmin_permissions = tx.role_permissions(role.id)?.len();
        tx.commit()?;

        info!(
            seeded = report.seeded.len(),
            failed = report.failed.len(),
            superadmin_permissions = report.superadmin_permissions,
            "bootstrap completed"
        );
        Ok(report)
    }
}
