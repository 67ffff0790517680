//! Materialize module descriptors into AddOn catalog rows (insert if absent).

use std::sync::Arc;

use tracing::info;

use bizdesk_core::ModuleKey;
use bizdesk_modules::{AddOn, ModuleManifest, ModuleRegistry};

use crate::store::{Store, StoreTx};
use crate::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<ModuleKey>,
    /// Entries that were already in the catalog and left untouched.
    pub existing: usize,
}

pub struct CatalogSync<S> {
    store: Arc<S>,
}

impl<S: Store> CatalogSync<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Catalog every compiled module.
    pub fn sync_registry(&self, registry: &ModuleRegistry) -> Result<SyncReport, StoreError> {
        let add_ons: Vec<AddOn> = registry
            .iter()
            .map(|(_, plugin)| AddOn::from(plugin.descriptor()))
            .collect();
        self.sync(add_ons)
    }

    /// Catalog discovered manifests.
    pub fn sync_manifests(&self, manifests: &[ModuleManifest]) -> Result<SyncReport, StoreError> {
        self.sync(manifests.iter().map(AddOn::from).collect())
    }

    fn sync(&self, mut add_ons: Vec<AddOn>) -> Result<SyncReport, StoreError> {
        add_ons.sort_by(AddOn::seeding_order);
        let mut tx = self.store.begin()?;
        let mut report = SyncReport::default();
        for add_on in &add_ons {
            if tx.insert_add_on_if_absent(add_on)? {
                report.added.push(add_on.module.clone());
            } else {
                report.existing += 1;
            }
        }
        tx.commit()?;
        if !report.added.is_empty() {
            info!(added = report.added.len(), existing = report.existing, "add-on catalog synced");
        }
        Ok(report)
    }
}
