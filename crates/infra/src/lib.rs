//! Infrastructure layer: storage, discovery, activation and propagation.
//!
//! Services are generic over a [`store::Store`] so the same code runs against
//! the in-memory store (tests, dev) and Postgres.

pub mod activation;
pub mod catalog_sync;
pub mod config;
pub mod discovery;
pub mod error;
pub mod event_bus;
pub mod plans;
pub mod propagation;
pub mod roles;
pub mod seeding;
pub mod store;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use activation::{ActivationError, ActivationService, BulkActivation, PlanApplication};
pub use catalog_sync::{CatalogSync, SyncReport};
pub use config::{ConfigError, PlatformConfig};
pub use discovery::{DiscoveryError, DiscoveryReport, ManifestDiscovery, SkippedManifest};
pub use error::StoreError;
pub use plans::{PlanError, PlanService};
pub use propagation::{PropagationEngine, PropagationError, RepairReport, RoleDrift};
pub use roles::{RoleError, RoleService};
pub use seeding::{BootstrapReport, SeedError, Seeder};
pub use store::{ActivationRecord, InMemoryStore, Store, StoreTx};
pub use workers::module_event_worker::{ModuleEventWorker, WorkerHandle};
