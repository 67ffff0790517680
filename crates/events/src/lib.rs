//! Event bus mechanics and the module activation signals.
//!
//! The bus is how code outside the propagation engine (audit trails, caches,
//! other processes) learns that a tenant's module set changed.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod module_events;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use module_events::{DefaultData, GivePermissionToRole, ModuleEvent, ModulesDeactivated};
pub use tenant::TenantScoped;
