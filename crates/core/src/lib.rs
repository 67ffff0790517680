//! `bizdesk-core`: shared domain building blocks.
//!
//! Identifiers and the domain error model used by every other crate. No IO.

pub mod error;
pub mod id;
pub mod module_key;

pub use error::{DomainError, DomainResult};
pub use id::{PlanId, RoleId, TenantId};
pub use module_key::{ModuleKey, modules_csv, parse_modules_csv};
