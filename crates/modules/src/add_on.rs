use serde::{Deserialize, Serialize};

use bizdesk_core::ModuleKey;

use crate::{ModuleDescriptor, ModuleManifest};

/// Module catalog row. Global: shared by every tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
    pub module: ModuleKey,
    pub name: String,
    pub monthly_price: u64,
    pub yearly_price: u64,
    /// Globally available for activation.
    pub is_enable: bool,
    pub for_admin: bool,
    pub priority: i32,
    pub package_name: String,
}

impl AddOn {
    /// Order used everywhere modules are seeded or propagated.
    pub fn seeding_order(a: &AddOn, b: &AddOn) -> core::cmp::Ordering {
        (a.priority, &a.module).cmp(&(b.priority, &b.module))
    }
}

impl From<&ModuleDescriptor> for AddOn {
    fn from(d: &ModuleDescriptor) -> Self {
        Self {
            module: d.key.clone(),
            name: d.alias.to_string(),
            monthly_price: d.monthly_price,
            yearly_price: d.yearly_price,
            is_enable: true,
            for_admin: d.for_admin,
            priority: d.priority,
            package_name: d.package_name.to_string(),
        }
    }
}

impl From<&ModuleManifest> for AddOn {
    fn from(m: &ModuleManifest) -> Self {
        Self {
            module: m.name.clone(),
            name: m.alias.clone(),
            monthly_price: m.monthly_price,
            yearly_price: m.yearly_price,
            is_enable: true,
            for_admin: m.for_admin,
            priority: m.priority,
            package_name: m.package_name.clone(),
        }
    }
}
