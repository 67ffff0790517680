//! Signals emitted when a tenant's module set changes.
//!
//! Payloads mirror what each module listener needs: the tenant (or role) being
//! updated and the module keys involved. `modules_csv()` renders the list in
//! the comma-separated form older consumers expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizdesk_core::{ModuleKey, RoleId, TenantId, modules_csv};

use crate::Event;

/// Modules became active for a tenant (the "modules activated" signal).
///
/// Listeners create the modules' permission rows if absent and link them to
/// the tenant's roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultData {
    pub tenant_id: TenantId,
    pub modules: Vec<ModuleKey>,
    pub occurred_at: DateTime<Utc>,
}

/// Recalculate one role's permissions for the given modules.
///
/// Emitted when a role is created after modules were already active, and
/// after activation for every role that received links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GivePermissionToRole {
    pub role_id: RoleId,
    pub role_name: String,
    pub tenant_id: Option<TenantId>,
    pub modules: Vec<ModuleKey>,
    pub occurred_at: DateTime<Utc>,
}

/// Modules were turned off for a tenant; exclusive permissions were unlinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulesDeactivated {
    pub tenant_id: TenantId,
    pub modules: Vec<ModuleKey>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleEvent {
    DefaultData(DefaultData),
    GivePermissionToRole(GivePermissionToRole),
    ModulesDeactivated(ModulesDeactivated),
}

impl ModuleEvent {
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            ModuleEvent::DefaultData(e) => Some(e.tenant_id),
            ModuleEvent::GivePermissionToRole(e) => e.tenant_id,
            ModuleEvent::ModulesDeactivated(e) => Some(e.tenant_id),
        }
    }

    pub fn modules(&self) -> &[ModuleKey] {
        match self {
            ModuleEvent::DefaultData(e) => &e.modules,
            ModuleEvent::GivePermissionToRole(e) => &e.modules,
            ModuleEvent::ModulesDeactivated(e) => &e.modules,
        }
    }

    pub fn modules_csv(&self) -> String {
        modules_csv(self.modules())
    }
}

impl Event for ModuleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ModuleEvent::DefaultData(_) => "modules.default_data",
            ModuleEvent::GivePermissionToRole(_) => "modules.give_permission_to_role",
            ModuleEvent::ModulesDeactivated(_) => "modules.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ModuleEvent::DefaultData(e) => e.occurred_at,
            ModuleEvent::GivePermissionToRole(e) => e.occurred_at,
            ModuleEvent::ModulesDeactivated(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventEnvelope;

    #[test]
    fn envelope_copies_event_metadata() {
        let event = ModuleEvent::DefaultData(DefaultData {
            tenant_id: TenantId::new(42),
            modules: vec![ModuleKey::from_static("Hrm"), ModuleKey::from_static("Crm")],
            occurred_at: Utc::now(),
        });

        let env = EventEnvelope::wrap(event.tenant_id(), event.clone());

        assert_eq!(env.tenant_id(), Some(TenantId::new(42)));
        assert_eq!(env.event_type(), "modules.default_data");
        assert_eq!(env.payload().modules_csv(), "Hrm,Crm");
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = ModuleEvent::ModulesDeactivated(ModulesDeactivated {
            tenant_id: TenantId::new(3),
            modules: vec![ModuleKey::from_static("Pos")],
            occurred_at: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "modules_deactivated");
        assert_eq!(json["modules"][0], "Pos");

        let back: ModuleEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
