use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bizdesk_core::{ModuleKey, PlanId};

/// A named bundle of modules plus limits and pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub modules: Vec<ModuleKey>,
    /// `None` means unlimited.
    pub max_users: Option<u32>,
    pub storage_limit_mb: Option<u64>,
    pub monthly_price: u64,
    pub yearly_price: u64,
}

/// A plan before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub name: String,
    pub modules: Vec<ModuleKey>,
    pub max_users: Option<u32>,
    pub storage_limit_mb: Option<u64>,
    pub monthly_price: u64,
    pub yearly_price: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("plan name must not be empty")]
    EmptyName,

    #[error("plan lists unknown module '{0}'")]
    UnknownModule(ModuleKey),

    #[error("plan lists admin-only module '{0}'")]
    AdminOnlyModule(ModuleKey),

    #[error("plan lists module '{0}' more than once")]
    DuplicateModule(ModuleKey),

    #[error("plan {field} {value} is out of range (max {max})")]
    OutOfRange { field: &'static str, value: u64, max: u64 },
}

/// Column limits of the plan table.
const MAX_USERS: u64 = i32::MAX as u64;
const MAX_BIGINT: u64 = i64::MAX as u64;

fn within(field: &'static str, value: u64, max: u64) -> Result<(), PlanValidationError> {
    if value > max {
        return Err(PlanValidationError::OutOfRange { field, value, max });
    }
    Ok(())
}

impl PlanDraft {
    pub fn new(name: impl Into<String>, modules: Vec<ModuleKey>) -> Self {
        Self {
            name: name.into(),
            modules,
            max_users: None,
            storage_limit_mb: None,
            monthly_price: 0,
            yearly_price: 0,
        }
    }

    /// Check the plan against the module catalog.
    ///
    /// `lookup` answers `Some(for_admin)` for modules present in the catalog.
    pub fn validate<F>(&self, lookup: F) -> Result<(), PlanValidationError>
    where
        F: Fn(&ModuleKey) -> Option<bool>,
    {
        if self.name.trim().is_empty() {
            return Err(PlanValidationError::EmptyName);
        }
        if let Some(max_users) = self.max_users {
            within("max_users", u64::from(max_users), MAX_USERS)?;
        }
        if let Some(storage) = self.storage_limit_mb {
            within("storage_limit_mb", storage, MAX_BIGINT)?;
        }
        within("monthly_price", self.monthly_price, MAX_BIGINT)?;
        within("yearly_price", self.yearly_price, MAX_BIGINT)?;

        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module) {
                return Err(PlanValidationError::DuplicateModule(module.clone()));
            }
            match lookup(module) {
                None => return Err(PlanValidationError::UnknownModule(module.clone())),
                Some(true) => return Err(PlanValidationError::AdminOnlyModule(module.clone())),
                Some(false) => {}
            }
        }
        Ok(())
    }

    pub fn into_plan(self, id: PlanId) -> Plan {
        Plan {
            id,
            name: self.name,
            modules: self.modules,
            max_users: self.max_users,
            storage_limit_mb: self.storage_limit_mb,
            monthly_price: self.monthly_price,
            yearly_price: self.yearly_price,
        }
    }
}

impl Plan {
    pub fn includes(&self, module: &ModuleKey) -> bool {
        self.modules.contains(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(modules: &[&'static str]) -> PlanDraft {
        PlanDraft::new(
            "Basic",
            modules.iter().map(|&m| ModuleKey::from_static(m)).collect(),
        )
    }

    fn catalog(key: &ModuleKey) -> Option<bool> {
        match key.as_str() {
            "Hrm" | "Crm" => Some(false),
            "LandingPage" => Some(true),
            _ => None,
        }
    }

    #[test]
    fn accepts_known_modules() {
        assert_eq!(plan(&["Hrm", "Crm"]).validate(catalog), Ok(()));
    }

    #[test]
    fn into_plan_keeps_modules_in_order() {
        let plan = plan(&["Crm", "Hrm"]).into_plan(PlanId::new(7));
        assert_eq!(plan.id, PlanId::new(7));
        assert!(plan.includes(&ModuleKey::from_static("Hrm")));
        assert_eq!(plan.modules[0].as_str(), "Crm");
    }

    #[test]
    fn rejects_empty_name() {
        let mut draft = plan(&[]);
        draft.name = "  ".into();
        assert_eq!(draft.validate(catalog), Err(PlanValidationError::EmptyName));
    }

    #[test]
    fn rejects_unknown_admin_only_and_duplicate_modules() {
        assert_eq!(
            plan(&["Hrm", "Payroll"]).validate(catalog),
            Err(PlanValidationError::UnknownModule(ModuleKey::from_static("Payroll")))
        );
        assert_eq!(
            plan(&["LandingPage"]).validate(catalog),
            Err(PlanValidationError::AdminOnlyModule(ModuleKey::from_static("LandingPage")))
        );
        assert_eq!(
            plan(&["Hrm", "Hrm"]).validate(catalog),
            Err(PlanValidationError::DuplicateModule(ModuleKey::from_static("Hrm")))
        );
    }

    #[test]
    fn rejects_limits_the_store_cannot_hold() {
        let mut draft = plan(&["Hrm"]);
        draft.max_users = Some(u32::MAX);
        assert!(matches!(
            draft.validate(catalog),
            Err(PlanValidationError::OutOfRange { field: "max_users", .. })
        ));

        let mut draft = plan(&["Hrm"]);
        draft.storage_limit_mb = Some(u64::MAX);
        assert!(matches!(
            draft.validate(catalog),
            Err(PlanValidationError::OutOfRange { field: "storage_limit_mb", .. })
        ));

        let mut draft = plan(&["Hrm"]);
        draft.yearly_price = i64::MAX as u64 + 1;
        assert!(matches!(
            draft.validate(catalog),
            Err(PlanValidationError::OutOfRange { field: "yearly_price", .. })
        ));

        let mut draft = plan(&["Hrm"]);
        draft.max_users = Some(i32::MAX as u32);
        draft.storage_limit_mb = Some(i64::MAX as u64);
        assert_eq!(draft.validate(catalog), Ok(()));
    }
}
