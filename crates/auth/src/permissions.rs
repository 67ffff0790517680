use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use bizdesk_core::{DomainError, ModuleKey};

/// Permission identifier (e.g. `"manage-helpdesk-categories"`).
///
/// Names are globally unique across every module. The owning module is kept on
/// the catalog row ([`Permission`]) and shows up in the qualified
/// `module::name` form used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionName(Cow<'static, str>);

impl PermissionName {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Lower-case kebab identifiers only (`manage-hrm`, `create-pos-orders`).
    pub fn validate(&self) -> Result<(), DomainError> {
        let s = self.as_str();
        let well_formed = !s.is_empty()
            && !s.starts_with('-')
            && !s.ends_with('-')
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if well_formed {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "permission name '{s}' must be lower-case kebab-case"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PermissionName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for PermissionName {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

/// Static permission declaration contributed by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDef {
    pub name: PermissionName,
    pub label: Cow<'static, str>,
}

impl PermissionDef {
    pub const fn new(name: &'static str, label: &'static str) -> Self {
        Self {
            name: PermissionName::from_static(name),
            label: Cow::Borrowed(label),
        }
    }
}

/// Permission catalog row: `(name, module, label)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: PermissionName,
    pub module: ModuleKey,
    pub label: String,
}

impl Permission {
    pub fn new(name: PermissionName, module: ModuleKey, label: impl Into<String>) -> Self {
        Self {
            name,
            module,
            label: label.into(),
        }
    }

    pub fn from_def(module: &ModuleKey, def: &PermissionDef) -> Self {
        Self::new(def.name.clone(), module.clone(), def.label.clone())
    }

    /// Namespaced form, e.g. `Helpdesk::manage-helpdesk-tickets`.
    pub fn qualified(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_names_validate() {
        assert!(PermissionName::from_static("manage-helpdesk-categories").validate().is_ok());
        assert!(PermissionName::from_static("create-pos2-orders").validate().is_ok());
    }

    #[test]
    fn malformed_names_are_rejected() {
        for bad in ["", "Manage-Hrm", "manage hrm", "-manage", "manage-"] {
            assert!(PermissionName::new(bad.to_string()).validate().is_err(), "{bad}");
        }
    }

    #[test]
    fn qualified_name_includes_owner() {
        let p = Permission::from_def(
            &ModuleKey::from_static("Hrm"),
            &PermissionDef::new("manage-hrm", "Manage HRM"),
        );
        assert_eq!(p.qualified(), "Hrm::manage-hrm");
    }
}
