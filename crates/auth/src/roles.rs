use serde::{Deserialize, Serialize};

use bizdesk_core::{DomainError, RoleId, TenantId};

/// Role names the platform knows about.
///
/// `SuperAdmin` is the only system role: tenant-less and immutable. Every other
/// kind lives inside exactly one tenant's namespace. `Custom` covers roles a
/// company creates by hand; they receive permissions only through overrides.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RoleKind {
    SuperAdmin,
    Company,
    Staff,
    Client,
    Vendor,
    Custom(String),
}

impl RoleKind {
    /// The tenant roles module grant tables are written against.
    pub const TENANT_STANDARD: [RoleKind; 4] =
        [RoleKind::Company, RoleKind::Staff, RoleKind::Client, RoleKind::Vendor];

    pub fn from_name(name: &str) -> Self {
        match name {
            "superadmin" => Self::SuperAdmin,
            "company" => Self::Company,
            "staff" => Self::Staff,
            "client" => Self::Client,
            "vendor" => Self::Vendor,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SuperAdmin => "superadmin",
            Self::Company => "company",
            Self::Staff => "staff",
            Self::Client => "client",
            Self::Vendor => "vendor",
            Self::Custom(name) => name,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::SuperAdmin)
    }
}

impl core::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RoleKind {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<RoleKind> for String {
    fn from(value: RoleKind) -> Self {
        value.as_str().to_string()
    }
}

/// A named permission bundle.
///
/// Exactly one tenant scope, except the reserved system role which has none
/// and is never editable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: RoleKind,
    pub tenant_id: Option<TenantId>,
    pub editable: bool,
}

impl Role {
    pub fn for_tenant(tenant_id: TenantId, name: RoleKind) -> Result<Self, DomainError> {
        if name.is_system() {
            return Err(DomainError::invariant(format!(
                "'{name}' is a system role and cannot belong to tenant {tenant_id}"
            )));
        }
        if name.as_str().trim().is_empty() {
            return Err(DomainError::validation("role name must not be empty"));
        }
        Ok(Self {
            id: RoleId::new(),
            name,
            tenant_id: Some(tenant_id),
            editable: true,
        })
    }

    pub fn system(name: RoleKind) -> Result<Self, DomainError> {
        if !name.is_system() {
            return Err(DomainError::invariant(format!(
                "'{name}' is not a system role"
            )));
        }
        Ok(Self {
            id: RoleId::new(),
            name,
            tenant_id: None,
            editable: false,
        })
    }

    pub fn is_system(&self) -> bool {
        self.tenant_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in RoleKind::TENANT_STANDARD {
            assert_eq!(RoleKind::from_name(kind.as_str()), kind);
        }
        assert_eq!(RoleKind::from_name("accountant"), RoleKind::Custom("accountant".into()));
    }

    #[test]
    fn system_role_is_tenantless_and_locked() {
        let role = Role::system(RoleKind::SuperAdmin).unwrap();
        assert!(role.is_system());
        assert!(!role.editable);
        assert!(Role::system(RoleKind::Staff).is_err());
    }

    #[test]
    fn tenant_role_cannot_be_superadmin() {
        assert!(Role::for_tenant(TenantId::new(1), RoleKind::SuperAdmin).is_err());
        let staff = Role::for_tenant(TenantId::new(1), RoleKind::Staff).unwrap();
        assert_eq!(staff.tenant_id, Some(TenantId::new(1)));
        assert!(staff.editable);
    }

    #[test]
    fn role_kind_serializes_as_plain_name() {
        let json = serde_json::to_string(&RoleKind::Client).unwrap();
        assert_eq!(json, "\"client\"");
    }
}
