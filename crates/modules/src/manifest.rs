//! `module.json` manifests.
//!
//! ```json
//! { "name": "Hrm", "alias": "HRM", "monthly_price": 10, "yearly_price": 100,
//!   "package_name": "hrm", "for_admin": false, "priority": 10 }
//! ```
//!
//! Prices arrive as decimal currency amounts and are stored in cents.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bizdesk_core::ModuleKey;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("malformed manifest json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid manifest field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A validated module manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleManifest {
    pub name: ModuleKey,
    pub alias: String,
    pub monthly_price: u64,
    pub yearly_price: u64,
    pub package_name: String,
    pub for_admin: bool,
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    monthly_price: Option<f64>,
    #[serde(default)]
    yearly_price: Option<f64>,
    #[serde(default)]
    package_name: Option<String>,
    #[serde(default)]
    for_admin: bool,
    #[serde(default)]
    priority: Option<i32>,
}

/// Priority given to manifests that do not declare one (seeded last).
pub const DEFAULT_PRIORITY: i32 = 100;

impl ModuleManifest {
    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(json)?;

        let name = ModuleKey::parse(raw.name.trim().to_string()).map_err(|e| {
            ManifestError::InvalidField {
                field: "name",
                reason: e.to_string(),
            }
        })?;

        let alias = raw
            .alias
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| name.to_string());

        let package_name = raw
            .package_name
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| name.as_str().to_lowercase());

        Ok(Self {
            monthly_price: to_cents("monthly_price", raw.monthly_price)?,
            yearly_price: to_cents("yearly_price", raw.yearly_price)?,
            name,
            alias,
            package_name,
            for_admin: raw.for_admin,
            priority: raw.priority.unwrap_or(DEFAULT_PRIORITY),
        })
    }
}

fn to_cents(field: &'static str, amount: Option<f64>) -> Result<u64, ManifestError> {
    let amount = amount.unwrap_or(0.0);
    if !amount.is_finite() || amount < 0.0 {
        return Err(ManifestError::InvalidField {
            field,
            reason: format!("expected a non-negative amount, got {amount}"),
        });
    }
    let cents = (amount * 100.0).round();
    // Stored as BIGINT.
    if cents >= i64::MAX as f64 {
        return Err(ManifestError::InvalidField {
            field,
            reason: format!("amount {amount} is out of range"),
        });
    }
    Ok(cents as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_manifest() {
        let m = ModuleManifest::parse(
            r#"{"name":"Hrm","alias":"HRM","monthly_price":9.99,"yearly_price":99,
                "package_name":"hrm","for_admin":false,"priority":10}"#,
        )
        .unwrap();

        assert_eq!(m.name.as_str(), "Hrm");
        assert_eq!(m.alias, "HRM");
        assert_eq!(m.monthly_price, 999);
        assert_eq!(m.yearly_price, 9900);
        assert_eq!(m.priority, 10);
    }

    #[test]
    fn optional_fields_get_defaults() {
        let m = ModuleManifest::parse(r#"{"name":"Taskly"}"#).unwrap();
        assert_eq!(m.alias, "Taskly");
        assert_eq!(m.package_name, "taskly");
        assert_eq!(m.monthly_price, 0);
        assert_eq!(m.priority, DEFAULT_PRIORITY);
        assert!(!m.for_admin);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            ModuleManifest::parse("{\"name\": \"Hrm\""),
            Err(ManifestError::Json(_))
        ));
    }

    #[test]
    fn invalid_name_and_negative_price_are_rejected() {
        assert!(matches!(
            ModuleManifest::parse(r#"{"name":"Help desk"}"#),
            Err(ManifestError::InvalidField { field: "name", .. })
        ));
        assert!(matches!(
            ModuleManifest::parse(r#"{"name":"Pos","monthly_price":-1}"#),
            Err(ManifestError::InvalidField { field: "monthly_price", .. })
        ));
    }

    #[test]
    fn prices_beyond_bigint_cents_are_rejected() {
        assert!(matches!(
            ModuleManifest::parse(r#"{"name":"Big","monthly_price":1e17}"#),
            Err(ManifestError::InvalidField { field: "monthly_price", .. })
        ));
        assert!(matches!(
            ModuleManifest::parse(r#"{"name":"Big","yearly_price":1e30}"#),
            Err(ManifestError::InvalidField { field: "yearly_price", .. })
        ));

        let m = ModuleManifest::parse(r#"{"name":"Big","monthly_price":1e15}"#).unwrap();
        assert_eq!(m.monthly_price, 100_000_000_000_000_000);
    }
}
