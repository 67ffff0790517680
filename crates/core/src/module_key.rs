//! Module keys (`Hrm`, `HelpdeskCategories`, ...).

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Unique key of an installable module (AddOn).
///
/// Keys are case-sensitive and must consist of ASCII alphanumerics, `_` or `-`.
/// The reserved key [`ModuleKey::GENERAL`] owns the core permissions that are
/// not contributed by any optional module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleKey(Cow<'static, str>);

impl ModuleKey {
    pub const GENERAL: ModuleKey = ModuleKey(Cow::Borrowed("general"));

    /// Build a key from a compile-time literal. Validation happens in the registry.
    pub const fn from_static(key: &'static str) -> Self {
        Self(Cow::Borrowed(key))
    }

    pub fn parse(key: impl Into<Cow<'static, str>>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.is_empty() {
            return Err(DomainError::validation("module key must not be empty"));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DomainError::validation(format!(
                "module key '{key}' contains invalid characters"
            )));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_general(&self) -> bool {
        self.as_str() == Self::GENERAL.as_str()
    }
}

impl core::fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for ModuleKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.trim().to_string())
    }
}

impl TryFrom<String> for ModuleKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ModuleKey> for String {
    fn from(value: ModuleKey) -> Self {
        value.0.into_owned()
    }
}

/// Render module keys the way the legacy event payloads carry them (`"Hrm,Crm"`).
pub fn modules_csv(keys: &[ModuleKey]) -> String {
    keys.iter().map(ModuleKey::as_str).collect::<Vec<_>>().join(",")
}

/// Parse a comma-separated module list, ignoring blanks.
pub fn parse_modules_csv(csv: &str) -> Result<Vec<ModuleKey>, DomainError> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| ModuleKey::parse(s.to_string()))
        .collect()
}
