use std::borrow::Cow;

use bizdesk_core::ModuleKey;

/// Compiled description of a module: what `module.json` carries, known at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub key: ModuleKey,
    pub alias: Cow<'static, str>,
    /// Prices in the smallest currency unit (cents).
    pub monthly_price: u64,
    pub yearly_price: u64,
    pub package_name: Cow<'static, str>,
    /// Superadmin-only module; never activated for a tenant.
    pub for_admin: bool,
    /// Seeding order: lower runs first.
    pub priority: i32,
}

impl ModuleDescriptor {
    pub const fn new(key: &'static str, alias: &'static str, priority: i32) -> Self {
        Self {
            key: ModuleKey::from_static(key),
            alias: Cow::Borrowed(alias),
            monthly_price: 0,
            yearly_price: 0,
            package_name: Cow::Borrowed(""),
            for_admin: false,
            priority,
        }
    }

    pub fn with_prices(mut self, monthly: u64, yearly: u64) -> Self {
        self.monthly_price = monthly;
        self.yearly_price = yearly;
        self
    }

    pub fn with_package(mut self, package_name: &'static str) -> Self {
        self.package_name = Cow::Borrowed(package_name);
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.for_admin = true;
        self
    }
}
