//! Compiled module registry.
//!
//! An arena of registered plugins sorted by `(priority, key)`; a
//! [`ModuleIndex`] is a stable position in that order for the lifetime of the
//! registry. `build()` performs the static validation that keeps listeners
//! from disagreeing at runtime: unique keys, well-formed permission names,
//! grants that only reference declared permissions, and permission ownership
//! collisions.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use bizdesk_auth::{Permission, PermissionName, RoleKind};
use bizdesk_core::ModuleKey;

use crate::{CorePermissions, ModulePlugin};

/// Stable position of a module in the registry's seeding order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleIndex(usize);

impl ModuleIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// What to do when two modules declare the same permission name.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// First declaration (in seeding order) owns the row; later ones are logged and ignored.
    #[default]
    Warn,
    /// Refuse to build the registry.
    Reject,
}

impl core::str::FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown collision policy '{other}' (expected warn|reject)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCollision {
    pub permission: PermissionName,
    pub owner: ModuleKey,
    pub rejected: ModuleKey,
}

impl core::fmt::Display for PermissionCollision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "permission '{}' declared by '{}' is already owned by '{}'",
            self.permission, self.rejected, self.owner
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("module '{0}' registered twice")]
    DuplicateModule(ModuleKey),

    #[error("module key '{0}' is reserved")]
    ReservedKey(ModuleKey),

    #[error("module key '{module}' is invalid: {reason}")]
    InvalidModuleKey { module: ModuleKey, reason: String },

    #[error("module '{module}' declares invalid permission: {reason}")]
    InvalidPermission { module: ModuleKey, reason: String },

    #[error("module '{module}' grants undeclared permission '{permission}'")]
    UnknownPermission {
        module: ModuleKey,
        permission: PermissionName,
    },

    #[error("{0}")]
    PermissionCollision(PermissionCollision),

    #[error("module '{module}' grants to role '{role}' which it cannot reach")]
    RoleScope { module: ModuleKey, role: RoleKind },
}

struct Entry {
    plugin: Arc<dyn ModulePlugin>,
    owned: Vec<Permission>,
}

pub struct ModuleRegistry {
    entries: Vec<Entry>,
    by_key: HashMap<ModuleKey, ModuleIndex>,
    catalog: BTreeMap<PermissionName, Permission>,
    core: CorePermissions,
    collisions: Vec<PermissionCollision>,
}

impl core::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.keys().collect::<Vec<_>>())
            .field("permissions", &self.catalog.len())
            .field("collisions", &self.collisions)
            .finish()
    }
}

#[derive(Default)]
pub struct ModuleRegistryBuilder {
    plugins: Vec<Arc<dyn ModulePlugin>>,
    policy: CollisionPolicy,
    core: Option<CorePermissions>,
}

impl ModuleRegistryBuilder {
    pub fn register(mut self, plugin: Arc<dyn ModulePlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn register_all(mut self, plugins: impl IntoIterator<Item = Arc<dyn ModulePlugin>>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn core_permissions(mut self, core: CorePermissions) -> Self {
        self.core = Some(core);
        self
    }

    pub fn build(self) -> Result<ModuleRegistry, RegistryError> {
        let core = self.core.unwrap_or_default();
        let mut plugins = self.plugins;
        plugins.sort_by(|a, b| {
            let (a, b) = (a.descriptor(), b.descriptor());
            (a.priority, &a.key).cmp(&(b.priority, &b.key))
        });

        let mut by_key = HashMap::with_capacity(plugins.len());
        for (idx, plugin) in plugins.iter().enumerate() {
            let key = &plugin.descriptor().key;
            ModuleKey::parse(key.as_str().to_string()).map_err(|e| {
                RegistryError::InvalidModuleKey {
                    module: key.clone(),
                    reason: e.to_string(),
                }
            })?;
            if key.is_general() {
                return Err(RegistryError::ReservedKey(key.clone()));
            }
            if by_key.insert(key.clone(), ModuleIndex(idx)).is_some() {
                return Err(RegistryError::DuplicateModule(key.clone()));
            }
        }

        let mut catalog = BTreeMap::new();
        for def in &core.permissions {
            def.name
                .validate()
                .map_err(|e| RegistryError::InvalidPermission {
                    module: ModuleKey::GENERAL,
                    reason: e.to_string(),
                })?;
            catalog
                .entry(def.name.clone())
                .or_insert_with(|| Permission::from_def(&ModuleKey::GENERAL, def));
        }

        let mut collisions = Vec::new();
        let mut entries = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            let key = plugin.descriptor().key.clone();
            let mut owned = Vec::new();
            for def in plugin.declared_permissions() {
                def.name
                    .validate()
                    .map_err(|e| RegistryError::InvalidPermission {
                        module: key.clone(),
                        reason: e.to_string(),
                    })?;

                match catalog.get(&def.name) {
                    None => {
                        let permission = Permission::from_def(&key, def);
                        catalog.insert(def.name.clone(), permission.clone());
                        owned.push(permission);
                    }
                    // Declared twice by the same module.
                    Some(existing) if existing.module == key => {}
                    Some(existing) => {
                        let collision = PermissionCollision {
                            permission: def.name.clone(),
                            owner: existing.module.clone(),
                            rejected: key.clone(),
                        };
                        match self.policy {
                            CollisionPolicy::Reject => {
                                return Err(RegistryError::PermissionCollision(collision));
                            }
                            CollisionPolicy::Warn => {
                                warn!(
                                    permission = %collision.permission,
                                    owner = %collision.owner,
                                    module = %collision.rejected,
                                    "permission already declared by another module; first declaration wins"
                                );
                                collisions.push(collision);
                            }
                        }
                    }
                }
            }
            entries.push(Entry { plugin, owned });
        }

        for entry in &entries {
            let descriptor = entry.plugin.descriptor();
            let grants = entry.plugin.role_grants();
            for role in grants.roles() {
                if role.is_system() != descriptor.for_admin {
                    return Err(RegistryError::RoleScope {
                        module: descriptor.key.clone(),
                        role: role.clone(),
                    });
                }
            }
            check_references(&descriptor.key, grants.referenced(), &catalog)?;
        }
        check_references(&ModuleKey::GENERAL, core.grants.referenced(), &catalog)?;

        Ok(ModuleRegistry {
            entries,
            by_key,
            catalog,
            core,
            collisions,
        })
    }
}

fn check_references(
    module: &ModuleKey,
    referenced: BTreeSet<PermissionName>,
    catalog: &BTreeMap<PermissionName, Permission>,
) -> Result<(), RegistryError> {
    match referenced.into_iter().find(|p| !catalog.contains_key(p)) {
        Some(permission) => Err(RegistryError::UnknownPermission {
            module: module.clone(),
            permission,
        }),
        None => Ok(()),
    }
}

impl ModuleRegistry {
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plugins in seeding order.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleIndex, &Arc<dyn ModulePlugin>)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (ModuleIndex(i), &e.plugin))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ModuleKey> {
        self.entries.iter().map(|e| &e.plugin.descriptor().key)
    }

    pub fn index_of(&self, key: &ModuleKey) -> Option<ModuleIndex> {
        self.by_key.get(key).copied()
    }

    pub fn contains(&self, key: &ModuleKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn get(&self, key: &ModuleKey) -> Option<&Arc<dyn ModulePlugin>> {
        self.index_of(key).and_then(|i| self.plugin(i))
    }

    pub fn plugin(&self, index: ModuleIndex) -> Option<&Arc<dyn ModulePlugin>> {
        self.entries.get(index.0).map(|e| &e.plugin)
    }

    /// Known keys from `keys`, deduplicated and sorted into seeding order.
    /// Unknown keys are dropped.
    pub fn in_seeding_order<'a>(&self, keys: impl IntoIterator<Item = &'a ModuleKey>) -> Vec<ModuleKey> {
        let indices: BTreeSet<ModuleIndex> =
            keys.into_iter().filter_map(|k| self.index_of(k)).collect();
        indices
            .into_iter()
            .map(|i| self.entries[i.0].plugin.descriptor().key.clone())
            .collect()
    }

    /// Catalog row for a permission name (its owner and label).
    pub fn permission(&self, name: &PermissionName) -> Option<&Permission> {
        self.catalog.get(name)
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.catalog.values()
    }

    /// Permissions the module owns.
    pub fn owned_permissions(&self, key: &ModuleKey) -> &[Permission] {
        self.index_of(key)
            .map(|i| self.entries[i.0].owned.as_slice())
            .unwrap_or(&[])
    }

    /// Every permission row the module needs to exist before its grants can be
    /// linked: its own declarations first, then shared permissions it references.
    pub fn required_permissions(&self, key: &ModuleKey) -> Vec<Permission> {
        let Some(plugin) = self.get(key) else {
            return Vec::new();
        };
        let mut out: Vec<Permission> = self.owned_permissions(key).to_vec();
        for name in plugin.role_grants().referenced() {
            if out.iter().any(|p| p.name == name) {
                continue;
            }
            if let Some(p) = self.catalog.get(&name) {
                out.push(p.clone());
            }
        }
        out
    }

    /// Rows for the `general` module.
    pub fn core_permissions(&self) -> Vec<Permission> {
        self.catalog
            .values()
            .filter(|p| p.module.is_general())
            .cloned()
            .collect()
    }

    pub fn core_grants(&self, role: &RoleKind) -> &[PermissionName] {
        self.core.for_role(role)
    }

    /// Permissions a role should hold given the active modules: core grants plus
    /// the union of every active module's grants for that role.
    pub fn expected_for_role(&self, active: &[ModuleKey], role: &RoleKind) -> BTreeSet<PermissionName> {
        let mut out: BTreeSet<PermissionName> = self.core_grants(role).iter().cloned().collect();
        for key in self.in_seeding_order(active) {
            if let Some(plugin) = self.get(&key) {
                out.extend(plugin.role_grants().for_role(role).iter().cloned());
            }
        }
        out
    }

    pub fn collisions(&self) -> &[PermissionCollision] {
        &self.collisions
    }
}
