//! Postgres-backed store.
//!
//! The service layer is synchronous, so each operation blocks on the runtime
//! handle the store was built with. Callers must not invoke the store from
//! inside an async task on that runtime.
//!
//! Races between concurrent activations are resolved by the database: the
//! ledger's primary key `(tenant_id, module)` plus `ON CONFLICT DO NOTHING`
//! means two requests for the same pair converge on one row.

use std::collections::BTreeSet;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::instrument;
use uuid::Uuid;

use bizdesk_auth::{Permission, PermissionName, Role, RoleKind};
use bizdesk_core::{ModuleKey, PlanId, RoleId, TenantId, modules_csv, parse_modules_csv};
use bizdesk_modules::{AddOn, Plan, PlanDraft};

use super::{ActivationRecord, Store, StoreTx, Upserted};
use crate::StoreError;
use crate::error::map_sqlx_error;

/// Idempotent DDL, applied by [`PostgresStore::ensure_schema`].
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS add_ons (
        module TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        monthly_price BIGINT NOT NULL DEFAULT 0,
        yearly_price BIGINT NOT NULL DEFAULT 0,
        is_enable BOOLEAN NOT NULL DEFAULT TRUE,
        for_admin BOOLEAN NOT NULL DEFAULT FALSE,
        priority INTEGER NOT NULL DEFAULT 100,
        package_name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS plans (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        modules TEXT NOT NULL DEFAULT '',
        max_users INTEGER NULL,
        storage_limit_mb BIGINT NULL,
        monthly_price BIGINT NOT NULL DEFAULT 0,
        yearly_price BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id BIGINT PRIMARY KEY,
        active_plan BIGINT NULL REFERENCES plans (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_active_modules (
        tenant_id BIGINT NOT NULL,
        module TEXT NOT NULL REFERENCES add_ons (module),
        activated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (tenant_id, module)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_module_deactivations (
        tenant_id BIGINT NOT NULL,
        module TEXT NOT NULL,
        deactivated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (tenant_id, module)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        name TEXT PRIMARY KEY,
        module TEXT NOT NULL,
        label TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        tenant_id BIGINT NULL,
        editable BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS roles_scope_name ON roles ((COALESCE(tenant_id, 0)), name)",
    r#"
    CREATE TABLE IF NOT EXISTS role_has_permissions (
        role_id UUID NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
        permission TEXT NOT NULL REFERENCES permissions (name),
        PRIMARY KEY (role_id, permission)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permission_overrides (
        role_id UUID NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
        permission TEXT NOT NULL REFERENCES permissions (name),
        PRIMARY KEY (role_id, permission)
    )
    "#,
];

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    handle: Handle,
}

impl PostgresStore {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }

    #[instrument(skip_all, err)]
    pub fn connect(database_url: &str, handle: Handle) -> Result<Self, StoreError> {
        let pool = handle
            .block_on(
                PgPoolOptions::new()
                    .max_connections(5)
                    .connect(database_url),
            )
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, handle))
    }

    #[instrument(skip(self), err)]
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.handle.block_on(async {
            for statement in SCHEMA {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("ensure_schema", e))?;
            }
            Ok::<(), StoreError>(())
        })
    }
}

impl Store for PostgresStore {
    type Tx<'a>
        = PostgresTx
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError> {
        let tx = self
            .handle
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx {
            tx,
            handle: self.handle.clone(),
        })
    }
}

/// An open Postgres transaction. Dropping it rolls back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
    handle: Handle,
}

impl PostgresTx {
    fn split(&mut self) -> (&Handle, &mut PgConnection) {
        (&self.handle, &mut *self.tx)
    }
}

fn to_db_price(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("price {value} out of range")))
}

fn from_db_price(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative price {value}")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn module_key(raw: String) -> Result<ModuleKey, StoreError> {
    ModuleKey::parse(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn add_on_from_row(row: &PgRow) -> Result<AddOn, StoreError> {
    Ok(AddOn {
        module: module_key(column(row, "module")?)?,
        name: column(row, "name")?,
        monthly_price: from_db_price(column(row, "monthly_price")?)?,
        yearly_price: from_db_price(column(row, "yearly_price")?)?,
        is_enable: column(row, "is_enable")?,
        for_admin: column(row, "for_admin")?,
        priority: column(row, "priority")?,
        package_name: column(row, "package_name")?,
    })
}

fn plan_from_row(row: &PgRow) -> Result<Plan, StoreError> {
    let modules: String = column(row, "modules")?;
    let max_users: Option<i32> = column(row, "max_users")?;
    let storage: Option<i64> = column(row, "storage_limit_mb")?;
    Ok(Plan {
        id: PlanId::new(column(row, "id")?),
        name: column(row, "name")?,
        modules: parse_modules_csv(&modules).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        max_users: max_users.map(|v| v.max(0) as u32),
        storage_limit_mb: storage.map(|v| v.max(0) as u64),
        monthly_price: from_db_price(column(row, "monthly_price")?)?,
        yearly_price: from_db_price(column(row, "yearly_price")?)?,
    })
}

fn activation_from_row(row: &PgRow) -> Result<ActivationRecord, StoreError> {
    Ok(ActivationRecord {
        tenant_id: TenantId::new(column(row, "tenant_id")?),
        module: module_key(column(row, "module")?)?,
        activated_at: column(row, "activated_at")?,
    })
}

fn permission_from_row(row: &PgRow) -> Result<Permission, StoreError> {
    let name: String = column(row, "name")?;
    let label: String = column(row, "label")?;
    Ok(Permission::new(
        PermissionName::new(name),
        module_key(column(row, "module")?)?,
        label,
    ))
}

fn role_from_row(row: &PgRow) -> Result<Role, StoreError> {
    let id: Uuid = column(row, "id")?;
    let name: String = column(row, "name")?;
    let tenant_id: Option<i64> = column(row, "tenant_id")?;
    Ok(Role {
        id: RoleId::from_uuid(id),
        name: RoleKind::from_name(&name),
        tenant_id: tenant_id.map(TenantId::new),
        editable: column(row, "editable")?,
    })
}

fn names_from_rows(rows: &[PgRow]) -> Result<BTreeSet<PermissionName>, StoreError> {
    rows.iter()
        .map(|row| column::<String>(row, "permission").map(PermissionName::new))
        .collect()
}

impl StoreTx for PostgresTx {
    fn insert_add_on_if_absent(&mut self, add_on: &AddOn) -> Result<bool, StoreError> {
        let (rt, conn) = self.split();
        let result = rt
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO add_ons
                        (module, name, monthly_price, yearly_price, is_enable, for_admin, priority, package_name)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    ON CONFLICT (module) DO NOTHING
                    "#,
                )
                .bind(add_on.module.as_str())
                .bind(&add_on.name)
                .bind(to_db_price(add_on.monthly_price)?)
                .bind(to_db_price(add_on.yearly_price)?)
                .bind(add_on.is_enable)
                .bind(add_on.for_admin)
                .bind(add_on.priority)
                .bind(&add_on.package_name)
                .execute(conn),
            )
            .map_err(|e| map_sqlx_error("insert_add_on", e))?;
        Ok(result.rows_affected() == 1)
    }

    fn add_on(&mut self, module: &ModuleKey) -> Result<Option<AddOn>, StoreError> {
        let (rt, conn) = self.split();
        let row = rt
            .block_on(
                sqlx::query("SELECT * FROM add_ons WHERE module = $1")
                    .bind(module.as_str())
                    .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("load_add_on", e))?;
        row.as_ref().map(add_on_from_row).transpose()
    }

    fn add_ons(&mut self) -> Result<Vec<AddOn>, StoreError> {
        let (rt, conn) = self.split();
        let rows = rt
            .block_on(sqlx::query("SELECT * FROM add_ons ORDER BY priority ASC, module ASC").fetch_all(conn))
            .map_err(|e| map_sqlx_error("list_add_ons", e))?;
        rows.iter().map(add_on_from_row).collect()
    }

    #[instrument(skip_all, fields(plan = %draft.name), err)]
    fn insert_plan(&mut self, draft: PlanDraft) -> Result<Plan, StoreError> {
        let monthly = to_db_price(draft.monthly_price)?;
        let yearly = to_db_price(draft.yearly_price)?;
        let storage = draft
            .storage_limit_mb
            .map(|v| i64::try_from(v).map_err(|_| StoreError::Corrupt(format!("storage limit {v} out of range"))))
            .transpose()?;
        let max_users = draft
            .max_users
            .map(|v| i32::try_from(v).map_err(|_| StoreError::Corrupt(format!("max users {v} out of range"))))
            .transpose()?;
        let (rt, conn) = self.split();
        let row = rt
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO plans (name, modules, max_users, storage_limit_mb, monthly_price, yearly_price)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING id
                    "#,
                )
                .bind(&draft.name)
                .bind(modules_csv(&draft.modules))
                .bind(max_users)
                .bind(storage)
                .bind(monthly)
                .bind(yearly)
                .fetch_one(conn),
            )
            .map_err(|e| map_sqlx_error("insert_plan", e))?;
        let id: i64 = column(&row, "id")?;
        Ok(draft.into_plan(PlanId::new(id)))
    }

    fn plan(&mut self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        let (rt, conn) = self.split();
        let row = rt
            .block_on(
                sqlx::query("SELECT * FROM plans WHERE id = $1")
                    .bind(id.get())
                    .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("load_plan", e))?;
        row.as_ref().map(plan_from_row).transpose()
    }

    fn ensure_tenant(&mut self, tenant_id: TenantId) -> Result<(), StoreError> {
        let (rt, conn) = self.split();
        rt.block_on(
            sqlx::query("INSERT INTO tenants (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
                .bind(tenant_id.get())
                .execute(conn),
        )
        .map_err(|e| map_sqlx_error("ensure_tenant", e))?;
        Ok(())
    }

    fn tenants(&mut self) -> Result<Vec<TenantId>, StoreError> {
        let (rt, conn) = self.split();
        let rows = rt
            .block_on(sqlx::query("SELECT id FROM tenants ORDER BY id").fetch_all(conn))
            .map_err(|e| map_sqlx_error("list_tenants", e))?;
        rows.iter()
            .map(|row| column::<i64>(row, "id").map(TenantId::new))
            .collect()
    }

    fn set_tenant_plan(&mut self, tenant_id: TenantId, plan_id: PlanId) -> Result<(), StoreError> {
        let (rt, conn) = self.split();
        rt.block_on(
            sqlx::query(
                r#"
                INSERT INTO tenants (id, active_plan) VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE SET active_plan = EXCLUDED.active_plan
                "#,
            )
            .bind(tenant_id.get())
            .bind(plan_id.get())
            .execute(conn),
        )
        .map_err(|e| map_sqlx_error("set_tenant_plan", e))?;
        Ok(())
    }

    fn tenant_plan(&mut self, tenant_id: TenantId) -> Result<Option<PlanId>, StoreError> {
        let (rt, conn) = self.split();
        let row = rt
            .block_on(
                sqlx::query("SELECT active_plan FROM tenants WHERE id = $1")
                    .bind(tenant_id.get())
                    .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("load_tenant_plan", e))?;
        match row {
            Some(row) => Ok(column::<Option<i64>>(&row, "active_plan")?.map(PlanId::new)),
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(tenant_id = %tenant_id, module = %module), err)]
    fn insert_activation(
        &mut self,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<Upserted<ActivationRecord>, StoreError> {
        let (rt, conn) = self.split();
        let inserted = rt
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO user_active_modules (tenant_id, module)
                    VALUES ($1, $2)
                    ON CONFLICT (tenant_id, module) DO NOTHING
                    RETURNING tenant_id, module, activated_at
                    "#,
                )
                .bind(tenant_id.get())
                .bind(module.as_str())
                .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("insert_activation", e))?;

        if let Some(row) = inserted {
            return Ok(Upserted {
                value: activation_from_row(&row)?,
                created: true,
            });
        }
        let existing = self
            .activation(tenant_id, module)?
            .ok_or_else(|| StoreError::NotFound(format!("activation ({tenant_id}, {module})")))?;
        Ok(Upserted {
            value: existing,
            created: false,
        })
    }

    fn delete_activation(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<bool, StoreError> {
        let (rt, conn) = self.split();
        let result = rt
            .block_on(
                sqlx::query("DELETE FROM user_active_modules WHERE tenant_id = $1 AND module = $2")
                    .bind(tenant_id.get())
                    .bind(module.as_str())
                    .execute(conn),
            )
            .map_err(|e| map_sqlx_error("delete_activation", e))?;
        Ok(result.rows_affected() > 0)
    }

    fn activation(
        &mut self,
        tenant_id: TenantId,
        module: &ModuleKey,
    ) -> Result<Option<ActivationRecord>, StoreError> {
        let (rt, conn) = self.split();
        let row = rt
            .block_on(
                sqlx::query(
                    "SELECT tenant_id, module, activated_at FROM user_active_modules WHERE tenant_id = $1 AND module = $2",
                )
                .bind(tenant_id.get())
                .bind(module.as_str())
                .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("load_activation", e))?;
        row.as_ref().map(activation_from_row).transpose()
    }

    fn activations(&mut self, tenant_id: TenantId) -> Result<Vec<ActivationRecord>, StoreError> {
        let (rt, conn) = self.split();
        let rows = rt
            .block_on(
                sqlx::query(
                    "SELECT tenant_id, module, activated_at FROM user_active_modules WHERE tenant_id = $1 ORDER BY module",
                )
                .bind(tenant_id.get())
                .fetch_all(conn),
            )
            .map_err(|e| map_sqlx_error("list_activations", e))?;
        rows.iter().map(activation_from_row).collect()
    }

    fn mark_deactivated(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<(), StoreError> {
        let (rt, conn) = self.split();
        rt.block_on(
            sqlx::query(
                r#"
                INSERT INTO tenant_module_deactivations (tenant_id, module) VALUES ($1, $2)
                ON CONFLICT (tenant_id, module) DO UPDATE SET deactivated_at = NOW()
                "#,
            )
            .bind(tenant_id.get())
            .bind(module.as_str())
            .execute(conn),
        )
        .map_err(|e| map_sqlx_error("mark_deactivated", e))?;
        Ok(())
    }

    fn clear_deactivated(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<(), StoreError> {
        let (rt, conn) = self.split();
        rt.block_on(
            sqlx::query("DELETE FROM tenant_module_deactivations WHERE tenant_id = $1 AND module = $2")
                .bind(tenant_id.get())
                .bind(module.as_str())
                .execute(conn),
        )
        .map_err(|e| map_sqlx_error("clear_deactivated", e))?;
        Ok(())
    }

    fn is_deactivated(&mut self, tenant_id: TenantId, module: &ModuleKey) -> Result<bool, StoreError> {
        let (rt, conn) = self.split();
        let row = rt
            .block_on(
                sqlx::query("SELECT 1 FROM tenant_module_deactivations WHERE tenant_id = $1 AND module = $2")
                    .bind(tenant_id.get())
                    .bind(module.as_str())
                    .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("load_deactivation", e))?;
        Ok(row.is_some())
    }

    #[instrument(skip_all, fields(permission = %permission.name, module = %permission.module), err)]
    fn first_or_create_permission(
        &mut self,
        permission: &Permission,
    ) -> Result<Upserted<Permission>, StoreError> {
        let (rt, conn) = self.split();
        let result = rt
            .block_on(
                sqlx::query(
                    "INSERT INTO permissions (name, module, label) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING",
                )
                .bind(permission.name.as_str())
                .bind(permission.module.as_str())
                .bind(&permission.label)
                .execute(conn),
            )
            .map_err(|e| map_sqlx_error("insert_permission", e))?;

        if result.rows_affected() == 1 {
            return Ok(Upserted {
                value: permission.clone(),
                created: true,
            });
        }
        let existing = self
            .permission(&permission.name)?
            .ok_or_else(|| StoreError::NotFound(format!("permission {}", permission.name)))?;
        Ok(Upserted {
            value: existing,
            created: false,
        })
    }

    fn permission(&mut self, name: &PermissionName) -> Result<Option<Permission>, StoreError> {
        let (rt, conn) = self.split();
        let row = rt
            .block_on(
                sqlx::query("SELECT name, module, label FROM permissions WHERE name = $1")
                    .bind(name.as_str())
                    .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("load_permission", e))?;
        row.as_ref().map(permission_from_row).transpose()
    }

    fn permissions(&mut self) -> Result<Vec<Permission>, StoreError> {
        let (rt, conn) = self.split();
        let rows = rt
            .block_on(sqlx::query("SELECT name, module, label FROM permissions ORDER BY name").fetch_all(conn))
            .map_err(|e| map_sqlx_error("list_permissions", e))?;
        rows.iter().map(permission_from_row).collect()
    }

    #[instrument(skip_all, fields(role = %role.name), err)]
    fn insert_role_if_absent(&mut self, role: &Role) -> Result<Upserted<Role>, StoreError> {
        let (rt, conn) = self.split();
        let result = rt
            .block_on(
                sqlx::query(
                    "INSERT INTO roles (id, name, tenant_id, editable) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
                )
                .bind(*role.id.as_uuid())
                .bind(role.name.as_str())
                .bind(role.tenant_id.map(|t| t.get()))
                .bind(role.editable)
                .execute(conn),
            )
            .map_err(|e| map_sqlx_error("insert_role", e))?;

        if result.rows_affected() == 1 {
            return Ok(Upserted {
                value: role.clone(),
                created: true,
            });
        }
        let existing = self
            .role_by_name(role.tenant_id, &role.name)?
            .ok_or_else(|| StoreError::NotFound(format!("role {}", role.name)))?;
        Ok(Upserted {
            value: existing,
            created: false,
        })
    }

    fn role(&mut self, id: RoleId) -> Result<Option<Role>, StoreError> {
        let (rt, conn) = self.split();
        let row = rt
            .block_on(
                sqlx::query("SELECT id, name, tenant_id, editable FROM roles WHERE id = $1")
                    .bind(*id.as_uuid())
                    .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("load_role", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    fn role_by_name(
        &mut self,
        tenant_id: Option<TenantId>,
        name: &RoleKind,
    ) -> Result<Option<Role>, StoreError> {
        let (rt, conn) = self.split();
        let row = rt
            .block_on(
                sqlx::query(
                    "SELECT id, name, tenant_id, editable FROM roles WHERE tenant_id IS NOT DISTINCT FROM $1 AND name = $2",
                )
                .bind(tenant_id.map(|t| t.get()))
                .bind(name.as_str())
                .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("load_role_by_name", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    fn tenant_roles(&mut self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError> {
        let (rt, conn) = self.split();
        let rows = rt
            .block_on(
                sqlx::query("SELECT id, name, tenant_id, editable FROM roles WHERE tenant_id = $1 ORDER BY name")
                    .bind(tenant_id.get())
                    .fetch_all(conn),
            )
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        rows.iter().map(role_from_row).collect()
    }

    fn link_permission(&mut self, role_id: RoleId, permission: &PermissionName) -> Result<bool, StoreError> {
        let (rt, conn) = self.split();
        let result = rt
            .block_on(
                sqlx::query(
                    "INSERT INTO role_has_permissions (role_id, permission) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(*role_id.as_uuid())
                .bind(permission.as_str())
                .execute(conn),
            )
            .map_err(|e| map_sqlx_error("link_permission", e))?;
        Ok(result.rows_affected() == 1)
    }

    fn role_permissions(&mut self, role_id: RoleId) -> Result<BTreeSet<PermissionName>, StoreError> {
        let (rt, conn) = self.split();
        let rows = rt
            .block_on(
                sqlx::query("SELECT permission FROM role_has_permissions WHERE role_id = $1")
                    .bind(*role_id.as_uuid())
                    .fetch_all(conn),
            )
            .map_err(|e| map_sqlx_error("list_role_permissions", e))?;
        names_from_rows(&rows)
    }

    #[instrument(skip_all, fields(role_id = %role_id, count = permissions.len()), err)]
    fn replace_role_permissions(
        &mut self,
        role_id: RoleId,
        permissions: &BTreeSet<PermissionName>,
    ) -> Result<(), StoreError> {
        let names: Vec<String> = permissions.iter().map(|p| p.as_str().to_string()).collect();
        let (rt, conn) = self.split();
        rt.block_on(async {
            sqlx::query("DELETE FROM role_has_permissions WHERE role_id = $1")
                .bind(*role_id.as_uuid())
                .execute(&mut *conn)
                .await?;
            sqlx::query(
                "INSERT INTO role_has_permissions (role_id, permission) SELECT $1, UNNEST($2::text[])",
            )
            .bind(*role_id.as_uuid())
            .bind(&names)
            .execute(&mut *conn)
            .await
        })
        .map_err(|e| map_sqlx_error("replace_role_permissions", e))?;
        Ok(())
    }

    fn add_override(&mut self, role_id: RoleId, permission: &PermissionName) -> Result<bool, StoreError> {
        let (rt, conn) = self.split();
        let result = rt
            .block_on(
                sqlx::query(
                    "INSERT INTO role_permission_overrides (role_id, permission) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(*role_id.as_uuid())
                .bind(permission.as_str())
                .execute(conn),
            )
            .map_err(|e| map_sqlx_error("add_override", e))?;
        Ok(result.rows_affected() == 1)
    }

    fn remove_override(&mut self, role_id: RoleId, permission: &PermissionName) -> Result<bool, StoreError> {
        let (rt, conn) = self.split();
        let result = rt
            .block_on(
                sqlx::query("DELETE FROM role_permission_overrides WHERE role_id = $1 AND permission = $2")
                    .bind(*role_id.as_uuid())
                    .bind(permission.as_str())
                    .execute(conn),
            )
            .map_err(|e| map_sqlx_error("remove_override", e))?;
        Ok(result.rows_affected() > 0)
    }

    fn overrides(&mut self, role_id: RoleId) -> Result<BTreeSet<PermissionName>, StoreError> {
        let (rt, conn) = self.split();
        let rows = rt
            .block_on(
                sqlx::query("SELECT permission FROM role_permission_overrides WHERE role_id = $1")
                    .bind(*role_id.as_uuid())
                    .fetch_all(conn),
            )
            .map_err(|e| map_sqlx_error("list_overrides", e))?;
        names_from_rows(&rows)
    }

    fn commit(self) -> Result<(), StoreError> {
        let Self { tx, handle } = self;
        handle
            .block_on(tx.commit())
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}
