use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value as JsonValue, json};
use tracing::{info, warn};

use bizdesk_auth::{PermissionName, Role, RoleKind};
use bizdesk_core::{ModuleKey, TenantId};
use bizdesk_events::{EventBus, EventEnvelope, InMemoryEventBus, ModuleEvent};
use bizdesk_infra::store::PostgresStore;
use bizdesk_infra::{
    ActivationService, CatalogSync, InMemoryStore, ManifestDiscovery, PlanService, PlatformConfig,
    ModuleEventWorker, PropagationEngine, RoleService, Seeder, Store, StoreTx,
};
use bizdesk_modules::{AddOn, PlanDraft, builtin};

mod cli;
use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    bizdesk_observability::init_with(cli.log_format, "info");

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = PlatformConfig::from_env().context("invalid environment configuration")?;
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }
    if let Some(dir) = cli.packages_dir {
        config.packages_dir = dir;
    }
    if let Some(policy) = cli.collision_policy {
        config.collision_policy = policy;
    }

    match config.database_url.clone() {
        Some(url) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            let store = PostgresStore::connect(&url, runtime.handle().clone())
                .context("failed to connect to postgres")?;
            store.ensure_schema().context("failed to create schema")?;
            with_bus(Arc::new(store), &config, cli.command, false)
        }
        None => {
            warn!("DATABASE_URL not set; using an in-memory store that lives for this command only");
            with_bus(Arc::new(InMemoryStore::new()), &config, cli.command, true)
        }
    }
}

fn with_bus<S: Store + 'static>(store: Arc<S>, config: &PlatformConfig, command: Commands, ephemeral: bool) -> Result<ExitCode> {
    #[cfg(feature = "redis")]
    if let Some(url) = &config.redis_url {
        let bus = bizdesk_infra::event_bus::RedisPubSubEventBus::new(url, config.event_channel.clone())
            .context("failed to open redis client")?;
        return execute(Services::new(store, bus, config)?, config, command, ephemeral);
    }

    let bus: Arc<InMemoryEventBus<EventEnvelope<ModuleEvent>>> = Arc::new(InMemoryEventBus::new());
    execute(Services::new(store, bus, config)?, config, command, ephemeral)
}

struct Services<S, B> {
    bus: B,
    engine: Arc<PropagationEngine<S>>,
    activation: ActivationService<S, B>,
    roles: RoleService<S, B>,
    plans: PlanService<S>,
    seeder: Seeder<S>,
}

impl<S, B> Services<S, B>
where
    S: Store,
    B: EventBus<EventEnvelope<ModuleEvent>> + Clone,
{
    fn new(store: Arc<S>, bus: B, config: &PlatformConfig) -> Result<Self> {
        let registry = builtin::registry(config.collision_policy).context("module registry rejected")?;
        let engine = Arc::new(PropagationEngine::new(store.clone(), Arc::new(registry)));
        Ok(Self {
            activation: ActivationService::new(engine.clone(), bus.clone()),
            roles: RoleService::new(engine.clone(), bus.clone()),
            bus,
            plans: PlanService::new(store),
            seeder: Seeder::new(engine.clone()),
            engine,
        })
    }

    fn bootstrap(&self, config: &PlatformConfig) -> Result<JsonValue> {
        let report = self.seeder.bootstrap().context("bootstrap failed")?;
        let manifests = if config.packages_dir.is_dir() {
            let found = ManifestDiscovery::new(&config.packages_dir).discover()?;
            CatalogSync::new(self.engine.store().clone())
                .sync_manifests(&found.manifests)?
                .added
        } else {
            Vec::new()
        };
        Ok(json!({
            "catalog_added": report.catalog_added,
            "manifest_modules_added": manifests,
            "seeded": report.seeded,
            "failed": failures(&report.failed),
            "superadmin_permissions": report.superadmin_permissions,
        }))
    }

    fn tenant_role(&self, tenant: TenantId, name: &str) -> Result<Role> {
        let mut tx = self.engine.store().begin()?;
        tx.role_by_name(Some(tenant), &RoleKind::from_name(name))?
            .with_context(|| format!("tenant {tenant} has no role '{name}'"))
    }
}

fn execute<S, B>(services: Services<S, B>, config: &PlatformConfig, command: Commands, ephemeral: bool) -> Result<ExitCode>
where
    S: Store + 'static,
    B: EventBus<EventEnvelope<ModuleEvent>> + Clone,
{
    if ephemeral && !matches!(command, Commands::Discover { .. } | Commands::Bootstrap) {
        services.bootstrap(config)?;
    }

    let mut clean = true;
    let output = match command {
        Commands::Discover { sync } => {
            let report = ManifestDiscovery::new(&config.packages_dir)
                .discover()
                .context("module discovery failed")?;
            let added = if sync {
                CatalogSync::new(services.engine.store().clone())
                    .sync_manifests(&report.manifests)?
                    .added
            } else {
                Vec::new()
            };
            json!({
                "modules": report.manifests,
                "skipped": report
                    .skipped
                    .iter()
                    .map(|s| json!({ "path": s.path, "reason": s.reason }))
                    .collect::<Vec<_>>(),
                "catalog_added": added,
            })
        }
        Commands::Bootstrap => services.bootstrap(config)?,
        Commands::SeedPackage { module } => {
            let created = services.seeder.seed_package(&module)?;
            json!({ "module": module, "permissions_created": created })
        }
        Commands::CreateTenant { tenant } => {
            let roles = services.roles.create_standard_roles(tenant)?;
            json!({ "tenant_id": tenant, "roles": roles_json(&roles) })
        }
        Commands::CreateRole { tenant, name } => {
            let role = services.roles.create_role(tenant, RoleKind::from_name(&name))?;
            json!({ "tenant_id": tenant, "roles": roles_json(&[role]) })
        }
        Commands::CreatePlan {
            name,
            modules,
            max_users,
            storage_limit_mb,
            monthly_price,
            yearly_price,
        } => {
            let draft = PlanDraft {
                max_users,
                storage_limit_mb,
                monthly_price,
                yearly_price,
                ..PlanDraft::new(name, modules)
            };
            serde_json::to_value(services.plans.create_plan(draft)?)?
        }
        Commands::Activate { tenant, modules } => {
            let outcome = services.activation.activate_many(tenant, &modules)?;
            clean = outcome.failed.is_empty();
            json!({
                "tenant_id": tenant,
                "activated": outcome.activated,
                "failed": failures(&outcome.failed),
            })
        }
        Commands::Deactivate { tenant, module } => {
            let removed = services.activation.deactivate(tenant, &module)?;
            json!({ "tenant_id": tenant, "module": module, "deactivated": removed })
        }
        Commands::ApplyPlan { tenant, plan } => {
            let applied = services.activation.apply_plan(tenant, plan)?;
            clean = applied.failed.is_empty();
            json!({
                "tenant_id": tenant,
                "plan_id": applied.plan_id,
                "activated": applied.activated,
                "deactivated": applied.deactivated,
                "failed": failures(&applied.failed),
            })
        }
        Commands::Recalculate { tenant } => {
            let changed = services.engine.recalculate(tenant)?;
            json!({ "tenant_id": tenant, "roles_updated": role_names(&changed) })
        }
        Commands::Drift { tenant } => {
            let drift = services.engine.drift(tenant)?;
            clean = drift.is_empty();
            json!({
                "tenant_id": tenant,
                "roles": drift
                    .iter()
                    .map(|d| json!({
                        "role_id": d.role_id,
                        "role": d.role.as_str(),
                        "missing": d.missing,
                        "extra": d.extra,
                    }))
                    .collect::<Vec<_>>(),
            })
        }
        Commands::Repair { tenant } => {
            let report = services.engine.repair(tenant)?;
            json!({
                "tenant_id": tenant,
                "permissions_created": report.permissions_created,
                "roles_updated": role_names(&report.roles_updated),
            })
        }
        Commands::Modules { tenant: Some(tenant) } => {
            let modules = services.activation.modules(tenant)?;
            json!({
                "tenant_id": tenant,
                "modules": modules
                    .iter()
                    .map(|(add_on, state)| {
                        let mut row = add_on_json(add_on);
                        row["state"] = json!(state);
                        row
                    })
                    .collect::<Vec<_>>(),
            })
        }
        Commands::Modules { tenant: None } => {
            let mut tx = services.engine.store().begin()?;
            json!({ "modules": tx.add_ons()?.iter().map(add_on_json).collect::<Vec<_>>() })
        }
        Commands::Roles { tenant } => {
            let mut tx = services.engine.store().begin()?;
            let mut roles = Vec::new();
            for role in tx.tenant_roles(tenant)? {
                roles.push(json!({
                    "role_id": role.id,
                    "role": role.name.as_str(),
                    "editable": role.editable,
                    "permissions": tx.role_permissions(role.id)?,
                    "overrides": tx.overrides(role.id)?,
                }));
            }
            json!({ "tenant_id": tenant, "roles": roles })
        }
        Commands::Grant { tenant, role, permission } => {
            let role = services.tenant_role(tenant, &role)?;
            let added = services.roles.grant_override(role.id, &PermissionName::new(permission.clone()))?;
            json!({ "role": role.name.as_str(), "permission": permission, "added": added })
        }
        Commands::Revoke { tenant, role, permission } => {
            let role = services.tenant_role(tenant, &role)?;
            let removed = services.roles.revoke_override(role.id, &PermissionName::new(permission.clone()))?;
            json!({ "role": role.name.as_str(), "permission": permission, "removed": removed })
        }
        Commands::Listen { tenant } => {
            if ephemeral {
                warn!("listening without a database; events are applied to a throwaway store");
            }
            let worker = ModuleEventWorker::spawn("module-events", services.bus.clone(), services.engine.clone(), tenant)
                .context("failed to start module event worker")?;
            info!(tenant = ?tenant, "listening for module events");

            let waited = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start signal runtime")?
                .block_on(tokio::signal::ctrl_c());
            worker.shutdown();
            waited.context("failed to wait for interrupt")?;
            json!({ "tenant_id": tenant, "stopped": true })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    if !clean {
        info!("command finished with failures");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn failures<E: std::fmt::Display>(failed: &[(ModuleKey, E)]) -> Vec<JsonValue> {
    failed
        .iter()
        .map(|(module, err)| json!({ "module": module, "error": err.to_string() }))
        .collect()
}

fn add_on_json(add_on: &AddOn) -> JsonValue {
    json!({
        "module": add_on.module,
        "name": add_on.name,
        "priority": add_on.priority,
        "for_admin": add_on.for_admin,
        "is_enable": add_on.is_enable,
        "monthly_price": add_on.monthly_price,
        "yearly_price": add_on.yearly_price,
    })
}

fn roles_json(roles: &[Role]) -> Vec<JsonValue> {
    roles
        .iter()
        .map(|r| json!({ "role_id": r.id, "role": r.name.as_str() }))
        .collect()
}

fn role_names(roles: &[RoleKind]) -> Vec<&str> {
    roles.iter().map(RoleKind::as_str).collect()
}
