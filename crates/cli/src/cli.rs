//! Command line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use bizdesk_core::{ModuleKey, PlanId, TenantId};
use bizdesk_modules::CollisionPolicy;
use bizdesk_observability::LogFormat;

#[derive(Parser)]
#[command(name = "bizdesk", author, version, about = "Module activation and permission propagation", long_about = None)]
pub struct Cli {
    /// Postgres connection string (overrides DATABASE_URL).
    ///
    /// Without one every invocation starts from a fresh in-memory store, so
    /// state does not carry over between commands.
    #[arg(long, value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Directory scanned for */module.json (overrides BIZDESK_PACKAGES_DIR)
    #[arg(long, value_name = "PATH", global = true)]
    pub packages_dir: Option<PathBuf>,

    /// What to do with duplicate permission names: warn | reject
    #[arg(long, value_name = "POLICY", global = true)]
    pub collision_policy: Option<CollisionPolicy>,

    /// Log output: json | pretty
    #[arg(long, value_name = "FORMAT", global = true, default_value = "json")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the packages directory and list the module manifests found
    Discover {
        /// Also add the discovered modules to the catalog
        #[arg(long)]
        sync: bool,
    },

    /// Catalog every compiled module, seed permissions and set up the superadmin role
    Bootstrap,

    /// Seed one package's permissions
    SeedPackage {
        #[arg(value_name = "MODULE")]
        module: ModuleKey,
    },

    /// Create the standard roles (company, staff, client, vendor) for a tenant
    CreateTenant {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,
    },

    /// Create a custom role for a tenant
    CreateRole {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,

        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Create a subscription plan
    CreatePlan {
        #[arg(value_name = "NAME")]
        name: String,

        /// Comma-separated module keys (example: --modules Hrm,Crm)
        #[arg(long, value_name = "MODULES", value_delimiter = ',')]
        modules: Vec<ModuleKey>,

        #[arg(long, value_name = "N")]
        max_users: Option<u32>,

        #[arg(long, value_name = "MB")]
        storage_limit_mb: Option<u64>,

        #[arg(long, value_name = "AMOUNT", default_value_t = 0)]
        monthly_price: u64,

        #[arg(long, value_name = "AMOUNT", default_value_t = 0)]
        yearly_price: u64,
    },

    /// Activate modules for a tenant
    Activate {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,

        #[arg(value_name = "MODULE", required = true)]
        modules: Vec<ModuleKey>,
    },

    /// Deactivate a module for a tenant
    Deactivate {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,

        #[arg(value_name = "MODULE")]
        module: ModuleKey,
    },

    /// Move a tenant onto a plan
    ApplyPlan {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,

        #[arg(value_name = "PLAN")]
        plan: PlanId,
    },

    /// Recompute every role's permissions for a tenant
    Recalculate {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,
    },

    /// Report roles whose stored permissions differ from the expected set
    Drift {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,
    },

    /// Fix drift for a tenant
    Repair {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,
    },

    /// List catalog modules, with their state when a tenant is given
    Modules {
        #[arg(value_name = "TENANT")]
        tenant: Option<TenantId>,
    },

    /// List a tenant's roles and their permissions
    Roles {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,
    },

    /// Grant a permission to a role as a manual override
    Grant {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,

        #[arg(value_name = "ROLE")]
        role: String,

        #[arg(value_name = "PERMISSION")]
        permission: String,
    },

    /// Remove a manual override
    Revoke {
        #[arg(value_name = "TENANT")]
        tenant: TenantId,

        #[arg(value_name = "ROLE")]
        role: String,

        #[arg(value_name = "PERMISSION")]
        permission: String,
    },

    /// Consume module events from the bus until interrupted
    Listen {
        /// Only apply events for this tenant
        #[arg(long, value_name = "TENANT")]
        tenant: Option<TenantId>,
    },
}
