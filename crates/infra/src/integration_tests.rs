//! Integration tests for the activation pipeline.
//!
//! Tests: activation → ledger → permission rows → role links → bus
//!
//! Verifies:
//! - Activation is idempotent and isolated per module
//! - Role permission sets always match the active modules' grant tables
//! - Shared permissions survive while any granting module is active
//! - Plans, manifests and late roles converge to the same state

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use proptest::prelude::*;

    use bizdesk_auth::{PermissionDef, PermissionName, Role, RoleKind, authorize};
    use bizdesk_core::{ModuleKey, TenantId};
    use bizdesk_events::{EventBus, EventEnvelope, InMemoryEventBus, ModuleEvent};
    use bizdesk_modules::{
        CollisionPolicy, ModuleDescriptor, ModulePlugin, ModuleRegistry, ModuleState, PlanDraft,
        PlanValidationError, PluginError, RoleGrants, StaticModule, builtin,
    };

    use crate::activation::{ActivationError, ActivationService};
    use crate::catalog_sync::CatalogSync;
    use crate::discovery::ManifestDiscovery;
    use crate::plans::{PlanError, PlanService};
    use crate::propagation::PropagationEngine;
    use crate::roles::{RoleError, RoleService};
    use crate::seeding::Seeder;
    use crate::store::{InMemoryStore, Store, StoreTx};
    use crate::workers::module_event_worker::ModuleEventWorker;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<ModuleEvent>>>;

    struct Harness {
        engine: Arc<PropagationEngine<InMemoryStore>>,
        activation: ActivationService<InMemoryStore, Bus>,
        roles: RoleService<InMemoryStore, Bus>,
        plans: PlanService<InMemoryStore>,
        bus: Bus,
    }

    fn harness_with(registry: ModuleRegistry) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let engine = Arc::new(PropagationEngine::new(store.clone(), Arc::new(registry)));
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        Seeder::new(engine.clone()).bootstrap().unwrap();
        Harness {
            activation: ActivationService::new(engine.clone(), bus.clone()),
            roles: RoleService::new(engine.clone(), bus.clone()),
            plans: PlanService::new(store),
            engine,
            bus,
        }
    }

    fn harness() -> Harness {
        harness_with(builtin::registry(CollisionPolicy::Reject).unwrap())
    }

    fn key(k: &'static str) -> ModuleKey {
        ModuleKey::from_static(k)
    }

    fn names(items: &[&'static str]) -> BTreeSet<PermissionName> {
        items.iter().map(|&p| PermissionName::from_static(p)).collect()
    }

    fn tenant_with_roles(h: &Harness, id: i64) -> TenantId {
        let tenant = TenantId::new(id);
        h.roles.create_standard_roles(tenant).unwrap();
        tenant
    }

    fn role(h: &Harness, tenant: TenantId, kind: RoleKind) -> Role {
        let mut tx = h.engine.store().begin().unwrap();
        tx.role_by_name(Some(tenant), &kind).unwrap().unwrap()
    }

    fn perms(h: &Harness, tenant: TenantId, kind: RoleKind) -> BTreeSet<PermissionName> {
        let role = role(h, tenant, kind);
        let mut tx = h.engine.store().begin().unwrap();
        tx.role_permissions(role.id).unwrap()
    }

    fn standard_perms(h: &Harness, tenant: TenantId) -> Vec<BTreeSet<PermissionName>> {
        RoleKind::TENANT_STANDARD
            .into_iter()
            .map(|kind| perms(h, tenant, kind))
            .collect()
    }

    fn ledger(h: &Harness, tenant: TenantId) -> Vec<ModuleKey> {
        let mut tx = h.engine.store().begin().unwrap();
        tx.activations(tenant).unwrap().into_iter().map(|r| r.module).collect()
    }

    struct BrokenModule(StaticModule);

    impl ModulePlugin for BrokenModule {
        fn descriptor(&self) -> &ModuleDescriptor {
            self.0.descriptor()
        }

        fn declared_permissions(&self) -> &[PermissionDef] {
            self.0.declared_permissions()
        }

        fn role_grants(&self) -> &RoleGrants {
            self.0.role_grants()
        }

        fn on_activate(&self, _tenant_id: TenantId) -> Result<(), PluginError> {
            Err(PluginError::new("Broken", "activation hook failed"))
        }
    }

    fn broken_module() -> BrokenModule {
        BrokenModule(StaticModule::new(
            ModuleDescriptor::new("Broken", "Broken", 45),
            vec![PermissionDef::new("manage-broken", "Manage broken")],
            RoleGrants::new().grant(RoleKind::Staff, &["manage-broken"]),
        ))
    }

    #[test]
    fn bootstrap_catalogs_builtins_and_sets_up_superadmin() {
        let h = harness();
        let mut tx = h.engine.store().begin().unwrap();

        let catalog: Vec<ModuleKey> = tx.add_ons().unwrap().into_iter().map(|a| a.module).collect();
        assert_eq!(catalog.len(), 7);
        assert_eq!(catalog[0], key("LandingPage"));

        let superadmin = tx.role_by_name(None, &RoleKind::SuperAdmin).unwrap().unwrap();
        assert!(!superadmin.editable);
        assert_eq!(
            tx.role_permissions(superadmin.id).unwrap(),
            names(&[
                "manage-companies",
                "manage-plans",
                "manage-add-ons",
                "manage-landing-page",
                "edit-landing-page",
            ])
        );
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let h = harness();
        let report = Seeder::new(h.engine.clone()).bootstrap().unwrap();
        assert!(report.catalog_added.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(report.superadmin_permissions, 5);
    }

    #[test]
    fn helpdesk_categories_gives_staff_exactly_its_grants() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 42);

        h.activation.activate(tenant, &key("HelpdeskCategories")).unwrap();

        assert_eq!(ledger(&h, tenant), vec![key("HelpdeskCategories")]);
        assert_eq!(
            perms(&h, tenant, RoleKind::Staff),
            names(&[
                "manage-helpdesk-categories",
                "create-helpdesk-categories",
                "edit-helpdesk-categories",
            ])
        );
        assert_eq!(
            h.activation.module_state(tenant, &key("HelpdeskCategories")).unwrap(),
            ModuleState::Activated
        );
    }

    #[test]
    fn activation_is_idempotent() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 7);
        let sub = h.bus.subscribe();

        let first = h.activation.activate(tenant, &key("Hrm")).unwrap();
        let staff_after_first = perms(&h, tenant, RoleKind::Staff);
        let second = h.activation.activate(tenant, &key("Hrm")).unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger(&h, tenant), vec![key("Hrm")]);
        assert_eq!(perms(&h, tenant, RoleKind::Staff), staff_after_first);

        // Only the first call emits.
        assert!(matches!(sub.try_recv().unwrap().payload(), ModuleEvent::DefaultData(_)));
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn hrm_grants_reach_every_standard_role() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 3);

        h.activation.activate(tenant, &key("Hrm")).unwrap();

        assert_eq!(
            perms(&h, tenant, RoleKind::Staff),
            names(&[
                "manage-hrm",
                "manage-attendance",
                "manage-leaves",
                "create-leaves",
                "manage-holidays",
            ])
        );
        assert_eq!(perms(&h, tenant, RoleKind::Client), names(&["manage-holidays"]));
        assert!(perms(&h, tenant, RoleKind::Vendor).is_empty());

        let company = perms(&h, tenant, RoleKind::Company);
        assert!(company.contains(&PermissionName::from_static("manage-payroll")));
        assert!(company.contains(&PermissionName::from_static("manage-users")));
        assert!(!company.contains(&PermissionName::from_static("create-leaves")));
    }

    #[test]
    fn shared_permission_survives_until_last_granting_module_goes() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 11);
        let contacts = PermissionName::from_static("manage-contacts");

        h.activation
            .activate_many(tenant, &[key("Crm"), key("Helpdesk")])
            .unwrap();
        assert!(perms(&h, tenant, RoleKind::Staff).contains(&contacts));

        assert!(h.activation.deactivate(tenant, &key("Crm")).unwrap());
        let staff = perms(&h, tenant, RoleKind::Staff);
        assert!(staff.contains(&contacts));
        assert!(!staff.contains(&PermissionName::from_static("manage-leads")));

        assert!(h.activation.deactivate(tenant, &key("Helpdesk")).unwrap());
        assert!(!perms(&h, tenant, RoleKind::Staff).contains(&contacts));
        assert!(!perms(&h, tenant, RoleKind::Company).contains(&contacts));
    }

    #[test]
    fn deactivating_an_inactive_module_is_a_no_op() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 5);
        let before = perms(&h, tenant, RoleKind::Company);
        let sub = h.bus.subscribe();

        assert!(!h.activation.deactivate(tenant, &key("Crm")).unwrap());
        assert_eq!(perms(&h, tenant, RoleKind::Company), before);
        assert!(sub.try_recv().is_err());
        assert_eq!(
            h.activation.module_state(tenant, &key("Crm")).unwrap(),
            ModuleState::Available
        );
    }

    #[test]
    fn deactivated_module_can_be_reactivated() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 6);

        h.activation.activate(tenant, &key("Taskly")).unwrap();
        h.activation.deactivate(tenant, &key("Taskly")).unwrap();
        assert_eq!(
            h.activation.module_state(tenant, &key("Taskly")).unwrap(),
            ModuleState::Deactivated
        );
        assert!(perms(&h, tenant, RoleKind::Client).is_empty());

        h.activation.activate(tenant, &key("Taskly")).unwrap();
        assert_eq!(
            perms(&h, tenant, RoleKind::Client),
            names(&["manage-projects", "manage-bugs"])
        );
    }

    #[test]
    fn admin_only_and_unknown_modules_are_refused() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 8);

        assert!(matches!(
            h.activation.activate(tenant, &key("LandingPage")),
            Err(ActivationError::AdminOnly(_))
        ));
        assert!(matches!(
            h.activation.activate(tenant, &key("Nope")),
            Err(ActivationError::UnknownModule(_))
        ));
        assert!(ledger(&h, tenant).is_empty());
    }

    #[test]
    fn failing_module_rolls_back_alone() {
        let registry = ModuleRegistry::builder()
            .collision_policy(CollisionPolicy::Reject)
            .register_all(builtin::all())
            .register(Arc::new(broken_module()))
            .build()
            .unwrap();
        let h = harness_with(registry);
        let tenant = tenant_with_roles(&h, 9);

        let outcome = h
            .activation
            .activate_many(tenant, &[key("Taskly"), key("Broken"), key("Crm"), key("Missing")])
            .unwrap();

        let activated: Vec<ModuleKey> = outcome.activated.iter().map(|r| r.module.clone()).collect();
        assert_eq!(activated, vec![key("Crm"), key("Taskly")]);
        let failed: Vec<&ModuleKey> = outcome.failed.iter().map(|(m, _)| m).collect();
        assert_eq!(failed, vec![&key("Broken"), &key("Missing")]);
        assert!(matches!(outcome.failed[0].1, ActivationError::Propagation(_)));

        assert_eq!(ledger(&h, tenant), vec![key("Crm"), key("Taskly")]);
        assert!(!perms(&h, tenant, RoleKind::Staff).contains(&PermissionName::from_static("manage-broken")));
        assert_eq!(
            h.activation.module_state(tenant, &key("Broken")).unwrap(),
            ModuleState::Available
        );
    }

    #[test]
    fn tenants_are_isolated() {
        let h = harness();
        let a = tenant_with_roles(&h, 100);
        let b = tenant_with_roles(&h, 200);

        h.activation.activate(a, &key("Pos")).unwrap();

        assert_eq!(perms(&h, a, RoleKind::Vendor), names(&["manage-purchases"]));
        assert!(perms(&h, b, RoleKind::Vendor).is_empty());
        assert!(ledger(&h, b).is_empty());
    }

    #[test]
    fn plan_upgrade_only_adds_and_downgrade_removes() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 12);
        let basic = h
            .plans
            .create_plan(PlanDraft::new("Basic", vec![key("Hrm")]))
            .unwrap();
        let pro = h
            .plans
            .create_plan(PlanDraft::new("Pro", vec![key("Hrm"), key("Crm")]))
            .unwrap();

        h.activation.apply_plan(tenant, basic.id).unwrap();
        let staff_basic = perms(&h, tenant, RoleKind::Staff);

        let upgrade = h.activation.apply_plan(tenant, pro.id).unwrap();
        assert_eq!(upgrade.activated, vec![key("Crm")]);
        assert!(upgrade.deactivated.is_empty());
        let staff_pro = perms(&h, tenant, RoleKind::Staff);
        assert!(staff_pro.is_superset(&staff_basic));
        assert!(staff_pro.contains(&PermissionName::from_static("manage-crm")));

        let downgrade = h.activation.apply_plan(tenant, basic.id).unwrap();
        assert_eq!(downgrade.deactivated, vec![key("Crm")]);
        assert_eq!(perms(&h, tenant, RoleKind::Staff), staff_basic);

        let mut tx = h.engine.store().begin().unwrap();
        assert_eq!(tx.tenant_plan(tenant).unwrap(), Some(basic.id));
    }

    #[test]
    fn invalid_plans_are_not_stored() {
        let h = harness();

        let err = h
            .plans
            .create_plan(PlanDraft::new("Pro", vec![key("Hrm"), key("Payroll")]))
            .unwrap_err();
        assert!(matches!(
            err,
            PlanError::Validation(PlanValidationError::UnknownModule(ref m)) if *m == key("Payroll")
        ));

        let mut draft = PlanDraft::new("Huge", vec![key("Hrm")]);
        draft.storage_limit_mb = Some(u64::MAX);
        assert!(matches!(
            h.plans.create_plan(draft),
            Err(PlanError::Validation(PlanValidationError::OutOfRange { .. }))
        ));

        let err = h
            .plans
            .create_plan(PlanDraft::new("Admin", vec![key("LandingPage")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "plan lists admin-only module 'LandingPage'");
    }

    #[test]
    fn manifests_extend_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let write = |pkg: &str, body: &str| {
            let pkg_dir = dir.path().join(pkg);
            fs::create_dir_all(&pkg_dir).unwrap();
            fs::write(pkg_dir.join("module.json"), body).unwrap();
        };
        for (i, name) in ["Hrm", "Crm", "Helpdesk", "Pos", "Taskly", "Sales", "Lms", "Fleet", "Zoom"]
            .iter()
            .enumerate()
        {
            write(
                &name.to_lowercase(),
                &format!(r#"{{"name":"{name}","alias":"{name}","priority":{i},"monthly_price":5}}"#),
            );
        }
        write("broken", "{ not json");

        let report = ManifestDiscovery::new(dir.path()).discover().unwrap();
        assert_eq!(report.manifests.len(), 9);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.starts_with(dir.path().join("broken")));

        let store = Arc::new(InMemoryStore::new());
        let sync = CatalogSync::new(store.clone()).sync_manifests(&report.manifests).unwrap();
        assert_eq!(sync.added.len(), 9);
        let again = CatalogSync::new(store.clone()).sync_manifests(&report.manifests).unwrap();
        assert!(again.added.is_empty());
        assert_eq!(again.existing, 9);

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.add_ons().unwrap().len(), 9);
    }

    #[test]
    fn manifest_only_module_activates_without_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("zoom");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("module.json"), r#"{"name":"Zoom"}"#).unwrap();

        let h = harness();
        let found = ManifestDiscovery::new(dir.path()).discover().unwrap();
        CatalogSync::new(h.engine.store().clone())
            .sync_manifests(&found.manifests)
            .unwrap();
        let tenant = tenant_with_roles(&h, 13);
        let before = perms(&h, tenant, RoleKind::Company);

        h.activation.activate(tenant, &key("Zoom")).unwrap();
        assert_eq!(ledger(&h, tenant), vec![key("Zoom")]);
        assert_eq!(perms(&h, tenant, RoleKind::Company), before);
    }

    #[test]
    fn overrides_survive_deactivation_and_recalculation() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 14);
        let payroll = PermissionName::from_static("manage-payroll");
        let staff = role(&h, tenant, RoleKind::Staff);

        h.activation.activate(tenant, &key("Hrm")).unwrap();
        assert!(h.roles.grant_override(staff.id, &payroll).unwrap());
        h.activation.deactivate(tenant, &key("Hrm")).unwrap();
        h.engine.recalculate(tenant).unwrap();

        assert_eq!(perms(&h, tenant, RoleKind::Staff), names(&["manage-payroll"]));

        assert!(h.roles.revoke_override(staff.id, &payroll).unwrap());
        assert!(perms(&h, tenant, RoleKind::Staff).is_empty());
    }

    #[test]
    fn unknown_override_is_rejected() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 15);
        let staff = role(&h, tenant, RoleKind::Staff);

        let err = h
            .roles
            .grant_override(staff.id, &PermissionName::from_static("launch-rockets"))
            .unwrap_err();
        assert!(matches!(err, RoleError::UnknownPermission(_)));
    }

    #[test]
    fn superadmin_role_is_not_editable() {
        let h = harness();
        let superadmin = {
            let mut tx = h.engine.store().begin().unwrap();
            tx.role_by_name(None, &RoleKind::SuperAdmin).unwrap().unwrap()
        };

        let err = h
            .roles
            .grant_override(superadmin.id, &PermissionName::from_static("manage-hrm"))
            .unwrap_err();
        assert!(matches!(err, RoleError::NotEditable(RoleKind::SuperAdmin)));
    }

    #[test]
    fn role_created_after_activation_catches_up() {
        let h = harness();
        let tenant = TenantId::new(16);
        h.roles.create_role(tenant, RoleKind::Company).unwrap();
        h.activation.activate(tenant, &key("Crm")).unwrap();

        let staff = h.roles.create_role(tenant, RoleKind::Staff).unwrap();

        assert_eq!(
            perms(&h, tenant, RoleKind::Staff),
            names(&["manage-crm", "manage-leads", "create-leads", "edit-leads", "manage-contacts"])
        );
        let session = h.roles.session(staff.id, Some(tenant)).unwrap();
        assert!(authorize(&session, &PermissionName::from_static("manage-leads")).is_ok());
        assert!(authorize(&session, &PermissionName::from_static("delete-leads")).is_err());
        assert!(h.engine.drift(tenant).unwrap().is_empty());
    }

    #[test]
    fn login_repairs_a_role_inserted_behind_the_engine() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 17);
        h.activation.activate(tenant, &key("Crm")).unwrap();
        h.roles.create_role(tenant, RoleKind::Custom("auditor".into())).unwrap();

        // Link an unrelated permission directly, bypassing propagation.
        let client = role(&h, tenant, RoleKind::Client);
        {
            let mut tx = h.engine.store().begin().unwrap();
            tx.link_permission(client.id, &PermissionName::from_static("manage-users"))
                .unwrap();
            tx.commit().unwrap();
        }

        let drift = h.engine.drift(tenant).unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].role, RoleKind::Client);
        assert_eq!(drift[0].extra, names(&["manage-users"]));

        let repaired = h.activation.on_login(tenant).unwrap().unwrap();
        assert_eq!(repaired.roles_updated, vec![RoleKind::Client]);
        assert_eq!(perms(&h, tenant, RoleKind::Client), names(&["manage-deals"]));
        assert!(h.activation.on_login(tenant).unwrap().is_none());
    }

    #[test]
    fn recalculation_is_idempotent() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 18);
        h.activation
            .activate_many(tenant, &[key("Hrm"), key("Helpdesk"), key("Pos")])
            .unwrap();

        assert!(h.engine.recalculate(tenant).unwrap().is_empty());
        let snapshot = perms(&h, tenant, RoleKind::Staff);
        assert!(h.engine.recalculate(tenant).unwrap().is_empty());
        assert_eq!(perms(&h, tenant, RoleKind::Staff), snapshot);
    }

    #[test]
    fn deactivation_publishes_after_commit() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 19);
        h.activation.activate(tenant, &key("Pos")).unwrap();
        let sub = h.bus.subscribe();

        h.activation.deactivate(tenant, &key("Pos")).unwrap();

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.tenant_id(), Some(tenant));
        match envelope.payload() {
            ModuleEvent::ModulesDeactivated(e) => assert_eq!(e.modules, vec![key("Pos")]),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(ledger(&h, tenant).is_empty());
    }

    #[test]
    fn concurrent_activation_of_one_module_lands_once() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 22);
        let sub = h.bus.subscribe();

        let records: Vec<_> = thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let activation = &h.activation;
                    s.spawn(move || activation.activate(tenant, &key("Hrm")).unwrap())
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(records.iter().all(|r| *r == records[0]));
        assert_eq!(ledger(&h, tenant), vec![key("Hrm")]);
        assert!(h.engine.drift(tenant).unwrap().is_empty());

        let mut default_data = 0;
        while let Ok(envelope) = sub.try_recv() {
            if matches!(envelope.payload(), ModuleEvent::DefaultData(_)) {
                default_data += 1;
            }
        }
        assert_eq!(default_data, 1);
    }

    #[test]
    fn ledger_insert_reports_an_existing_row() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 23);
        let mut tx = h.engine.store().begin().unwrap();

        let first = tx.insert_activation(tenant, &key("Hrm")).unwrap();
        let second = tx.insert_activation(tenant, &key("Hrm")).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.value, first.value);
        assert_eq!(tx.activations(tenant).unwrap().len(), 1);
    }

    #[test]
    fn replaying_default_data_changes_nothing() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 24);
        let sub = h.bus.subscribe();
        h.activation.activate_many(tenant, &[key("Hrm"), key("Crm")]).unwrap();
        let before = standard_perms(&h, tenant);

        let mut replayed = 0;
        while let Ok(envelope) = sub.try_recv() {
            if let ModuleEvent::DefaultData(_) = envelope.payload() {
                h.engine.handle(envelope.payload()).unwrap();
                h.engine.handle(envelope.payload()).unwrap();
                replayed += 1;
            }
        }

        assert_eq!(replayed, 1);
        assert_eq!(standard_perms(&h, tenant), before);
        assert_eq!(ledger(&h, tenant), vec![key("Crm"), key("Hrm")]);
        assert!(h.engine.drift(tenant).unwrap().is_empty());
    }

    #[test]
    fn default_data_for_inactive_module_links_nothing() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 25);
        h.activation.activate(tenant, &key("Hrm")).unwrap();
        h.activation.deactivate(tenant, &key("Hrm")).unwrap();
        let sub = h.bus.subscribe();
        h.activation.activate(tenant, &key("Pos")).unwrap();
        let before = standard_perms(&h, tenant);

        let envelope = sub.try_recv().unwrap();
        let ModuleEvent::DefaultData(data) = envelope.payload() else {
            panic!("unexpected event: {:?}", envelope.payload());
        };
        let mut stale = data.clone();
        stale.modules = vec![key("Hrm")];
        h.engine.handle(&ModuleEvent::DefaultData(stale)).unwrap();

        assert_eq!(standard_perms(&h, tenant), before);
        assert!(h.engine.drift(tenant).unwrap().is_empty());
    }

    #[test]
    fn replaying_deactivation_leaves_roles_alone() {
        let h = harness();
        let tenant = tenant_with_roles(&h, 26);
        h.activation.activate_many(tenant, &[key("Crm"), key("Helpdesk")]).unwrap();
        let sub = h.bus.subscribe();
        h.activation.deactivate(tenant, &key("Crm")).unwrap();
        let before = standard_perms(&h, tenant);

        let envelope = sub.try_recv().unwrap();
        assert!(matches!(envelope.payload(), ModuleEvent::ModulesDeactivated(_)));
        h.engine.handle(envelope.payload()).unwrap();
        h.engine.handle(envelope.payload()).unwrap();

        assert_eq!(standard_perms(&h, tenant), before);
        assert!(perms(&h, tenant, RoleKind::Staff).contains(&PermissionName::from_static("manage-contacts")));
        assert!(h.engine.drift(tenant).unwrap().is_empty());
    }

    #[test]
    fn worker_links_a_role_from_a_bus_signal() {
        let h = harness();
        let tenant = TenantId::new(27);
        h.roles.create_role(tenant, RoleKind::Company).unwrap();
        h.activation.activate(tenant, &key("Crm")).unwrap();

        // A role written straight to the store misses the catch-up signal.
        let staff = {
            let mut tx = h.engine.store().begin().unwrap();
            let role = Role::for_tenant(tenant, RoleKind::Staff).unwrap();
            let role = tx.insert_role_if_absent(&role).unwrap().value;
            tx.commit().unwrap();
            role
        };
        assert!(perms(&h, tenant, RoleKind::Staff).is_empty());

        let worker = ModuleEventWorker::spawn("module-events-test", h.bus.clone(), h.engine.clone(), Some(tenant))
            .unwrap();
        let signal = h.engine.role_signal(&staff).unwrap();
        assert!(matches!(signal, ModuleEvent::GivePermissionToRole(_)));
        h.bus.publish(EventEnvelope::wrap(signal.tenant_id(), signal)).unwrap();

        let expected = names(&["manage-crm", "manage-leads", "create-leads", "edit-leads", "manage-contacts"]);
        let deadline = Instant::now() + Duration::from_secs(2);
        while perms(&h, tenant, RoleKind::Staff) != expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        worker.shutdown();

        assert_eq!(perms(&h, tenant, RoleKind::Staff), expected);
        assert!(h.engine.drift(tenant).unwrap().is_empty());
    }

    const TENANT_MODULES: [&str; 6] = ["Hrm", "Crm", "Helpdesk", "HelpdeskCategories", "Pos", "Taskly"];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn role_sets_track_active_modules(ops in prop::collection::vec((0usize..6, any::<bool>()), 1..24)) {
            let h = harness();
            let tenant = tenant_with_roles(&h, 77);
            let mut active = BTreeSet::new();

            for (idx, on) in ops {
                let module = key(TENANT_MODULES[idx]);
                if on {
                    h.activation.activate(tenant, &module).unwrap();
                    active.insert(module);
                } else {
                    h.activation.deactivate(tenant, &module).unwrap();
                    active.remove(&module);
                }

                prop_assert!(h.engine.drift(tenant).unwrap().is_empty());
                let active_now: Vec<ModuleKey> = active.iter().cloned().collect();
                for kind in RoleKind::TENANT_STANDARD {
                    let expected = h.engine.registry().expected_for_role(&active_now, &kind);
                    prop_assert_eq!(perms(&h, tenant, kind), expected);
                }
            }

            let mut ledger_now = ledger(&h, tenant);
            ledger_now.sort();
            prop_assert_eq!(ledger_now, active.into_iter().collect::<Vec<_>>());
        }
    }
}
