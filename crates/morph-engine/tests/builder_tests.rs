use super::*;
use crate::describe::DescriptorStore;
use crate::registry::TypeRegistry;
use crate::strategy::UnmappableReason;
use crate::types::TypeDef;
use crate::test_fixtures::fixture_registry;
use morph_common::Interner;

struct Ctx {
    registry: TypeRegistry,
    interner: Interner,
    store: DescriptorStore,
    cache: PlanCache,
}

impl Ctx {
    fn new() -> Self {
        Self {
            registry: fixture_registry(),
            interner: Interner::new(),
            store: DescriptorStore::new(),
            cache: PlanCache::new(),
        }
    }

    fn plan(&self, source: &str, dest: &str) -> Result<Arc<MappingPlan>> {
        self.plan_refs(&TypeRef::named(source), &TypeRef::named(dest))
    }

    fn plan_refs(&self, source: &TypeRef, dest: &TypeRef) -> Result<Arc<MappingPlan>> {
        let extractor = Extractor::new(&self.registry, &self.interner, &self.store);
        PlanBuilder::new(extractor, &self.cache, RecursionProfile::PlanBuild).get_or_build(source, dest)
    }

    fn key(&self, source: &str, dest: &str) -> PlanKey {
        let extractor = Extractor::new(&self.registry, &self.interner, &self.store);
        PlanKey::new(
            extractor.key_of(&TypeRef::named(source)),
            extractor.key_of(&TypeRef::named(dest)),
        )
    }
}

fn codes(plan: &MappingPlan) -> Vec<u32> {
    plan.diagnostics.iter().map(|d| d.code).collect()
}

#[test]
fn flat_plan_lists_members_in_destination_order() {
    let ctx = Ctx::new();
    let plan = ctx.plan("Account", "AccountDto").unwrap();

    assert!(plan.is_ready());
    assert!(plan.diagnostics.is_empty());
    let names: Vec<_> = plan.members.iter().map(|m| m.dest_member.as_str()).collect();
    assert_eq!(names, ["AccountId", "Amount", "Notes"]);
    assert_eq!(
        plan.member("AccountId").unwrap().source_member.as_deref(),
        Some("AccountId")
    );
}

#[test]
fn nested_pairs_are_built_and_cached() {
    let ctx = Ctx::new();
    let plan = ctx.plan("Customer", "CustomerDto").unwrap();

    assert_eq!(plan.status, PlanStatus::Ready);
    for (source, dest) in [
        ("Address", "AddressDto"),
        ("Order", "OrderDto"),
        ("OrderLine", "OrderLineDto"),
    ] {
        assert_eq!(
            ctx.cache.status(ctx.key(source, dest)),
            Some(PlanStatus::Ready),
            "{source} -> {dest}"
        );
    }
    let stats = ctx.cache.stats();
    assert_eq!(stats.builds, 4);
    assert_eq!(stats.plans, 4);
}

#[test]
fn unmatched_members_are_messages_not_problems() {
    let ctx = Ctx::new();
    let plan = ctx.plan("Customer", "CustomerDto").unwrap();

    assert_eq!(codes(&plan), [diagnostic_codes::UNMATCHED_DESTINATION_MEMBER]);
    assert!(!plan.diagnostics[0].is_problem());
    assert_eq!(plan.diagnostics[0].member, "LoyaltyTier");
    assert!(plan.is_ready());
}

#[test]
fn incompatible_scalars_produce_diagnostics() {
    let ctx = Ctx::new();
    let plan = ctx.plan("Mismatch", "MismatchDto").unwrap();

    assert!(plan.is_ready());
    assert_eq!(
        codes(&plan),
        [
            diagnostic_codes::INCOMPATIBLE_SCALAR_TYPES,
            diagnostic_codes::INCOMPATIBLE_SCALAR_TYPES
        ]
    );
    assert!(plan.diagnostics.iter().all(PlanDiagnostic::is_problem));
    assert!(plan.member("Amount").unwrap().strategy.is_unmappable());
    assert!(!plan.member("Name").unwrap().strategy.is_unmappable());
}

#[test]
fn abstract_member_without_source_is_unresolvable() {
    let ctx = Ctx::new();
    let plan = ctx.plan("Kennel", "KennelDto").unwrap();

    assert_eq!(plan.status, PlanStatus::Unresolvable);
    assert!(codes(&plan).contains(&diagnostic_codes::NO_SAFE_DEFAULT));
    assert_eq!(ctx.cache.status(plan.key), Some(PlanStatus::Unresolvable));
}

#[test]
fn optional_self_reference_is_lazy() {
    let ctx = Ctx::new();
    let plan = ctx.plan("Node", "NodeDto").unwrap();

    assert!(plan.is_ready());
    let Strategy::NestedObject(next) = &plan.member("Next").unwrap().strategy else {
        panic!("Next is a nested object");
    };
    assert_eq!(next.key, plan.key);
    assert!(ctx.cache.stats().lazy_refs >= 1);
    assert_eq!(ctx.cache.stats().builds, 1);
}

#[test]
fn self_reference_through_a_list_is_lazy() {
    let ctx = Ctx::new();
    let plan = ctx.plan("Tree", "TreeDto").unwrap();

    assert!(plan.is_ready());
    let Strategy::SequenceElement { element, .. } = &plan.member("Children").unwrap().strategy
    else {
        panic!("Children is a sequence");
    };
    let Strategy::NestedObject(child) = element.as_ref() else {
        panic!("Children elements are nested objects");
    };
    assert_eq!(child.key, plan.key);
}

#[test]
fn mutual_recursion_resolves_both_plans() {
    let ctx = Ctx::new();
    let employee = ctx.plan("Employee", "EmployeeDto").unwrap();
    assert!(employee.is_ready());

    let department_key = ctx.key("Department", "DepartmentDto");
    assert_eq!(ctx.cache.status(department_key), Some(PlanStatus::Ready));

    let department = ctx.plan("Department", "DepartmentDto").unwrap();
    let Strategy::NestedObject(manager) = &department.member("Manager").unwrap().strategy else {
        panic!("Manager is a nested object");
    };
    assert_eq!(manager.key, employee.key);
    assert_eq!(ctx.cache.stats().builds, 2);
}

#[test]
fn required_cycle_is_unresolvable() {
    let ctx = Ctx::new();
    let err = ctx.plan("Chain", "ChainDto").unwrap_err();

    let MapError::UnresolvableCycle { path } = &err else {
        panic!("expected a cycle error, got {err}");
    };
    assert_eq!(path, &["ChainDto.Next".to_string(), "ChainDto".to_string()]);
    assert!(err.to_string().contains("ChainDto.Next -> ChainDto"));

    // The failure is cached; a second request does not rebuild.
    let again = ctx.plan("Chain", "ChainDto").unwrap_err();
    assert_eq!(again, err);
    assert_eq!(ctx.cache.stats().builds, 1);
}

#[test]
fn ambiguous_source_members_fail_the_plan() {
    let ctx = Ctx::new();
    let err = ctx.plan("CaseClash", "CaseClashDto").unwrap_err();
    let MapError::AmbiguousMemberMatch { member, candidates, .. } = err else {
        panic!("expected an ambiguity error");
    };
    assert_eq!(member, "Name");
    assert_eq!(candidates.len(), 2);
}

#[test]
fn memberless_member_type_fails_the_plan() {
    let ctx = Ctx::new();
    let err = ctx.plan("Tagged", "TaggedDto").unwrap_err();
    assert!(matches!(err, MapError::UnsupportedTypeShape { .. }), "{err}");
}

/// `Holder.Ping` is required and `Ping <-> Pong` is a required cycle.
fn register_ping_pong(ctx: &Ctx) {
    let named = TypeRef::named;
    for def in [
        TypeDef::class("Ping").member("Pong", named("Pong")),
        TypeDef::class("Pong").member("Ping", named("Ping")),
        TypeDef::class("PingDto").member("Pong", named("PongDto")),
        TypeDef::class("PongDto").member("Ping", named("PingDto")),
        TypeDef::class("Holder")
            .member("Ping", named("Ping"))
            .member("Label", TypeRef::String),
        TypeDef::class("HolderDto")
            .member("Ping", named("PingDto"))
            .member("Label", TypeRef::String),
    ] {
        ctx.registry.register(def).unwrap();
    }
}

fn ping_pong_path() -> Vec<String> {
    ["PingDto.Pong", "PongDto.Ping", "PingDto"].map(String::from).to_vec()
}

fn cycle_path(err: &MapError) -> &[String] {
    match err.root_cause() {
        MapError::UnresolvableCycle { path } => path,
        other => panic!("expected a cycle error, got {other}"),
    }
}

#[test]
fn nested_failure_degrades_only_that_member() {
    let ctx = Ctx::new();
    register_ping_pong(&ctx);

    let plan = ctx.plan("Holder", "HolderDto").unwrap();
    assert!(matches!(
        plan.member("Label").unwrap().strategy,
        Strategy::DirectAssign(_)
    ));
    let Strategy::Unmappable(reason) = &plan.member("Ping").unwrap().strategy else {
        panic!("Ping should be unmappable");
    };
    assert!(matches!(reason, UnmappableReason::NestedPlanFailed { .. }), "{reason}");
    assert!(reason.cause().unwrap().contains("PingDto.Pong -> PongDto.Ping -> PingDto"));

    // PingDto is concrete, so the member still has a default.
    assert_eq!(codes(&plan), [diagnostic_codes::NESTED_PLAN_FAILED]);
    assert_eq!(plan.status, PlanStatus::Ready);
    assert_eq!(plan.diagnostics[0].member, "Ping");

    let nested = ctx.cache.lookup(ctx.key("Ping", "PingDto")).unwrap().unwrap_err();
    assert_eq!(cycle_path(&nested), ping_pong_path());
}

#[test]
fn nested_failure_inside_a_list_keeps_its_cause() {
    let ctx = Ctx::new();
    register_ping_pong(&ctx);
    ctx.registry
        .register(TypeDef::class("Rack").member("Pings", TypeRef::list(TypeRef::named("Ping"))))
        .unwrap();
    ctx.registry
        .register(TypeDef::class("RackDto").member("Pings", TypeRef::list(TypeRef::named("PingDto"))))
        .unwrap();

    let plan = ctx.plan("Rack", "RackDto").unwrap();
    assert!(matches!(
        plan.member("Pings").unwrap().strategy,
        Strategy::Unmappable(UnmappableReason::NestedPlanFailed { .. })
    ));
    assert_eq!(codes(&plan), [diagnostic_codes::NESTED_PLAN_FAILED]);
    assert!(plan.is_ready());
}

#[test]
fn required_cycle_ignores_builds_in_flight() {
    let solo = {
        let ctx = Ctx::new();
        register_ping_pong(&ctx);
        ctx.plan("Ping", "PingDto").unwrap_err()
    };

    // Another builder owns Pong -> PongDto while Ping -> PingDto is planned.
    let ctx = Ctx::new();
    register_ping_pong(&ctx);
    let names = || ("Pong".to_string(), "PongDto".to_string());
    let Claim::Build(ticket) = ctx.cache.claim(ctx.key("Pong", "PongDto"), names) else {
        panic!("expected to own the build");
    };
    let held = ctx.plan("Ping", "PingDto").unwrap_err();
    drop(ticket);

    assert_eq!(held, solo);
    assert_eq!(cycle_path(&held), ping_pong_path());
}

#[test]
fn pair_built_elsewhere_is_checked_before_a_lazy_reference() {
    let ctx = Ctx::new();
    register_ping_pong(&ctx);
    let names = || ("Ping".to_string(), "PingDto".to_string());
    let Claim::Build(ticket) = ctx.cache.claim(ctx.key("Ping", "PingDto"), names) else {
        panic!("expected to own the build");
    };

    let plan = ctx.plan("Holder", "HolderDto").unwrap();
    drop(ticket);

    assert_eq!(codes(&plan), [diagnostic_codes::NESTED_PLAN_FAILED]);
    assert_eq!(ctx.cache.stats().lazy_refs, 0);

    // An optional edge in flight is still referenced lazily.
    let names = || ("Department".to_string(), "DepartmentDto".to_string());
    let Claim::Build(ticket) = ctx.cache.claim(ctx.key("Department", "DepartmentDto"), names) else {
        panic!("expected to own the build");
    };
    let employee = ctx.plan("Employee", "EmployeeDto").unwrap();
    drop(ticket);
    assert!(employee.is_ready());
    assert_eq!(ctx.cache.stats().lazy_refs, 1);
}

#[test]
fn cycle_broken_by_an_optional_member_is_not_required() {
    let ctx = Ctx::new();
    let named = TypeRef::named;
    for def in [
        TypeDef::class("Left").member("Right", named("Right")),
        TypeDef::class("Right").member("Left", named("Left")),
        TypeDef::class("LeftDto").member("Right", named("RightDto")),
        TypeDef::class("RightDto").member("Left", named("LeftDto").optional()),
    ] {
        ctx.registry.register(def).unwrap();
    }

    assert!(ctx.plan("Left", "LeftDto").unwrap().is_ready());
    assert_eq!(
        ctx.cache.status(ctx.key("Right", "RightDto")),
        Some(PlanStatus::Ready)
    );
}

#[test]
fn closed_generics_plan_per_argument() {
    let ctx = Ctx::new();
    let page_of = |name: &str, arg: TypeRef| TypeRef::generic(name, [arg]);

    let plan = ctx
        .plan_refs(
            &page_of("Page", TypeRef::named("OrderLine")),
            &page_of("PageDto", TypeRef::named("OrderLineDto")),
        )
        .unwrap();
    assert!(plan.is_ready());
    assert_eq!(&*plan.source_name, "Page<OrderLine>");
    assert!(matches!(
        plan.member("Total").unwrap().strategy,
        Strategy::DirectAssign(_)
    ));

    let ints = ctx
        .plan_refs(
            &page_of("Page", TypeRef::of::<i32>()),
            &page_of("PageDto", TypeRef::of::<i64>()),
        )
        .unwrap();
    assert_ne!(ints.key, plan.key);
}

#[test]
fn optional_top_level_types_share_the_plan() {
    let ctx = Ctx::new();
    let plain = ctx.plan("Account", "AccountDto").unwrap();
    let optional = ctx
        .plan_refs(
            &TypeRef::named("Account").optional(),
            &TypeRef::named("AccountDto"),
        )
        .unwrap();
    assert!(Arc::ptr_eq(&plain, &optional));
    assert_eq!(ctx.cache.stats().builds, 1);
    assert_eq!(ctx.cache.stats().hits, 1);
}

#[test]
fn unknown_types_are_reported() {
    let ctx = Ctx::new();
    let err = ctx.plan("Nope", "AccountDto").unwrap_err();
    assert_eq!(err, MapError::UnknownType { name: "Nope".to_string() });
}

#[test]
fn nesting_beyond_the_depth_limit_fails() {
    let ctx = Ctx::new();
    let extractor = Extractor::new(&ctx.registry, &ctx.interner, &ctx.store);
    let shallow = RecursionProfile::Custom {
        max_depth: 2,
        max_iterations: 100,
    };
    let err = PlanBuilder::new(extractor, &ctx.cache, shallow)
        .get_or_build(&TypeRef::named("Level1"), &TypeRef::named("Level1Dto"))
        .unwrap_err();
    assert!(matches!(err, MapError::DepthExceeded { limit: 2, .. }), "{err}");

    // The default profile handles the same graph.
    ctx.cache.clear();
    assert!(ctx.plan("Level1", "Level1Dto").unwrap().is_ready());
}
