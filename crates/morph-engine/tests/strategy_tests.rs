use super::*;
use crate::containers::ContainerFamily;
use crate::describe::{DescriptorStore, Extractor};
use crate::error::MapError;
use crate::matcher::match_members;
use crate::registry::TypeRegistry;
use crate::test_fixtures::fixture_registry;
use crate::types::{SeqShape, TypeKey};
use morph_common::Interner;

/// Planner that records nested requests instead of building plans.
struct Recorder<'e> {
    extractor: Extractor<'e>,
    requests: Vec<(String, String)>,
}

impl NestedPlanner for Recorder<'_> {
    fn describe_member(&self, member: &MemberDescriptor) -> Result<Arc<TypeDescriptor>> {
        self.extractor.describe_member(member)
    }

    fn request_nested(&mut self, source: &TypeDescriptor, dest: &TypeDescriptor) -> Result<PlanKey> {
        self.requests
            .push((source.name.to_string(), dest.name.to_string()));
        Ok(PlanKey::new(
            self.extractor.key_of(source.ty.non_optional()),
            self.extractor.key_of(dest.ty.non_optional()),
        ))
    }
}

struct Ctx {
    registry: TypeRegistry,
    interner: Interner,
    store: DescriptorStore,
}

impl Ctx {
    fn new() -> Self {
        Self {
            registry: fixture_registry(),
            interner: Interner::new(),
            store: DescriptorStore::new(),
        }
    }

    fn recorder(&self) -> Recorder<'_> {
        Recorder {
            extractor: Extractor::new(&self.registry, &self.interner, &self.store),
            requests: Vec::new(),
        }
    }

    /// Strategy for every destination member of a Complex pair, by name.
    fn member_strategies(&self, source: &str, dest: &str) -> Vec<(String, Strategy)> {
        let mut recorder = self.recorder();
        self.strategies_with(&mut recorder, source, dest)
    }

    fn strategies_with(
        &self,
        recorder: &mut Recorder<'_>,
        source: &str,
        dest: &str,
    ) -> Vec<(String, Strategy)> {
        let source = recorder
            .extractor
            .describe(&TypeRef::named(source))
            .unwrap();
        let dest = recorder.extractor.describe(&TypeRef::named(dest)).unwrap();
        let matches = match_members(source.complex().unwrap(), dest.complex().unwrap()).unwrap();
        matches
            .iter()
            .map(|m| {
                let strategy = Selector::new(&mut *recorder).select_member(m).unwrap();
                (m.dest.name.clone(), strategy)
            })
            .collect()
    }

    fn select(&self, source: TypeRef, dest: TypeRef) -> Strategy {
        let mut recorder = self.recorder();
        let source = recorder.extractor.describe(&source).unwrap();
        let dest = recorder.extractor.describe(&dest).unwrap();
        Selector::new(&mut recorder)
            .select(&source, &dest)
            .unwrap()
    }
}

fn strategy_of<'a>(strategies: &'a [(String, Strategy)], member: &str) -> &'a Strategy {
    &strategies
        .iter()
        .find(|(name, _)| name == member)
        .unwrap_or_else(|| panic!("no member {member}"))
        .1
}

#[test]
fn identical_scalars_assign_directly() {
    let ctx = Ctx::new();
    let strategies = ctx.member_strategies("Scalars", "ScalarsDto");
    assert_eq!(strategies.len(), 23);
    for (name, strategy) in &strategies {
        assert!(
            matches!(strategy, Strategy::DirectAssign(ScalarCast::Identity(_))),
            "{name}: {strategy}"
        );
    }
}

#[test]
fn nullability_picks_the_wrapper_strategy() {
    let ctx = Ctx::new();
    let strategies = ctx.member_strategies("Measurements", "MeasurementsDto");

    assert_eq!(
        strategy_of(&strategies, "Count"),
        &Strategy::NullableWrap(ScalarCast::Widen {
            from: PrimitiveKind::I32,
            to: PrimitiveKind::I64,
        })
    );
    assert_eq!(
        strategy_of(&strategies, "Reading"),
        &Strategy::NullableUnwrap {
            cast: ScalarCast::Identity(ScalarKind::Primitive(PrimitiveKind::F64)),
            default: Value::F64(0.0),
        }
    );
    assert_eq!(
        strategy_of(&strategies, "Label"),
        &Strategy::NullableUnwrap {
            cast: ScalarCast::Identity(ScalarKind::String),
            default: Value::String(String::new()),
        }
    );

    let account = ctx.member_strategies("Account", "AccountDto");
    assert_eq!(
        strategy_of(&account, "Notes"),
        &Strategy::NullableToNullable(ScalarCast::Identity(ScalarKind::String))
    );
}

#[test]
fn narrowing_and_text_to_number_are_unmappable() {
    let ctx = Ctx::new();
    let strategies = ctx.member_strategies("Mismatch", "MismatchDto");

    let Strategy::Unmappable(reason) = strategy_of(&strategies, "Amount") else {
        panic!("string -> i32 must be unmappable");
    };
    assert_eq!(reason.code(), diagnostic_codes::INCOMPATIBLE_SCALAR_TYPES);
    assert_eq!(reason.types(), Some(("string", "i32")));

    assert!(strategy_of(&strategies, "Count").is_unmappable());
    assert!(matches!(
        strategy_of(&strategies, "Name"),
        Strategy::DirectAssign(_)
    ));
}

#[test]
fn unmatched_destination_member() {
    let ctx = Ctx::new();
    let strategies = ctx.member_strategies("Customer", "CustomerDto");
    assert_eq!(
        strategy_of(&strategies, "LoyaltyTier"),
        &Strategy::Unmappable(UnmappableReason::Unmatched)
    );
    assert_eq!(
        UnmappableReason::Unmatched.code(),
        diagnostic_codes::UNMATCHED_DESTINATION_MEMBER
    );
}

#[test]
fn container_family_follows_the_destination() {
    let ctx = Ctx::new();
    let strategies = ctx.member_strategies("Bag", "BagDto");

    let Strategy::SequenceElement { element, target } = strategy_of(&strategies, "Numbers") else {
        panic!("List -> Array is a sequence strategy");
    };
    assert_eq!(target.family, ContainerFamily::Sequence(SeqShape::Array));
    assert!(matches!(**element, Strategy::DirectAssign(_)));

    let Strategy::SequenceElement { element, .. } = strategy_of(&strategies, "Fixed") else {
        panic!("Array<i32> -> List<i64> is a sequence strategy");
    };
    assert!(matches!(
        **element,
        Strategy::DirectAssign(ScalarCast::Widen { .. })
    ));

    let Strategy::SequenceElement { target, .. } = strategy_of(&strategies, "Tags") else {
        panic!("Set -> ReadOnly is a sequence strategy");
    };
    assert_eq!(target.family, ContainerFamily::Sequence(SeqShape::ReadOnly));

    assert!(matches!(
        strategy_of(&strategies, "Scores"),
        Strategy::MappingEntry { .. }
    ));

    let Strategy::SequenceElement { element, .. } = strategy_of(&strategies, "Jagged") else {
        panic!("jagged arrays map element-wise");
    };
    assert!(matches!(**element, Strategy::SequenceElement { .. }));

    let Strategy::SequenceElement { target, .. } = strategy_of(&strategies, "Maybe") else {
        panic!("optional list -> list");
    };
    assert!(!target.nullable);
    let Strategy::SequenceElement { target, .. } = strategy_of(&strategies, "Absent") else {
        panic!("optional list -> optional list");
    };
    assert!(target.nullable);
}

#[test]
fn list_to_set_is_a_set_strategy() {
    let ctx = Ctx::new();
    let strategies = ctx.member_strategies("IdList", "IdSet");
    assert!(matches!(
        strategy_of(&strategies, "Ids"),
        Strategy::SetElement { .. }
    ));
}

#[test]
fn mapping_keys_must_copy_directly() {
    let ctx = Ctx::new();
    let strategies = ctx.member_strategies("KeyedByText", "KeyedByNumber");
    let Strategy::Unmappable(reason) = strategy_of(&strategies, "Lookup") else {
        panic!("string keys cannot become i32 keys");
    };
    assert_eq!(reason.code(), diagnostic_codes::UNSUPPORTED_MAPPING_KEY);

    let widened_key = ctx.select(
        TypeRef::map(TypeRef::of::<i32>(), TypeRef::of::<i32>()),
        TypeRef::map(TypeRef::of::<i64>(), TypeRef::of::<i32>()),
    );
    assert!(matches!(
        widened_key,
        Strategy::Unmappable(UnmappableReason::UnsupportedMappingKey { .. })
    ));

    let same_key = ctx.select(
        TypeRef::map(TypeRef::of::<i32>(), TypeRef::of::<i32>()),
        TypeRef::map(TypeRef::of::<i32>(), TypeRef::of::<i64>()),
    );
    let Strategy::MappingEntry { key, value, .. } = same_key else {
        panic!("identical keys with widened values are mappable, got {same_key}");
    };
    assert!(matches!(*key, Strategy::DirectAssign(ScalarCast::Identity(_))));
    assert!(matches!(*value, Strategy::DirectAssign(ScalarCast::Widen { .. })));
}

#[test]
fn incompatible_elements_poison_the_container() {
    let ctx = Ctx::new();
    let strategy = ctx.select(
        TypeRef::list(TypeRef::String),
        TypeRef::list(TypeRef::of::<i32>()),
    );
    let Strategy::Unmappable(reason) = strategy else {
        panic!("List<string> -> List<i32> is unmappable");
    };
    assert!(matches!(reason, UnmappableReason::IncompatibleElements { .. }));
    assert_eq!(reason.code(), diagnostic_codes::INCOMPATIBLE_MEMBER_SHAPES);
}

#[test]
fn scalar_to_container_is_a_shape_mismatch() {
    let ctx = Ctx::new();
    let strategy = ctx.select(TypeRef::of::<i32>(), TypeRef::list(TypeRef::of::<i32>()));
    assert!(matches!(
        strategy,
        Strategy::Unmappable(UnmappableReason::IncompatibleShapes { .. })
    ));
}

#[test]
fn nested_pairs_go_back_to_the_planner() {
    let ctx = Ctx::new();
    let mut recorder = ctx.recorder();
    let strategies = ctx.strategies_with(&mut recorder, "Customer", "CustomerDto");

    let Strategy::NestedObject(target) = strategy_of(&strategies, "Address") else {
        panic!("Address is a nested object");
    };
    assert!(!target.dest_nullable);
    assert!(!target.dest_abstract);
    assert_eq!(target.dest_ty, TypeRef::named("AddressDto"));

    // Direct members and container elements alike.
    assert!(recorder
        .requests
        .contains(&("Address".to_string(), "AddressDto".to_string())));
    assert!(recorder
        .requests
        .contains(&("Order".to_string(), "OrderDto".to_string())));
}

#[test]
fn abstract_destination_is_flagged_for_dispatch() {
    let ctx = Ctx::new();
    let strategies = ctx.member_strategies("Drawing", "DrawingModel");
    let Strategy::NestedObject(target) = strategy_of(&strategies, "Shape") else {
        panic!("Shape is a nested object");
    };
    assert!(target.dest_abstract);
    assert!(target.dest_nullable);
}

/// Planner whose every nested request fails with the given error.
struct Failing<'e>(Extractor<'e>, MapError);

impl NestedPlanner for Failing<'_> {
    fn describe_member(&self, member: &MemberDescriptor) -> Result<Arc<TypeDescriptor>> {
        self.0.describe_member(member)
    }

    fn request_nested(&mut self, _: &TypeDescriptor, _: &TypeDescriptor) -> Result<PlanKey> {
        Err(self.1.clone())
    }
}

fn select_next_with(ctx: &Ctx, error: MapError) -> Result<Strategy> {
    let extractor = Extractor::new(&ctx.registry, &ctx.interner, &ctx.store);
    let source = extractor.describe(&TypeRef::named("Chain")).unwrap();
    let dest = extractor.describe(&TypeRef::named("ChainDto")).unwrap();
    let next_src = source.complex().unwrap().member("Next").unwrap().clone();
    let next_dst = dest.complex().unwrap().member("Next").unwrap().clone();
    let matched = MemberMatch {
        source: Some(&next_src),
        dest: &next_dst,
    };
    let mut failing = Failing(extractor, error);
    Selector::new(&mut failing).select_member(&matched)
}

#[test]
fn nested_planner_failures_degrade_the_member() {
    let ctx = Ctx::new();
    let cycle = MapError::UnresolvableCycle {
        path: vec!["ChainDto.Next".to_string(), "ChainDto".to_string()],
    };
    let strategy = select_next_with(&ctx, cycle.clone().into_build_failure("Chain", "ChainDto")).unwrap();

    let Strategy::Unmappable(reason) = strategy else {
        panic!("a failed nested plan leaves the member unmappable");
    };
    assert_eq!(reason.code(), diagnostic_codes::NESTED_PLAN_FAILED);
    assert_eq!(reason.types(), Some(("Chain", "ChainDto")));
    assert_eq!(reason.cause(), Some(cycle.to_string().as_str()));
}

#[test]
fn depth_limit_still_aborts_selection() {
    let ctx = Ctx::new();
    let depth = MapError::DepthExceeded {
        what: "nested plan construction",
        limit: 3,
    };
    let err = select_next_with(&ctx, depth.clone()).unwrap_err();
    assert_eq!(err, depth);
}

#[test]
fn scalar_cast_application() {
    let widen = ScalarCast::between(
        ScalarKind::Primitive(PrimitiveKind::I32),
        ScalarKind::Primitive(PrimitiveKind::F64),
    )
    .unwrap();
    assert_eq!(widen.apply(&Value::I32(7)), Some(Value::F64(7.0)));
    assert_eq!(widen.apply(&Value::I64(7)), None);
    assert_eq!(widen.to_string(), "i32 -> f64");

    let text = ScalarCast::Identity(ScalarKind::String);
    assert_eq!(text.apply(&Value::from("x")), Some(Value::from("x")));
    assert_eq!(text.apply(&Value::I32(1)), None);

    assert!(ScalarCast::between(ScalarKind::String, ScalarKind::Primitive(PrimitiveKind::I32)).is_none());
    assert_eq!(scalar_default(ScalarKind::String), Value::String(String::new()));
    assert_eq!(
        scalar_default(ScalarKind::Primitive(PrimitiveKind::Bool)),
        Value::Bool(false)
    );
}

#[test]
fn plan_key_ignores_optional_wrapper() {
    let ctx = Ctx::new();
    let recorder = ctx.recorder();
    let plain: TypeKey = recorder.extractor.key_of(&TypeRef::named("Node"));
    let optional = recorder
        .extractor
        .key_of(TypeRef::named("Node").optional().non_optional());
    assert_eq!(plain, optional);
}
