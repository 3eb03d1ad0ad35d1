use super::*;
use std::collections::HashMap;

#[test]
fn canonical_names_are_stable() {
    assert_eq!(TypeRef::of::<i32>().to_string(), "i32");
    assert_eq!(TypeRef::of::<Option<i64>>().to_string(), "Option<i64>");
    assert_eq!(TypeRef::of::<Vec<String>>().to_string(), "List<string>");
    assert_eq!(TypeRef::of::<[u8; 4]>().to_string(), "Array<u8>");
    assert_eq!(
        TypeRef::of::<HashMap<String, Vec<Option<f64>>>>().to_string(),
        "Map<string,List<Option<f64>>>"
    );
    assert_eq!(
        TypeRef::multi_rank(TypeRef::of::<i32>(), 2).to_string(),
        "Array2<i32>"
    );
    assert_eq!(
        TypeRef::generic("Page", [TypeRef::named("Order"), TypeRef::String]).to_string(),
        "Page<Order,string>"
    );
    assert_eq!(TypeRef::param("T").to_string(), "'T");
}

#[test]
fn optional_never_double_wraps() {
    let once = TypeRef::of::<i32>().optional();
    let twice = once.clone().optional();
    assert_eq!(once, twice);
    assert!(twice.is_optional());
    assert_eq!(twice.non_optional(), &TypeRef::of::<i32>());
}

#[test]
fn def_name_sees_through_optional() {
    let customer = TypeRef::named("Customer").optional();
    assert_eq!(customer.def_name(), Some("Customer"));
    assert_eq!(TypeRef::String.def_name(), None);
    assert!(TypeRef::generic("Page", [TypeRef::String]).args().len() == 1);
}

#[test]
fn widening_table_is_lossless_only() {
    use PrimitiveKind::*;

    assert!(I32.widens_to(I64));
    assert!(I32.widens_to(F64));
    assert!(!I32.widens_to(F32));
    assert!(U8.widens_to(I16));
    assert!(!I8.widens_to(U16));
    assert!(!I64.widens_to(I32));
    assert!(F32.widens_to(F64));
    assert!(!F64.widens_to(F32));
    assert!(!F64.widens_to(Decimal));
    assert!(Date.widens_to(DateTime));
    assert!(Uuid.widens_to(Uuid));
    assert!(!Bool.widens_to(I8));
}

#[test]
fn substitute_closes_parameters() {
    let open = TypeRef::list(TypeRef::param("T").optional());
    let closed = open.substitute(&["T".to_string()], &[TypeRef::named("Order")]);
    assert_eq!(closed.to_string(), "List<Option<Order>>");
    assert!(open.has_params());
    assert!(!closed.has_params());

    let untouched = TypeRef::param("U").substitute(&["T".to_string()], &[TypeRef::String]);
    assert_eq!(untouched, TypeRef::param("U"));
}

#[test]
fn depth_counts_nesting() {
    assert_eq!(TypeRef::String.depth(), 1);
    assert_eq!(TypeRef::of::<Vec<Option<i32>>>().depth(), 3);
    assert_eq!(
        TypeRef::map(TypeRef::String, TypeRef::list(TypeRef::String)).depth(),
        3
    );
}

#[test]
fn type_def_builder_records_members_in_order() {
    let def = TypeDef::class("Account")
        .member("Id", TypeRef::of::<i64>())
        .read_only("Total", TypeRef::of::<Decimal>())
        .write_only("Secret", TypeRef::String);

    let names: Vec<_> = def.members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["Id", "Total", "Secret"]);
    assert!(def.members[1].readable && !def.members[1].writable);
    assert!(!def.members[2].readable && def.members[2].writable);
    assert!(def.is_concrete());
    assert!(!TypeDef::abstract_class("Animal").is_concrete());
    assert!(!TypeDef::interface("IMarker").is_concrete());
}

#[test]
fn supertypes_lists_base_then_interfaces() {
    let def = TypeDef::class("Dog")
        .extends(TypeRef::named("Animal"))
        .implements(TypeRef::named("IPet"));
    let supers: Vec<_> = def.supertypes().map(ToString::to_string).collect();
    assert_eq!(supers, ["Animal", "IPet"]);
}

#[test]
fn type_def_deserializes_with_defaults() {
    let json = r#"{
        "name": "Order",
        "members": [
            { "name": "Id", "ty": { "primitive": "i64" } },
            { "name": "Lines", "ty": { "sequence": { "element": { "named": { "name": "OrderLine" } }, "shape": "list" } } },
            { "name": "Note", "ty": { "optional": "string" }, "writable": false }
        ]
    }"#;
    let def: TypeDef = serde_json::from_str(json).unwrap();
    assert_eq!(def.kind, DefKind::Class);
    assert_eq!(def.members[1].ty.to_string(), "List<OrderLine>");
    assert_eq!(def.members[2].ty, TypeRef::String.optional());
    assert!(def.members[2].readable);
    assert!(!def.members[2].writable);
}
