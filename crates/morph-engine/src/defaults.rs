//! Default construction.
//!
//! The default of a type is what a freshly constructed destination holds
//! before any member is mapped, and what unmappable members keep:
//!
//! - optional types are null;
//! - scalars take their kind default (`0`, `false`, the epoch, `""`);
//! - containers are empty;
//! - concrete Complex types are built member by member; abstract types and
//!   interfaces have no default and are null.
//!
//! A required member whose type is already under construction (`Chain.Next`)
//! is null as well. Complete templates are cached per type key and cloned for
//! every new destination instance.

use crate::containers::ContainerTarget;
use crate::describe::{ComplexShape, DescriptorKind, Extractor, TypeDescriptor};
use crate::error::{MapError, Result};
use crate::recursion::{RecursionGuard, RecursionProfile, RecursionResult};
use crate::strategy::{ScalarKind, scalar_default};
use crate::types::{TypeKey, TypeRef};
use crate::value::{Object, Value};
use dashmap::DashMap;
use tracing::trace;

#[derive(Default)]
pub struct DefaultFactory {
    templates: DashMap<TypeKey, Object>,
}

impl DefaultFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default value of any closed type.
    pub fn value(&self, extractor: Extractor<'_>, ty: &TypeRef) -> Result<Value> {
        let desc = extractor.describe(ty)?;
        let desc = desc.resolved();
        if desc.nullable {
            return Ok(Value::Null);
        }
        match desc.complex() {
            Some(_) => Ok(self.template(extractor, desc)?.map_or(Value::Null, Value::Object)),
            None => default_value(extractor, &mut guard(), desc),
        }
    }

    /// A fresh default instance of a Complex type, or `None` when the type is
    /// abstract or an interface.
    pub fn template(&self, extractor: Extractor<'_>, desc: &TypeDescriptor) -> Result<Option<Object>> {
        let Some(shape) = desc.complex() else {
            return Err(MapError::IncompatibleTypes {
                source_type: desc.name.to_string(),
                dest_type: desc.name.to_string(),
                reason: "only Complex types have instance templates".to_string(),
            });
        };
        if !shape.is_concrete() {
            return Ok(None);
        }
        if let Some(hit) = self.templates.get(&desc.key) {
            return Ok(Some(hit.clone()));
        }

        let mut guard = guard();
        let built = match guard.enter(desc.key) {
            RecursionResult::Entered => {
                let object = build_object(extractor, &mut guard, desc, shape);
                guard.leave(desc.key);
                object?
            }
            _ => return Err(depth_error(&guard)),
        };
        trace!(name = %desc.name, members = built.len(), "default template built");
        self.templates.insert(desc.key, built.clone());
        Ok(Some(built))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn clear(&self) {
        self.templates.clear();
    }
}

fn guard() -> RecursionGuard<TypeKey> {
    RecursionGuard::with_profile(RecursionProfile::DefaultConstruction)
}

fn depth_error(guard: &RecursionGuard<TypeKey>) -> MapError {
    MapError::DepthExceeded {
        what: "default construction",
        limit: guard.max_depth(),
    }
}

fn build_object(
    extractor: Extractor<'_>,
    guard: &mut RecursionGuard<TypeKey>,
    desc: &TypeDescriptor,
    shape: &ComplexShape,
) -> Result<Object> {
    let mut object = Object::of(desc.ty.clone());
    for member in &shape.members {
        let member_desc = extractor.describe_member(member)?;
        let value = default_value(extractor, guard, member_desc.resolved())?;
        object.set(member.name.clone(), value);
    }
    Ok(object)
}

fn default_value(
    extractor: Extractor<'_>,
    guard: &mut RecursionGuard<TypeKey>,
    desc: &TypeDescriptor,
) -> Result<Value> {
    if desc.nullable {
        return Ok(Value::Null);
    }
    match &desc.kind {
        DescriptorKind::Primitive(kind) | DescriptorKind::NullablePrimitive(kind) => {
            Ok(scalar_default(ScalarKind::Primitive(*kind)))
        }
        DescriptorKind::String => Ok(scalar_default(ScalarKind::String)),
        DescriptorKind::Sequence { .. } | DescriptorKind::Set { .. } | DescriptorKind::Mapping { .. } => {
            Ok(ContainerTarget::from_descriptor(desc).map_or(Value::Null, |target| target.empty()))
        }
        DescriptorKind::ClosedParameter { argument, .. } => default_value(extractor, guard, argument),
        DescriptorKind::Complex(shape) if !shape.is_concrete() => Ok(Value::Null),
        DescriptorKind::Complex(shape) => match guard.enter(desc.key) {
            RecursionResult::Entered => {
                let object = build_object(extractor, guard, desc, shape);
                guard.leave(desc.key);
                object.map(Value::Object)
            }
            RecursionResult::Cycle => {
                trace!(name = %desc.name, "default construction cycle: member left null");
                Ok(Value::Null)
            }
            RecursionResult::DepthExceeded | RecursionResult::IterationExceeded => Err(depth_error(guard)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::DescriptorStore;
    use crate::registry::TypeRegistry;
    use crate::test_fixtures::fixture_registry;
    use morph_common::Interner;

    struct Ctx {
        registry: TypeRegistry,
        interner: Interner,
        store: DescriptorStore,
        defaults: DefaultFactory,
    }

    impl Ctx {
        fn new() -> Self {
            Self {
                registry: fixture_registry(),
                interner: Interner::new(),
                store: DescriptorStore::new(),
                defaults: DefaultFactory::new(),
            }
        }

        fn value(&self, ty: TypeRef) -> Value {
            let extractor = Extractor::new(&self.registry, &self.interner, &self.store);
            self.defaults.value(extractor, &ty).unwrap()
        }
    }

    #[test]
    fn scalars_and_containers() {
        let ctx = Ctx::new();
        assert_eq!(ctx.value(TypeRef::of::<i32>()), Value::I32(0));
        assert_eq!(ctx.value(TypeRef::of::<Option<i32>>()), Value::Null);
        assert_eq!(ctx.value(TypeRef::String), Value::String(String::new()));
        assert_eq!(ctx.value(TypeRef::list(TypeRef::String)), Value::Seq(Vec::new()));
        assert_eq!(ctx.value(TypeRef::list(TypeRef::String).optional()), Value::Null);
    }

    #[test]
    fn complex_defaults_nest_required_members() {
        let ctx = Ctx::new();
        let Value::Object(customer) = ctx.value(TypeRef::named("CustomerDto")) else {
            panic!("expected an object");
        };
        assert_eq!(customer.type_name(), "CustomerDto");
        assert_eq!(customer.get("Id"), Some(&Value::I64(0)));
        assert_eq!(customer.get("LoyaltyTier"), Some(&Value::String(String::new())));
        assert_eq!(customer.get("Orders"), Some(&Value::Seq(Vec::new())));

        let Some(Value::Object(address)) = customer.get("Address") else {
            panic!("required nested member is constructed");
        };
        assert_eq!(address.get("City"), Some(&Value::String(String::new())));
    }

    #[test]
    fn abstract_types_and_cycles_are_null() {
        let ctx = Ctx::new();
        assert_eq!(ctx.value(TypeRef::named("AnimalDto")), Value::Null);

        let Value::Object(kennel) = ctx.value(TypeRef::named("KennelDto")) else {
            panic!("expected an object");
        };
        assert_eq!(kennel.get("Pet"), Some(&Value::Null));

        let Value::Object(chain) = ctx.value(TypeRef::named("ChainDto")) else {
            panic!("expected an object");
        };
        assert_eq!(chain.get("Next"), Some(&Value::Null));
    }

    #[test]
    fn templates_are_cached_per_type() {
        let ctx = Ctx::new();
        let first = ctx.value(TypeRef::named("AccountDto"));
        assert_eq!(ctx.defaults.len(), 1);
        let second = ctx.value(TypeRef::named("AccountDto"));
        assert_eq!(first, second);
        assert_eq!(ctx.defaults.len(), 1);

        ctx.defaults.clear();
        assert!(ctx.defaults.is_empty());
    }

    #[test]
    fn generic_members_close_over_arguments() {
        let ctx = Ctx::new();
        let Value::Object(wrapper) = ctx.value(TypeRef::generic("Wrapper", [TypeRef::of::<u8>()])) else {
            panic!("expected an object");
        };
        assert_eq!(wrapper.get("Value"), Some(&Value::U8(0)));
        assert_eq!(wrapper.type_ref(), &TypeRef::generic("Wrapper", [TypeRef::of::<u8>()]));
    }
}
