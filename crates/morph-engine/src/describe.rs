//! TypeDescriptor extraction.
//!
//! A [`TypeDescriptor`] is the immutable structural summary of a closed type.
//! Descriptors are built once per [`TypeKey`] and cached for the lifetime of
//! the engine (until `reset_cache`).
//!
//! Complex descriptors list their members with closed member types but do not
//! embed member descriptors. Member descriptors are fetched lazily through the
//! store, so self-referential types describe in finite time.
//!
//! ## Member collection
//!
//! Members are gathered from the root of the inheritance chain down to the
//! described type. A member redeclared by a more derived type replaces the
//! base declaration in place (first-declared position wins, most-derived
//! declaration wins). Generic parameters are closed at every level with the
//! arguments flowing down the chain.

use crate::error::{MapError, Result};
use crate::registry::TypeRegistry;
use crate::types::{DefKind, PrimitiveKind, SeqShape, TypeDef, TypeKey, TypeRef};
use bitflags::bitflags;
use dashmap::DashMap;
use morph_common::Interner;
use morph_common::limits::{DESCRIPTOR_CACHE_CAPACITY, MAX_INHERITANCE_DEPTH, MAX_TYPE_REF_DEPTH};
use std::sync::Arc;
use tracing::trace;

bitflags! {
    /// Accessor availability of a member.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u8 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
    }
}

/// Structural summary of one closed type.
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    pub key: TypeKey,
    /// Canonical type name (`Option<List<Order>>`).
    pub name: Arc<str>,
    pub ty: TypeRef,
    /// Whether the type admits an absent value.
    pub nullable: bool,
    pub kind: DescriptorKind,
}

#[derive(Clone, Debug)]
pub enum DescriptorKind {
    Primitive(PrimitiveKind),
    NullablePrimitive(PrimitiveKind),
    String,
    Complex(Arc<ComplexShape>),
    Sequence {
        element: Arc<TypeDescriptor>,
        shape: SeqShape,
    },
    Set {
        element: Arc<TypeDescriptor>,
    },
    Mapping {
        key: Arc<TypeDescriptor>,
        value: Arc<TypeDescriptor>,
    },
    /// A member declared as a generic parameter, closed with a concrete argument.
    ClosedParameter {
        param: String,
        argument: Arc<TypeDescriptor>,
    },
}

impl DescriptorKind {
    pub fn label(&self) -> &'static str {
        match self {
            DescriptorKind::Primitive(_) => "primitive",
            DescriptorKind::NullablePrimitive(_) => "nullable primitive",
            DescriptorKind::String => "string",
            DescriptorKind::Complex(_) => "complex",
            DescriptorKind::Sequence { .. } => "sequence",
            DescriptorKind::Set { .. } => "set",
            DescriptorKind::Mapping { .. } => "mapping",
            DescriptorKind::ClosedParameter { .. } => "closed generic parameter",
        }
    }
}

impl TypeDescriptor {
    /// The descriptor with any closed-parameter wrapper removed.
    pub fn resolved(&self) -> &TypeDescriptor {
        match &self.kind {
            DescriptorKind::ClosedParameter { argument, .. } => argument.resolved(),
            _ => self,
        }
    }

    /// The scalar kind of a (nullable) primitive.
    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self.resolved().kind {
            DescriptorKind::Primitive(kind) | DescriptorKind::NullablePrimitive(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn complex(&self) -> Option<&Arc<ComplexShape>> {
        match &self.resolved().kind {
            DescriptorKind::Complex(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self.resolved().kind,
            DescriptorKind::Primitive(_) | DescriptorKind::NullablePrimitive(_) | DescriptorKind::String
        )
    }
}

/// Members of a Complex type.
#[derive(Clone, Debug)]
pub struct ComplexShape {
    pub def_name: String,
    pub def_kind: DefKind,
    pub members: Vec<MemberDescriptor>,
}

impl ComplexShape {
    pub fn is_concrete(&self) -> bool {
        self.def_kind.is_concrete()
    }

    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct MemberDescriptor {
    pub name: String,
    /// Lowercased name used for case-insensitive matching.
    pub folded: String,
    /// Closed member type.
    pub ty: TypeRef,
    pub key: TypeKey,
    pub access: MemberFlags,
    /// Inheritance distance of the declaring type (0 = the described type).
    pub depth: u32,
    /// Parameter name when the member was declared as a bare generic parameter.
    pub generic_param: Option<String>,
}

impl MemberDescriptor {
    pub fn is_readable(&self) -> bool {
        self.access.contains(MemberFlags::READABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.access.contains(MemberFlags::WRITABLE)
    }
}

// =============================================================================
// DescriptorStore
// =============================================================================

/// Process-lifetime descriptor cache keyed by [`TypeKey`].
pub struct DescriptorStore {
    descriptors: DashMap<TypeKey, Arc<TypeDescriptor>>,
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self {
            descriptors: DashMap::with_capacity(DESCRIPTOR_CACHE_CAPACITY),
        }
    }

    pub fn get(&self, key: TypeKey) -> Option<Arc<TypeDescriptor>> {
        self.descriptors.get(&key).map(|d| Arc::clone(&d))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn clear(&self) {
        self.descriptors.clear();
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// Builds descriptors from registered definitions.
#[derive(Clone, Copy)]
pub struct Extractor<'e> {
    registry: &'e TypeRegistry,
    interner: &'e Interner,
    store: &'e DescriptorStore,
}

impl<'e> Extractor<'e> {
    pub fn new(registry: &'e TypeRegistry, interner: &'e Interner, store: &'e DescriptorStore) -> Self {
        Self {
            registry,
            interner,
            store,
        }
    }

    pub fn registry(&self) -> &'e TypeRegistry {
        self.registry
    }

    /// Stable key of a type: its interned canonical name.
    pub fn key_of(&self, ty: &TypeRef) -> TypeKey {
        TypeKey(self.interner.intern(&ty.to_string()))
    }

    pub fn name_of(&self, key: TypeKey) -> Arc<str> {
        self.interner.resolve(key.0)
    }

    /// Describe a closed type. Idempotent; cached by type key.
    pub fn describe(&self, ty: &TypeRef) -> Result<Arc<TypeDescriptor>> {
        let key = self.key_of(ty);
        if let Some(hit) = self.store.get(key) {
            trace!(key = key.0.0, "describe: cache hit");
            return Ok(hit);
        }

        let built = Arc::new(self.build(ty, key)?);
        // A racing thread may have inserted the same (equal) descriptor.
        let entry = self.store.descriptors.entry(key).or_insert(built);
        Ok(Arc::clone(&entry))
    }

    /// Descriptor of a member's type, wrapping members declared as a bare
    /// generic parameter in [`DescriptorKind::ClosedParameter`].
    pub fn describe_member(&self, member: &MemberDescriptor) -> Result<Arc<TypeDescriptor>> {
        let argument = self.describe(&member.ty)?;
        match &member.generic_param {
            None => Ok(argument),
            Some(param) => Ok(Arc::new(TypeDescriptor {
                key: argument.key,
                name: Arc::clone(&argument.name),
                ty: argument.ty.clone(),
                nullable: argument.nullable,
                kind: DescriptorKind::ClosedParameter {
                    param: param.clone(),
                    argument,
                },
            })),
        }
    }

    fn build(&self, ty: &TypeRef, key: TypeKey) -> Result<TypeDescriptor> {
        let name: Arc<str> = self.name_of(key);
        if ty.depth() > MAX_TYPE_REF_DEPTH {
            return Err(MapError::DepthExceeded {
                what: "type reference nesting",
                limit: MAX_TYPE_REF_DEPTH,
            });
        }
        if ty.has_params() {
            return Err(MapError::UnsupportedTypeShape {
                type_name: name.to_string(),
                reason: "open generic parameter".to_string(),
            });
        }

        let nullable = ty.is_optional();
        let kind = match ty.non_optional() {
            TypeRef::Primitive(kind) if nullable => DescriptorKind::NullablePrimitive(*kind),
            TypeRef::Primitive(kind) => DescriptorKind::Primitive(*kind),
            TypeRef::String => DescriptorKind::String,
            TypeRef::Sequence { element, shape } => {
                if let SeqShape::MultiRank(rank) = shape
                    && *rank < 2
                {
                    return Err(MapError::UnsupportedTypeShape {
                        type_name: name.to_string(),
                        reason: format!("multi-rank array of rank {rank}"),
                    });
                }
                DescriptorKind::Sequence {
                    element: self.describe(element)?,
                    shape: *shape,
                }
            }
            TypeRef::Set(element) => DescriptorKind::Set {
                element: self.describe(element)?,
            },
            TypeRef::Map { key, value } => DescriptorKind::Mapping {
                key: self.describe(key)?,
                value: self.describe(value)?,
            },
            TypeRef::Named { name: def_name, args } => {
                let def = self.registry.require(def_name)?;
                DescriptorKind::Complex(Arc::new(self.complex_shape(&def, args)?))
            }
            TypeRef::Optional(_) | TypeRef::Param(_) => {
                return Err(MapError::UnsupportedTypeShape {
                    type_name: name.to_string(),
                    reason: "open generic parameter".to_string(),
                });
            }
        };

        if let DescriptorKind::Complex(shape) = &kind
            && shape.members.is_empty()
        {
            return Err(MapError::UnsupportedTypeShape {
                type_name: name.to_string(),
                reason: "type exposes no members".to_string(),
            });
        }

        trace!(name = %name, kind = kind.label(), nullable, "describe: built");
        Ok(TypeDescriptor {
            key,
            name,
            ty: ty.clone(),
            nullable,
            kind,
        })
    }

    fn complex_shape(&self, def: &TypeDef, args: &[TypeRef]) -> Result<ComplexShape> {
        let mut members = Vec::new();
        self.collect_members(def, args, 0, &mut members)?;
        Ok(ComplexShape {
            def_name: def.name.clone(),
            def_kind: def.kind,
            members,
        })
    }

    fn collect_members(
        &self,
        def: &TypeDef,
        args: &[TypeRef],
        depth: u32,
        out: &mut Vec<MemberDescriptor>,
    ) -> Result<()> {
        if depth > MAX_INHERITANCE_DEPTH {
            return Err(MapError::DepthExceeded {
                what: "inheritance chain",
                limit: MAX_INHERITANCE_DEPTH,
            });
        }
        if def.type_params.len() != args.len() {
            return Err(MapError::GenericArity {
                name: def.name.clone(),
                expected: def.type_params.len(),
                found: args.len(),
            });
        }

        for supertype in def.supertypes() {
            let closed = supertype.substitute(&def.type_params, args);
            let Some(base_name) = closed.def_name() else {
                return Err(MapError::UnsupportedTypeShape {
                    type_name: def.name.clone(),
                    reason: format!("supertype `{closed}` is not a registered type"),
                });
            };
            let base = self.registry.require(base_name)?;
            self.collect_members(&base, closed.args(), depth + 1, out)?;
        }

        for member in &def.members {
            let ty = member.ty.substitute(&def.type_params, args);
            if ty.has_params() {
                return Err(MapError::UnsupportedTypeShape {
                    type_name: def.name.clone(),
                    reason: format!("member `{}` has an unbound generic parameter", member.name),
                });
            }
            let mut access = MemberFlags::empty();
            access.set(MemberFlags::READABLE, member.readable);
            access.set(MemberFlags::WRITABLE, member.writable);
            let generic_param = match member.ty.non_optional() {
                TypeRef::Param(param) => Some(param.clone()),
                _ => None,
            };
            let descriptor = MemberDescriptor {
                folded: member.name.to_lowercase(),
                name: member.name.clone(),
                key: self.key_of(&ty),
                ty,
                access,
                depth,
                generic_param,
            };

            match out.iter_mut().find(|m| m.name == descriptor.name) {
                Some(existing) if descriptor.depth <= existing.depth => *existing = descriptor,
                Some(_) => {}
                None => out.push(descriptor),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/describe_tests.rs"]
mod tests;
