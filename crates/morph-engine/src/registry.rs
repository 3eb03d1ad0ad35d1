//! Registered Complex type definitions.
//!
//! The registry is the engine's only source of structural information about
//! Complex types. Definitions are registered once and never change; a second
//! registration of an identical definition is a no-op, a conflicting one is
//! rejected.
//!
//! Base types and interfaces may be registered after the types that derive
//! from them. Unresolved names surface later, when a descriptor is requested.

use crate::error::{MapError, Result};
use crate::types::TypeDef;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use morph_common::limits::MAX_INHERITANCE_DEPTH;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Global counter for assigning unique instance IDs to `TypeRegistry` instances.
static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

struct Registered {
    def: Arc<TypeDef>,
    /// Registration order, used to order variant lists deterministically.
    seq: u64,
}

/// Thread-safe storage for type definitions.
///
/// ```ignore
/// let registry = TypeRegistry::new();
/// registry.register(TypeDef::class("Dog").extends(TypeRef::named("Animal")))?;
/// assert!(registry.is_derived_from("Dog", "Animal"));
/// ```
pub struct TypeRegistry {
    instance_id: u64,
    definitions: DashMap<String, Registered>,
    /// Base name -> names of types that directly extend or implement it.
    children: DashMap<String, Vec<String>>,
    next_seq: AtomicU64,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let instance_id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::SeqCst);
        trace!(instance_id, "TypeRegistry::new - creating new instance");
        Self {
            instance_id,
            definitions: DashMap::new(),
            children: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a definition.
    ///
    /// Re-registering an identical definition succeeds without effect.
    pub fn register(&self, def: TypeDef) -> Result<()> {
        if def.supertypes().any(|s| s.def_name() == Some(def.name.as_str())) {
            return Err(MapError::InheritanceCycle { name: def.name.clone() });
        }
        for supertype in def.supertypes() {
            if let Some(base) = supertype.def_name()
                && self.is_derived_from(base, &def.name)
            {
                return Err(MapError::InheritanceCycle { name: def.name.clone() });
            }
        }

        let name = def.name.clone();
        let bases: Vec<String> = def
            .supertypes()
            .filter_map(|s| s.def_name().map(str::to_string))
            .collect();

        match self.definitions.entry(name.clone()) {
            Entry::Occupied(existing) => {
                if *existing.get().def == def {
                    trace!(instance_id = self.instance_id, name = %name, "TypeRegistry::register - identical, skipped");
                    return Ok(());
                }
                return Err(MapError::DuplicateType { name });
            }
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                trace!(
                    instance_id = self.instance_id,
                    name = %name,
                    kind = ?def.kind,
                    members = def.members.len(),
                    seq,
                    "TypeRegistry::register"
                );
                slot.insert(Registered {
                    def: Arc::new(def),
                    seq,
                });
            }
        }

        for base in bases {
            self.children.entry(base).or_default().push(name.clone());
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeDef>> {
        self.definitions.get(name).map(|r| Arc::clone(&r.def))
    }

    /// Like [`get`](Self::get), failing with `UnknownType`.
    pub fn require(&self, name: &str) -> Result<Arc<TypeDef>> {
        self.get(name).ok_or_else(|| MapError::UnknownType {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Whether `name` is `base` or transitively extends or implements it.
    pub fn is_derived_from(&self, name: &str, base: &str) -> bool {
        let mut frontier = vec![name.to_string()];
        for _ in 0..=MAX_INHERITANCE_DEPTH {
            if frontier.iter().any(|n| n == base) {
                return true;
            }
            let next: Vec<String> = frontier
                .iter()
                .filter_map(|n| self.get(n))
                .flat_map(|def| {
                    def.supertypes()
                        .filter_map(|s| s.def_name().map(str::to_string))
                        .collect::<Vec<_>>()
                })
                .collect();
            if next.is_empty() {
                return false;
            }
            frontier = next;
        }
        false
    }

    /// All concrete types that transitively derive from `base` (excluding
    /// `base` itself), in registration order.
    pub fn concrete_variants(&self, base: &str) -> Vec<Arc<TypeDef>> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut found: Vec<(u64, Arc<TypeDef>)> = Vec::new();
        let mut frontier = vec![base.to_string()];

        for _ in 0..MAX_INHERITANCE_DEPTH {
            let mut next = Vec::new();
            for name in &frontier {
                let Some(direct) = self.children.get(name).map(|c| c.clone()) else {
                    continue;
                };
                for child in direct {
                    if !seen.insert(child.clone()) {
                        continue;
                    }
                    if let Some(entry) = self.definitions.get(&child)
                        && entry.def.is_concrete()
                    {
                        found.push((entry.seq, Arc::clone(&entry.def)));
                    }
                    next.push(child);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, def)| def).collect()
    }
}

#[cfg(test)]
#[path = "../tests/registry_tests.rs"]
mod tests;
