//! Polymorphic destination selection.
//!
//! A NestedObject member declared `Animal -> AnimalDto` may receive a `Dog`
//! at runtime. The destination variant is chosen per instance from the
//! declared destination (when concrete) and its concrete variants, first
//! match wins:
//!
//! 1. the declared pair's naming affix applied to the runtime name
//!    (`Animal -> AnimalDto` maps `Dog` to `DogDto`);
//! 2. a variant named exactly like the runtime type;
//! 3. the declared destination, when concrete;
//! 4. the variant sharing the most member names with the runtime type
//!    (earliest registered on a tie).
//!
//! Generic variants are never candidates: their arguments cannot be inferred
//! from the runtime source type.

use crate::describe::Extractor;
use crate::error::Result;
use crate::matcher::name_overlap;
use crate::types::TypeRef;
use tracing::debug;

/// The concrete destination for a runtime source type, or `None` when no
/// variant applies.
pub fn resolve_variant(
    extractor: Extractor<'_>,
    runtime: &TypeRef,
    declared_source: &TypeRef,
    declared_dest: &TypeRef,
) -> Result<Option<TypeRef>> {
    let registry = extractor.registry();
    let dest_def = match declared_dest.def_name() {
        Some(name) => registry.require(name)?,
        None => return Ok(None),
    };
    if runtime == declared_source && dest_def.is_concrete() {
        return Ok(Some(declared_dest.clone()));
    }
    let (Some(runtime_name), Some(source_name)) = (runtime.def_name(), declared_source.def_name())
    else {
        return Ok(None);
    };

    let mut candidates: Vec<TypeRef> = Vec::new();
    if dest_def.is_concrete() {
        candidates.push(declared_dest.clone());
    }
    candidates.extend(
        registry
            .concrete_variants(&dest_def.name)
            .iter()
            .filter(|def| def.type_params.is_empty())
            .map(|def| TypeRef::named(def.name.clone())),
    );
    let named = |name: &str| candidates.iter().find(|c| c.def_name() == Some(name)).cloned();

    if let Some(affixed) = affixed(source_name, &dest_def.name, runtime_name)
        && let Some(chosen) = named(&affixed)
    {
        debug!(runtime = runtime_name, chosen = %chosen, "dispatch: naming affix");
        return Ok(Some(chosen));
    }
    if let Some(chosen) = named(runtime_name) {
        debug!(runtime = runtime_name, chosen = %chosen, "dispatch: exact name");
        return Ok(Some(chosen));
    }
    if dest_def.is_concrete() {
        return Ok(Some(declared_dest.clone()));
    }

    let runtime_desc = extractor.describe(runtime)?;
    let Some(runtime_shape) = runtime_desc.complex() else {
        return Ok(None);
    };
    let mut best: Option<(usize, TypeRef)> = None;
    for candidate in candidates {
        let desc = extractor.describe(&candidate)?;
        let Some(shape) = desc.complex() else {
            continue;
        };
        let overlap = name_overlap(runtime_shape, shape);
        if overlap > 0 && best.as_ref().is_none_or(|(top, _)| overlap > *top) {
            best = Some((overlap, candidate));
        }
    }
    if let Some((overlap, chosen)) = &best {
        debug!(runtime = runtime_name, chosen = %chosen, overlap, "dispatch: member overlap");
    }
    Ok(best.map(|(_, chosen)| chosen))
}

/// `declared_dest` with `declared_source` replaced by `runtime`, when the
/// destination name embeds the source name (`Animal` in `AnimalDto`).
fn affixed(declared_source: &str, declared_dest: &str, runtime: &str) -> Option<String> {
    if declared_source == declared_dest {
        return None;
    }
    let at = declared_dest.find(declared_source)?;
    let prefix = &declared_dest[..at];
    let suffix = &declared_dest[at + declared_source.len()..];
    Some(format!("{prefix}{runtime}{suffix}"))
}
