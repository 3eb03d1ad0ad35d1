//! Plan execution.
//!
//! An [`Executor`] walks one source value graph. Every Complex value is
//! adapted by cloning the destination's default template and applying the
//! plan's member mappings in order; unmatched and unmappable members keep
//! their defaults. Nested objects re-resolve their destination from the
//! runtime type of each instance, so a base-typed member holding a derived
//! value gets the derived destination and plan.
//!
//! Values are owned trees: a substructure that appears twice in the source
//! is adapted (and copied) twice.

use crate::builder::PlanBuilder;
use crate::cache::PlanCache;
use crate::containers::{elements, entries};
use crate::defaults::DefaultFactory;
use crate::describe::Extractor;
use crate::dispatch::resolve_variant;
use crate::error::{MapError, Result};
use crate::plan::MappingPlan;
use crate::query_trace;
use crate::recursion::{DepthCounter, RecursionProfile};
use crate::strategy::{NestedTarget, ScalarCast, Selector, Strategy, UnmappableReason, scalar_default};
use crate::types::TypeRef;
use crate::value::{Object, Value};
use std::sync::Arc;
use tracing::{trace, warn};

pub struct Executor<'e> {
    extractor: Extractor<'e>,
    cache: &'e PlanCache,
    defaults: &'e DefaultFactory,
    plan_profile: RecursionProfile,
    depth: DepthCounter,
    query_id: u64,
}

impl<'e> Executor<'e> {
    pub fn new(
        extractor: Extractor<'e>,
        cache: &'e PlanCache,
        defaults: &'e DefaultFactory,
        plan_profile: RecursionProfile,
        max_depth: u32,
        query_id: u64,
    ) -> Self {
        Self {
            extractor,
            cache,
            defaults,
            plan_profile,
            depth: DepthCounter::new(max_depth),
            query_id,
        }
    }

    /// Adapt a Complex instance to `dest`, dispatching on its runtime type.
    pub fn adapt_object(&mut self, source: &Value, dest: &TypeRef) -> Result<Value> {
        match source {
            Value::Null => Ok(Value::Null),
            Value::Object(object) => {
                let runtime = object.type_ref().clone();
                self.adapt_complex(object, &runtime, dest.non_optional(), "")
            }
            other => Err(MapError::InstanceMismatch {
                member: String::new(),
                expected: "an object".to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// Adapt any value with an explicitly declared source type.
    pub fn adapt_value(&mut self, value: &Value, source_ty: &TypeRef, dest_ty: &TypeRef) -> Result<Value> {
        let source = self.extractor.describe(source_ty)?;
        let dest = self.extractor.describe(dest_ty)?;
        if source.resolved().complex().is_some() && dest.resolved().complex().is_some() {
            self.plan_for(source_ty, dest_ty)?;
        }
        let strategy = {
            let mut builder = self.builder();
            Selector::new(&mut builder)
                .select(&source, &dest)
                .map_err(|err| err.into_build_failure(&source.name, &dest.name))?
        };
        if let Strategy::Unmappable(reason) = strategy {
            return Err(match reason {
                UnmappableReason::IncompatibleScalarTypes {
                    source_type,
                    dest_type,
                } => MapError::IncompatibleScalarTypes {
                    source_type,
                    dest_type,
                },
                other => MapError::IncompatibleTypes {
                    source_type: source.name.to_string(),
                    dest_type: dest.name.to_string(),
                    reason: other.to_string(),
                },
            });
        }
        self.apply(&strategy, value, "")
    }

    /// Run `plan` against a source object whose runtime type is the plan's
    /// source type (or derives from it).
    pub fn execute(&mut self, source: &Object, plan: &MappingPlan) -> Result<Value> {
        let dest_desc = self.extractor.describe(&plan.dest_ty)?;
        let Some(mut dest) = self.defaults.template(self.extractor, &dest_desc)? else {
            return Err(MapError::IncompatibleTypes {
                source_type: plan.source_name.to_string(),
                dest_type: plan.dest_name.to_string(),
                reason: "abstract destination has no concrete variant".to_string(),
            });
        };

        for mapping in &plan.members {
            if mapping.strategy.is_unmappable() {
                continue;
            }
            let Some(source_member) = &mapping.source_member else {
                continue;
            };
            let value = source.get(source_member).unwrap_or(&Value::Null);
            let converted = self.apply(&mapping.strategy, value, &mapping.dest_member)?;
            dest.set(mapping.dest_member.clone(), converted);
        }
        Ok(Value::Object(dest))
    }

    fn builder(&self) -> PlanBuilder<'e> {
        PlanBuilder::new(self.extractor, self.cache, self.plan_profile)
    }

    /// The finished plan for a pair, building or waiting as needed.
    fn plan_for(&self, source: &TypeRef, dest: &TypeRef) -> Result<Arc<MappingPlan>> {
        let key = crate::plan::PlanKey::new(self.extractor.key_of(source), self.extractor.key_of(dest));
        let result = match self.cache.lookup(key) {
            Some(done) => done,
            None => self.builder().get_or_build(source, dest),
        };
        result.map_err(|err| err.into_build_failure(&source.to_string(), &dest.to_string()))
    }

    fn adapt_complex(
        &mut self,
        object: &Object,
        declared_source: &TypeRef,
        declared_dest: &TypeRef,
        member: &str,
    ) -> Result<Value> {
        let runtime = object.type_ref();
        if runtime != declared_source {
            let derived = match (runtime.def_name(), declared_source.def_name()) {
                (Some(name), Some(base)) => self.extractor.registry().is_derived_from(name, base),
                _ => false,
            };
            if !derived {
                return Err(MapError::InstanceMismatch {
                    member: member.to_string(),
                    expected: declared_source.to_string(),
                    found: runtime.to_string(),
                });
            }
        }

        let chosen = resolve_variant(self.extractor, runtime, declared_source, declared_dest)?;
        if query_trace::enabled() && (runtime != declared_source || chosen.as_ref() != Some(declared_dest)) {
            let chosen_name = chosen.as_ref().map(ToString::to_string);
            query_trace::dispatch(
                self.query_id,
                &runtime.to_string(),
                &declared_dest.to_string(),
                chosen_name.as_deref(),
            );
        }
        let Some(dest) = chosen else {
            warn!(
                member,
                runtime = %runtime,
                declared_dest = %declared_dest,
                "no destination variant for runtime type; member left null"
            );
            return Ok(Value::Null);
        };

        if !self.depth.enter() {
            return Err(MapError::DepthExceeded {
                what: "object graph adaptation",
                limit: self.depth.max_depth(),
            });
        }
        let result = self
            .plan_for(runtime, &dest)
            .and_then(|plan| self.execute(object, &plan));
        self.depth.leave();
        result
    }

    fn apply(&mut self, strategy: &Strategy, value: &Value, member: &str) -> Result<Value> {
        match strategy {
            Strategy::DirectAssign(cast) => match value {
                Value::Null => Ok(scalar_default(cast.target_kind())),
                present => cast_value(cast, present, member),
            },
            Strategy::NullableWrap(cast) | Strategy::NullableToNullable(cast) => match value {
                Value::Null => Ok(Value::Null),
                present => cast_value(cast, present, member),
            },
            Strategy::NullableUnwrap { cast, default } => match value {
                Value::Null => Ok(default.clone()),
                present => cast_value(cast, present, member),
            },
            Strategy::NestedObject(target) => self.nested(target, value, member),
            Strategy::SequenceElement { element, target } | Strategy::SetElement { element, target } => {
                if value.is_null() {
                    return Ok(target.absent());
                }
                let Some((items, dims)) = elements(value) else {
                    return Err(mismatch(member, &target.to_string(), value));
                };
                let converted = items
                    .map(|item| self.apply(element, item, member))
                    .collect::<Result<Vec<_>>>()?;
                target
                    .rebuild(converted, dims)
                    .map_err(|err| with_member(err, member))
            }
            Strategy::MappingEntry {
                key,
                value: value_strategy,
                target,
            } => {
                if value.is_null() {
                    return Ok(target.absent());
                }
                let Some(source_entries) = entries(value) else {
                    return Err(mismatch(member, &target.to_string(), value));
                };
                let converted = source_entries
                    .map(|(k, v)| Ok((self.apply(key, k, member)?, self.apply(value_strategy, v, member)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(target.rebuild_map(converted))
            }
            Strategy::Unmappable(_) => Ok(Value::Null),
        }
    }

    fn nested(&mut self, target: &NestedTarget, value: &Value, member: &str) -> Result<Value> {
        match value {
            Value::Null if target.dest_nullable => Ok(Value::Null),
            Value::Null => {
                trace!(member, dest = %target.dest_ty, "null nested source: destination default");
                self.defaults.value(self.extractor, &target.dest_ty)
            }
            Value::Object(object) => self.adapt_complex(object, &target.source_ty, &target.dest_ty, member),
            other => Err(mismatch(member, &target.source_ty.to_string(), other)),
        }
    }
}

fn cast_value(cast: &ScalarCast, value: &Value, member: &str) -> Result<Value> {
    cast.apply(value)
        .ok_or_else(|| mismatch(member, &cast.source_kind().to_string(), value))
}

fn mismatch(member: &str, expected: &str, found: &Value) -> MapError {
    MapError::InstanceMismatch {
        member: member.to_string(),
        expected: expected.to_string(),
        found: found.kind_name().to_string(),
    }
}

fn with_member(err: MapError, member: &str) -> MapError {
    match err {
        MapError::InstanceMismatch { expected, found, .. } => MapError::InstanceMismatch {
            member: member.to_string(),
            expected,
            found,
        },
        other => other,
    }
}

#[cfg(test)]
#[path = "../tests/execute_tests.rs"]
mod tests;
