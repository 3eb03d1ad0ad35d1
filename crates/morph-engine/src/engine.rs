//! The engine facade.
//!
//! An [`Engine`] owns everything with process lifetime: the type registry,
//! the interner behind type keys, the descriptor store, the plan cache, and
//! the default templates. All methods take `&self`; an engine is shared
//! freely between threads.

use crate::builder::PlanBuilder;
use crate::cache::{CacheStatsSnapshot, PlanCache};
use crate::defaults::DefaultFactory;
use crate::describe::{DescriptorStore, Extractor, TypeDescriptor};
use crate::error::{MapError, Result};
use crate::execute::Executor;
use crate::plan::{MappingPlan, PlanKey, PlanStatus};
use crate::query_trace;
use crate::recursion::RecursionProfile;
use crate::registry::TypeRegistry;
use crate::strategy::{NestedTarget, Strategy};
use crate::types::{TypeDef, TypeKey, TypeRef};
use crate::value::Value;
use morph_common::Interner;
use morph_common::limits::{MAX_ADAPT_DEPTH, MAX_PLAN_DEPTH, MAX_PLAN_REQUESTS};
use rustc_hash::FxHashSet;
use std::borrow::Borrow;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deepest object nesting the executor will walk.
    pub max_adapt_depth: u32,
    /// Deepest chain of distinct nested pairs one plan build may follow.
    pub max_plan_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_adapt_depth: MAX_ADAPT_DEPTH,
            max_plan_depth: MAX_PLAN_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Defaults, overridden by `MORPH_MAX_ADAPT_DEPTH` and `MORPH_MAX_PLAN_DEPTH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(depth) = env_limit("MORPH_MAX_ADAPT_DEPTH") {
            config.max_adapt_depth = depth;
        }
        if let Some(depth) = env_limit("MORPH_MAX_PLAN_DEPTH") {
            config.max_plan_depth = depth;
        }
        config
    }

    fn plan_profile(&self) -> RecursionProfile {
        if self.max_plan_depth == MAX_PLAN_DEPTH {
            RecursionProfile::PlanBuild
        } else {
            RecursionProfile::Custom {
                max_depth: self.max_plan_depth,
                max_iterations: MAX_PLAN_REQUESTS,
            }
        }
    }
}

fn env_limit(name: &str) -> Option<u32> {
    let value = std::env::var(name).ok()?;
    let parsed = parse_limit(&value);
    if parsed.is_none() {
        warn!(name, value = %value, "ignoring invalid depth limit");
    }
    parsed
}

/// A positive depth limit.
fn parse_limit(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|&limit| limit > 0)
}

// =============================================================================
// Engine
// =============================================================================

pub struct Engine {
    config: EngineConfig,
    interner: Interner,
    registry: TypeRegistry,
    descriptors: DescriptorStore,
    plans: PlanCache,
    defaults: DefaultFactory,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            interner: Interner::new(),
            registry: TypeRegistry::new(),
            descriptors: DescriptorStore::new(),
            plans: PlanCache::new(),
            defaults: DefaultFactory::new(),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    pub fn register(&self, def: TypeDef) -> Result<()> {
        self.registry.register(def)
    }

    pub fn register_all(&self, defs: impl IntoIterator<Item = TypeDef>) -> Result<()> {
        defs.into_iter().try_for_each(|def| self.register(def))
    }

    /// Register a JSON array of type definitions. Returns how many were read.
    pub fn register_json(&self, json: &str) -> Result<usize> {
        let defs: Vec<TypeDef> = serde_json::from_str(json)?;
        let count = defs.len();
        self.register_all(defs)?;
        info!(count, "registered type definitions from JSON");
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Types and plans
    // -------------------------------------------------------------------------

    fn extractor(&self) -> Extractor<'_> {
        Extractor::new(&self.registry, &self.interner, &self.descriptors)
    }

    fn executor(&self, query_id: u64) -> Executor<'_> {
        Executor::new(
            self.extractor(),
            &self.plans,
            &self.defaults,
            self.config.plan_profile(),
            self.config.max_adapt_depth,
            query_id,
        )
    }

    pub fn type_key(&self, ty: &TypeRef) -> TypeKey {
        self.extractor().key_of(ty)
    }

    pub fn type_name(&self, key: TypeKey) -> Option<Arc<str>> {
        self.interner.try_resolve(key.0)
    }

    pub fn describe(&self, ty: &TypeRef) -> Result<Arc<TypeDescriptor>> {
        self.extractor().describe(ty)
    }

    /// The plan for a Complex pair, building it on first use.
    ///
    /// Structural failures are reported as [`MapError::PlanBuildFailure`].
    pub fn plan(&self, source: &TypeRef, dest: &TypeRef) -> Result<Arc<MappingPlan>> {
        let tracing = query_trace::enabled();
        let query_id = if tracing {
            let id = query_trace::next_query_id();
            query_trace::pair_start(id, "plan", self.type_key(source.non_optional()), self.type_key(dest.non_optional()));
            Some(id)
        } else {
            None
        };
        let builds_before = self.plans.stats().builds;

        let result = PlanBuilder::new(self.extractor(), &self.plans, self.config.plan_profile())
            .get_or_build(source, dest)
            .map_err(|err| err.into_build_failure(&source.non_optional().to_string(), &dest.non_optional().to_string()));

        if let Some(id) = query_id {
            let cache_hit = self.plans.stats().builds == builds_before;
            query_trace::pair_end(id, "plan", result.is_ok(), cache_hit);
        }
        result
    }

    pub fn plan_status(&self, source: &TypeRef, dest: &TypeRef) -> Option<PlanStatus> {
        let key = PlanKey::new(
            self.type_key(source.non_optional()),
            self.type_key(dest.non_optional()),
        );
        self.plans.status(key)
    }

    // -------------------------------------------------------------------------
    // Adaptation
    // -------------------------------------------------------------------------

    /// Project one Complex instance onto `dest`. The source type is the
    /// instance's runtime type; a null source yields null.
    ///
    /// Nesting is bounded by [`EngineConfig::max_adapt_depth`], which defaults
    /// to [`MAX_ADAPT_DEPTH`] (256) levels. A deeper source, such as a long
    /// self-referential chain, fails with [`MapError::DepthExceeded`] even
    /// though it is finite; raise the limit for such data.
    pub fn adapt_one(&self, source: &Value, dest: &TypeRef) -> Result<Value> {
        let query_id = query_trace::next_query_id();
        let traced = query_trace::enabled();
        if traced && let Value::Object(object) = source {
            query_trace::pair_start(
                query_id,
                "adapt_one",
                self.type_key(object.type_ref()),
                self.type_key(dest.non_optional()),
            );
        }
        let builds_before = self.plans.stats().builds;

        let result = self.executor(query_id).adapt_object(source, dest);

        if traced {
            let cache_hit = self.plans.stats().builds == builds_before;
            query_trace::pair_end(query_id, "adapt_one", result.is_ok(), cache_hit);
        }
        result
    }

    /// Lazily adapt every source, in order. The input is consumed once.
    pub fn adapt_many<I>(&self, sources: I, dest: &TypeRef) -> AdaptMany<'_, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: Borrow<Value>,
    {
        AdaptMany {
            engine: self,
            dest: dest.clone(),
            sources: sources.into_iter(),
        }
    }

    /// Adapt any value (scalar, container, or object) from an explicitly
    /// declared source type.
    pub fn adapt_as(&self, value: &Value, source: &TypeRef, dest: &TypeRef) -> Result<Value> {
        self.executor(query_trace::next_query_id())
            .adapt_value(value, source, dest)
    }

    /// The value a destination of type `ty` starts out with.
    pub fn default_instance(&self, ty: &TypeRef) -> Result<Value> {
        self.defaults.value(self.extractor(), ty)
    }

    // -------------------------------------------------------------------------
    // Tooling
    // -------------------------------------------------------------------------

    /// Build the plan for a pair and every plan it reaches, failing if any of
    /// them carries a warning or error diagnostic or is unresolvable.
    pub fn validate(&self, source: &TypeRef, dest: &TypeRef) -> Result<Arc<MappingPlan>> {
        let root = self.plan(source, dest)?;
        let mut problems = Vec::new();
        let mut seen = FxHashSet::default();
        let mut pending = vec![Arc::clone(&root)];

        while let Some(plan) = pending.pop() {
            if !seen.insert(plan.key) {
                continue;
            }
            let prefix = if plan.key == root.key {
                String::new()
            } else {
                format!("{}: ", plan.dest_name)
            };
            problems.extend(
                plan.diagnostics
                    .iter()
                    .filter(|d| d.is_problem())
                    .map(|d| format!("{prefix}{d}")),
            );

            let mut nested = Vec::new();
            for member in &plan.members {
                nested_targets(&member.strategy, &mut nested);
            }
            for target in nested {
                if !seen.contains(&target.key) {
                    pending.push(self.plan(&target.source_ty, &target.dest_ty)?);
                }
            }
        }

        let unresolvable = seen.iter().any(|&key| self.plans.status(key) == Some(PlanStatus::Unresolvable));
        if problems.is_empty() && !unresolvable {
            debug!(source = %root.source_name, dest = %root.dest_name, plans = seen.len(), "configuration valid");
            return Ok(root);
        }
        Err(MapError::InvalidConfiguration {
            source_type: root.source_name.to_string(),
            dest_type: root.dest_name.to_string(),
            diagnostics: problems,
        })
    }

    /// A pretty-printed JSON report of the plan for a pair.
    pub fn explain(&self, source: &TypeRef, dest: &TypeRef) -> Result<String> {
        let plan = self.plan(source, dest)?;
        Ok(serde_json::to_string_pretty(&plan.report())?)
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.plans.stats()
    }

    /// Drop every cached plan, descriptor, and default template.
    ///
    /// Registered types are kept. Intended for test isolation.
    pub fn reset_cache(&self) {
        self.plans.clear();
        self.descriptors.clear();
        self.defaults.clear();
        debug!("engine caches cleared");
    }
}

fn nested_targets<'s>(strategy: &'s Strategy, out: &mut Vec<&'s NestedTarget>) {
    match strategy {
        Strategy::NestedObject(target) => out.push(target),
        Strategy::SequenceElement { element, .. } | Strategy::SetElement { element, .. } => {
            nested_targets(element, out);
        }
        Strategy::MappingEntry { value, .. } => nested_targets(value, out),
        _ => {}
    }
}

/// Iterator returned by [`Engine::adapt_many`].
pub struct AdaptMany<'e, I> {
    engine: &'e Engine,
    dest: TypeRef,
    sources: I,
}

impl<I> Iterator for AdaptMany<'_, I>
where
    I: Iterator,
    I::Item: Borrow<Value>,
{
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.sources.next()?;
        Some(self.engine.adapt_one(source.borrow(), &self.dest))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.sources.size_hint()
    }
}

#[cfg(test)]
#[path = "../tests/engine_tests.rs"]
mod tests;
