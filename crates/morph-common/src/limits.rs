//! Centralized limits and thresholds for the object adapter.
//!
//! Recursion limits for plan building and default construction are expressed as
//! `RecursionProfile`s in `morph_engine::recursion`; the values they use live
//! here so that the engine config and the profiles agree on one number.

// =============================================================================
// Recursion Depth Limits
// =============================================================================

/// Maximum nesting of distinct (source, destination) pairs in one plan build.
///
/// Cyclic type graphs are caught by the in-progress check long before this;
/// the limit only stops generic definitions that expand forever, e.g.
///
/// ```text
/// Grow<T> { inner: Option<Grow<List<T>>> }
/// ```
///
/// where every level closes over a new, larger argument.
pub const MAX_PLAN_DEPTH: u32 = 64;

/// Maximum depth of the value graph walked by the executor.
///
/// Instance graphs are trees (shared substructure is copied per occurrence),
/// so this only bounds pathological nesting in the input data.
pub const MAX_ADAPT_DEPTH: u32 = 256;

/// Maximum depth when materialising default-constructed destination values.
///
/// Required Complex members are default-constructed recursively.
pub const MAX_DEFAULT_DEPTH: u32 = 32;

/// Maximum length of an `extends` chain walked while collecting members.
pub const MAX_INHERITANCE_DEPTH: u32 = 32;

/// Maximum nesting of a `TypeRef` (generic arguments, containers, optionals).
pub const MAX_TYPE_REF_DEPTH: u32 = 48;

// =============================================================================
// Iteration Limits
// =============================================================================

/// Total number of plan requests a single top-level build may issue.
pub const MAX_PLAN_REQUESTS: u32 = 100_000;

// =============================================================================
// Capacity Limits
// =============================================================================

/// Initial capacity for the descriptor arena.
pub const DESCRIPTOR_CACHE_CAPACITY: usize = 256;

/// Initial capacity for the plan cache.
pub const PLAN_CACHE_CAPACITY: usize = 256;
