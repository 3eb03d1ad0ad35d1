//! morph: structural object-to-object adapter.
//!
//! Projects instances of one type (typically a domain model) onto another
//! (typically a DTO) by matching member names case-insensitively, converting
//! scalars, containers, and nested objects along the way.
//!
//! Types are declared once through [`register`]. The process-wide engine
//! builds one mapping plan per (source, destination) pair on first use and
//! reuses it for the life of the process.
//!
//! ```ignore
//! use morph::{Object, TypeDef, TypeRef, Value};
//!
//! morph::register_all([
//!     TypeDef::class("Account").member("Id", TypeRef::String),
//!     TypeDef::class("AccountDto").member("id", TypeRef::String),
//! ])?;
//! let source = Value::Object(Object::new("Account").with("Id", "A1"));
//! let dto = morph::adapt_one(&source, &TypeRef::named("AccountDto"))?;
//! ```

use once_cell::sync::Lazy;
use std::borrow::Borrow;

pub mod tracing_config;

pub use morph_common::limits;
pub use morph_engine::*;

static ENGINE: Lazy<Engine> = Lazy::new(|| {
    let config = EngineConfig::from_env();
    tracing::debug!(?config, "initialising process-wide engine");
    Engine::with_config(config)
});

/// The process-wide engine.
pub fn engine() -> &'static Engine {
    &ENGINE
}

pub fn register(def: TypeDef) -> Result<()> {
    ENGINE.register(def)
}

pub fn register_all(defs: impl IntoIterator<Item = TypeDef>) -> Result<()> {
    ENGINE.register_all(defs)
}

/// Register a JSON array of type definitions.
pub fn register_json(json: &str) -> Result<usize> {
    ENGINE.register_json(json)
}

/// Project one object onto `dest`, dispatching on its runtime type.
///
/// Sources nested deeper than the engine's `max_adapt_depth` (256 unless
/// `MORPH_MAX_ADAPT_DEPTH` says otherwise) fail with
/// [`MapError::DepthExceeded`].
pub fn adapt_one(source: &Value, dest: &TypeRef) -> Result<Value> {
    ENGINE.adapt_one(source, dest)
}

/// Lazily project every source onto `dest`, preserving order.
pub fn adapt_many<I>(sources: I, dest: &TypeRef) -> AdaptMany<'static, I::IntoIter>
where
    I: IntoIterator,
    I::Item: Borrow<Value>,
{
    ENGINE.adapt_many(sources, dest)
}

/// Forget every cached plan, descriptor, and default template.
///
/// Registered types survive. For test isolation only.
pub fn reset_cache() {
    ENGINE.reset_cache();
}
