//! Structured query tracing for engine entry points.
//!
//! Events use target `morph::query_json` and are intended to be consumed with:
//! `MORPH_LOG=morph::query_json=trace MORPH_LOG_FORMAT=json`.
//!
//! Environment:
//! - `MORPH_QUERY_RUN_ID`: optional run identifier attached to every event.

use crate::types::TypeKey;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Level, trace};

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);
static QUERY_RUN_ID: OnceLock<String> = OnceLock::new();

#[inline]
pub(crate) fn enabled() -> bool {
    tracing::enabled!(target: "morph::query_json", Level::TRACE)
}

#[inline]
pub(crate) fn next_query_id() -> u64 {
    NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed)
}

#[inline]
fn run_id() -> &'static str {
    QUERY_RUN_ID
        .get_or_init(|| std::env::var("MORPH_QUERY_RUN_ID").unwrap_or_else(|_| "default".to_string()))
        .as_str()
}

#[inline]
pub(crate) fn pair_start(query_id: u64, op: &'static str, source: TypeKey, dest: TypeKey) {
    trace!(
        target: "morph::query_json",
        event = "query",
        phase = "start",
        run_id = run_id(),
        query_id,
        op,
        source_type_key = source.0.0,
        dest_type_key = dest.0.0
    );
}

#[inline]
pub(crate) fn pair_end(query_id: u64, op: &'static str, ok: bool, cache_hit: bool) {
    trace!(
        target: "morph::query_json",
        event = "query",
        phase = "end",
        run_id = run_id(),
        query_id,
        op,
        ok,
        cache_hit
    );
}

#[inline]
pub(crate) fn dispatch(query_id: u64, runtime: &str, declared_dest: &str, chosen: Option<&str>) {
    trace!(
        target: "morph::query_json",
        event = "dispatch",
        run_id = run_id(),
        query_id,
        runtime,
        declared_dest,
        chosen = chosen.unwrap_or("")
    );
}
