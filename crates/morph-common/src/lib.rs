//! Common types and utilities for the morph object adapter.
//!
//! This crate provides foundational types used across the morph crates:
//! - String interning (`Atom`, `Interner`) for stable type keys
//! - Centralized limits and thresholds

pub mod interner;
pub use interner::{Atom, Interner};

pub mod limits;
