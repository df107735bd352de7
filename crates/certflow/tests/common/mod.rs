//! Shared test utilities for certflow integration tests.
//!
//! This module provides:
//! - `TestHarness` with a coordinator over a fresh database and a fixed cast of actors
//! - Builders for checklists, GPS fixes and config documents
//! - Observers that record or reject lifecycle events

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
