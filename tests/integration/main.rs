//! Cross-layer integration tests for wsmodel
//!
//! Tests that verify correct interaction between multiple crates.

mod cache;
mod project_sync;
