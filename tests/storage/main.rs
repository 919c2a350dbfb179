//! Integration tests for Layer 1: Storage
//!
//! Tests for snapshots, builders, change collection, and source-scoped replacement.

mod builder;
mod changes;
mod replace;
mod roundtrip;
