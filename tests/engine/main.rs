//! Integration tests for Layer 2: Engine
//!
//! Tests for commits, change notification, the orphanage, and reactive queries.

mod commits;
mod flows;
mod notifications;
mod orphanage;
