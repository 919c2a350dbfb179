//! Integration tests for Layer 0: Foundation
//!
//! Tests for entity identities, symbolic ids, sources, payloads, and errors.

mod errors;
mod identities;
mod payloads;
