//! The versioned workspace model, its change bus, and reactive queries.
//!
//! This crate provides:
//! - [`WorkspaceModel`] - The current version, optimistic and synchronous commits
//! - [`ChangeBus`] - Synchronous listeners and buffered, coalescing subscriptions
//! - [`Orphanage`] - Fragments waiting for their module to appear
//! - [`Query`] - Declarative pipelines over one entity kind
//! - [`Flow`] - Incrementally maintained query results across versions
//! - [`ModelConfig`] - Commit and notification settings

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bus;
pub mod config;
pub mod event;
pub mod flow;
pub mod model;
pub mod orphanage;
pub mod query;

pub use bus::{ChangeBus, ChangeEvent, ChangeListener, ChangeSubscription, ListenerId};
pub use config::ModelConfig;
pub use event::{VersionedStorage, VersionedStorageChange};
pub use flow::{Flow, FlowUpdate, QueryDiff};
pub use model::{BuilderSnapshot, ReplaceOutcome, StorageReplacement, WorkspaceModel};
pub use orphanage::{Adoption, FragmentState, Orphanage};
pub use query::Query;
