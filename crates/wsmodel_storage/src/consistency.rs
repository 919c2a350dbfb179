//! Storage consistency checks.
//!
//! Verifies every structural invariant a builder is supposed to maintain. Used by
//! tests and, when enabled, after each commit.

use std::collections::HashSet;

use wsmodel_foundation::{EntityData, EntityId, Error, Result};

use crate::schema::{self, Cardinality};
use crate::storage::Storage;

impl Storage {
    /// Checks containment links, cardinality, and every secondary index.
    ///
    /// # Errors
    ///
    /// Returns `InconsistentStorage` describing the first violation found.
    pub fn check_consistency(&self) -> Result<()> {
        let mut symbolic_seen = 0;

        for entity in self.all_entities() {
            let id = entity.id();
            let record = entity.record();

            match record.parent {
                Some(parent) => {
                    let Some(parent_record) = self.record(parent) else {
                        return Err(inconsistent(id, format!("parent {parent} is missing")));
                    };
                    if schema::connection(parent.kind, id.kind).is_none() {
                        return Err(inconsistent(id, format!("{parent} cannot contain it")));
                    }
                    let listed = parent_record.children.iter().filter(|c| **c == id).count();
                    if listed != 1 {
                        return Err(inconsistent(
                            id,
                            format!("listed {listed} times by parent {parent}"),
                        ));
                    }
                    if let (EntityData::Facet(facet), EntityData::Module(module)) =
                        (&record.data, &parent_record.data)
                    {
                        if facet.module.name() != module.name {
                            return Err(inconsistent(id, "facet names another module"));
                        }
                    }
                }
                None if schema::requires_parent(id.kind) => {
                    return Err(inconsistent(id, "required parent is missing"));
                }
                None => {}
            }

            let mut children = HashSet::new();
            for child in &record.children {
                if !children.insert(*child) {
                    return Err(inconsistent(id, format!("lists child {child} twice")));
                }
                match self.record(*child) {
                    Some(child_record) if child_record.parent == Some(id) => {}
                    Some(_) => {
                        return Err(inconsistent(id, format!("child {child} has another parent")));
                    }
                    None => return Err(inconsistent(id, format!("child {child} is missing"))),
                }
            }
            for kind in schema::child_kinds(id.kind) {
                let one_to_one = schema::connection(id.kind, kind)
                    .is_some_and(|c| c.cardinality == Cardinality::OneToOne);
                if one_to_one && record.children_of(kind).count() > 1 {
                    return Err(inconsistent(id, format!("holds more than one {kind}")));
                }
            }

            if let Some(symbolic) = record.data.symbolic_id() {
                symbolic_seen += 1;
                if self.indexes().symbolic(&symbolic) != Some(id) {
                    return Err(inconsistent(id, format!("{symbolic} is not indexed")));
                }
            }
            if !self.indexes().has_source(&record.source, id) {
                return Err(inconsistent(id, "source is not indexed"));
            }
            for link in record.data.soft_links() {
                if !self.indexes().referrers(&link).any(|r| r == id) {
                    return Err(inconsistent(id, format!("link to {link} is not indexed")));
                }
            }
        }

        if symbolic_seen != self.indexes().symbolic_count() {
            return Err(Error::inconsistent(format!(
                "symbolic index holds {} ids for {symbolic_seen} keyed entities",
                self.indexes().symbolic_count()
            )));
        }
        let indexed_by_source = self.indexes().with_source(|_| true).count();
        if indexed_by_source != self.total_count() {
            return Err(Error::inconsistent(format!(
                "source index holds {indexed_by_source} entities, storage holds {}",
                self.total_count()
            )));
        }
        Ok(())
    }
}

fn inconsistent(id: EntityId, message: impl std::fmt::Display) -> Error {
    Error::inconsistent(format!("{id}: {message}"))
}
