//! Source-scoped reconciliation.
//!
//! [`Builder::replace_by_source`] makes the entities of the builder whose source
//! satisfies a predicate look exactly like the matching entities of a replacement
//! storage, without touching anything else.
//!
//! Replacement entities are paired with builder entities first: keyed kinds by
//! symbolic id, the rest under their paired parent by pairing key, with the first
//! candidate in declaration order winning. Each replacement entity then gets one
//! action:
//!
//! | Builder entity | Replacement entity | Action |
//! |---|---|---|
//! | any | `DummyParent` source | anchor only |
//! | not matched | any | anchor only |
//! | matched | matched | relabel data and source |
//! | matched | not matched | remove builder entity |
//! | none | matched | add under the anchored parent |
//!
//! Matched builder entities with no relabel are removed with their subtrees.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, trace, warn};
use wsmodel_foundation::{EntityId, EntityKind, EntitySource, Result};

use crate::builder::Builder;
use crate::record::{EntityRecord, EntityRef};
use crate::schema;
use crate::storage::Storage;

/// Counts of what a reconciliation did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaceReport {
    /// Replacement entities added to the builder.
    pub added: usize,
    /// Builder entities whose data or source was relabelled.
    pub relabelled: usize,
    /// Builder entities removed, cascades included.
    pub removed: usize,
    /// Replacement entities used only to locate their children's parent.
    pub anchored: usize,
    /// Replacement entities that could not be placed.
    pub skipped: usize,
}

impl fmt::Display for ReplaceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added {}, relabelled {}, removed {}, anchored {}, skipped {}",
            self.added, self.relabelled, self.removed, self.anchored, self.skipped
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    /// Use the builder entity as a parent for children; never modify it.
    Anchor(EntityId),
    /// Overwrite the builder entity with the replacement's data and source.
    Relabel(EntityId),
    /// Insert the replacement entity.
    Add,
    /// Ignore the replacement entity.
    Skip,
}

#[derive(Default)]
struct Plan {
    steps: Vec<(EntityRef, Action)>,
    /// Replacement id -> paired builder id.
    pairs: HashMap<EntityId, EntityId>,
    /// Builder entities that survive the reconciliation.
    retained: HashSet<EntityId>,
}

impl Plan {
    fn push(
        &mut self,
        pred: &impl Fn(&EntitySource) -> bool,
        entity: EntityRef,
        target: Option<EntityRef>,
    ) {
        let dummy = entity.source().is_dummy_parent();
        let action = match &target {
            Some(t) if dummy || !pred(t.source()) => Action::Anchor(t.id()),
            Some(t) if pred(entity.source()) => Action::Relabel(t.id()),
            Some(_) => Action::Skip,
            None if !dummy && pred(entity.source()) => Action::Add,
            None => Action::Skip,
        };
        if let Some(t) = &target {
            self.pairs.insert(entity.id(), t.id());
            if matches!(action, Action::Anchor(_) | Action::Relabel(_)) {
                self.retained.insert(t.id());
            }
        }
        trace!(target: "wsmodel::rbs", entity = %entity.id(), ?action, "planned");
        self.steps.push((entity, action));
    }
}

impl Builder {
    /// Replaces every entity whose source satisfies `pred` with the matching
    /// entities of `replacement`.
    ///
    /// Entities whose source does not satisfy `pred` are never modified, though a
    /// kept entity inside a removed subtree goes with it. External mappings of
    /// relabelled and added replacement entities are carried over.
    ///
    /// # Errors
    ///
    /// Returns an error if an added entity violates the containment schema or
    /// symbolic id uniqueness. The builder may be partially updated on error.
    pub fn replace_by_source(
        &mut self,
        pred: impl Fn(&EntitySource) -> bool,
        replacement: &Storage,
    ) -> Result<ReplaceReport> {
        let plan = self.plan_replacement(&pred, replacement);
        let mut report = ReplaceReport::default();

        // Unpaired matched entities go first, freeing symbolic ids and slots
        let mut doomed: Vec<EntityId> = self
            .storage()
            .entities_by_source(&pred)
            .map(|entity| entity.id())
            .filter(|id| !plan.retained.contains(id))
            .collect();
        doomed.sort_unstable();
        for id in doomed {
            if self.storage().contains(id) {
                trace!(target: "wsmodel::rbs", entity = %id, "remove");
                report.removed += self.remove_entity(id)?;
            }
        }

        // Replacement id -> builder id, for parents of later steps
        let mut anchors: HashMap<EntityId, EntityId> = HashMap::new();
        let mut touched: Vec<EntityId> = Vec::new();

        for (entity, action) in plan.steps {
            let replacement_id = entity.id();
            match action {
                Action::Skip => {
                    report.skipped += 1;
                }
                Action::Anchor(target) => {
                    if self.storage().contains(target) {
                        anchors.insert(replacement_id, target);
                    }
                    report.anchored += 1;
                }
                Action::Relabel(target) if self.storage().contains(target) => {
                    trace!(target: "wsmodel::rbs", entity = %target, from = %replacement_id, "relabel");
                    let record = entity.record();
                    let changed = {
                        let current = self.storage().entity(target);
                        current.is_some_and(|c| {
                            c.data() != &record.data || c.source() != &record.source
                        })
                    };
                    self.update_record(target, |r| {
                        r.data = record.data.clone();
                        r.source = record.source.clone();
                    })?;
                    if changed {
                        report.relabelled += 1;
                    }
                    self.transfer_mappings(replacement, replacement_id, target);
                    anchors.insert(replacement_id, target);
                    if let Some(parent) = entity.parent() {
                        touched.push(parent);
                    }
                }
                Action::Relabel(_) | Action::Add => {
                    match self.add_replacement(&entity, &anchors)? {
                        Some(added) => {
                            trace!(target: "wsmodel::rbs", entity = %added, from = %replacement_id, "add");
                            self.transfer_mappings(replacement, replacement_id, added);
                            anchors.insert(replacement_id, added);
                            if let Some(parent) = entity.parent() {
                                touched.push(parent);
                            }
                            report.added += 1;
                        }
                        None => {
                            warn!(
                                target: "wsmodel::rbs",
                                entity = %replacement_id,
                                "no parent for replacement entity, skipping"
                            );
                            report.skipped += 1;
                        }
                    }
                }
            }
        }

        self.follow_replacement_order(replacement, &anchors, &touched)?;
        debug!(target: "wsmodel::rbs", %report, "replaced by source");
        Ok(report)
    }

    /// Pairs replacement entities with builder entities and decides each action.
    fn plan_replacement(
        &self,
        pred: &impl Fn(&EntitySource) -> bool,
        replacement: &Storage,
    ) -> Plan {
        let current = self.storage();
        let mut plan = Plan::default();

        for kind in EntityKind::ALL {
            if kind.is_keyed() {
                for entity in replacement.entities_of(kind) {
                    let target = entity
                        .symbolic_id()
                        .and_then(|symbolic| current.resolve(&symbolic));
                    plan.push(pred, entity, target);
                }
                continue;
            }
            let Some(parent_kind) = schema::parent_kind(kind) else {
                for entity in replacement.entities_of(kind) {
                    plan.push(pred, entity, None);
                }
                continue;
            };
            for parent in replacement.entities_of(parent_kind) {
                let target_parent = plan.pairs.get(&parent.id()).copied();
                let mut claimed = HashSet::new();
                for entity in replacement.children(parent.id(), kind) {
                    let target = target_parent
                        .and_then(|tp| counterpart(current, tp, &entity, &claimed, pred));
                    if let Some(t) = &target {
                        claimed.insert(t.id());
                    }
                    plan.push(pred, entity, target);
                }
            }
        }

        plan
    }

    /// Inserts a replacement entity under its anchored parent. Returns `None` if
    /// the entity needs a parent that has no anchor.
    fn add_replacement(
        &mut self,
        entity: &EntityRef,
        anchors: &HashMap<EntityId, EntityId>,
    ) -> Result<Option<EntityId>> {
        let data = entity.data().clone();
        let source = entity.source().clone();
        match entity.parent() {
            None => self.add_entity(data, source).map(Some),
            Some(parent) => match anchors.get(&parent) {
                Some(&target) if self.storage().contains(target) => {
                    self.add_child(target, data, source).map(Some)
                }
                _ => Ok(None),
            },
        }
    }

    /// Reorders the children of touched parents so that children coming from the
    /// replacement follow its order. Other children keep their positions.
    fn follow_replacement_order(
        &mut self,
        replacement: &Storage,
        anchors: &HashMap<EntityId, EntityId>,
        touched: &[EntityId],
    ) -> Result<()> {
        let mut parents = touched.to_vec();
        parents.sort_unstable();
        parents.dedup();

        for replacement_parent in parents {
            let Some(&target_parent) = anchors.get(&replacement_parent) else {
                continue;
            };
            let Some(replacement_record) = replacement.record(replacement_parent) else {
                continue;
            };
            let Some(target_record) = self.storage().record(target_parent).cloned() else {
                continue;
            };
            for kind in schema::child_kinds(target_parent.kind) {
                let order = merged_order(&target_record, replacement_record, kind, anchors);
                if let Some(order) = order {
                    self.reorder_children(target_parent, kind, &order)?;
                }
            }
        }
        Ok(())
    }
}

/// Finds the first unclaimed child of `target_parent` with the same pairing key,
/// preferring matched candidates.
fn counterpart(
    current: &Storage,
    target_parent: EntityId,
    entity: &EntityRef,
    claimed: &HashSet<EntityId>,
    pred: &impl Fn(&EntitySource) -> bool,
) -> Option<EntityRef> {
    let key = entity.data().pairing_key();
    let candidates: Vec<EntityRef> = current
        .children(target_parent, entity.kind())
        .filter(|candidate| !claimed.contains(&candidate.id()))
        .filter(|candidate| candidate.data().pairing_key() == key)
        .collect();
    let preferred = candidates
        .iter()
        .position(|candidate| pred(candidate.source()))
        .unwrap_or(0);
    candidates.into_iter().nth(preferred)
}

/// Computes the child order of `kind` under a target parent, placing children
/// that came from the replacement in replacement order. Returns `None` when
/// nothing moves.
fn merged_order(
    target: &EntityRecord,
    replacement: &EntityRecord,
    kind: EntityKind,
    anchors: &HashMap<EntityId, EntityId>,
) -> Option<Vec<EntityId>> {
    let current: Vec<EntityId> = target.children_of(kind).collect();
    let mapped: HashSet<EntityId> = replacement
        .children_of(kind)
        .filter_map(|child| anchors.get(&child).copied())
        .collect();
    let mut wanted = replacement
        .children_of(kind)
        .filter_map(|child| anchors.get(&child).copied())
        .filter(|child| current.contains(child));

    let order: Vec<EntityId> = current
        .iter()
        .map(|child| {
            if mapped.contains(child) {
                wanted.next().unwrap_or(*child)
            } else {
                *child
            }
        })
        .collect();
    (order != current).then_some(order)
}
