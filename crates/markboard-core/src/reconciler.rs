//! Merging of mutations produced by other participants.
//!
//! Remote mutations are applied straight to the document, whether or not a
//! local batch is open. They never touch the history stacks or the open
//! batch's start snapshot, so local undo cannot rewind them.

use crate::document::Document;
use crate::history::HistoryEngine;
use crate::shapes::{ParticipantId, Shape, ShapeId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How a receiver stores the payload of a [`RemoteMutation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// A new edit: the payload is stamped with the event version.
    #[default]
    Edit,
    /// A recorded state put back by undo, redo or rollback. The payload
    /// keeps its own counters and the event version guards it.
    Restore,
    /// Undo of a creation: the id leaves the map, guarded by the event version.
    Remove,
}

/// A shape put or delete delivered by the transport.
///
/// Deletes carry the full shape with `deleted` set, so a delete and a
/// concurrent edit resolve by the same counter rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMutation {
    pub shape_id: ShapeId,
    pub shape: Shape,
    pub updated_at: u64,
    pub participant_id: ParticipantId,
    #[serde(default)]
    pub kind: MutationKind,
}

impl RemoteMutation {
    pub fn put(shape: Shape, updated_at: u64, participant_id: ParticipantId) -> Self {
        Self {
            shape_id: shape.id().clone(),
            shape,
            updated_at,
            participant_id,
            kind: MutationKind::Edit,
        }
    }

    pub fn delete(mut shape: Shape, updated_at: u64, participant_id: ParticipantId) -> Self {
        shape.meta_mut().deleted = true;
        Self::put(shape, updated_at, participant_id)
    }

    /// A restored state, sent with a version newer than its own counters.
    pub fn restore(shape: Shape, updated_at: u64, participant_id: ParticipantId) -> Self {
        Self {
            kind: MutationKind::Restore,
            ..Self::put(shape, updated_at, participant_id)
        }
    }

    /// Physical removal of a shape whose creation was undone. The payload is
    /// the last state, marked deleted.
    pub fn remove(mut shape: Shape, updated_at: u64, participant_id: ParticipantId) -> Self {
        shape.meta_mut().deleted = true;
        Self {
            kind: MutationKind::Remove,
            ..Self::put(shape, updated_at, participant_id)
        }
    }

    /// Describe a stored shape using its own counters.
    pub fn from_shape(shape: &Shape) -> Self {
        Self::put(shape.clone(), shape.updated_at(), shape.updated_by().clone())
    }

    pub fn is_delete(&self) -> bool {
        self.shape.is_deleted()
    }

    /// Ordering key for the conflict tie-break.
    pub fn version(&self) -> (u64, &ParticipantId) {
        (self.updated_at, &self.participant_id)
    }
}

/// What happened to one remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The mutation won and is now the stored state.
    Applied,
    /// The stored state is newer, or this is a duplicate delivery.
    Stale,
    /// The id was compacted away and can never be stored again.
    Retired,
    /// The event is inconsistent with its payload.
    Malformed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    pub applied: u64,
    pub stale: u64,
    pub rejected: u64,
}

/// Inbound side of collaboration for one document.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    inbound: VecDeque<RemoteMutation>,
    stats: ReconcilerStats,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// Queue a mutation for the next [`Reconciler::drain`].
    pub fn enqueue(&mut self, event: RemoteMutation) {
        self.inbound.push_back(event);
    }

    /// Number of queued mutations.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Apply every queued mutation in arrival order.
    pub fn drain(&mut self, doc: &mut Document, history: &HistoryEngine) -> Vec<RemoteOutcome> {
        let mut outcomes = Vec::with_capacity(self.inbound.len());
        while let Some(event) = self.inbound.pop_front() {
            outcomes.push(self.apply_remote_mutation(doc, history, event));
        }
        outcomes
    }

    /// Merge one remote mutation into the document.
    ///
    /// The higher `(updated_at, participant_id)` pair wins, which makes the
    /// final state independent of delivery order.
    pub fn apply_remote_mutation(
        &mut self,
        doc: &mut Document,
        history: &HistoryEngine,
        event: RemoteMutation,
    ) -> RemoteOutcome {
        let outcome = resolve(doc, history, event);
        match outcome {
            RemoteOutcome::Applied => self.stats.applied += 1,
            RemoteOutcome::Stale => self.stats.stale += 1,
            RemoteOutcome::Retired | RemoteOutcome::Malformed => self.stats.rejected += 1,
        }
        outcome
    }
}

fn resolve(doc: &mut Document, history: &HistoryEngine, event: RemoteMutation) -> RemoteOutcome {
    if event.shape.id() != &event.shape_id || event.participant_id.is_empty() {
        log::warn!(
            "Rejecting malformed remote mutation for {} from '{}'",
            event.shape_id,
            event.participant_id
        );
        return RemoteOutcome::Malformed;
    }
    if doc.is_retired(&event.shape_id) {
        log::debug!("Ignoring remote mutation for retired shape {}", event.shape_id);
        return RemoteOutcome::Retired;
    }

    if doc
        .version(&event.shape_id)
        .is_some_and(|current| current >= event.version())
    {
        log::debug!(
            "Ignoring stale remote mutation for {} at {} from '{}'",
            event.shape_id,
            event.updated_at,
            event.participant_id
        );
        return RemoteOutcome::Stale;
    }

    let RemoteMutation {
        shape_id,
        mut shape,
        updated_at,
        participant_id,
        kind,
    } = event;

    if let Some(label) = history.batch_label() {
        log::debug!("Remote {:?} for {} merged during batch '{}'", kind, shape_id, label);
    } else {
        log::debug!("Remote {:?} for {} applied at {}", kind, shape_id, updated_at);
    }
    match kind {
        MutationKind::Edit => {
            let meta = shape.meta_mut();
            meta.updated_at = updated_at;
            // Taken from the payload only, so every replica stores the same creator
            if meta.created_by.is_empty() {
                meta.created_by = participant_id.clone();
            }
            meta.updated_by = participant_id;
            doc.apply_remote(shape);
        }
        MutationKind::Restore => doc.apply_restored(shape, (updated_at, participant_id)),
        MutationKind::Remove => doc.apply_removed(&shape_id, (updated_at, participant_id)),
    }
    RemoteOutcome::Applied
}
