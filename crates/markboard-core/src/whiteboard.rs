//! One open whiteboard: document, history and reconciler behind a single API.
//!
//! The input layer wraps each gesture in `begin_batch`/`commit_batch`; the
//! transport feeds [`Whiteboard::apply_remote_mutation`] and drains
//! [`Whiteboard::take_outgoing`]; the renderer drains
//! [`Whiteboard::take_events`].

use crate::config::EngineConfig;
use crate::document::{Document, DocumentEvent};
use crate::history::{BeginOutcome, HistoryEngine, HistoryEntry};
use crate::reconciler::{Reconciler, ReconcilerStats, RemoteMutation, RemoteOutcome};
use crate::shapes::{ParticipantId, Shape, ShapeId, ShapeMap};
use crate::viewport::Viewport;
use kurbo::{Point, Vec2};
use std::collections::BTreeSet;

pub struct Whiteboard {
    document: Document,
    history: HistoryEngine,
    reconciler: Reconciler,
    config: EngineConfig,
    /// Local mutations not yet handed to the transport.
    outgoing: Vec<RemoteMutation>,
    /// Ids mutated locally since the open batch began.
    batch_touched: BTreeSet<ShapeId>,
}

impl Whiteboard {
    pub fn new(participant: ParticipantId) -> Self {
        Self::with_config(participant, EngineConfig::default())
    }

    pub fn with_config(participant: ParticipantId, config: EngineConfig) -> Self {
        Self::from_document(Document::new(), participant, config)
    }

    /// Open an existing (e.g. loaded) document. History starts empty.
    pub fn from_document(mut document: Document, participant: ParticipantId, config: EngineConfig) -> Self {
        document.set_local_participant(participant.clone());
        let viewport = document.viewport().with_limits(config.min_zoom, config.max_zoom);
        document.set_viewport(viewport);
        document.take_events();
        Self {
            document,
            history: HistoryEngine::new(config.history_capacity, participant),
            reconciler: Reconciler::new(),
            config,
            outgoing: Vec::new(),
            batch_touched: BTreeSet::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Give up the document, e.g. to save it after closing.
    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn history(&self) -> &HistoryEngine {
        &self.history
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn participant(&self) -> &ParticipantId {
        self.document.local_participant()
    }

    pub fn reconciler_stats(&self) -> ReconcilerStats {
        self.reconciler.stats()
    }

    // --- Gestures ---

    /// Open a batch for one gesture.
    pub fn begin_batch(&mut self, label: impl Into<String>) -> BeginOutcome {
        let evicted = self.history.evicted_total();
        let outcome = self.history.begin_batch(
            label,
            self.document.snapshot(),
            self.document.clock().now(),
        );
        self.batch_touched.clear();
        if matches!(outcome, BeginOutcome::RecoveredStale { .. }) {
            self.after_commit(evicted);
        }
        outcome
    }

    /// Insert or replace a shape. Returns false for a retired id.
    pub fn put(&mut self, shape: Shape) -> bool {
        let id = shape.id().clone();
        if !self.document.put(shape) {
            return false;
        }
        self.record_local(&id);
        true
    }

    /// Soft-delete a visible shape.
    pub fn soft_delete(&mut self, id: &ShapeId) -> bool {
        if !self.document.soft_delete(id) {
            return false;
        }
        self.record_local(id);
        true
    }

    pub fn bring_to_front(&mut self, id: &ShapeId) -> bool {
        if !self.document.bring_to_front(id) {
            return false;
        }
        self.record_local(id);
        true
    }

    /// Soft-delete every visible shape as one undoable step.
    /// Returns the number of shapes deleted.
    pub fn clear(&mut self) -> usize {
        let owns_batch = !self.history.is_batch_open();
        if owns_batch {
            self.begin_batch("clear");
        }
        let ids: Vec<ShapeId> = self.document.shapes_ordered().iter().map(|s| s.id().clone()).collect();
        let deleted = ids.iter().filter(|id| self.soft_delete(id)).count();
        if owns_batch {
            self.commit_batch();
        }
        deleted
    }

    /// Close the open batch into an undo entry. False if none was open.
    pub fn commit_batch(&mut self) -> bool {
        let evicted = self.history.evicted_total();
        let committed = self
            .history
            .commit_batch(self.document.snapshot(), self.document.clock().now());
        if committed {
            self.batch_touched.clear();
            self.after_commit(evicted);
        }
        committed
    }

    /// Cancel the open batch, putting back the start state of every id the
    /// batch touched locally. Remote edits merged meanwhile are kept, as is a
    /// touched id whose current state came from another participant.
    pub fn rollback_batch(&mut self) -> bool {
        let Some(start) = self.history.rollback_batch() else {
            return false;
        };
        let touched = std::mem::take(&mut self.batch_touched);
        let local = self.document.local_participant().clone();
        for id in &touched {
            let locally_authored = self
                .document
                .get_including_deleted(id)
                .is_some_and(|s| s.updated_by() == &local);
            if !locally_authored {
                continue;
            }
            let removed = self.document.get_including_deleted(id).cloned();
            self.document.restore_entry(id, start.get(id).cloned());
            broadcast_restored(&mut self.document, &mut self.outgoing, id, removed.as_ref());
        }
        true
    }

    /// Undo the last local batch. An open batch is committed first.
    pub fn undo(&mut self) -> bool {
        self.close_open_batch("undo");
        let Some(entry) = self.history.undo(&mut self.document) else {
            return false;
        };
        broadcast_entry(&mut self.document, &mut self.outgoing, entry, &entry.after);
        true
    }

    /// Redo the last undone batch. An open batch is committed first, which
    /// clears the redo stack.
    pub fn redo(&mut self) -> bool {
        self.close_open_batch("redo");
        let Some(entry) = self.history.redo(&mut self.document) else {
            return false;
        };
        broadcast_entry(&mut self.document, &mut self.outgoing, entry, &entry.before);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // --- Remote ---

    /// Merge a mutation from another participant right away.
    pub fn apply_remote_mutation(&mut self, event: RemoteMutation) -> RemoteOutcome {
        self.reconciler
            .apply_remote_mutation(&mut self.document, &self.history, event)
    }

    /// Queue a mutation to be merged on the next [`Whiteboard::sync_remote`].
    pub fn enqueue_remote(&mut self, event: RemoteMutation) {
        self.reconciler.enqueue(event);
    }

    pub fn pending_remote(&self) -> usize {
        self.reconciler.pending()
    }

    /// Merge every queued remote mutation in arrival order.
    pub fn sync_remote(&mut self) -> Vec<RemoteOutcome> {
        self.reconciler.drain(&mut self.document, &self.history)
    }

    /// Local mutations to send to other participants, oldest first.
    pub fn take_outgoing(&mut self) -> Vec<RemoteMutation> {
        std::mem::take(&mut self.outgoing)
    }

    /// Change notifications for the renderer.
    pub fn take_events(&mut self) -> Vec<DocumentEvent> {
        self.document.take_events()
    }

    // --- View ---

    pub fn viewport(&self) -> &Viewport {
        self.document.viewport()
    }

    /// Replace the viewport; zoom is clamped to the configured limits.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        let viewport = viewport.with_limits(self.config.min_zoom, self.config.max_zoom);
        self.document.set_viewport(viewport);
    }

    pub fn pan(&mut self, delta: Vec2) {
        self.document.update_viewport(|v| v.pan_by(delta));
    }

    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        self.document.update_viewport(|v| v.zoom_at(screen_point, factor));
    }

    // --- Upkeep ---

    /// Physically remove soft-deleted shapes no retained history can bring
    /// back, retiring their ids. Returns the purged ids.
    pub fn compact(&mut self) -> Vec<ShapeId> {
        let horizon = self
            .history
            .horizon()
            .unwrap_or_else(|| self.document.clock().now());
        let live = self.history.live_ids();
        let purged = self
            .document
            .purge_deleted(|s| s.updated_at() <= horizon && !live.contains(s.id()));
        if !purged.is_empty() {
            self.history.purge(&purged);
            log::info!(
                "Compacted {} deleted shapes (horizon {})",
                purged.len(),
                horizon
            );
        }
        purged
    }

    fn record_local(&mut self, id: &ShapeId) {
        if self.history.is_batch_open() {
            self.batch_touched.insert(id.clone());
        }
        if let Some(shape) = self.document.get_including_deleted(id) {
            self.outgoing.push(RemoteMutation::from_shape(shape));
        }
    }

    fn close_open_batch(&mut self, action: &str) {
        if let Some(label) = self.history.batch_label() {
            log::warn!("Batch '{}' still open on {}; committing it", label, action);
            self.commit_batch();
        }
    }

    fn after_commit(&mut self, evicted_before: u64) {
        if self.config.auto_compact && self.history.evicted_total() > evicted_before {
            self.compact();
        }
    }
}

/// Queue the states an undo or redo put back. `removed_from` holds the state
/// an id had before it was physically removed.
fn broadcast_entry(
    document: &mut Document,
    outgoing: &mut Vec<RemoteMutation>,
    entry: &HistoryEntry,
    removed_from: &ShapeMap,
) {
    for id in &entry.changed {
        broadcast_restored(document, outgoing, id, removed_from.get(id));
    }
}

/// Restored states keep their recorded counters. The version they are sent
/// out with is fresh, and the document keeps it as the floor later remote
/// mutations of the id must beat, so every replica resolves them alike.
fn broadcast_restored(
    document: &mut Document,
    outgoing: &mut Vec<RemoteMutation>,
    id: &ShapeId,
    removed: Option<&Shape>,
) {
    let restored = match document.get_including_deleted(id) {
        Some(shape) => Some((shape.clone(), true)),
        None => removed.map(|shape| (shape.clone(), false)),
    };
    let Some((shape, present)) = restored else {
        return;
    };
    let local = document.local_participant().clone();
    let updated_at = document.stamp_restored(id);
    let event = if present {
        RemoteMutation::restore(shape, updated_at, local)
    } else {
        RemoteMutation::remove(shape, updated_at, local)
    };
    outgoing.push(event);
}
