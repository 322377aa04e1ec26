//! Undo/redo history with coalesced batches.
//!
//! A batch groups every mutation of one user gesture into a single undo unit.
//! At most one batch is open per document. Committing records the shape map
//! before and after the batch; undo and redo put back the recorded states of
//! the ids the local participant changed, so edits merged from other
//! participants in the meantime survive.

use crate::document::Document;
use crate::shapes::{ParticipantId, ShapeId, ShapeMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Maximum number of undo entries to keep.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// One undo/redo unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub label: String,
    /// Shape map when the batch opened.
    pub before: ShapeMap,
    /// Shape map when the batch was committed.
    pub after: ShapeMap,
    /// Logical time the batch opened.
    pub started_at: u64,
    /// Logical time of the commit.
    pub logical_time: u64,
    /// Ids whose state the local participant changed within the batch.
    pub changed: Vec<ShapeId>,
}

impl HistoryEntry {
    fn from_batch(batch: Batch, after: ShapeMap, logical_time: u64, local: &ParticipantId) -> Self {
        let changed = local_changes(&batch.start_snapshot, &after, local);
        Self {
            label: batch.label,
            before: batch.start_snapshot,
            after,
            started_at: batch.started_at,
            logical_time,
            changed,
        }
    }

    /// The batch did not change anything the local participant authored.
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Ids that differ between the two maps where the new state is local work.
///
/// A state authored by someone else is left out: undo must never rewind
/// another participant's edit, even when it landed inside a local batch.
/// Local edits never remove an id, so one missing afterwards was removed by
/// another participant's undo.
fn local_changes(before: &ShapeMap, after: &ShapeMap, local: &ParticipantId) -> Vec<ShapeId> {
    let ids: BTreeSet<&ShapeId> = before.keys().chain(after.keys()).collect();
    ids.into_iter()
        .filter(|id| {
            let old = before.get(*id);
            let new = after.get(*id);
            old != new && new.is_some_and(|s| s.updated_by() == local)
        })
        .cloned()
        .collect()
}

/// In-progress batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub label: String,
    pub start_snapshot: ShapeMap,
    pub started_at: u64,
}

/// Result of opening a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    Opened,
    /// A batch was still open; it was committed before the new one opened.
    RecoveredStale { label: String },
}

/// Per-document undo/redo engine.
#[derive(Debug, Clone)]
pub struct HistoryEngine {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    batch: Option<Batch>,
    capacity: usize,
    local: ParticipantId,
    evicted_total: u64,
}

impl HistoryEngine {
    /// Create an engine recording edits authored by `local`.
    pub fn new(capacity: usize, local: ParticipantId) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            batch: None,
            capacity: capacity.max(1),
            local,
            evicted_total: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    // --- Batches ---

    /// Open a batch. A batch left open by an interrupted gesture is committed
    /// first rather than rejected.
    pub fn begin_batch(&mut self, label: impl Into<String>, snapshot: ShapeMap, now: u64) -> BeginOutcome {
        let label = label.into();
        let outcome = match self.batch.as_ref() {
            Some(stale) => {
                let stale_label = stale.label.clone();
                log::warn!(
                    "Batch '{}' still open when '{}' began; committing it",
                    stale_label,
                    label
                );
                self.commit_batch(snapshot.clone(), now);
                BeginOutcome::RecoveredStale { label: stale_label }
            }
            None => BeginOutcome::Opened,
        };

        log::debug!("Batch '{}' opened at {}", label, now);
        self.batch = Some(Batch {
            label,
            start_snapshot: snapshot,
            started_at: now,
        });
        outcome
    }

    /// Close the open batch into a history entry.
    /// Returns false (and does nothing) if no batch is open.
    pub fn commit_batch(&mut self, snapshot: ShapeMap, now: u64) -> bool {
        let Some(batch) = self.batch.take() else {
            return false;
        };
        let entry = HistoryEntry::from_batch(batch, snapshot, now, &self.local);
        log::debug!(
            "Batch '{}' committed at {} ({} shapes changed)",
            entry.label,
            now,
            entry.changed.len()
        );
        self.redo_stack.clear();
        self.push_undo(entry);
        true
    }

    /// Discard the open batch, returning its start snapshot.
    /// The caller restores the document; the engine never mutates it here.
    pub fn rollback_batch(&mut self) -> Option<ShapeMap> {
        let batch = self.batch.take()?;
        log::debug!("Batch '{}' rolled back", batch.label);
        Some(batch.start_snapshot)
    }

    pub fn is_batch_open(&self) -> bool {
        self.batch.is_some()
    }

    pub fn batch(&self) -> Option<&Batch> {
        self.batch.as_ref()
    }

    pub fn batch_label(&self) -> Option<&str> {
        self.batch.as_ref().map(|b| b.label.as_str())
    }

    // --- Undo/redo ---

    /// Undo the most recent entry, putting back the pre-batch state of the
    /// ids it changed. Returns the entry, now on the redo stack.
    pub fn undo(&mut self, doc: &mut Document) -> Option<&HistoryEntry> {
        self.close_open_batch(doc, "undo");
        let entry = self.undo_stack.pop_back()?;
        for id in &entry.changed {
            doc.restore_entry(id, entry.before.get(id).cloned());
        }
        log::debug!("Undo '{}'", entry.label);
        self.redo_stack.push(entry);
        self.redo_stack.last()
    }

    /// Redo the most recently undone entry. Returns the entry, now back on
    /// the undo stack.
    pub fn redo(&mut self, doc: &mut Document) -> Option<&HistoryEntry> {
        self.close_open_batch(doc, "redo");
        let entry = self.redo_stack.pop()?;
        for id in &entry.changed {
            doc.restore_entry(id, entry.after.get(id).cloned());
        }
        log::debug!("Redo '{}'", entry.label);
        self.undo_stack.push_back(entry);
        self.undo_stack.back()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Entries on the undo stack, oldest first.
    pub fn undo_entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.undo_stack.iter()
    }

    /// Number of entries dropped because the undo stack was full.
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total
    }

    /// Drop all history, including an open batch.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.batch = None;
    }

    // --- Compaction support ---

    /// Oldest logical time any retained snapshot was taken at.
    pub fn horizon(&self) -> Option<u64> {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(|e| e.started_at)
            .chain(self.batch.iter().map(|b| b.started_at))
            .min()
    }

    /// Ids present and not deleted in any retained snapshot; undo or redo
    /// could still bring these back.
    pub fn live_ids(&self) -> BTreeSet<ShapeId> {
        let entries = self.undo_stack.iter().chain(self.redo_stack.iter());
        let snapshots = entries
            .flat_map(|e| [&e.before, &e.after])
            .chain(self.batch.iter().map(|b| &b.start_snapshot));
        snapshots
            .flat_map(|map| map.values())
            .filter(|s| !s.is_deleted())
            .map(|s| s.id().clone())
            .collect()
    }

    /// Forget compacted ids in every retained snapshot.
    pub fn purge(&mut self, ids: &[ShapeId]) {
        if ids.is_empty() {
            return;
        }
        for entry in self.undo_stack.iter_mut().chain(self.redo_stack.iter_mut()) {
            for id in ids {
                entry.before.remove(id);
                entry.after.remove(id);
            }
            entry.changed.retain(|id| !ids.contains(id));
        }
        if let Some(batch) = self.batch.as_mut() {
            for id in ids {
                batch.start_snapshot.remove(id);
            }
        }
    }

    fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo_stack.push_back(entry);
        while self.undo_stack.len() > self.capacity {
            if let Some(evicted) = self.undo_stack.pop_front() {
                self.evicted_total += 1;
                log::info!(
                    "History full ({} entries); dropped oldest entry '{}'",
                    self.capacity,
                    evicted.label
                );
            }
        }
    }

    fn close_open_batch(&mut self, doc: &Document, action: &str) {
        if let Some(label) = self.batch_label() {
            log::warn!("Batch '{}' still open on {}; committing it", label, action);
            self.commit_batch(doc.snapshot(), doc.clock().now());
        }
    }
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, ParticipantId::default())
    }
}
