//! Document store: the authoritative shape state of one whiteboard.

use crate::clock::LogicalClock;
use crate::shapes::{ParticipantId, Shape, ShapeId, ShapeMap};
use crate::viewport::Viewport;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Change notification for the renderer and the autosaver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// A shape was inserted or replaced (and is visible).
    ShapeChanged(ShapeId),
    /// A shape is now soft-deleted.
    ShapeDeleted(ShapeId),
    /// A shape was physically removed (undo of a creation, compaction).
    ShapeRemoved(ShapeId),
    /// The whole shape map was replaced.
    Reset,
    ViewportChanged,
}

/// A whiteboard document containing all shapes and the viewport.
///
/// Soft-deleted shapes stay in the map so that history snapshots taken
/// before the delete remain valid. Ids are never reused: once compaction
/// purges a shape its id is retired for good.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier.
    pub id: String,
    /// Document name.
    pub name: String,
    shapes: ShapeMap,
    #[serde(default)]
    viewport: Viewport,
    #[serde(default)]
    clock: LogicalClock,
    /// Logical time of the last mutation.
    #[serde(default)]
    updated_at: u64,
    #[serde(default = "first_z")]
    next_z: u64,
    #[serde(default)]
    retired: BTreeSet<ShapeId>,
    /// Versions restored states were sent out with, where they exceed the
    /// stored shape's own counters (or the id is no longer stored).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    version_floors: BTreeMap<ShapeId, (u64, ParticipantId)>,
    #[serde(skip)]
    local_participant: ParticipantId,
    #[serde(skip)]
    revision: u64,
    #[serde(skip)]
    events: Vec<DocumentEvent>,
}

fn first_z() -> u64 {
    1
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: "Untitled".to_string(),
            shapes: ShapeMap::new(),
            viewport: Viewport::default(),
            clock: LogicalClock::new(),
            updated_at: 0,
            next_z: first_z(),
            retired: BTreeSet::new(),
            version_floors: BTreeMap::new(),
            local_participant: ParticipantId::default(),
            revision: 0,
            events: Vec::new(),
        }
    }

    /// Create a document edited by the given participant.
    pub fn with_participant(participant: ParticipantId) -> Self {
        let mut doc = Self::new();
        doc.local_participant = participant;
        doc
    }

    pub fn local_participant(&self) -> &ParticipantId {
        &self.local_participant
    }

    /// Set the participant that authors local mutations (after loading a document).
    pub fn set_local_participant(&mut self, participant: ParticipantId) {
        self.local_participant = participant;
    }

    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    /// Logical time of the last mutation applied to this document.
    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// Number of mutations applied since this instance was created or loaded.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Drain pending change notifications.
    pub fn take_events(&mut self) -> Vec<DocumentEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Lookup ---

    /// Get a visible shape by ID; soft-deleted shapes are not found.
    pub fn get(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(id).filter(|s| !s.is_deleted())
    }

    /// Get a shape by ID, soft-deleted or not.
    pub fn get_including_deleted(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    /// Whether the id has ever been stored here (including retired ids).
    pub fn is_known(&self, id: &ShapeId) -> bool {
        self.shapes.contains_key(id)
            || self.retired.contains(id)
            || self.version_floors.contains_key(id)
    }

    pub fn is_retired(&self, id: &ShapeId) -> bool {
        self.retired.contains(id)
    }

    /// The version a remote mutation of `id` has to beat: the stored shape's
    /// `(updated_at, updated_by)`, or the later version its restored state
    /// was sent out with.
    pub fn version(&self, id: &ShapeId) -> Option<(u64, &ParticipantId)> {
        let stored = self.shapes.get(id).map(|s| s.meta().version());
        let floor = self.version_floors.get(id).map(|(at, by)| (*at, by));
        stored.max(floor)
    }

    /// The raw shape map, soft-deleted entries included.
    pub fn shapes(&self) -> &ShapeMap {
        &self.shapes
    }

    /// Visible shapes in paint order (back to front).
    pub fn shapes_ordered(&self) -> Vec<&Shape> {
        let mut shapes: Vec<&Shape> = self.shapes.values().filter(|s| !s.is_deleted()).collect();
        shapes.sort_by(|a, b| (a.z_order(), a.id()).cmp(&(b.z_order(), b.id())));
        shapes
    }

    /// All shapes in paint order, soft-deleted ones included (export, history tooling).
    pub fn shapes_ordered_including_deleted(&self) -> Vec<&Shape> {
        let mut shapes: Vec<&Shape> = self.shapes.values().collect();
        shapes.sort_by(|a, b| (a.z_order(), a.id()).cmp(&(b.z_order(), b.id())));
        shapes
    }

    /// Find visible shapes at a point (in world coordinates), front to back.
    pub fn shapes_at_point(&self, point: Point, tolerance: f64) -> Vec<ShapeId> {
        self.shapes_ordered()
            .into_iter()
            .rev()
            .filter(|s| s.hit_test(point, tolerance))
            .map(|s| s.id().clone())
            .collect()
    }

    /// Find visible shapes that intersect a rectangle, back to front.
    pub fn shapes_in_rect(&self, rect: Rect) -> Vec<ShapeId> {
        self.shapes_ordered()
            .into_iter()
            .filter(|s| s.intersects_rect(rect))
            .map(|s| s.id().clone())
            .collect()
    }

    /// Bounding box of all visible shapes.
    pub fn bounds(&self) -> Option<Rect> {
        self.shapes
            .values()
            .filter(|s| !s.is_deleted())
            .map(Shape::bounds)
            .reduce(|acc, b| acc.union(b))
    }

    /// Number of visible shapes.
    pub fn len(&self) -> usize {
        self.shapes.values().filter(|s| !s.is_deleted()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Local mutation ---

    /// Insert or replace a shape by id.
    ///
    /// A new id gets the next z-order slot and, when unset, the local
    /// participant as creator. Replacing keeps the stored z-order and creator.
    /// The shape is stamped with a fresh logical time authored by the local
    /// participant. Returns false only for an id retired by compaction.
    pub fn put(&mut self, mut shape: Shape) -> bool {
        let id = shape.id().clone();
        if self.retired.contains(&id) {
            log::warn!("Ignoring put on retired shape id {}", id);
            return false;
        }

        let existing = self
            .shapes
            .get(&id)
            .map(|s| (s.z_order(), s.created_by().clone()));
        let z_order = match &existing {
            Some((z, _)) => *z,
            None => self.allocate_z(),
        };
        let updated_at = self.clock.tick();

        let meta = shape.meta_mut();
        meta.z_order = z_order;
        match existing {
            Some((_, created_by)) => meta.created_by = created_by,
            None if meta.created_by.is_empty() => {
                meta.created_by = self.local_participant.clone();
            }
            None => {}
        }
        meta.updated_at = updated_at;
        meta.updated_by = self.local_participant.clone();

        let event = if shape.is_deleted() {
            DocumentEvent::ShapeDeleted(id.clone())
        } else {
            DocumentEvent::ShapeChanged(id.clone())
        };
        self.version_floors.remove(&id);
        self.shapes.insert(id, shape);
        self.touch(updated_at, event);
        true
    }

    /// Mark a shape as deleted without removing its data.
    /// Returns false if the id is unknown or already deleted.
    pub fn soft_delete(&mut self, id: &ShapeId) -> bool {
        let Some(shape) = self.shapes.get_mut(id) else {
            return false;
        };
        if shape.is_deleted() {
            return false;
        }
        let updated_at = self.clock.tick();
        let meta = shape.meta_mut();
        meta.deleted = true;
        meta.updated_at = updated_at;
        meta.updated_by = self.local_participant.clone();
        self.version_floors.remove(id);
        self.touch(updated_at, DocumentEvent::ShapeDeleted(id.clone()));
        true
    }

    /// Move a shape above every other shape.
    pub fn bring_to_front(&mut self, id: &ShapeId) -> bool {
        if !self.shapes.contains_key(id) {
            return false;
        }
        let z_order = self.allocate_z();
        let updated_at = self.clock.tick();
        let Some(shape) = self.shapes.get_mut(id) else {
            return false;
        };
        let meta = shape.meta_mut();
        meta.z_order = z_order;
        meta.updated_at = updated_at;
        meta.updated_by = self.local_participant.clone();
        self.version_floors.remove(id);
        self.touch(updated_at, DocumentEvent::ShapeChanged(id.clone()));
        true
    }

    // --- Viewport (not tracked by history) ---

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.notify(DocumentEvent::ViewportChanged);
    }

    /// Modify the viewport in place.
    pub fn update_viewport(&mut self, f: impl FnOnce(&mut Viewport)) {
        f(&mut self.viewport);
        self.notify(DocumentEvent::ViewportChanged);
    }

    // --- History support ---

    /// Structural copy of the shape map.
    pub fn snapshot(&self) -> ShapeMap {
        self.shapes.clone()
    }

    /// Replace the whole shape map without restamping anything.
    pub fn restore(&mut self, shapes: ShapeMap) {
        for shape in shapes.values() {
            self.next_z = self.next_z.max(shape.z_order() + 1);
        }
        self.shapes = shapes;
        self.notify(DocumentEvent::Reset);
    }

    /// Put back the recorded state of one id, or remove it when the recorded
    /// state is absent. The shape keeps its recorded counters.
    pub fn restore_entry(&mut self, id: &ShapeId, state: Option<Shape>) {
        match state {
            Some(shape) => {
                self.next_z = self.next_z.max(shape.z_order() + 1);
                let event = if shape.is_deleted() {
                    DocumentEvent::ShapeDeleted(id.clone())
                } else {
                    DocumentEvent::ShapeChanged(id.clone())
                };
                self.shapes.insert(id.clone(), shape);
                self.notify(event);
            }
            None => {
                if self.shapes.remove(id).is_some() {
                    self.notify(DocumentEvent::ShapeRemoved(id.clone()));
                }
            }
        }
    }

    // --- Remote path ---

    /// Store a shape produced by another replica, keeping its counters.
    ///
    /// Conflict policy lives in the reconciler; this only applies the state
    /// and folds the remote counters into the local clock and z allocator.
    pub(crate) fn apply_remote(&mut self, shape: Shape) {
        let version = (shape.updated_at(), shape.updated_by().clone());
        self.store_remote(shape, version);
    }

    /// Store a state another replica put back by undo, redo or rollback.
    /// The shape keeps its recorded counters; `version` guards it.
    pub(crate) fn apply_restored(&mut self, shape: Shape, version: (u64, ParticipantId)) {
        self.store_remote(shape, version);
    }

    /// Physically remove a shape another replica's undo removed.
    pub(crate) fn apply_removed(&mut self, id: &ShapeId, (updated_at, by): (u64, ParticipantId)) {
        self.clock.observe(updated_at);
        self.updated_at = self.updated_at.max(updated_at);
        if self.shapes.remove(id).is_some() {
            self.notify(DocumentEvent::ShapeRemoved(id.clone()));
        }
        self.raise_floor(id.clone(), updated_at, by);
    }

    /// Stamp the state just restored for `id` (or its removal) with a fresh
    /// local version, the one sent to other replicas. Returns the new time.
    pub(crate) fn stamp_restored(&mut self, id: &ShapeId) -> u64 {
        let updated_at = self.clock.tick();
        self.updated_at = updated_at;
        self.raise_floor(id.clone(), updated_at, self.local_participant.clone());
        updated_at
    }

    fn store_remote(&mut self, mut shape: Shape, (updated_at, by): (u64, ParticipantId)) {
        let id = shape.id().clone();
        self.clock.observe(updated_at);
        if shape.z_order() == 0 {
            // Sender left the slot unassigned
            let z_order = match self.shapes.get(&id) {
                Some(existing) => existing.z_order(),
                None => self.allocate_z(),
            };
            shape.meta_mut().z_order = z_order;
        }
        self.next_z = self.next_z.max(shape.z_order() + 1);
        let event = if shape.is_deleted() {
            DocumentEvent::ShapeDeleted(id.clone())
        } else {
            DocumentEvent::ShapeChanged(id.clone())
        };
        self.shapes.insert(id.clone(), shape);
        self.raise_floor(id, updated_at, by);
        self.touch(updated_at.max(self.updated_at), event);
    }

    /// Record `version` for `id`, keeping it only while it is above the
    /// stored shape's own counters.
    fn raise_floor(&mut self, id: ShapeId, updated_at: u64, by: ParticipantId) {
        let above_stored = self
            .shapes
            .get(&id)
            .is_none_or(|s| s.meta().version() < (updated_at, &by));
        if above_stored {
            self.version_floors.insert(id, (updated_at, by));
        } else {
            self.version_floors.remove(&id);
        }
    }

    // --- Compaction ---

    /// Physically remove soft-deleted shapes last touched before `horizon`
    /// and retire their ids. Returns the purged ids in sorted order.
    pub fn purge_deleted_before(&mut self, horizon: u64) -> Vec<ShapeId> {
        self.purge_deleted(|shape| shape.updated_at() < horizon)
    }

    /// Physically remove the soft-deleted shapes `can_purge` accepts and
    /// retire their ids. Returns the purged ids in sorted order.
    pub fn purge_deleted(&mut self, mut can_purge: impl FnMut(&Shape) -> bool) -> Vec<ShapeId> {
        let mut purged: Vec<ShapeId> = self
            .shapes
            .values()
            .filter(|s| s.is_deleted() && can_purge(s))
            .map(|s| s.id().clone())
            .collect();
        purged.sort();

        for id in &purged {
            self.shapes.remove(id);
            self.version_floors.remove(id);
            self.retired.insert(id.clone());
            self.notify(DocumentEvent::ShapeRemoved(id.clone()));
        }
        purged
    }

    // --- Serialization ---

    /// Serialize the document to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a document from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn allocate_z(&mut self) -> u64 {
        let z = self.next_z;
        self.next_z += 1;
        z
    }

    fn touch(&mut self, updated_at: u64, event: DocumentEvent) {
        self.updated_at = updated_at;
        self.notify(event);
    }

    fn notify(&mut self, event: DocumentEvent) {
        self.revision += 1;
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{GeometricShape, Stroke, Text};

    fn doc() -> Document {
        Document::with_participant(ParticipantId::from("alice"))
    }

    fn stroke(id: &str) -> Shape {
        Stroke::from_points(id, vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)]).into()
    }

    #[test]
    fn test_document_creation() {
        let doc = Document::new();
        assert!(doc.is_empty());
        assert_eq!(doc.updated_at(), 0);
    }

    #[test]
    fn test_put_stamps_common_fields() {
        let mut doc = doc();
        assert!(doc.put(stroke("s1")));
        assert!(doc.put(stroke("s2")));

        let s1 = doc.get(&"s1".into()).unwrap();
        let s2 = doc.get(&"s2".into()).unwrap();
        assert_eq!(s1.created_by().as_str(), "alice");
        assert_eq!(s1.updated_by().as_str(), "alice");
        assert!(s2.z_order() > s1.z_order());
        assert!(s2.updated_at() > s1.updated_at());
        assert_eq!(doc.updated_at(), s2.updated_at());
    }

    #[test]
    fn test_replace_keeps_z_order_and_creator() {
        let mut doc = doc();
        doc.put(stroke("s1"));
        doc.put(stroke("s2"));
        let z = doc.get(&"s1".into()).unwrap().z_order();

        let mut replacement = Stroke::from_points("s1", vec![Point::new(5.0, 5.0)]);
        replacement.meta.created_by = ParticipantId::from("mallory");
        doc.put(replacement.into());

        let s1 = doc.get(&"s1".into()).unwrap();
        assert_eq!(s1.z_order(), z);
        assert_eq!(s1.created_by().as_str(), "alice");
        assert_eq!(s1.points(), vec![Point::new(5.0, 5.0)]);
    }

    #[test]
    fn test_soft_delete_retains_shape() {
        let mut doc = doc();
        doc.put(Text::new("t1", Point::new(1.0, 2.0), "note").into());
        assert!(doc.soft_delete(&"t1".into()));

        assert!(doc.get(&"t1".into()).is_none());
        let t1 = doc.get_including_deleted(&"t1".into()).unwrap();
        assert!(t1.is_deleted());
        assert_eq!(t1.content(), Some("note"));
        assert!(doc.is_empty());

        // Already deleted, unknown
        assert!(!doc.soft_delete(&"t1".into()));
        assert!(!doc.soft_delete(&"missing".into()));
    }

    #[test]
    fn test_shapes_ordered_by_z() {
        let mut doc = doc();
        doc.put(stroke("a"));
        doc.put(stroke("b"));
        doc.put(stroke("c"));
        doc.soft_delete(&"b".into());
        doc.bring_to_front(&"a".into());

        let ids: Vec<&str> = doc.shapes_ordered().iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(doc.shapes_ordered_including_deleted().len(), 3);
    }

    #[test]
    fn test_shapes_at_point_front_first() {
        let mut doc = doc();
        let mut back = GeometricShape::rectangle("back", Rect::new(0.0, 0.0, 100.0, 100.0));
        back.style.fill_color = Some(crate::shapes::SerializableColor::white());
        let mut front = GeometricShape::rectangle("front", Rect::new(50.0, 50.0, 150.0, 150.0));
        front.style.fill_color = Some(crate::shapes::SerializableColor::white());
        doc.put(back.into());
        doc.put(front.into());

        let hits = doc.shapes_at_point(Point::new(75.0, 75.0), 0.0);
        assert_eq!(hits, vec![ShapeId::from("front"), ShapeId::from("back")]);

        let hits = doc.shapes_at_point(Point::new(25.0, 25.0), 0.0);
        assert_eq!(hits, vec![ShapeId::from("back")]);
    }

    #[test]
    fn test_shapes_in_rect_back_first() {
        let mut doc = doc();
        doc.put(stroke("near"));
        doc.put(Stroke::from_points("far", vec![Point::new(500.0, 500.0), Point::new(510.0, 510.0)]).into());
        doc.put(stroke("gone"));
        doc.put(Text::new("label", Point::new(2.0, 2.0), "x").into());
        doc.soft_delete(&"gone".into());

        let hits = doc.shapes_in_rect(Rect::new(-5.0, -5.0, 20.0, 20.0));
        assert_eq!(hits, vec![ShapeId::from("near"), ShapeId::from("label")]);
        assert!(doc.shapes_in_rect(Rect::new(1000.0, 1000.0, 1010.0, 1010.0)).is_empty());
    }

    #[test]
    fn test_viewport_change_is_not_a_shape_mutation() {
        let mut doc = doc();
        doc.put(stroke("s1"));
        let before = doc.updated_at();
        let mut viewport = Viewport::new();
        viewport.zoom = 2.0;
        doc.set_viewport(viewport);
        assert_eq!(doc.updated_at(), before);
        assert!((doc.viewport().zoom - 2.0).abs() < f64::EPSILON);
        assert_eq!(doc.take_events().last(), Some(&DocumentEvent::ViewportChanged));
    }

    #[test]
    fn test_restore_entry_removes_absent_state() {
        let mut doc = doc();
        doc.put(stroke("s1"));
        doc.restore_entry(&"s1".into(), None);
        assert!(doc.get_including_deleted(&"s1".into()).is_none());
    }

    #[test]
    fn test_restored_state_version_floor() {
        let mut doc = doc();
        doc.put(stroke("s1"));
        let recorded = doc.get(&"s1".into()).cloned();
        doc.put(Stroke::from_points("s1", vec![Point::new(4.0, 4.0)]).into());

        doc.restore_entry(&"s1".into(), recorded.clone());
        let sent_at = doc.stamp_restored(&"s1".into());
        assert_eq!(doc.get(&"s1".into()).cloned(), recorded);
        assert_eq!(doc.version(&"s1".into()), Some((sent_at, &ParticipantId::from("alice"))));

        let loaded = Document::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(loaded.version(&"s1".into()), doc.version(&"s1".into()));

        // A local edit is newer than the floor and replaces it
        doc.put(stroke("s1"));
        let s1 = doc.get(&"s1".into()).unwrap();
        assert_eq!(doc.version(&"s1".into()), Some(s1.meta().version()));

        doc.restore_entry(&"s1".into(), None);
        let removed_at = doc.stamp_restored(&"s1".into());
        assert_eq!(doc.version(&"s1".into()).map(|(at, _)| at), Some(removed_at));
        assert!(doc.is_known(&"s1".into()));
    }

    #[test]
    fn test_purge_retires_ids() {
        let mut doc = doc();
        doc.put(stroke("s1"));
        doc.put(stroke("s2"));
        doc.soft_delete(&"s1".into());
        let horizon = doc.clock().now() + 1;

        let purged = doc.purge_deleted_before(horizon);
        assert_eq!(purged, vec![ShapeId::from("s1")]);
        assert!(doc.is_retired(&"s1".into()));
        assert!(doc.get(&"s2".into()).is_some());

        // Retired ids are never reused
        assert!(!doc.put(stroke("s1")));
        assert!(doc.get_including_deleted(&"s1".into()).is_none());
    }

    #[test]
    fn test_events_are_drained() {
        let mut doc = doc();
        doc.put(stroke("s1"));
        doc.soft_delete(&"s1".into());
        assert_eq!(
            doc.take_events(),
            vec![
                DocumentEvent::ShapeChanged("s1".into()),
                DocumentEvent::ShapeDeleted("s1".into())
            ]
        );
        assert!(doc.take_events().is_empty());
        assert_eq!(doc.revision(), 2);
    }

    #[test]
    fn test_json_roundtrip_keeps_shapes_and_clock() {
        let mut doc = doc();
        doc.name = "Desk".to_string();
        doc.put(stroke("s1"));
        doc.soft_delete(&"s1".into());

        let loaded = Document::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(loaded.name, "Desk");
        assert_eq!(loaded.shapes(), doc.shapes());
        assert_eq!(loaded.clock().now(), doc.clock().now());
    }
}
