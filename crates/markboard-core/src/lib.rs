//! Markboard Core Library
//!
//! Annotation state and history engine for the collaborative whiteboard:
//! the shape model, the document store, batched undo/redo and the merging of
//! edits made by other participants.

pub mod clock;
pub mod config;
pub mod document;
pub mod history;
pub mod reconciler;
pub mod shapes;
pub mod storage;
pub mod viewport;
pub mod whiteboard;

pub use clock::LogicalClock;
pub use config::{ConfigError, EngineConfig};
pub use document::{Document, DocumentEvent};
pub use history::{BeginOutcome, HistoryEngine, HistoryEntry, DEFAULT_HISTORY_CAPACITY};
pub use reconciler::{MutationKind, Reconciler, ReconcilerStats, RemoteMutation, RemoteOutcome};
pub use shapes::{
    GeometricShape, GeometryKind, ParticipantId, Shape, ShapeId, ShapeKind, ShapeMap, ShapeStyle,
    Stroke, Text,
};
pub use viewport::Viewport;
pub use whiteboard::Whiteboard;
