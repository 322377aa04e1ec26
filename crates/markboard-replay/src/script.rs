//! Session scripts: a JSON array of steps replayed against a [`Whiteboard`].

use kurbo::{Point, Rect, Vec2};
use markboard_core::{
    BeginOutcome, GeometricShape, GeometryKind, RemoteMutation, RemoteOutcome, Shape, ShapeId,
    Stroke, Text, Whiteboard,
};
use serde::Deserialize;

/// One scripted action.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Begin { label: String },
    /// Put a fully specified shape.
    Put { shape: Shape },
    Stroke { id: String, points: Vec<(f64, f64)> },
    Text { id: String, at: (f64, f64), content: String },
    Geometry { id: String, kind: GeometryKind, from: (f64, f64), to: (f64, f64) },
    Delete { id: String },
    Commit,
    Rollback,
    Undo,
    Redo,
    /// A mutation delivered by the transport.
    Remote { mutation: RemoteMutation },
    Viewport {
        #[serde(default)]
        pan: Option<(f64, f64)>,
        #[serde(default)]
        zoom: Option<f64>,
    },
    Compact,
}

/// Tally of what a replay did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub steps: usize,
    pub recovered_batches: usize,
    pub ignored: usize,
    pub remote_applied: usize,
    pub remote_rejected: usize,
    pub compacted: usize,
}

pub fn parse(json: &str) -> serde_json::Result<Vec<Step>> {
    serde_json::from_str(json)
}

fn point((x, y): (f64, f64)) -> Point {
    Point::new(x, y)
}

impl Step {
    /// Apply to the board. Misuse (commit without a batch, undo on an empty
    /// stack) is counted as ignored, never fatal.
    pub fn apply(self, wb: &mut Whiteboard, report: &mut ReplayReport) {
        report.steps += 1;
        let done = match self {
            Step::Begin { label } => {
                if let BeginOutcome::RecoveredStale { .. } = wb.begin_batch(label) {
                    report.recovered_batches += 1;
                }
                true
            }
            Step::Put { shape } => wb.put(shape),
            Step::Stroke { id, points } => {
                wb.put(Stroke::from_points(id, points.into_iter().map(point).collect()).into())
            }
            Step::Text { id, at, content } => wb.put(Text::new(id, point(at), content).into()),
            Step::Geometry { id, kind, from, to } => {
                let (from, to) = (point(from), point(to));
                let bounds = Rect::new(from.x, from.y, to.x, to.y);
                wb.put(GeometricShape::new(id, kind, bounds).into())
            }
            Step::Delete { id } => wb.soft_delete(&ShapeId::from(id)),
            Step::Commit => wb.commit_batch(),
            Step::Rollback => wb.rollback_batch(),
            Step::Undo => wb.undo(),
            Step::Redo => wb.redo(),
            Step::Remote { mutation } => {
                match wb.apply_remote_mutation(mutation) {
                    RemoteOutcome::Applied => report.remote_applied += 1,
                    RemoteOutcome::Stale => {}
                    RemoteOutcome::Retired | RemoteOutcome::Malformed => report.remote_rejected += 1,
                }
                true
            }
            Step::Viewport { pan, zoom } => {
                let mut viewport = *wb.viewport();
                if let Some((x, y)) = pan {
                    viewport.pan = Vec2::new(x, y);
                }
                if let Some(zoom) = zoom {
                    viewport.zoom = zoom;
                }
                wb.set_viewport(viewport);
                true
            }
            Step::Compact => {
                report.compacted += wb.compact().len();
                true
            }
        };
        if !done {
            report.ignored += 1;
        }
    }
}

/// Replay every step in order.
pub fn run(steps: Vec<Step>, wb: &mut Whiteboard) -> ReplayReport {
    let mut report = ReplayReport::default();
    for step in steps {
        log::debug!("Replaying {:?}", step);
        step.apply(wb, &mut report);
    }
    report
}
