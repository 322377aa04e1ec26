//! Shape definitions for the whiteboard.
//!
//! A [`Shape`] is a closed sum over the three annotation variants. Code that
//! walks mixed collections (selection, hit-testing, export) goes through the
//! capability queries on [`Shape`] instead of matching on the variant at every
//! call site; a query a variant cannot answer returns an empty or neutral value.

mod geometric;
mod stroke;
mod text;

pub use geometric::{GeometricShape, GeometryKind};
pub use stroke::Stroke;
pub use text::Text;

use kurbo::{Affine, Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Style properties shared by every shape variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    /// Stroke color.
    pub stroke_color: SerializableColor,
    /// Stroke width.
    pub stroke_width: f64,
    /// Fill color (None = no fill).
    #[serde(default)]
    pub fill_color: Option<SerializableColor>,
    /// Overall opacity (0.0 = fully transparent, 1.0 = fully opaque).
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl ShapeStyle {
    /// Get the stroke color as a peniko Color.
    pub fn stroke(&self) -> Color {
        self.stroke_color.into()
    }

    /// Get the fill color as a peniko Color.
    pub fn fill(&self) -> Option<Color> {
        self.fill_color.map(|c| c.into())
    }

    /// Set the stroke color from a peniko Color.
    pub fn set_stroke(&mut self, color: Color) {
        self.stroke_color = color.into();
    }

    /// Set the fill color from a peniko Color.
    pub fn set_fill(&mut self, color: Option<Color>) {
        self.fill_color = color.map(|c| c.into());
    }
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            stroke_width: 2.0,
            fill_color: None,
            opacity: 1.0,
        }
    }
}

/// Unique identifier for shapes.
///
/// Assigned once at creation and never reused within a document, even after
/// the shape is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ShapeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ShapeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a participant in a whiteboard session.
///
/// Ordering is used as the final tie-break between concurrent writes, so it
/// must be identical on every replica (plain byte-wise string order).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty participant id means "not assigned yet".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping from shape id to shape state; the unit captured by history snapshots.
pub type ShapeMap = HashMap<ShapeId, Shape>;

/// Fields common to every shape variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeMeta {
    pub(crate) id: ShapeId,
    /// Participant that created the shape.
    #[serde(default)]
    pub created_by: ParticipantId,
    /// Insertion counter; paint and selection order.
    #[serde(default)]
    pub z_order: u64,
    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,
    /// Logical time of the last mutation.
    #[serde(default)]
    pub updated_at: u64,
    /// Participant that authored the current state.
    #[serde(default)]
    pub updated_by: ParticipantId,
}

impl ShapeMeta {
    /// Fresh metadata for a shape that has not been stored yet.
    pub fn new(id: ShapeId) -> Self {
        Self {
            id,
            created_by: ParticipantId::default(),
            z_order: 0,
            deleted: false,
            updated_at: 0,
            updated_by: ParticipantId::default(),
        }
    }

    pub fn id(&self) -> &ShapeId {
        &self.id
    }

    /// Ordering key used to resolve concurrent writes to the same id.
    pub fn version(&self) -> (u64, &ParticipantId) {
        (self.updated_at, &self.updated_by)
    }
}

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = kurbo::Vec2::new(b.x - a.x, b.y - a.y);
    let pv = kurbo::Vec2::new(point.x - a.x, point.y - a.y);
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = Point::new(a.x + t * seg.x, a.y + t * seg.y);
    ((point.x - proj.x).powi(2) + (point.y - proj.y).powi(2)).sqrt()
}

/// Minimum distance from a point to a polyline (sequence of connected segments).
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Common trait for all shape variants.
pub trait ShapeTrait {
    /// Common metadata.
    fn meta(&self) -> &ShapeMeta;

    /// Mutable common metadata (the id itself stays read-only).
    fn meta_mut(&mut self) -> &mut ShapeMeta;

    /// Get the bounding box in world coordinates.
    fn bounds(&self) -> Rect;

    /// Check if a point (in world coordinates) hits this shape.
    fn hit_test(&self, point: Point, tolerance: f64) -> bool;

    /// Get the style.
    fn style(&self) -> &ShapeStyle;

    /// Get mutable style.
    fn style_mut(&mut self) -> &mut ShapeStyle;

    /// Apply a transform to this shape.
    fn transform(&mut self, affine: Affine);

    /// Get the unique identifier.
    fn id(&self) -> &ShapeId {
        &self.meta().id
    }
}

/// Variant tag of a [`Shape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Stroke,
    Text,
    Geometric,
}

impl ShapeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Stroke => "stroke",
            ShapeKind::Text => "text",
            ShapeKind::Geometric => "geometric",
        }
    }
}

/// An annotation on the whiteboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Stroke(Stroke),
    Text(Text),
    Geometric(GeometricShape),
}

impl From<Stroke> for Shape {
    fn from(stroke: Stroke) -> Self {
        Shape::Stroke(stroke)
    }
}

impl From<Text> for Shape {
    fn from(text: Text) -> Self {
        Shape::Text(text)
    }
}

impl From<GeometricShape> for Shape {
    fn from(shape: GeometricShape) -> Self {
        Shape::Geometric(shape)
    }
}

impl Shape {
    /// Variant tag.
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Stroke(_) => ShapeKind::Stroke,
            Shape::Text(_) => ShapeKind::Text,
            Shape::Geometric(_) => ShapeKind::Geometric,
        }
    }

    fn as_trait(&self) -> &dyn ShapeTrait {
        match self {
            Shape::Stroke(s) => s,
            Shape::Text(s) => s,
            Shape::Geometric(s) => s,
        }
    }

    fn as_trait_mut(&mut self) -> &mut dyn ShapeTrait {
        match self {
            Shape::Stroke(s) => s,
            Shape::Text(s) => s,
            Shape::Geometric(s) => s,
        }
    }

    pub fn id(&self) -> &ShapeId {
        &self.meta().id
    }

    pub fn meta(&self) -> &ShapeMeta {
        self.as_trait().meta()
    }

    pub fn meta_mut(&mut self) -> &mut ShapeMeta {
        self.as_trait_mut().meta_mut()
    }

    pub fn z_order(&self) -> u64 {
        self.meta().z_order
    }

    pub fn is_deleted(&self) -> bool {
        self.meta().deleted
    }

    pub fn updated_at(&self) -> u64 {
        self.meta().updated_at
    }

    pub fn updated_by(&self) -> &ParticipantId {
        &self.meta().updated_by
    }

    pub fn created_by(&self) -> &ParticipantId {
        &self.meta().created_by
    }

    pub fn bounds(&self) -> Rect {
        self.as_trait().bounds()
    }

    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.as_trait().hit_test(point, tolerance)
    }

    pub fn style(&self) -> &ShapeStyle {
        self.as_trait().style()
    }

    pub fn style_mut(&mut self) -> &mut ShapeStyle {
        self.as_trait_mut().style_mut()
    }

    pub fn transform(&mut self, affine: Affine) {
        self.as_trait_mut().transform(affine);
    }

    /// Point list of the shape.
    ///
    /// Strokes return their samples, lines and arrows their two endpoints.
    /// Text and closed geometry have no point list and return an empty vec.
    pub fn points(&self) -> Vec<Point> {
        match self {
            Shape::Stroke(s) => s.points.clone(),
            Shape::Text(_) => Vec::new(),
            Shape::Geometric(g) => g
                .endpoints()
                .map(|(start, end)| vec![start, end])
                .unwrap_or_default(),
        }
    }

    /// Whether [`Shape::points`] is non-empty for this variant.
    pub fn has_points(&self) -> bool {
        match self {
            Shape::Stroke(s) => !s.points.is_empty(),
            Shape::Text(_) => false,
            Shape::Geometric(g) => g.kind.is_linear(),
        }
    }

    /// Text content, for text shapes only.
    pub fn content(&self) -> Option<&str> {
        match self {
            Shape::Text(t) => Some(&t.content),
            _ => None,
        }
    }

    pub fn has_content(&self) -> bool {
        self.content().is_some()
    }

    /// Anchor point of the shape.
    ///
    /// The first sample of a stroke, the top-left of a text box, and the
    /// origin corner of geometry. An empty stroke anchors at the origin.
    pub fn position(&self) -> Point {
        match self {
            Shape::Stroke(s) => s.points.first().copied().unwrap_or(Point::ZERO),
            Shape::Text(t) => t.position,
            Shape::Geometric(g) => g.origin(),
        }
    }

    /// Geometry kind, for geometric shapes only.
    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        match self {
            Shape::Geometric(g) => Some(g.kind),
            _ => None,
        }
    }

    pub fn as_stroke(&self) -> Option<&Stroke> {
        match self {
            Shape::Stroke(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stroke_mut(&mut self) -> Option<&mut Stroke> {
        match self {
            Shape::Stroke(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Shape::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut Text> {
        match self {
            Shape::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_geometric(&self) -> Option<&GeometricShape> {
        match self {
            Shape::Geometric(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_geometric_mut(&mut self) -> Option<&mut GeometricShape> {
        match self {
            Shape::Geometric(g) => Some(g),
            _ => None,
        }
    }

    /// Test if this shape intersects a selection rectangle.
    /// Strokes, lines and arrows are tested segment by segment, everything
    /// else by bounding box.
    pub fn intersects_rect(&self, rect: Rect) -> bool {
        if self.has_points() {
            return line_segments_intersect_rect(&self.points(), rect);
        }
        let bounds = self.bounds();
        rect.intersect(bounds.inflate(1.0, 1.0)).area() > 0.0
    }
}

/// Test if any line segment (defined by consecutive points) intersects or is inside a rectangle.
fn line_segments_intersect_rect(points: &[Point], rect: Rect) -> bool {
    if points.iter().any(|p| rect.contains(*p)) {
        return true;
    }
    let corners = [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ];
    let edges = [
        (corners[0], corners[1]),
        (corners[1], corners[2]),
        (corners[2], corners[3]),
        (corners[3], corners[0]),
    ];
    points.windows(2).any(|w| {
        edges
            .iter()
            .any(|&(c, d)| segments_intersect(w[0], w[1], c, d))
    })
}

/// Test if two line segments (a-b) and (c-d) intersect.
fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    let cross = |o: Point, p: Point, q: Point| -> f64 {
        (p.x - o.x) * (q.y - o.y) - (p.y - o.y) * (q.x - o.x)
    };
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    // Collinear: an endpoint lies on the other segment
    let on_segment = |p: Point, q: Point, r: Point| -> bool {
        r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
    };
    (d1.abs() < 1e-10 && on_segment(c, d, a))
        || (d2.abs() < 1e-10 && on_segment(c, d, b))
        || (d3.abs() < 1e-10 && on_segment(a, b, c))
        || (d4.abs() < 1e-10 && on_segment(a, b, d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_shapes() -> Vec<Shape> {
        vec![
            Stroke::from_points("s1", vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)]).into(),
            Text::new("t1", Point::new(5.0, 5.0), "hello").into(),
            GeometricShape::rectangle("r1", Rect::new(0.0, 0.0, 20.0, 10.0)).into(),
            GeometricShape::line("l1", Point::new(0.0, 0.0), Point::new(30.0, 0.0)).into(),
        ]
    }

    #[test]
    fn test_kind_tags() {
        let kinds: Vec<ShapeKind> = sample_shapes().iter().map(Shape::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ShapeKind::Stroke,
                ShapeKind::Text,
                ShapeKind::Geometric,
                ShapeKind::Geometric
            ]
        );
    }

    #[test]
    fn test_points_capability_is_neutral_for_text() {
        let shapes = sample_shapes();
        assert_eq!(shapes[0].points().len(), 2);
        assert!(shapes[1].points().is_empty());
        assert!(!shapes[1].has_points());
        assert!(shapes[2].points().is_empty());
        assert_eq!(
            shapes[3].points(),
            vec![Point::new(0.0, 0.0), Point::new(30.0, 0.0)]
        );
    }

    #[test]
    fn test_content_and_geometry_capabilities() {
        let shapes = sample_shapes();
        assert_eq!(shapes[1].content(), Some("hello"));
        assert!(shapes[0].content().is_none());
        assert_eq!(shapes[2].geometry_kind(), Some(GeometryKind::Rectangle));
        assert!(shapes[1].geometry_kind().is_none());
        assert!(shapes[0].as_text().is_none());
        assert!(shapes[1].as_text().is_some());
    }

    #[test]
    fn test_common_fields_are_polymorphic() {
        let mut shapes = sample_shapes();
        for (i, shape) in shapes.iter_mut().enumerate() {
            shape.meta_mut().z_order = i as u64;
            shape.meta_mut().deleted = true;
        }
        for (i, shape) in shapes.iter().enumerate() {
            assert_eq!(shape.z_order(), i as u64);
            assert!(shape.is_deleted());
        }
        assert_eq!(shapes[1].id().as_str(), "t1");
    }

    #[test]
    fn test_intersects_rect() {
        let shapes = sample_shapes();
        // The line crosses the rect without any endpoint inside it
        let rect = Rect::new(10.0, -5.0, 20.0, 5.0);
        assert!(shapes[3].intersects_rect(rect));
        assert!(!shapes[3].intersects_rect(Rect::new(0.0, 10.0, 5.0, 20.0)));
        assert!(shapes[2].intersects_rect(Rect::new(15.0, 5.0, 25.0, 15.0)));
    }

    #[test]
    fn test_serde_tagging() {
        let shape: Shape = Text::new("t1", Point::new(1.0, 2.0), "hi").into();
        let json = serde_json::to_string(&shape).unwrap();
        assert!(json.contains("\"type\":\"text\""));
        let back: Shape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn test_point_to_segment_dist() {
        let d = point_to_segment_dist(
            Point::new(5.0, 5.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
        );
        assert!((d - 5.0).abs() < f64::EPSILON);
    }
}
