//! Geometric shapes: rectangles, ellipses, lines and arrows.

use super::{ShapeId, ShapeMeta, ShapeStyle, ShapeTrait};
use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};

/// Kind of geometric shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Rectangle,
    Ellipse,
    Line,
    Arrow,
}

impl GeometryKind {
    /// Lines and arrows are defined by two endpoints rather than an area.
    pub fn is_linear(&self) -> bool {
        matches!(self, GeometryKind::Line | GeometryKind::Arrow)
    }
}

/// A geometric shape described by a kind and a rectangle.
///
/// For rectangles and ellipses `bounds` is the (normalized) box. For lines and
/// arrows `(x0, y0)` is the start point and `(x1, y1)` the end point, so the
/// rectangle is deliberately left unnormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricShape {
    pub meta: ShapeMeta,
    pub kind: GeometryKind,
    pub bounds: Rect,
    /// Rotation angle in radians (around center).
    #[serde(default)]
    pub rotation: f64,
    /// Style properties.
    pub style: ShapeStyle,
}

impl GeometricShape {
    pub fn new(id: impl Into<ShapeId>, kind: GeometryKind, bounds: Rect) -> Self {
        let bounds = if kind.is_linear() { bounds } else { bounds.abs() };
        Self {
            meta: ShapeMeta::new(id.into()),
            kind,
            bounds,
            rotation: 0.0,
            style: ShapeStyle::default(),
        }
    }

    pub fn rectangle(id: impl Into<ShapeId>, rect: Rect) -> Self {
        Self::new(id, GeometryKind::Rectangle, rect)
    }

    pub fn ellipse(id: impl Into<ShapeId>, center: Point, radius_x: f64, radius_y: f64) -> Self {
        let rect = Rect::new(
            center.x - radius_x,
            center.y - radius_y,
            center.x + radius_x,
            center.y + radius_y,
        );
        Self::new(id, GeometryKind::Ellipse, rect)
    }

    pub fn line(id: impl Into<ShapeId>, start: Point, end: Point) -> Self {
        Self::new(id, GeometryKind::Line, Rect::new(start.x, start.y, end.x, end.y))
    }

    pub fn arrow(id: impl Into<ShapeId>, start: Point, end: Point) -> Self {
        Self::new(id, GeometryKind::Arrow, Rect::new(start.x, start.y, end.x, end.y))
    }

    pub fn with_style(mut self, style: ShapeStyle) -> Self {
        self.style = style;
        self
    }

    /// Start and end point, for lines and arrows only.
    pub fn endpoints(&self) -> Option<(Point, Point)> {
        self.kind.is_linear().then(|| {
            (
                Point::new(self.bounds.x0, self.bounds.y0),
                Point::new(self.bounds.x1, self.bounds.y1),
            )
        })
    }

    /// Anchor point: the start of a line, the top-left of a box.
    pub fn origin(&self) -> Point {
        Point::new(self.bounds.x0, self.bounds.y0)
    }

    fn hit_test_rect(&self, point: Point, tolerance: f64) -> bool {
        let rect = self.bounds;
        let reach = tolerance + self.style.stroke_width / 2.0;
        if self.style.fill_color.is_some() {
            rect.inflate(tolerance, tolerance).contains(point)
        } else {
            // Outline only: hit on the border
            let outer = rect.inflate(reach, reach);
            let inner = rect.inflate(-reach, -reach);
            outer.contains(point) && !inner.contains(point)
        }
    }

    fn hit_test_ellipse(&self, point: Point, tolerance: f64) -> bool {
        let center = self.bounds.center();
        let radius_x = self.bounds.width() / 2.0;
        let radius_y = self.bounds.height() / 2.0;
        let half_sw = self.style.stroke_width / 2.0;

        let dx_outer = (point.x - center.x) / (radius_x + tolerance + half_sw);
        let dy_outer = (point.y - center.y) / (radius_y + tolerance + half_sw);
        if dx_outer * dx_outer + dy_outer * dy_outer > 1.0 {
            return false;
        }
        if self.style.fill_color.is_some() {
            return true;
        }
        let inner_rx = (radius_x - tolerance - half_sw).max(0.0);
        let inner_ry = (radius_y - tolerance - half_sw).max(0.0);
        if inner_rx < f64::EPSILON || inner_ry < f64::EPSILON {
            return true;
        }
        let dx_inner = (point.x - center.x) / inner_rx;
        let dy_inner = (point.y - center.y) / inner_ry;
        dx_inner * dx_inner + dy_inner * dy_inner > 1.0
    }
}

impl ShapeTrait for GeometricShape {
    fn meta(&self) -> &ShapeMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ShapeMeta {
        &mut self.meta
    }

    fn bounds(&self) -> Rect {
        self.bounds.abs()
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        match self.kind {
            GeometryKind::Rectangle => self.hit_test_rect(point, tolerance),
            GeometryKind::Ellipse => self.hit_test_ellipse(point, tolerance),
            GeometryKind::Line | GeometryKind::Arrow => {
                let (start, end) = (self.origin(), Point::new(self.bounds.x1, self.bounds.y1));
                super::point_to_segment_dist(point, start, end)
                    <= tolerance + self.style.stroke_width / 2.0
            }
        }
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        if self.kind.is_linear() {
            let start = affine * Point::new(self.bounds.x0, self.bounds.y0);
            let end = affine * Point::new(self.bounds.x1, self.bounds.y1);
            self.bounds = Rect::new(start.x, start.y, end.x, end.y);
        } else {
            self.bounds = affine.transform_rect_bbox(self.bounds);
        }
    }
}
