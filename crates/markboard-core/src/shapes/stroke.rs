//! Freehand stroke shape.

use super::{ShapeId, ShapeMeta, ShapeStyle, ShapeTrait};
use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};

/// A freehand stroke (ordered series of points).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub meta: ShapeMeta,
    /// Points in drawing order.
    pub points: Vec<Point>,
    /// Style properties.
    pub style: ShapeStyle,
}

impl Stroke {
    /// Create a new empty stroke.
    pub fn new(id: impl Into<ShapeId>) -> Self {
        Self::from_points(id, Vec::new())
    }

    /// Create from existing points.
    pub fn from_points(id: impl Into<ShapeId>, points: Vec<Point>) -> Self {
        Self {
            meta: ShapeMeta::new(id.into()),
            points,
            style: ShapeStyle::default(),
        }
    }

    pub fn with_style(mut self, style: ShapeStyle) -> Self {
        self.style = style;
        self
    }

    /// Add a point to the path.
    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Get the number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the path is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Simplify the path by removing redundant points.
    pub fn simplify(&mut self, tolerance: f64) {
        if self.points.len() < 3 {
            return;
        }

        // Ramer-Douglas-Peucker
        self.points = rdp_simplify(&self.points, tolerance);
    }
}

/// Ramer-Douglas-Peucker line simplification.
fn rdp_simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = points[0];
    let last = points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_index = 0;

    for (i, point) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let dist = perpendicular_distance(*point, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_index = i;
        }
    }

    if max_dist > tolerance {
        let mut left = rdp_simplify(&points[..=max_index], tolerance);
        let right = rdp_simplify(&points[max_index..], tolerance);

        // Junction point appears in both halves
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

/// Calculate perpendicular distance from point to line.
fn perpendicular_distance(point: Point, line_start: Point, line_end: Point) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;

    let line_len_sq = dx * dx + dy * dy;
    if line_len_sq < f64::EPSILON {
        let px = point.x - line_start.x;
        let py = point.y - line_start.y;
        return (px * px + py * py).sqrt();
    }

    // Area of triangle * 2 / base = height
    let area2 = ((point.x - line_start.x) * dy - (point.y - line_start.y) * dx).abs();
    area2 / line_len_sq.sqrt()
}

impl ShapeTrait for Stroke {
    fn meta(&self) -> &ShapeMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ShapeMeta {
        &mut self.meta
    }

    fn bounds(&self) -> Rect {
        if self.points.is_empty() {
            return Rect::ZERO;
        }

        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;

        for point in &self.points {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }

        Rect::new(min_x, min_y, max_x, max_y)
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let reach = tolerance + self.style.stroke_width / 2.0;
        match self.points.as_slice() {
            [] => false,
            [only] => only.distance(point) <= reach,
            points => super::point_to_polyline_dist(point, points) <= reach,
        }
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        for point in &mut self.points {
            *point = affine * *point;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_creation() {
        let stroke = Stroke::new("s1");
        assert!(stroke.is_empty());
        assert_eq!(stroke.id().as_str(), "s1");
    }

    #[test]
    fn test_add_points() {
        let mut stroke = Stroke::new("s1");
        stroke.add_point(Point::new(0.0, 0.0));
        stroke.add_point(Point::new(10.0, 10.0));
        assert_eq!(stroke.len(), 2);
    }

    #[test]
    fn test_bounds() {
        let stroke = Stroke::from_points(
            "s1",
            vec![
                Point::new(0.0, 0.0),
                Point::new(100.0, 50.0),
                Point::new(50.0, 100.0),
            ],
        );

        let bounds = stroke.bounds();
        assert!((bounds.x0).abs() < f64::EPSILON);
        assert!((bounds.y0).abs() < f64::EPSILON);
        assert!((bounds.x1 - 100.0).abs() < f64::EPSILON);
        assert!((bounds.y1 - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_simplify() {
        let mut stroke = Stroke::from_points(
            "s1",
            vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.1),
                Point::new(2.0, 0.0),
                Point::new(3.0, 0.1),
                Point::new(4.0, 0.0),
            ],
        );

        stroke.simplify(0.5);
        assert_eq!(stroke.points, vec![Point::new(0.0, 0.0), Point::new(4.0, 0.0)]);
    }

    #[test]
    fn test_hit_test() {
        let stroke = Stroke::from_points("s1", vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]);

        assert!(stroke.hit_test(Point::new(50.0, 0.0), 5.0));
        assert!(!stroke.hit_test(Point::new(50.0, 20.0), 5.0));
    }

    #[test]
    fn test_transform_moves_every_point() {
        let mut stroke = Stroke::from_points("s1", vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        stroke.transform(Affine::translate((5.0, -5.0)));
        assert_eq!(stroke.points, vec![Point::new(5.0, -5.0), Point::new(6.0, -4.0)]);
    }
}
