// Geometry helpers used by physics, collision detection and scanning.
// Angles are degrees, 0 = +x, counter-clockwise positive.

use serde::Serialize;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Point reached by travelling `distance` along `direction` degrees.
    pub fn translated(self, direction: f64, distance: f64) -> Self {
        let rad = direction.to_radians();
        Self {
            x: self.x + rad.cos() * distance,
            y: self.y + rad.sin() * distance,
        }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Absolute angle in degrees from this point towards `other`.
    pub fn angle_to(self, other: Point) -> f64 {
        normalize_absolute_angle((other.y - self.y).atan2(other.x - self.x).to_degrees())
    }
}

/// Normalizes to [0, 360).
pub fn normalize_absolute_angle(angle: f64) -> f64 {
    let a = angle % 360.0;
    if a < 0.0 {
        // -0.0 % 360 stays negative zero; the sum keeps us inside the range.
        let shifted = a + 360.0;
        if shifted >= 360.0 { 0.0 } else { shifted }
    } else {
        a
    }
}

/// Normalizes to (-180, 180].
pub fn normalize_relative_angle(angle: f64) -> f64 {
    let a = normalize_absolute_angle(angle);
    if a > 180.0 { a - 360.0 } else { a }
}

pub fn is_near_zero(value: f64) -> bool {
    value.abs() < 1e-5
}

pub fn circles_intersect(a: Point, a_radius: f64, b: Point, b_radius: f64) -> bool {
    let reach = a_radius + b_radius;
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dx * dx + dy * dy <= reach * reach
}

/// True when the closed segments `a1-a2` and `b1-b2` share at least one point.
pub fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > EPSILON && d2 < -EPSILON) || (d1 < -EPSILON && d2 > EPSILON))
        && ((d3 > EPSILON && d4 < -EPSILON) || (d3 < -EPSILON && d4 > EPSILON))
    {
        return true;
    }

    (d1.abs() <= EPSILON && on_segment(b1, b2, a1))
        || (d2.abs() <= EPSILON && on_segment(b1, b2, a2))
        || (d3.abs() <= EPSILON && on_segment(a1, a2, b1))
        || (d4.abs() <= EPSILON && on_segment(a1, a2, b2))
}

/// True when the segment `p1-p2` touches the circle at `center`.
pub fn segment_intersects_circle(p1: Point, p2: Point, center: Point, radius: f64) -> bool {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    let len_sq = dx * dx + dy * dy;

    // Degenerate segment: plain point-in-circle test.
    let t = if len_sq <= EPSILON {
        0.0
    } else {
        (((center.x - p1.x) * dx + (center.y - p1.y) * dy) / len_sq).clamp(0.0, 1.0)
    };

    let closest = Point::new(p1.x + t * dx, p1.y + t * dy);
    closest.distance_to(center) <= radius
}

/// True when `angle` lies on the counter-clockwise arc from `start` spanning `extent` degrees,
/// after widening the arc by `tolerance` degrees on both sides.
pub fn is_angle_within_arc(angle: f64, start: f64, extent: f64, tolerance: f64) -> bool {
    if extent + 2.0 * tolerance >= 360.0 {
        return true;
    }
    let offset = normalize_absolute_angle(angle - (start - tolerance));
    offset <= extent + 2.0 * tolerance
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_angle_is_negative_then_absolute_normalization_wraps_into_range() {
        assert_eq!(normalize_absolute_angle(-90.0), 270.0);
        assert_eq!(normalize_absolute_angle(720.0), 0.0);
        assert_eq!(normalize_absolute_angle(-0.0), 0.0);
        assert!(normalize_absolute_angle(-1e-20) < 360.0);
    }

    #[test]
    fn when_angle_is_past_half_turn_then_relative_normalization_flips_sign() {
        assert_eq!(normalize_relative_angle(270.0), -90.0);
        assert_eq!(normalize_relative_angle(180.0), 180.0);
        assert_eq!(normalize_relative_angle(-190.0), 170.0);
    }

    #[test]
    fn when_segments_cross_then_they_intersect() {
        let hit = segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 0.0),
        );
        assert!(hit);
    }

    #[test]
    fn when_segments_are_parallel_then_they_do_not_intersect() {
        let hit = segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(10.0, 1.0),
        );
        assert!(!hit);
    }

    #[test]
    fn when_segment_passes_near_circle_then_only_touching_counts() {
        let center = Point::new(5.0, 5.0);
        assert!(segment_intersects_circle(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            center,
            5.0
        ));
        assert!(!segment_intersects_circle(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            center,
            4.9
        ));
    }

    #[test]
    fn when_arc_wraps_past_zero_then_containment_still_works() {
        assert!(is_angle_within_arc(5.0, 350.0, 20.0, 0.0));
        assert!(!is_angle_within_arc(30.0, 350.0, 20.0, 0.0));
        assert!(is_angle_within_arc(12.0, 350.0, 20.0, 3.0));
    }

    #[test]
    fn when_translating_along_ninety_degrees_then_y_grows() {
        let p = Point::new(1.0, 1.0).translated(90.0, 2.0);
        assert!((p.x - 1.0).abs() < 1e-12);
        assert!((p.y - 3.0).abs() < 1e-12);
    }
}
