//! Small 2D geometry helpers shared by perception, steering, ballistics and roads.
//!
//! Everything works on `glam::Vec2`. Angles are radians, measured counter-clockwise
//! from the +x axis.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle used by the static quad-tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec2, half_extent: f32) -> Self {
        Self {
            min: center - Vec2::splat(half_extent),
            max: center + Vec2::splat(half_extent),
        }
    }

    /// Bounding box of a segment, grown by `pad` on every side.
    pub fn around_segment(a: Vec2, b: Vec2, pad: f32) -> Self {
        Self {
            min: a.min(b) - Vec2::splat(pad),
            max: a.max(b) + Vec2::splat(pad),
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.cmple(self.max).all()
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// The four equal quadrants (NW, NE, SW, SE order is irrelevant to callers).
    pub fn quadrants(&self) -> [Rect; 4] {
        let c = self.center();
        [
            Rect::new(self.min, c),
            Rect::new(Vec2::new(c.x, self.min.y), Vec2::new(self.max.x, c.y)),
            Rect::new(Vec2::new(self.min.x, c.y), Vec2::new(c.x, self.max.y)),
            Rect::new(c, self.max),
        ]
    }
}

/// Unit vector for an angle.
#[inline]
pub fn heading_vec(angle: f32) -> Vec2 {
    Vec2::from_angle(angle)
}

/// Angle of a vector, or `fallback` for a zero vector.
#[inline]
pub fn vec_angle(v: Vec2, fallback: f32) -> f32 {
    if v.length_squared() < 1e-12 {
        fallback
    } else {
        v.y.atan2(v.x)
    }
}

/// Wrap an angle into (-PI, PI].
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % std::f32::consts::TAU;
    if a > std::f32::consts::PI {
        a -= std::f32::consts::TAU;
    } else if a <= -std::f32::consts::PI {
        a += std::f32::consts::TAU;
    }
    a
}

/// Unsigned angle between two vectors, in [0, PI].
pub fn angle_between(a: Vec2, b: Vec2) -> f32 {
    if a.length_squared() < 1e-12 || b.length_squared() < 1e-12 {
        return 0.0;
    }
    a.perp_dot(b).atan2(a.dot(b)).abs()
}

/// Clamp a vector's length to `max`.
#[inline]
pub fn truncate(v: Vec2, max: f32) -> Vec2 {
    v.clamp_length_max(max.max(0.0))
}

/// Closest point to `p` on segment `a`-`b`.
pub fn closest_point_on_segment(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

pub fn point_segment_distance(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    closest_point_on_segment(a, b, p).distance(p)
}

/// Whether segment `a`-`b` passes within `radius` of `center`.
#[inline]
pub fn segment_circle_intersects(a: Vec2, b: Vec2, center: Vec2, radius: f32) -> bool {
    point_segment_distance(a, b, center) <= radius
}

/// Parameter `t` in [0,1] of the first point where segment `a`-`b` enters the circle,
/// or `None` if it never does. A segment starting inside the circle returns `Some(0.0)`.
pub fn segment_circle_entry(a: Vec2, b: Vec2, center: Vec2, radius: f32) -> Option<f32> {
    let d = b - a;
    let f = a - center;
    let c = f.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    let qa = d.length_squared();
    if qa < 1e-12 {
        return None;
    }
    let qb = 2.0 * f.dot(d);
    let disc = qb * qb - 4.0 * qa * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-qb - disc.sqrt()) / (2.0 * qa);
    (0.0..=1.0).contains(&t).then_some(t)
}

fn orientation(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

/// Proper or touching intersection of segments `p1`-`p2` and `q1`-`q2`.
pub fn segments_intersect(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    let on_segment = |a: Vec2, b: Vec2, p: Vec2| {
        p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
    };
    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

/// Rotate a local-space offset (x forward, y left) into world space for `heading`.
#[inline]
pub fn local_to_world(offset: Vec2, heading: f32) -> Vec2 {
    Vec2::from_angle(heading).rotate(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_circle() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert!(segment_circle_intersects(a, b, Vec2::new(5.0, 0.9), 1.0));
        assert!(!segment_circle_intersects(a, b, Vec2::new(5.0, 1.1), 1.0));
        // Beyond the segment end
        assert!(!segment_circle_intersects(a, b, Vec2::new(12.0, 0.0), 1.0));
    }

    #[test]
    fn test_segment_circle_entry() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        let t = segment_circle_entry(a, b, Vec2::new(5.0, 0.0), 1.0).unwrap();
        assert!((t - 0.4).abs() < 1e-4);
        assert_eq!(segment_circle_entry(a, b, Vec2::new(0.0, 0.0), 1.0), Some(0.0));
        assert!(segment_circle_entry(a, b, Vec2::new(5.0, 3.0), 1.0).is_none());
    }

    #[test]
    fn test_segments_intersect() {
        let p1 = Vec2::new(0.0, 0.0);
        let p2 = Vec2::new(4.0, 4.0);
        assert!(segments_intersect(p1, p2, Vec2::new(0.0, 4.0), Vec2::new(4.0, 0.0)));
        assert!(!segments_intersect(p1, p2, Vec2::new(5.0, 0.0), Vec2::new(6.0, 0.0)));
    }

    #[test]
    fn test_wrap_and_local_to_world() {
        assert!((wrap_angle(3.0 * std::f32::consts::PI) - std::f32::consts::PI).abs() < 1e-4);
        let w = local_to_world(Vec2::new(1.0, 0.0), std::f32::consts::FRAC_PI_2);
        assert!(w.x.abs() < 1e-5 && (w.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_rect_quadrants_cover_parent() {
        let r = Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0));
        for q in r.quadrants() {
            assert!(r.contains_rect(&q));
            assert!((q.size() - Vec2::splat(5.0)).length() < 1e-5);
        }
    }
}
