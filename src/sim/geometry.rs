//! Pure geometry and collision primitives
//!
//! Everything here is stateless: polygon containment, circle/segment
//! contact, continuous box sweeps and the jitter detectors used by the
//! oscillation guard.

use glam::Vec2;

use crate::perp;

/// Result of a discrete contact check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionResult {
    /// Whether a collision occurred
    pub hit: bool,
    /// Closest point on the obstacle
    pub point: Vec2,
    /// Surface normal at contact (pointing toward the ball centre)
    pub normal: Vec2,
    /// Penetration depth (for position correction)
    pub penetration: f32,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            point: Vec2::ZERO,
            normal: Vec2::ZERO,
            penetration: 0.0,
        }
    }
}

/// Axis-aligned box described by centre and half-extents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub center: Vec2,
    pub half: Vec2,
}

impl Aabb {
    pub fn new(center: Vec2, half: Vec2) -> Self {
        Self { center, half }
    }

    #[inline]
    pub fn min(&self) -> Vec2 {
        self.center - self.half
    }

    #[inline]
    pub fn max(&self) -> Vec2 {
        self.center + self.half
    }

    pub fn translated(&self, by: Vec2) -> Self {
        Self::new(self.center + by, self.half)
    }
}

/// Result of a continuous box sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepResult {
    pub hit: bool,
    /// Fraction of the displacement travelled before first contact, in [0, 1]
    pub time: f32,
    /// Centre of the moving box at the moment of contact
    pub position: Vec2,
    /// Face normal of the static box that was struck
    pub normal: Vec2,
}

impl SweepResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            time: 1.0,
            position: Vec2::ZERO,
            normal: Vec2::ZERO,
        }
    }
}

/// Ray-crossing containment test; the loop is treated as closed and
/// translated by `offset`. Loops with fewer than 3 points contain nothing.
pub fn point_in_polygon(point: Vec2, points: &[Vec2], offset: Vec2) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let a = points[i] + offset;
        let b = points[j] + offset;
        if (a.y > point.y) != (b.y > point.y) {
            let cross_x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Closest point on segment `a..b` to `p`; None for zero-length segments
#[inline]
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Option<Vec2> {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-8 {
        return None;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    Some(a + ab * t)
}

/// Circle versus segment contact
///
/// The normal points from the segment toward the circle centre. A centre
/// lying exactly on the segment falls back to the edge perpendicular.
pub fn circle_segment_intersect(center: Vec2, radius: f32, a: Vec2, b: Vec2) -> CollisionResult {
    let Some(closest) = closest_point_on_segment(center, a, b) else {
        return CollisionResult::miss();
    };
    let delta = center - closest;
    let dist = delta.length();
    if dist >= radius {
        return CollisionResult::miss();
    }
    let normal = if dist > 1e-6 {
        delta / dist
    } else {
        perp(b - a).normalize_or_zero()
    };
    CollisionResult {
        hit: true,
        point: closest,
        normal,
        penetration: radius - dist,
    }
}

/// Strict overlap of two boxes (touching edges do not count)
#[inline]
pub fn aabb_overlap(a: &Aabb, b: &Aabb) -> bool {
    let (amin, amax) = (a.min(), a.max());
    let (bmin, bmax) = (b.min(), b.max());
    amin.x < bmax.x && amax.x > bmin.x && amin.y < bmax.y && amax.y > bmin.y
}

/// Entry and exit fractions along one axis, or None when the axis never overlaps
fn axis_window(moving_min: f32, moving_max: f32, other_min: f32, other_max: f32, d: f32) -> Option<(f32, f32)> {
    if d.abs() < 1e-9 {
        // No relative motion: the axis overlaps for the whole frame or never
        if moving_min < other_max && moving_max > other_min {
            Some((f32::NEG_INFINITY, f32::INFINITY))
        } else {
            None
        }
    } else if d > 0.0 {
        Some(((other_min - moving_max) / d, (other_max - moving_min) / d))
    } else {
        Some(((other_max - moving_min) / d, (other_min - moving_max) / d))
    }
}

/// Continuous box sweep
///
/// Moves `moving` along `displacement` (relative to `fixed`) and reports the
/// first fraction of the frame at which the two touch. Boxes that already
/// overlap report `time = 0` unless the displacement separates them along
/// the shallowest axis.
pub fn swept_aabb(moving: &Aabb, displacement: Vec2, fixed: &Aabb) -> SweepResult {
    let (mmin, mmax) = (moving.min(), moving.max());
    let (fmin, fmax) = (fixed.min(), fixed.max());

    let Some((entry_x, exit_x)) = axis_window(mmin.x, mmax.x, fmin.x, fmax.x, displacement.x) else {
        return SweepResult::miss();
    };
    let Some((entry_y, exit_y)) = axis_window(mmin.y, mmax.y, fmin.y, fmax.y, displacement.y) else {
        return SweepResult::miss();
    };

    let entry = entry_x.max(entry_y);
    let exit = exit_x.min(exit_y);
    if entry > exit || entry > 1.0 || exit <= 0.0 {
        return SweepResult::miss();
    }

    if entry < 0.0 {
        // Overlapping at the start of the frame: resolve along the shallowest axis
        let delta = moving.center - fixed.center;
        let pen = moving.half + fixed.half - delta.abs();
        let normal = if pen.x < pen.y {
            Vec2::new(if delta.x < 0.0 { -1.0 } else { 1.0 }, 0.0)
        } else {
            Vec2::new(0.0, if delta.y < 0.0 { -1.0 } else { 1.0 })
        };
        if displacement.dot(normal) > 0.0 {
            return SweepResult::miss();
        }
        return SweepResult {
            hit: true,
            time: 0.0,
            position: moving.center,
            normal,
        };
    }

    let normal = if entry_x > entry_y {
        Vec2::new(-displacement.x.signum(), 0.0)
    } else {
        Vec2::new(0.0, -displacement.y.signum())
    };
    SweepResult {
        hit: true,
        time: entry,
        position: moving.center + displacement * entry,
        normal,
    }
}

#[inline]
fn orientation(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

/// Proper or touching intersection of segments `p1..p2` and `q1..q2`
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

/// Reflect velocity off a surface: v' = v - 2(v·n)n
#[inline]
pub fn reflect_velocity(velocity: Vec2, normal: Vec2) -> Vec2 {
    velocity - 2.0 * velocity.dot(normal) * normal
}

/// Which axes flipped in a velocity reversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalAxis {
    Horizontal,
    Vertical,
    Mixed,
}

/// cos(150°): turns sharper than this count as reversals
const REVERSAL_COS: f32 = -0.866_025_4;

/// Report a near-reversal (> 150° turn) between two velocities
pub fn detect_reversal(previous: Vec2, current: Vec2) -> Option<ReversalAxis> {
    let denom = previous.length() * current.length();
    if denom < 1e-6 {
        return None;
    }
    if previous.dot(current) / denom > REVERSAL_COS {
        return None;
    }
    let flipped_x = previous.x * current.x < 0.0;
    let flipped_y = previous.y * current.y < 0.0;
    Some(match (flipped_x, flipped_y) {
        (true, false) => ReversalAxis::Horizontal,
        (false, true) => ReversalAxis::Vertical,
        _ => ReversalAxis::Mixed,
    })
}

/// Rapid back-and-forth contact detector
///
/// `history` holds `(time, normal)` pairs oldest first. Looks at the last
/// four entries: they must span less than `rapid_span` seconds and contain
/// at least `min_pairs` consecutive normals whose dot product falls below
/// `antiparallel_dot`.
pub fn detect_oscillation(
    history: &[(f32, Vec2)],
    rapid_span: f32,
    antiparallel_dot: f32,
    min_pairs: usize,
) -> bool {
    if history.len() < 4 {
        return false;
    }
    let recent = &history[history.len() - 4..];
    if recent[3].0 - recent[0].0 >= rapid_span {
        return false;
    }
    let opposite = recent
        .windows(2)
        .filter(|w| w[0].1.dot(w[1].1) < antiparallel_dot)
        .count();
    opposite >= min_pairs
}
