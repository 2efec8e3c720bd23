//! Oscillation guard
//!
//! Keeps a short history of contact normals per ball and breaks the
//! "vibrating in a crevice" loop that discrete polygon collision falls into.

use std::collections::{BTreeMap, VecDeque};

use glam::Vec2;

use super::geometry::{ReversalAxis, detect_oscillation, detect_reversal};
use super::store::EntityId;
use crate::perp;
use crate::tuning::OscillationConfig;

/// Each axis keeps at least this share of the speed after a break
const MIN_AXIS_SHARE: f32 = 0.2;
/// Speed gain applied when breaking a loop
const BREAK_SPEED_GAIN: f32 = 1.1;
/// Speed gain applied when un-parking a stalled ball
const UNSTICK_SPEED_GAIN: f32 = 1.5;

#[derive(Debug, Clone)]
pub struct OscillationGuard {
    pub config: OscillationConfig,
    histories: BTreeMap<EntityId, VecDeque<(f32, Vec2)>>,
}

impl OscillationGuard {
    pub fn new(config: OscillationConfig) -> Self {
        Self {
            config,
            histories: BTreeMap::new(),
        }
    }

    /// Append a contact normal; true when the ball is now oscillating.
    ///
    /// The history is cleared on a positive result so one loop is flagged once.
    pub fn record(&mut self, ball: EntityId, now: f32, normal: Vec2) -> bool {
        let history = self.histories.entry(ball).or_default();
        history.push_back((now, normal));
        while history
            .front()
            .is_some_and(|&(t, _)| now - t > self.config.window)
        {
            history.pop_front();
        }

        let flagged = detect_oscillation(
            history.make_contiguous(),
            self.config.rapid_span,
            self.config.antiparallel_dot,
            self.config.min_opposite_pairs,
        );
        if flagged {
            history.clear();
        }
        flagged
    }

    pub fn history_len(&self, ball: EntityId) -> usize {
        self.histories.get(&ball).map_or(0, VecDeque::len)
    }

    /// Contact normals currently held for `ball`, oldest first
    pub fn recent_normals(&self, ball: EntityId) -> Vec<Vec2> {
        self.histories
            .get(&ball)
            .map(|h| h.iter().map(|&(_, n)| n).collect())
            .unwrap_or_default()
    }

    pub fn forget(&mut self, ball: EntityId) {
        self.histories.remove(&ball);
    }

    /// Kick a looping ball sideways and out of the surface.
    ///
    /// `previous` is the velocity before the last contact; its reversal axis
    /// picks the lateral direction.
    pub fn break_loop(&self, previous: Vec2, velocity: Vec2, normal: Vec2, max_speed: f32) -> Vec2 {
        let speed = velocity.length().max(self.config.unstick_min_speed);
        let lateral = match detect_reversal(previous, velocity) {
            Some(ReversalAxis::Horizontal) => Vec2::Y,
            Some(ReversalAxis::Vertical) => Vec2::X,
            _ => perp(normal),
        };
        let lateral = if lateral.dot(velocity) < 0.0 { -lateral } else { lateral };

        let mut v = velocity + (lateral + normal) * self.config.impulse;
        if v.dot(normal) < 0.0 {
            v -= 2.0 * v.dot(normal) * normal;
        }

        let mut dir = v.normalize_or(normal);
        dir.x = enforce_axis(dir.x, normal.x, MIN_AXIS_SHARE);
        dir.y = enforce_axis(dir.y, normal.y, MIN_AXIS_SHARE);

        let target = (speed * BREAK_SPEED_GAIN).min(max_speed);
        dir.normalize_or(normal) * target
    }

    /// Boost a ball that stalled against geometry; None when it is moving freely
    pub fn unstick(
        &self,
        speed_before: f32,
        velocity: Vec2,
        displacement: f32,
        normal: Vec2,
        max_speed: f32,
    ) -> Option<Vec2> {
        let speed = velocity.length();
        if speed >= self.config.stuck_speed && displacement >= self.config.stuck_distance {
            return None;
        }
        let target = self
            .config
            .unstick_min_speed
            .max(speed_before)
            .max(speed * UNSTICK_SPEED_GAIN)
            .min(max_speed);
        let tangent = velocity - normal * velocity.dot(normal);
        let dir = (normal + tangent.normalize_or_zero() * 0.5).normalize_or(normal);
        Some(dir * target)
    }
}

/// Keep `value` at least `min` in magnitude, preferring its own sign,
/// then the normal's, then positive
fn enforce_axis(value: f32, normal_component: f32, min: f32) -> f32 {
    if value.abs() >= min {
        return value;
    }
    let sign = if value != 0.0 {
        value.signum()
    } else if normal_component != 0.0 {
        normal_component.signum()
    } else {
        1.0
    };
    sign * min
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> OscillationGuard {
        OscillationGuard::new(OscillationConfig::default())
    }

    #[test]
    fn test_alternating_normals_flag_exactly_once() {
        let mut g = guard();
        let mut flags = 0;
        for i in 0..4 {
            let n = if i % 2 == 0 { Vec2::X } else { -Vec2::X };
            if g.record(1, i as f32 * 0.2, n) {
                flags += 1;
            }
        }
        assert_eq!(flags, 1);
        assert_eq!(g.history_len(1), 0);

        // History restarts after a flag
        assert!(!g.record(1, 0.9, Vec2::X));
        assert!(!g.record(1, 1.0, -Vec2::X));
        assert_eq!(g.recent_normals(1), vec![Vec2::X, -Vec2::X]);

        // Two more quick reversals make a fresh loop
        assert!(!g.record(1, 1.1, Vec2::X));
        assert!(g.record(1, 1.2, -Vec2::X));
    }

    #[test]
    fn test_slow_contacts_do_not_flag() {
        let mut g = guard();
        for i in 0..6 {
            let n = if i % 2 == 0 { Vec2::Y } else { -Vec2::Y };
            assert!(!g.record(7, i as f32 * 0.5, n));
        }
    }

    #[test]
    fn test_window_expires_history() {
        let mut g = guard();
        g.record(2, 0.0, Vec2::X);
        g.record(2, 0.1, -Vec2::X);
        g.record(2, 5.0, Vec2::Y);
        assert_eq!(g.history_len(2), 1);
        g.forget(2);
        assert_eq!(g.history_len(2), 0);
    }

    #[test]
    fn test_break_loop_points_away_with_both_axes() {
        let g = guard();
        let normal = -Vec2::X;
        let v = g.break_loop(Vec2::new(8.0, 0.0), Vec2::new(-8.0, 0.0), normal, 10.0);
        assert!(v.dot(normal) > 0.0);
        assert!(v.y.abs() >= v.length() * 0.19);
        assert!(v.length() <= 10.0 + 1e-4);
        assert!((v.length() - 8.8).abs() < 1e-3);
    }

    #[test]
    fn test_unstick_boosts_parked_ball() {
        let g = guard();
        let v = g
            .unstick(8.0, Vec2::new(0.5, 0.0), 0.2, Vec2::Y, 10.0)
            .expect("parked ball boosted");
        assert!(v.dot(Vec2::Y) > 0.0);
        assert!((v.length() - 8.0).abs() < 1e-4);

        assert!(g.unstick(8.0, Vec2::new(8.0, 0.0), 8.0, Vec2::Y, 10.0).is_none());
    }
}
