//! Opponent controller
//!
//! Decides on a coarse cadence where the ball will cross its paddle and
//! then, every frame, presses up or down like a human would.

use glam::Vec2;
use rand::Rng;

use super::state::PaddleInput;
use super::store::Side;
use crate::tuning::{Difficulty, OpponentConfig, OpponentTuning};

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpponentPhase {
    /// No live ball to follow
    Idle,
    /// Steering toward `target_y`
    Tracking { target_y: f32 },
}

/// Straight-line interception height at `paddle_x`, folded back between
/// `top` and `bottom` for every wall bounce on the way.
///
/// None when the ball is not travelling toward `paddle_x`.
pub fn predict_intercept_y(position: Vec2, velocity: Vec2, paddle_x: f32, top: f32, bottom: f32) -> Option<f32> {
    if velocity.x.abs() < 1e-6 {
        return None;
    }
    let time = (paddle_x - position.x) / velocity.x;
    if time <= 0.0 {
        return None;
    }
    let raw = position.y + velocity.y * time;
    let span = bottom - top;
    if span <= 0.0 {
        return Some(top);
    }
    let folded = (raw - top).rem_euclid(2.0 * span);
    Some(if folded <= span { top + folded } else { top + 2.0 * span - folded })
}

#[derive(Debug, Clone)]
pub struct OpponentController {
    pub side: Side,
    pub difficulty: Difficulty,
    pub tuning: OpponentTuning,
    pub phase: OpponentPhase,
    decision_interval: f32,
    max_error: f32,
    accumulator: f32,
}

impl OpponentController {
    pub fn new(side: Side, config: &OpponentConfig) -> Self {
        Self {
            side,
            difficulty: config.difficulty,
            tuning: config.difficulty.tuning(),
            phase: OpponentPhase::Idle,
            decision_interval: config.decision_interval,
            max_error: config.max_error,
            // First decision happens on the first frame
            accumulator: config.decision_interval,
        }
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
        self.tuning = difficulty.tuning();
    }

    /// Pick a new target from the live ball's position and velocity
    pub fn decide<R: Rng>(
        &mut self,
        ball: Option<(Vec2, Vec2)>,
        paddle_x: f32,
        paddle_half_height: f32,
        bounds: (f32, f32),
        rng: &mut R,
    ) {
        let Some((position, velocity)) = ball else {
            self.phase = OpponentPhase::Idle;
            return;
        };
        let (top, bottom) = bounds;
        let mut target = predict_intercept_y(position, velocity, paddle_x, top, bottom).unwrap_or(position.y);

        if self.tuning.accuracy < 1.0 {
            let span = (1.0 - self.tuning.accuracy) * self.max_error;
            target += (rng.random::<f32>() - 0.5) * span;
        }

        let lo = top + paddle_half_height;
        let hi = (bottom - paddle_half_height).max(lo);
        self.phase = OpponentPhase::Tracking {
            target_y: target.clamp(lo, hi),
        };
    }

    /// Advance the decision clock and emit this frame's simulated input
    pub fn update<R: Rng>(
        &mut self,
        dt: f32,
        ball: Option<(Vec2, Vec2)>,
        paddle_position: Vec2,
        paddle_half_height: f32,
        bounds: (f32, f32),
        rng: &mut R,
    ) -> PaddleInput {
        self.accumulator += dt;
        if self.accumulator >= self.decision_interval {
            self.accumulator = 0.0;
            self.decide(ball, paddle_position.x, paddle_half_height, bounds, rng);
        }
        self.steer(paddle_position.y)
    }

    /// Up/down toward the current target; nothing inside the dead zone
    pub fn steer(&self, paddle_y: f32) -> PaddleInput {
        let OpponentPhase::Tracking { target_y } = self.phase else {
            return PaddleInput::default();
        };
        let delta = target_y - paddle_y;
        if delta.abs() < self.tuning.dead_zone {
            PaddleInput::default()
        } else if delta > 0.0 {
            PaddleInput { up: false, down: true }
        } else {
            PaddleInput { up: true, down: false }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_prediction_reflects_off_bottom() {
        let y = predict_intercept_y(Vec2::new(100.0, 100.0), Vec2::new(5.0, 5.0), 780.0, 80.0, 720.0)
            .expect("ball approaching");
        assert!((80.0..=720.0).contains(&y));
        // 100 + 680 = 780 overshoots 720 by 60
        assert!((y - 660.0).abs() < 1e-3);
    }

    #[test]
    fn test_prediction_multiple_folds() {
        // raw = 2100: bottom, top, then bottom again
        let y = predict_intercept_y(Vec2::new(0.0, 100.0), Vec2::new(1.0, 2.0), 1000.0, 80.0, 720.0)
            .expect("approaching");
        assert!((y - 620.0).abs() < 1e-3);

        let up = predict_intercept_y(Vec2::new(0.0, 100.0), Vec2::new(1.0, -1.0), 100.0, 80.0, 720.0)
            .expect("approaching");
        assert!((up - 160.0).abs() < 1e-3);
    }

    #[test]
    fn test_prediction_ignores_receding_ball() {
        assert!(predict_intercept_y(Vec2::new(500.0, 100.0), Vec2::new(-5.0, 0.0), 780.0, 80.0, 720.0).is_none());
        assert!(predict_intercept_y(Vec2::new(500.0, 100.0), Vec2::new(0.0, 5.0), 780.0, 80.0, 720.0).is_none());
    }

    #[test]
    fn test_decision_cadence_and_dead_zone() {
        let mut rng = Pcg32::seed_from_u64(9);
        let mut ai = OpponentController::new(Side::Right, &OpponentConfig::default());
        ai.set_difficulty(Difficulty::Hard);
        let ball = Some((Vec2::new(700.0, 400.0), Vec2::new(5.0, 0.0)));

        let input = ai.update(1.0 / 60.0, ball, Vec2::new(1440.0, 200.0), 40.0, (80.0, 720.0), &mut rng);
        assert!(input.down && !input.up);
        let OpponentPhase::Tracking { target_y } = ai.phase else {
            panic!("expected tracking");
        };
        assert!((target_y - 400.0).abs() <= 0.05 * 60.0 / 2.0 + 1e-3);

        // Ball moved but no new decision until a full interval passes
        let moved = Some((Vec2::new(700.0, 150.0), Vec2::new(5.0, 0.0)));
        ai.update(0.5, moved, Vec2::new(1440.0, target_y), 40.0, (80.0, 720.0), &mut rng);
        assert_eq!(ai.phase, OpponentPhase::Tracking { target_y });

        // Inside the dead zone no input is issued
        assert_eq!(ai.steer(target_y + 3.0), PaddleInput::default());
        assert!(ai.steer(target_y + 50.0).up);
    }

    #[test]
    fn test_target_clamped_to_travel() {
        let mut rng = Pcg32::seed_from_u64(1);
        let mut ai = OpponentController::new(Side::Left, &OpponentConfig::default());
        ai.decide(Some((Vec2::new(700.0, 75.0), Vec2::new(5.0, 0.0))), 60.0, 40.0, (80.0, 720.0), &mut rng);
        let OpponentPhase::Tracking { target_y } = ai.phase else {
            panic!("expected tracking");
        };
        assert!(target_y >= 120.0 && target_y <= 680.0);

        ai.decide(None, 60.0, 40.0, (80.0, 720.0), &mut rng);
        assert_eq!(ai.phase, OpponentPhase::Idle);
        assert_eq!(ai.steer(400.0), PaddleInput::default());
    }
}
