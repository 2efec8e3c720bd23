//! Ball behaviour strategies
//!
//! Each ball carries exactly one `BallBehaviour` for its whole life. The
//! variant supplies the per-frame integration rule, the post-bounce hook
//! and the speed range enforced on every integration step.

use glam::Vec2;
use rand::Rng;

use super::store::Body;
use crate::consts::*;
use crate::clamp_speed;

/// Length of the sideways nudge the curve ball takes per reference frame
pub const CURVE_STRENGTH: f32 = 0.05;
pub const CURVE_MIN_SPEED: f32 = 5.0;

/// Burst cadence
pub const BURST_WINDUP_FRAMES: f32 = 30.0;
pub const BURST_WIND_SPEED: f32 = 2.0;
pub const BURST_SPEED: f32 = BURST_MAX_SPEED;

/// Spin tuning
const SPIN_START_ANGULAR_VELOCITY: f32 = 0.05;
const SPIN_ANGULAR_ACCELERATION: f32 = 0.0005;
const SPIN_MAX_ANGULAR_VELOCITY: f32 = 0.5;
const SPIN_MAX_ANGULAR_VELOCITY_CAP: f32 = 0.3;
const SPIN_FACTOR: f32 = 0.3;
const SPIN_MAX_DEVIATION: f32 = std::f32::consts::PI / 7.0;
const SPIN_BOUNCE_BOOST: f32 = 1.01;

/// Where the three clones of a split appear, relative to the source ball
pub const SPLIT_OFFSETS: [Vec2; 3] = [
    Vec2::new(-50.0, -100.0),
    Vec2::new(0.0, 0.0),
    Vec2::new(50.0, 100.0),
];

/// Variant tag without per-ball state (for events and spawning)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallVariant {
    Standard,
    Curve,
    Spin,
    Burst,
    Multiply,
}

impl BallVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            BallVariant::Standard => "standard",
            BallVariant::Curve => "curve",
            BallVariant::Spin => "spin",
            BallVariant::Burst => "burst",
            BallVariant::Multiply => "multiply",
        }
    }
}

/// Accumulated spin of a spin ball
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinState {
    pub rotation: f32,
    pub angular_velocity: f32,
    pub angular_acceleration: f32,
    pub max_angular_velocity: f32,
}

impl Default for SpinState {
    fn default() -> Self {
        Self {
            rotation: 0.0,
            angular_velocity: SPIN_START_ANGULAR_VELOCITY,
            angular_acceleration: SPIN_ANGULAR_ACCELERATION,
            max_angular_velocity: SPIN_MAX_ANGULAR_VELOCITY,
        }
    }
}

/// Firing cadence of a burst ball
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BurstPhase {
    /// Creeping along while `frames` count up to the release
    Winding { frames: f32 },
    Released,
}

/// Per-ball movement and response rules
#[derive(Debug, Clone, PartialEq)]
pub enum BallBehaviour {
    Standard,
    /// Nudged sideways by `direction * CURVE_STRENGTH` every frame
    Curve { direction: f32 },
    Spin(SpinState),
    Burst(BurstPhase),
    /// Splits into three clones on its first integration step
    Multiply { pending_split: bool },
}

impl BallBehaviour {
    /// Fresh behaviour for a variant; curve direction is drawn from `rng`
    pub fn for_variant<R: Rng>(variant: BallVariant, rng: &mut R) -> Self {
        match variant {
            BallVariant::Standard => BallBehaviour::Standard,
            BallVariant::Curve => BallBehaviour::Curve {
                direction: if rng.random_bool(0.5) { 1.0 } else { -1.0 },
            },
            BallVariant::Spin => BallBehaviour::Spin(SpinState::default()),
            BallVariant::Burst => BallBehaviour::Burst(BurstPhase::Winding { frames: 0.0 }),
            BallVariant::Multiply => BallBehaviour::Multiply { pending_split: true },
        }
    }

    pub fn variant(&self) -> BallVariant {
        match self {
            BallBehaviour::Standard => BallVariant::Standard,
            BallBehaviour::Curve { .. } => BallVariant::Curve,
            BallBehaviour::Spin(_) => BallVariant::Spin,
            BallBehaviour::Burst(_) => BallVariant::Burst,
            BallBehaviour::Multiply { .. } => BallVariant::Multiply,
        }
    }

    /// Allowed speed magnitude for this variant
    pub fn speed_range(&self, classic: bool) -> (f32, f32) {
        if classic {
            return (0.0, CLASSIC_MAX_SPEED);
        }
        match self {
            BallBehaviour::Curve { .. } => (CURVE_MIN_SPEED, STANDARD_MAX_SPEED),
            BallBehaviour::Burst(_) => (0.0, BURST_MAX_SPEED),
            _ => (0.0, STANDARD_MAX_SPEED),
        }
    }

    pub fn max_speed(&self, classic: bool) -> f32 {
        self.speed_range(classic).1
    }

    /// Clamp a velocity to this variant's speed range
    pub fn clamp(&self, velocity: Vec2, classic: bool) -> Vec2 {
        let (min, max) = self.speed_range(classic);
        clamp_speed(velocity, min, max)
    }

    /// Burst ball creeping before release (slow on purpose)
    pub fn is_winding(&self) -> bool {
        matches!(self, BallBehaviour::Burst(BurstPhase::Winding { .. }))
    }

    /// Consume a pending split; true exactly once for a multiply ball
    pub fn take_split(&mut self) -> bool {
        match self {
            BallBehaviour::Multiply { pending_split } => std::mem::take(pending_split),
            _ => false,
        }
    }

    /// Advance `body` by `frames` reference frames
    pub fn integrate(&mut self, body: &mut Body, frames: f32, classic: bool) {
        match self {
            BallBehaviour::Standard | BallBehaviour::Multiply { .. } => {}
            BallBehaviour::Curve { direction } => {
                let side = crate::perp(body.velocity.normalize_or_zero());
                body.velocity += side * *direction * CURVE_STRENGTH * frames;
            }
            BallBehaviour::Spin(spin) => {
                let dir = if body.velocity.x > 0.0 { 1.0 } else { -1.0 };
                spin.rotation += spin.angular_velocity * dir * frames;
                spin.angular_velocity = (spin.angular_velocity + spin.angular_acceleration * frames)
                    .min(spin.max_angular_velocity);
            }
            BallBehaviour::Burst(phase) => {
                if let BurstPhase::Winding { frames: wound } = phase {
                    *wound += frames;
                    let dir = body.velocity.normalize_or(Vec2::X);
                    if *wound >= BURST_WINDUP_FRAMES {
                        *phase = BurstPhase::Released;
                        body.velocity = dir * BURST_SPEED;
                    } else {
                        body.velocity = dir * BURST_WIND_SPEED;
                    }
                }
            }
        }
        body.velocity = self.clamp(body.velocity, classic);
        body.position += body.velocity * frames;
    }

    /// Hook run after any wall, paddle or hazard rebound; returns the new velocity
    pub fn on_bounce(&mut self, velocity: Vec2) -> Vec2 {
        let BallBehaviour::Spin(spin) = self else {
            return velocity;
        };
        let influence_pct = spin.angular_velocity / spin.max_angular_velocity;
        let influence = spin.rotation.sin() * SPIN_FACTOR * influence_pct;
        let adjustment = influence.clamp(-SPIN_MAX_DEVIATION, SPIN_MAX_DEVIATION);
        let rotated = Vec2::from_angle(adjustment).rotate(velocity);

        spin.angular_acceleration *= 1.02;
        spin.max_angular_velocity = (spin.max_angular_velocity * 1.01).min(SPIN_MAX_ANGULAR_VELOCITY_CAP);

        rotated * SPIN_BOUNCE_BOOST
    }

    /// Paddle contact: burst balls go back to winding up
    pub fn on_paddle_hit(&mut self) {
        if let BallBehaviour::Burst(phase) = self {
            *phase = BurstPhase::Winding { frames: 0.0 };
        }
    }
}

/// Random serve velocity: within ±60° of horizontal, either direction
pub fn random_launch<R: Rng>(rng: &mut R, speed: f32) -> Vec2 {
    let angle = rng.random_range(-BALL_LAUNCH_SPREAD..=BALL_LAUNCH_SPREAD);
    let dir = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
    Vec2::new(angle.cos() * dir, angle.sin()) * speed
}
