//! Pong Core - simulation heart of a multi-ball, multi-hazard Pong variant
//!
//! Core modules:
//! - `sim`: Deterministic simulation (bodies, collisions, opponent, reconciliation)
//! - `tuning`: Data-driven configuration and difficulty presets

pub mod sim;
pub mod tuning;

pub use tuning::{Difficulty, SessionMode, SimConfig};

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Velocities are stored in units per reference frame at this rate
    pub const REFERENCE_FPS: f32 = 60.0;
    /// Largest frame delta accepted by a single step (seconds)
    pub const MAX_DT: f32 = 0.1;

    /// Arena dimensions
    pub const ARENA_WIDTH: f32 = 1500.0;
    pub const ARENA_HEIGHT: f32 = 800.0;
    pub const TOP_WALL_OFFSET: f32 = 60.0;
    pub const BOTTOM_WALL_OFFSET: f32 = 80.0;
    pub const WALL_THICKNESS: f32 = 20.0;

    /// Paddle defaults
    pub const PADDLE_OFFSET: f32 = 60.0;
    pub const PADDLE_WIDTH: f32 = 10.0;
    pub const PADDLE_HEIGHT: f32 = 80.0;
    pub const PADDLE_SPEED: f32 = 20.0;
    /// Frames a bullet hit keeps a paddle frozen
    pub const STUN_FRAMES: f32 = 100.0;

    /// Ball defaults
    pub const BALL_SIZE: f32 = 20.0;
    pub const BALL_START_SPEED: f32 = 10.0;
    /// Launch angle spread either side of horizontal (radians, 60 degrees)
    pub const BALL_LAUNCH_SPREAD: f32 = std::f32::consts::FRAC_PI_3;

    /// Speed caps (units per reference frame)
    pub const STANDARD_MAX_SPEED: f32 = 10.0;
    pub const CLASSIC_MAX_SPEED: f32 = 20.0;
    pub const BURST_MAX_SPEED: f32 = 17.0;
    pub const HAZARD_MAX_SPEED: f32 = 15.0;

    /// Paddle rebound shaping
    pub const MAX_BOUNCE_ANGLE: f32 = std::f32::consts::FRAC_PI_4;
    pub const MAX_RELATIVE_HIT: f32 = 0.8;
    pub const PADDLE_INFLUENCE: f32 = 0.5;
    pub const MAX_PADDLE_INFLUENCE: f32 = 5.0;
    pub const MIN_HORIZONTAL_COMPONENT: f32 = 0.7;
    pub const HAZARD_MIN_HORIZONTAL_COMPONENT: f32 = 0.5;

    /// Extra clearance when pushing a ball out of hazard geometry
    pub const HAZARD_PUSH_EPSILON: f32 = 1.5;
    pub const HAZARD_DEEP_PUSH_EPSILON: f32 = 2.0;
}

/// Convert a frame delta in seconds into reference frames
#[inline]
pub fn frames_for(dt: f32) -> f32 {
    dt * consts::REFERENCE_FPS
}

/// Perpendicular of a vector (rotated +90 degrees)
#[inline]
pub fn perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Rescale `v` so its length lies within [min, max]; zero vectors stay zero
#[inline]
pub fn clamp_speed(v: Vec2, min: f32, max: f32) -> Vec2 {
    let speed = v.length();
    if speed <= f32::EPSILON {
        return v;
    }
    let clamped = speed.clamp(min, max);
    if clamped == speed { v } else { v * (clamped / speed) }
}

/// True when both components are finite
#[inline]
pub fn is_finite_vec(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}
