//! Data-driven simulation tuning
//!
//! Every field has a default so partial JSON documents load cleanly.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::sim::Side;

/// Opponent difficulty presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Concrete opponent parameters derived from a difficulty preset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpponentTuning {
    /// Paddle speed (units per reference frame)
    pub speed: f32,
    /// 1.0 = perfect prediction, lower values add aim noise
    pub accuracy: f32,
    /// Distance from target inside which no input is issued
    pub dead_zone: f32,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" | "med" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Speed, accuracy and dead-zone move together per preset
    pub fn tuning(&self) -> OpponentTuning {
        match self {
            Difficulty::Easy => OpponentTuning {
                speed: 10.0,
                accuracy: 0.7,
                dead_zone: 25.0,
            },
            Difficulty::Medium => OpponentTuning {
                speed: 8.0,
                accuracy: 0.85,
                dead_zone: 15.0,
            },
            Difficulty::Hard => OpponentTuning {
                speed: 12.0,
                accuracy: 0.95,
                dead_zone: 8.0,
            },
        }
    }
}

/// Which end of an online session this process is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetRole {
    /// Owns the left paddle
    Host,
    /// Owns the right paddle
    Guest,
}

impl NetRole {
    pub fn local_side(&self) -> Side {
        match self {
            NetRole::Host => Side::Left,
            NetRole::Guest => Side::Right,
        }
    }
}

/// How a frame is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum SessionMode {
    /// Two local players, full simulation
    #[default]
    Local,
    /// One paddle driven by the opponent controller
    VersusAi { ai_side: Side },
    /// Server snapshots drive balls and paddles
    Authoritative { role: NetRole },
}

impl SessionMode {
    pub fn is_authoritative(&self) -> bool {
        matches!(self, SessionMode::Authoritative { .. })
    }
}

/// Arena and paddle geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub width: f32,
    pub height: f32,
    /// Centre line of the top wall, measured from y = 0
    pub top_wall_offset: f32,
    /// Distance from the arena bottom to the bottom wall's far edge
    pub bottom_wall_offset: f32,
    pub wall_thickness: f32,
    /// Horizontal distance of each paddle from its goal line
    pub paddle_offset: f32,
    pub paddle_width: f32,
    pub paddle_height: f32,
    pub paddle_speed: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
            top_wall_offset: TOP_WALL_OFFSET,
            bottom_wall_offset: BOTTOM_WALL_OFFSET,
            wall_thickness: WALL_THICKNESS,
            paddle_offset: PADDLE_OFFSET,
            paddle_width: PADDLE_WIDTH,
            paddle_height: PADDLE_HEIGHT,
            paddle_speed: PADDLE_SPEED,
        }
    }
}

impl ArenaConfig {
    /// Y coordinate of the bottom wall's centre line
    pub fn bottom_wall_y(&self) -> f32 {
        self.height - (self.bottom_wall_offset - self.wall_thickness)
    }

    /// Inner face of the top wall
    pub fn top_bound(&self) -> f32 {
        self.top_wall_offset + self.wall_thickness / 2.0
    }

    /// Inner face of the bottom wall
    pub fn bottom_bound(&self) -> f32 {
        self.bottom_wall_y() - self.wall_thickness / 2.0
    }

    pub fn center(&self) -> glam::Vec2 {
        glam::Vec2::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Oscillation guard thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillationConfig {
    /// History retained per ball (seconds)
    pub window: f32,
    /// Four collisions inside this span count as rapid (seconds)
    pub rapid_span: f32,
    /// Normals with a dot product below this are antiparallel
    pub antiparallel_dot: f32,
    pub min_opposite_pairs: usize,
    /// Post-collision speed below this counts as parked
    pub stuck_speed: f32,
    /// Per-frame displacement below this counts as parked
    pub stuck_distance: f32,
    pub unstick_min_speed: f32,
    /// Size of the corrective kick (units per reference frame)
    pub impulse: f32,
}

impl Default for OscillationConfig {
    fn default() -> Self {
        Self {
            window: 2.0,
            rapid_span: 1.0,
            antiparallel_dot: -0.5,
            min_opposite_pairs: 2,
            stuck_speed: 3.0,
            stuck_distance: 1.0,
            unstick_min_speed: 5.0,
            impulse: 2.0,
        }
    }
}

/// Network reconciliation heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Positional delta beyond which a body snaps instead of smoothing
    pub teleport_distance: f32,
    pub ball_lerp: f32,
    pub remote_paddle_lerp: f32,
    /// Local paddle keeps its own position until it drifts this far
    pub local_tolerance: f32,
    /// Seconds without a snapshot before local input is integrated
    pub prediction_delay: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            teleport_distance: 300.0,
            ball_lerp: 0.75,
            remote_paddle_lerp: 0.6,
            local_tolerance: 15.0,
            prediction_delay: 0.05,
        }
    }
}

/// Opponent controller cadence and noise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpponentConfig {
    /// Seconds between decisions
    pub decision_interval: f32,
    /// Aim error span at accuracy 0
    pub max_error: f32,
    pub difficulty: Difficulty,
}

impl Default for OpponentConfig {
    fn default() -> Self {
        Self {
            decision_interval: 1.0,
            max_error: 60.0,
            difficulty: Difficulty::Medium,
        }
    }
}

/// Depth-scrolling hazard field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    pub enabled: bool,
    /// Seconds between new background figures
    pub spawn_interval: f32,
    /// Depth units per second
    pub scroll_speed: f32,
    /// Depth at which a figure becomes collidable
    pub activation_depth: f32,
    /// Depth at which a live hazard is retired
    pub exit_depth: f32,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spawn_interval: 20.0,
            scroll_speed: 0.05,
            activation_depth: 0.5,
            exit_depth: 1.0,
        }
    }
}

/// Complete simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub session: SessionMode,
    pub arena: ArenaConfig,
    /// Classic rules: higher speed cap, horizontal speed ramp, no decorations
    pub classic_mode: bool,
    /// Horizontal speed gained per reference frame in classic mode
    pub classic_ramp: f32,
    /// Seconds before a fresh live ball appears after a score (None disables)
    pub respawn_delay: Option<f32>,
    pub oscillation: OscillationConfig,
    pub network: ReconcileConfig,
    pub opponent: OpponentConfig,
    pub hazards: HazardConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            session: SessionMode::Local,
            arena: ArenaConfig::default(),
            classic_mode: false,
            classic_ramp: 0.005,
            respawn_delay: Some(2.0),
            oscillation: OscillationConfig::default(),
            network: ReconcileConfig::default(),
            opponent: OpponentConfig::default(),
            hazards: HazardConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parse a (possibly partial) JSON document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Suspicious values as human-readable warnings (empty when sane).
    /// Callers log each one; none of them are fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut w = Vec::new();
        let a = &self.arena;
        if a.width <= 0.0 || a.height <= 0.0 {
            w.push("arena dimensions must be > 0".into());
        }
        if a.top_bound() >= a.bottom_bound() {
            w.push(format!(
                "walls overlap: top bound {} >= bottom bound {}",
                a.top_bound(),
                a.bottom_bound()
            ));
        }
        if a.paddle_height >= a.bottom_bound() - a.top_bound() {
            w.push(format!(
                "arena.paddle_height {} leaves no travel between walls",
                a.paddle_height
            ));
        }
        if a.paddle_speed <= 0.0 {
            w.push("arena.paddle_speed must be > 0".into());
        }
        if let Some(delay) = self.respawn_delay
            && delay < 0.0
        {
            w.push(format!("respawn_delay {delay} negative -> treated as 0"));
        }
        let o = &self.oscillation;
        if o.rapid_span > o.window {
            w.push(format!(
                "oscillation.rapid_span {} exceeds window {}; history expires first",
                o.rapid_span, o.window
            ));
        }
        if !(-1.0..=0.0).contains(&o.antiparallel_dot) {
            w.push(format!(
                "oscillation.antiparallel_dot {} outside -1..0",
                o.antiparallel_dot
            ));
        }
        let n = &self.network;
        for (label, v) in [
            ("network.ball_lerp", n.ball_lerp),
            ("network.remote_paddle_lerp", n.remote_paddle_lerp),
        ] {
            if !(0.0..=1.0).contains(&v) || v == 0.0 {
                w.push(format!("{label} {v} should be in (0, 1]"));
            }
        }
        if n.teleport_distance <= 0.0 {
            w.push("network.teleport_distance must be > 0".into());
        }
        if self.opponent.decision_interval <= 0.0 {
            w.push("opponent.decision_interval must be > 0".into());
        }
        let h = &self.hazards;
        if h.activation_depth >= h.exit_depth {
            w.push(format!(
                "hazards.activation_depth {} >= exit_depth {}; hazards never go live",
                h.activation_depth, h.exit_depth
            ));
        }
        if h.enabled && h.scroll_speed <= 0.0 {
            w.push("hazards.scroll_speed must be > 0 when enabled".into());
        }
        w
    }
}
