//! World state and core simulation types
//!
//! Everything a frame needs lives in `World`: the entity store, the
//! explicit state of every subsystem, a seeded RNG and the injected clock.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::ball::{BallBehaviour, BallVariant, random_launch};
use super::hazard::{FigureKind, HazardField};
use super::opponent::OpponentController;
use super::oscillation::OscillationGuard;
use super::reconcile::{Reconciler, Snapshot, SnapshotRejected};
use super::store::{
    BallState, Behaviour, Body, Entity, EntityId, Extent, PaddleState, PickupKind, Role, Side, Store,
};
use crate::consts::*;
use crate::tuning::{Difficulty, SessionMode, SimConfig};

/// Bullet defaults
pub const BULLET_SPEED: f32 = 10.0;
pub const BULLET_HALF: Vec2 = Vec2::new(5.0, 10.0);
/// Shield thickness
pub const SHIELD_WIDTH: f32 = 10.0;

/// Up/down buttons for one paddle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaddleInput {
    pub up: bool,
    pub down: bool,
}

impl PaddleInput {
    /// -1 up, +1 down (screen coordinates), 0 for none or both
    pub fn direction(&self) -> f32 {
        match (self.up, self.down) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

/// Human input for a single frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInput {
    pub left: PaddleInput,
    pub right: PaddleInput,
}

impl FrameInput {
    pub fn side(&self, side: Side) -> PaddleInput {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn set(&mut self, side: Side, input: PaddleInput) {
        match side {
            Side::Left => self.left = input,
            Side::Right => self.right = input,
        }
    }
}

/// What a spawn request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnKind {
    Ball(BallVariant),
    Hazard(FigureKind),
    Bullet,
}

/// Discrete events returned by a step, for rendering/audio/persistence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameEvent {
    /// `side` scored a point
    Score { side: Side },
    /// A ball last struck by `side` collected a pickup
    Pickup { entity: EntityId, kind: PickupKind, side: Side },
    Despawn { entity: EntityId },
    /// The core inserted `entity`; collaborators attach visuals to it
    SpawnRequest { entity: EntityId, kind: SpawnKind, position: Vec2 },
    /// `side`'s paddle was frozen by a bullet
    Stunned { side: Side },
}

/// Kind of surface a ball touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Wall,
    Hazard,
    Paddle,
    Shield,
}

/// Ephemeral collision record, consumed within the frame that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub kind: ContactKind,
    pub ball: EntityId,
    pub other: EntityId,
    pub normal: Vec2,
    pub point: Vec2,
    /// Fraction of the frame at which contact occurred
    pub toi: f32,
}

/// Monotonic simulation clock driven by accumulated frame deltas
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimClock {
    elapsed: f64,
}

impl SimClock {
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt as f64;
    }

    /// Seconds since the world was created
    pub fn now(&self) -> f32 {
        self.elapsed as f32
    }
}

/// Complete simulation state
#[derive(Debug, Clone)]
pub struct World {
    pub config: SimConfig,
    pub store: Store,
    pub clock: SimClock,
    pub rng: Pcg32,
    pub guard: OscillationGuard,
    pub opponent: Option<OpponentController>,
    pub reconciler: Reconciler,
    pub hazards: HazardField,
    pub paddles: [EntityId; 2],
    /// Ball driven by snapshots in authoritative mode
    pub server_ball: Option<EntityId>,
    /// Seconds until a fresh live ball is served
    pub respawn_timer: Option<f32>,
}

impl World {
    /// Arena, paddles and a served ball (no ball in authoritative mode)
    pub fn new(config: SimConfig) -> Self {
        let mut world = Self::with_arena(config);
        if !world.config.session.is_authoritative() {
            world.serve();
        }
        world
    }

    /// Walls and paddles only
    pub fn with_arena(config: SimConfig) -> Self {
        for warning in config.validate() {
            log::warn!("config: {warning}");
        }
        let arena = config.arena;
        let mut store = Store::new();

        let wall_half = Vec2::new(arena.width / 2.0, arena.wall_thickness / 2.0);
        for y in [arena.top_wall_offset, arena.bottom_wall_y()] {
            let body = Body::new(Vec2::new(arena.width / 2.0, y), Extent::Box { half: wall_half }).fixed();
            store.spawn(Entity::new(body, Role::Wall));
        }

        let opponent = match config.session {
            SessionMode::VersusAi { ai_side } => Some(OpponentController::new(ai_side, &config.opponent)),
            _ => None,
        };
        let authoritative_local = match config.session {
            SessionMode::Authoritative { role } => Some(role.local_side()),
            _ => None,
        };

        let paddle_half = Vec2::new(arena.paddle_width / 2.0, arena.paddle_height / 2.0);
        let paddles = [Side::Left, Side::Right].map(|side| {
            let x = match side {
                Side::Left => arena.paddle_offset,
                Side::Right => arena.width - arena.paddle_offset,
            };
            let speed = match &opponent {
                Some(ai) if ai.side == side => ai.tuning.speed,
                _ => arena.paddle_speed,
            };
            let mut body = Body::new(Vec2::new(x, arena.height / 2.0), Extent::Box { half: paddle_half })
                .with_speed(speed)
                .with_behaviour(Behaviour::Block);
            body.server_controlled = authoritative_local.is_some_and(|local| local != side);
            store.spawn(Entity::new(
                body,
                Role::Paddle {
                    side,
                    state: PaddleState::new(),
                },
            ))
        });

        log::info!(
            "world created: {}x{} arena, session {:?}, seed {}",
            arena.width,
            arena.height,
            config.session,
            config.seed
        );

        Self {
            rng: Pcg32::seed_from_u64(config.seed),
            guard: OscillationGuard::new(config.oscillation.clone()),
            reconciler: Reconciler::new(config.network.clone()),
            hazards: HazardField::new(config.hazards.clone()),
            opponent,
            store,
            clock: SimClock::default(),
            paddles,
            server_ball: None,
            respawn_timer: None,
            config,
        }
    }

    pub fn paddle_id(&self, side: Side) -> EntityId {
        match side {
            Side::Left => self.paddles[0],
            Side::Right => self.paddles[1],
        }
    }

    pub fn paddle(&self, side: Side) -> Option<&Body> {
        self.store.get(self.paddle_id(side)).map(|e| &e.body)
    }

    pub fn paddle_state_mut(&mut self, side: Side) -> Option<&mut PaddleState> {
        match self.store.get_mut(self.paddle_id(side)).map(|e| &mut e.role) {
            Some(Role::Paddle { state, .. }) => Some(state),
            _ => None,
        }
    }

    /// Id of the scoring ball, if one is in play
    pub fn live_ball(&self) -> Option<EntityId> {
        self.store
            .iter()
            .find(|(_, e)| e.ball().is_some_and(|b| b.live))
            .map(|(id, _)| id)
    }

    pub fn ball_ids(&self) -> Vec<EntityId> {
        self.store.ids_where(Entity::is_ball)
    }

    /// Insert a ball of the given variant
    pub fn spawn_ball(&mut self, variant: BallVariant, position: Vec2, velocity: Vec2, live: bool) -> EntityId {
        let behaviour = BallBehaviour::for_variant(variant, &mut self.rng);
        let mut body = Body::new(position, Extent::Circle { radius: BALL_SIZE / 2.0 }).with_velocity(velocity);
        body.server_controlled = self.config.session.is_authoritative();
        self.store.spawn(Entity::new(body, Role::Ball(BallState::new(behaviour, live))))
    }

    /// Launch a fresh standard live ball from the arena centre
    pub fn serve(&mut self) -> EntityId {
        let velocity = random_launch(&mut self.rng, BALL_START_SPEED);
        let id = self.spawn_ball(BallVariant::Standard, self.config.arena.center(), velocity, true);
        log::info!("ball {id} served at {velocity:?}");
        id
    }

    /// Static polygon hazard from externally authored outlines
    pub fn add_hazard(&mut self, polygons: Vec<Vec<Vec2>>, offset: Vec2) -> EntityId {
        let body = Body::new(offset, Extent::Box { half: Vec2::ZERO })
            .with_polygons(polygons)
            .with_behaviour(Behaviour::Block)
            .fixed();
        self.store.spawn(Entity::new(body, Role::Hazard))
    }

    pub fn add_pickup(&mut self, position: Vec2, half: Vec2, kind: PickupKind) -> EntityId {
        let body = Body::new(position, Extent::Box { half })
            .with_behaviour(Behaviour::Trigger)
            .fixed();
        self.store.spawn(Entity::new(body, Role::Pickup(kind)))
    }

    /// One-shot barrier in front of `side`'s goal line
    pub fn add_shield(&mut self, side: Side) -> EntityId {
        let arena = self.config.arena;
        let x = match side {
            Side::Left => arena.paddle_offset / 3.0,
            Side::Right => arena.width - arena.paddle_offset / 3.0,
        };
        let span = arena.bottom_bound() - arena.top_bound();
        let center = Vec2::new(x, arena.top_bound() + span / 2.0);
        let body = Body::new(center, Extent::Box { half: Vec2::new(SHIELD_WIDTH / 2.0, span / 2.0) })
            .with_behaviour(Behaviour::Trigger)
            .fixed();
        self.store.spawn(Entity::new(body, Role::Shield { side }))
    }

    /// Bullet leaving `owner`'s paddle toward the opponent
    pub fn fire_bullet(&mut self, owner: Side) -> Option<EntityId> {
        let paddle = self.paddle(owner)?;
        let dir = owner.outward_sign();
        let start = paddle.position + Vec2::new(dir * (paddle.extent.half_extents().x + BULLET_HALF.x), 0.0);
        let body = Body::new(start, Extent::Box { half: BULLET_HALF })
            .with_velocity(Vec2::new(dir * BULLET_SPEED, 0.0))
            .with_speed(BULLET_SPEED)
            .with_behaviour(Behaviour::Trigger);
        Some(self.store.spawn(Entity::new(body, Role::Bullet { owner })))
    }

    /// Ingest an authoritative snapshot; rejected ones leave state untouched
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<(), SnapshotRejected> {
        self.reconciler.offer(snapshot).inspect_err(|e| {
            log::warn!("snapshot rejected: {e}");
        })
    }

    /// Retune the opponent; speed, accuracy and dead-zone change together
    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.config.opponent.difficulty = difficulty;
        let Some(ai) = self.opponent.as_mut() else {
            return;
        };
        ai.set_difficulty(difficulty);
        let (side, speed) = (ai.side, ai.tuning.speed);
        if let Some(entity) = self.store.get_mut(self.paddle_id(side)) {
            entity.body.speed = Some(speed);
        }
        log::info!("opponent difficulty set to {}", difficulty.as_str());
    }

    /// Advance one frame and return the events it produced
    pub fn step(&mut self, input: &FrameInput, dt: f32) -> Vec<GameEvent> {
        super::tick::step(self, input, dt)
    }
}
