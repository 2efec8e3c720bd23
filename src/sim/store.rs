//! Entity/component store
//!
//! A plain registry from entity id to physics body plus a role tag. No
//! behaviour lives here; iteration is always in ascending id order so the
//! simulation stays deterministic.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::ball::BallBehaviour;
use super::geometry::Aabb;

/// Entity identifier, allocated monotonically by the store
pub type EntityId = u32;

/// Which end of the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Horizontal direction pointing away from this side's goal
    pub fn outward_sign(self) -> f32 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Collision extent of a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Extent {
    Box { half: Vec2 },
    Circle { radius: f32 },
}

impl Extent {
    pub fn half_extents(&self) -> Vec2 {
        match *self {
            Extent::Box { half } => half,
            Extent::Circle { radius } => Vec2::splat(radius),
        }
    }

    /// Radius of the bounding circle used against polygon hazards
    pub fn radius(&self) -> f32 {
        match *self {
            Extent::Box { half } => half.x.max(half.y),
            Extent::Circle { radius } => radius,
        }
    }
}

/// Response a body requests from whatever touches it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Behaviour {
    #[default]
    Bounce,
    Block,
    Trigger,
    None,
}

/// Simulated physical state of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub position: Vec2,
    /// Units per reference frame
    pub velocity: Vec2,
    pub extent: Extent,
    pub mass: f32,
    pub restitution: f32,
    pub is_static: bool,
    pub behaviour: Behaviour,
    /// Travel speed for input-driven bodies (paddles, bullets)
    pub speed: Option<f32>,
    /// Closed point loops in local space, translated by `position`
    pub polygons: Vec<Vec<Vec2>>,
    /// Driven by network snapshots instead of local integration
    pub server_controlled: bool,
}

impl Body {
    pub fn new(position: Vec2, extent: Extent) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            extent,
            mass: 1.0,
            restitution: 1.0,
            is_static: false,
            behaviour: Behaviour::Bounce,
            speed: None,
            polygons: Vec::new(),
            server_controlled: false,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_behaviour(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn with_polygons(mut self, polygons: Vec<Vec<Vec2>>) -> Self {
        self.polygons = polygons;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.position, self.extent.half_extents())
    }
}

/// Modifiers the power-up system toggles on a paddle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaddleState {
    /// Remaining frozen reference frames
    pub stun_frames: f32,
    pub inverted: bool,
    /// Speed multiplier (1.0 = normal)
    pub slowness: f32,
    pub magnetized: bool,
    pub flat: bool,
}

impl PaddleState {
    pub fn new() -> Self {
        Self {
            slowness: 1.0,
            ..Default::default()
        }
    }

    pub fn is_stunned(&self) -> bool {
        self.stun_frames > 0.0
    }
}

/// Tags carried by a ball entity
#[derive(Debug, Clone, PartialEq)]
pub struct BallState {
    pub behaviour: BallBehaviour,
    /// Only the live ball scores; decoys just leave the arena
    pub live: bool,
    pub last_hit: Option<Side>,
}

impl BallState {
    pub fn new(behaviour: BallBehaviour, live: bool) -> Self {
        Self {
            behaviour,
            live,
            last_hit: None,
        }
    }
}

/// What a pickup does once collected; applied by an external system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupKind {
    PowerUp,
    PowerDown,
    BallChange,
}

/// Role tag that tells the engine how to treat a body
#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    Ball(BallState),
    Paddle { side: Side, state: PaddleState },
    Wall,
    /// Travels away from `owner` and stuns the opposing paddle
    Bullet { owner: Side },
    /// One-shot barrier guarding `side`'s goal
    Shield { side: Side },
    Hazard,
    Pickup(PickupKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub body: Body,
    pub role: Role,
}

impl Entity {
    pub fn new(body: Body, role: Role) -> Self {
        Self { body, role }
    }

    pub fn ball(&self) -> Option<&BallState> {
        match &self.role {
            Role::Ball(state) => Some(state),
            _ => None,
        }
    }

    pub fn ball_mut(&mut self) -> Option<&mut BallState> {
        match &mut self.role {
            Role::Ball(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_ball(&self) -> bool {
        matches!(self.role, Role::Ball(_))
    }
}

/// Registry of all simulated entities
#[derive(Debug, Clone, Default)]
pub struct Store {
    entities: BTreeMap<EntityId, Entity>,
    next_id: EntityId,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under a caller-chosen id, returning any entity it replaced
    pub fn insert(&mut self, id: EntityId, entity: Entity) -> Option<Entity> {
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.entities.insert(id, entity)
    }

    /// Insert under a freshly allocated id
    ///
    /// Ids climb monotonically; once the top of the id space is taken the
    /// lowest free id is reused instead.
    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        let mut id = self.next_id;
        if self.entities.contains_key(&id) {
            id = (0..EntityId::MAX)
                .find(|candidate| !self.entities.contains_key(candidate))
                .unwrap_or(EntityId::MAX);
            log::warn!("entity ids exhausted, reusing {id}");
        }
        self.next_id = id.checked_add(1).unwrap_or(EntityId::MAX);
        self.entities.insert(id, entity);
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter().map(|(&id, e)| (id, e))
    }

    /// Visit every entity matching `predicate`, in id order
    pub fn for_each<P, V>(&mut self, mut predicate: P, mut visitor: V)
    where
        P: FnMut(&Entity) -> bool,
        V: FnMut(EntityId, &mut Entity),
    {
        for (&id, entity) in self.entities.iter_mut() {
            if predicate(entity) {
                visitor(id, entity);
            }
        }
    }

    /// Ids of entities matching `predicate`, in id order
    pub fn ids_where<P>(&self, mut predicate: P) -> Vec<EntityId>
    where
        P: FnMut(&Entity) -> bool,
    {
        self.entities
            .iter()
            .filter(|(_, e)| predicate(e))
            .map(|(&id, _)| id)
            .collect()
    }
}
