//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Variable timestep scaled to reference frames, clamped per step
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering, audio or transport dependencies

pub mod ball;
pub mod geometry;
pub mod hazard;
pub mod opponent;
pub mod oscillation;
pub mod reconcile;
pub mod state;
pub mod store;
pub mod tick;

pub use ball::{BallBehaviour, BallVariant, BurstPhase, SpinState};
pub use geometry::{Aabb, CollisionResult, SweepResult};
pub use hazard::{FigureKind, HazardField};
pub use opponent::{OpponentController, OpponentPhase, predict_intercept_y};
pub use oscillation::OscillationGuard;
pub use reconcile::{BodySnapshot, Correction, Reconciler, Snapshot, SnapshotRejected, Tracked};
pub use state::{
    Contact, ContactKind, FrameInput, GameEvent, PaddleInput, SimClock, SpawnKind, World,
};
pub use store::{BallState, Body, Entity, EntityId, Extent, PaddleState, PickupKind, Role, Side, Store};
pub use tick::step;
