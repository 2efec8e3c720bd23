//! Network reconciliation
//!
//! Holds the latest authoritative snapshot and decides, per tracked body,
//! whether to snap to it, smooth toward it or leave local state alone.

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::store::{Body, Side};
use crate::is_finite_vec;
use crate::tuning::ReconcileConfig;

/// Canonical state of one body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub position: Vec2,
    pub velocity: Vec2,
}

impl BodySnapshot {
    pub fn new(position: Vec2, velocity: Vec2) -> Self {
        Self { position, velocity }
    }

    fn is_finite(&self) -> bool {
        is_finite_vec(self.position) && is_finite_vec(self.velocity)
    }
}

/// Authoritative server state for one frame, already deserialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Server time; must never go backwards
    pub timestamp: f64,
    /// None while the server has no ball in play
    pub ball: Option<BodySnapshot>,
    pub left: BodySnapshot,
    pub right: BodySnapshot,
}

impl Snapshot {
    pub fn paddle(&self, side: Side) -> BodySnapshot {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.left.is_finite()
            && self.right.is_finite()
            && self.ball.is_none_or(|b| b.is_finite())
    }
}

/// Why a snapshot was ignored
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapshotRejected {
    OutOfOrder { latest: f64, received: f64 },
    NonFinite,
}

impl fmt::Display for SnapshotRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotRejected::OutOfOrder { latest, received } => {
                write!(f, "snapshot at {received} is older than applied snapshot at {latest}")
            }
            SnapshotRejected::NonFinite => write!(f, "snapshot contains non-finite values"),
        }
    }
}

impl std::error::Error for SnapshotRejected {}

/// Bodies the server tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tracked {
    Ball,
    Paddle(Side),
}

/// What happened to a body this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Moved exactly onto the snapshot
    Snap,
    /// Moved part of the way toward the snapshot
    Smooth,
    /// Left at its locally predicted position
    Hold,
}

/// Snap or smooth a remote body toward `target`
///
/// Snaps when there is no earlier server target, when the body is still
/// parked off-screen from spawning, or when the gap exceeds `teleport`.
pub fn correct(current: Vec2, target: Vec2, prior_target: Option<Vec2>, lerp: f32, teleport: f32) -> (Vec2, Correction) {
    let spawning = current.x < 0.0 || current.y < 0.0;
    if prior_target.is_none() || spawning || current.distance(target) > teleport {
        (target, Correction::Snap)
    } else {
        (current.lerp(target, lerp), Correction::Smooth)
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    pub config: ReconcileConfig,
    latest: Option<Snapshot>,
    prior_targets: BTreeMap<Tracked, Vec2>,
    since_snapshot: f32,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            config,
            latest: None,
            prior_targets: BTreeMap::new(),
            since_snapshot: 0.0,
        }
    }

    /// Store a snapshot in the single latest slot (last write wins)
    pub fn offer(&mut self, snapshot: Snapshot) -> Result<(), SnapshotRejected> {
        if !snapshot.is_finite() {
            return Err(SnapshotRejected::NonFinite);
        }
        if let Some(latest) = &self.latest
            && snapshot.timestamp < latest.timestamp
        {
            return Err(SnapshotRejected::OutOfOrder {
                latest: latest.timestamp,
                received: snapshot.timestamp,
            });
        }
        self.latest = Some(snapshot);
        self.since_snapshot = 0.0;
        Ok(())
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    pub fn advance(&mut self, dt: f32) {
        self.since_snapshot += dt;
    }

    /// Local input should be integrated because the server has gone quiet
    pub fn should_predict_locally(&self) -> bool {
        self.latest.is_none() || self.since_snapshot > self.config.prediction_delay
    }

    /// Drive a server-owned body (ball or remote paddle) toward its target
    pub fn reconcile_remote(&mut self, key: Tracked, body: &mut Body, target: BodySnapshot, lerp: f32) -> Correction {
        let prior = self.prior_targets.insert(key, target.position);
        let (position, correction) = correct(
            body.position,
            target.position,
            prior,
            lerp,
            self.config.teleport_distance,
        );
        body.position = position;
        body.velocity = target.velocity;
        if correction == Correction::Snap {
            log::debug!("{key:?} snapped to {:?}", target.position);
        }
        correction
    }

    /// Keep the local paddle where input put it unless it drifted too far
    pub fn reconcile_local(&mut self, key: Tracked, body: &mut Body, target: BodySnapshot) -> Correction {
        self.prior_targets.insert(key, target.position);
        if body.position.distance(target.position) > self.config.local_tolerance {
            body.position = target.position;
            Correction::Snap
        } else {
            Correction::Hold
        }
    }

    /// Drop the remembered target so the next appearance snaps
    pub fn forget(&mut self, key: Tracked) {
        self.prior_targets.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::store::Extent;

    fn snap_at(timestamp: f64, ball: Vec2) -> Snapshot {
        Snapshot {
            timestamp,
            ball: Some(BodySnapshot::new(ball, Vec2::new(5.0, 0.0))),
            left: BodySnapshot::new(Vec2::new(60.0, 400.0), Vec2::ZERO),
            right: BodySnapshot::new(Vec2::new(1440.0, 400.0), Vec2::ZERO),
        }
    }

    #[test]
    fn test_correct_snap_vs_smooth() {
        let (p, c) = correct(Vec2::new(100.0, 100.0), Vec2::new(500.0, 100.0), Some(Vec2::ZERO), 0.75, 300.0);
        assert_eq!(c, Correction::Snap);
        assert_eq!(p, Vec2::new(500.0, 100.0));

        let (p, c) = correct(Vec2::new(100.0, 100.0), Vec2::new(200.0, 100.0), Some(Vec2::ZERO), 0.75, 300.0);
        assert_eq!(c, Correction::Smooth);
        assert!(p.x > 100.0 && p.x < 200.0);

        let (_, c) = correct(Vec2::new(100.0, 100.0), Vec2::new(110.0, 100.0), None, 0.75, 300.0);
        assert_eq!(c, Correction::Snap);

        let (_, c) = correct(Vec2::new(-50.0, 100.0), Vec2::new(10.0, 100.0), Some(Vec2::ZERO), 0.75, 300.0);
        assert_eq!(c, Correction::Snap);
    }

    #[test]
    fn test_offer_rejects_out_of_order() {
        let mut r = Reconciler::new(ReconcileConfig::default());
        r.offer(snap_at(2.0, Vec2::new(700.0, 400.0))).expect("first snapshot");
        let err = r.offer(snap_at(1.0, Vec2::new(10.0, 10.0))).unwrap_err();
        assert_eq!(err, SnapshotRejected::OutOfOrder { latest: 2.0, received: 1.0 });
        assert_eq!(r.latest().map(|s| s.timestamp), Some(2.0));

        // Equal timestamps are accepted
        assert!(r.offer(snap_at(2.0, Vec2::new(710.0, 400.0))).is_ok());
    }

    #[test]
    fn test_offer_rejects_non_finite() {
        let mut r = Reconciler::new(ReconcileConfig::default());
        let err = r.offer(snap_at(1.0, Vec2::new(f32::NAN, 0.0))).unwrap_err();
        assert_eq!(err, SnapshotRejected::NonFinite);
        assert!(r.latest().is_none());
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_local_paddle_tolerance_band() {
        let mut r = Reconciler::new(ReconcileConfig::default());
        let mut body = Body::new(Vec2::new(60.0, 400.0), Extent::Box { half: Vec2::new(5.0, 40.0) });

        let c = r.reconcile_local(Tracked::Paddle(Side::Left), &mut body, BodySnapshot::new(Vec2::new(60.0, 410.0), Vec2::ZERO));
        assert_eq!(c, Correction::Hold);
        assert_eq!(body.position.y, 400.0);

        let c = r.reconcile_local(Tracked::Paddle(Side::Left), &mut body, BodySnapshot::new(Vec2::new(60.0, 450.0), Vec2::ZERO));
        assert_eq!(c, Correction::Snap);
        assert_eq!(body.position.y, 450.0);
    }

    #[test]
    fn test_prediction_after_silence() {
        let mut r = Reconciler::new(ReconcileConfig::default());
        assert!(r.should_predict_locally());
        r.offer(snap_at(0.0, Vec2::new(700.0, 400.0))).expect("snapshot");
        assert!(!r.should_predict_locally());
        r.advance(0.1);
        assert!(r.should_predict_locally());
    }
}
