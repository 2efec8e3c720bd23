//! End-to-end behaviour of the simulation through the public API

use glam::Vec2;
use proptest::prelude::*;

use pong_core::consts::*;
use pong_core::sim::geometry::{Aabb, aabb_overlap, swept_aabb};
use pong_core::sim::{
    BallVariant, BodySnapshot, Entity, FrameInput, GameEvent, PickupKind, Role, Side, Snapshot, SnapshotRejected,
    SpawnKind, World, predict_intercept_y,
};
use pong_core::tuning::NetRole;
use pong_core::{SessionMode, SimConfig};

const DT: f32 = 1.0 / 60.0;

fn quiet_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.hazards.enabled = false;
    config
}

fn run(world: &mut World, frames: usize) -> Vec<GameEvent> {
    let input = FrameInput::default();
    (0..frames).flat_map(|_| world.step(&input, DT)).collect()
}

fn snapshot(timestamp: f64, ball: Option<Vec2>) -> Snapshot {
    Snapshot {
        timestamp,
        ball: ball.map(|p| BodySnapshot::new(p, Vec2::new(5.0, 0.0))),
        left: BodySnapshot::new(Vec2::new(PADDLE_OFFSET, 400.0), Vec2::ZERO),
        right: BodySnapshot::new(Vec2::new(ARENA_WIDTH - PADDLE_OFFSET, 400.0), Vec2::ZERO),
    }
}

#[test]
fn test_fast_ball_cannot_tunnel_through_thin_paddle() {
    let ball = Aabb::new(Vec2::ZERO, Vec2::splat(5.0));
    let paddle = Aabb::new(Vec2::new(50.0, 0.0), Vec2::new(2.0, 20.0));
    let displacement = Vec2::new(100.0, 0.0);

    // End-of-frame overlap misses it entirely
    assert!(!aabb_overlap(&ball.translated(displacement), &paddle));

    let sweep = swept_aabb(&ball, displacement, &paddle);
    assert!(sweep.hit);
    assert!((0.0..=1.0).contains(&sweep.time));
    assert!((sweep.time - 0.43).abs() < 1e-4);
    assert_eq!(sweep.normal, Vec2::new(-1.0, 0.0));
}

#[test]
fn test_fast_ball_bounces_off_paddle_in_world() {
    let mut world = World::with_arena(quiet_config());
    let paddle = world.paddle(Side::Right).cloned().expect("right paddle");
    let id = world.spawn_ball(
        BallVariant::Standard,
        paddle.position - Vec2::new(60.0, 0.0),
        Vec2::new(10.0, 0.0),
        true,
    );
    // Six reference frames in one step: 60 units of travel across a 10 unit paddle
    world.step(&FrameInput::default(), 0.1);
    let ball = world.store.get(id).expect("ball survives");
    assert!(ball.body.velocity.x < 0.0);
    assert!(ball.body.position.x < paddle.position.x);
}

#[test]
fn test_opponent_prediction_reflects_analytically() {
    let y = predict_intercept_y(Vec2::new(100.0, 100.0), Vec2::new(5.0, 5.0), 780.0, 80.0, 720.0)
        .expect("ball heading toward paddle");
    assert!((80.0..=720.0).contains(&y));
    assert!((y - 660.0).abs() < 1e-3);
}

#[test]
fn test_live_ball_scores_exactly_once() {
    let mut world = World::with_arena(quiet_config());
    let id = world.spawn_ball(BallVariant::Standard, Vec2::new(5.0, 400.0), Vec2::new(-10.0, 0.0), true);
    let events = run(&mut world, 30);

    let scores: Vec<_> = events.iter().filter(|e| matches!(e, GameEvent::Score { .. })).collect();
    assert_eq!(scores, vec![&GameEvent::Score { side: Side::Right }]);
    assert_eq!(
        events.iter().filter(|e| **e == GameEvent::Despawn { entity: id }).count(),
        1
    );
    assert!(world.store.get(id).is_none());
    assert!(world.respawn_timer.is_some());
}

#[test]
fn test_respawn_serves_new_ball_after_delay() {
    let mut config = quiet_config();
    config.respawn_delay = Some(0.5);
    let mut world = World::with_arena(config);
    world.spawn_ball(BallVariant::Standard, Vec2::new(ARENA_WIDTH - 5.0, 400.0), Vec2::new(10.0, 0.0), true);
    let events = run(&mut world, 40);

    assert!(events.contains(&GameEvent::Score { side: Side::Left }));
    let served = events.iter().find_map(|e| match e {
        GameEvent::SpawnRequest {
            entity,
            kind: SpawnKind::Ball(BallVariant::Standard),
            ..
        } => Some(*entity),
        _ => None,
    });
    let served = served.expect("ball served after delay");
    assert_eq!(world.live_ball(), Some(served));
}

#[test]
fn test_split_yields_one_live_and_two_decoys() {
    let mut world = World::with_arena(quiet_config());
    let source = world.spawn_ball(BallVariant::Multiply, Vec2::new(700.0, 400.0), Vec2::new(5.0, 0.0), true);
    let events = world.step(&FrameInput::default(), DT);

    assert!(events.contains(&GameEvent::Despawn { entity: source }));
    let spawned = events
        .iter()
        .filter(|e| matches!(e, GameEvent::SpawnRequest { kind: SpawnKind::Ball(BallVariant::Multiply), .. }))
        .count();
    assert_eq!(spawned, 3);

    let balls: Vec<_> = world.ball_ids().into_iter().filter_map(|id| world.store.get(id)).collect();
    assert_eq!(balls.len(), 3);
    assert_eq!(balls.iter().filter(|e| e.ball().is_some_and(|b| b.live)).count(), 1);

    // Clones never split again
    let events = run(&mut world, 5);
    assert!(!events.iter().any(|e| matches!(e, GameEvent::SpawnRequest { .. })));
}

#[test]
fn test_bullet_stuns_opponent_once() {
    let mut world = World::with_arena(quiet_config());
    let bullet = world.fire_bullet(Side::Left).expect("left paddle exists");
    let input = FrameInput::default();
    let mut events = Vec::new();
    for _ in 0..40 {
        events.extend(world.step(&input, 0.1));
    }

    let stuns = events.iter().filter(|e| matches!(e, GameEvent::Stunned { .. })).count();
    assert_eq!(stuns, 1);
    assert!(events.contains(&GameEvent::Stunned { side: Side::Right }));
    assert!(events.contains(&GameEvent::Despawn { entity: bullet }));
    assert!(world.store.get(bullet).is_none());
}

#[test]
fn test_pickup_reports_the_last_hitter() {
    let mut world = World::with_arena(quiet_config());
    let pickup = world.add_pickup(Vec2::new(200.0, 400.0), Vec2::splat(15.0), PickupKind::BallChange);
    world.spawn_ball(BallVariant::Standard, Vec2::new(100.0, 400.0), Vec2::new(-10.0, 0.0), true);
    let events = run(&mut world, 20);

    assert!(events.contains(&GameEvent::Pickup {
        entity: pickup,
        kind: PickupKind::BallChange,
        side: Side::Left,
    }));
    assert!(events.contains(&GameEvent::Despawn { entity: pickup }));
}

#[test]
fn test_unstruck_ball_ignores_pickups() {
    let mut world = World::with_arena(quiet_config());
    let pickup = world.add_pickup(Vec2::new(700.0, 400.0), Vec2::splat(15.0), PickupKind::PowerDown);
    world.spawn_ball(BallVariant::Standard, Vec2::new(650.0, 400.0), Vec2::new(5.0, 0.0), true);
    let events = run(&mut world, 20);
    assert!(!events.iter().any(|e| matches!(e, GameEvent::Pickup { .. })));
    assert!(world.store.contains(pickup));
}

#[test]
fn test_snapshot_snaps_then_smooths() {
    let config = SimConfig {
        session: SessionMode::Authoritative { role: NetRole::Guest },
        ..quiet_config()
    };
    let mut world = World::new(config);
    let input = FrameInput::default();

    world.apply_snapshot(snapshot(0.0, Some(Vec2::new(700.0, 400.0)))).expect("first snapshot");
    let events = world.step(&input, DT);
    let ball = world.server_ball.expect("ball created from snapshot");
    assert!(events.iter().any(|e| matches!(e, GameEvent::SpawnRequest { entity, .. } if *entity == ball)));
    assert_eq!(world.store.get(ball).map(|e| e.body.position), Some(Vec2::new(700.0, 400.0)));

    // Within the teleport distance: partial movement
    world.apply_snapshot(snapshot(0.1, Some(Vec2::new(800.0, 400.0)))).expect("second snapshot");
    world.step(&input, DT);
    let x = world.store.get(ball).map(|e| e.body.position.x).expect("ball");
    assert!(x > 700.0 && x < 800.0);

    // Beyond it: exact snap
    world.apply_snapshot(snapshot(0.2, Some(Vec2::new(100.0, 300.0)))).expect("third snapshot");
    world.step(&input, DT);
    assert_eq!(world.store.get(ball).map(|e| e.body.position), Some(Vec2::new(100.0, 300.0)));

    // Server has no ball any more
    world.apply_snapshot(snapshot(0.3, None)).expect("fourth snapshot");
    let events = world.step(&input, DT);
    assert!(events.contains(&GameEvent::Despawn { entity: ball }));
    assert!(world.server_ball.is_none());
}

#[test]
fn test_stale_and_poisoned_snapshots_are_rejected() {
    let config = SimConfig {
        session: SessionMode::Authoritative { role: NetRole::Host },
        ..quiet_config()
    };
    let mut world = World::new(config);
    world.apply_snapshot(snapshot(5.0, Some(Vec2::new(700.0, 400.0)))).expect("snapshot");

    let err = world.apply_snapshot(snapshot(4.0, Some(Vec2::new(10.0, 10.0)))).unwrap_err();
    assert_eq!(err, SnapshotRejected::OutOfOrder { latest: 5.0, received: 4.0 });
    let err = world.apply_snapshot(snapshot(6.0, Some(Vec2::new(f32::INFINITY, 0.0)))).unwrap_err();
    assert_eq!(err, SnapshotRejected::NonFinite);

    assert_eq!(world.reconciler.latest().map(|s| s.timestamp), Some(5.0));
}

#[test]
fn test_local_paddle_predicted_when_server_quiet() {
    let config = SimConfig {
        session: SessionMode::Authoritative { role: NetRole::Host },
        ..quiet_config()
    };
    let mut world = World::new(config);
    let down = FrameInput {
        left: pong_core::sim::PaddleInput { up: false, down: true },
        ..Default::default()
    };
    let before = world.paddle(Side::Left).map(|p| p.position.y).expect("left paddle");
    world.step(&down, DT);
    let after = world.paddle(Side::Left).map(|p| p.position.y).expect("left paddle");
    assert!((after - before - PADDLE_SPEED).abs() < 1e-3);

    // Remote paddle never moves from input
    let remote = world.paddle(Side::Right).map(|p| p.position.y);
    let both = FrameInput {
        right: pong_core::sim::PaddleInput { up: true, down: false },
        ..down
    };
    world.step(&both, DT);
    assert_eq!(world.paddle(Side::Right).map(|p| p.position.y), remote);
}

#[test]
fn test_ai_paddle_stays_inside_walls() {
    let config = SimConfig {
        session: SessionMode::VersusAi { ai_side: Side::Right },
        ..quiet_config()
    };
    let mut world = World::new(config);
    let arena = world.config.arena;
    let half = arena.paddle_height / 2.0;
    for _ in 0..600 {
        world.step(&FrameInput::default(), DT);
        let y = world.paddle(Side::Right).map(|p| p.position.y).expect("ai paddle");
        assert!(y >= arena.top_bound() + half - 1e-3);
        assert!(y <= arena.bottom_bound() - half + 1e-3);
    }
}

#[test]
fn test_hazard_field_promotes_and_retires() {
    let mut config = SimConfig::default();
    config.hazards.spawn_interval = 1.0;
    config.hazards.scroll_speed = 0.5;
    let mut world = World::with_arena(config);
    let events = run(&mut world, 60 * 5);

    let promoted: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GameEvent::SpawnRequest {
                entity,
                kind: SpawnKind::Hazard(_),
                ..
            } => Some(*entity),
            _ => None,
        })
        .collect();
    assert!(!promoted.is_empty());
    assert!(
        promoted
            .iter()
            .any(|id| events.contains(&GameEvent::Despawn { entity: *id }))
    );
}

fn variant_strategy() -> impl Strategy<Value = BallVariant> {
    prop_oneof![
        Just(BallVariant::Standard),
        Just(BallVariant::Curve),
        Just(BallVariant::Spin),
        Just(BallVariant::Burst),
        Just(BallVariant::Multiply),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_balls_stay_between_walls_and_under_speed_cap(
        x in 150.0f32..1350.0,
        y in 90.0f32..710.0,
        angle in -3.1f32..3.1,
        speed in 0.5f32..30.0,
        variant in variant_strategy(),
        classic in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let mut config = quiet_config();
        config.seed = seed;
        config.classic_mode = classic;
        let mut world = World::with_arena(config);
        let velocity = Vec2::from_angle(angle) * speed;
        world.spawn_ball(variant, Vec2::new(x, y), velocity, true);
        let arena = world.config.arena;
        let r = BALL_SIZE / 2.0;

        for _ in 0..120 {
            world.step(&FrameInput::default(), DT);
            for id in world.ball_ids() {
                let Some(Entity { body, role: Role::Ball(ball) }) = world.store.get(id) else {
                    continue;
                };
                prop_assert!(body.position.y - r >= arena.top_bound() - 1e-2);
                prop_assert!(body.position.y + r <= arena.bottom_bound() + 1e-2);
                prop_assert!(body.velocity.length() <= ball.behaviour.max_speed(classic) + 1e-3);
            }
        }
    }
}
