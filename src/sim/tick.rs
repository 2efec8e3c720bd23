//! Per-frame simulation step
//!
//! Either reconciles server-owned bodies from the latest snapshot or runs
//! the full local pass: paddles, hazards, splits, bullets, then every ball
//! through walls, hazards, paddles, shields and pickups in that order.

use glam::Vec2;
use rand::Rng;

use super::ball::{BallBehaviour, BallVariant, SPLIT_OFFSETS};
use super::geometry::{Aabb, aabb_overlap, reflect_velocity, swept_aabb};
use super::hazard::{resolve_ball_hazard, segment_hits_hazard};
use super::reconcile::Tracked;
use super::state::{Contact, ContactKind, FrameInput, GameEvent, SpawnKind, World};
use super::store::{BallState, Body, Entity, EntityId, Role, Side, Store};
use crate::consts::*;
use crate::tuning::{ArenaConfig, SessionMode};
use crate::{frames_for, is_finite_vec};

/// Magnetic pull tuning
const MAGNETIC_FORCE_MAX: f32 = 1.5;
const MAGNETIC_MIN_RANGE: f32 = 30.0;
/// Horizontal boost off a flat paddle
const FLAT_PADDLE_BOOST: f32 = 1.2;

/// Advance the world by `dt` seconds and return the events produced
pub fn step(world: &mut World, input: &FrameInput, dt: f32) -> Vec<GameEvent> {
    let dt = if dt.is_finite() { dt.clamp(0.0, MAX_DT) } else { 0.0 };
    let frames = frames_for(dt);
    world.clock.advance(dt);
    let mut events = Vec::new();

    if let SessionMode::Authoritative { role } = world.config.session {
        step_authoritative(world, input, role.local_side(), dt, frames, &mut events);
        return events;
    }

    let mut input = *input;
    drive_opponent(world, &mut input, dt);
    move_paddles(&mut world.store, &world.config.arena, &input, frames);

    world
        .hazards
        .update(&mut world.store, dt, &mut world.rng, &world.config.arena, &mut events);

    split_pending(world, &mut events);
    move_bullets(world, frames, &mut events);

    for id in world.ball_ids() {
        update_ball(world, id, frames, &mut events);
    }

    tick_respawn(world, dt, &mut events);
    events
}

/// Server-driven frame: reconcile tracked bodies, predict the local paddle
fn step_authoritative(
    world: &mut World,
    input: &FrameInput,
    local: Side,
    dt: f32,
    frames: f32,
    events: &mut Vec<GameEvent>,
) {
    world.reconciler.advance(dt);

    if let Some(snapshot) = world.reconciler.latest().cloned() {
        match snapshot.ball {
            Some(target) => {
                let existing = world.server_ball.filter(|&id| world.store.contains(id));
                let id = match existing {
                    Some(id) => id,
                    None => {
                        // Parked off-screen so the first correction snaps
                        let hidden = Vec2::splat(-BALL_SIZE);
                        let id = world.spawn_ball(BallVariant::Standard, hidden, Vec2::ZERO, true);
                        world.reconciler.forget(Tracked::Ball);
                        world.server_ball = Some(id);
                        events.push(GameEvent::SpawnRequest {
                            entity: id,
                            kind: SpawnKind::Ball(BallVariant::Standard),
                            position: target.position,
                        });
                        id
                    }
                };
                let lerp = world.reconciler.config.ball_lerp;
                if let Some(entity) = world.store.get_mut(id) {
                    world
                        .reconciler
                        .reconcile_remote(Tracked::Ball, &mut entity.body, target, lerp);
                }
            }
            None => {
                if let Some(id) = world.server_ball.take() {
                    world.store.remove(id);
                    world.reconciler.forget(Tracked::Ball);
                    events.push(GameEvent::Despawn { entity: id });
                }
            }
        }

        let remote = local.opposite();
        let lerp = world.reconciler.config.remote_paddle_lerp;
        let remote_id = world.paddle_id(remote);
        if let Some(entity) = world.store.get_mut(remote_id) {
            world
                .reconciler
                .reconcile_remote(Tracked::Paddle(remote), &mut entity.body, snapshot.paddle(remote), lerp);
        }
        let local_id = world.paddle_id(local);
        if let Some(entity) = world.store.get_mut(local_id) {
            world
                .reconciler
                .reconcile_local(Tracked::Paddle(local), &mut entity.body, snapshot.paddle(local));
        }
    }

    if world.reconciler.should_predict_locally() {
        // Only the local paddle is not server-controlled
        move_paddles(&mut world.store, &world.config.arena, input, frames);
    }
}

/// Let the opponent controller press its paddle's buttons
fn drive_opponent(world: &mut World, input: &mut FrameInput, dt: f32) {
    let Some(side) = world.opponent.as_ref().map(|ai| ai.side) else {
        return;
    };
    let ball = world
        .live_ball()
        .and_then(|id| world.store.get(id))
        .map(|e| (e.body.position, e.body.velocity));
    let Some(paddle) = world.paddle(side).cloned() else {
        return;
    };
    let arena = world.config.arena;
    let r = BALL_SIZE / 2.0;
    let bounds = (arena.top_bound() + r, arena.bottom_bound() - r);
    let half_height = paddle.extent.half_extents().y;

    if let Some(ai) = world.opponent.as_mut() {
        let pressed = ai.update(dt, ball, paddle.position, half_height, bounds, &mut world.rng);
        input.set(side, pressed);
    }
}

/// Integrate input-driven paddles and keep them between the walls
pub fn move_paddles(store: &mut Store, arena: &ArenaConfig, input: &FrameInput, frames: f32) {
    store.for_each(
        |e| matches!(e.role, Role::Paddle { .. }) && !e.body.server_controlled,
        |_, entity| {
            let Role::Paddle { side, state } = &mut entity.role else {
                return;
            };
            let body = &mut entity.body;
            let stunned = state.is_stunned();
            state.stun_frames = (state.stun_frames - frames).max(0.0);

            let mut dir = input.side(*side).direction();
            if state.inverted {
                dir = -dir;
            }
            let vy = if stunned {
                0.0
            } else {
                dir * body.speed.unwrap_or(arena.paddle_speed) * state.slowness
            };
            body.velocity = Vec2::new(0.0, vy);
            body.position.y += vy * frames;

            let half = body.extent.half_extents().y;
            let (lo, hi) = (arena.top_bound() + half, arena.bottom_bound() - half);
            if body.position.y < lo {
                body.position.y = lo;
                body.velocity.y = 0.0;
            } else if body.position.y > hi {
                body.position.y = hi;
                body.velocity.y = 0.0;
            }
        },
    );
}

/// Replace multiply balls that still owe a split with their three clones
fn split_pending(world: &mut World, events: &mut Vec<GameEvent>) {
    let pending = world.store.ids_where(|e| {
        e.ball()
            .is_some_and(|b| matches!(b.behaviour, BallBehaviour::Multiply { pending_split: true }))
    });
    let arena = world.config.arena;
    let r = BALL_SIZE / 2.0;

    for id in pending {
        let Some(mut source) = world.store.remove(id) else {
            continue;
        };
        let Some(ball) = source.ball_mut() else {
            continue;
        };
        ball.behaviour.take_split();
        let live_index = ball.live.then(|| world.rng.random_range(0..SPLIT_OFFSETS.len()));
        let last_hit = ball.last_hit;
        let behaviour = ball.behaviour.clone();

        for (i, offset) in SPLIT_OFFSETS.iter().enumerate() {
            let mut position = source.body.position + *offset;
            position.y = position.y.clamp(arena.top_bound() + r, arena.bottom_bound() - r);
            let mut body = source.body.clone();
            body.position = position;
            let mut state = BallState::new(behaviour.clone(), live_index == Some(i));
            state.last_hit = last_hit;
            let clone = world.store.spawn(Entity::new(body, Role::Ball(state)));
            events.push(GameEvent::SpawnRequest {
                entity: clone,
                kind: SpawnKind::Ball(behaviour.variant()),
                position,
            });
        }
        world.guard.forget(id);
        events.push(GameEvent::Despawn { entity: id });
        log::debug!("ball {id} split into three");
    }
}

/// Bullets fly straight; they stun the opposing paddle, die on hazards and
/// leave through the goal lines
fn move_bullets(world: &mut World, frames: f32, events: &mut Vec<GameEvent>) {
    let width = world.config.arena.width;
    for id in world.store.ids_where(|e| matches!(e.role, Role::Bullet { .. })) {
        let Some(entity) = world.store.get(id) else {
            continue;
        };
        let Role::Bullet { owner } = entity.role else {
            continue;
        };
        let target = owner.opposite();
        let start = entity.body.aabb();
        let speed = entity.body.speed.unwrap_or(super::state::BULLET_SPEED);
        let displacement = Vec2::new(owner.outward_sign() * speed * frames, 0.0);
        let end = start.center + displacement;

        let hit_paddle = world
            .paddle(target)
            .is_some_and(|p| swept_aabb(&start, displacement, &p.aabb()).hit);
        let hit_hazard = !hit_paddle
            && world
                .store
                .iter()
                .filter(|(_, e)| matches!(e.role, Role::Hazard))
                .any(|(_, e)| segment_hits_hazard(start.center, end, &e.body));

        if hit_paddle {
            if let Some(state) = world.paddle_state_mut(target) {
                state.stun_frames = STUN_FRAMES;
            }
            log::debug!("bullet {id} stunned {} paddle", target.as_str());
            events.push(GameEvent::Stunned { side: target });
        }
        if hit_paddle || hit_hazard || end.x < 0.0 || end.x > width {
            world.store.remove(id);
            events.push(GameEvent::Despawn { entity: id });
        } else if let Some(entity) = world.store.get_mut(id) {
            entity.body.position = end;
        }
    }
}

/// Count down to the next serve after a point
fn tick_respawn(world: &mut World, dt: f32, events: &mut Vec<GameEvent>) {
    let Some(remaining) = world.respawn_timer.as_mut() else {
        return;
    };
    *remaining -= dt;
    if *remaining > 0.0 {
        return;
    }
    world.respawn_timer = None;
    let id = world.serve();
    let position = world.config.arena.center();
    events.push(GameEvent::SpawnRequest {
        entity: id,
        kind: SpawnKind::Ball(BallVariant::Standard),
        position,
    });
}

/// Pull toward a magnetized paddle on the side the ball is heading to
fn apply_magnetism(store: &Store, arena: &ArenaConfig, body: &mut Body, frames: f32) {
    let heading = if body.velocity.x > 0.0 { Side::Right } else { Side::Left };
    let range = arena.width / 2.0;
    for (_, entity) in store.iter() {
        let Role::Paddle { side, state } = &entity.role else {
            continue;
        };
        if *side != heading || !state.magnetized {
            continue;
        }
        let half_w = entity.body.extent.half_extents().x;
        let face = entity.body.position + Vec2::new(side.outward_sign() * half_w, 0.0);
        let to_paddle = face - body.position;
        let distance = to_paddle.length();
        if distance >= range || distance <= f32::EPSILON {
            continue;
        }
        let strength = MAGNETIC_FORCE_MAX
            * (1.0 - (distance - MAGNETIC_MIN_RANGE).max(0.0) / (range - MAGNETIC_MIN_RANGE));
        body.velocity += to_paddle / distance * strength.min(MAGNETIC_FORCE_MAX) * frames;
    }
}

/// Inner-facing normal and face coordinate of a wall, oriented toward the arena centre
fn wall_plane(wall: &Body, center: Vec2) -> (Vec2, f32) {
    let half = wall.extent.half_extents();
    if half.x >= half.y {
        let n = if center.y >= wall.position.y { 1.0 } else { -1.0 };
        (Vec2::new(0.0, n), wall.position.y + n * half.y)
    } else {
        let n = if center.x >= wall.position.x { 1.0 } else { -1.0 };
        (Vec2::new(n, 0.0), wall.position.x + n * half.x)
    }
}

/// Push a ball back inside every wall it crossed, reflecting the
/// perpendicular velocity axis if it was moving into the wall
fn resolve_walls(store: &Store, arena: &ArenaConfig, ball_id: EntityId, body: &mut Body, contacts: &mut Vec<Contact>) {
    let half = body.extent.half_extents();
    for (wall_id, wall) in store.iter().filter(|(_, e)| matches!(e.role, Role::Wall)) {
        let (normal, face) = wall_plane(&wall.body, arena.center());
        let wall_box = wall.body.aabb();

        // Tangential span check so short walls only act where they exist
        let tangent = Vec2::new(normal.y.abs(), normal.x.abs());
        let along = body.position.dot(tangent);
        let (lo, hi) = (wall_box.min().dot(tangent), wall_box.max().dot(tangent));
        let reach = half.dot(tangent);
        if along + reach < lo || along - reach > hi {
            continue;
        }

        let half_n = half.dot(normal.abs());
        let depth = (body.position.dot(normal) - face * normal.dot(Vec2::ONE)) - half_n;
        if depth >= 0.0 {
            continue;
        }
        body.position -= normal * depth;
        let into = body.velocity.dot(normal);
        if into < 0.0 {
            body.velocity -= normal * into * (1.0 + body.restitution * wall.body.restitution);
        }
        contacts.push(Contact {
            kind: ContactKind::Wall,
            ball: ball_id,
            other: wall_id,
            normal,
            point: body.position - normal * half_n,
            toi: 1.0,
        });
    }
}

/// Ensure the horizontal share of `v` is at least `min_share` of `speed`
fn enforce_min_horizontal(v: Vec2, speed: f32, min_share: f32, sign: f32) -> Vec2 {
    if speed <= f32::EPSILON || v.x.abs() >= min_share * speed {
        return v;
    }
    let vx = sign * min_share * speed;
    let vy_mag = (speed * speed - vx * vx).max(0.0).sqrt();
    let vy = if v.y < 0.0 { -vy_mag } else { vy_mag };
    Vec2::new(vx, vy)
}

/// First hazard loop the ball touches wins
fn resolve_hazards(store: &Store, ball_id: EntityId, body: &mut Body, contacts: &mut Vec<Contact>) {
    let radius = body.extent.radius();
    for (hazard_id, hazard) in store.iter().filter(|(_, e)| matches!(e.role, Role::Hazard)) {
        let Some(hit) = resolve_ball_hazard(body.position, radius, &hazard.body) else {
            continue;
        };
        body.position = hit.push_to;
        if body.velocity.dot(hit.normal) < 0.0 {
            body.velocity = reflect_velocity(body.velocity, hit.normal) * hazard.body.restitution;
        }
        let speed = body.velocity.length();
        let sign = if body.velocity.x != 0.0 {
            body.velocity.x.signum()
        } else if hit.normal.x != 0.0 {
            hit.normal.x.signum()
        } else {
            1.0
        };
        body.velocity = enforce_min_horizontal(body.velocity, speed, HAZARD_MIN_HORIZONTAL_COMPONENT, sign);
        body.velocity = crate::clamp_speed(body.velocity, 0.0, HAZARD_MAX_SPEED);
        log::trace!("ball {ball_id} hit hazard {hazard_id} (deep: {})", hit.deep);
        contacts.push(Contact {
            kind: ContactKind::Hazard,
            ball: ball_id,
            other: hazard_id,
            normal: hit.normal,
            point: hit.point,
            toi: 1.0,
        });
        break;
    }
}

/// Continuous paddle test and angle-shaped rebound
fn resolve_paddles(
    store: &Store,
    ball_id: EntityId,
    start: Vec2,
    frames: f32,
    body: &mut Body,
    ball: &mut BallState,
    contacts: &mut Vec<Contact>,
) {
    let half = body.extent.half_extents();
    let moving = Aabb::new(start, half);
    let ball_disp = body.position - start;

    for (paddle_id, paddle) in store.iter() {
        let Role::Paddle { side, state } = &paddle.role else {
            continue;
        };
        let paddle_disp = paddle.body.velocity * frames;
        let paddle_start = Aabb::new(paddle.body.position - paddle_disp, paddle.body.extent.half_extents());
        let sweep = swept_aabb(&moving, ball_disp - paddle_disp, &paddle_start);
        if !sweep.hit {
            continue;
        }

        body.position = start + ball_disp * sweep.time;
        let speed = body.velocity.length();
        let outward = side.outward_sign();
        let behind = (body.position.x - paddle.body.position.x) * outward < 0.0;
        let front = sweep.normal.x == outward || (sweep.normal.x == 0.0 && !behind);

        if front {
            shape_paddle_rebound(body, &paddle.body, sweep.normal, outward, speed);
            ball.last_hit = Some(*side);
            ball.behaviour.on_paddle_hit();
            if state.flat {
                body.velocity.y = 0.0;
                body.velocity.x *= FLAT_PADDLE_BOOST;
            }
        } else if body.velocity.dot(sweep.normal) < 0.0 {
            // Goal-side faces bounce the ball on toward the goal without returning it
            body.velocity = reflect_velocity(body.velocity, sweep.normal);
        }

        log::trace!("ball {ball_id} hit {} paddle at t={:.3}", side.as_str(), sweep.time);
        contacts.push(Contact {
            kind: ContactKind::Paddle,
            ball: ball_id,
            other: paddle_id,
            normal: sweep.normal,
            point: body.position - sweep.normal * half,
            toi: sweep.time,
        });
        break;
    }
}

/// Angle-mapped rebound off the field-facing side of a paddle
fn shape_paddle_rebound(body: &mut Body, paddle: &Body, normal: Vec2, outward: f32, speed: f32) {
    if normal.x != 0.0 {
        let half_height = paddle.extent.half_extents().y;
        let relative =
            ((body.position.y - paddle.position.y) / half_height).clamp(-MAX_RELATIVE_HIT, MAX_RELATIVE_HIT);
        let angle = relative * MAX_BOUNCE_ANGLE;
        body.velocity = Vec2::new(outward * angle.cos() * speed, angle.sin() * speed);

        let pvy = paddle.velocity.y;
        if pvy != 0.0 {
            body.velocity.y += pvy.abs().min(MAX_PADDLE_INFLUENCE) * pvy.signum() * PADDLE_INFLUENCE;
        }
    } else {
        body.velocity.y = -body.velocity.y;
        body.velocity.x = if outward > 0.0 {
            body.velocity.x.max(MIN_HORIZONTAL_COMPONENT * speed)
        } else {
            body.velocity.x.min(-MIN_HORIZONTAL_COMPONENT * speed)
        };
        body.velocity = body.velocity.normalize_or_zero() * speed;
    }
    body.velocity = enforce_min_horizontal(body.velocity, speed, MIN_HORIZONTAL_COMPONENT, outward);
}

/// Shields bounce the ball back once and disappear
fn resolve_shields(
    store: &Store,
    ball_id: EntityId,
    start: Vec2,
    body: &mut Body,
    contacts: &mut Vec<Contact>,
    consumed: &mut Vec<EntityId>,
) {
    let moving = Aabb::new(start, body.extent.half_extents());
    let ball_disp = body.position - start;
    for (shield_id, shield) in store.iter() {
        let Role::Shield { side } = shield.role else {
            continue;
        };
        let sweep = swept_aabb(&moving, ball_disp, &shield.body.aabb());
        if !sweep.hit {
            continue;
        }
        body.position = sweep.position;
        body.velocity.x = side.outward_sign() * body.velocity.x.abs();
        consumed.push(shield_id);
        contacts.push(Contact {
            kind: ContactKind::Shield,
            ball: ball_id,
            other: shield_id,
            normal: sweep.normal,
            point: sweep.position,
            toi: sweep.time,
        });
        break;
    }
}

/// Overlapping pickups are reported for balls someone has struck
fn detect_pickups(store: &Store, body: &Body, ball: &BallState, events: &mut Vec<GameEvent>, consumed: &mut Vec<EntityId>) {
    let Some(side) = ball.last_hit else {
        return;
    };
    let ball_box = body.aabb();
    for (pickup_id, pickup) in store.iter() {
        let Role::Pickup(kind) = pickup.role else {
            continue;
        };
        if aabb_overlap(&ball_box, &pickup.body.aabb()) {
            log::debug!("pickup {pickup_id} ({kind:?}) collected for {}", side.as_str());
            events.push(GameEvent::Pickup {
                entity: pickup_id,
                kind,
                side,
            });
            consumed.push(pickup_id);
        }
    }
}

/// Reset a poisoned body rather than letting NaN spread to later frames
fn sanitize(id: EntityId, body: &mut Body, fallback: Vec2) {
    let finite = is_finite_vec(body.position) && is_finite_vec(body.velocity);
    debug_assert!(finite, "ball {id} became non-finite: {:?} {:?}", body.position, body.velocity);
    if !finite {
        log::warn!("ball {id} non-finite, reset to {fallback:?}");
        body.position = fallback;
        body.velocity = Vec2::ZERO;
    }
}

/// Full resolution pass for one ball
fn update_ball(world: &mut World, id: EntityId, frames: f32, events: &mut Vec<GameEvent>) {
    let Some(mut entity) = world.store.remove(id) else {
        return;
    };
    let classic = world.config.classic_mode;
    let arena = world.config.arena;
    let Entity {
        body,
        role: Role::Ball(ball),
    } = &mut entity
    else {
        world.store.insert(id, entity);
        return;
    };

    let start = body.position;
    let speed_before = body.velocity.length();

    if !classic {
        apply_magnetism(&world.store, &arena, body, frames);
    }
    ball.behaviour.integrate(body, frames, classic);
    if classic && body.velocity.x != 0.0 && body.velocity.x.abs() < CLASSIC_MAX_SPEED {
        body.velocity.x += body.velocity.x.signum() * world.config.classic_ramp * frames;
    }

    let pre_contact_velocity = body.velocity;
    let mut contacts = Vec::new();
    let mut consumed = Vec::new();

    resolve_walls(&world.store, &arena, id, body, &mut contacts);
    resolve_hazards(&world.store, id, body, &mut contacts);
    resolve_shields(&world.store, id, start, body, &mut contacts, &mut consumed);
    if ball.live {
        resolve_paddles(&world.store, id, start, frames, body, ball, &mut contacts);
    }
    detect_pickups(&world.store, body, ball, events, &mut consumed);

    let max_speed = ball.behaviour.max_speed(classic);
    let now = world.clock.now();
    for contact in &contacts {
        if matches!(contact.kind, ContactKind::Shield) {
            continue;
        }
        body.velocity = ball.behaviour.on_bounce(body.velocity);

        if matches!(contact.kind, ContactKind::Wall | ContactKind::Hazard)
            && world.guard.record(id, now, contact.normal)
        {
            body.velocity = world
                .guard
                .break_loop(pre_contact_velocity, body.velocity, contact.normal, max_speed);
            log::debug!("ball {id} oscillation broken, new velocity {:?}", body.velocity);
        }
    }

    if frames > 0.0 && !ball.behaviour.is_winding() {
        let surface = contacts
            .iter()
            .rev()
            .find(|c| matches!(c.kind, ContactKind::Wall | ContactKind::Hazard));
        if let Some(contact) = surface {
            let displacement = body.position.distance(start) / frames;
            if let Some(v) = world
                .guard
                .unstick(speed_before, body.velocity, displacement, contact.normal, max_speed)
            {
                log::debug!("ball {id} parked against geometry, boosted to {v:?}");
                body.velocity = v;
            }
        }
    }

    // Last word goes to the walls so no resolution above can leave the ball inside one
    resolve_walls(&world.store, &arena, id, body, &mut Vec::new());
    body.velocity = ball.behaviour.clamp(body.velocity, classic);

    let fallback = if is_finite_vec(start) { start } else { arena.center() };
    sanitize(id, body, fallback);

    for consumed_id in consumed {
        if world.store.remove(consumed_id).is_some() {
            events.push(GameEvent::Despawn { entity: consumed_id });
        }
    }

    let x = body.position.x;
    if x < 0.0 || x > arena.width {
        let live = ball.live;
        world.guard.forget(id);
        if live {
            let side = if x < 0.0 { Side::Right } else { Side::Left };
            log::debug!("ball {id} left the arena, {} scores", side.as_str());
            events.push(GameEvent::Score { side });
            if world.live_ball().is_none()
                && let Some(delay) = world.config.respawn_delay
            {
                world.respawn_timer = Some(delay.max(0.0));
            }
        }
        events.push(GameEvent::Despawn { entity: id });
        return;
    }

    world.store.insert(id, entity);
}
