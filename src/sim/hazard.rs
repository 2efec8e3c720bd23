//! Polygon hazards
//!
//! Ball-versus-polygon resolution plus the depth-scrolling field that
//! grows background figures out of the walls and promotes them to live
//! hazards once they are close enough.

use glam::Vec2;
use rand::Rng;

use super::geometry::{CollisionResult, circle_segment_intersect, closest_point_on_segment, point_in_polygon};
use super::state::{GameEvent, SpawnKind};
use super::store::{Behaviour, Body, Entity, EntityId, Extent, Role, Store};
use crate::consts::*;
use crate::perp;
use crate::tuning::{ArenaConfig, HazardConfig};

/// Contact between a ball and a hazard loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HazardHit {
    pub point: Vec2,
    /// Unit normal pointing out of the hazard
    pub normal: Vec2,
    /// Where the ball centre must move to clear the geometry
    pub push_to: Vec2,
    /// Ball centre was inside the loop
    pub deep: bool,
}

/// Iterate the non-degenerate edges of a closed loop, translated by `offset`
fn edges(points: &[Vec2], offset: Vec2) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
    let n = points.len();
    (0..n)
        .map(move |i| (points[i] + offset, points[(i + 1) % n] + offset))
        .filter(|(a, b)| (*b - *a).length_squared() > 1e-8)
}

/// Nearest edge point to `center`, with the direction from the centre
/// through that point (outward when the centre is inside)
fn nearest_edge(center: Vec2, points: &[Vec2], offset: Vec2) -> Option<(Vec2, Vec2)> {
    let mut best: Option<(f32, Vec2, Vec2, Vec2)> = None;
    for (a, b) in edges(points, offset) {
        let Some(closest) = closest_point_on_segment(center, a, b) else {
            continue;
        };
        let dist = center.distance_squared(closest);
        if best.is_none_or(|(d, ..)| dist < d) {
            best = Some((dist, closest, a, b));
        }
    }
    let (_, closest, a, b) = best?;
    let outward = (closest - center).normalize_or_zero();
    if outward != Vec2::ZERO {
        return Some((closest, outward));
    }
    // Centre sits on the edge: pick the perpendicular facing away from the loop's centroid
    let centroid = points.iter().copied().sum::<Vec2>() / points.len() as f32 + offset;
    let n = perp(b - a).normalize_or_zero();
    let n = if n.dot(closest - centroid) < 0.0 { -n } else { n };
    Some((closest, n))
}

/// Test one loop: deep penetration, then edges, then vertices
fn resolve_loop(center: Vec2, radius: f32, points: &[Vec2], offset: Vec2) -> Option<HazardHit> {
    if points.len() < 3 {
        return None;
    }

    if point_in_polygon(center, points, offset) {
        let (point, normal) = nearest_edge(center, points, offset)?;
        return Some(HazardHit {
            point,
            normal,
            push_to: point + normal * (radius + HAZARD_DEEP_PUSH_EPSILON),
            deep: true,
        });
    }

    for (a, b) in edges(points, offset) {
        let CollisionResult { hit, point, normal, .. } = circle_segment_intersect(center, radius, a, b);
        if hit {
            return Some(HazardHit {
                point,
                normal,
                push_to: point + normal * (radius + HAZARD_PUSH_EPSILON),
                deep: false,
            });
        }
    }

    for &vertex in points {
        let vertex = vertex + offset;
        let delta = center - vertex;
        let dist = delta.length();
        if dist < radius && dist > 1e-6 {
            let normal = delta / dist;
            return Some(HazardHit {
                point: vertex,
                normal,
                push_to: vertex + normal * (radius + HAZARD_PUSH_EPSILON),
                deep: false,
            });
        }
    }
    None
}

/// First contact between a circle and any loop of a hazard body
pub fn resolve_ball_hazard(center: Vec2, radius: f32, hazard: &Body) -> Option<HazardHit> {
    hazard
        .polygons
        .iter()
        .find_map(|points| resolve_loop(center, radius, points, hazard.position))
}

/// True when a bullet travelling `from..to` crosses or ends inside a hazard
pub fn segment_hits_hazard(from: Vec2, to: Vec2, hazard: &Body) -> bool {
    hazard.polygons.iter().filter(|p| p.len() >= 3).any(|points| {
        point_in_polygon(to, points, hazard.position)
            || edges(points, hazard.position)
                .any(|(a, b)| super::geometry::segments_intersect(from, to, a, b))
    })
}

/// Background figure shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FigureKind {
    Pyramid,
    Trench,
    Saw,
    Escalator,
    Hourglass,
    Maw,
    Rake,
}

impl FigureKind {
    pub const ALL: [FigureKind; 7] = [
        FigureKind::Pyramid,
        FigureKind::Trench,
        FigureKind::Saw,
        FigureKind::Escalator,
        FigureKind::Hourglass,
        FigureKind::Maw,
        FigureKind::Rake,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FigureKind::Pyramid => "pyramid",
            FigureKind::Trench => "trench",
            FigureKind::Saw => "saw",
            FigureKind::Escalator => "escalator",
            FigureKind::Hourglass => "hourglass",
            FigureKind::Maw => "maw",
            FigureKind::Rake => "rake",
        }
    }

    /// Outline loops with the wall face at y = 0, growing toward +y
    fn outline(&self, width: f32, height: f32) -> Vec<Vec<Vec2>> {
        let w = width / 2.0;
        let h = height;
        let v = Vec2::new;
        match self {
            FigureKind::Pyramid => vec![vec![v(-w, 0.0), v(w, 0.0), v(0.0, h)]],
            FigureKind::Trench => vec![vec![v(-w, 0.0), v(w, 0.0), v(w, h * 0.5), v(-w, h * 0.5)]],
            FigureKind::Saw => {
                let teeth = 4;
                let step = width / teeth as f32;
                let mut points = vec![v(w, 0.0), v(-w, 0.0)];
                for i in 0..teeth {
                    let x0 = -w + step * i as f32;
                    points.push(v(x0 + step / 2.0, h));
                    points.push(v(x0 + step, h * 0.3));
                }
                points.pop();
                vec![points]
            }
            FigureKind::Escalator => {
                let steps = 3;
                let step_w = width / steps as f32;
                let step_h = h / steps as f32;
                let mut points = vec![v(-w, 0.0), v(w, 0.0)];
                for i in 0..steps {
                    let x = w - step_w * i as f32;
                    let y = step_h * (i + 1) as f32;
                    points.push(v(x, y));
                    points.push(v(x - step_w, y));
                }
                vec![points]
            }
            FigureKind::Hourglass => vec![vec![
                v(-w, 0.0),
                v(w, 0.0),
                v(w * 0.2, h * 0.5),
                v(w, h),
                v(-w, h),
                v(-w * 0.2, h * 0.5),
            ]],
            FigureKind::Maw => vec![
                vec![v(-w, 0.0), v(-w * 0.2, 0.0), v(-w * 0.6, h)],
                vec![v(w * 0.2, 0.0), v(w, 0.0), v(w * 0.6, h)],
            ],
            FigureKind::Rake => (0..3)
                .map(|i| {
                    let cx = -w + width * (i as f32 + 0.5) / 3.0;
                    let tw = width / 12.0;
                    vec![v(cx - tw, 0.0), v(cx + tw, 0.0), v(cx + tw, h), v(cx - tw, h)]
                })
                .collect(),
        }
    }
}

/// Which wall a figure grows out of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallAnchor {
    Top,
    Bottom,
}

/// A background figure scrolling toward the play plane
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub kind: FigureKind,
    pub anchor: WallAnchor,
    /// Attachment point on the wall's inner face
    pub origin: Vec2,
    /// 0 at spawn; live at the activation depth, retired at the exit depth
    pub depth: f32,
    pub loops: Vec<Vec<Vec2>>,
    pub hazard: Option<EntityId>,
}

/// Explicit state for hazard generation
#[derive(Debug, Clone)]
pub struct HazardField {
    pub config: HazardConfig,
    pub figures: Vec<Figure>,
    spawn_timer: f32,
}

const FIGURE_MIN_WIDTH: f32 = 80.0;
const FIGURE_MAX_WIDTH: f32 = 160.0;
const FIGURE_MIN_HEIGHT: f32 = 60.0;
const FIGURE_MAX_HEIGHT: f32 = 140.0;

impl HazardField {
    pub fn new(config: HazardConfig) -> Self {
        Self {
            config,
            figures: Vec::new(),
            spawn_timer: 0.0,
        }
    }

    /// Create a figure against one of the walls, mirrored for the bottom wall
    pub fn spawn_figure<R: Rng>(&mut self, kind: FigureKind, rng: &mut R, arena: &ArenaConfig) {
        let anchor = if rng.random_bool(0.5) { WallAnchor::Top } else { WallAnchor::Bottom };
        let width = rng.random_range(FIGURE_MIN_WIDTH..=FIGURE_MAX_WIDTH);
        let height = rng.random_range(FIGURE_MIN_HEIGHT..=FIGURE_MAX_HEIGHT);
        let x = rng.random_range(arena.width * 0.3..=arena.width * 0.7);
        let (origin, flip) = match anchor {
            WallAnchor::Top => (Vec2::new(x, arena.top_bound()), 1.0),
            WallAnchor::Bottom => (Vec2::new(x, arena.bottom_bound()), -1.0),
        };
        let loops = kind
            .outline(width, height)
            .into_iter()
            .map(|points| points.into_iter().map(|p| Vec2::new(p.x, p.y * flip)).collect())
            .collect();
        self.figures.push(Figure {
            kind,
            anchor,
            origin,
            depth: 0.0,
            loops,
            hazard: None,
        });
    }

    /// Scroll figures, promote the ones crossing the activation depth and
    /// retire the ones past the exit depth
    pub fn update<R: Rng>(
        &mut self,
        store: &mut Store,
        dt: f32,
        rng: &mut R,
        arena: &ArenaConfig,
        events: &mut Vec<GameEvent>,
    ) {
        if !self.config.enabled {
            return;
        }

        let activation = self.config.activation_depth;
        let exit = self.config.exit_depth;
        for figure in &mut self.figures {
            figure.depth += self.config.scroll_speed * dt;

            if figure.hazard.is_none() && figure.depth >= activation && figure.depth < exit {
                let body = Body::new(figure.origin, Extent::Box { half: Vec2::ZERO })
                    .with_polygons(figure.loops.clone())
                    .with_behaviour(Behaviour::Block)
                    .fixed();
                let id = store.spawn(Entity::new(body, Role::Hazard));
                log::info!("hazard {} promoted as entity {id}", figure.kind.as_str());
                figure.hazard = Some(id);
                events.push(GameEvent::SpawnRequest {
                    entity: id,
                    kind: SpawnKind::Hazard(figure.kind),
                    position: figure.origin,
                });
            }

            if figure.depth >= exit
                && let Some(id) = figure.hazard.take()
            {
                store.remove(id);
                log::debug!("hazard {} retired (entity {id})", figure.kind.as_str());
                events.push(GameEvent::Despawn { entity: id });
            }
        }
        self.figures.retain(|f| f.depth < exit);

        self.spawn_timer += dt;
        if self.spawn_timer >= self.config.spawn_interval {
            self.spawn_timer -= self.config.spawn_interval;
            let kind = FigureKind::ALL[rng.random_range(0..FigureKind::ALL.len())];
            self.spawn_figure(kind, rng, arena);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn block_hazard() -> Body {
        let square = vec![
            Vec2::new(-50.0, -50.0),
            Vec2::new(50.0, -50.0),
            Vec2::new(50.0, 50.0),
            Vec2::new(-50.0, 50.0),
        ];
        Body::new(Vec2::new(500.0, 400.0), Extent::Box { half: Vec2::ZERO })
            .with_polygons(vec![square])
            .fixed()
    }

    #[test]
    fn test_edge_contact_pushes_out() {
        let hazard = block_hazard();
        let hit = resolve_ball_hazard(Vec2::new(500.0, 345.0), 10.0, &hazard).expect("edge hit");
        assert!(!hit.deep);
        assert!((hit.normal - Vec2::new(0.0, -1.0)).length() < 1e-5);
        assert!((hit.push_to.y - (350.0 - 10.0 - HAZARD_PUSH_EPSILON)).abs() < 1e-4);
    }

    #[test]
    fn test_deep_penetration_uses_nearest_edge() {
        let hazard = block_hazard();
        let hit = resolve_ball_hazard(Vec2::new(540.0, 400.0), 10.0, &hazard).expect("deep hit");
        assert!(hit.deep);
        assert!((hit.normal - Vec2::X).length() < 1e-5);
        assert!((hit.push_to.x - (550.0 + 10.0 + HAZARD_DEEP_PUSH_EPSILON)).abs() < 1e-4);
    }

    #[test]
    fn test_malformed_loops_are_skipped() {
        let mut hazard = block_hazard();
        hazard.polygons = vec![vec![Vec2::ZERO, Vec2::X]];
        assert!(resolve_ball_hazard(Vec2::new(500.0, 400.0), 10.0, &hazard).is_none());

        // Repeated vertices leave zero-length edges that must not poison the normal
        hazard.polygons = vec![vec![
            Vec2::new(-50.0, -50.0),
            Vec2::new(-50.0, -50.0),
            Vec2::new(50.0, -50.0),
            Vec2::new(0.0, 50.0),
        ]];
        let hit = resolve_ball_hazard(Vec2::new(500.0, 345.0), 10.0, &hazard).expect("hit");
        assert!(hit.normal.is_finite());
    }

    #[test]
    fn test_bullet_crossing_hazard() {
        let hazard = block_hazard();
        assert!(segment_hits_hazard(Vec2::new(440.0, 400.0), Vec2::new(460.0, 400.0), &hazard));
        assert!(!segment_hits_hazard(Vec2::new(400.0, 300.0), Vec2::new(420.0, 300.0), &hazard));
    }

    #[test]
    fn test_outlines_are_valid_loops() {
        for kind in FigureKind::ALL {
            for points in kind.outline(120.0, 100.0) {
                assert!(points.len() >= 3, "{} loop too short", kind.as_str());
                assert!(points.iter().all(|p| p.y >= 0.0 && p.y <= 100.0));
            }
        }
    }

    #[test]
    fn test_field_promotes_and_retires() {
        let config = HazardConfig {
            enabled: true,
            spawn_interval: 1.0,
            scroll_speed: 0.5,
            activation_depth: 0.5,
            exit_depth: 1.0,
        };
        let arena = ArenaConfig::default();
        let mut field = HazardField::new(config);
        let mut store = Store::new();
        let mut rng = Pcg32::seed_from_u64(3);
        let mut events = Vec::new();

        field.update(&mut store, 1.0, &mut rng, &arena, &mut events);
        assert_eq!(field.figures.len(), 1);
        assert!(events.is_empty());

        field.update(&mut store, 1.0, &mut rng, &arena, &mut events);
        let promoted = events.iter().find_map(|e| match e {
            GameEvent::SpawnRequest { entity, kind: SpawnKind::Hazard(_), .. } => Some(*entity),
            _ => None,
        });
        let id = promoted.expect("hazard promoted");
        assert!(store.get(id).is_some_and(|e| matches!(e.role, Role::Hazard)));

        events.clear();
        field.update(&mut store, 1.0, &mut rng, &arena, &mut events);
        assert!(events.contains(&GameEvent::Despawn { entity: id }));
        assert!(store.get(id).is_none());
    }
}
