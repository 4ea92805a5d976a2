use std::str::FromStr;

use kurbo::{Affine, BezPath, Circle, Point, Rect, Shape, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::surface::Surface;
use crate::schedule::CancelHandle;

/// Default live particle cap.
pub const DEFAULT_PARTICLE_CAP: usize = 200;
/// Chance that each spawn slot produces a particle on a given tick.
pub const DEFAULT_SPAWN_PROBABILITY: f64 = 0.5;

const UNIT_PATH_TOLERANCE: f64 = 0.005;
const SNOW_MAX_DRIFT: f64 = 1.0;

/// Overlay effect. Exactly one is active at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    #[default]
    None,
    Sparkle,
    Hearts,
    Confetti,
    Snow,
    Fire,
}

impl EffectKind {
    pub const ALL: [EffectKind; 6] = [
        Self::None,
        Self::Sparkle,
        Self::Hearts,
        Self::Confetti,
        Self::Snow,
        Self::Fire,
    ];

    /// Spawn attempts per tick.
    pub fn spawn_rate(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Sparkle => 3,
            Self::Hearts => 2,
            Self::Confetti => 5,
            Self::Snow => 4,
            Self::Fire => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sparkle => "sparkle",
            Self::Hearts => "hearts",
            Self::Confetti => "confetti",
            Self::Snow => "snow",
            Self::Fire => "fire",
        }
    }
}

impl FromStr for EffectKind {
    type Err = ReelError;

    fn from_str(s: &str) -> ReelResult<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| ReelError::validation(format!("unknown effect '{s}'")))
    }
}

/// Glyph-style sprites (drawn as vector glyphs).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlyphShape {
    Sparkle,
    Heart,
    Snowflake,
}

/// Plain colored sprites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolidShape {
    Rect,
    Circle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticleVisual {
    Glyph { shape: GlyphShape, rgba: [u8; 4] },
    Solid { shape: SolidShape, rgba: [u8; 4] },
}

/// One animated sprite. Units are pixels and ticks.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    /// Spawn order within the simulator, increasing.
    pub seq: u64,
    pub position: Point,
    pub velocity: Vec2,
    pub size: f64,
    /// Radians.
    pub rotation: f64,
    pub rotation_speed: f64,
    pub age: u32,
    pub max_age: u32,
    pub opacity: f32,
    pub visual: ParticleVisual,
}

struct UnitShapes {
    sparkle: BezPath,
    heart: BezPath,
    snowflake: BezPath,
    rect: BezPath,
    circle: BezPath,
}

impl UnitShapes {
    fn new() -> Self {
        let mut heart = BezPath::new();
        heart.move_to((0.0, 0.45));
        heart.curve_to((-0.55, 0.05), (-0.45, -0.5), (0.0, -0.2));
        heart.curve_to((0.45, -0.5), (0.55, 0.05), (0.0, 0.45));
        heart.close_path();

        Self {
            sparkle: star_path(4, 0.5, 0.15),
            heart,
            snowflake: star_path(6, 0.5, 0.2),
            rect: Rect::new(-0.5, -0.3, 0.5, 0.3).to_path(UNIT_PATH_TOLERANCE),
            circle: Circle::new((0.0, 0.0), 0.5).to_path(UNIT_PATH_TOLERANCE),
        }
    }

    fn for_visual(&self, visual: ParticleVisual) -> (&BezPath, [u8; 4]) {
        match visual {
            ParticleVisual::Glyph { shape, rgba } => {
                let p = match shape {
                    GlyphShape::Sparkle => &self.sparkle,
                    GlyphShape::Heart => &self.heart,
                    GlyphShape::Snowflake => &self.snowflake,
                };
                (p, rgba)
            }
            ParticleVisual::Solid { shape, rgba } => {
                let p = match shape {
                    SolidShape::Rect => &self.rect,
                    SolidShape::Circle => &self.circle,
                };
                (p, rgba)
            }
        }
    }
}

fn star_path(points: u32, outer: f64, inner: f64) -> BezPath {
    let mut p = BezPath::new();
    let n = points * 2;
    for i in 0..n {
        let r = if i % 2 == 0 { outer } else { inner };
        let theta = std::f64::consts::PI * f64::from(i) / f64::from(points) - std::f64::consts::FRAC_PI_2;
        let pt = Point::new(r * theta.cos(), r * theta.sin());
        if i == 0 {
            p.move_to(pt);
        } else {
            p.line_to(pt);
        }
    }
    p.close_path();
    p
}

const CONFETTI_COLORS: [[u8; 4]; 6] = [
    [255, 82, 82, 255],
    [255, 193, 7, 255],
    [76, 175, 80, 255],
    [33, 150, 243, 255],
    [156, 39, 176, 255],
    [255, 255, 255, 255],
];
const FIRE_COLORS: [[u8; 4]; 3] = [[255, 87, 34, 255], [255, 152, 0, 255], [255, 235, 59, 255]];

/// Simulation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParticleStats {
    pub spawned: u64,
    pub expired: u64,
    pub evicted: u64,
    pub peak_live: usize,
}

/// Bounded particle set for the active effect, rendered onto its own overlay surface.
pub struct ParticleSimulator {
    effect: EffectKind,
    particles: Vec<Particle>,
    cap: usize,
    spawn_probability: f64,
    next_seq: u64,
    rng: StdRng,
    overlay: Surface,
    shapes: UnitShapes,
    liveness: CancelHandle,
    stats: ParticleStats,
}

impl ParticleSimulator {
    pub fn new(canvas: Canvas, cap: usize) -> Self {
        Self::with_rng(canvas, cap, StdRng::from_entropy())
    }

    /// Deterministic simulator for reproducible runs.
    pub fn with_seed(canvas: Canvas, cap: usize, seed: u64) -> Self {
        Self::with_rng(canvas, cap, StdRng::seed_from_u64(seed))
    }

    fn with_rng(canvas: Canvas, cap: usize, rng: StdRng) -> Self {
        Self {
            effect: EffectKind::None,
            particles: Vec::new(),
            cap: cap.max(1),
            spawn_probability: DEFAULT_SPAWN_PROBABILITY,
            next_seq: 0,
            rng,
            overlay: Surface::new(canvas),
            shapes: UnitShapes::new(),
            liveness: CancelHandle::new(),
            stats: ParticleStats::default(),
        }
    }

    /// Override the per-slot spawn chance (clamped to `[0, 1]`).
    pub fn with_spawn_probability(mut self, p: f64) -> Self {
        self.spawn_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn effect(&self) -> EffectKind {
        self.effect
    }

    pub fn is_active(&self) -> bool {
        self.effect != EffectKind::None
    }

    /// Switch effect. Switching to a different kind drops every live particle immediately.
    pub fn set_effect(&mut self, effect: EffectKind) {
        if effect == self.effect {
            return;
        }
        tracing::debug!(from = self.effect.name(), to = effect.name(), "particle effect changed");
        self.effect = effect;
        self.particles.clear();
        self.overlay.clear();
    }

    /// Match the overlay to the capture resolution. Particles are kept.
    pub fn resize(&mut self, canvas: Canvas) {
        if self.overlay.canvas() != canvas {
            self.overlay = Surface::new(canvas);
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn overlay(&self) -> &Surface {
        &self.overlay
    }

    pub fn stats(&self) -> ParticleStats {
        self.stats
    }

    /// (Re)start the loop. Returns the liveness handle for the tick subscription.
    pub fn start(&mut self) -> CancelHandle {
        if self.liveness.is_cancelled() {
            self.liveness = CancelHandle::new();
        }
        self.liveness.clone()
    }

    pub fn stop(&mut self) {
        self.liveness.cancel();
    }

    pub fn is_live(&self) -> bool {
        !self.liveness.is_cancelled()
    }

    /// Step and render once. No-op when stopped.
    pub fn tick(&mut self) -> bool {
        if !self.is_live() {
            return false;
        }
        self.step();
        self.render();
        true
    }

    /// Spawn, enforce the cap, then integrate and expire.
    pub fn step(&mut self) {
        self.spawn();
        if self.particles.len() > self.cap {
            let excess = self.particles.len() - self.cap;
            self.particles.drain(..excess);
            self.stats.evicted += excess as u64;
        }
        self.update();
        self.stats.peak_live = self.stats.peak_live.max(self.particles.len());
    }

    fn spawn(&mut self) {
        let effect = self.effect;
        for _ in 0..effect.spawn_rate() {
            if !self.rng.gen_bool(self.spawn_probability) {
                continue;
            }
            let p = self.new_particle(effect);
            self.particles.push(p);
            self.stats.spawned += 1;
        }
    }

    fn new_particle(&mut self, effect: EffectKind) -> Particle {
        let w = f64::from(self.overlay.canvas().width);
        let h = f64::from(self.overlay.canvas().height);
        let rng = &mut self.rng;
        let seq = self.next_seq;
        self.next_seq += 1;

        let (position, velocity, size, rotation_speed, max_age, visual) = match effect {
            EffectKind::Sparkle => (
                Point::new(rng.gen_range(0.0..w), rng.gen_range(0.0..h)),
                Vec2::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5)),
                rng.gen_range(8.0..20.0),
                rng.gen_range(-0.1..0.1),
                rng.gen_range(20..40),
                ParticleVisual::Glyph {
                    shape: GlyphShape::Sparkle,
                    rgba: if rng.gen_bool(0.5) {
                        [255, 215, 0, 255]
                    } else {
                        [255, 255, 255, 255]
                    },
                },
            ),
            EffectKind::Hearts => {
                let size = rng.gen_range(14.0..28.0);
                (
                    Point::new(rng.gen_range(0.0..w), h + size),
                    Vec2::new(rng.gen_range(-0.5..0.5), -rng.gen_range(1.0..3.0)),
                    size,
                    rng.gen_range(-0.02..0.02),
                    rng.gen_range(120..180),
                    ParticleVisual::Glyph {
                        shape: GlyphShape::Heart,
                        rgba: if rng.gen_bool(0.5) {
                            [255, 64, 129, 255]
                        } else {
                            [255, 23, 68, 255]
                        },
                    },
                )
            }
            EffectKind::Confetti => (
                Point::new(rng.gen_range(0.0..w), -10.0),
                Vec2::new(rng.gen_range(-2.0..2.0), rng.gen_range(2.0..5.0)),
                rng.gen_range(6.0..12.0),
                rng.gen_range(-0.2..0.2),
                rng.gen_range(100..150),
                ParticleVisual::Solid {
                    shape: SolidShape::Rect,
                    rgba: CONFETTI_COLORS[rng.gen_range(0..CONFETTI_COLORS.len())],
                },
            ),
            EffectKind::Snow => (
                Point::new(rng.gen_range(0.0..w), -5.0),
                Vec2::new(rng.gen_range(-0.5..0.5), rng.gen_range(0.5..2.0)),
                rng.gen_range(4.0..10.0),
                rng.gen_range(-0.05..0.05),
                rng.gen_range(200..300),
                ParticleVisual::Glyph {
                    shape: GlyphShape::Snowflake,
                    rgba: [255, 255, 255, 230],
                },
            ),
            EffectKind::Fire => {
                let band = (w * 0.1).max(1.0);
                (
                    Point::new(w / 2.0 + rng.gen_range(-band..band), h - rng.gen_range(0.0..20.0)),
                    Vec2::new(rng.gen_range(-0.5..0.5), -rng.gen_range(2.0..4.0)),
                    rng.gen_range(10.0..25.0),
                    0.0,
                    rng.gen_range(20..40),
                    ParticleVisual::Solid {
                        shape: SolidShape::Circle,
                        rgba: FIRE_COLORS[rng.gen_range(0..FIRE_COLORS.len())],
                    },
                )
            }
            EffectKind::None => (
                Point::ZERO,
                Vec2::ZERO,
                0.0,
                0.0,
                0,
                ParticleVisual::Solid {
                    shape: SolidShape::Circle,
                    rgba: [0, 0, 0, 0],
                },
            ),
        };

        Particle {
            seq,
            position,
            velocity,
            size,
            rotation: 0.0,
            rotation_speed,
            age: 0,
            max_age,
            opacity: 1.0,
            visual,
        }
    }

    fn update(&mut self) {
        let snow = self.effect == EffectKind::Snow;
        for p in self.particles.iter_mut() {
            if snow {
                let jitter = self.rng.gen_range(-0.1..0.1);
                p.velocity.x = (p.velocity.x + jitter).clamp(-SNOW_MAX_DRIFT, SNOW_MAX_DRIFT);
            }
            p.position += p.velocity;
            p.rotation += p.rotation_speed;
            p.age += 1;
            p.opacity = if p.max_age == 0 {
                0.0
            } else {
                (1.0 - p.age as f32 / p.max_age as f32).max(0.0)
            };
        }
        let before = self.particles.len();
        self.particles.retain(|p| p.age <= p.max_age);
        self.stats.expired += (before - self.particles.len()) as u64;
    }

    /// Clear the overlay and draw every live particle.
    pub fn render(&mut self) {
        self.overlay.clear();
        for p in &self.particles {
            if p.opacity <= 0.0 {
                continue;
            }
            let (unit, rgba) = self.shapes.for_visual(p.visual);
            let xf = Affine::translate(p.position.to_vec2())
                * Affine::rotate(p.rotation)
                * Affine::scale(p.size);
            let mut path = unit.clone();
            path.apply_affine(xf);
            self.overlay.fill_path(&path, rgba, p.opacity);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/particles.rs"]
mod tests;
