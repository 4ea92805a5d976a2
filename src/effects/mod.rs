/// Bounded particle overlay simulation.
pub mod particles;

pub use particles::{EffectKind, Particle, ParticleSimulator};
