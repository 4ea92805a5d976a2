#![forbid(unsafe_code)]

pub mod camera;
pub mod capture;
pub mod config;
pub mod effects;
pub mod encode;
pub mod foundation;
pub mod render;
pub mod schedule;
pub mod session;
pub mod transcode;

pub use camera::{Camera, CombineRequest, StoredTake};
pub use capture::{CaptureSource, Facing, Frame, TestPatternSource};
pub use config::CameraConfig;
pub use effects::{EffectKind, ParticleSimulator};
pub use foundation::core::{Canvas, Fps, Rgba8Premul};
pub use foundation::error::{ReelError, ReelResult};
pub use render::filter::FilterDescriptor;
pub use session::{CombineOutcome, SessionState};
