/// Gaussian blur pass.
pub mod blur;
/// Per-pixel premultiplied alpha compositing.
pub mod composite;
/// Camera frame plus overlay compositor.
pub mod compositor;
/// Filter descriptors, presets and color matrices.
pub mod filter;
/// Offscreen RGBA8 surfaces.
pub mod surface;
