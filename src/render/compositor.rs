use crate::capture::{Frame, FrameView};
use crate::foundation::core::Canvas;
use crate::foundation::error::ReelResult;
use crate::render::filter::{CompiledFilter, FilterDescriptor};
use crate::render::surface::Surface;
use crate::schedule::CancelHandle;

/// Compositor counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositorStats {
    /// Ticks that produced a frame.
    pub frames: u64,
    /// Ticks ignored because the compositor was stopped.
    pub skipped: u64,
    /// Offscreen surface allocations.
    pub allocations: u64,
}

/// Draws the filtered camera frame plus an overlay onto an owned offscreen surface, once per tick.
///
/// The surface doubles as a synthetic frame source for encoding (see [`FrameCompositor::output`]).
pub struct FrameCompositor {
    surface: Option<Surface>,
    filter: FilterDescriptor,
    compiled: CompiledFilter,
    liveness: CancelHandle,
    stats: CompositorStats,
}

impl FrameCompositor {
    /// Create a stopped compositor.
    pub fn new(filter: FilterDescriptor) -> ReelResult<Self> {
        let compiled = filter.compile()?;
        let liveness = CancelHandle::new();
        liveness.cancel();
        Ok(Self {
            surface: None,
            filter,
            compiled,
            liveness,
            stats: CompositorStats::default(),
        })
    }

    /// Begin a new run. Returns the liveness handle to tie the tick subscription to.
    ///
    /// Starting an already running compositor keeps the current run.
    pub fn start(&mut self) -> CancelHandle {
        if self.liveness.is_cancelled() {
            self.liveness = CancelHandle::new();
            tracing::debug!("compositor started");
        }
        self.liveness.clone()
    }

    pub fn is_live(&self) -> bool {
        !self.liveness.is_cancelled()
    }

    /// Size the offscreen surface to the source's native resolution.
    ///
    /// Returns `true` when a surface was (re)allocated; unchanged dimensions are a no-op.
    pub fn configure(&mut self, canvas: Canvas) -> bool {
        if self.surface.as_ref().is_some_and(|s| s.canvas() == canvas) {
            return false;
        }
        tracing::debug!(width = canvas.width, height = canvas.height, "compositor surface allocated");
        self.surface = Some(Surface::new(canvas));
        self.stats.allocations += 1;
        true
    }

    pub fn filter(&self) -> &FilterDescriptor {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: FilterDescriptor) -> ReelResult<()> {
        self.compiled = filter.compile()?;
        tracing::debug!(filter = %filter.name, "compositor filter changed");
        self.filter = filter;
        Ok(())
    }

    /// Composite one frame. Returns `false` without touching any surface when stopped.
    pub fn tick(&mut self, base: &Frame, overlay: Option<&Surface>) -> ReelResult<bool> {
        if !self.is_live() {
            self.stats.skipped += 1;
            return Ok(false);
        }
        self.configure(base.canvas());
        let Some(surface) = self.surface.as_mut() else {
            return Ok(false);
        };

        surface.copy_from(base)?;
        if !self.compiled.is_identity() {
            self.compiled.apply(surface)?;
        }
        if let Some(overlay) = overlay {
            if overlay.canvas() == surface.canvas() {
                surface.draw_over(overlay, 1.0)?;
            } else {
                tracing::warn!(
                    overlay_w = overlay.canvas().width,
                    overlay_h = overlay.canvas().height,
                    "overlay size differs from capture, overlay skipped"
                );
            }
        }
        self.stats.frames += 1;
        Ok(true)
    }

    /// Latest composited frame, while running.
    pub fn output(&self) -> Option<FrameView<'_>> {
        if !self.is_live() {
            return None;
        }
        self.surface.as_ref().map(Surface::view)
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    /// Release the surface and cancel scheduling. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.is_live() {
            tracing::debug!("compositor stopped");
        }
        self.liveness.cancel();
        self.surface = None;
    }

    pub fn stats(&self) -> CompositorStats {
        self.stats
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
