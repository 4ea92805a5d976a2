use kurbo::{BezPath, Point, Shape};

use crate::capture::{Frame, FrameView};
use crate::foundation::core::{Canvas, Rgba8Premul};
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::composite::{over, over_in_place};

const PATH_TOLERANCE: f64 = 0.1;
// 2x2 supersampling offsets within a pixel.
const SAMPLE_OFFSETS: [(f64, f64); 4] = [(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)];

/// Offscreen premultiplied RGBA8 pixel buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    canvas: Canvas,
    data: Vec<u8>,
}

impl Surface {
    /// Allocate a fully transparent surface.
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            data: vec![0u8; canvas.rgba_len()],
        }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            width: self.canvas.width,
            height: self.canvas.height,
            data: &self.data,
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame {
            width: self.canvas.width,
            height: self.canvas.height,
            data: self.data.clone(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.canvas.width || y >= self.canvas.height {
            return None;
        }
        let i = ((y as usize) * (self.canvas.width as usize) + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Replace contents with `frame`. Dimensions must match.
    pub fn copy_from(&mut self, frame: &Frame) -> ReelResult<()> {
        if frame.canvas() != self.canvas {
            return Err(ReelError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.canvas.width, self.canvas.height
            )));
        }
        if frame.data.len() != self.data.len() {
            return Err(ReelError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }
        self.data.copy_from_slice(&frame.data);
        Ok(())
    }

    /// Source-over `src` on top of this surface.
    pub fn draw_over(&mut self, src: &Surface, opacity: f32) -> ReelResult<()> {
        if src.canvas != self.canvas {
            return Err(ReelError::validation(format!(
                "overlay size mismatch: got {}x{}, expected {}x{}",
                src.canvas.width, src.canvas.height, self.canvas.width, self.canvas.height
            )));
        }
        over_in_place(&mut self.data, &src.data, opacity)
    }

    /// Fill `path` (already in surface pixel space) with a straight-alpha color.
    ///
    /// Coverage is estimated with 2x2 supersampling and the non-zero winding rule.
    pub fn fill_path(&mut self, path: &BezPath, rgba: [u8; 4], opacity: f32) {
        if opacity <= 0.0 || rgba[3] == 0 {
            return;
        }
        let bbox = path.bounding_box();
        let w = self.canvas.width as i64;
        let h = self.canvas.height as i64;
        let x0 = (bbox.x0.floor() as i64).clamp(0, w);
        let x1 = (bbox.x1.ceil() as i64).clamp(0, w);
        let y0 = (bbox.y0.floor() as i64).clamp(0, h);
        let y1 = (bbox.y1.ceil() as i64).clamp(0, h);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        // Flattening once keeps the per-sample winding test on line segments only.
        let mut flat = BezPath::new();
        kurbo::flatten(path.iter(), PATH_TOLERANCE, |el| flat.push(el));

        for y in y0..y1 {
            for x in x0..x1 {
                let hits = SAMPLE_OFFSETS
                    .iter()
                    .filter(|(dx, dy)| flat.winding(Point::new(x as f64 + dx, y as f64 + dy)) != 0)
                    .count();
                if hits == 0 {
                    continue;
                }
                let coverage = hits as f32 / SAMPLE_OFFSETS.len() as f32;
                let src = Rgba8Premul::from_straight_rgba(rgba[0], rgba[1], rgba[2], rgba[3]);
                let i = ((y as usize) * (w as usize) + x as usize) * 4;
                let d = [
                    self.data[i],
                    self.data[i + 1],
                    self.data[i + 2],
                    self.data[i + 3],
                ];
                let out = over(d, src.to_array(), opacity * coverage);
                self.data[i..i + 4].copy_from_slice(&out);
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface.rs"]
mod tests;
