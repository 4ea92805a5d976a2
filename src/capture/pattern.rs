use crate::capture::{AudioTrack, CaptureSource, Facing, Frame};
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{ReelError, ReelResult};

const BARS: [[u8; 3]; 7] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
];

/// Synthetic camera: scrolling color bars and a 440 Hz tone.
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    canvas: Canvas,
    fps: Fps,
    facing: Facing,
    torch: bool,
    zoom: f32,
    available: bool,
    frame_idx: u64,
    sample_rate: u32,
    channels: u16,
    audio_phase: f64,
}

impl TestPatternSource {
    pub fn new(canvas: Canvas, fps: Fps) -> Self {
        Self {
            canvas,
            fps,
            facing: Facing::Front,
            torch: false,
            zoom: 1.0,
            available: true,
            frame_idx: 0,
            sample_rate: 48_000,
            channels: 2,
            audio_phase: 0.0,
        }
    }

    /// Simulate the device disappearing (or coming back).
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn torch(&self) -> bool {
        self.torch
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn frames_produced(&self) -> u64 {
        self.frame_idx
    }
}

impl CaptureSource for TestPatternSource {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn frame(&mut self) -> ReelResult<Frame> {
        if !self.available {
            return Err(ReelError::capture_unavailable("test pattern source stopped"));
        }
        let Canvas { width, height } = self.canvas;
        let bar_w = (width as usize / BARS.len()).max(1);
        let shift = self.frame_idx as usize;
        let boost: u8 = if self.torch { 20 } else { 0 };

        let mut data = vec![0u8; self.canvas.rgba_len()];
        for (y, row) in data.chunks_exact_mut(width as usize * 4).enumerate() {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let col = match self.facing {
                    Facing::Front => x,
                    Facing::Back => width as usize - 1 - x,
                };
                let bar = BARS[((col + shift) / bar_w) % BARS.len()];
                let shade = ((y * 32) / height as usize) as u8;
                px[0] = bar[0].saturating_sub(shade).saturating_add(boost);
                px[1] = bar[1].saturating_sub(shade).saturating_add(boost);
                px[2] = bar[2].saturating_sub(shade).saturating_add(boost);
                px[3] = 255;
            }
        }

        self.frame_idx += 1;
        Ok(Frame {
            width,
            height,
            data,
        })
    }

    fn audio_track(&self) -> Option<AudioTrack> {
        Some(AudioTrack {
            id: "test-tone".to_owned(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    fn read_audio(&mut self, out: &mut Vec<f32>) -> usize {
        if !self.available {
            return 0;
        }
        let frames = (f64::from(self.sample_rate) / self.fps.as_f64()).round() as usize;
        let step = 2.0 * std::f64::consts::PI * 440.0 / f64::from(self.sample_rate);
        for _ in 0..frames {
            let s = (self.audio_phase.sin() * 0.2) as f32;
            for _ in 0..self.channels {
                out.push(s);
            }
            self.audio_phase = (self.audio_phase + step) % (2.0 * std::f64::consts::PI);
        }
        frames * self.channels as usize
    }

    fn facing(&self) -> Facing {
        self.facing
    }

    fn set_facing(&mut self, facing: Facing) -> ReelResult<()> {
        tracing::debug!(?facing, "test pattern facing changed");
        self.facing = facing;
        Ok(())
    }

    fn set_torch(&mut self, on: bool) -> ReelResult<()> {
        if self.facing == Facing::Front && on {
            return Err(ReelError::validation("torch is not available on the front camera"));
        }
        self.torch = on;
        Ok(())
    }

    fn set_zoom(&mut self, level: f32) -> ReelResult<()> {
        if !level.is_finite() || !(1.0..=10.0).contains(&level) {
            return Err(ReelError::validation(format!(
                "zoom level must be within [1, 10], got {level}"
            )));
        }
        self.zoom = level;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/capture/pattern.rs"]
mod tests;
