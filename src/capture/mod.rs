//! Capture source boundary.
//!
//! Device acquisition lives outside this crate; the pipeline only talks to a [`CaptureSource`].

mod pattern;

pub use pattern::TestPatternSource;

use crate::foundation::core::Canvas;
use crate::foundation::error::ReelResult;

/// Camera facing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Front,
    Back,
}

impl Facing {
    pub fn flipped(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

/// One premultiplied RGBA8 video frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major premultiplied RGBA8, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Borrowed frame handed to encoders, from either the raw source or the compositor surface.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// Audio track descriptor.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioTrack {
    pub id: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Live camera plus microphone.
pub trait CaptureSource {
    /// Native frame dimensions. May change after a facing switch.
    fn canvas(&self) -> Canvas;

    /// Current frame. Fails with `CaptureUnavailable` when the device is gone.
    fn frame(&mut self) -> ReelResult<Frame>;

    fn audio_track(&self) -> Option<AudioTrack>;

    /// Append interleaved `f32` samples captured since the previous call. Returns how many were
    /// appended.
    fn read_audio(&mut self, out: &mut Vec<f32>) -> usize;

    fn facing(&self) -> Facing;

    fn set_facing(&mut self, facing: Facing) -> ReelResult<()>;

    fn set_torch(&mut self, on: bool) -> ReelResult<()>;

    fn set_zoom(&mut self, level: f32) -> ReelResult<()>;
}
