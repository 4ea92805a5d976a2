//! Encoder boundary.
//!
//! An [`EncoderBackend`] constructs [`Encoder`]s bound to one take. Encoders emit encoded chunks
//! periodically while frames are pushed ([`Encoder::poll_chunk`]); the recording session buffers
//! those chunks and hands them back on [`Encoder::finish`].

/// `ffmpeg`-based streaming encoder.
pub mod ffmpeg;
/// In-memory chunked encoder.
pub mod memory;

use crate::capture::{AudioTrack, FrameView};
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::ReelResult;

/// Encoder parameters for one take.
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderConfig {
    /// Preferred container/codec, e.g. `video/webm;codecs=vp9`. `None` lets the backend choose.
    pub mime: Option<String>,
    pub canvas: Canvas,
    pub fps: Fps,
    /// Audio track muxed alongside video, if any.
    pub audio: Option<AudioTrack>,
    /// Frames between emitted chunks.
    pub chunk_frames: u32,
}

impl EncoderConfig {
    /// Same geometry with no MIME preference.
    pub fn generic(&self) -> Self {
        Self {
            mime: None,
            ..self.clone()
        }
    }
}

/// Finalized encoder output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedMedia {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// One active encode.
pub trait Encoder {
    /// Container MIME type of the produced bytes.
    fn mime(&self) -> &str;

    fn push_frame(&mut self, frame: FrameView<'_>) -> ReelResult<()>;

    /// Interleaved samples matching the configured audio track.
    fn push_audio(&mut self, samples: &[f32]) -> ReelResult<()>;

    fn pause(&mut self) -> ReelResult<()>;

    fn resume(&mut self) -> ReelResult<()>;

    /// Encoded bytes produced since the previous poll.
    fn poll_chunk(&mut self) -> Option<Vec<u8>>;

    /// Flush and close. `buffered` holds every chunk previously returned by `poll_chunk`, in
    /// order.
    fn finish(self: Box<Self>, buffered: Vec<u8>) -> ReelResult<EncodedMedia>;
}

/// Factory for encoders.
pub trait EncoderBackend {
    fn name(&self) -> &str;

    fn start(&mut self, cfg: &EncoderConfig) -> ReelResult<Box<dyn Encoder>>;
}

/// Construct an encoder, retrying once with [`EncoderConfig::generic`] on setup failure.
pub fn start_encoder_with_fallback(
    backend: &mut dyn EncoderBackend,
    cfg: &EncoderConfig,
) -> ReelResult<Box<dyn Encoder>> {
    match backend.start(cfg) {
        Ok(enc) => Ok(enc),
        Err(err) if err.is_encoder_setup_failure() && cfg.mime.is_some() => {
            tracing::warn!(
                backend = backend.name(),
                mime = cfg.mime.as_deref().unwrap_or_default(),
                error = %err,
                "encoder rejected configuration, retrying with defaults"
            );
            backend.start(&cfg.generic())
        }
        Err(err) => Err(err),
    }
}

/// Base MIME type without parameters, lowercased (`video/webm;codecs=vp9` -> `video/webm`).
pub fn mime_essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

#[cfg(test)]
#[path = "../../tests/unit/encode/mod.rs"]
mod tests;
