use crate::capture::FrameView;
use crate::encode::{EncodedMedia, Encoder, EncoderBackend, EncoderConfig, mime_essence};
use crate::foundation::error::{ReelError, ReelResult};

/// MIME type of the in-memory container.
pub const RAW_MIME: &str = "video/x-reeltake-raw";

const MAGIC: &[u8; 4] = b"RTK1";
const TAG_VIDEO: u8 = b'V';
const TAG_AUDIO: u8 = b'A';
const TAG_PAUSE: u8 = b'P';
const TAG_RESUME: u8 = b'R';

/// Backend producing [`ChunkedMemoryEncoder`]s. Accepts only [`RAW_MIME`] (or no preference).
#[derive(Debug, Default)]
pub struct ChunkedMemoryBackend {
    started: u32,
    rejected: u32,
}

impl ChunkedMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoders constructed so far.
    pub fn started(&self) -> u32 {
        self.started
    }

    /// Configurations refused so far.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }
}

impl EncoderBackend for ChunkedMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn start(&mut self, cfg: &EncoderConfig) -> ReelResult<Box<dyn Encoder>> {
        if let Some(mime) = cfg.mime.as_deref()
            && mime_essence(mime) != RAW_MIME
        {
            self.rejected += 1;
            return Err(ReelError::unsupported_format(format!(
                "memory encoder cannot produce '{mime}'"
            )));
        }
        self.started += 1;
        Ok(Box::new(ChunkedMemoryEncoder::new(cfg)))
    }
}

/// Self-describing in-memory container: a header followed by tagged frame, audio and pause
/// records, emitted as a chunk every `chunk_frames` frames.
#[derive(Debug)]
pub struct ChunkedMemoryEncoder {
    pending: Vec<u8>,
    frames_in_chunk: u32,
    chunk_frames: u32,
    width: u32,
    height: u32,
    paused: bool,
}

impl ChunkedMemoryEncoder {
    pub fn new(cfg: &EncoderConfig) -> Self {
        let mut pending = Vec::with_capacity(32);
        pending.extend_from_slice(MAGIC);
        pending.extend_from_slice(&cfg.canvas.width.to_le_bytes());
        pending.extend_from_slice(&cfg.canvas.height.to_le_bytes());
        pending.extend_from_slice(&cfg.fps.num.to_le_bytes());
        pending.extend_from_slice(&cfg.fps.den.to_le_bytes());
        let (rate, channels) = cfg
            .audio
            .as_ref()
            .map(|a| (a.sample_rate, a.channels))
            .unwrap_or((0, 0));
        pending.extend_from_slice(&rate.to_le_bytes());
        pending.extend_from_slice(&channels.to_le_bytes());
        Self {
            pending,
            frames_in_chunk: 0,
            chunk_frames: cfg.chunk_frames.max(1),
            width: cfg.canvas.width,
            height: cfg.canvas.height,
            paused: false,
        }
    }

    fn record(&mut self, tag: u8, payload: &[u8]) {
        self.pending.push(tag);
        self.pending
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.pending.extend_from_slice(payload);
    }
}

impl Encoder for ChunkedMemoryEncoder {
    fn mime(&self) -> &str {
        RAW_MIME
    }

    fn push_frame(&mut self, frame: FrameView<'_>) -> ReelResult<()> {
        if self.paused {
            return Err(ReelError::encoder("frame pushed while encoder is paused"));
        }
        if frame.width != self.width || frame.height != self.height {
            return Err(ReelError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        self.record(TAG_VIDEO, frame.data);
        self.frames_in_chunk += 1;
        Ok(())
    }

    fn push_audio(&mut self, samples: &[f32]) -> ReelResult<()> {
        if self.paused {
            return Err(ReelError::encoder("audio pushed while encoder is paused"));
        }
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.record(TAG_AUDIO, &bytes);
        Ok(())
    }

    fn pause(&mut self) -> ReelResult<()> {
        if !self.paused {
            self.paused = true;
            self.record(TAG_PAUSE, &[]);
        }
        Ok(())
    }

    fn resume(&mut self) -> ReelResult<()> {
        if self.paused {
            self.paused = false;
            self.record(TAG_RESUME, &[]);
        }
        Ok(())
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        if self.frames_in_chunk < self.chunk_frames {
            return None;
        }
        self.frames_in_chunk = 0;
        Some(std::mem::take(&mut self.pending))
    }

    fn finish(self: Box<Self>, mut buffered: Vec<u8>) -> ReelResult<EncodedMedia> {
        buffered.extend_from_slice(&self.pending);
        Ok(EncodedMedia {
            bytes: buffered,
            mime: RAW_MIME.to_owned(),
        })
    }
}

/// Parsed overview of a [`RAW_MIME`] buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawSummary {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub frames: u64,
    pub audio_samples: u64,
    pub pauses: u32,
}

impl RawSummary {
    pub fn parse(bytes: &[u8]) -> ReelResult<Self> {
        fn u32_at(b: &[u8], at: usize) -> ReelResult<u32> {
            b.get(at..at + 4)
                .and_then(|s| s.try_into().ok())
                .map(u32::from_le_bytes)
                .ok_or_else(|| ReelError::validation("truncated raw container"))
        }

        if bytes.get(..4) != Some(MAGIC.as_slice()) {
            return Err(ReelError::validation("not a raw reeltake container"));
        }
        let mut s = Self {
            width: u32_at(bytes, 4)?,
            height: u32_at(bytes, 8)?,
            fps_num: u32_at(bytes, 12)?,
            fps_den: u32_at(bytes, 16)?,
            ..Self::default()
        };
        let mut at = 4 + 4 * 5 + 2;
        while at < bytes.len() {
            let tag = bytes[at];
            let len = u32_at(bytes, at + 1)? as usize;
            at += 5;
            if at + len > bytes.len() {
                return Err(ReelError::validation("truncated raw record"));
            }
            match tag {
                TAG_VIDEO => s.frames += 1,
                TAG_AUDIO => s.audio_samples += (len / 4) as u64,
                TAG_PAUSE => s.pauses += 1,
                TAG_RESUME => {}
                other => {
                    return Err(ReelError::validation(format!(
                        "unknown raw record tag {other:#x}"
                    )));
                }
            }
            at += len;
        }
        Ok(s)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/memory.rs"]
mod tests;
