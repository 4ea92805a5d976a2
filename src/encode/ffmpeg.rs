use std::{
    io::{Read as _, Write as _},
    path::PathBuf,
    process::{Child, ChildStdin, Command, Stdio},
    sync::mpsc,
    thread::JoinHandle,
};

use anyhow::Context as _;

use crate::capture::FrameView;
use crate::encode::{EncodedMedia, Encoder, EncoderBackend, EncoderConfig, mime_essence};
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::mul_div255_u16;

const WEBM: &str = "video/webm";
const MP4: &str = "video/mp4";

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Output container picked for a requested MIME type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Webm,
    FragmentedMp4,
}

impl Container {
    /// `None` selects WebM.
    pub fn for_mime(mime: Option<&str>) -> ReelResult<Self> {
        match mime.map(mime_essence).as_deref() {
            None | Some(WEBM) => Ok(Self::Webm),
            Some(MP4) => Ok(Self::FragmentedMp4),
            Some(other) => Err(ReelError::unsupported_format(format!(
                "ffmpeg encoder cannot produce '{other}'"
            ))),
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Webm => "video/webm;codecs=vp9",
            Self::FragmentedMp4 => "video/mp4;codecs=avc1",
        }
    }

    fn muxer_args(self) -> &'static [&'static str] {
        match self {
            Self::Webm => &[
                "-c:v",
                "libvpx-vp9",
                "-deadline",
                "realtime",
                "-cpu-used",
                "8",
                "-f",
                "webm",
            ],
            Self::FragmentedMp4 => &[
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "frag_keyframe+empty_moov",
                "-f",
                "mp4",
            ],
        }
    }

    fn audio_args(self) -> &'static [&'static str] {
        match self {
            Self::Webm => &["-c:a", "libopus"],
            Self::FragmentedMp4 => &["-c:a", "aac"],
        }
    }
}

/// Backend spawning the system `ffmpeg` binary per take.
#[derive(Clone, Debug)]
pub struct FfmpegBackend {
    /// Background the premultiplied frames are flattened onto.
    pub bg_rgba: [u8; 4],
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            bg_rgba: [0, 0, 0, 255],
        }
    }
}

impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn start(&mut self, cfg: &EncoderConfig) -> ReelResult<Box<dyn Encoder>> {
        Ok(Box::new(FfmpegEncoder::new(cfg, self.bg_rgba)?))
    }
}

/// Streams raw RGBA frames into `ffmpeg` and collects the encoded container from its stdout.
///
/// Audio is spooled to a temporary `f32le` file and muxed in a second pass on [`Encoder::finish`].
pub struct FfmpegEncoder {
    container: Container,
    width: u32,
    height: u32,
    bg_rgba: [u8; 4],
    child: Child,
    stdin: Option<ChildStdin>,
    chunks: mpsc::Receiver<Vec<u8>>,
    stdout_reader: Option<JoinHandle<()>>,
    stderr_reader: Option<JoinHandle<String>>,
    scratch: Vec<u8>,
    audio: Option<AudioSpool>,
    paused: bool,
}

struct AudioSpool {
    dir: PathBuf,
    path: PathBuf,
    file: std::fs::File,
    sample_rate: u32,
    channels: u16,
    samples: u64,
}

impl FfmpegEncoder {
    pub fn new(cfg: &EncoderConfig, bg_rgba: [u8; 4]) -> ReelResult<Self> {
        let container = Container::for_mime(cfg.mime.as_deref())?;
        if !cfg.canvas.width.is_multiple_of(2) || !cfg.canvas.height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "encode width/height must be even (required for yuv420p output)",
            ));
        }
        if !is_ffmpeg_on_path() {
            return Err(ReelError::encoder(
                "ffmpeg is required for encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .args([
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-s",
                &format!("{}x{}", cfg.canvas.width, cfg.canvas.height),
                "-r",
                &format!("{}/{}", cfg.fps.num, cfg.fps.den),
                "-i",
                "pipe:0",
                "-an",
            ])
            .args(container.muxer_args())
            .arg("pipe:1");

        let mut child = cmd
            .spawn()
            .map_err(|e| ReelError::encoder(format!("failed to spawn ffmpeg: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::encoder("failed to open ffmpeg stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::encoder("failed to open ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::encoder("failed to open ffmpeg stderr"))?;

        let (tx, chunks) = mpsc::channel();
        let stdout_reader = std::thread::spawn(move || {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        let stderr_reader = std::thread::spawn(move || {
            let mut s = String::new();
            let _ = stderr.read_to_string(&mut s);
            s
        });

        let audio = match &cfg.audio {
            Some(track) => Some(AudioSpool::create(track.sample_rate, track.channels)?),
            None => None,
        };

        tracing::debug!(
            mime = container.mime(),
            width = cfg.canvas.width,
            height = cfg.canvas.height,
            audio = audio.is_some(),
            "ffmpeg encoder started"
        );

        Ok(Self {
            container,
            width: cfg.canvas.width,
            height: cfg.canvas.height,
            bg_rgba,
            child,
            stdin: Some(stdin),
            chunks,
            stdout_reader: Some(stdout_reader),
            stderr_reader: Some(stderr_reader),
            scratch: vec![0u8; cfg.canvas.rgba_len()],
            audio,
            paused: false,
        })
    }

    fn drain(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = self.chunks.try_recv() {
            out.extend(chunk);
        }
        out
    }
}

impl Encoder for FfmpegEncoder {
    fn mime(&self) -> &str {
        self.container.mime()
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
        flatten_to_opaque_rgba8(&mut self.scratch, frame.data, self.bg_rgba)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::encoder("ffmpeg encoder is already finalized"));
        };
        stdin
            .write_all(&self.scratch)
            .map_err(|e| ReelError::encoder(format!("failed to write frame to ffmpeg: {e}")))
    }

    fn push_audio(&mut self, samples: &[f32]) -> ReelResult<()> {
        if self.paused {
            return Err(ReelError::encoder("audio pushed while encoder is paused"));
        }
        match self.audio.as_mut() {
            Some(spool) => spool.write(samples),
            None => Ok(()),
        }
    }

    // Timestamps derive from the frame count, so skipping frames while paused leaves no gap.
    fn pause(&mut self) -> ReelResult<()> {
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> ReelResult<()> {
        self.paused = false;
        Ok(())
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        let out = self.drain();
        (!out.is_empty()).then_some(out)
    }

    fn finish(mut self: Box<Self>, mut buffered: Vec<u8>) -> ReelResult<EncodedMedia> {
        drop(self.stdin.take());
        if let Some(h) = self.stdout_reader.take() {
            let _ = h.join();
        }
        buffered.extend(self.drain());

        let status = self
            .child
            .wait()
            .map_err(|e| ReelError::encoder(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = self
            .stderr_reader
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(ReelError::encoder(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }

        let bytes = match self.audio.take() {
            Some(spool) if spool.samples > 0 => spool.mux(self.container, &buffered)?,
            Some(spool) => {
                spool.cleanup();
                buffered
            }
            None => buffered,
        };
        Ok(EncodedMedia {
            bytes,
            mime: self.container.mime().to_owned(),
        })
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        if let Some(spool) = self.audio.take() {
            spool.cleanup();
        }
    }
}

impl AudioSpool {
    fn create(sample_rate: u32, channels: u16) -> ReelResult<Self> {
        let dir = std::env::temp_dir().join(format!("reeltake-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create '{}'", dir.display()))?;
        let path = dir.join("audio.f32le");
        let file = std::fs::File::create(&path)?;
        Ok(Self {
            dir,
            path,
            file,
            sample_rate,
            channels,
            samples: 0,
        })
    }

    fn write(&mut self, samples: &[f32]) -> ReelResult<()> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.file.write_all(&bytes)?;
        self.samples += samples.len() as u64;
        Ok(())
    }

    fn mux(mut self, container: Container, video: &[u8]) -> ReelResult<Vec<u8>> {
        self.file.flush()?;
        let video_path = self.dir.join("video.bin");
        let out_path = self.dir.join("muxed.bin");
        std::fs::write(&video_path, video)?;

        let output = Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(&video_path)
            .args([
                "-f",
                "f32le",
                "-ar",
                &self.sample_rate.to_string(),
                "-ac",
                &self.channels.to_string(),
                "-i",
            ])
            .arg(&self.path)
            .args(["-map", "0:v", "-map", "1:a", "-c:v", "copy", "-shortest"])
            .args(container.audio_args())
            .args(match container {
                Container::Webm => &["-f", "webm"][..],
                Container::FragmentedMp4 => {
                    &["-movflags", "frag_keyframe+empty_moov", "-f", "mp4"][..]
                }
            })
            .arg(&out_path)
            .output()
            .map_err(|e| ReelError::encoder(format!("failed to spawn ffmpeg for muxing: {e}")));

        let result = output.and_then(|output| {
            if !output.status.success() {
                return Err(ReelError::encoder(format!(
                    "ffmpeg audio mux failed with status {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(std::fs::read(&out_path)?)
        });
        self.cleanup();
        result
    }

    fn cleanup(self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::debug!(dir = %self.dir.display(), error = %e, "failed to remove audio spool");
        }
    }
}

fn flatten_to_opaque_rgba8(dst: &mut [u8], src: &[u8], bg_rgba: [u8; 4]) -> ReelResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(ReelError::validation(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg = [bg_rgba[0] as u16, bg_rgba[1] as u16, bg_rgba[2] as u16];
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        if s[3] == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255u16 - s[3] as u16;
        for c in 0..3 {
            d[c] = (s[c] as u16 + mul_div255_u16(bg[c], inv)).min(255) as u8;
        }
        d[3] = 255;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
