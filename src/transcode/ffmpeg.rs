use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt as _, AsyncReadExt as _, BufReader};
use tokio::process::Command;

use crate::encode::mime_essence;
use crate::foundation::error::{ReelError, ReelResult};
use crate::transcode::{MediaBuffer, MonotonicProgress, Progress, Transcoder};

/// Transcoder backed by the system `ffmpeg` binary. Each call works in its own scratch
/// directory under `work_root`, removed when the call returns.
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    work_root: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg", std::env::temp_dir())
    }
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_root: work_root.into(),
        }
    }

    async fn scratch_dir(&self) -> ReelResult<ScratchDir> {
        let path = self
            .work_root
            .join(format!("reeltake-transcode-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("failed to create '{}'", path.display()))?;
        Ok(ScratchDir { path })
    }

    /// Run one ffmpeg invocation, reporting `out_time / expected_secs` as a percentage.
    async fn run(
        &self,
        args: Vec<String>,
        expected_secs: f64,
        progress: Progress<'_>,
    ) -> ReelResult<()> {
        let mut child = Command::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error", "-nostats", "-y"])
            .args(["-progress", "pipe:1"])
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ReelError::transcode(format!("failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::transcode("failed to open ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::transcode("failed to open ffmpeg stderr"))?;
        let stderr_task = tokio::spawn(async move {
            let mut s = String::new();
            let _ = stderr.read_to_string(&mut s).await;
            s
        });

        let mut state = ProgressState::default();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            state.update(key.trim(), value.trim());
            if key.trim() == "progress" {
                progress(state.percent(expected_secs));
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(ReelError::transcode(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }
        progress(100.0);
        Ok(())
    }
}

impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(&self) -> ReelResult<()> {
        let status = Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ReelError::transcode(format!("ffmpeg not available: {e}")))?;
        if !status.success() {
            return Err(ReelError::transcode(format!(
                "ffmpeg -version exited with status {status}"
            )));
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(inputs = inputs.len()))]
    async fn concatenate(
        &self,
        inputs: &[MediaBuffer],
        progress: Progress<'_>,
    ) -> ReelResult<MediaBuffer> {
        let first = inputs
            .first()
            .ok_or_else(|| ReelError::validation("nothing to concatenate"))?;
        let ext = extension_for(&first.mime)?;
        let dir = self.scratch_dir().await?;

        let mut list = String::new();
        for (i, input) in inputs.iter().enumerate() {
            let path = dir.path.join(format!("in-{i:03}.{ext}"));
            tokio::fs::write(&path, &input.bytes).await?;
            list.push_str(&format!("file '{}'\n", path.display()));
        }
        let list_path = dir.path.join("inputs.txt");
        tokio::fs::write(&list_path, list).await?;
        let out = dir.path.join(format!("out.{ext}"));

        let total: f64 = inputs.iter().map(|i| i.duration_secs).sum();
        let args = vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(&list_path),
            "-c".into(),
            "copy".into(),
            path_arg(&out),
        ];
        self.run(args, total, progress).await?;

        let bytes = tokio::fs::read(&out).await?;
        tracing::debug!(bytes = bytes.len(), duration_secs = total, "concatenated");
        Ok(MediaBuffer::new(bytes, first.mime.clone(), total))
    }

    #[tracing::instrument(skip_all, fields(speed = %speed, bytes = input.len()))]
    async fn change_speed(
        &self,
        input: &MediaBuffer,
        speed: f32,
        progress: Progress<'_>,
    ) -> ReelResult<MediaBuffer> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ReelError::validation(format!("invalid speed {speed}")));
        }
        let ext = extension_for(&input.mime)?;
        let dir = self.scratch_dir().await?;
        let src = dir.path.join(format!("in.{ext}"));
        let out = dir.path.join(format!("out.{ext}"));
        tokio::fs::write(&src, &input.bytes).await?;

        let expected = input.duration_secs / f64::from(speed);
        let video_filter = format!("setpts=PTS/{speed}");
        let monotonic = MonotonicProgress::new(progress);
        let report = |p: f32| monotonic.report(p);
        let with_audio = speed_args(&src, &out, ext, &video_filter, Some(atempo_chain(speed).as_str()));
        if let Err(err) = self.run(with_audio, expected, &report).await {
            tracing::debug!(
                error = %err,
                reached = monotonic.high_water(),
                "retiming with audio failed, retrying video only"
            );
            let video_only = speed_args(&src, &out, ext, &video_filter, None);
            self.run(video_only, expected, &report).await?;
        }

        let bytes = tokio::fs::read(&out).await?;
        Ok(MediaBuffer::new(bytes, input.mime.clone(), expected))
    }
}

struct ScratchDir {
    path: PathBuf,
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::debug!(dir = %self.path.display(), error = %e, "failed to remove scratch dir");
        }
    }
}

fn path_arg(p: &Path) -> String {
    p.display().to_string()
}

fn extension_for(mime: &str) -> ReelResult<&'static str> {
    match mime_essence(mime).as_str() {
        "video/webm" => Ok("webm"),
        "video/mp4" => Ok("mp4"),
        "video/quicktime" => Ok("mov"),
        "video/x-matroska" => Ok("mkv"),
        other => Err(ReelError::unsupported_format(format!(
            "ffmpeg transcoder cannot read '{other}'"
        ))),
    }
}

fn speed_args(
    src: &Path,
    out: &Path,
    ext: &str,
    video_filter: &str,
    audio_filter: Option<&str>,
) -> Vec<String> {
    let mut args = vec!["-i".to_owned(), path_arg(src), "-filter:v".into(), video_filter.into()];
    match audio_filter {
        Some(af) => args.extend(["-filter:a".into(), af.to_owned()]),
        None => args.push("-an".into()),
    }
    let codecs: &[&str] = match ext {
        "webm" => &["-c:v", "libvpx-vp9", "-deadline", "realtime", "-c:a", "libopus"],
        _ => &["-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p", "-c:a", "aac"],
    };
    args.extend(codecs.iter().map(|s| (*s).to_owned()));
    args.push(path_arg(out));
    args
}

/// `atempo` only accepts factors in `[0.5, 2.0]`; larger changes are chained.
pub fn atempo_chain(speed: f32) -> String {
    let mut s = f64::from(speed);
    let mut parts = Vec::new();
    while s > 2.0 {
        parts.push("atempo=2.0".to_owned());
        s /= 2.0;
    }
    while s < 0.5 {
        parts.push("atempo=0.5".to_owned());
        s /= 0.5;
    }
    parts.push(format!("atempo={}", (s * 1e6).round() / 1e6));
    parts.join(",")
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Both are microseconds despite the name.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => self.complete = value == "end",
            _ => {}
        }
    }

    fn percent(&self, expected_secs: f64) -> f32 {
        if self.complete {
            return 100.0;
        }
        if expected_secs <= 0.0 {
            return 0.0;
        }
        ((self.out_time_secs / expected_secs).clamp(0.0, 1.0) * 100.0) as f32
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transcode/ffmpeg.rs"]
mod tests;
