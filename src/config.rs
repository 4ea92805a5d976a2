use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};

/// Camera pipeline settings. Every field has a default, so partial JSON is accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    pub max_duration_secs: u32,
    pub max_clips: usize,
    pub particle_cap: usize,
    pub fps: Fps,
    pub encoder_mime: Option<String>,
    pub encoder_chunk_frames: u32,
    pub countdown_options: Vec<u32>,
    pub speed_options: Vec<f32>,
    pub duration_options: Vec<u32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 180,
            max_clips: 8,
            particle_cap: 200,
            fps: Fps::default(),
            encoder_mime: Some("video/webm;codecs=vp9".to_owned()),
            encoder_chunk_frames: 30,
            countdown_options: vec![0, 3, 10],
            speed_options: vec![0.3, 0.5, 1.0, 2.0, 3.0],
            duration_options: vec![15, 60, 180],
        }
    }
}

impl CameraConfig {
    pub fn from_json_str(s: &str) -> ReelResult<Self> {
        let cfg: Self = serde_json::from_str(s).context("parse camera config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_path(path: &Path) -> ReelResult<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read camera config '{}'", path.display()))?;
        Self::from_json_str(&s)
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.max_duration_secs == 0 {
            return Err(ReelError::validation("max_duration_secs must be > 0"));
        }
        if self.max_clips == 0 {
            return Err(ReelError::validation("max_clips must be >= 1"));
        }
        if self.particle_cap == 0 {
            return Err(ReelError::validation("particle_cap must be >= 1"));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if self.encoder_chunk_frames == 0 {
            return Err(ReelError::validation("encoder_chunk_frames must be >= 1"));
        }
        if let Some(c) = self.countdown_options.iter().find(|&&c| c > 60) {
            return Err(ReelError::validation(format!(
                "countdown option {c}s exceeds 60s"
            )));
        }
        if self.speed_options.is_empty() {
            return Err(ReelError::validation("speed_options must not be empty"));
        }
        if let Some(s) = self
            .speed_options
            .iter()
            .find(|s| !s.is_finite() || **s <= 0.0)
        {
            return Err(ReelError::validation(format!("invalid speed option {s}")));
        }
        if self.duration_options.contains(&0) {
            return Err(ReelError::validation("duration options must be > 0"));
        }
        if !self.duration_options.is_empty()
            && !self.duration_options.contains(&self.max_duration_secs)
        {
            return Err(ReelError::validation(format!(
                "max_duration_secs {} is not one of the duration options",
                self.max_duration_secs
            )));
        }
        Ok(())
    }

    pub fn allows_speed(&self, speed: f32) -> bool {
        self.speed_options.iter().any(|s| (s - speed).abs() < 1e-6)
    }

    pub fn allows_countdown(&self, secs: u32) -> bool {
        self.countdown_options.contains(&secs)
    }

    pub fn allows_duration(&self, secs: u32) -> bool {
        self.duration_options.contains(&secs)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
