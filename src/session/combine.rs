use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::foundation::error::{ReelError, ReelResult};
use crate::transcode::{MediaBuffer, Progress, SharedTranscoder, Transcoder};

/// Share of total progress spent on concatenation when a speed change follows.
const CONCAT_SHARE: f32 = 60.0;

/// Clips in recording order plus the global speed multiplier.
#[derive(Clone, Debug)]
pub struct CombineJob {
    pub clips: Vec<MediaBuffer>,
    pub speed: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CombineOutcome {
    /// One clip at 1x; no engine call was made.
    Passthrough(MediaBuffer),
    Combined(MediaBuffer),
    /// The engine failed; this is the first clip, untouched.
    Fallback { media: MediaBuffer, reason: String },
    Cancelled,
}

impl CombineOutcome {
    pub fn media(&self) -> Option<&MediaBuffer> {
        match self {
            Self::Passthrough(m) | Self::Combined(m) | Self::Fallback { media: m, .. } => Some(m),
            Self::Cancelled => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

pub fn is_unit_speed(speed: f32) -> bool {
    (speed - 1.0).abs() < 1e-6
}

/// Concatenate and retime `job.clips` with `engine`.
///
/// Transcoding failures degrade to the first clip; only an empty job is an error.
pub async fn run_combine<T: Transcoder>(
    engine: &SharedTranscoder<T>,
    job: CombineJob,
    progress: Progress<'_>,
    cancel: &CancellationToken,
) -> ReelResult<CombineOutcome> {
    let Some(first) = job.clips.first().cloned() else {
        return Err(ReelError::validation("no clips to combine"));
    };
    let needs_concat = job.clips.len() > 1;
    let needs_speed = !is_unit_speed(job.speed);
    progress(0.0);

    if !needs_concat && !needs_speed {
        progress(100.0);
        return Ok(CombineOutcome::Passthrough(first));
    }

    let result = transcode(engine, &job, needs_concat, needs_speed, progress, cancel).await;
    match result {
        Ok(Some(media)) => {
            progress(100.0);
            tracing::info!(
                clips = job.clips.len(),
                speed = job.speed,
                bytes = media.len(),
                "clips combined"
            );
            Ok(CombineOutcome::Combined(media))
        }
        Ok(None) => {
            tracing::info!("combination cancelled");
            Ok(CombineOutcome::Cancelled)
        }
        Err(err) => {
            tracing::warn!(
                engine = engine.engine().name(),
                clips = job.clips.len(),
                speed = job.speed,
                error = %err,
                "combination failed, falling back to first clip"
            );
            progress(100.0);
            Ok(CombineOutcome::Fallback {
                media: first,
                reason: err.to_string(),
            })
        }
    }
}

/// `Ok(None)` on cancellation.
async fn transcode<T: Transcoder>(
    engine: &SharedTranscoder<T>,
    job: &CombineJob,
    needs_concat: bool,
    needs_speed: bool,
    progress: Progress<'_>,
    cancel: &CancellationToken,
) -> ReelResult<Option<MediaBuffer>> {
    let Some(t) = cancellable(cancel, engine.ready()).await? else {
        return Ok(None);
    };

    let mut media = job.clips[0].clone();
    if needs_concat {
        let scale = if needs_speed { CONCAT_SHARE } else { 100.0 };
        let scaled = |p: f32| progress(p.clamp(0.0, 100.0) * scale / 100.0);
        match cancellable(cancel, t.concatenate(&job.clips, &scaled)).await? {
            Some(m) => media = m,
            None => return Ok(None),
        }
    }
    if needs_speed {
        let base = if needs_concat { CONCAT_SHARE } else { 0.0 };
        let scaled = |p: f32| progress(base + p.clamp(0.0, 100.0) * (100.0 - base) / 100.0);
        match cancellable(cancel, t.change_speed(&media, job.speed, &scaled)).await? {
            Some(m) => media = m,
            None => return Ok(None),
        }
    }
    Ok(Some(media))
}

async fn cancellable<F, O>(cancel: &CancellationToken, fut: F) -> ReelResult<Option<O>>
where
    F: Future<Output = ReelResult<O>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        r = fut => r.map(Some),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/combine.rs"]
mod tests;
