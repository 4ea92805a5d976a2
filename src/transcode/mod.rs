//! Transcoding engine boundary.
//!
//! Engines are asynchronous and may need a warm-up step; [`SharedTranscoder`] wraps one in a
//! lazily-initialised, cloneable context instead of a global.

/// System `ffmpeg` engine.
pub mod ffmpeg;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::OnceCell;

use crate::foundation::error::ReelResult;

/// Progress callback receiving a percentage in `0.0..=100.0`.
pub type Progress<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// Forwards progress to an inner callback without ever reporting a lower value than before.
///
/// Used when one logical step runs several engine attempts against the same callback.
pub struct MonotonicProgress<'a> {
    inner: Progress<'a>,
    high: AtomicU32,
}

impl<'a> MonotonicProgress<'a> {
    pub fn new(inner: Progress<'a>) -> Self {
        Self {
            inner,
            high: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    pub fn report(&self, percent: f32) {
        if !percent.is_finite() {
            return;
        }
        let prev = self
            .high
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                (percent > f32::from_bits(bits)).then_some(percent.to_bits())
            });
        let value = match prev {
            Ok(_) => percent,
            Err(bits) => f32::from_bits(bits),
        };
        (self.inner)(value);
    }

    /// Highest value reported so far.
    pub fn high_water(&self) -> f32 {
        f32::from_bits(self.high.load(Ordering::Relaxed))
    }
}

/// Encoded media moving through the combination pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaBuffer {
    pub bytes: Arc<[u8]>,
    pub mime: String,
    /// Presentation duration, used for progress estimation.
    pub duration_secs: f64,
}

impl MediaBuffer {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
            duration_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub trait Transcoder: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// One-time warm-up. Called at most once per [`SharedTranscoder`].
    fn load(&self) -> impl Future<Output = ReelResult<()>> + Send;

    /// Join `inputs` in order into one buffer.
    fn concatenate(
        &self,
        inputs: &[MediaBuffer],
        progress: Progress<'_>,
    ) -> impl Future<Output = ReelResult<MediaBuffer>> + Send;

    /// Retime `input` by `speed` (`2.0` plays twice as fast).
    fn change_speed(
        &self,
        input: &MediaBuffer,
        speed: f32,
        progress: Progress<'_>,
    ) -> impl Future<Output = ReelResult<MediaBuffer>> + Send;
}

/// Shared handle to one engine whose `load` runs lazily, once, on first use or via
/// [`Self::preload`].
#[derive(Debug)]
pub struct SharedTranscoder<T> {
    engine: Arc<T>,
    loaded: Arc<OnceCell<()>>,
}

impl<T> Clone for SharedTranscoder<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            loaded: self.loaded.clone(),
        }
    }
}

impl<T: Transcoder> SharedTranscoder<T> {
    pub fn new(engine: T) -> Self {
        Self {
            engine: Arc::new(engine),
            loaded: Arc::new(OnceCell::new()),
        }
    }

    pub fn engine(&self) -> &T {
        &self.engine
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Load the engine if needed. A failed load is retried on the next call.
    pub async fn ready(&self) -> ReelResult<&T> {
        self.loaded
            .get_or_try_init(|| async {
                tracing::debug!(engine = self.engine.name(), "loading transcoder");
                self.engine.load().await
            })
            .await?;
        Ok(&self.engine)
    }

    /// Warm the engine in the background. Requires a tokio runtime.
    pub fn preload(&self) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.ready().await {
                tracing::warn!(engine = this.engine.name(), error = %err, "transcoder preload failed");
            }
        })
    }
}

/// Engine that only accepts work that needs no transcoding: single-input concatenation and
/// 1x speed. Anything else fails, which the combination pipeline turns into its fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughTranscoder;

impl Transcoder for PassthroughTranscoder {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn load(&self) -> ReelResult<()> {
        Ok(())
    }

    async fn concatenate(
        &self,
        inputs: &[MediaBuffer],
        progress: Progress<'_>,
    ) -> ReelResult<MediaBuffer> {
        match inputs {
            [single] => {
                progress(100.0);
                Ok(single.clone())
            }
            _ => Err(crate::foundation::error::ReelError::transcode(format!(
                "passthrough engine cannot join {} inputs",
                inputs.len()
            ))),
        }
    }

    async fn change_speed(
        &self,
        input: &MediaBuffer,
        speed: f32,
        progress: Progress<'_>,
    ) -> ReelResult<MediaBuffer> {
        if (speed - 1.0).abs() > f32::EPSILON {
            return Err(crate::foundation::error::ReelError::transcode(format!(
                "passthrough engine cannot retime to {speed}x"
            )));
        }
        progress(100.0);
        Ok(input.clone())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transcode/mod.rs"]
mod tests;
