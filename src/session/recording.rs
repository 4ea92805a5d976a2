use std::sync::Arc;
use std::time::Duration;

use crate::capture::FrameView;
use crate::encode::{
    EncodedMedia, Encoder, EncoderBackend, EncoderConfig, start_encoder_with_fallback,
};
use crate::foundation::clock::Clock;
use crate::foundation::error::ReelResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Seconds left before recording starts.
    CountingDown(u32),
    Recording,
    Paused,
    /// A combination job is in flight; `start` is refused.
    Combining,
    Preview,
}

/// Frame source an encoder is bound to for one take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderBinding {
    /// Frames straight from the capture source.
    Raw,
    /// The compositor's filtered, overlaid output.
    Composited,
}

impl EncoderBinding {
    pub fn select(filter_active: bool, effect_active: bool) -> Self {
        if filter_active || effect_active {
            Self::Composited
        } else {
            Self::Raw
        }
    }
}

/// Parameters of one take, fixed at `start`.
#[derive(Clone, Debug)]
pub struct TakeRequest {
    /// Remaining recordable seconds at start time.
    pub budget_secs: i64,
    pub countdown_secs: u32,
    pub binding: EncoderBinding,
    pub encoder: EncoderConfig,
}

/// Output of a stopped take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedTake {
    pub media: EncodedMedia,
    pub duration_secs: u32,
    pub binding: EncoderBinding,
    /// Stopped by budget exhaustion rather than by the user.
    pub auto_stopped: bool,
}

struct ActiveTake {
    encoder: Box<dyn Encoder>,
    buffered: Vec<u8>,
    binding: EncoderBinding,
    budget_secs: u32,
    active: Duration,
    resumed_at: Option<Duration>,
}

impl ActiveTake {
    fn active_time(&self, now: Duration) -> Duration {
        self.active + self.resumed_at.map_or(Duration::ZERO, |t| now.saturating_sub(t))
    }

    fn budget_spent(&self, now: Duration) -> bool {
        self.active_time(now) >= Duration::from_secs(u64::from(self.budget_secs))
    }

    fn drain(&mut self) {
        while let Some(chunk) = self.encoder.poll_chunk() {
            self.buffered.extend(chunk);
        }
    }
}

/// Start/pause/resume/stop state machine driving one encoder per take under a duration budget.
pub struct RecordingSession {
    state: SessionState,
    clock: Arc<dyn Clock>,
    backend: Box<dyn EncoderBackend>,
    pending: Option<TakeRequest>,
    take: Option<ActiveTake>,
}

impl RecordingSession {
    pub fn new(backend: Box<dyn EncoderBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: SessionState::Idle,
            clock,
            backend,
            pending: None,
            take: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, SessionState::Recording | SessionState::Paused)
    }

    /// Binding of the current take.
    pub fn binding(&self) -> Option<EncoderBinding> {
        self.take
            .as_ref()
            .map(|t| t.binding)
            .or(self.pending.as_ref().map(|p| p.binding))
    }

    /// Whole seconds of active (unpaused) recording in the current take.
    pub fn elapsed_secs(&self) -> u32 {
        self.take.as_ref().map_or(0, |t| {
            u32::try_from(t.active_time(self.clock.now()).as_secs()).unwrap_or(u32::MAX)
        })
    }

    pub fn budget_secs(&self) -> Option<u32> {
        self.take.as_ref().map(|t| t.budget_secs)
    }

    pub fn encoder_mime(&self) -> Option<&str> {
        self.take.as_ref().map(|t| t.encoder.mime())
    }

    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            tracing::debug!(from = ?self.state, to = ?to, "session transition");
            self.state = to;
        }
    }

    /// Begin a take. Returns `false` without side effects when not idle or the budget is spent.
    pub fn start(&mut self, req: TakeRequest) -> ReelResult<bool> {
        if self.state != SessionState::Idle {
            tracing::debug!(state = ?self.state, "start ignored: session busy");
            return Ok(false);
        }
        if req.budget_secs <= 0 {
            tracing::debug!(budget_secs = req.budget_secs, "start ignored: budget exhausted");
            return Ok(false);
        }
        if req.countdown_secs > 0 {
            let n = req.countdown_secs;
            self.pending = Some(req);
            self.transition(SessionState::CountingDown(n));
            return Ok(true);
        }
        self.begin(req)?;
        Ok(true)
    }

    fn begin(&mut self, req: TakeRequest) -> ReelResult<()> {
        let encoder = start_encoder_with_fallback(self.backend.as_mut(), &req.encoder)?;
        let budget_secs = u32::try_from(req.budget_secs).unwrap_or(u32::MAX);
        tracing::info!(
            binding = ?req.binding,
            budget_secs,
            mime = encoder.mime(),
            "recording started"
        );
        self.take = Some(ActiveTake {
            encoder,
            buffered: Vec::new(),
            binding: req.binding,
            budget_secs,
            active: Duration::ZERO,
            resumed_at: Some(self.clock.now()),
        });
        self.transition(SessionState::Recording);
        Ok(())
    }

    /// Advance the countdown or check the take against its budget.
    ///
    /// The budget is checked against the take's clock-measured active time, not a count of
    /// ticks. Returns the finished take when the budget forced a stop.
    pub fn tick_second(&mut self) -> ReelResult<Option<FinishedTake>> {
        match self.state {
            SessionState::CountingDown(n) if n > 1 => {
                self.transition(SessionState::CountingDown(n - 1));
                Ok(None)
            }
            SessionState::CountingDown(_) => {
                let Some(req) = self.pending.take() else {
                    self.transition(SessionState::Idle);
                    return Ok(None);
                };
                if let Err(err) = self.begin(req) {
                    self.transition(SessionState::Idle);
                    return Err(err);
                }
                Ok(None)
            }
            SessionState::Recording => {
                let now = self.clock.now();
                let Some(take) = self.take.as_ref() else {
                    return Ok(None);
                };
                if take.budget_spent(now) {
                    tracing::info!(
                        active_ms = take.active_time(now).as_millis() as u64,
                        budget_secs = take.budget_secs,
                        "budget reached, stopping"
                    );
                    return self.finish(true);
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Feed one frame. Ignored unless recording, and once the take's budget is spent.
    pub fn push_frame(&mut self, frame: FrameView<'_>) -> ReelResult<()> {
        if self.state != SessionState::Recording {
            return Ok(());
        }
        let now = self.clock.now();
        let Some(take) = self.take.as_mut() else {
            return Ok(());
        };
        if take.budget_spent(now) {
            return Ok(());
        }
        take.encoder.push_frame(frame)?;
        take.drain();
        Ok(())
    }

    /// Feed interleaved audio samples. Ignored unless recording, and once the budget is spent.
    pub fn push_audio(&mut self, samples: &[f32]) -> ReelResult<()> {
        if self.state != SessionState::Recording || samples.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        let Some(take) = self.take.as_mut() else {
            return Ok(());
        };
        if take.budget_spent(now) {
            return Ok(());
        }
        take.encoder.push_audio(samples)?;
        take.drain();
        Ok(())
    }

    pub fn pause(&mut self) -> ReelResult<bool> {
        if self.state != SessionState::Recording {
            return Ok(false);
        }
        let now = self.clock.now();
        if let Some(take) = self.take.as_mut() {
            take.encoder.pause()?;
            take.drain();
            take.active = take.active_time(now);
            take.resumed_at = None;
        }
        self.transition(SessionState::Paused);
        Ok(true)
    }

    pub fn resume(&mut self) -> ReelResult<bool> {
        if self.state != SessionState::Paused {
            return Ok(false);
        }
        let now = self.clock.now();
        if let Some(take) = self.take.as_mut() {
            take.encoder.resume()?;
            take.resumed_at = Some(now);
        }
        self.transition(SessionState::Recording);
        Ok(true)
    }

    /// Stop the take. Whatever was encoded so far becomes the result.
    ///
    /// During a countdown this just cancels back to idle.
    pub fn stop(&mut self) -> ReelResult<Option<FinishedTake>> {
        match self.state {
            SessionState::CountingDown(_) => {
                self.pending = None;
                self.transition(SessionState::Idle);
                Ok(None)
            }
            SessionState::Recording | SessionState::Paused => self.finish(false),
            _ => Ok(None),
        }
    }

    fn finish(&mut self, auto_stopped: bool) -> ReelResult<Option<FinishedTake>> {
        self.transition(SessionState::Idle);
        let Some(mut take) = self.take.take() else {
            return Ok(None);
        };
        take.drain();
        let active = take.active_time(self.clock.now());
        let measured = active.as_secs_f64().round() as u32;
        let duration_secs = measured.min(take.budget_secs);
        let media = take.encoder.finish(take.buffered)?;
        tracing::info!(
            duration_secs,
            bytes = media.bytes.len(),
            auto_stopped,
            "recording stopped"
        );
        Ok(Some(FinishedTake {
            media,
            duration_secs,
            binding: take.binding,
            auto_stopped,
        }))
    }

    /// Idle -> Combining. `false` if any other state.
    pub fn begin_combining(&mut self) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }
        self.transition(SessionState::Combining);
        true
    }

    /// Combining -> Preview.
    pub fn enter_preview(&mut self) -> bool {
        if self.state != SessionState::Combining {
            return false;
        }
        self.transition(SessionState::Preview);
        true
    }

    /// Combining or Preview -> Idle.
    pub fn leave_preview(&mut self) -> bool {
        if !matches!(self.state, SessionState::Combining | SessionState::Preview) {
            return false;
        }
        self.transition(SessionState::Idle);
        true
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("state", &self.state)
            .field("backend", &self.backend.name())
            .field("elapsed_secs", &self.elapsed_secs())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/recording.rs"]
mod tests;
