//! The camera pipeline as one object.
//!
//! [`Camera`] owns the capture source, compositor, particle simulator, recording session, clip
//! accumulator and template sequencer. It is driven by two tick loops: [`Camera::render_tick`]
//! once per frame and [`Camera::second_tick`] once per wall-clock second. [`Camera::attach`]
//! subscribes both to [`TickSource`]s.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureSource, Frame};
use crate::config::CameraConfig;
use crate::effects::{EffectKind, ParticleSimulator};
use crate::encode::{EncoderBackend, EncoderConfig};
use crate::foundation::clock::Clock;
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::compositor::FrameCompositor;
use crate::render::filter::FilterDescriptor;
use crate::schedule::{CancelHandle, TickSource};
use crate::session::{
    Artifact, ClipAccumulator, ClipId, CombineJob, CombineOutcome, EncoderBinding, FinishedTake,
    RecordingSession, SequencerState, SessionState, TakeRequest, Template, TemplateSequencer,
    run_combine,
};
use crate::transcode::{MediaBuffer, SharedTranscoder, Transcoder};

/// Where a finished take ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoredTake {
    Clip(ClipId),
    /// Recorded into this template slot.
    Slot(usize),
    /// The accumulator was full.
    Dropped,
}

/// Shared `0..=100` progress of the in-flight combination.
#[derive(Clone, Debug, Default)]
pub struct ProgressCell(Arc<AtomicU32>);

impl ProgressCell {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, percent: f32) {
        self.0
            .store(percent.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }
}

/// Detached combination work; `Send`, so it can run on any runtime worker.
#[derive(Debug)]
pub struct CombineRequest {
    pub job: CombineJob,
    pub cancel: CancellationToken,
    pub progress: ProgressCell,
}

impl CombineRequest {
    pub async fn run<T: Transcoder>(
        self,
        engine: &SharedTranscoder<T>,
    ) -> ReelResult<CombineOutcome> {
        let progress = self.progress.clone();
        run_combine(engine, self.job, &move |p| progress.set(p), &self.cancel).await
    }
}

/// Tick subscriptions created by [`Camera::attach`].
#[derive(Debug)]
pub struct Attachment {
    pub frames: CancelHandle,
    pub seconds: CancelHandle,
}

impl Attachment {
    pub fn detach(&self) {
        self.frames.cancel();
        self.seconds.cancel();
    }
}

pub struct Camera {
    config: CameraConfig,
    capture: Box<dyn CaptureSource>,
    compositor: FrameCompositor,
    particles: ParticleSimulator,
    session: RecordingSession,
    clips: ClipAccumulator,
    sequencer: TemplateSequencer,
    template_mode: bool,
    template_mime: Option<String>,
    max_duration_secs: u32,
    speed: f32,
    countdown_secs: u32,
    preview_enabled: bool,
    audio: Vec<f32>,
    progress: ProgressCell,
    combine_cancel: Option<CancellationToken>,
    last_error: Option<ReelError>,
}

impl Camera {
    pub fn new(
        config: CameraConfig,
        capture: Box<dyn CaptureSource>,
        backend: Box<dyn EncoderBackend>,
        clock: Arc<dyn Clock>,
    ) -> ReelResult<Self> {
        config.validate()?;
        let particles = ParticleSimulator::new(capture.canvas(), config.particle_cap);
        let mut cam = Self {
            compositor: FrameCompositor::new(FilterDescriptor::identity())?,
            particles,
            session: RecordingSession::new(backend, clock),
            clips: ClipAccumulator::new(config.max_clips),
            sequencer: TemplateSequencer::new(),
            template_mode: false,
            template_mime: None,
            max_duration_secs: config.max_duration_secs,
            speed: 1.0,
            countdown_secs: 0,
            preview_enabled: false,
            audio: Vec::new(),
            progress: ProgressCell::default(),
            combine_cancel: None,
            last_error: None,
            capture,
            config,
        };
        cam.start_preview();
        Ok(cam)
    }

    /// Replace the particle simulator, e.g. with a seeded one.
    pub fn with_particles(mut self, particles: ParticleSimulator) -> Self {
        self.particles = particles;
        self
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn clips(&self) -> &ClipAccumulator {
        &self.clips
    }

    pub fn compositor(&self) -> &FrameCompositor {
        &self.compositor
    }

    pub fn particles(&self) -> &ParticleSimulator {
        &self.particles
    }

    pub fn capture(&self) -> &dyn CaptureSource {
        self.capture.as_ref()
    }

    pub fn sequencer(&self) -> &TemplateSequencer {
        &self.sequencer
    }

    /// Run the compositor and particle loops for live preview.
    pub fn start_preview(&mut self) {
        self.preview_enabled = true;
        self.compositor.start();
        self.particles.start();
    }

    pub fn stop_preview(&mut self) {
        self.preview_enabled = false;
        if !self.session.is_capturing() {
            self.compositor.stop();
            self.particles.stop();
        }
    }

    // ---- per-tick loops ----

    /// One render iteration: step particles, composite, feed the encoder.
    ///
    /// A capture failure while recording finalizes the take before the error is returned.
    pub fn render_tick(&mut self) -> ReelResult<()> {
        let frame = match self.capture.frame() {
            Ok(f) => f,
            Err(err) => {
                if self.session.is_capturing() {
                    tracing::warn!(error = %err, "capture lost while recording, stopping take");
                    if let Err(finish_err) = self.stop_recording() {
                        tracing::warn!(error = %finish_err, "finalizing take after capture loss failed");
                    }
                }
                return Err(err);
            }
        };

        self.particles.resize(frame.canvas());
        self.particles.tick();
        let overlay = self.particles.is_active().then(|| self.particles.overlay());
        self.compositor.tick(&frame, overlay)?;

        self.audio.clear();
        self.capture.read_audio(&mut self.audio);
        if self.session.state() == SessionState::Recording {
            self.push_to_session(&frame)?;
        }
        Ok(())
    }

    fn push_to_session(&mut self, frame: &Frame) -> ReelResult<()> {
        match (self.session.binding(), self.compositor.output()) {
            (Some(EncoderBinding::Composited), Some(view)) => self.session.push_frame(view)?,
            _ => self.session.push_frame(frame.view())?,
        }
        self.session.push_audio(&self.audio)
    }

    /// One wall-clock second: countdown, budget check, template slot timer.
    pub fn second_tick(&mut self) -> ReelResult<Option<StoredTake>> {
        match self.session.tick_second() {
            Ok(Some(take)) => Ok(Some(self.accept_take(take))),
            Ok(None) => {
                if self.template_mode
                    && let Some(budget) = self.session.budget_secs()
                {
                    let left = budget.saturating_sub(self.session.elapsed_secs());
                    self.sequencer.sync_remaining(left);
                }
                Ok(None)
            }
            Err(err) => {
                if self.template_mode {
                    self.sequencer.cancel_slot_recording();
                }
                Err(err)
            }
        }
    }

    /// Subscribe `camera` to a per-frame and a per-second tick source.
    ///
    /// Callbacks hold a weak reference; dropping the camera turns them into no-ops. Errors from
    /// ticks are kept for [`Camera::take_last_error`].
    pub fn attach(
        camera: &Rc<RefCell<Camera>>,
        frames: &dyn TickSource,
        seconds: &dyn TickSource,
    ) -> Attachment {
        let weak: Weak<RefCell<Camera>> = Rc::downgrade(camera);
        let frames = frames.subscribe(Box::new(move |_tick| {
            let Some(cam) = weak.upgrade() else { return };
            let Ok(mut cam) = cam.try_borrow_mut() else { return };
            if let Err(err) = cam.render_tick() {
                cam.last_error = Some(err);
            }
        }));
        let weak = Rc::downgrade(camera);
        let seconds = seconds.subscribe(Box::new(move |_tick| {
            let Some(cam) = weak.upgrade() else { return };
            let Ok(mut cam) = cam.try_borrow_mut() else { return };
            if let Err(err) = cam.second_tick() {
                cam.last_error = Some(err);
            }
        }));
        Attachment { frames, seconds }
    }

    pub fn take_last_error(&mut self) -> Option<ReelError> {
        self.last_error.take()
    }

    // ---- recording ----

    pub fn can_add_more_clips(&self) -> bool {
        self.clips.can_add_more_clips()
    }

    pub fn remaining_budget(&self) -> i64 {
        self.clips.remaining_budget(self.max_duration_secs)
    }

    pub fn max_duration_secs(&self) -> u32 {
        self.max_duration_secs
    }

    /// Start a take (after the configured countdown). `false` when not allowed right now.
    pub fn start_recording(&mut self) -> ReelResult<bool> {
        if self.session.state() != SessionState::Idle {
            return Ok(false);
        }
        let budget_secs = if self.template_mode {
            if self.sequencer.state() != SequencerState::Ready {
                return Ok(false);
            }
            match self.sequencer.current_slot() {
                Some(slot) => i64::from(slot.duration_secs),
                None => return Ok(false),
            }
        } else {
            if !self.clips.can_add_more_clips() {
                tracing::debug!("start ignored: clip limit reached");
                return Ok(false);
            }
            self.remaining_budget()
        };

        let binding = EncoderBinding::select(
            !self.compositor.filter().is_identity(),
            self.particles.is_active(),
        );
        if binding == EncoderBinding::Composited {
            self.compositor.start();
            self.particles.start();
        }
        let req = TakeRequest {
            budget_secs,
            countdown_secs: self.countdown_secs,
            binding,
            encoder: EncoderConfig {
                mime: self.config.encoder_mime.clone(),
                canvas: self.capture.canvas(),
                fps: self.config.fps,
                audio: self.capture.audio_track(),
                chunk_frames: self.config.encoder_chunk_frames,
            },
        };
        let started = self.session.start(req)?;
        if started && self.template_mode {
            self.sequencer.start_slot_recording();
        }
        Ok(started)
    }

    pub fn pause(&mut self) -> ReelResult<bool> {
        self.session.pause()
    }

    pub fn resume(&mut self) -> ReelResult<bool> {
        self.session.resume()
    }

    /// Stop the current take and store it.
    pub fn stop_recording(&mut self) -> ReelResult<Option<StoredTake>> {
        match self.session.stop() {
            Ok(Some(take)) => Ok(Some(self.accept_take(take))),
            Ok(None) => {
                if self.template_mode {
                    self.sequencer.cancel_slot_recording();
                }
                Ok(None)
            }
            Err(err) => {
                if self.template_mode {
                    self.sequencer.cancel_slot_recording();
                }
                Err(err)
            }
        }
    }

    fn accept_take(&mut self, take: FinishedTake) -> StoredTake {
        if take.binding == EncoderBinding::Composited {
            self.compositor.stop();
            self.particles.stop();
            if self.preview_enabled {
                self.compositor.start();
                self.particles.start();
            }
        }
        if self.template_mode {
            let index = self.sequencer.current_index();
            self.template_mime = Some(take.media.mime.clone());
            if self.sequencer.complete_slot_recording(take.media.bytes) {
                return StoredTake::Slot(index);
            }
            return StoredTake::Dropped;
        }
        match self
            .clips
            .add(take.media.bytes, take.media.mime, take.duration_secs)
        {
            Some(id) => StoredTake::Clip(id),
            None => StoredTake::Dropped,
        }
    }

    /// Pop the latest clip. Refused while a take or combination is running.
    pub fn remove_last_clip(&mut self) -> bool {
        if self.session.state() != SessionState::Idle {
            return false;
        }
        self.clips.remove_last().is_some()
    }

    /// Drop every clip and the preview.
    pub fn discard_all(&mut self) -> bool {
        match self.session.state() {
            SessionState::Idle => {}
            SessionState::Preview => {
                self.session.leave_preview();
            }
            _ => return false,
        }
        self.clips.discard_all();
        true
    }

    // ---- settings ----

    /// Select a filter by preset name or CSS filter string.
    pub fn set_filter(&mut self, value: &str) -> ReelResult<()> {
        let filter = FilterDescriptor::from_name_or_css(value)?;
        self.compositor.set_filter(filter)
    }

    pub fn set_effect(&mut self, effect: EffectKind) {
        self.particles.set_effect(effect);
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) -> bool {
        if !self.config.allows_speed(speed) {
            return false;
        }
        self.speed = speed;
        true
    }

    pub fn countdown_secs(&self) -> u32 {
        self.countdown_secs
    }

    pub fn set_countdown(&mut self, secs: u32) -> bool {
        if !self.config.allows_countdown(secs) {
            return false;
        }
        self.countdown_secs = secs;
        true
    }

    /// Only while nothing is recorded yet.
    pub fn set_max_duration(&mut self, secs: u32) -> bool {
        if !self.config.allows_duration(secs)
            || !self.clips.is_empty()
            || self.session.state() != SessionState::Idle
        {
            return false;
        }
        self.max_duration_secs = secs;
        true
    }

    // ---- camera controls ----

    /// Switch front/back. Refused mid-take since the frame size may change.
    pub fn flip_facing(&mut self) -> ReelResult<bool> {
        if self.session.is_capturing() {
            return Ok(false);
        }
        let next = self.capture.facing().flipped();
        self.capture.set_facing(next)?;
        Ok(true)
    }

    pub fn set_torch(&mut self, on: bool) -> ReelResult<()> {
        self.capture.set_torch(on)
    }

    pub fn set_zoom(&mut self, level: f32) -> ReelResult<()> {
        self.capture.set_zoom(level)
    }

    // ---- template mode ----

    pub fn is_template_mode(&self) -> bool {
        self.template_mode
    }

    /// Enter template mode with `template`. Only while idle with no free-form clips.
    pub fn enter_template_mode(&mut self, template: Template) -> ReelResult<bool> {
        if self.session.state() != SessionState::Idle || !self.clips.is_empty() {
            return Ok(false);
        }
        self.sequencer.select_template(template)?;
        self.template_mode = true;
        Ok(true)
    }

    pub fn exit_template_mode(&mut self) -> bool {
        if self.session.state() != SessionState::Idle {
            return false;
        }
        self.sequencer.clear();
        self.template_mode = false;
        self.template_mime = None;
        true
    }

    pub fn advance_template_slot(&mut self) -> bool {
        self.template_mode && self.sequencer.advance_to_next_slot()
    }

    pub fn retake_template_slot(&mut self) -> bool {
        self.template_mode
            && self.session.state() == SessionState::Idle
            && self.sequencer.retake_current_slot()
    }

    /// Go back to an earlier slot and clear it.
    pub fn retake_template_slot_at(&mut self, index: usize) -> bool {
        self.template_mode
            && self.session.state() == SessionState::Idle
            && self.sequencer.select_slot_for_retake(index)
    }

    // ---- combination ----

    pub fn combine_progress(&self) -> f32 {
        self.progress.get()
    }

    pub fn is_combining(&self) -> bool {
        self.session.state() == SessionState::Combining
    }

    /// Move to `Combining` and hand out the work. `None` if idle preconditions fail.
    pub fn begin_combine(&mut self) -> Option<CombineRequest> {
        let clips = self.combine_inputs()?;
        if !self.session.begin_combining() {
            return None;
        }
        let cancel = CancellationToken::new();
        self.combine_cancel = Some(cancel.clone());
        self.progress.set(0.0);
        tracing::info!(clips = clips.len(), speed = self.speed, "combination started");
        Some(CombineRequest {
            job: CombineJob {
                clips,
                speed: self.speed,
            },
            cancel,
            progress: self.progress.clone(),
        })
    }

    fn combine_inputs(&self) -> Option<Vec<MediaBuffer>> {
        if self.template_mode {
            if self.sequencer.state() != SequencerState::AllComplete {
                return None;
            }
            let template = self.sequencer.template()?;
            let mime = self.template_mime.clone()?;
            let blobs = self.sequencer.recorded_blobs()?;
            return Some(
                blobs
                    .into_iter()
                    .zip(&template.slots)
                    .map(|(bytes, slot)| MediaBuffer {
                        bytes,
                        mime: mime.clone(),
                        duration_secs: f64::from(slot.duration_secs),
                    })
                    .collect(),
            );
        }
        if self.clips.is_empty() {
            return None;
        }
        self.clips
            .clips()
            .iter()
            .map(|c| {
                Some(MediaBuffer {
                    bytes: self.clips.clip_bytes(c.id)?,
                    mime: c.mime.clone(),
                    duration_secs: f64::from(c.duration_secs),
                })
            })
            .collect()
    }

    /// Apply a combination result. Cancellation and errors return to `Idle` with clips kept.
    pub fn finish_combine(
        &mut self,
        result: ReelResult<CombineOutcome>,
    ) -> ReelResult<Option<&Artifact>> {
        self.combine_cancel = None;
        if self.session.state() != SessionState::Combining {
            tracing::debug!(state = ?self.session.state(), "stale combination result ignored");
            return Ok(None);
        }
        let outcome = match result {
            Ok(o) => o,
            Err(err) => {
                self.session.leave_preview();
                return Err(err);
            }
        };
        let degraded = outcome.is_degraded();
        let Some(media) = outcome.media().cloned() else {
            self.session.leave_preview();
            return Ok(None);
        };
        self.progress.set(100.0);
        self.session.enter_preview();
        Ok(Some(self.clips.set_preview(media.bytes, media.mime, degraded)))
    }

    /// Begin, run and finish a combination in one call.
    pub async fn combine<T: Transcoder>(
        &mut self,
        engine: &SharedTranscoder<T>,
    ) -> ReelResult<Option<&Artifact>> {
        let Some(req) = self.begin_combine() else {
            return Ok(None);
        };
        let result = req.run(engine).await;
        self.finish_combine(result)
    }

    /// Cancel an in-flight combination. The result will arrive as `Cancelled`.
    pub fn cancel_combine(&mut self) -> bool {
        match &self.combine_cancel {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn preview(&self) -> Option<&Artifact> {
        self.clips.preview()
    }

    pub fn preview_bytes(&self) -> Option<Arc<[u8]>> {
        self.clips.preview_bytes()
    }

    pub fn preview_mime(&self) -> Option<&str> {
        self.clips.preview().map(|a| a.mime.as_str())
    }

    pub fn preview_size(&self) -> Option<usize> {
        self.clips.preview().map(|a| a.byte_len)
    }

    /// Release the preview and return to `Idle`; clips stay for another attempt.
    pub fn discard_preview(&mut self) -> bool {
        match self.session.state() {
            SessionState::Preview => {
                self.clips.discard_preview();
                self.session.leave_preview();
                true
            }
            SessionState::Combining => self.cancel_combine(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/camera.rs"]
mod tests;
