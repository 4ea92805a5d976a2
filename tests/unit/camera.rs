use super::*;
use crate::capture::{Facing, FrameView, TestPatternSource};
use crate::encode::{EncodedMedia, Encoder};
use std::cell::Cell;
use crate::encode::memory::{ChunkedMemoryBackend, RawSummary};
use crate::foundation::clock::ManualClock;
use crate::foundation::core::{Canvas, Fps};
use crate::schedule::ManualTickSource;
use crate::transcode::PassthroughTranscoder;
use std::time::Duration;

const FPS: u32 = 2;

fn camera() -> (Camera, ManualClock) {
    let clock = ManualClock::new();
    let cfg = CameraConfig {
        fps: Fps::new(FPS, 1).unwrap(),
        encoder_chunk_frames: 2,
        ..CameraConfig::default()
    };
    let source = TestPatternSource::new(Canvas::new(8, 4).unwrap(), cfg.fps);
    let cam = Camera::new(
        cfg,
        Box::new(source),
        Box::new(ChunkedMemoryBackend::new()),
        Arc::new(clock.clone()),
    )
    .unwrap()
    .with_particles(ParticleSimulator::with_seed(Canvas::new(8, 4).unwrap(), 200, 7));
    (cam, clock)
}

fn run_seconds(cam: &mut Camera, clock: &ManualClock, n: u32) -> Option<StoredTake> {
    for _ in 0..n {
        for _ in 0..FPS {
            cam.render_tick().unwrap();
        }
        clock.advance(Duration::from_secs(1));
        if let Some(t) = cam.second_tick().unwrap() {
            return Some(t);
        }
    }
    None
}

#[test]
fn raw_binding_without_filter_or_effect() {
    let (mut cam, clock) = camera();
    assert!(cam.start_recording().unwrap());
    assert_eq!(cam.session().binding(), Some(EncoderBinding::Raw));
    run_seconds(&mut cam, &clock, 3);
    let StoredTake::Clip(id) = cam.stop_recording().unwrap().unwrap() else {
        panic!("expected a clip");
    };
    assert_eq!(cam.clips().clips()[0].duration_secs, 3);
    let bytes = cam.clips().clip_bytes(id).unwrap();
    let summary = RawSummary::parse(&bytes).unwrap();
    assert_eq!(summary.frames, 6);
    assert_eq!((summary.width, summary.height), (8, 4));
    assert!(summary.audio_samples > 0);
}

#[test]
fn composited_binding_restarts_compositor_after_take() {
    let (mut cam, clock) = camera();
    cam.set_filter("noir").unwrap();
    cam.set_effect(EffectKind::Confetti);
    cam.start_recording().unwrap();
    assert_eq!(cam.session().binding(), Some(EncoderBinding::Composited));
    run_seconds(&mut cam, &clock, 2);
    let allocations = cam.compositor().stats().allocations;
    cam.stop_recording().unwrap();

    assert!(cam.compositor().is_live());
    assert!(cam.particles().is_live());
    assert!(cam.compositor().surface().is_none());
    cam.render_tick().unwrap();
    assert_eq!(cam.compositor().stats().allocations, allocations + 1);
}

#[test]
fn settings_accept_only_configured_options() {
    let (mut cam, clock) = camera();
    assert!(cam.set_speed(2.0));
    assert!(!cam.set_speed(1.7));
    assert_eq!(cam.speed(), 2.0);
    assert!(cam.set_countdown(3));
    assert!(!cam.set_countdown(4));
    assert!(cam.set_max_duration(60));
    assert!(!cam.set_max_duration(61));
    assert_eq!(cam.remaining_budget(), 60);

    cam.set_countdown(0);
    cam.start_recording().unwrap();
    run_seconds(&mut cam, &clock, 1);
    cam.stop_recording().unwrap();
    assert!(!cam.set_max_duration(180));
}

#[test]
fn countdown_delays_recording() {
    let (mut cam, clock) = camera();
    cam.set_countdown(3);
    cam.start_recording().unwrap();
    assert_eq!(cam.state(), SessionState::CountingDown(3));
    run_seconds(&mut cam, &clock, 3);
    assert_eq!(cam.state(), SessionState::Recording);
    run_seconds(&mut cam, &clock, 2);
    cam.stop_recording().unwrap();
    assert_eq!(cam.clips().total_duration(), 2);
}

#[test]
fn bad_filter_string_is_a_validation_error() {
    let (mut cam, _clock) = camera();
    assert!(matches!(
        cam.set_filter("wobble(3)"),
        Err(ReelError::Validation(_))
    ));
    assert!(cam.compositor().filter().is_identity());
}

#[test]
fn template_mode_caps_each_take_at_slot_duration() {
    let (mut cam, clock) = camera();
    assert!(
        cam.enter_template_mode(Template::preset("intro-body-outro").unwrap())
            .unwrap()
    );
    cam.start_recording().unwrap();
    assert_eq!(cam.session().budget_secs(), Some(3));
    assert_eq!(run_seconds(&mut cam, &clock, 10), Some(StoredTake::Slot(0)));
    assert_eq!(cam.sequencer().state(), SequencerState::SlotComplete);
    assert!(cam.clips().is_empty());

    assert!(!cam.start_recording().unwrap());
    assert!(cam.advance_template_slot());
    cam.start_recording().unwrap();
    assert_eq!(cam.session().budget_secs(), Some(10));
    run_seconds(&mut cam, &clock, 4);
    assert_eq!(
        cam.sequencer().state(),
        SequencerState::Recording { remaining_secs: 6 }
    );
    assert_eq!(cam.stop_recording().unwrap(), Some(StoredTake::Slot(1)));

    cam.advance_template_slot();
    cam.start_recording().unwrap();
    run_seconds(&mut cam, &clock, 10);
    assert_eq!(cam.sequencer().state(), SequencerState::AllComplete);
    assert_eq!(cam.sequencer().completed_slots(), 3);
}

#[test]
fn camera_controls_pass_through() {
    let (mut cam, clock) = camera();
    cam.start_recording().unwrap();
    run_seconds(&mut cam, &clock, 1);
    assert!(!cam.flip_facing().unwrap());
    assert_eq!(cam.capture().facing(), Facing::Front);
    assert!(cam.set_torch(true).is_err());

    cam.stop_recording().unwrap();
    assert!(cam.flip_facing().unwrap());
    assert_eq!(cam.capture().facing(), Facing::Back);
    cam.set_torch(true).unwrap();
    cam.set_zoom(2.0).unwrap();
    assert!(cam.set_zoom(20.0).is_err());
}

/// Pattern source whose availability is controlled from outside the camera.
struct FlakySource {
    inner: TestPatternSource,
    available: Rc<Cell<bool>>,
}

impl CaptureSource for FlakySource {
    fn canvas(&self) -> Canvas {
        self.inner.canvas()
    }

    fn frame(&mut self) -> ReelResult<Frame> {
        self.inner.set_available(self.available.get());
        self.inner.frame()
    }

    fn audio_track(&self) -> Option<crate::capture::AudioTrack> {
        self.inner.audio_track()
    }

    fn read_audio(&mut self, out: &mut Vec<f32>) -> usize {
        self.inner.read_audio(out)
    }

    fn facing(&self) -> Facing {
        self.inner.facing()
    }

    fn set_facing(&mut self, facing: Facing) -> ReelResult<()> {
        self.inner.set_facing(facing)
    }

    fn set_torch(&mut self, on: bool) -> ReelResult<()> {
        self.inner.set_torch(on)
    }

    fn set_zoom(&mut self, level: f32) -> ReelResult<()> {
        self.inner.set_zoom(level)
    }
}

#[test]
fn capture_loss_finalizes_take() {
    let clock = ManualClock::new();
    let cfg = CameraConfig::default();
    let available = Rc::new(Cell::new(true));
    let source = FlakySource {
        inner: TestPatternSource::new(Canvas::new(4, 4).unwrap(), cfg.fps),
        available: available.clone(),
    };
    let mut cam = Camera::new(
        cfg,
        Box::new(source),
        Box::new(ChunkedMemoryBackend::new()),
        Arc::new(clock.clone()),
    )
    .unwrap();
    cam.start_recording().unwrap();
    cam.render_tick().unwrap();
    clock.advance(Duration::from_secs(2));

    available.set(false);
    let err = cam.render_tick().unwrap_err();
    assert!(matches!(err, ReelError::CaptureUnavailable(_)));
    assert_eq!(cam.state(), SessionState::Idle);
    assert_eq!(cam.clips().len(), 1);
    assert_eq!(cam.clips().total_duration(), 2);
}

#[tokio::test]
async fn single_clip_combines_to_preview_and_back() {
    let (mut cam, clock) = camera();
    cam.start_recording().unwrap();
    run_seconds(&mut cam, &clock, 2);
    let StoredTake::Clip(id) = cam.stop_recording().unwrap().unwrap() else {
        panic!("expected a clip");
    };
    let clip_bytes = cam.clips().clip_bytes(id).unwrap();

    let engine = SharedTranscoder::new(PassthroughTranscoder);
    let artifact = cam.combine(&engine).await.unwrap().cloned().unwrap();
    assert!(!artifact.degraded);
    assert_eq!(cam.state(), SessionState::Preview);
    assert_eq!(cam.preview_bytes().unwrap(), clip_bytes);
    assert_eq!(cam.preview_size(), Some(clip_bytes.len()));
    assert_eq!(cam.combine_progress(), 100.0);
    assert!(!cam.start_recording().unwrap());

    assert!(cam.discard_preview());
    assert_eq!(cam.state(), SessionState::Idle);
    assert_eq!(cam.clips().len(), 1);
    assert!(cam.preview().is_none());
}

#[test]
fn attach_drives_both_loops_until_detached() {
    let (cam, clock) = camera();
    let cam = Rc::new(RefCell::new(cam));
    let frames = ManualTickSource::new();
    let seconds = ManualTickSource::new();
    let attachment = Camera::attach(&cam, &frames, &seconds);

    cam.borrow_mut().start_recording().unwrap();
    for s in 1..=4u64 {
        for _ in 0..FPS {
            frames.fire(clock.now());
        }
        clock.advance(Duration::from_secs(1));
        seconds.fire(Duration::from_secs(s));
    }
    assert_eq!(cam.borrow().session().elapsed_secs(), 4);
    assert!(cam.borrow_mut().take_last_error().is_none());

    attachment.detach();
    assert_eq!(frames.fire(clock.now()), 0);
    assert_eq!(seconds.subscriber_count(), 0);
    assert_eq!(cam.borrow().session().elapsed_secs(), 4);
}

#[test]
fn composited_take_releases_particle_loop_without_preview() {
    let (mut cam, clock) = camera();
    cam.stop_preview();
    cam.set_effect(EffectKind::Confetti);
    assert!(cam.start_recording().unwrap());
    assert!(cam.particles().is_live());
    run_seconds(&mut cam, &clock, 1);
    cam.stop_recording().unwrap();

    assert!(!cam.compositor().is_live());
    assert!(!cam.particles().is_live());
    let spawned = cam.particles().stats().spawned;
    for _ in 0..50 {
        cam.render_tick().unwrap();
    }
    assert_eq!(cam.particles().stats().spawned, spawned);

    cam.start_preview();
    for _ in 0..10 {
        cam.render_tick().unwrap();
    }
    assert!(cam.particles().stats().spawned > spawned);
}

#[test]
fn attached_budget_counts_from_take_start() {
    let clock = ManualClock::new();
    let cfg = CameraConfig {
        fps: Fps::new(10, 1).unwrap(),
        max_duration_secs: 15,
        ..CameraConfig::default()
    };
    let source = TestPatternSource::new(Canvas::new(4, 2).unwrap(), cfg.fps);
    let cam = Camera::new(
        cfg,
        Box::new(source),
        Box::new(ChunkedMemoryBackend::new()),
        Arc::new(clock.clone()),
    )
    .unwrap();
    let cam = Rc::new(RefCell::new(cam));
    let frames = ManualTickSource::new();
    let seconds = ManualTickSource::new();
    let _attachment = Camera::attach(&cam, &frames, &seconds);

    // Frames every 100ms, seconds on the whole-second grid, take starts at 0.9s.
    let mut started = false;
    for i in 0..300u32 {
        if i == 9 {
            assert!(cam.borrow_mut().start_recording().unwrap());
            started = true;
        }
        frames.fire(clock.now());
        clock.advance(Duration::from_millis(100));
        if (i + 1) % 10 == 0 {
            seconds.fire(clock.now());
        }
        if started && cam.borrow().state() == SessionState::Idle {
            break;
        }
    }

    let cam = cam.borrow();
    assert_eq!(cam.state(), SessionState::Idle);
    assert_eq!(cam.clips().len(), 1);
    assert_eq!(cam.clips().total_duration(), 15);
    assert_eq!(cam.remaining_budget(), 0);
    let clip = &cam.clips().clips()[0];
    let bytes = cam.clips().clip_bytes(clip.id).unwrap();
    assert_eq!(RawSummary::parse(&bytes).unwrap().frames, 150);
}

/// Memory encoder whose final flush always fails.
struct UnflushableBackend(ChunkedMemoryBackend);

struct UnflushableEncoder(Box<dyn Encoder>);

impl EncoderBackend for UnflushableBackend {
    fn name(&self) -> &str {
        "unflushable"
    }

    fn start(&mut self, cfg: &EncoderConfig) -> ReelResult<Box<dyn Encoder>> {
        Ok(Box::new(UnflushableEncoder(self.0.start(cfg)?)))
    }
}

impl Encoder for UnflushableEncoder {
    fn mime(&self) -> &str {
        self.0.mime()
    }

    fn push_frame(&mut self, frame: FrameView<'_>) -> ReelResult<()> {
        self.0.push_frame(frame)
    }

    fn push_audio(&mut self, samples: &[f32]) -> ReelResult<()> {
        self.0.push_audio(samples)
    }

    fn pause(&mut self) -> ReelResult<()> {
        self.0.pause()
    }

    fn resume(&mut self) -> ReelResult<()> {
        self.0.resume()
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        self.0.poll_chunk()
    }

    fn finish(self: Box<Self>, _buffered: Vec<u8>) -> ReelResult<EncodedMedia> {
        Err(ReelError::encoder("flush failed"))
    }
}

#[test]
fn capture_loss_is_reported_even_when_finalizing_fails() {
    let clock = ManualClock::new();
    let cfg = CameraConfig::default();
    let available = Rc::new(Cell::new(true));
    let source = FlakySource {
        inner: TestPatternSource::new(Canvas::new(4, 4).unwrap(), cfg.fps),
        available: available.clone(),
    };
    let mut cam = Camera::new(
        cfg,
        Box::new(source),
        Box::new(UnflushableBackend(ChunkedMemoryBackend::new())),
        Arc::new(clock.clone()),
    )
    .unwrap();
    cam.start_recording().unwrap();
    cam.render_tick().unwrap();
    clock.advance(Duration::from_secs(1));

    available.set(false);
    let err = cam.render_tick().unwrap_err();
    assert!(matches!(err, ReelError::CaptureUnavailable(_)));
    assert_eq!(cam.state(), SessionState::Idle);
    assert!(cam.clips().is_empty());
}
