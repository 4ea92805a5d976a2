use super::*;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
struct FakeEngine {
    fail_concat: bool,
    fail_speed: bool,
    fail_load: bool,
    calls: AtomicU32,
}

impl Transcoder for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn load(&self) -> ReelResult<()> {
        if self.fail_load {
            return Err(ReelError::transcode("no engine"));
        }
        Ok(())
    }

    async fn concatenate(
        &self,
        inputs: &[MediaBuffer],
        progress: Progress<'_>,
    ) -> ReelResult<MediaBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_concat {
            return Err(ReelError::transcode("concat rejected"));
        }
        progress(50.0);
        progress(100.0);
        let bytes: Vec<u8> = inputs.iter().flat_map(|m| m.bytes.iter().copied()).collect();
        let d = inputs.iter().map(|m| m.duration_secs).sum();
        Ok(MediaBuffer::new(bytes, inputs[0].mime.clone(), d))
    }

    async fn change_speed(
        &self,
        input: &MediaBuffer,
        speed: f32,
        progress: Progress<'_>,
    ) -> ReelResult<MediaBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_speed {
            return Err(ReelError::transcode("speed rejected"));
        }
        progress(50.0);
        let mut bytes = input.bytes.to_vec();
        bytes.push(speed as u8);
        Ok(MediaBuffer::new(
            bytes,
            input.mime.clone(),
            input.duration_secs / f64::from(speed),
        ))
    }
}

fn clip(b: u8) -> MediaBuffer {
    MediaBuffer::new(vec![b; 3], "video/webm", 2.0)
}

async fn run(engine: FakeEngine, clips: Vec<MediaBuffer>, speed: f32) -> (CombineOutcome, Vec<f32>, u32) {
    let shared = SharedTranscoder::new(engine);
    let seen = Mutex::new(Vec::new());
    let out = run_combine(
        &shared,
        CombineJob { clips, speed },
        &|p| seen.lock().unwrap().push(p),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    let calls = shared.engine().calls.load(Ordering::SeqCst);
    (out, seen.into_inner().unwrap(), calls)
}

#[tokio::test]
async fn single_clip_at_unit_speed_is_passthrough() {
    let (out, _, calls) = run(FakeEngine::default(), vec![clip(7)], 1.0).await;
    assert_eq!(out, CombineOutcome::Passthrough(clip(7)));
    assert_eq!(calls, 0);
}

#[tokio::test]
async fn concat_progress_fills_first_sixty_percent() {
    let (out, seen, calls) = run(FakeEngine::default(), vec![clip(1), clip(2)], 2.0).await;
    assert_eq!(calls, 2);
    let media = out.media().unwrap();
    assert_eq!(&*media.bytes, &[1, 1, 1, 2, 2, 2, 2]);
    assert_eq!(seen, vec![0.0, 30.0, 60.0, 80.0, 100.0]);
}

#[tokio::test]
async fn concat_only_uses_full_range() {
    let (out, seen, _) = run(FakeEngine::default(), vec![clip(1), clip(2)], 1.0).await;
    assert!(matches!(out, CombineOutcome::Combined(_)));
    assert_eq!(seen, vec![0.0, 50.0, 100.0, 100.0]);
}

#[tokio::test]
async fn speed_only_uses_full_range() {
    let (out, seen, calls) = run(FakeEngine::default(), vec![clip(4)], 0.5).await;
    assert_eq!(calls, 1);
    assert_eq!(out.media().unwrap().duration_secs, 4.0);
    assert_eq!(seen, vec![0.0, 50.0, 100.0]);
}

#[tokio::test]
async fn concat_failure_falls_back_to_first_clip() {
    let engine = FakeEngine {
        fail_concat: true,
        ..FakeEngine::default()
    };
    let (out, _, _) = run(engine, vec![clip(1), clip(2), clip(3)], 2.0).await;
    assert!(out.is_degraded());
    assert_eq!(out.media(), Some(&clip(1)));
}

#[tokio::test]
async fn speed_failure_and_load_failure_fall_back() {
    let engine = FakeEngine {
        fail_speed: true,
        ..FakeEngine::default()
    };
    let (out, _, _) = run(engine, vec![clip(1), clip(2)], 3.0).await;
    assert_eq!(out.media(), Some(&clip(1)));

    let engine = FakeEngine {
        fail_load: true,
        ..FakeEngine::default()
    };
    let (out, _, calls) = run(engine, vec![clip(5)], 2.0).await;
    assert!(out.is_degraded());
    assert_eq!(calls, 0);
}

#[tokio::test]
async fn empty_job_is_an_error() {
    let shared = SharedTranscoder::new(FakeEngine::default());
    let err = run_combine(
        &shared,
        CombineJob {
            clips: Vec::new(),
            speed: 1.0,
        },
        &|_| {},
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ReelError::Validation(_)));
}

#[tokio::test]
async fn cancelled_before_start_yields_cancelled() {
    let shared = SharedTranscoder::new(FakeEngine::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let out = run_combine(
        &shared,
        CombineJob {
            clips: vec![clip(1), clip(2)],
            speed: 1.0,
        },
        &|_| {},
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(out, CombineOutcome::Cancelled);
    assert_eq!(shared.engine().calls.load(Ordering::SeqCst), 0);
}
