use super::*;
use crate::foundation::error::ReelError;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
struct CountingEngine {
    loads: AtomicU32,
    fail_first: bool,
}

impl Transcoder for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    async fn load(&self) -> ReelResult<()> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_first && n == 0 {
            return Err(ReelError::transcode("warm-up failed"));
        }
        Ok(())
    }

    async fn concatenate(
        &self,
        inputs: &[MediaBuffer],
        _progress: Progress<'_>,
    ) -> ReelResult<MediaBuffer> {
        Ok(inputs[0].clone())
    }

    async fn change_speed(
        &self,
        input: &MediaBuffer,
        _speed: f32,
        _progress: Progress<'_>,
    ) -> ReelResult<MediaBuffer> {
        Ok(input.clone())
    }
}

#[tokio::test]
async fn ready_loads_once_across_clones() {
    let shared = SharedTranscoder::new(CountingEngine::default());
    let other = shared.clone();
    assert!(!shared.is_loaded());
    shared.ready().await.unwrap();
    other.ready().await.unwrap();
    assert!(other.is_loaded());
    assert_eq!(shared.engine().loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_load_is_retried() {
    let shared = SharedTranscoder::new(CountingEngine {
        fail_first: true,
        ..CountingEngine::default()
    });
    assert!(shared.ready().await.is_err());
    assert!(!shared.is_loaded());
    shared.ready().await.unwrap();
    assert_eq!(shared.engine().loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn preload_warms_in_background() {
    let shared = SharedTranscoder::new(CountingEngine::default());
    shared.preload().await.unwrap();
    assert!(shared.is_loaded());
    shared.ready().await.unwrap();
    assert_eq!(shared.engine().loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn passthrough_accepts_only_noop_work() {
    let t = PassthroughTranscoder;
    let a = MediaBuffer::new(vec![1u8], "video/webm", 1.0);
    let b = MediaBuffer::new(vec![2u8], "video/webm", 1.0);
    assert_eq!(t.concatenate(std::slice::from_ref(&a), &|_| {}).await.unwrap(), a);
    assert!(t.concatenate(&[a.clone(), b], &|_| {}).await.is_err());
    assert_eq!(t.change_speed(&a, 1.0, &|_| {}).await.unwrap(), a);
    assert!(t.change_speed(&a, 2.0, &|_| {}).await.is_err());
}

#[test]
fn monotonic_progress_never_goes_backwards() {
    let seen = std::sync::Mutex::new(Vec::new());
    let sink = |p: f32| seen.lock().unwrap().push(p);
    let progress = MonotonicProgress::new(&sink);
    for p in [10.0, 40.0, 5.0, f32::NAN, 20.0, 60.0, 100.0] {
        progress.report(p);
    }
    assert_eq!(
        *seen.lock().unwrap(),
        vec![10.0, 40.0, 40.0, 40.0, 60.0, 100.0]
    );
    assert_eq!(progress.high_water(), 100.0);
}
