use super::*;
use std::sync::Mutex;

#[test]
fn atempo_chain_stays_in_range() {
    assert_eq!(atempo_chain(1.0), "atempo=1");
    assert_eq!(atempo_chain(2.0), "atempo=2");
    assert_eq!(atempo_chain(3.0), "atempo=2.0,atempo=1.5");
    assert_eq!(atempo_chain(0.5), "atempo=0.5");
    assert_eq!(atempo_chain(0.3), "atempo=0.5,atempo=0.6");
}

#[test]
fn progress_state_parses_microseconds() {
    let mut p = ProgressState::default();
    p.update("out_time_us", "5000000");
    assert!((p.percent(10.0) - 50.0).abs() < 1e-3);
    p.update("out_time_ms", "20000000");
    assert_eq!(p.percent(10.0), 100.0);
    p.update("out_time_us", "N/A");
    assert_eq!(p.percent(0.0), 0.0);
    p.update("progress", "end");
    assert_eq!(p.percent(0.0), 100.0);
}

#[test]
fn extension_follows_mime() {
    assert_eq!(extension_for("video/webm;codecs=vp9").unwrap(), "webm");
    assert_eq!(extension_for("video/mp4").unwrap(), "mp4");
    assert!(matches!(
        extension_for("video/x-reeltake-raw"),
        Err(ReelError::UnsupportedFormat(_))
    ));
}

#[test]
fn speed_args_drop_audio_on_retry() {
    let args = speed_args(
        Path::new("/tmp/in.webm"),
        Path::new("/tmp/out.webm"),
        "webm",
        "setpts=PTS/2",
        None,
    );
    assert!(args.iter().any(|a| a == "-an"));
    assert!(!args.iter().any(|a| a == "-filter:a"));
    assert_eq!(args.last().map(String::as_str), Some("/tmp/out.webm"));
}

#[tokio::test]
async fn missing_binary_fails_load() {
    let t = FfmpegTranscoder::new("/nonexistent/ffmpeg-binary", std::env::temp_dir());
    assert!(matches!(t.load().await, Err(ReelError::Transcode(_))));
}

#[tokio::test]
async fn unreadable_input_is_rejected_before_spawning() {
    let t = FfmpegTranscoder::new("/nonexistent/ffmpeg-binary", std::env::temp_dir());
    let input = MediaBuffer::new(vec![1u8, 2, 3], "video/x-reeltake-raw", 1.0);
    let err = t.change_speed(&input, 2.0, &|_| {}).await.unwrap_err();
    assert!(matches!(err, ReelError::UnsupportedFormat(_)));
    let err = t.concatenate(&[], &|_| {}).await.unwrap_err();
    assert!(matches!(err, ReelError::Validation(_)));
}

#[tokio::test]
async fn retimes_real_clip_when_ffmpeg_available() {
    if !crate::encode::ffmpeg::is_ffmpeg_on_path() {
        return;
    }
    let dir = std::env::temp_dir().join(format!("reeltake-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let src = dir.join("src.mp4");
    let ok = std::process::Command::new("ffmpeg")
        .args(["-loglevel", "error", "-y", "-f", "lavfi", "-i", "testsrc=size=64x64:rate=10"])
        .args(["-t", "2", "-c:v", "libx264", "-pix_fmt", "yuv420p"])
        .arg(&src)
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    if !ok {
        std::fs::remove_dir_all(&dir).ok();
        return;
    }
    let input = MediaBuffer::new(std::fs::read(&src).unwrap(), "video/mp4", 2.0);
    std::fs::remove_dir_all(&dir).ok();

    let t = FfmpegTranscoder::default();
    let seen = Mutex::new(Vec::new());
    let out = t
        .change_speed(&input, 2.0, &|p| seen.lock().unwrap().push(p))
        .await
        .unwrap();
    assert!(!out.is_empty());
    assert!((out.duration_secs - 1.0).abs() < 1e-9);
    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.last().copied(), Some(100.0));
    assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
}
