use super::*;
use crate::foundation::core::{Canvas, Fps};

fn cfg(mime: Option<&str>, w: u32, h: u32) -> EncoderConfig {
    EncoderConfig {
        mime: mime.map(str::to_owned),
        canvas: Canvas::new(w, h).unwrap(),
        fps: Fps::default(),
        audio: None,
        chunk_frames: 30,
    }
}

fn ffmpeg_has_encoder(name: &str) -> bool {
    Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains(name))
        .unwrap_or(false)
}

#[test]
fn container_selection_follows_mime_essence() {
    assert_eq!(Container::for_mime(None).unwrap(), Container::Webm);
    assert_eq!(
        Container::for_mime(Some("video/webm;codecs=vp9")).unwrap(),
        Container::Webm
    );
    assert_eq!(
        Container::for_mime(Some("video/mp4")).unwrap(),
        Container::FragmentedMp4
    );
    assert!(matches!(
        Container::for_mime(Some("video/x-matroska")),
        Err(ReelError::UnsupportedFormat(_))
    ));
}

#[test]
fn unsupported_mime_fails_before_spawning() {
    let err = FfmpegEncoder::new(&cfg(Some("image/gif"), 4, 4), [0, 0, 0, 255]).err();
    assert!(err.is_some_and(|e| e.is_encoder_setup_failure()));
}

#[test]
fn odd_dimensions_are_rejected() {
    let err = FfmpegEncoder::new(&cfg(None, 3, 4), [0, 0, 0, 255]).err();
    assert!(matches!(err, Some(ReelError::Validation(_))));
}

#[test]
fn flatten_premul_over_black_produces_expected_rgb() {
    let src = vec![128u8, 0, 0, 128];
    let mut dst = vec![0u8; 4];
    flatten_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).unwrap();
    assert_eq!(dst, vec![128, 0, 0, 255]);
}

#[test]
fn flatten_transparent_takes_background() {
    let src = vec![0u8; 8];
    let mut dst = vec![0u8; 8];
    flatten_to_opaque_rgba8(&mut dst, &src, [10, 20, 30, 255]).unwrap();
    assert_eq!(dst, vec![10, 20, 30, 255, 10, 20, 30, 255]);
}

#[test]
fn encodes_webm_when_ffmpeg_available() {
    if !is_ffmpeg_on_path() || !ffmpeg_has_encoder("libvpx-vp9") {
        return;
    }
    let mut backend = FfmpegBackend::default();
    let mut enc = backend.start(&cfg(None, 16, 16)).unwrap();
    let px = vec![200u8; 16 * 16 * 4];
    let mut buffered = Vec::new();
    for _ in 0..10 {
        enc.push_frame(FrameView {
            width: 16,
            height: 16,
            data: &px,
        })
        .unwrap();
        if let Some(c) = enc.poll_chunk() {
            buffered.extend(c);
        }
    }
    let media = enc.finish(buffered).unwrap();
    assert!(media.mime.starts_with("video/webm"));
    // EBML magic
    assert_eq!(&media.bytes[..4], &[0x1a, 0x45, 0xdf, 0xa3]);
}
