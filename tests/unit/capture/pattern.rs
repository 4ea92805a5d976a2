use super::*;

fn source() -> TestPatternSource {
    TestPatternSource::new(Canvas::new(14, 4).unwrap(), Fps::new(30, 1).unwrap())
}

#[test]
fn frames_are_opaque_and_sized_to_canvas() {
    let mut s = source();
    let f = s.frame().unwrap();
    assert_eq!((f.width, f.height), (14, 4));
    assert_eq!(f.data.len(), 14 * 4 * 4);
    assert!(f.data.chunks_exact(4).all(|px| px[3] == 255));
    assert_eq!(s.frames_produced(), 1);
}

#[test]
fn frames_scroll_between_ticks() {
    let mut s = source();
    let a = s.frame().unwrap();
    let b = s.frame().unwrap();
    assert_ne!(a.data, b.data);
}

#[test]
fn unavailable_source_reports_capture_error() {
    let mut s = source();
    s.set_available(false);
    assert!(matches!(s.frame(), Err(ReelError::CaptureUnavailable(_))));
    let mut out = Vec::new();
    assert_eq!(s.read_audio(&mut out), 0);
}

#[test]
fn audio_read_yields_one_frame_worth_of_samples() {
    let mut s = source();
    let mut out = Vec::new();
    let n = s.read_audio(&mut out);
    assert_eq!(n, 1600 * 2);
    assert_eq!(out.len(), n);
    assert!(out.iter().all(|v| v.abs() <= 0.2 + 1e-6));
}

#[test]
fn torch_requires_back_camera_and_zoom_is_bounded() {
    let mut s = source();
    assert!(s.set_torch(true).is_err());
    s.set_facing(Facing::Back).unwrap();
    s.set_torch(true).unwrap();
    assert!(s.torch());
    assert!(s.set_zoom(0.5).is_err());
    s.set_zoom(2.0).unwrap();
    assert_eq!(s.zoom(), 2.0);
}
