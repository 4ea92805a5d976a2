use super::*;
use crate::foundation::core::Canvas;

fn solid(px: [u8; 4], w: u32, h: u32) -> Surface {
    let mut s = Surface::new(Canvas::new(w, h).unwrap());
    for p in s.data_mut().chunks_exact_mut(4) {
        p.copy_from_slice(&px);
    }
    s
}

#[test]
fn parse_accepts_css_units() {
    let f = FilterDescriptor::parse("x", "grayscale(100%) hue-rotate(0.5turn) blur(2px) contrast(1.2)")
        .unwrap();
    assert_eq!(
        f.ops,
        vec![
            FilterOp::Grayscale(1.0),
            FilterOp::HueRotate(180.0),
            FilterOp::Blur(2.0),
            FilterOp::Contrast(1.2),
        ]
    );
}

#[test]
fn parse_rejects_unknown_and_malformed_functions() {
    assert!(FilterDescriptor::parse("x", "sharpen(2)").is_err());
    assert!(FilterDescriptor::parse("x", "grayscale(1").is_err());
    assert!(FilterDescriptor::parse("x", "brightness(abc)").is_err());
    assert!(FilterDescriptor::parse("x", "brightness(-1)").is_err());
    assert!(FilterDescriptor::parse("x", "blur(100px)").is_err());
}

#[test]
fn every_preset_parses() {
    for name in PRESET_NAMES {
        let p = FilterDescriptor::preset(name).unwrap();
        assert_eq!(p.name, name);
        assert!(p.compile().is_ok());
    }
    assert!(FilterDescriptor::preset("nope").is_none());
}

#[test]
fn identity_detection_ignores_neutral_ops() {
    assert!(FilterDescriptor::identity().is_identity());
    assert!(FilterDescriptor::preset("none").unwrap().is_identity());
    assert!(
        FilterDescriptor::parse("n", "brightness(1) saturate(1) blur(0px)")
            .unwrap()
            .is_identity()
    );
    assert!(!FilterDescriptor::preset("noir").unwrap().is_identity());
}

#[test]
fn grayscale_equalizes_channels() {
    let mut s = solid([200, 40, 90, 255], 2, 2);
    let mut f = FilterDescriptor::parse("g", "grayscale(1)").unwrap().compile().unwrap();
    f.apply(&mut s).unwrap();
    let px = s.pixel(0, 0).unwrap();
    assert!((i32::from(px[0]) - i32::from(px[1])).abs() <= 1);
    assert!((i32::from(px[1]) - i32::from(px[2])).abs() <= 1);
    assert_eq!(px[3], 255);
}

#[test]
fn invert_flips_opaque_pixels() {
    let mut s = solid([255, 0, 10, 255], 1, 1);
    let mut f = FilterDescriptor::preset("invert").unwrap().compile().unwrap();
    f.apply(&mut s).unwrap();
    assert_eq!(s.pixel(0, 0), Some([0, 255, 245, 255]));
}

#[test]
fn color_ops_preserve_premultiplied_invariant() {
    let mut s = solid([100, 50, 20, 128], 3, 3);
    let mut f = FilterDescriptor::preset("vivid").unwrap().compile().unwrap();
    f.apply(&mut s).unwrap();
    for px in s.data().chunks_exact(4) {
        assert_eq!(px[3], 128);
        assert!(px[0] <= 128 && px[1] <= 128 && px[2] <= 128);
    }
}

#[test]
fn matrix_composition_matches_sequential_application() {
    let a = ColorMatrix::for_op(FilterOp::Brightness(0.5)).unwrap();
    let b = ColorMatrix::for_op(FilterOp::Invert(1.0)).unwrap();
    let px = [200, 100, 0, 255];
    let seq = b.apply_premul(a.apply_premul(px));
    let fused = a.then(b).apply_premul(px);
    for i in 0..4 {
        assert!((i32::from(seq[i]) - i32::from(fused[i])).abs() <= 1);
    }
}

#[test]
fn from_name_or_css_falls_back_to_parsing() {
    let p = FilterDescriptor::from_name_or_css("warm").unwrap();
    assert_eq!(p.name, "warm");
    let c = FilterDescriptor::from_name_or_css("sepia(0.5)").unwrap();
    assert_eq!(c.name, "custom");
    assert_eq!(c.ops, vec![FilterOp::Sepia(0.5)]);
}
