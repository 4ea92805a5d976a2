use super::*;

#[test]
fn defaults_are_valid() {
    let cfg = CameraConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.max_duration_secs, 180);
    assert_eq!(cfg.max_clips, 8);
    assert_eq!(cfg.particle_cap, 200);
    assert!(cfg.allows_speed(0.3));
    assert!(!cfg.allows_speed(1.5));
    assert!(cfg.allows_countdown(10));
    assert!(!cfg.allows_countdown(5));
}

#[test]
fn partial_json_fills_defaults() {
    let cfg = CameraConfig::from_json_str(r#"{ "max_duration_secs": 60, "max_clips": 4 }"#).unwrap();
    assert_eq!(cfg.max_duration_secs, 60);
    assert_eq!(cfg.max_clips, 4);
    assert_eq!(cfg.fps, Fps::default());
}

#[test]
fn unknown_fields_are_rejected() {
    assert!(CameraConfig::from_json_str(r#"{ "max_durations": 60 }"#).is_err());
}

#[test]
fn validation_catches_bad_values() {
    let bad = [
        r#"{ "max_clips": 0 }"#,
        r#"{ "max_duration_secs": 45 }"#,
        r#"{ "speed_options": [1.0, -2.0] }"#,
        r#"{ "speed_options": [] }"#,
        r#"{ "countdown_options": [0, 90] }"#,
        r#"{ "fps": { "num": 0, "den": 1 } }"#,
        r#"{ "encoder_chunk_frames": 0 }"#,
    ];
    for json in bad {
        assert!(
            matches!(CameraConfig::from_json_str(json), Err(ReelError::Validation(_))),
            "{json}"
        );
    }
}

#[test]
fn loads_from_path() {
    let path = std::env::temp_dir().join(format!("reeltake-config-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{ "encoder_mime": null, "particle_cap": 50 }"#).unwrap();
    let cfg = CameraConfig::from_json_path(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(cfg.encoder_mime, None);
    assert_eq!(cfg.particle_cap, 50);

    assert!(CameraConfig::from_json_path(Path::new("/nonexistent/reeltake.json")).is_err());
}
