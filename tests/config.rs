use std::path::PathBuf;

use marker_studio::persistence::{load_config_from_path, load_dataset_from_path, save_config_to_path, save_dataset_to_path};
use marker_studio::{Dataset, FallbackKind, FrameRange, RawTrajectoryData, StudioConfig, StudioError, TrajectoryStore};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("marker-studio-{}-{name}", std::process::id()))
}

#[test]
fn config_roundtrips_as_yaml_and_json() {
    let mut cfg = StudioConfig::default();
    cfg.filters.butterworth_cutoff_hz = 6.0;
    cfg.pattern.fallback = FallbackKind::Linear;
    cfg.selection.frame_tolerance = 3;
    cfg.skeleton.pairs = vec![("knee".into(), "ankle".into())];

    for name in ["studio.yaml", "studio.json"] {
        let path = temp_path(name);
        save_config_to_path(&cfg, &path).unwrap();
        let back = load_config_from_path(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, cfg, "{name}");
    }
}

#[test]
fn invalid_config_file_names_the_path() {
    let path = temp_path("bad.yaml");
    std::fs::write(&path, "pattern:\n  lookback: 0\n").unwrap();
    let err = load_config_from_path(&path);
    std::fs::remove_file(&path).ok();
    match err {
        Err(StudioError::Config(msg)) => assert!(msg.contains("bad.yaml"), "{msg}"),
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn edited_dataset_survives_save_and_load() {
    let raw = RawTrajectoryData {
        frame_rate: 60.0,
        marker_names: vec!["a".into()],
        frames: (0..8).map(|i| vec![Some([i as f64, 0.0, 0.0])]).collect(),
        units: Some("mm".into()),
    };
    let store = TrajectoryStore::load(&raw).unwrap();
    store.delete_range("a", FrameRange::new(2, 3)).unwrap();

    let path = temp_path("dataset.json");
    save_dataset_to_path(&store.snapshot(), &path).unwrap();
    let loaded: Dataset = load_dataset_from_path(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.frame_count(), 8);
    assert_eq!(loaded.frame_rate(), 60.0);
    assert_eq!(loaded.position("a", 2).unwrap(), None);
    assert_eq!(loaded.position("a", 4).unwrap().map(|p| p.x), Some(4.0));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_dataset_from_path(&temp_path("does-not-exist.json"));
    assert!(matches!(err, Err(StudioError::Io(_))));
}
