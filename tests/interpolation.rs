use marker_studio::interpolation::FillMethod;
use marker_studio::{
    fill_gap, interpolate, AnalysisSession, FallbackKind, FrameRange, MarkerSeries, PatternOptions, Quality,
    RawTrajectoryData, Sample, StudioConfig, StudioError,
};
use nalgebra::Point3;

fn walk(t: f64) -> [f64; 3] {
    [(0.1 * t).sin(), (0.1 * t).cos(), 0.01 * t]
}

fn shifted(p: [f64; 3], d: [f64; 3]) -> [f64; 3] {
    [p[0] + d[0], p[1] + d[1], p[2] + d[2]]
}

/// M2 complete; M1 follows M2 one unit along X and misses `gap`.
fn two_markers(gap: std::ops::RangeInclusive<usize>) -> RawTrajectoryData {
    RawTrajectoryData {
        frame_rate: 100.0,
        marker_names: vec!["M1".into(), "M2".into()],
        frames: (0..100)
            .map(|i| {
                let m2 = walk(i as f64);
                let m1 = if gap.contains(&i) { None } else { Some(shifted(m2, [1.0, 0.0, 0.0])) };
                vec![m1, Some(m2)]
            })
            .collect(),
        units: None,
    }
}

fn series_from(name: &str, f: impl Fn(usize) -> Option<[f64; 3]>) -> MarkerSeries {
    MarkerSeries::new(name, (0..100).map(|i| Sample::from_xyz(f(i))).collect())
}

#[test]
fn pattern_gap_fill_then_revert() {
    let mut session = AnalysisSession::new(StudioConfig::default()).unwrap();
    session.load_dataset(&two_markers(40..=42)).unwrap();
    let full = FrameRange::new(0, 99);

    let filled = session.interpolate_gap("M1", full, &["M2"], None).unwrap();
    for f in 40..=42 {
        assert_eq!(filled.quality(f), Some(Quality::Interpolated));
        let expected = Point3::from(shifted(walk(f as f64), [1.0, 0.0, 0.0]));
        assert!((filled.position(f).unwrap() - expected).norm() < 1e-9, "frame {f}");
    }
    assert_eq!(filled.quality(39), Some(Quality::Original));

    let reverted = session.revert("M1", FrameRange::new(40, 42)).unwrap();
    for f in 40..=42 {
        assert_eq!(reverted.quality(f), Some(Quality::Missing));
    }
}

#[test]
fn boundary_gap_is_rejected_and_left_missing() {
    let mut session = AnalysisSession::new(StudioConfig::default()).unwrap();
    session.load_dataset(&two_markers(0..=4)).unwrap();
    let err = session.interpolate_gap("M1", FrameRange::new(0, 99), &["M2"], None);
    match err {
        Err(StudioError::UnboundedGap { marker, gap }) => {
            assert_eq!(marker, "M1");
            assert_eq!(gap, FrameRange::new(0, 4));
        }
        other => panic!("expected an unbounded gap, got {other:?}"),
    }
    let m1 = session.series("M1").unwrap();
    for f in 0..=4 {
        assert!(m1.sample(f).unwrap().is_missing());
    }
    assert_eq!(m1.version(), 0);
}

#[test]
fn unknown_reference_is_not_found() {
    let mut session = AnalysisSession::new(StudioConfig::default()).unwrap();
    session.load_dataset(&two_markers(40..=42)).unwrap();
    let err = session.interpolate_gap("M1", FrameRange::new(0, 99), &["M9"], None);
    assert!(matches!(err, Err(StudioError::NotFound(name)) if name == "M9"));
}

#[test]
fn best_matching_reference_is_chosen() {
    let target = series_from("T", |i| if (50..=55).contains(&i) { None } else { Some(walk(i as f64)) });
    let good = series_from("good", |i| Some(shifted(walk(i as f64), [0.0, 2.0, 0.0])));
    let poor = series_from("poor", |i| Some([0.0, 0.0, if i % 2 == 0 { 1.0 } else { -1.0 }]));
    let out = interpolate(&target, FrameRange::new(0, 99), &[&poor, &good], &PatternOptions::default()).unwrap();
    assert_eq!(out.fills.len(), 1);
    match &out.fills[0].method {
        FillMethod::Pattern { reference, similarity } => {
            assert_eq!(reference, "good");
            assert!(*similarity > 0.999);
        }
        other => panic!("expected pattern fill, got {other:?}"),
    }
}

#[test]
fn reference_with_its_own_gap_is_skipped() {
    let target = series_from("T", |i| if (50..=55).contains(&i) { None } else { Some(walk(i as f64)) });
    let holed = series_from("holed", |i| if i == 52 { None } else { Some(walk(i as f64)) });
    let options = PatternOptions { fallback: FallbackKind::Linear, ..Default::default() };
    let out = interpolate(&target, FrameRange::new(0, 99), &[&holed], &options).unwrap();
    assert_eq!(out.fills[0].method, FillMethod::Fallback(FallbackKind::Linear));
    for f in 50..=55 {
        assert_eq!(out.series.quality(f), Some(Quality::Interpolated));
    }
}

#[test]
fn numeric_fills_reproduce_linear_motion() {
    let line = |i: usize| [0.5 * i as f64, 3.0 - 0.25 * i as f64, 1.0];
    let target = series_from("T", |i| if (20..=29).contains(&i) { None } else { Some(line(i)) });
    for kind in [FallbackKind::Linear, FallbackKind::CubicSpline] {
        let out = fill_gap(&target, FrameRange::new(0, 99), kind, &PatternOptions::default()).unwrap();
        for f in 20..=29 {
            let p = out.series.position(f).unwrap();
            assert!((p - Point3::from(line(f))).norm() < 1e-9, "{kind:?} frame {f}: {p}");
        }
    }
}

#[test]
fn nearest_fill_copies_the_closer_anchor() {
    let line = |i: usize| [i as f64, -2.0 * i as f64, 0.5];
    let target = series_from("T", |i| if (20..=22).contains(&i) { None } else { Some(line(i)) });
    let out = fill_gap(&target, FrameRange::new(0, 99), FallbackKind::Nearest, &PatternOptions::default()).unwrap();
    // Anchors at 19 and 23; frame 21 is equidistant and takes the earlier one.
    for (f, anchor) in [(20, 19), (21, 19), (22, 23)] {
        assert_eq!(out.series.position(f).unwrap(), Point3::from(line(anchor)), "frame {f}");
        assert_eq!(out.series.quality(f), Some(Quality::Interpolated));
    }
}

#[test]
fn polynomial_fill_reproduces_quadratic_motion() {
    let parabola = |i: usize| {
        let t = i as f64;
        [0.01 * t * t, 2.0 - 0.5 * t, 0.002 * t * t - 0.1 * t + 3.0]
    };
    let target = series_from("T", |i| if (40..=49).contains(&i) { None } else { Some(parabola(i)) });
    let kind = FallbackKind::Polynomial { order: 2 };
    let out = fill_gap(&target, FrameRange::new(0, 99), kind, &PatternOptions::default()).unwrap();
    assert_eq!(out.fills[0].method, FillMethod::Fallback(kind));
    for f in 40..=49 {
        let p = out.series.position(f).unwrap();
        assert!((p - Point3::from(parabola(f))).norm() < 1e-8, "frame {f}: {p}");
    }
}

#[test]
fn polynomial_fallback_needs_a_positive_order() {
    let target = series_from("T", |i| if i == 50 { None } else { Some(walk(i as f64)) });
    let err = fill_gap(&target, FrameRange::new(0, 99), FallbackKind::Polynomial { order: 0 }, &PatternOptions::default());
    assert!(matches!(err, Err(StudioError::InvalidParameter(_))));
    assert!(target.sample(50).unwrap().is_missing());
}

#[test]
fn gaps_outside_the_range_are_ignored() {
    let target = series_from("T", |i| if (10..=12).contains(&i) || (70..=72).contains(&i) { None } else { Some(walk(i as f64)) });
    let out = fill_gap(&target, FrameRange::new(50, 99), FallbackKind::CubicSpline, &PatternOptions::default()).unwrap();
    assert_eq!(out.fills.len(), 1);
    assert!(out.series.sample(11).unwrap().is_missing());
    assert!(!out.series.sample(71).unwrap().is_missing());
}
