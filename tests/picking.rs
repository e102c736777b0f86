use egui::Pos2;
use marker_studio::picking::PickScene;
use marker_studio::{
    AnalysisSession, Camera, ClickOutcome, EventFilter, EventKind, InteractionMode, PickingState, PickingSubsystem,
    RawTrajectoryData, SelectionState, SoftwareContext, StudioConfig, StudioError,
};
use nalgebra::Point3;

fn scene_points() -> Vec<(&'static str, Point3<f64>)> {
    vec![("head", Point3::new(0.0, 1.0, 0.0)), ("hip", Point3::new(0.0, 0.0, 0.0)), ("toe", Point3::new(1.0, -1.0, 0.0))]
}

fn cursor_at(camera: &Camera, p: Point3<f64>) -> Pos2 {
    camera.project(&p).expect("point in view").0
}

#[test]
fn pick_returns_the_marker_under_the_cursor() {
    let mut ctx = SoftwareContext::new(800, 600);
    let camera = Camera::default();
    let mut picking = PickingSubsystem::new(6.0);
    let markers = scene_points();
    let scene = PickScene { markers: &markers, occluders: &[] };

    for (name, p) in &markers {
        let hit = picking.pick(&mut ctx, &camera, scene, cursor_at(&camera, *p)).unwrap();
        assert_eq!(hit.as_deref(), Some(*name));
    }
    let miss = picking.pick(&mut ctx, &camera, scene, Pos2::new(5.0, 5.0)).unwrap();
    assert_eq!(miss, None);
    assert_eq!(picking.state(), PickingState::Ready);
    assert_eq!(picking.id_map().len(), 3);
}

#[test]
fn cursor_right_of_the_viewport_misses() {
    let mut ctx = SoftwareContext::new(800, 600);
    let camera = Camera::default();
    let mut picking = PickingSubsystem::new(6.0);
    let markers = vec![("hip", Point3::new(0.0, 0.0, 0.0))];
    let scene = PickScene { markers: &markers, occluders: &[] };
    let hip = cursor_at(&camera, markers[0].1);
    assert_eq!(picking.pick(&mut ctx, &camera, scene, hip).unwrap().as_deref(), Some("hip"));

    // One row up and a full width to the right lands on the same flat index.
    let outside = Pos2::new(hip.x + 800.0, hip.y - 1.0);
    assert_eq!(picking.pick(&mut ctx, &camera, scene, outside).unwrap(), None);
}

#[test]
fn occluder_in_front_hides_the_marker() {
    let mut ctx = SoftwareContext::new(800, 600);
    let camera = Camera::default();
    let mut picking = PickingSubsystem::new(6.0);
    let markers = vec![("hip", Point3::new(0.0, 0.0, 0.0))];
    let occluders = [Point3::new(0.0, 0.0, 1.0)];
    let cursor = cursor_at(&camera, markers[0].1);

    let hidden = picking.pick(&mut ctx, &camera, PickScene { markers: &markers, occluders: &occluders }, cursor).unwrap();
    assert_eq!(hidden, None);

    let behind = [Point3::new(0.0, 0.0, -1.0)];
    let visible = picking.pick(&mut ctx, &camera, PickScene { markers: &markers, occluders: &behind }, cursor).unwrap();
    assert_eq!(visible.as_deref(), Some("hip"));
}

#[test]
fn nearer_marker_wins_when_overlapping() {
    let mut ctx = SoftwareContext::new(800, 600);
    let camera = Camera::default();
    let mut picking = PickingSubsystem::new(6.0);
    let markers = vec![("back", Point3::new(0.0, 0.0, -0.5)), ("front", Point3::new(0.0, 0.0, 0.5))];
    let cursor = cursor_at(&camera, Point3::origin());
    let hit = picking.pick(&mut ctx, &camera, PickScene { markers: &markers, occluders: &[] }, cursor).unwrap();
    assert_eq!(hit.as_deref(), Some("front"));
}

#[test]
fn release_is_idempotent_and_frees_the_target() {
    let mut ctx = SoftwareContext::new(320, 240);
    let mut picking = PickingSubsystem::new(4.0);
    assert_eq!(picking.state(), PickingState::Uninitialized);
    picking.ensure_ready(&mut ctx).unwrap();
    assert_eq!(picking.state(), PickingState::Ready);
    assert_eq!(ctx.live_targets(), 1);

    picking.release(&mut ctx);
    picking.release(&mut ctx);
    assert_eq!(picking.state(), PickingState::Released);
    assert_eq!(ctx.live_targets(), 0);

    // A later use re-enters Ready.
    picking.ensure_ready(&mut ctx).unwrap();
    assert_eq!(picking.state(), PickingState::Ready);
    assert_eq!(ctx.live_targets(), 1);
}

#[test]
fn no_graphics_calls_after_context_loss() {
    let mut ctx = SoftwareContext::new(320, 240);
    let camera = Camera { viewport: [320, 240], ..Camera::default() };
    let mut picking = PickingSubsystem::new(4.0);
    picking.ensure_ready(&mut ctx).unwrap();

    ctx.lose();
    picking.context_lost();
    assert_eq!(picking.state(), PickingState::Released);
    picking.release(&mut ctx);
    picking.release(&mut ctx);

    let markers = scene_points();
    let err = picking.pick(&mut ctx, &camera, PickScene { markers: &markers, occluders: &[] }, Pos2::new(160.0, 120.0));
    assert!(matches!(err, Err(StudioError::ResourceUnavailable(_))));
    assert_eq!(ctx.calls_while_dead(), 0);

    ctx.restore();
    let hit = picking.pick(&mut ctx, &camera, PickScene { markers: &markers, occluders: &[] }, cursor_at(&camera, markers[1].1));
    assert_eq!(hit.unwrap().as_deref(), Some("hip"));
    assert_eq!(picking.state(), PickingState::Ready);
}

#[test]
fn release_without_noticing_loss_is_still_safe() {
    let mut ctx = SoftwareContext::new(320, 240);
    let mut picking = PickingSubsystem::new(4.0);
    picking.ensure_ready(&mut ctx).unwrap();
    ctx.lose();
    picking.release(&mut ctx);
    assert_eq!(picking.state(), PickingState::Released);
    assert_eq!(ctx.calls_while_dead(), 0);
}

#[test]
fn teardown_failures_are_suppressed() {
    let mut ctx = SoftwareContext::new(320, 240);
    let mut picking = PickingSubsystem::new(4.0);
    picking.ensure_ready(&mut ctx).unwrap();
    ctx.set_fail_deletes(true);
    picking.release(&mut ctx);
    assert_eq!(picking.state(), PickingState::Released);
    picking.release(&mut ctx);
}

#[test]
fn resize_reallocates_the_identity_buffer() {
    let mut ctx = SoftwareContext::new(320, 240);
    let mut picking = PickingSubsystem::new(4.0);
    picking.ensure_ready(&mut ctx).unwrap();
    ctx.resize(640, 480);
    picking.ensure_ready(&mut ctx).unwrap();
    assert_eq!(ctx.live_targets(), 1);
    ctx.resize(0, 480);
    assert!(matches!(picking.ensure_ready(&mut ctx), Err(StudioError::ResourceUnavailable(_))));
}

fn standing() -> RawTrajectoryData {
    RawTrajectoryData {
        frame_rate: 100.0,
        marker_names: scene_points().iter().map(|(n, _)| n.to_string()).collect(),
        frames: (0..10).map(|_| scene_points().iter().map(|(_, p)| Some([p.x, p.y, p.z])).collect()).collect(),
        units: None,
    }
}

#[test]
fn session_click_follows_the_interaction_mode() {
    let mut ctx = SoftwareContext::new(800, 600);
    let mut session = AnalysisSession::new(StudioConfig::default()).unwrap();
    session.load_dataset(&standing()).unwrap();
    let picks = session.events().subscribe(EventFilter::only(EventKind::MARKER_PICKED));
    let hip = cursor_at(session.camera(), Point3::origin());
    let head = cursor_at(session.camera(), Point3::new(0.0, 1.0, 0.0));

    assert!(matches!(session.click(&mut ctx, hip), ClickOutcome::CurrentMarker(Some(ref m)) if m == "hip"));
    assert_eq!(session.current_marker(), Some("hip"));
    assert!(matches!(session.click(&mut ctx, hip), ClickOutcome::CurrentMarker(None)));
    assert!(matches!(session.click(&mut ctx, Pos2::new(1.0, 1.0)), ClickOutcome::Nothing));
    assert_eq!(picks.try_iter().count(), 2);

    session.set_pattern_selection(true);
    assert_eq!(session.mode(), InteractionMode::PatternSelection);
    assert!(matches!(session.click(&mut ctx, head), ClickOutcome::PatternToggled { selected: true, .. }));
    assert!(session.pattern_markers().contains("head"));
    session.set_pattern_selection(false);

    session.activate_analysis();
    session.click(&mut ctx, hip);
    session.click(&mut ctx, head);
    assert_eq!(session.selection_state(), SelectionState::Two);

    let hits: Vec<String> = picks.try_iter().filter_map(|e| e.pick).map(|p| p.marker).collect();
    assert_eq!(hits, ["head", "hip", "head"]);
}

#[test]
fn session_pick_on_a_lost_context_reports_nothing() {
    let mut ctx = SoftwareContext::new(800, 600);
    let mut session = AnalysisSession::new(StudioConfig::default()).unwrap();
    session.load_dataset(&standing()).unwrap();
    let released = session.events().subscribe(EventFilter::only(EventKind::PICKING_RELEASED));
    let hip = cursor_at(session.camera(), Point3::origin());
    let picks = session.events().subscribe(EventFilter::only(EventKind::MARKER_PICKED));
    assert_eq!(session.pick(&mut ctx, hip).as_deref(), Some("hip"));
    assert_eq!(picks.try_iter().count(), 1);

    ctx.lose();
    session.context_lost();
    assert_eq!(session.pick(&mut ctx, hip), None);
    session.release_picking(&mut ctx);
    assert_eq!(ctx.calls_while_dead(), 0);
    assert_eq!(session.picking_state(), PickingState::Released);
    assert_eq!(released.try_iter().count(), 1);
    assert_eq!(picks.try_iter().count(), 0);
}
