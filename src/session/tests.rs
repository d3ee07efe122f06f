use super::*;
use crate::model::ActorId;
use crate::remote::{EntityType, InMemoryClient};
use serde_json::json;

const IMAGE_URL: &str = "https://images.example/oxy1.jpg";
const PRACTICE_URL: &str = "https://images.example/oxy2.jpg";
const EPSILON: f32 = 0.01;

fn approx_eq(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < EPSILON && (a.y - b.y).abs() < EPSILON
}

fn task(id: u64, name: &str, url: &str) -> Task {
    Task {
        id: RemoteId(id),
        name: name.to_string(),
        url: url.to_string(),
    }
}

fn config(mode: Mode) -> AnnotatorConfig {
    let mut config = AnnotatorConfig::default();
    config.preferences.initial_mode = mode;
    config
}

fn ground_truth() -> GroundTruth {
    let mut truth = GroundTruth::new();
    let known = |x, y| KnownAnnotation {
        x,
        y,
        label: "tau".to_string(),
    };
    truth.insert("oxy1", vec![known(10.0, 10.0), known(50.0, 50.0)]);
    truth.insert("oxy2", vec![known(10.0, 10.0), known(50.0, 50.0)]);
    truth
}

/// Surface with the required task image loaded.
fn surface_with(client: &InMemoryClient, config: AnnotatorConfig) -> AnnotationSurface {
    let mut surface = AnnotationSurface::new(config, Box::new(client.clone()), ground_truth());
    surface.load_task(WorkspaceName::Required, task(1, "oxy1-required", IMAGE_URL));
    assert!(surface.image_loaded(IMAGE_URL, 1000, 800));
    surface
}

fn surface() -> (AnnotationSurface, InMemoryClient) {
    let client = InMemoryClient::new();
    let surface = surface_with(&client, config(Mode::Transcription));
    (surface, client)
}

fn place(surface: &mut AnnotationSurface, x: f32, y: f32) -> MarkerId {
    surface.click(Point::new(x, y)).unwrap().unwrap()
}

fn calls(client: &InMemoryClient, operation: &str) -> Vec<Value> {
    client
        .calls()
        .into_iter()
        .filter(|c| c.operation == operation && c.entity == Some(EntityType::Annotation))
        .map(|c| c.payload)
        .collect()
}

#[test]
fn test_edits_wait_for_image() {
    let client = InMemoryClient::new();
    let mut surface = AnnotationSurface::new(config(Mode::Transcription), Box::new(client), GroundTruth::new());
    assert_eq!(surface.click(Point::ORIGIN), Err(AnnotatorError::ImageNotReady));

    surface.load_task(WorkspaceName::Required, task(1, "oxy1", IMAGE_URL));
    assert!(!surface.image_loaded("https://images.example/stale.jpg", 10, 10));
    assert_eq!(surface.click(Point::ORIGIN), Err(AnnotatorError::ImageNotReady));

    assert!(surface.image_loaded(IMAGE_URL, 1000, 800));
    assert!(surface.click(Point::ORIGIN).unwrap().is_some());
}

#[test]
fn test_click_creates_and_links_marker() {
    let (mut surface, client) = surface();
    let id = place(&mut surface, 120.0, 80.0);

    let marker = surface.markers().get(id).unwrap();
    assert!(marker.is_unfinished());
    assert_eq!(marker.position, Point::new(120.0, 80.0));
    assert_eq!(surface.selected(), Some(id));

    let updates = surface.poll_remote();
    assert_eq!(
        updates,
        vec![SyncUpdate::Linked {
            marker: id,
            remote: RemoteId(1)
        }]
    );
    assert_eq!(surface.markers().get(id).unwrap().remote_id, Some(RemoteId(1)));
    assert_eq!(client.records(EntityType::Annotation).len(), 1);
}

#[test]
fn test_click_in_wrong_mode() {
    let (mut surface, _) = surface();
    surface.change_mode(Mode::Measure);
    assert_eq!(
        surface.click(Point::ORIGIN),
        Err(AnnotatorError::invalid_mode("measure"))
    );

    surface.change_mode_named("freehand");
    assert_eq!(surface.mode(), Mode::Uninitialized);
    assert!(surface.click(Point::ORIGIN).is_err());
    assert!(surface.markers().is_empty());
}

#[test]
fn test_drag_guard_swallows_click() {
    let (mut surface, client) = surface();
    let id = place(&mut surface, 10.0, 10.0);
    surface.poll_remote();

    let t0 = Instant::now();
    surface.drag_end_at(id, Point::new(30.0, 40.0), t0).unwrap();
    assert_eq!(surface.markers().get(id).unwrap().position, Point::new(30.0, 40.0));
    assert_eq!(
        calls(&client, "update"),
        vec![json!({"id": 1, "position": {"x": 30.0, "y": 40.0}})]
    );

    assert_eq!(
        surface
            .click_at(Point::new(50.0, 50.0), t0 + Duration::from_millis(50))
            .unwrap(),
        None
    );
    assert!(
        surface
            .click_at(Point::new(50.0, 50.0), t0 + Duration::from_millis(150))
            .unwrap()
            .is_some()
    );
    assert_eq!(surface.markers().len(), 2);
}

#[test]
fn test_counting_mode_counters() {
    let client = InMemoryClient::new();
    let mut surface = surface_with(&client, config(Mode::Counting));
    assert_eq!(surface.click(Point::ORIGIN), Err(AnnotatorError::NoLabelSelected));

    surface.set_active_label(Some("tau"));
    let first = place(&mut surface, 5.0, 5.0);
    place(&mut surface, 50.0, 5.0);
    assert_eq!(surface.markers().counters().display("tau"), "2");
    assert_eq!(surface.markers().get(first).unwrap().label, "tau");

    surface.drain_render();
    surface.delete_marker(first);
    assert_eq!(surface.markers().counters().display("tau"), "1");
    assert!(surface.drain_render().contains(&RenderCommand::SetLabelCount {
        label: "tau".into(),
        text: "1".into()
    }));
}

#[test]
fn test_delete_is_idempotent() {
    let (mut surface, client) = surface();
    let id = place(&mut surface, 10.0, 10.0);
    place(&mut surface, 20.0, 20.0);
    surface.poll_remote();

    assert!(surface.delete_marker(id).is_some());
    let once = surface.markers().clone();
    assert!(surface.delete_marker(id).is_none());
    assert_eq!(surface.markers(), &once);
    assert_eq!(calls(&client, "delete").len(), 1);
}

#[test]
fn test_delete_by_label() {
    let (mut surface, _) = surface();
    let a = place(&mut surface, 10.0, 10.0);
    let b = place(&mut surface, 20.0, 20.0);
    let c = place(&mut surface, 30.0, 30.0);
    surface.relabel(a, "alpha").unwrap();
    surface.relabel(b, "beta").unwrap();
    surface.relabel(c, "alpha").unwrap();

    assert_eq!(surface.delete_by_label("alpha"), 2);
    assert_eq!(surface.markers().len(), 1);
    assert!(surface.markers().contains(b));
}

#[test]
fn test_traversal_and_auto_select() {
    let (mut surface, _) = surface();
    let a = place(&mut surface, 0.0, 0.0);
    let c = place(&mut surface, 0.0, 40.0);
    let b = place(&mut surface, 10.0, 0.0);

    surface.select(None).unwrap();
    assert_eq!(surface.select_next(true), Some(a));
    assert_eq!(surface.select_next(true), Some(b));
    assert_eq!(surface.select_next(true), Some(c));
    // Stays on the last marker.
    assert_eq!(surface.select_next(true), Some(c));

    // Labelling the selection moves on; deleting it selects its successor.
    surface.select(Some(a)).unwrap();
    assert_eq!(surface.label_selected("ε").unwrap(), Some(a));
    assert_eq!(surface.selected(), Some(b));
    surface.delete_marker(b);
    assert_eq!(surface.selected(), Some(c));

    assert_eq!(
        surface.select(Some(MarkerId::new(999))),
        Err(AnnotatorError::UnknownMarker(MarkerId::new(999)))
    );
}

#[test]
fn test_auto_traversal_off() {
    let client = InMemoryClient::new();
    let mut config = config(Mode::Transcription);
    config.preferences.auto_traversal = false;
    let mut surface = surface_with(&client, config);

    let a = place(&mut surface, 0.0, 0.0);
    place(&mut surface, 10.0, 0.0);
    surface.select(Some(a)).unwrap();
    surface.label_selected("x").unwrap();
    assert_eq!(surface.selected(), Some(a));

    surface.delete_marker(a);
    assert_eq!(surface.selected(), None);
}

#[test]
fn test_label_update_deferred_until_create_ack() {
    let client = InMemoryClient::deferred();
    let mut surface = surface_with(&client, config(Mode::Transcription));

    let id = place(&mut surface, 10.0, 10.0);
    surface.relabel(id, "α").unwrap();
    assert!(calls(&client, "update").is_empty());

    client.deliver();
    surface.poll_remote();
    assert_eq!(calls(&client, "update"), vec![json!({"id": 1, "label": "α"})]);
    assert_eq!(surface.markers().get(id).unwrap().remote_id, Some(RemoteId(1)));
}

#[test]
fn test_workspace_isolation() {
    let (mut surface, client) = surface();
    place(&mut surface, 10.0, 10.0);
    place(&mut surface, 20.0, 20.0);
    surface.pan_by(-40.0, -25.0);
    let before = surface.markers().clone();

    surface.switch_workspace(WorkspaceName::Practice);
    assert!(surface.markers().is_empty());
    assert_eq!(surface.viewport().pan_x, 0.0);
    // No practice task yet: edits are gated.
    assert_eq!(surface.click(Point::ORIGIN), Err(AnnotatorError::ImageNotReady));

    surface.switch_workspace(WorkspaceName::Required);
    assert_eq!(surface.markers(), &before);
    assert_eq!(surface.viewport().pan_x, -40.0);
    assert_eq!(surface.viewport().pan_y, -25.0);

    assert_eq!(
        client.events(),
        vec![
            TelemetryEvent::StateSwitch {
                destination: WorkspaceName::Practice
            },
            TelemetryEvent::StateSwitch {
                destination: WorkspaceName::Required
            },
        ]
    );
}

#[test]
fn test_unknown_workspace() {
    let (mut surface, _) = surface();
    assert_eq!(
        surface.switch_workspace_named("archive"),
        Err(AnnotatorError::UnknownWorkspace("archive".into()))
    );
    assert!(surface.switch_workspace_named("practice").is_ok());
    assert_eq!(surface.active_workspace(), WorkspaceName::Practice);
}

#[test]
fn test_practice_validation() {
    let (mut surface, client) = surface();
    surface.switch_workspace(WorkspaceName::Practice);
    surface.load_task(WorkspaceName::Practice, task(2, "oxy2-practice", PRACTICE_URL));
    assert!(surface.image_loaded(PRACTICE_URL, 1000, 800));

    let near = place(&mut surface, 12.0, 11.0);
    let far = place(&mut surface, 90.0, 90.0);

    let tally = surface.validate_practice();
    assert_eq!(
        tally,
        ScoreTally {
            true_positive: 1,
            false_positive: 1,
            false_negative: 1
        }
    );
    assert_eq!(surface.markers().get(near).unwrap().match_status, MatchStatus::TruePositive);
    assert_eq!(surface.markers().get(far).unwrap().match_status, MatchStatus::FalsePositive);

    let statuses: Vec<MatchStatus> = surface.overlays().iter().map(|o| o.match_status).collect();
    assert_eq!(statuses, vec![MatchStatus::TruePositive, MatchStatus::FalseNegative]);
    assert!(surface.overlays().iter().all(|o| o.is_known_annotation));

    assert_eq!(
        client.events().last(),
        Some(&TelemetryEvent::PracticePerformance { tally })
    );
}

#[test]
fn test_submit_refuses_empty() {
    let (mut surface, _) = surface();
    assert_eq!(surface.submit(), Err(AnnotatorError::NothingToSubmit));
}

#[test]
fn test_submit_scores_and_resets() {
    let (mut surface, client) = surface();
    place(&mut surface, 12.0, 11.0);
    surface.zoom_in();

    let tally = surface.submit().unwrap();
    assert_eq!(
        tally,
        Some(ScoreTally {
            true_positive: 1,
            false_positive: 0,
            false_negative: 1
        })
    );
    assert_eq!(
        client.events().last(),
        Some(&TelemetryEvent::RequiredPerformance {
            tally: tally.unwrap()
        })
    );

    let responses = client.records(EntityType::Response);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["content"].as_array().unwrap().len(), 1);
    assert!(responses[0].get("draft").is_none());

    assert!(surface.markers().is_empty());
    assert_eq!(surface.mode(), Mode::Uninitialized);
    assert_eq!(surface.viewport().zoom, 1.0);
}

#[test]
fn test_rotation_rebasis() {
    let (mut surface, _) = surface();
    let id = place(&mut surface, 100.0, 50.0);

    assert_eq!(surface.rotate_clockwise(), Rotation::Deg90);
    let marker = surface.markers().get(id).unwrap();
    assert_eq!(marker.position, Point::new(100.0, 50.0));
    let screen = surface.viewport().to_screen(marker.position);
    assert!(approx_eq(surface.viewport().to_logical(screen), Point::new(100.0, 50.0)));

    // A drag at 90° lands back on the same logical point.
    surface.drag_end(id, screen).unwrap();
    assert!(approx_eq(surface.markers().get(id).unwrap().position, Point::new(100.0, 50.0)));

    surface.rotate_clockwise();
    surface.rotate_clockwise();
    assert_eq!(surface.rotate_clockwise(), Rotation::Deg0);
    let position = surface.markers().get(id).unwrap().position;
    assert!(approx_eq(surface.viewport().to_screen(position), Point::new(100.0, 50.0)));
}

#[test]
fn test_zoom_steps_and_limits() {
    let (mut surface, _) = surface();
    for _ in 0..5 {
        surface.zoom_in();
    }
    assert_eq!(surface.viewport().zoom, 1.5);
    assert!(!surface.can_zoom_in());
    assert!(surface.can_zoom_out());

    for _ in 0..5 {
        surface.zoom_out();
    }
    assert_eq!(surface.viewport().zoom, 0.5);
    assert!(!surface.can_zoom_out());
}

#[test]
fn test_zoom_keeps_logical_positions() {
    let (mut surface, _) = surface();
    let id = place(&mut surface, 100.0, 60.0);
    surface.zoom_in();
    surface.drain_render();
    surface.zoom_in();

    let placed = surface.drain_render().into_iter().find_map(|c| match c {
        RenderCommand::PlaceMarker { id: placed, screen, .. } if placed == id => Some(screen),
        _ => None,
    });
    assert_eq!(placed, Some(Point::new(150.0, 90.0)));
    assert_eq!(surface.markers().get(id).unwrap().position, Point::new(100.0, 60.0));
}

#[test]
fn test_measurement_flow() {
    let (mut surface, _) = surface();
    surface.change_mode(Mode::Measure);

    let id = surface.begin_measurement(Region::Column, Point::ORIGIN).unwrap();
    assert!(matches!(
        surface.begin_measurement(Region::Column, Point::ORIGIN),
        Err(AnnotatorError::MeasurementInProgress(_))
    ));
    surface.update_measurement(id, Point::new(3.0, 4.0)).unwrap();
    let progress = surface.finish_measurement(id, Point::new(30.0, 40.0)).unwrap();
    assert_eq!(progress.length, 50);
    assert_eq!(surface.measurements().length(id), Some(50));

    // Zooming does not change the measured length.
    surface.zoom_in();
    assert_eq!(surface.measurements().length(id), Some(50));

    assert!(surface.remove_measurement(id).is_some());
    assert!(surface.remove_measurement(id).is_none());
}

#[test]
fn test_leaving_measure_cancels_pending() {
    let (mut surface, _) = surface();
    surface.change_mode(Mode::Measure);
    let id = surface.begin_measurement(Region::Top, Point::ORIGIN).unwrap();

    surface.change_mode(Mode::Transcription);
    assert!(surface.measurements().pending().is_none());
    assert!(surface.measurements().is_empty());
    assert_eq!(
        surface.update_measurement(id, Point::new(5.0, 5.0)),
        Err(AnnotatorError::UnknownMeasurement(id))
    );
}

#[test]
fn test_load_state_links_records() {
    let (mut surface, client) = surface();
    let records = vec![
        AnnotationRecord {
            id: Some(RemoteId(40)),
            label: Some("a".into()),
            position: Some(Point::new(5.0, 6.0)),
            updated_by: None,
        },
        AnnotationRecord::default().with_id(RemoteId(41)),
    ];
    assert_eq!(surface.load_state(&records), 1);

    let id = surface.markers().find_by_remote_id(RemoteId(40)).unwrap();
    surface.relabel(id, "b").unwrap();
    assert_eq!(calls(&client, "update"), vec![json!({"id": 40, "label": "b"})]);
}

#[test]
fn test_collaboration_events() {
    let client = InMemoryClient::new();
    let mut config = config(Mode::Transcription);
    config.collaboration.active = true;
    config.collaboration.actor = ActorId(7);
    let mut surface = surface_with(&client, config);

    let save = |actor: u64, x: f32| AnnotationRecord {
        id: Some(RemoteId(90)),
        label: Some("tau".into()),
        position: Some(Point::new(x, 20.0)),
        updated_by: Some(ActorId(actor)),
    };

    surface.handle_interface_update_save(save(3, 10.0));
    let id = surface.markers().find_by_remote_id(RemoteId(90)).unwrap();
    assert!(
        surface
            .pending_render()
            .iter()
            .any(|c| matches!(c, RenderCommand::FlashMapMarker { .. }))
    );

    // Our own echo is dropped, another actor's move applies.
    assert_eq!(surface.handle_interface_update_save(save(7, 99.0)), CollabAction::Ignore);
    surface.handle_interface_update_save(save(3, 15.0));
    assert_eq!(surface.markers().len(), 1);
    assert_eq!(surface.markers().get(id).unwrap().position, Point::new(15.0, 20.0));

    surface.handle_interface_update_delete(RemoteId(90));
    assert!(surface.markers().is_empty());
    surface.handle_interface_update_delete(RemoteId(90));
    assert!(client.calls().is_empty());
}

#[test]
fn test_task_from_queue() {
    let client = InMemoryClient::new();
    let mut surface = AnnotationSurface::new(config(Mode::Transcription), Box::new(client.clone()), ground_truth());
    client.enqueue_task("practice", task(5, "oxy2-practice", PRACTICE_URL));

    surface.switch_workspace(WorkspaceName::Practice);
    surface.request_task(WorkspaceName::Practice);
    surface.poll_remote();

    assert_eq!(surface.workspaces().task().map(|t| t.id), Some(RemoteId(5)));
    assert!(surface.image_loaded(PRACTICE_URL, 400, 300));
    assert!(surface.workspaces().is_ready());
}

#[test]
fn test_draft_autosave() {
    let (mut surface, client) = surface();
    let now = Instant::now();
    assert!(!surface.tick_at(now));

    place(&mut surface, 10.0, 10.0);
    assert!(surface.tick_at(now + Duration::from_secs(5)));
    assert!(!surface.tick_at(now + Duration::from_secs(6)));

    let responses = client.records(EntityType::Response);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["draft"], json!(true));
}

#[test]
fn test_reset_surface() {
    let client = InMemoryClient::new();
    let mut surface = surface_with(&client, config(Mode::Counting));
    surface.set_active_label(Some("tau"));
    place(&mut surface, 10.0, 10.0);
    surface.rotate_clockwise();
    surface.drain_render();

    surface.reset_surface();
    assert!(surface.markers().is_empty());
    assert_eq!(surface.selected(), None);
    assert_eq!(surface.mode(), Mode::Uninitialized);
    assert_eq!(surface.viewport().rotation, Rotation::Deg0);
    assert_eq!(surface.markers().counters().display("tau"), "?");
    assert!(surface.drain_render().contains(&RenderCommand::SetLabelCount {
        label: "tau".into(),
        text: "?".into()
    }));
}

#[test]
fn test_reveal_and_minimap() {
    let (mut surface, _) = surface();
    surface.set_viewer_size(400.0, 300.0);
    let id = place(&mut surface, 900.0, 100.0);

    let delta = surface.reveal_marker(id).unwrap();
    assert_eq!(delta, Point::new(-600.0, 0.0));
    assert_eq!(surface.viewport().pan_x, -600.0);
    assert_eq!(surface.reveal_marker(id), None);

    // 1000x800 fits the map as 180x144.
    let rect = surface.minimap_location().unwrap();
    assert!((rect.left - 108.0).abs() < EPSILON);
    assert!((rect.width - 72.0).abs() < EPSILON);
}

#[test]
fn test_create_ack_reaches_switched_out_marker() {
    let client = InMemoryClient::deferred();
    let mut surface = surface_with(&client, config(Mode::Transcription));
    let id = place(&mut surface, 10.0, 10.0);

    surface.switch_workspace(WorkspaceName::Practice);
    client.deliver();
    surface.poll_remote();

    surface.switch_workspace(WorkspaceName::Required);
    assert_eq!(surface.markers().get(id).unwrap().remote_id, Some(RemoteId(1)));
}

#[test]
fn test_submit_keeps_other_workspace_links() {
    let (mut surface, client) = surface();
    let id = place(&mut surface, 10.0, 10.0);
    surface.poll_remote();

    surface.switch_workspace(WorkspaceName::Practice);
    surface.load_task(WorkspaceName::Practice, task(2, "oxy2-practice", PRACTICE_URL));
    assert!(surface.image_loaded(PRACTICE_URL, 1000, 800));
    place(&mut surface, 30.0, 30.0);
    surface.submit().unwrap();
    surface.poll_remote();

    surface.switch_workspace(WorkspaceName::Required);
    assert!(surface.image_loaded(IMAGE_URL, 1000, 800));
    surface.drag_end(id, Point::new(40.0, 40.0)).unwrap();
    assert_eq!(
        calls(&client, "update"),
        vec![json!({"id": 1, "position": {"x": 40.0, "y": 40.0}})]
    );
}

#[test]
fn test_stale_image_after_open_is_ignored() {
    let (mut surface, _) = surface();
    assert!(!surface.image_loaded("https://images.example/stale.jpg", 10, 10));
    assert_eq!(surface.viewport().image_width, 1000.0);
    assert_eq!(surface.viewport().image_height, 800.0);
    assert!(surface.click(Point::new(5.0, 5.0)).unwrap().is_some());
}

#[test]
fn test_submit_requests_next_task() {
    let client = InMemoryClient::new();
    client.insert_record(EntityType::TaskMember, json!({"id": 70, "seen_all": false}));
    client.insert_record(EntityType::TaskSession, json!({"id": 60}));
    client.enqueue_task("required", task(2, "oxy3-required", PRACTICE_URL));
    let mut config = config(Mode::Transcription);
    config.session.task_member = Some(RemoteId(70));
    config.session.task_session = Some(RemoteId(60));
    let mut surface = surface_with(&client, config);

    place(&mut surface, 10.0, 10.0);
    surface.submit().unwrap();
    let updates = surface.poll_remote();
    assert!(
        updates
            .iter()
            .any(|u| matches!(u, SyncUpdate::TaskReady { task, .. } if task.id == RemoteId(2)))
    );
    assert_eq!(surface.workspaces().task().map(|t| t.id), Some(RemoteId(2)));
    assert_eq!(client.records(EntityType::TaskSession)[0]["data"]["id"], 2);
    assert!(surface.image_loaded(PRACTICE_URL, 500, 500));

    surface.change_mode(Mode::Transcription);
    place(&mut surface, 20.0, 20.0);
    surface.submit().unwrap();
    let updates = surface.poll_remote();
    assert!(updates.contains(&SyncUpdate::QueueExhausted(WorkspaceName::Required)));
    assert!(surface.drain_render().contains(&RenderCommand::QueueExhausted {
        workspace: WorkspaceName::Required
    }));
    assert_eq!(
        client.records(EntityType::TaskMember),
        vec![json!({"id": 70, "seen_all": true})]
    );
    assert_eq!(surface.remote_failures(), 0);
}

#[test]
fn test_practice_submit_fetches_nothing() {
    let (mut surface, client) = surface();
    surface.switch_workspace(WorkspaceName::Practice);
    surface.load_task(WorkspaceName::Practice, task(2, "oxy2-practice", PRACTICE_URL));
    assert!(surface.image_loaded(PRACTICE_URL, 1000, 800));
    place(&mut surface, 30.0, 30.0);
    surface.submit().unwrap();
    assert!(client.calls().iter().all(|c| c.operation != "get_next_task"));
}

#[test]
fn test_collab_delete_updates_count() {
    let client = InMemoryClient::new();
    let mut config = config(Mode::Counting);
    config.collaboration.active = true;
    config.collaboration.actor = ActorId(7);
    let mut surface = surface_with(&client, config);
    surface.set_active_label(Some("tau"));
    place(&mut surface, 5.0, 5.0);
    surface.poll_remote();
    surface.drain_render();

    surface.handle_interface_update_delete(RemoteId(1));
    assert!(surface.markers().is_empty());
    assert!(surface.drain_render().contains(&RenderCommand::SetLabelCount {
        label: "tau".into(),
        text: "0".into()
    }));
}

#[test]
fn test_delete_by_label_keeps_counts() {
    let client = InMemoryClient::new();
    let mut surface = surface_with(&client, config(Mode::Counting));
    surface.set_active_label(Some("beta"));
    let beta = place(&mut surface, 5.0, 5.0);
    surface.delete_marker(beta);
    surface.set_active_label(Some("tau"));
    place(&mut surface, 10.0, 10.0);
    place(&mut surface, 20.0, 20.0);

    assert_eq!(surface.delete_by_label("tau"), 2);
    assert_eq!(surface.markers().counters().display("tau"), "0");
    assert_eq!(surface.markers().counters().display("beta"), "0");
}
