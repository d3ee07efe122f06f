//! The annotation surface.
//!
//! [`AnnotationSurface`] owns every component and is the only thing input
//! handlers talk to. Each handler runs to completion on the caller's thread:
//! it gates the input on the current mode and image state, converts screen
//! coordinates, mutates the stores, hands the remote call to the sync layer
//! and queues render commands. Remote completions are applied later by
//! [`AnnotationSurface::poll_remote`].

#[cfg(test)]
mod tests;

use serde_json::Value;
use std::time::Duration;
use web_time::Instant;

use crate::autosave::DraftSaver;
use crate::collab::{CollabAction, CollabEvent, CollabFilter};
use crate::config::AnnotatorConfig;
use crate::error::{AnnotatorError, Result};
use crate::geometry::{Point, Rotation, Viewport, ZoomLimits};
use crate::ground_truth::{GroundTruth, KnownAnnotation};
use crate::minimap::{self, MapRect, MiniMap};
use crate::mode::{Mode, ModeMachine, ModeTransition, PointerTarget};
use crate::model::{
    IdGenerator, MatchStatus, Marker, MarkerId, Measurement, MeasurementId, Region, RemoteId, SequentialIds,
};
use crate::remote::{AnnotationPatch, AnnotationRecord, RemoteClient, ResponseRecord, Task, TelemetryEvent};
use crate::render::{RenderCommand, RenderQueue};
use crate::scoring::{ScoreTally, match_greedy, score};
use crate::store::{MarkerStore, MeasurementProgress, MeasurementStore};
use crate::sync::{RemoteSync, SyncUpdate};
use crate::workspace::{SwitchOutcome, WorkspaceName, Workspaces};

pub struct AnnotationSurface {
    config: AnnotatorConfig,
    zoom_limits: ZoomLimits,
    mode: ModeMachine,
    viewport: Viewport,
    markers: MarkerStore,
    measurements: MeasurementStore,
    workspaces: Workspaces,
    ground_truth: GroundTruth,
    /// Ground-truth rings shown after practice validation.
    overlays: Vec<Marker>,
    selected: Option<MarkerId>,
    /// Label applied to clicks in counting mode.
    active_label: Option<String>,
    sync: RemoteSync,
    collab: CollabFilter,
    drafts: DraftSaver,
    minimap: Option<MiniMap>,
    /// Size of the scrollable viewer, once the host reports it.
    viewer: Option<(f32, f32)>,
    last_drag_end: Option<Instant>,
    ids: Box<dyn IdGenerator>,
    render: RenderQueue,
}

impl AnnotationSurface {
    pub fn new(config: AnnotatorConfig, client: Box<dyn RemoteClient>, ground_truth: GroundTruth) -> Self {
        Self::with_ids(config, client, ground_truth, Box::new(SequentialIds::new()))
    }

    /// Create a surface drawing local ids from `ids`.
    pub fn with_ids(
        config: AnnotatorConfig,
        client: Box<dyn RemoteClient>,
        ground_truth: GroundTruth,
        ids: Box<dyn IdGenerator>,
    ) -> Self {
        let mut mode = ModeMachine::new();
        mode.change(config.preferences.initial_mode);

        Self {
            zoom_limits: config.viewport.zoom_limits(),
            mode,
            viewport: Viewport::default(),
            markers: MarkerStore::new(),
            measurements: MeasurementStore::new(config.pagination.limits(), config.pagination.show_last),
            workspaces: Workspaces::new(),
            ground_truth,
            overlays: Vec::new(),
            selected: None,
            active_label: None,
            sync: RemoteSync::new(client),
            collab: CollabFilter::new(config.collaboration.active, config.collaboration.actor),
            drafts: DraftSaver::from_config(&config.autosave),
            minimap: None,
            viewer: None,
            last_drag_end: None,
            ids,
            render: RenderQueue::new(),
            config,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode.current()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    pub fn measurements(&self) -> &MeasurementStore {
        &self.measurements
    }

    pub fn workspaces(&self) -> &Workspaces {
        &self.workspaces
    }

    pub fn active_workspace(&self) -> WorkspaceName {
        self.workspaces.active()
    }

    pub fn overlays(&self) -> &[Marker] {
        &self.overlays
    }

    pub fn selected(&self) -> Option<MarkerId> {
        self.selected
    }

    pub fn active_label(&self) -> Option<&str> {
        self.active_label.as_deref()
    }

    pub fn minimap(&self) -> Option<&MiniMap> {
        self.minimap.as_ref()
    }

    /// Remote calls that have failed so far.
    pub fn remote_failures(&self) -> usize {
        self.sync.failures()
    }

    /// Render commands queued since the last drain.
    pub fn drain_render(&mut self) -> Vec<RenderCommand> {
        self.render.drain()
    }

    pub fn pending_render(&self) -> &[RenderCommand] {
        self.render.pending()
    }

    // ========================================================================
    // Mode
    // ========================================================================

    pub fn change_mode(&mut self, target: Mode) -> ModeTransition {
        let transition = self.mode.change(target);
        self.apply_transition(transition);
        transition
    }

    /// Change mode by name. Unknown names leave the surface uninitialized.
    pub fn change_mode_named(&mut self, name: &str) -> ModeTransition {
        let transition = self.mode.change_named(name);
        self.apply_transition(transition);
        transition
    }

    fn apply_transition(&mut self, transition: ModeTransition) {
        if transition.leaves_measure() {
            self.cancel_measurement();
        }
        if transition.changed() {
            self.render.push(RenderCommand::SetMarkersVisible {
                visible: transition.markers_visible(),
            });
            self.render.push(RenderCommand::SetMeasurementsVisible {
                visible: transition.measurements_visible(),
            });
        }
    }

    /// Pick the label used for counting-mode clicks.
    pub fn set_active_label(&mut self, label: Option<&str>) {
        self.active_label = label.filter(|l| !l.is_empty()).map(str::to_owned);
    }

    // ========================================================================
    // Markers
    // ========================================================================

    pub fn click(&mut self, screen: Point) -> Result<Option<MarkerId>> {
        self.click_at(screen, Instant::now())
    }

    /// Handle a pointer click at `now`.
    ///
    /// Returns `Ok(None)` when the click is swallowed by the drag guard.
    pub fn click_at(&mut self, screen: Point, now: Instant) -> Result<Option<MarkerId>> {
        if self.within_drag_guard(now) {
            log::debug!("Click right after a drag ignored");
            return Ok(None);
        }
        self.ensure_ready()?;

        let mode = self.mode.current();
        if mode.pointer_target() != PointerTarget::Markers {
            return Err(AnnotatorError::invalid_mode(mode.name()));
        }
        let label = match mode {
            Mode::Counting => self.active_label.clone(),
            _ => None,
        };

        let id = self
            .markers
            .create(mode, screen, label.as_deref(), &self.viewport, self.ids.as_mut())?;
        if let Some(marker) = self.markers.get(id) {
            self.sync.marker_created(marker);
            self.render
                .push(place_command(&self.viewport, self.config.viewport.marker_size, marker));
        }
        if let Some(label) = label {
            self.push_label_count(&label);
        }
        self.set_selection(Some(id));
        self.drafts.mark_dirty_at(now);
        Ok(Some(id))
    }

    fn within_drag_guard(&self, now: Instant) -> bool {
        let guard = Duration::from_millis(self.config.drag_click_guard_ms);
        self.last_drag_end
            .is_some_and(|ended| now.saturating_duration_since(ended) < guard)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.workspaces.is_ready() {
            Ok(())
        } else {
            Err(AnnotatorError::ImageNotReady)
        }
    }

    pub fn drag_end(&mut self, id: MarkerId, screen: Point) -> Result<()> {
        self.drag_end_at(id, screen, Instant::now())
    }

    /// Commit a marker drag at `now`.
    pub fn drag_end_at(&mut self, id: MarkerId, screen: Point, now: Instant) -> Result<()> {
        self.ensure_ready()?;
        let marker = self.markers.move_to(id, screen, &self.viewport)?;
        let position = marker.position;
        let command = place_command(&self.viewport, self.config.viewport.marker_size, marker);
        self.render.push(command);

        self.sync.marker_changed(id, AnnotationPatch::Position(position));
        self.last_drag_end = Some(now);
        self.drafts.mark_dirty_at(now);
        Ok(())
    }

    pub fn relabel(&mut self, id: MarkerId, label: &str) -> Result<()> {
        let marker = self.markers.relabel(id, label)?;
        let command = place_command(&self.viewport, self.config.viewport.marker_size, marker);
        self.render.push(command);

        self.sync.marker_changed(id, AnnotationPatch::Label(label.to_string()));
        self.drafts.mark_dirty();
        if self.selected == Some(id) {
            self.select_next(false);
        }
        Ok(())
    }

    /// Give the selected marker a label. Returns the relabelled marker, or
    /// `None` if nothing is selected.
    pub fn label_selected(&mut self, label: &str) -> Result<Option<MarkerId>> {
        let Some(id) = self.selected else {
            log::warn!("No marker selected, label '{}' not applied", label);
            return Ok(None);
        };
        self.relabel(id, label)?;
        Ok(Some(id))
    }

    /// Delete a marker. Deleting an absent marker is a no-op.
    pub fn delete_marker(&mut self, id: MarkerId) -> Option<Marker> {
        let was_selected = self.selected == Some(id);
        let successor = if was_selected && self.config.preferences.auto_traversal {
            self.markers
                .next_in_traversal(Some(id), &self.viewport, self.config.traversal.line_height)
                .filter(|next| *next != id)
        } else {
            None
        };

        let removed = self.markers.delete(id, self.mode.current())?;
        self.sync.marker_deleted(id);
        self.render.push(RenderCommand::RemoveMarker { id });
        if self.mode.current() == Mode::Counting {
            self.push_label_count(&removed.label);
        }
        if was_selected {
            self.set_selection(successor);
        }
        self.drafts.mark_dirty();
        Some(removed)
    }

    /// Delete every marker carrying `label` (the label definition was
    /// removed). Returns how many went.
    pub fn delete_by_label(&mut self, label: &str) -> usize {
        let removed = self.markers.delete_by_label(label, self.mode.current());
        for marker in &removed {
            self.sync.marker_deleted(marker.id);
            self.render.push(RenderCommand::RemoveMarker { id: marker.id });
            if self.selected == Some(marker.id) {
                self.set_selection(None);
            }
        }
        if !removed.is_empty() {
            if self.mode.current() == Mode::Counting {
                self.push_label_count(label);
            }
            self.drafts.mark_dirty();
        }
        removed.len()
    }

    /// Select a marker, or clear the selection with `None`.
    pub fn select(&mut self, id: Option<MarkerId>) -> Result<()> {
        if let Some(missing) = id.filter(|id| !self.markers.contains(*id)) {
            return Err(AnnotatorError::UnknownMarker(missing));
        }
        self.set_selection(id);
        Ok(())
    }

    /// Move the selection along the traversal order.
    ///
    /// Without `force` this only happens when auto-traversal is enabled.
    pub fn select_next(&mut self, force: bool) -> Option<MarkerId> {
        if !force && !self.config.preferences.auto_traversal {
            return self.selected;
        }
        let next = self
            .markers
            .next_in_traversal(self.selected, &self.viewport, self.config.traversal.line_height);
        self.set_selection(next);
        next
    }

    fn set_selection(&mut self, id: Option<MarkerId>) {
        if self.selected != id {
            self.selected = id;
            self.render.push(RenderCommand::Select { id });
        }
    }

    fn push_label_count(&mut self, label: &str) {
        let text = self.markers.counters().display(label);
        self.render.push(RenderCommand::SetLabelCount {
            label: label.to_string(),
            text,
        });
    }

    // ========================================================================
    // Measurements
    // ========================================================================

    pub fn begin_measurement(&mut self, region: Region, screen: Point) -> Result<MeasurementId> {
        self.ensure_ready()?;
        let mode = self.mode.current();
        if mode.pointer_target() != PointerTarget::Measurements {
            return Err(AnnotatorError::invalid_mode(mode.name()));
        }
        self.measurements
            .begin(region, screen, &self.viewport, self.ids.as_mut())
    }

    pub fn update_measurement(&mut self, id: MeasurementId, screen: Point) -> Result<MeasurementProgress> {
        let progress = self.measurements.update(id, screen, &self.viewport)?;
        if let Some(pending) = self.measurements.pending() {
            self.render.push(measurement_command(pending));
        }
        Ok(progress)
    }

    pub fn finish_measurement(&mut self, id: MeasurementId, screen: Point) -> Result<MeasurementProgress> {
        let progress = self.measurements.finish(id, screen, &self.viewport)?;
        if let Some(measurement) = self.measurements.get(id) {
            let command = measurement_command(measurement);
            let paginated = measurement.region.is_paginated();
            self.render.push(command);
            if paginated {
                self.push_page();
            }
        }
        Ok(progress)
    }

    /// Delete a committed measurement. Absent ids are a no-op.
    pub fn remove_measurement(&mut self, id: MeasurementId) -> Option<Measurement> {
        let removed = self.measurements.remove(id)?;
        self.render.push(RenderCommand::RemoveMeasurement { id });
        if removed.region.is_paginated() {
            self.push_page();
        }
        Some(removed)
    }

    pub fn go_to_page(&mut self, page: usize) -> Result<()> {
        self.measurements.go_to_page(page)?;
        self.push_page();
        Ok(())
    }

    fn cancel_measurement(&mut self) {
        if let Some(id) = self.measurements.cancel() {
            self.render.push(RenderCommand::RemoveMeasurement { id });
        }
    }

    fn push_page(&mut self) {
        let strip = self.measurements.strip();
        self.render.push(RenderCommand::ShowPage {
            page: strip.current_page(),
            total: strip.page_count(),
        });
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    /// Zoom in one step. Returns the new zoom factor.
    pub fn zoom_in(&mut self) -> f32 {
        let previous = self.viewport.zoom_in(&self.zoom_limits);
        self.after_zoom(previous);
        self.viewport.zoom
    }

    /// Zoom out one step. Returns the new zoom factor.
    pub fn zoom_out(&mut self) -> f32 {
        let previous = self.viewport.zoom_out(&self.zoom_limits);
        self.after_zoom(previous);
        self.viewport.zoom
    }

    pub fn can_zoom_in(&self) -> bool {
        self.viewport.zoom < self.zoom_limits.max
    }

    pub fn can_zoom_out(&self) -> bool {
        self.viewport.zoom > self.zoom_limits.min
    }

    fn after_zoom(&mut self, previous: f32) {
        let zoom = self.viewport.zoom;
        if (zoom - previous).abs() < f32::EPSILON {
            return;
        }
        log::debug!("🔍 Zoom {:.2} -> {:.2}", previous, zoom);
        self.measurements.rescale(previous, zoom);
        self.push_transform();
        self.reproject();
    }

    /// Rotate the image 90° clockwise. Returns the new rotation.
    pub fn rotate_clockwise(&mut self) -> Rotation {
        let before = self.viewport;
        self.viewport.rotate_clockwise();
        self.measurements.rotate(Rotation::Deg90, &before);
        log::debug!("↻ Rotation {}° -> {}°", before.rotation.degrees(), self.viewport.rotation.degrees());
        self.push_transform();
        self.reproject();
        self.viewport.rotation
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.viewport.pan_by(dx, dy);
        self.reproject();
    }

    /// Size of the scrollable viewer, used for the mini-map and reveal.
    pub fn set_viewer_size(&mut self, width: f32, height: f32) {
        self.viewer = Some((width, height));
    }

    /// Pan so a marker sits comfortably inside the viewer. Returns the pan
    /// delta applied, if any.
    pub fn reveal_marker(&mut self, id: MarkerId) -> Option<Point> {
        let viewer = self.viewer?;
        let target = self.viewport.to_canvas(self.markers.get(id)?.position);
        let pan = Point::new(self.viewport.pan_x, self.viewport.pan_y);
        let delta = minimap::reveal(target, pan, viewer)?;
        self.pan_by(delta.x, delta.y);
        self.push_pan();
        Some(delta)
    }

    /// Centre the viewer on the point clicked in the mini-map.
    pub fn minimap_click(&mut self, map: Point) -> Option<Point> {
        let (viewer_w, viewer_h) = self.viewer?;
        let displayed_width = self.viewport.displayed_size().0;
        let canvas = self.minimap.as_ref()?.map_to_canvas(map, displayed_width);
        let pan = Point::new(viewer_w / 2.0 - canvas.x, viewer_h / 2.0 - canvas.y);
        self.pan_by(pan.x - self.viewport.pan_x, pan.y - self.viewport.pan_y);
        self.push_pan();
        Some(pan)
    }

    /// Outline of the visible region in mini-map pixels.
    pub fn minimap_location(&self) -> Option<MapRect> {
        let viewer = self.viewer?;
        let pan = Point::new(self.viewport.pan_x, self.viewport.pan_y);
        Some(
            self.minimap
                .as_ref()?
                .location(pan, viewer, self.viewport.displayed_size().0),
        )
    }

    fn push_pan(&mut self) {
        self.render.push(RenderCommand::PanTo {
            pan: Point::new(self.viewport.pan_x, self.viewport.pan_y),
        });
    }

    fn push_transform(&mut self) {
        let (width, height) = self.viewport.displayed_size();
        self.render.push(RenderCommand::SetTransform {
            zoom: self.viewport.zoom,
            degrees: self.viewport.rotation.degrees(),
            width,
            height,
            margin: self.viewport.rotation_margin(),
        });
        self.render.push(RenderCommand::SetZoomControls {
            can_zoom_in: self.can_zoom_in(),
            can_zoom_out: self.can_zoom_out(),
        });
    }

    /// Re-send every projection for the current viewport.
    fn reproject(&mut self) {
        let size = self.config.viewport.marker_size;
        for marker in self.markers.iter() {
            self.render.push(place_command(&self.viewport, size, marker));
        }
        for measurement in self.measurements.iter() {
            self.render.push(measurement_command(measurement));
        }
        if !self.overlays.is_empty() {
            self.render.push(RenderCommand::ClearOverlays);
            for overlay in &self.overlays {
                self.render.push(overlay_command(&self.viewport, size, overlay));
            }
        }
    }

    // ========================================================================
    // Workspaces and tasks
    // ========================================================================

    /// Swap to the other workspace's markers, pan and task image.
    pub fn switch_workspace(&mut self, target: WorkspaceName) -> SwitchOutcome {
        self.cancel_measurement();
        self.clear_overlays();
        self.set_selection(None);

        let outcome = self
            .workspaces
            .switch_to(target, &mut self.markers, &mut self.viewport);
        self.sync
            .emit(&TelemetryEvent::StateSwitch { destination: target });

        self.render.push(RenderCommand::ClearMarkers);
        if let Some(task) = &outcome.task {
            self.render.push(RenderCommand::LoadImage { url: task.url.clone() });
        }
        self.push_transform();
        self.reproject();
        if self.mode.current() == Mode::Counting {
            self.push_all_label_counts();
        }
        outcome
    }

    pub fn switch_workspace_named(&mut self, name: &str) -> Result<SwitchOutcome> {
        let target = name.parse::<WorkspaceName>()?;
        Ok(self.switch_workspace(target))
    }

    /// Ask the server for the next task of a workspace's queue.
    pub fn request_task(&mut self, workspace: WorkspaceName) {
        self.sync.fetch_task(workspace);
    }

    /// Assign a task to a workspace. For the active workspace the image
    /// starts loading and edits wait for [`AnnotationSurface::image_loaded`].
    pub fn load_task(&mut self, workspace: WorkspaceName, task: Task) {
        let url = task.url.clone();
        self.workspaces.set_task(workspace, task);
        if workspace == self.workspaces.active() {
            self.minimap = None;
            self.render.push(RenderCommand::LoadImage { url });
        }
    }

    /// A queue had no task left to hand out.
    ///
    /// An empty required queue means the participant has seen every task,
    /// which is recorded on their task membership when one is configured.
    fn queue_exhausted(&mut self, workspace: WorkspaceName) {
        log::info!("📭 No {} tasks left", workspace);
        self.render.push(RenderCommand::QueueExhausted { workspace });
        if workspace != WorkspaceName::Required {
            return;
        }
        match self.config.session.task_member {
            Some(member) => self.sync.mark_seen_all(member),
            None => log::debug!("No task membership configured, seen_all not recorded"),
        }
    }

    /// The host finished loading an image. Stale loads are ignored; returns
    /// whether the surface now accepts edits.
    pub fn image_loaded(&mut self, url: &str, width: u32, height: u32) -> bool {
        if !self.workspaces.image_loaded(url) {
            return false;
        }
        self.viewport.image_width = width as f32;
        self.viewport.image_height = height as f32;
        self.minimap = Some(MiniMap::new(width, height));
        log::debug!("🖼 Image ready: {} ({}x{})", url, width, height);
        self.push_transform();
        self.reproject();
        true
    }

    // ========================================================================
    // Validation and submission
    // ========================================================================

    fn task_truth(&self) -> Option<Vec<KnownAnnotation>> {
        let task = self.workspaces.task()?;
        self.ground_truth.for_task(&task.name).map(<[_]>::to_vec)
    }

    /// Score the visible markers against the task's ground truth.
    ///
    /// Known annotations are shown as overlays tagged found or missed, and
    /// markers that matched nothing are flagged as false positives.
    pub fn validate_practice(&mut self) -> ScoreTally {
        self.clear_overlays();
        let truth = self.task_truth().unwrap_or_default();
        let truth_points: Vec<Point> = truth.iter().map(KnownAnnotation::position).collect();
        let user: Vec<(MarkerId, Point)> = self.markers.iter().map(|m| (m.id, m.position)).collect();
        let user_points: Vec<Point> = user.iter().map(|(_, p)| *p).collect();

        let matching = match_greedy(&user_points, &truth_points, self.config.scoring.match_threshold);
        for (known, claim) in truth.iter().zip(&matching.claimed_by) {
            let status = match claim {
                Some(idx) => {
                    self.markers.set_match_status(user[*idx].0, MatchStatus::TruePositive);
                    MatchStatus::TruePositive
                }
                None => MatchStatus::FalseNegative,
            };
            let id = self.ids.next_marker_id();
            self.overlays
                .push(Marker::known_annotation(id, known.position(), known.label.clone(), status));
        }
        for &idx in &matching.unclaimed {
            self.markers.set_match_status(user[idx].0, MatchStatus::FalsePositive);
        }

        let tally = matching.tally();
        log::info!(
            "🎯 Practice validation: tp={} fp={} fn={}",
            tally.true_positive,
            tally.false_positive,
            tally.false_negative
        );
        self.sync.emit(&TelemetryEvent::PracticePerformance { tally });
        self.reproject();
        tally
    }

    /// Submit the active workspace's markers as a `response`.
    ///
    /// In the required workspace the markers are scored first when ground
    /// truth is known. The surface is reset afterwards, and a required
    /// submission asks its queue for the next task.
    pub fn submit(&mut self) -> Result<Option<ScoreTally>> {
        if self.markers.is_empty() {
            return Err(AnnotatorError::NothingToSubmit);
        }

        let workspace = self.workspaces.active();
        let truth = match workspace {
            WorkspaceName::Required => self.task_truth(),
            WorkspaceName::Practice => None,
        };
        let tally = truth.map(|truth| {
            let truth_points: Vec<Point> = truth.iter().map(KnownAnnotation::position).collect();
            let user_points: Vec<Point> = self.markers.iter().map(|m| m.position).collect();
            score(&user_points, &truth_points, self.config.scoring.match_threshold)
        });
        if let Some(tally) = tally {
            self.sync.emit(&TelemetryEvent::RequiredPerformance { tally });
        }

        let content: Vec<Marker> = self.markers.iter().cloned().collect();
        log::info!("📤 Submitting {} markers from {}", content.len(), workspace);
        self.sync
            .save_response(&ResponseRecord { content, draft: false });
        self.reset_surface();
        if workspace == WorkspaceName::Required {
            self.sync.fetch_task(WorkspaceName::Required);
        }
        Ok(tally)
    }

    fn clear_overlays(&mut self) {
        if !self.overlays.is_empty() {
            self.overlays.clear();
            self.render.push(RenderCommand::ClearOverlays);
        }
    }

    // ========================================================================
    // Remote state and collaboration
    // ========================================================================

    /// Ask the server for stored annotations matching `filter`; they are
    /// loaded when the listing is polled.
    pub fn request_state(&mut self, filter: Value) {
        self.sync.list_annotations(filter);
    }

    /// Create (or update) markers from stored annotation records. Records
    /// without an id or position are skipped. Returns how many applied.
    pub fn load_state(&mut self, records: &[AnnotationRecord]) -> usize {
        let mut applied = 0;
        for record in records {
            let (Some(remote), Some(position)) = (record.id, record.position) else {
                log::warn!("Skipping annotation record without id or position");
                continue;
            };
            self.upsert_remote(remote, record.label.as_deref().unwrap_or_default(), position);
            applied += 1;
        }
        if self.mode.current() == Mode::Counting {
            self.markers.recount();
            self.push_all_label_counts();
        }
        log::debug!("📥 Loaded {} annotations", applied);
        applied
    }

    fn upsert_remote(&mut self, remote: RemoteId, label: &str, position: Point) -> MarkerId {
        let marker = match self.markers.find_by_remote_id(remote).and_then(|id| self.markers.get(id)) {
            Some(existing) => {
                let mut marker = existing.clone();
                marker.position = position;
                marker.set_label(label);
                marker
            }
            None => Marker::new(self.ids.next_marker_id(), position, label, Rotation::Deg0).with_remote_id(remote),
        };
        let id = marker.id;
        self.render
            .push(place_command(&self.viewport, self.config.viewport.marker_size, &marker));
        self.markers.insert(marker);
        self.sync.marker_linked(id, remote);
        id
    }

    /// Apply an event from the collaboration transport.
    pub fn handle_collab(&mut self, event: &CollabEvent) -> CollabAction {
        let action = self.collab.plan(event);
        match &action {
            CollabAction::Upsert {
                remote,
                label,
                position,
            } => {
                self.upsert_remote(*remote, label, *position);
                if let Some(map) = &self.minimap {
                    self.render.push(RenderCommand::FlashMapMarker {
                        position: map.image_to_map(*position),
                    });
                }
            }
            CollabAction::Remove(remote) => {
                let found = self
                    .markers
                    .find_by_remote_id(*remote)
                    .and_then(|id| self.markers.delete(id, self.mode.current()));
                if let Some(removed) = found {
                    self.sync.forget(removed.id);
                    self.render.push(RenderCommand::RemoveMarker { id: removed.id });
                    if self.mode.current() == Mode::Counting {
                        self.push_label_count(&removed.label);
                    }
                    if self.selected == Some(removed.id) {
                        self.set_selection(None);
                    }
                }
            }
            CollabAction::Ignore => {}
        }
        action
    }

    /// Another participant saved an annotation.
    pub fn handle_interface_update_save(&mut self, annotation: AnnotationRecord) -> CollabAction {
        self.handle_collab(&CollabEvent::save(annotation))
    }

    /// Another participant deleted an annotation.
    pub fn handle_interface_update_delete(&mut self, remote: RemoteId) -> CollabAction {
        self.handle_collab(&CollabEvent::delete(remote))
    }

    /// Apply every remote completion that has arrived.
    pub fn poll_remote(&mut self) -> Vec<SyncUpdate> {
        let updates = self.sync.poll();
        for update in &updates {
            match update {
                SyncUpdate::Linked { marker, remote } => {
                    // The marker may have been switched out while its create was in flight.
                    let recorded = self.markers.set_remote_id(*marker, *remote)
                        || self.workspaces.set_remote_id(*marker, *remote);
                    if !recorded {
                        log::debug!("Marker {} is gone, remote {} not recorded", marker, remote);
                    }
                }
                SyncUpdate::TaskReady { workspace, task } => {
                    let session = self.config.session.task_session;
                    if let (WorkspaceName::Required, Some(session)) = (*workspace, session) {
                        self.sync.task_session_changed(session, task.id);
                    }
                    self.load_task(*workspace, task.clone());
                }
                SyncUpdate::QueueExhausted(workspace) => self.queue_exhausted(*workspace),
                SyncUpdate::StateListed(records) => {
                    self.load_state(records);
                }
                SyncUpdate::ResponseSaved(id) => log::debug!("Response {} stored", id),
            }
        }
        updates
    }

    // ========================================================================
    // Housekeeping
    // ========================================================================

    pub fn tick(&mut self) -> bool {
        self.tick_at(Instant::now())
    }

    /// Send a draft response if one is due. Returns whether one was sent.
    pub fn tick_at(&mut self, now: Instant) -> bool {
        if !self.drafts.should_save_at(now) {
            return false;
        }
        let content: Vec<Marker> = self.markers.iter().cloned().collect();
        log::trace!("💾 Draft with {} markers", content.len());
        self.sync
            .save_response(&ResponseRecord { content, draft: true });
        self.drafts.mark_saved_at(now);
        true
    }

    /// Clear markers, measurements, overlays and selection, reset the
    /// viewport and counters, and leave every mode.
    pub fn reset_surface(&mut self) {
        self.change_mode(Mode::Uninitialized);
        let labels: Vec<String> = self
            .markers
            .counters()
            .iter()
            .map(|(label, _)| label.to_string())
            .collect();

        for marker in self.markers.iter() {
            self.sync.forget(marker.id);
        }
        self.markers.clear();
        self.measurements.clear();
        self.clear_overlays();
        self.set_selection(None);
        self.viewport.reset();
        self.drafts.reset();
        self.last_drag_end = None;

        self.render.push(RenderCommand::ClearMarkers);
        for label in &labels {
            self.push_label_count(label);
        }
        self.push_transform();
        log::info!("🧹 Surface reset");
    }

    fn push_all_label_counts(&mut self) {
        let counts: Vec<(String, String)> = self
            .markers
            .counters()
            .iter()
            .map(|(label, _)| (label.to_string(), self.markers.counters().display(label)))
            .collect();
        for (label, text) in counts {
            self.render.push(RenderCommand::SetLabelCount { label, text });
        }
    }
}

fn place_command(viewport: &Viewport, marker_size: f32, marker: &Marker) -> RenderCommand {
    RenderCommand::PlaceMarker {
        id: marker.id,
        screen: viewport.to_screen(marker.position),
        size: marker_size * viewport.zoom,
        label: marker.label.clone(),
        unfinished: marker.is_unfinished(),
        status: marker.match_status,
    }
}

fn overlay_command(viewport: &Viewport, marker_size: f32, overlay: &Marker) -> RenderCommand {
    RenderCommand::ShowOverlay {
        screen: viewport.to_screen(overlay.position),
        size: marker_size * viewport.zoom,
        status: overlay.match_status,
    }
}

fn measurement_command(measurement: &Measurement) -> RenderCommand {
    RenderCommand::DrawMeasurement {
        id: measurement.id,
        start: measurement.canvas_start,
        end: measurement.canvas_end,
        label_position: measurement.label_position(),
        length: measurement.length(),
    }
}
