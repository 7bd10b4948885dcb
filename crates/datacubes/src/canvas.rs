//! The datacube canvas: every piece of state that does not live on the GPU.
//!
//! A [`Canvas`] receives datacube descriptors, positions and pointer input from the host,
//! keeps the [`Scene`] and the [`Camera`] up to date, steps all animations and records what
//! changed in its [`DirtyFlags`]. The [`crate::Renderer`] turns that state into frames and hands
//! the captured ID buffer back for picking.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

use datacubes_core::pick::object_id;
use datacubes_core::{
    DatacubeUpdate, DatacubesError, DebugView, DirtyFlags, IdBufferCapture, Options, PickResult,
    Result, SpringAnimation,
};
use datacubes_render::{Camera, MeshData};
use glam::{Vec2, Vec3};

use crate::assets::{LoadedMesh, MeshLoader};
use crate::interaction::{
    pick, AugmentedPointerEvent, Interaction, PointerEvent, PointerEventKind, PositionUpdate,
};
use crate::navigation::Navigation;
use crate::scene::Scene;

/// Subscribers of one outbound stream. Disconnected receivers are dropped on the next send.
struct Subscribers<T> {
    senders: Vec<Sender<T>>,
}

impl<T: Clone> Subscribers<T> {
    fn new() -> Self {
        Self { senders: Vec::new() }
    }

    fn subscribe(&mut self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.senders.push(tx);
        rx
    }

    fn emit(&mut self, event: &T) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// CPU-side state of the datacube canvas.
pub struct Canvas {
    options: Options,
    scene: Scene,
    camera: Camera,
    dirty: DirtyFlags,
    interaction: Interaction,
    navigation: Navigation,
    capture: Option<IdBufferCapture>,
    /// Datacube whose points are drawn into the ID target.
    hovered: Option<u32>,
    frame_size: (u32, u32),
    redraw: bool,
    focus_animation: Option<SpringAnimation<6>>,
    projection_animation: Option<SpringAnimation<1>>,
    position_updates: Subscribers<PositionUpdate>,
    pointer_events: Subscribers<AugmentedPointerEvent>,
    mesh_loader: MeshLoader,
    loaded_meshes: Vec<(u32, MeshData)>,
}

impl Canvas {
    /// Creates an empty canvas. Every dirty flag starts set.
    #[must_use]
    pub fn new(options: Options) -> Self {
        let camera = Camera::new(&options.camera);
        Self {
            options,
            scene: Scene::new(),
            camera,
            dirty: DirtyFlags::all(),
            interaction: Interaction::new(),
            navigation: Navigation::new(),
            capture: None,
            hovered: None,
            frame_size: (1, 1),
            redraw: true,
            focus_animation: None,
            projection_animation: None,
            position_updates: Subscribers::new(),
            pointer_events: Subscribers::new(),
            mesh_loader: MeshLoader::new(),
            loaded_meshes: Vec::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[must_use]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    #[must_use]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// Returns and clears the dirty flags.
    pub fn take_dirty(&mut self) -> DirtyFlags {
        let dirty = self.dirty;
        self.dirty.reset();
        dirty
    }

    #[must_use]
    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    #[must_use]
    pub fn is_gesture_active(&self) -> bool {
        self.interaction.is_active()
    }

    /// Object id of the datacube being dragged or resized.
    #[must_use]
    pub fn hidden_object(&self) -> Option<u32> {
        self.interaction.gesture().map(|g| object_id(g.datacube_id))
    }

    /// Object id whose points go into the ID target.
    #[must_use]
    pub fn hovered_object(&self) -> Option<u32> {
        self.hovered.map(object_id)
    }

    // Inbound API

    /// Merges a batch of datacube descriptors. Datacubes absent from the batch are deleted.
    ///
    /// Fails with [`DatacubesError::GestureActive`] while a drag or resize is in progress.
    pub fn set_datacubes(&mut self, updates: Vec<DatacubeUpdate>) -> Result<()> {
        if self.interaction.is_active() {
            log::debug!("rejected {} datacube updates during a gesture", updates.len());
            return Err(DatacubesError::GestureActive);
        }
        let reconciled = self.scene.reconcile(updates);
        if self.hovered.is_some_and(|id| reconciled.deleted.contains(&id)) {
            self.hovered = None;
        }
        if let Some(id) = reconciled.focused {
            self.focus(id);
        }
        self.dirty.datacubes = true;
        Ok(())
    }

    /// Replaces the floor positions, keyed by datacube id.
    pub fn set_datacube_positions(&mut self, positions: HashMap<u32, Vec2>) {
        self.scene.set_positions(positions);
        self.dirty.datacube_positions = true;
    }

    /// Animates the camera towards a perspective or orthographic projection.
    pub fn set_perspective(&mut self, perspective: bool) {
        let target = if perspective { 1.0 } else { 0.0 };
        self.projection_animation =
            SpringAnimation::start_if_changed([self.camera.mode()], [target], &self.options.spring);
        self.redraw = true;
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        if self.options.clear_color != color {
            self.options.clear_color = color;
            self.dirty.clear_color = true;
        }
    }

    /// Sets the number of accumulated sub-frames, at least one.
    pub fn set_multi_frame_number(&mut self, count: u32) {
        let count = count.max(1);
        if self.options.multi_frame_number != count {
            self.options.multi_frame_number = count;
            self.dirty.multi_frame_number = true;
        }
    }

    pub fn set_debug_view(&mut self, view: DebugView) {
        if self.options.debug_view != view {
            self.options.debug_view = view;
            self.dirty.debug_view = true;
        }
    }

    /// Sets the frame size in physical pixels. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || self.frame_size == (width, height) {
            return;
        }
        self.frame_size = (width, height);
        self.camera.set_viewport(width, height);
        self.dirty.frame_size = true;
    }

    /// Starts the framing animation towards a positioned datacube.
    fn focus(&mut self, datacube_id: u32) {
        let center = self.camera.center();
        let Some(target) = self.scene.focus_center(datacube_id, center.y) else {
            return;
        };
        let up = self.camera.up();
        let from = [center.x, center.y, center.z, up.x, up.y, up.z];
        let to = [target.x, target.y, target.z, 0.0, 1.0, 0.0];
        if let Some(animation) = SpringAnimation::start_if_changed(from, to, &self.options.spring) {
            log::debug!("focusing datacube {datacube_id}");
            self.focus_animation = Some(animation);
        }
    }

    // Pointer input

    /// Resolves what lies under a pointer event, using the last captured ID buffer.
    #[must_use]
    pub fn pick(&self, event: &PointerEvent) -> PickResult {
        let (Some(capture), Some(normalized)) = (&self.capture, event.normalized()) else {
            return PickResult::default();
        };
        pick(
            capture,
            normalized,
            &self.camera.view_projection_inverse(),
            &self.scene,
            self.options.picking_tolerance,
        )
    }

    pub fn pointer_down(&mut self, event: &PointerEvent) {
        let started = self.interaction.pointer_down(
            event,
            self.capture.as_ref(),
            &self.camera,
            &self.scene,
            &self.options,
        );
        if started {
            self.navigation.pause();
            self.dirty.cuboids = true;
        } else {
            self.navigation.pointer_down(event.button, event.client, event.shift);
        }
    }

    pub fn pointer_move(&mut self, event: &PointerEvent) {
        if self.interaction.is_active() {
            if let Some(update) =
                self.interaction
                    .pointer_move(event, &self.camera, &mut self.scene, &self.options)
            {
                if update.extent.is_some() {
                    self.dirty.cuboids = true;
                }
                self.position_updates.emit(&update);
            }
        } else {
            self.navigation.pointer_move(event.client, &mut self.camera);
        }

        let picked = self.pick(event);
        let hovered = picked.is_hit().then_some(picked.datacube_id);
        if self.capture.is_some() && hovered != self.hovered {
            self.hovered = hovered;
            // The ID target must be redrawn with the points of the new object
            self.capture = None;
            self.redraw = true;
        }
        self.pointer_events
            .emit(&AugmentedPointerEvent::new(PointerEventKind::Move, *event, &picked));
    }

    pub fn pointer_up(&mut self, event: &PointerEvent) {
        if self.interaction.pointer_up() {
            self.navigation.resume();
            self.dirty.cuboids = true;
            self.redraw = true;
        } else {
            self.navigation.pointer_up();
        }
        let picked = self.pick(event);
        self.pointer_events
            .emit(&AugmentedPointerEvent::new(PointerEventKind::Up, *event, &picked));
    }

    /// Logs what lies under a click. Never touches gesture state.
    pub fn click(&self, event: &PointerEvent) -> PickResult {
        let picked = self.pick(event);
        log::debug!(
            "click: datacube {} point {:?} depth {} world {:?}",
            picked.datacube_id,
            picked.point_index,
            picked.depth,
            picked.world_position
        );
        picked
    }

    /// Wheel zoom. Positive offsets zoom in.
    pub fn wheel(&mut self, offset: f32) {
        self.navigation.wheel(offset, &mut self.camera);
    }

    // Outbound streams

    /// Receives `{id, position?, extent?}` for every drag and resize step.
    pub fn subscribe_position_updates(&mut self) -> Receiver<PositionUpdate> {
        self.position_updates.subscribe()
    }

    /// Receives pointer move and up events augmented with what lies under the pointer.
    pub fn subscribe_pointer_events(&mut self) -> Receiver<AugmentedPointerEvent> {
        self.pointer_events.subscribe()
    }

    // Frame driving

    /// Steps animations, collects loaded meshes and rebuilds derived scene data.
    ///
    /// Returns whether a new frame is needed.
    pub fn update(&mut self, dt: f64) -> bool {
        self.collect_meshes();

        if let Some(animation) = &mut self.focus_animation {
            let [cx, cy, cz, ux, uy, uz] = animation.step(dt);
            if animation.is_finished() {
                self.focus_animation = None;
            }
            self.camera.set_center(Vec3::new(cx, cy, cz));
            self.camera.set_up(Vec3::new(ux, uy, uz));
        }
        if let Some(animation) = &mut self.projection_animation {
            let [mode] = animation.step(dt);
            if animation.is_finished() {
                self.projection_animation = None;
            }
            self.camera.set_mode(mode);
        }
        if self.scene.step_animations(dt) {
            self.dirty.cuboids = true;
        }

        if self.dirty.datacubes {
            self.scene.rebuild_cuboids(&self.options);
            for request in self.scene.take_mesh_requests() {
                self.mesh_loader.request(request);
            }
        }
        if self.dirty.datacubes || self.dirty.datacube_positions {
            self.scene.rebuild_points();
        }
        if self.dirty.datacubes || self.dirty.datacube_positions || self.dirty.cuboids {
            self.scene.rebuild_decorations();
        }

        let changed = self.dirty.any() || self.camera.altered();
        if changed {
            self.capture = None;
        }
        std::mem::take(&mut self.redraw) || changed || self.is_animating()
    }

    /// Whether any camera or cuboid animation is running.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.focus_animation.is_some()
            || self.projection_animation.is_some()
            || self.scene.is_animating()
    }

    fn collect_meshes(&mut self) {
        for loaded in self.mesh_loader.poll() {
            self.finish_mesh_load(loaded);
        }
    }

    fn finish_mesh_load(&mut self, loaded: LoadedMesh) {
        match loaded.mesh {
            Ok(mesh) => {
                if self.scene.finish_mesh_load(loaded.datacube_id, &loaded.uri, true) {
                    self.loaded_meshes.push((loaded.datacube_id, mesh));
                    self.dirty.cuboids = true;
                }
            }
            Err(error) => {
                log::warn!("{error}");
                self.scene.finish_mesh_load(loaded.datacube_id, &loaded.uri, false);
                self.dirty.cuboids = true;
            }
        }
    }

    /// Blocks until every requested mesh asset has loaded or failed.
    pub fn wait_for_meshes(&mut self) {
        while self.scene.is_loading_meshes() {
            let Some(loaded) = self.mesh_loader.wait() else {
                log::warn!("mesh loader stopped with loads pending");
                return;
            };
            self.finish_mesh_load(loaded);
        }
    }

    /// Meshes that arrived since the last call, keyed by datacube id.
    pub fn take_loaded_meshes(&mut self) -> Vec<(u32, MeshData)> {
        std::mem::take(&mut self.loaded_meshes)
    }

    /// Whether the next rendered frame should be read back for picking.
    #[must_use]
    pub fn needs_capture(&self) -> bool {
        self.capture.is_none()
    }

    #[must_use]
    pub fn capture(&self) -> Option<&IdBufferCapture> {
        self.capture.as_ref()
    }

    /// Installs the ID buffer of the last stable frame.
    pub fn set_capture(&mut self, capture: IdBufferCapture) {
        self.capture = Some(capture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::CanvasRect;
    use datacubes_core::pick::encode_id;
    use datacubes_core::CursorAffordance;

    fn uniform_capture(id: u32, size: u32, depth: f32) -> IdBufferCapture {
        let rgba: Vec<u8> = (0..size * size).flat_map(|_| encode_id(id)).collect();
        IdBufferCapture::from_rgba8(size, size, &rgba, vec![depth; (size * size) as usize]).unwrap()
    }

    #[test]
    fn test_update_rebuilds_and_requests_frame() {
        let mut canvas = Canvas::new(Options::default());
        canvas.set_datacubes(vec![DatacubeUpdate::new(1)]).unwrap();
        assert!(canvas.update(0.0));
        assert!(canvas.scene().cuboid(1).is_some());
        assert!(canvas.take_dirty().datacubes);
        assert!(!canvas.dirty().any());
    }

    #[test]
    fn test_settings_mark_dirty_only_on_change() {
        let mut canvas = Canvas::new(Options::default());
        canvas.take_dirty();
        canvas.set_clear_color(Options::default().clear_color);
        canvas.set_multi_frame_number(8);
        canvas.set_debug_view(DebugView::None);
        assert!(!canvas.dirty().any());

        canvas.set_multi_frame_number(0);
        assert_eq!(canvas.options().multi_frame_number, 1);
        canvas.set_debug_view(DebugView::IdBuffer);
        let dirty = canvas.take_dirty();
        assert!(dirty.multi_frame_number && dirty.debug_view);
    }

    #[test]
    fn test_resize_ignores_zero() {
        let mut canvas = Canvas::new(Options::default());
        canvas.resize(0, 100);
        assert_eq!(canvas.frame_size(), (1, 1));
        canvas.resize(640, 480);
        assert_eq!(canvas.frame_size(), (640, 480));
        assert_eq!(canvas.camera().viewport(), Vec2::new(640.0, 480.0));
    }

    #[test]
    fn test_perspective_switch_animates_mode() {
        let mut canvas = Canvas::new(Options::default());
        canvas.set_perspective(false);
        assert!(canvas.is_animating());
        let mut steps = 0;
        while canvas.is_animating() && steps < 10_000 {
            canvas.update(1.0 / 60.0);
            steps += 1;
        }
        assert_eq!(canvas.camera().mode(), 0.0);
    }

    #[test]
    fn test_focus_moves_camera_center() {
        let mut canvas = Canvas::new(Options::default());
        canvas.set_datacube_positions(HashMap::from([(1, Vec2::new(3.0, -2.0))]));
        canvas
            .set_datacubes(vec![DatacubeUpdate::new(1).focused(true)])
            .unwrap();
        let mut steps = 0;
        while canvas.is_animating() && steps < 10_000 {
            canvas.update(1.0 / 60.0);
            steps += 1;
        }
        let center = canvas.camera().center();
        assert!((center - Vec3::new(3.0, 0.0, -2.0)).length() < 1e-3);
    }

    #[test]
    fn test_gesture_blocks_updates_and_hides_object() {
        let mut canvas = Canvas::new(Options::default());
        canvas.resize(4, 4);
        canvas.set_datacube_positions(HashMap::from([(2, Vec2::ZERO)]));
        canvas.set_datacubes(vec![DatacubeUpdate::new(2)]).unwrap();
        canvas.update(0.0);
        canvas.set_capture(uniform_capture(object_id(2), 4, 0.5));

        let rect = CanvasRect::from_size(4, 4);
        let press = PointerEvent::new(Vec2::splat(2.0), rect);
        canvas.pointer_down(&press);
        assert!(canvas.is_gesture_active());
        assert_eq!(canvas.hidden_object(), Some(object_id(2)));
        assert!(matches!(
            canvas.set_datacubes(vec![DatacubeUpdate::new(2)]),
            Err(DatacubesError::GestureActive)
        ));

        canvas.pointer_up(&press);
        assert!(!canvas.is_gesture_active());
        assert!(canvas.set_datacubes(vec![DatacubeUpdate::new(2)]).is_ok());
    }

    #[test]
    fn test_press_on_unplaced_datacube_pauses_navigation() {
        let mut canvas = Canvas::new(Options::default());
        canvas.resize(4, 4);
        canvas.set_datacubes(vec![DatacubeUpdate::new(2)]).unwrap();
        canvas.update(0.0);
        canvas.set_capture(uniform_capture(object_id(2), 4, 0.5));

        let rect = CanvasRect::from_size(4, 4);
        let press = PointerEvent::new(Vec2::splat(2.0), rect);
        canvas.pointer_down(&press);
        assert!(!canvas.is_gesture_active());
        assert!(canvas.navigation.is_paused());

        canvas.pointer_up(&press);
        assert!(!canvas.navigation.is_paused());
    }

    #[test]
    fn test_resize_emits_clamped_extent() {
        let mut canvas = Canvas::new(Options::default());
        canvas.resize(4, 4);
        canvas.set_datacube_positions(HashMap::from([(2, Vec2::ZERO)]));
        canvas.set_datacubes(vec![DatacubeUpdate::new(2)]).unwrap();
        canvas.update(0.0);
        // Depth of a point inside the cube, so the gesture starts near its top
        let depth = canvas
            .camera()
            .view_projection()
            .project_point3(Vec3::new(0.0, 0.5, 0.0))
            .z;
        canvas.set_capture(uniform_capture(object_id(2), 4, depth));
        let updates = canvas.subscribe_position_updates();

        let rect = CanvasRect::from_size(4, 4);
        let press = PointerEvent::new(Vec2::splat(2.0), rect).with_cursor(CursorAffordance::EwResize);
        canvas.pointer_down(&press);
        for x in [0.0, 1.0, 3.0, 4.0] {
            canvas.pointer_move(&PointerEvent::new(Vec2::new(x, 2.0), rect));
        }
        canvas.pointer_up(&press);

        let received: Vec<PositionUpdate> = updates.try_iter().collect();
        assert!(!received.is_empty());
        for update in received {
            assert_eq!(update.id, 2);
            let extent = update.extent.unwrap();
            assert!((-2.0..=-0.25).contains(&extent.min_x));
            assert!((0.25..=2.0).contains(&extent.max_x));
            assert_eq!(extent.min_z, -0.25);
            assert_eq!(extent.max_z, 0.25);
        }
    }

    #[test]
    fn test_pointer_events_are_augmented() {
        let mut canvas = Canvas::new(Options::default());
        canvas.resize(4, 4);
        canvas.set_datacube_positions(HashMap::from([(5, Vec2::ZERO)]));
        canvas.set_datacubes(vec![DatacubeUpdate::new(5)]).unwrap();
        canvas.update(0.0);
        canvas.set_capture(uniform_capture(object_id(5), 4, 0.5));
        let events = canvas.subscribe_pointer_events();

        let rect = CanvasRect::from_size(4, 4);
        canvas.pointer_move(&PointerEvent::new(Vec2::splat(2.0), rect));
        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, PointerEventKind::Move);
        assert_eq!(event.datacube_id, 5);
        assert_eq!(canvas.hovered_object(), Some(object_id(5)));
        // Hovering a new object invalidates the capture
        assert!(canvas.needs_capture());
    }
}
