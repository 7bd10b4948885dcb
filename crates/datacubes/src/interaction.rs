//! Picking queries and the drag / resize gesture state machine.

use datacubes_core::{
    decode_pick_value, BoundingBoxFaces, CursorAffordance, Extent, IdBufferCapture, Options,
    PickResult, ResizeLimits,
};
use datacubes_render::Camera;
use glam::{Mat4, Vec2, Vec3};

use crate::scene::Scene;

/// Mouse button of a pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PointerButton {
    #[default]
    Primary,
    Secondary,
    Other,
}

/// The canvas rectangle in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasRect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl CanvasRect {
    #[must_use]
    pub fn new(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    /// A rectangle at the client origin.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(Vec2::ZERO, Vec2::new(width as f32, height as f32))
    }

    /// Maps a client position into `[0, 1]` (top-left origin). Degenerate rectangles map nothing.
    #[must_use]
    pub fn normalize(&self, client: Vec2) -> Option<Vec2> {
        if self.size.x <= 0.0 || self.size.y <= 0.0 {
            return None;
        }
        Some((client - self.origin) / self.size)
    }
}

/// A pointer event as delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Client position in pixels.
    pub client: Vec2,
    pub rect: CanvasRect,
    pub button: PointerButton,
    pub shift: bool,
    /// Cursor the host displayed when the event fired.
    pub cursor: CursorAffordance,
}

impl PointerEvent {
    #[must_use]
    pub fn new(client: Vec2, rect: CanvasRect) -> Self {
        Self {
            client,
            rect,
            button: PointerButton::Primary,
            shift: false,
            cursor: CursorAffordance::Default,
        }
    }

    #[must_use]
    pub fn with_button(mut self, button: PointerButton) -> Self {
        self.button = button;
        self
    }

    #[must_use]
    pub fn with_shift(mut self, shift: bool) -> Self {
        self.shift = shift;
        self
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: CursorAffordance) -> Self {
        self.cursor = cursor;
        self
    }

    /// Position normalized to the canvas.
    #[must_use]
    pub fn normalized(&self) -> Option<Vec2> {
        self.rect.normalize(self.client)
    }

    /// Position in normalized device coordinates.
    #[must_use]
    pub fn ndc(&self) -> Option<Vec2> {
        self.normalized()
            .map(|n| Vec2::new(n.x * 2.0 - 1.0, 1.0 - n.y * 2.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventKind {
    Move,
    Up,
}

/// A pointer event re-emitted with what lies under the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentedPointerEvent {
    pub kind: PointerEventKind,
    pub event: PointerEvent,
    /// Datacube under the pointer, 0 for none.
    pub datacube_id: u32,
    pub bounding_box_face_hovered: BoundingBoxFaces,
    pub point_index: Option<u32>,
}

impl AugmentedPointerEvent {
    #[must_use]
    pub fn new(kind: PointerEventKind, event: PointerEvent, pick: &PickResult) -> Self {
        Self {
            kind,
            event,
            datacube_id: pick.datacube_id,
            bounding_box_face_hovered: pick.faces,
            point_index: pick.point_index,
        }
    }

    /// Resize cursor the host should show for this event.
    #[must_use]
    pub fn cursor(&self) -> CursorAffordance {
        CursorAffordance::from_hovered_faces(&self.bounding_box_face_hovered)
    }
}

/// Outbound position or extent change, keyed by raw datacube id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    pub id: u32,
    pub position: Option<Vec2>,
    pub extent: Option<Extent>,
}

/// Resolves what lies under a normalized canvas position.
#[must_use]
pub fn pick(
    capture: &IdBufferCapture,
    normalized: Vec2,
    view_projection_inverse: &Mat4,
    scene: &Scene,
    tolerance: f32,
) -> PickResult {
    let Some((x, y)) = capture.pixel_at(normalized) else {
        return PickResult::default();
    };
    let depth = capture.depth_at(x, y);
    let world_position = capture.world_position_at(x, y, view_projection_inverse);
    let Some(decoded) = decode_pick_value(capture.id_at(x, y)) else {
        return PickResult {
            depth,
            world_position,
            ..PickResult::default()
        };
    };

    // Faces only belong to the box itself, not to points drawn inside it
    let faces = match (
        scene.cuboid(decoded.datacube_id),
        scene.position(decoded.datacube_id),
        world_position,
    ) {
        (Some(cuboid), Some(position), Some(point)) if decoded.point_index.is_none() => {
            BoundingBoxFaces::hovered(&cuboid.bounds(position), point, tolerance)
        }
        _ => BoundingBoxFaces::default(),
    };
    PickResult {
        datacube_id: decoded.datacube_id,
        point_index: decoded.point_index,
        world_position,
        depth,
        faces,
    }
}

/// Intersects a ray with the horizontal plane at `height`.
#[must_use]
pub fn intersect_horizontal_plane(origin: Vec3, direction: Vec3, height: f32) -> Option<Vec3> {
    if direction.y.abs() <= f32::EPSILON {
        return None;
    }
    let t = (height - origin.y) / direction.y;
    (t >= 0.0).then(|| origin + direction * t)
}

/// Moves the extent edges on the pointer side to the hit point, relative to the datacube position.
#[must_use]
pub fn resized_extent(
    start: Extent,
    offset: Vec2,
    resize_x: bool,
    resize_z: bool,
    limits: &ResizeLimits,
) -> Extent {
    let mut extent = start;
    if resize_x {
        if offset.x >= 0.0 {
            extent.max_x = limits.clamp_max(offset.x);
        } else {
            extent.min_x = limits.clamp_min(offset.x);
        }
    }
    if resize_z {
        if offset.y >= 0.0 {
            extent.max_z = limits.clamp_max(offset.y);
        } else {
            extent.min_z = limits.clamp_min(offset.y);
        }
    }
    extent
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GestureKind {
    Dragging,
    Resizing { x: bool, z: bool },
}

/// A drag or resize in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gesture {
    kind: GestureKind,
    pub datacube_id: u32,
    /// `(pos.x, translate_y, pos.y)` at the press.
    pub start_position: Vec3,
    /// World point under the pointer at the press.
    pub start_point: Vec3,
    pub start_extent: Extent,
}

impl Gesture {
    #[must_use]
    pub fn is_resizing(&self) -> bool {
        matches!(self.kind, GestureKind::Resizing { .. })
    }
}

/// Drag and resize state machine.
#[derive(Debug, Default)]
pub struct Interaction {
    gesture: Option<Gesture>,
    /// A press on a datacube is held, with or without a gesture.
    pressed: bool,
}

impl Interaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.gesture.is_some()
    }

    #[must_use]
    pub fn gesture(&self) -> Option<&Gesture> {
        self.gesture.as_ref()
    }

    /// Captures a press that hits a datacube and starts a gesture if the press can be anchored
    /// on a positioned one. Returns whether the press was captured.
    pub fn pointer_down(
        &mut self,
        event: &PointerEvent,
        capture: Option<&IdBufferCapture>,
        camera: &Camera,
        scene: &Scene,
        options: &Options,
    ) -> bool {
        if event.button != PointerButton::Primary {
            return false;
        }
        let (Some(capture), Some(normalized)) = (capture, event.normalized()) else {
            return false;
        };
        let inverse = camera.view_projection_inverse();
        let hit = pick(capture, normalized, &inverse, scene, options.picking_tolerance);
        if !hit.is_hit() {
            return false;
        }
        self.pressed = true;
        let (Some(cuboid), Some(position)) = (scene.cuboid(hit.datacube_id), scene.position(hit.datacube_id)) else {
            return true;
        };

        let start_position = Vec3::new(position.x, cuboid.translate_y, position.y);
        let start_point = hit.world_position.or_else(|| {
            let (origin, direction) = camera.ray_through(event.ndc()?);
            intersect_horizontal_plane(origin, direction, start_position.y)
        });
        let Some(start_point) = start_point else {
            log::debug!("press on datacube {} has no anchor point", hit.datacube_id);
            return true;
        };

        let kind = if event.cursor.resizes_x() || event.cursor.resizes_z() {
            GestureKind::Resizing {
                x: event.cursor.resizes_x(),
                z: event.cursor.resizes_z(),
            }
        } else {
            GestureKind::Dragging
        };
        log::debug!("{kind:?} datacube {} from {start_point}", hit.datacube_id);
        self.gesture = Some(Gesture {
            kind,
            datacube_id: hit.datacube_id,
            start_position,
            start_point,
            start_extent: cuboid.extent,
        });
        true
    }

    /// Advances the gesture. Resizes are applied to the scene right away; drags are only
    /// reported, the host echoes the new position back.
    pub fn pointer_move(
        &mut self,
        event: &PointerEvent,
        camera: &Camera,
        scene: &mut Scene,
        options: &Options,
    ) -> Option<PositionUpdate> {
        let gesture = self.gesture?;
        let (origin, direction) = camera.ray_through(event.ndc()?);
        let hit = intersect_horizontal_plane(origin, direction, gesture.start_point.y)?;

        match gesture.kind {
            GestureKind::Resizing { x, z } => {
                let offset = Vec2::new(
                    hit.x - gesture.start_position.x,
                    hit.z - gesture.start_position.z,
                );
                let extent = resized_extent(gesture.start_extent, offset, x, z, &options.resize_limits);
                scene.set_extent(gesture.datacube_id, extent);
                Some(PositionUpdate {
                    id: gesture.datacube_id,
                    position: None,
                    extent: Some(extent),
                })
            }
            GestureKind::Dragging => {
                let moved = gesture.start_position + (hit - gesture.start_point);
                Some(PositionUpdate {
                    id: gesture.datacube_id,
                    position: Some(Vec2::new(moved.x, moved.z)),
                    extent: None,
                })
            }
        }
    }

    /// Ends the gesture. Returns whether a press was held.
    pub fn pointer_up(&mut self) -> bool {
        self.gesture = None;
        std::mem::take(&mut self.pressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacubes_core::pick::{encode_id, object_id, point_id};
    use datacubes_core::DatacubeUpdate;
    use std::collections::HashMap;

    fn scene_with_cube() -> Scene {
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(4)]);
        scene.set_positions(HashMap::from([(4, Vec2::ZERO)]));
        scene.rebuild_cuboids(&Options::default());
        scene
    }

    fn capture_of(id: u32, depth: f32) -> IdBufferCapture {
        let rgba: Vec<u8> = (0..4).flat_map(|_| encode_id(id)).collect();
        IdBufferCapture::from_rgba8(2, 2, &rgba, vec![depth; 4]).unwrap()
    }

    fn camera() -> Camera {
        let mut camera = Camera::default();
        camera.set_viewport(2, 2);
        camera
    }

    #[test]
    fn test_canvas_rect_normalizes() {
        let rect = CanvasRect::new(Vec2::new(10.0, 20.0), Vec2::new(100.0, 50.0));
        assert_eq!(rect.normalize(Vec2::new(60.0, 45.0)), Some(Vec2::new(0.5, 0.5)));
        assert_eq!(CanvasRect::from_size(0, 10).normalize(Vec2::ZERO), None);
    }

    #[test]
    fn test_pick_background_is_no_hit() {
        let scene = scene_with_cube();
        let result = pick(&capture_of(0, 1.0), Vec2::splat(0.5), &Mat4::IDENTITY, &scene, 0.1);
        assert!(!result.is_hit());
        assert_eq!(result.world_position, None);
    }

    #[test]
    fn test_pick_out_of_range_is_no_hit() {
        let scene = scene_with_cube();
        let capture = capture_of(object_id(4), 0.5);
        let result = pick(&capture, Vec2::new(1.5, 0.5), &Mat4::IDENTITY, &scene, 0.1);
        assert!(!result.is_hit());
    }

    #[test]
    fn test_pick_resolves_object() {
        let scene = scene_with_cube();
        let capture = capture_of(object_id(4), 0.5);
        let result = pick(&capture, Vec2::splat(0.5), &Mat4::IDENTITY, &scene, 0.1);
        assert_eq!(result.datacube_id, 4);
        assert_eq!(result.point_index, None);
        assert!(result.world_position.is_some());
    }

    #[test]
    fn test_pick_point_has_no_faces() {
        let scene = scene_with_cube();
        // The pixel unprojects onto the cube's bottom face
        let capture = capture_of(point_id(4, 2).unwrap(), 0.5);
        let inverse = Mat4::from_translation(Vec3::new(0.0, 0.5, -0.5));
        let result = pick(&capture, Vec2::splat(0.5), &inverse, &scene, 0.1);
        assert_eq!(result.datacube_id, 4);
        assert_eq!(result.point_index, Some(2));
        assert!(!result.faces.any());

        let capture = capture_of(object_id(4), 0.5);
        let result = pick(&capture, Vec2::splat(0.5), &inverse, &scene, 0.1);
        assert!(result.faces.any());
    }

    #[test]
    fn test_horizontal_plane_intersection() {
        let hit = intersect_horizontal_plane(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -1.0, 1.0).normalize(), 0.0);
        let hit = hit.unwrap();
        assert!((hit - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-5);
        assert_eq!(intersect_horizontal_plane(Vec3::ZERO, Vec3::X, 1.0), None);
        assert_eq!(intersect_horizontal_plane(Vec3::ZERO, Vec3::Y, -1.0), None);
    }

    #[test]
    fn test_resize_moves_edge_on_pointer_side() {
        let limits = ResizeLimits::default();
        let start = Extent::default();
        let grown = resized_extent(start, Vec2::new(1.0, 0.0), true, false, &limits);
        assert_eq!(grown.max_x, 1.0);
        assert_eq!(grown.min_x, start.min_x);

        let clamped = resized_extent(start, Vec2::new(-5.0, 0.1), true, true, &limits);
        assert_eq!(clamped.min_x, -2.0);
        assert_eq!(clamped.max_z, 0.25);
    }

    #[test]
    fn test_secondary_button_never_starts_gesture() {
        let scene = scene_with_cube();
        let capture = capture_of(object_id(4), 0.5);
        let mut interaction = Interaction::new();
        let event = PointerEvent::new(Vec2::splat(1.0), CanvasRect::from_size(2, 2))
            .with_button(PointerButton::Secondary);
        assert!(!interaction.pointer_down(&event, Some(&capture), &camera(), &scene, &Options::default()));
        assert!(!interaction.is_active());
    }

    #[test]
    fn test_press_on_background_does_nothing() {
        let scene = scene_with_cube();
        let mut interaction = Interaction::new();
        let event = PointerEvent::new(Vec2::splat(1.0), CanvasRect::from_size(2, 2));
        assert!(!interaction.pointer_down(&event, Some(&capture_of(0, 1.0)), &camera(), &scene, &Options::default()));
        assert!(!interaction.pointer_down(&event, None, &camera(), &scene, &Options::default()));
    }

    #[test]
    fn test_press_without_anchor_is_held() {
        let scene = scene_with_cube();
        // Datacube 9 is in the ID target but not in the scene
        let capture = capture_of(object_id(9), 0.5);
        let mut interaction = Interaction::new();
        let event = PointerEvent::new(Vec2::splat(1.0), CanvasRect::from_size(2, 2));
        assert!(interaction.pointer_down(&event, Some(&capture), &camera(), &scene, &Options::default()));
        assert!(!interaction.is_active());
        assert!(interaction.pointer_up());
        assert!(!interaction.pointer_up());
    }

    #[test]
    fn test_cursor_selects_gesture() {
        let scene = scene_with_cube();
        let capture = capture_of(object_id(4), 0.5);
        let rect = CanvasRect::from_size(2, 2);
        let options = Options::default();

        let mut interaction = Interaction::new();
        let drag = PointerEvent::new(Vec2::splat(1.0), rect);
        assert!(interaction.pointer_down(&drag, Some(&capture), &camera(), &scene, &options));
        assert!(!interaction.gesture().unwrap().is_resizing());
        assert!(interaction.pointer_up());
        assert!(!interaction.pointer_up());

        let resize = drag.with_cursor(CursorAffordance::EwResize);
        assert!(interaction.pointer_down(&resize, Some(&capture), &camera(), &scene, &options));
        assert!(interaction.gesture().unwrap().is_resizing());
        assert_eq!(interaction.gesture().unwrap().datacube_id, 4);
    }
}
