//! Pointer gesture tests driven through the canvas.

use std::collections::HashMap;

use datacubes::*;
use datacubes_core::pick::{encode_id, object_id};
use proptest::prelude::*;

fn resize_canvas(cursor: CursorAffordance) -> (Canvas, std::sync::mpsc::Receiver<PositionUpdate>) {
    let mut canvas = Canvas::new(Options::default());
    canvas.resize(4, 4);
    canvas.set_datacube_positions(HashMap::from([(2, Vec2::ZERO)]));
    canvas.set_datacubes(vec![DatacubeUpdate::new(2)]).unwrap();
    canvas.update(0.0);

    let depth = canvas
        .camera()
        .view_projection()
        .project_point3(Vec3::new(0.0, 0.5, 0.0))
        .z;
    let rgba: Vec<u8> = (0..16).flat_map(|_| encode_id(object_id(2))).collect();
    canvas.set_capture(IdBufferCapture::from_rgba8(4, 4, &rgba, vec![depth; 16]).unwrap());
    let updates = canvas.subscribe_position_updates();

    let press = PointerEvent::new(Vec2::splat(2.0), CanvasRect::from_size(4, 4)).with_cursor(cursor);
    canvas.pointer_down(&press);
    assert!(canvas.is_gesture_active());
    (canvas, updates)
}

#[test]
fn test_drag_emits_positions_without_extent() {
    let (mut canvas, updates) = resize_canvas(CursorAffordance::Default);
    let rect = CanvasRect::from_size(4, 4);
    canvas.pointer_move(&PointerEvent::new(Vec2::new(3.0, 2.0), rect));
    canvas.pointer_up(&PointerEvent::new(Vec2::new(3.0, 2.0), rect));

    let received: Vec<PositionUpdate> = updates.try_iter().collect();
    assert!(!received.is_empty());
    for update in &received {
        assert_eq!(update.id, 2);
        assert!(update.position.is_some());
        assert!(update.extent.is_none());
    }
    // Positions are owned by the host; the canvas does not move the cuboid itself
    assert_eq!(canvas.scene().position(2), Some(Vec2::ZERO));
}

#[test]
fn test_pointer_up_ends_gesture_and_restores_visibility() {
    let (mut canvas, _updates) = resize_canvas(CursorAffordance::EwResize);
    assert_eq!(canvas.hidden_object(), Some(object_id(2)));
    canvas.pointer_up(&PointerEvent::new(Vec2::splat(2.0), CanvasRect::from_size(4, 4)));
    assert!(!canvas.is_gesture_active());
    assert_eq!(canvas.hidden_object(), None);
}

proptest! {
    #[test]
    fn test_resize_never_leaves_limits(x in -1.0e4f32..1.0e4, z in -1.0e4f32..1.0e4) {
        let (mut canvas, updates) = resize_canvas(CursorAffordance::NwseResize);
        let rect = CanvasRect::from_size(4, 4);
        canvas.pointer_move(&PointerEvent::new(Vec2::new(x, z), rect));
        canvas.pointer_up(&PointerEvent::new(Vec2::new(x, z), rect));

        for update in updates.try_iter() {
            let extent = update.extent.unwrap();
            prop_assert!((-2.0..=-0.25).contains(&extent.min_x));
            prop_assert!((0.25..=2.0).contains(&extent.max_x));
            prop_assert!((-2.0..=-0.25).contains(&extent.min_z));
            prop_assert!((0.25..=2.0).contains(&extent.max_z));
        }
    }
}
