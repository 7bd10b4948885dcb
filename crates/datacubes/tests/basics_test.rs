//! Canvas integration tests: reconciliation, point derivation, gestures and transitions.

use std::collections::HashMap;

use datacubes::*;
use datacubes_core::pick::{encode_id, object_id};

fn uniform_capture(id: u32, size: u32, depth: f32) -> IdBufferCapture {
    let rgba: Vec<u8> = (0..size * size).flat_map(|_| encode_id(id)).collect();
    IdBufferCapture::from_rgba8(size, size, &rgba, vec![depth; (size * size) as usize]).unwrap()
}

fn cuboid_summary(canvas: &Canvas) -> Vec<(u32, f32, f32)> {
    canvas
        .scene()
        .cuboids()
        .iter()
        .map(|c| (c.datacube_id, c.translate_y, c.scale_y))
        .collect()
}

#[test]
fn test_reconciliation_keeps_only_updated_ids() {
    let mut canvas = Canvas::new(Options::default());
    canvas
        .set_datacubes((1..=3).map(DatacubeUpdate::new).collect())
        .unwrap();
    canvas.update(0.0);
    assert_eq!(canvas.scene().cuboids().len(), 3);

    canvas
        .set_datacubes(vec![
            DatacubeUpdate::new(2).relative_height(5.0),
            DatacubeUpdate::new(4).relative_height(1.0),
        ])
        .unwrap();
    canvas.update(0.0);

    let ids: Vec<u32> = canvas.scene().cuboids().iter().map(|c| c.datacube_id).collect();
    assert_eq!(ids, vec![2, 4]);
    assert!(canvas.scene().datacube(3).is_none());
    // Merged, so the existing cuboid animates towards the new height
    assert_eq!(canvas.scene().datacube(2).unwrap().relative_height, 5.0);
    assert!(canvas.scene().cuboid(2).unwrap().is_animating());
}

#[test]
fn test_point_primitive_end_to_end() {
    let mut canvas = Canvas::new(Options::default());
    canvas.set_datacube_positions(HashMap::from([(7, Vec2::ZERO)]));
    canvas
        .set_datacubes(vec![DatacubeUpdate::new(7)
            .kind(DatacubeKind::PointPrimitive)
            .extent(Extent::new(-0.25, 0.75, -0.25, 0.75))
            .relative_height(0.4)
            .x_column(Column::number("x", vec![0.0, 1.0, 2.0]))
            .y_column(Column::number("y", vec![0.0, 2.0, 4.0]))])
        .unwrap();
    canvas.update(0.0);

    let cuboid = canvas.scene().cuboid(7).unwrap();
    assert_eq!(cuboid.id, u32::MAX - 7);
    assert_eq!(cuboid.points_from, 0);
    assert_eq!(cuboid.points_count, 3);

    let records = cuboid.points.as_ref().unwrap();
    assert_eq!(records.len(), 3);
    let xs: Vec<f32> = records.iter().map(|p| p.position.x).collect();
    assert_eq!(xs, vec![-0.25, 0.0, 0.25]);
    let ys: Vec<f32> = records.iter().map(|p| p.position.y).collect();
    assert_eq!(ys, vec![-0.5, 0.0, 0.5]);
    assert_eq!(canvas.scene().points().len(), 3);
}

#[test]
fn test_updates_are_rejected_during_drag() {
    let mut canvas = Canvas::new(Options::default());
    canvas.resize(8, 8);
    canvas.set_datacube_positions(HashMap::from([(1, Vec2::ZERO), (2, Vec2::new(1.0, 0.0))]));
    canvas
        .set_datacubes(vec![DatacubeUpdate::new(1), DatacubeUpdate::new(2)])
        .unwrap();
    canvas.update(0.0);
    canvas.set_capture(uniform_capture(object_id(1), 8, 0.5));

    let rect = CanvasRect::from_size(8, 8);
    canvas.pointer_down(&PointerEvent::new(Vec2::splat(4.0), rect));
    assert!(canvas.is_gesture_active());

    let before = cuboid_summary(&canvas);
    let result = canvas.set_datacubes(vec![DatacubeUpdate::new(3).relative_height(2.0)]);
    assert!(matches!(result, Err(DatacubesError::GestureActive)));
    canvas.update(0.0);
    assert_eq!(cuboid_summary(&canvas), before);

    canvas.pointer_up(&PointerEvent::new(Vec2::splat(4.0), rect));
    canvas
        .set_datacubes(vec![DatacubeUpdate::new(3).relative_height(2.0)])
        .unwrap();
    canvas.update(0.0);
    let ids: Vec<u32> = canvas.scene().cuboids().iter().map(|c| c.datacube_id).collect();
    assert_eq!(ids, vec![3]);
}

#[test]
fn test_color_lookup_boundaries() {
    let palette = ColorPalette::new(vec![
        ColorStop::new(0.0, "rgb(255, 0, 0)"),
        ColorStop::new(1.0, "rgb(0, 0, 255)"),
    ]);
    assert_eq!(palette.color_for_normalized_value(0.0), Some([1.0, 0.0, 0.0]));
    assert_eq!(palette.color_for_normalized_value(1.0), Some([0.0, 0.0, 1.0]));
    assert_eq!(palette.color_for_normalized_value(f32::NAN), None);
    assert_eq!(ColorPalette::new(Vec::new()).color_for_normalized_value(0.5), None);
}

#[test]
fn test_projection_transition_is_continuous() {
    let mut canvas = Canvas::new(Options::default());
    canvas.resize(800, 600);
    let probe = Vec3::new(0.0, 0.5, 0.0);

    let camera = canvas.camera();
    assert!(camera
        .projection()
        .abs_diff_eq(camera.perspective_projection(), 1e-5));
    let mut last = camera.view_projection().project_point3(probe);

    canvas.set_perspective(false);
    let mut steps = 0;
    while canvas.is_animating() && steps < 10_000 {
        canvas.update(1.0 / 60.0);
        let ndc = canvas.camera().view_projection().project_point3(probe);
        assert!((ndc.y - last.y).abs() < 0.05, "jump at step {steps}: {last:?} -> {ndc:?}");
        last = ndc;
        steps += 1;
    }

    let camera = canvas.camera();
    assert_eq!(camera.mode(), 0.0);
    assert!(camera
        .projection()
        .abs_diff_eq(camera.orthographic_projection(), 1e-5));
}

#[test]
fn test_mesh_asset_failure_is_not_fatal() {
    let mut canvas = Canvas::new(Options::default());
    canvas.set_datacube_positions(HashMap::from([(1, Vec2::ZERO), (2, Vec2::new(1.0, 0.0))]));
    canvas
        .set_datacubes(vec![
            DatacubeUpdate::new(1)
                .kind(DatacubeKind::MeshPrimitive)
                .mesh_asset("missing/asset.glb", Some(0.5)),
            DatacubeUpdate::new(2),
        ])
        .unwrap();
    canvas.update(0.0);
    canvas.wait_for_meshes();

    let cuboid = canvas.scene().cuboid(1).unwrap();
    assert_eq!(cuboid.mesh, MeshState::Failed("missing/asset.glb".into()));
    assert!(canvas.take_loaded_meshes().is_empty());
    assert!(canvas.scene().cuboid(2).is_some());
}
