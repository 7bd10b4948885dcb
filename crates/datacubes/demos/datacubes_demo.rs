//! Datacube canvas demonstration.
//!
//! Shows a dataset, a date filter and a few primitives. Dragging a cuboid moves it,
//! dragging its side faces resizes it; the demo plays the host and echoes every
//! reported position and extent back into the canvas.
//!
//! Run with: cargo run --example datacubes_demo

use std::collections::HashMap;

use datacubes::*;

fn column(name: &str, values: impl Iterator<Item = f64>) -> Column {
    Column::number(name, values.collect())
}

fn datacubes(extents: &HashMap<u32, Extent>) -> Vec<DatacubeUpdate> {
    let extent = |id: u32| extents.get(&id).copied().unwrap_or_default();
    let palette = ColorPalette::new(vec![
        ColorStop::new(0.0, "rgb(68, 1, 84)"),
        ColorStop::new(0.5, "rgb(33, 145, 140)"),
        ColorStop::new(1.0, "rgb(253, 231, 37)"),
    ]);
    let rows = 0..200;
    let t = |i: i32| f64::from(i) * 0.05;

    vec![
        DatacubeUpdate::new(1)
            .label("sales.csv")
            .extent(extent(1))
            .selected(true),
        DatacubeUpdate::new(2)
            .kind(DatacubeKind::DateFilter)
            .extent(extent(2))
            .relative_height(0.6),
        DatacubeUpdate::new(3)
            .kind(DatacubeKind::PointPrimitive)
            .label("spiral")
            .extent(extent(3))
            .x_column(column("x", rows.clone().map(|i| t(i).cos() * t(i))))
            .y_column(column("y", rows.clone().map(t)))
            .z_column(column("z", rows.clone().map(|i| t(i).sin() * t(i))))
            .colors(column("t", rows.clone().map(t)), Some(palette)),
        DatacubeUpdate::new(4)
            .kind(DatacubeKind::LinePrimitive)
            .extent(extent(4))
            .x_column(column("x", rows.clone().map(t)))
            .y_column(column("y", rows.map(|i| (t(i) * 2.0).sin()))),
        DatacubeUpdate::new(5)
            .kind(DatacubeKind::CubePrimitive)
            .extent(extent(5))
            .pending(true),
    ]
}

fn main() -> Result<()> {
    env_logger::init();

    let mut positions: HashMap<u32, Vec2> = HashMap::from([
        (1, Vec2::new(-1.5, 0.0)),
        (2, Vec2::new(-0.5, 0.0)),
        (3, Vec2::new(0.5, 0.0)),
        (4, Vec2::new(1.5, 0.0)),
        (5, Vec2::new(0.0, 1.5)),
    ]);
    let mut extents: HashMap<u32, Extent> = HashMap::new();
    let mut resized = false;

    let mut canvas = Canvas::new(Options::default());
    canvas.set_datacube_positions(positions.clone());
    canvas.set_datacubes(datacubes(&extents))?;
    let updates = canvas.subscribe_position_updates();

    DatacubesApplication::new(canvas)
        .with_title("datacubes demo")
        .with_frame_callback(move |canvas| {
            let mut moved = false;
            for update in updates.try_iter() {
                if let Some(position) = update.position {
                    positions.insert(update.id, position);
                    moved = true;
                }
                if let Some(extent) = update.extent {
                    extents.insert(update.id, extent);
                    resized = true;
                }
            }
            if moved {
                canvas.set_datacube_positions(positions.clone());
            }
            // Descriptors are rejected while the resize is active; send them after release
            if resized && !canvas.is_gesture_active() {
                match canvas.set_datacubes(datacubes(&extents)) {
                    Ok(()) => resized = false,
                    Err(error) => log::warn!("{error}"),
                }
            }
        })
        .run()
}
