//! Scene synchronization: datacube descriptors in, cuboids and draw data out.
//!
//! The [`Scene`] retains the merged datacube list and one [`Cuboid`] per live datacube.
//! Descriptor batches are reconciled by id, cuboid attributes are animated towards their
//! targets, and the shared point buffer, line batches and labels are derived from the
//! cuboids whenever they or the datacube positions change.

use std::collections::HashMap;

use datacubes_core::color::{normalize_lab, normalized_lab_to_rgb, ERROR_LAB};
use datacubes_core::pick::{encode_id_normalized, object_id, point_id};
use datacubes_core::{
    Aabb, Column, Datacube, DatacubeKind, DatacubeUpdate, Extent, Options, SpringAnimation,
    CUBOID_SIZE,
};
use datacubes_render::{
    Alignment, CuboidInstance, Elide, Label, LabelSet, LineAnchor, LineBatch, LineVertex,
    PointDraw, PointVertex,
};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Point size used when no size column applies.
pub const DEFAULT_POINT_SIZE: f32 = 2.5;

/// Color of selection wireframes and leader lines.
pub const SELECTION_LINE_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// Offset of title labels above the tallest cuboid.
const TITLE_OFFSET: f32 = 0.42;
/// Offset of leader lines above the tallest cuboid.
const LEADER_OFFSET: f32 = 0.4;

/// One row of a primitive datacube, in cuboid-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub position: Vec3,
    /// sRGB color.
    pub color: [f32; 3],
    pub size: f32,
    /// Source row.
    pub row: u32,
    /// Pick id encoding datacube and row.
    pub global_index: u32,
}

impl PointRecord {
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
    }

    #[must_use]
    pub fn vertex(&self) -> PointVertex {
        PointVertex {
            position: self.position.to_array(),
            color: self.color,
            size: self.size,
            id: encode_id_normalized(self.global_index),
        }
    }
}

/// Loading state of a cuboid's mesh asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshState {
    /// No asset referenced.
    None,
    /// Requested from the loader.
    Loading(String),
    /// Arrived; the renderer owns an instancing pass for it.
    Loaded(String),
    /// Loading failed; not retried until the URI changes.
    Failed(String),
}

impl MeshState {
    fn uri(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Loading(uri) | Self::Loaded(uri) | Self::Failed(uri) => Some(uri),
        }
    }
}

/// A mesh asset the scene wants loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshRequest {
    pub datacube_id: u32,
    pub uri: String,
}

/// Retained render state of one datacube.
#[derive(Debug, Clone)]
pub struct Cuboid {
    /// Object pick id, `u32::MAX - datacube_id`.
    pub id: u32,
    pub datacube_id: u32,
    pub kind: DatacubeKind,
    pub translate_y: f32,
    pub scale_y: f32,
    /// Normalized L*a*b* color.
    pub color_lab: [f32; 3],
    pub extent: Extent,
    pub points: Option<Vec<PointRecord>>,
    /// First vertex of this cuboid in the shared point buffer.
    pub points_from: u32,
    pub points_count: u32,
    /// Drawn into the ID and pre-depth targets only.
    pub id_buffer_only: bool,
    pub is_selected: bool,
    pub is_pending: bool,
    pub is_erroneous: bool,
    pub title: String,
    pub mesh: MeshState,
    pub mesh_scale: f32,
    animation: Option<SpringAnimation<5>>,
}

/// Animated attributes: translate y, scale y and the normalized L*a*b* color.
///
/// A pending cuboid keeps its kind color while animating; only a newly created one shows
/// the error color right away.
fn target_values(datacube: &Datacube, pending_height: f32, created: bool) -> [f32; 5] {
    let (translate_y, scale_y) = if datacube.is_pending {
        (pending_height * 0.5, pending_height)
    } else {
        (datacube.relative_height * 0.5, datacube.relative_height)
    };
    let lab = if datacube.is_erroneous && (created || !datacube.is_pending) {
        ERROR_LAB
    } else {
        datacube.kind.color_lab()
    };
    let [l, a, b] = normalize_lab(lab);
    [translate_y, scale_y, l, a, b]
}

impl Cuboid {
    /// Creates a cuboid resting at its target values.
    #[must_use]
    pub fn new(datacube: &Datacube, options: &Options) -> Self {
        let [translate_y, scale_y, l, a, b] = target_values(datacube, options.pending_height, true);
        let mut cuboid = Self {
            id: object_id(datacube.id),
            datacube_id: datacube.id,
            kind: datacube.kind,
            translate_y,
            scale_y,
            color_lab: [l, a, b],
            extent: datacube.extent,
            points: None,
            points_from: 0,
            points_count: 0,
            id_buffer_only: false,
            is_selected: false,
            is_pending: false,
            is_erroneous: false,
            title: String::new(),
            mesh: MeshState::None,
            mesh_scale: 1.0,
            animation: None,
        };
        cuboid.apply_descriptor(datacube);
        cuboid
    }

    fn values(&self) -> [f32; 5] {
        let [l, a, b] = self.color_lab;
        [self.translate_y, self.scale_y, l, a, b]
    }

    fn set_values(&mut self, values: [f32; 5]) {
        let [translate_y, scale_y, l, a, b] = values;
        self.translate_y = translate_y;
        self.scale_y = scale_y;
        self.color_lab = [l, a, b];
    }

    /// Starts a transition towards the datacube's target values, replacing a running one.
    fn animate_towards(&mut self, datacube: &Datacube, options: &Options) {
        let target = target_values(datacube, options.pending_height, false);
        if let Some(animation) = SpringAnimation::start_if_changed(self.values(), target, &options.spring) {
            self.animation = Some(animation);
        }
    }

    fn apply_descriptor(&mut self, datacube: &Datacube) {
        self.kind = datacube.kind;
        self.is_erroneous = datacube.is_erroneous;
        self.is_pending = datacube.is_pending;
        self.is_selected = datacube.is_selected;
        self.extent = datacube.extent;
        self.title = datacube
            .label
            .clone()
            .unwrap_or_else(|| datacube.kind.name().to_string());
        self.points = derive_points(datacube);
        self.mesh_scale = datacube.mesh_asset.as_ref().and_then(|m| m.scale).unwrap_or(1.0);
        self.id_buffer_only =
            self.points.is_some() || matches!(self.mesh, MeshState::Loaded(_));
    }

    /// Advances the running transition. Returns whether any value changed.
    pub fn step_animation(&mut self, dt: f64) -> bool {
        let Some(animation) = &mut self.animation else {
            return false;
        };
        let values = animation.step(dt);
        let finished = animation.is_finished();
        let changed = values != self.values();
        self.set_values(values);
        if finished {
            self.animation = None;
        }
        changed
    }

    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Gamma-encoded sRGB color of the box.
    #[must_use]
    pub fn color_rgb(&self) -> [f32; 3] {
        normalized_lab_to_rgb(self.color_lab)
    }

    /// Transform of cuboid-local content (points, lines, meshes): position and extent, no height.
    #[must_use]
    pub fn placement(&self, position: Vec2) -> Mat4 {
        let (scale_x, scale_z) = self.extent.scale();
        Mat4::from_translation(Vec3::new(
            position.x + self.extent.center_x(),
            self.translate_y,
            position.y + self.extent.center_z(),
        )) * Mat4::from_scale(Vec3::new(scale_x, 1.0, scale_z))
    }

    /// Transform of the unit cube onto the box.
    #[must_use]
    pub fn model(&self, position: Vec2) -> Mat4 {
        self.placement(position)
            * Mat4::from_scale(Vec3::new(1.0, self.scale_y, 1.0))
            * Mat4::from_scale(Vec3::from_array(CUBOID_SIZE))
    }

    /// World-space bounds of the box, standing on the floor.
    #[must_use]
    pub fn bounds(&self, position: Vec2) -> Aabb {
        Aabb::new(
            Vec3::new(position.x + self.extent.min_x, 0.0, position.y + self.extent.min_z),
            Vec3::new(position.x + self.extent.max_x, self.scale_y, position.y + self.extent.max_z),
        )
    }

    /// Whether rows of this cuboid resolve to their own pick ids.
    #[must_use]
    pub fn has_sub_elements(&self) -> bool {
        self.points_count > 0
    }

    /// Mesh instance offsets: the finite points, or one instance at the bottom center.
    #[must_use]
    pub fn mesh_instances(&self) -> Vec<[f32; 3]> {
        let instances: Vec<[f32; 3]> = self
            .points
            .iter()
            .flatten()
            .filter(|p| p.is_finite())
            .map(|p| p.position.to_array())
            .collect();
        if instances.is_empty() {
            vec![[0.0, -0.5, 0.0]]
        } else {
            instances
        }
    }

    /// Per-axis mesh scale, compensating the extent scale of [`Cuboid::placement`].
    #[must_use]
    pub fn mesh_instance_scale(&self) -> Vec3 {
        let (scale_x, scale_z) = self.extent.scale();
        let s = self.mesh_scale;
        Vec3::new(s / scale_x, s, s / scale_z)
    }
}

fn bounds_or(column: Option<&Column>, default: (f64, f64)) -> (f64, f64) {
    column.map_or(default, |c| {
        (c.min().unwrap_or(f64::NAN), c.max().unwrap_or(f64::NAN))
    })
}

/// Derives point records of a primitive datacube; `None` if it carries no point data.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn derive_points(datacube: &Datacube) -> Option<Vec<PointRecord>> {
    if !datacube.has_point_data() {
        return None;
    }
    let x_column = datacube.x_column.as_ref()?;
    let rows = x_column.len();
    let size_x = f64::from(CUBOID_SIZE[0]);
    let size_y = f64::from(CUBOID_SIZE[1]);
    let size_z = f64::from(CUBOID_SIZE[2]);

    let (min_x, max_x) = bounds_or(Some(x_column), (0.0, 1.0));
    let (min_y, max_y) = bounds_or(datacube.y_column.as_ref(), (0.0, 1.0));
    let (min_z, max_z) = bounds_or(datacube.z_column.as_ref(), (0.0, 1.0));

    let size_column = datacube.size_column.as_ref().filter(|c| c.len() == rows);
    let (min_size, max_size) = bounds_or(size_column, (f64::NAN, f64::NAN));

    // Normalization range and per-row value of the color column, if it can be applied
    let color_mapping = datacube
        .colors
        .as_ref()
        .filter(|m| m.column.len() == rows)
        .and_then(|m| m.palette.as_ref().map(|palette| (&m.column, palette)));
    let distinct = color_mapping.map(|(column, _)| column.distinct_values());
    let (min_color, max_color) = match (color_mapping, &distinct) {
        (Some((Column::String { .. }, _)), Some(distinct)) => {
            (0.0, distinct.len().saturating_sub(1) as f64)
        }
        (Some((column, _)), _) => bounds_or(Some(column), (f64::NAN, f64::NAN)),
        (None, _) => (f64::NAN, f64::NAN),
    };

    let mut points = Vec::with_capacity(rows);
    let mut unaddressable = 0usize;
    for row in 0..rows {
        // Rows with an invalid numeric color value are not rendered at all
        if let Some(mapping) = &datacube.colors {
            if let Column::Number { values, .. } = &mapping.column {
                if values.get(row).map_or(true, |v| v.is_nan()) {
                    continue;
                }
            }
        }
        let Some(global_index) = u32::try_from(row).ok().and_then(|r| point_id(datacube.id, r)) else {
            unaddressable += 1;
            continue;
        };

        let x = x_column.value(row).unwrap_or(f64::NAN);
        let y = datacube.y_column.as_ref().and_then(|c| c.value(row)).unwrap_or(0.0);
        let z = datacube.z_column.as_ref().and_then(|c| c.value(row)).unwrap_or(1.0);

        let nx = (x - min_x) / (max_x - min_x) * size_x - 0.5 * size_x;
        let ny = (y - min_y) / (max_y - min_y) - 0.5 * size_y;
        let nz = (z - min_z) / (max_z - min_z) * size_z - 0.5 * size_z;

        let normalized_size = size_column
            .and_then(|c| c.value(row))
            .map(|s| (s - min_size) / (max_size - min_size))
            .filter(|s| *s != 0.0 && !s.is_nan());
        let size = normalized_size.map_or(DEFAULT_POINT_SIZE, |s| DEFAULT_POINT_SIZE * s as f32);

        let color = color_mapping
            .and_then(|(column, palette)| {
                let value = match (column, &distinct) {
                    (Column::String { values, .. }, Some(distinct)) => values
                        .get(row)
                        .and_then(|v| distinct.iter().position(|d| d == v))
                        .map(|i| i as f64),
                    _ => column.value(row),
                }?;
                let normalized = (value - min_color) / (max_color - min_color);
                palette.color_for_normalized_value(normalized as f32)
            })
            .unwrap_or([1.0, 1.0, 1.0]);

        points.push(PointRecord {
            position: Vec3::new(nx as f32, ny as f32, nz as f32),
            color,
            size,
            row: row as u32,
            global_index,
        });
    }
    if unaddressable > 0 {
        log::warn!(
            "datacube {}: {unaddressable} of {rows} rows have no pick id and are not drawn",
            datacube.id
        );
    }
    Some(points)
}

/// Outcome of reconciling a descriptor batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Ids retained before but absent from the batch.
    pub deleted: Vec<u32>,
    /// First datacube of the batch flagged as focused.
    pub focused: Option<u32>,
}

/// Retained datacubes, their cuboids and everything derived from them.
#[derive(Debug, Default)]
pub struct Scene {
    datacubes: Vec<Datacube>,
    cuboids: Vec<Cuboid>,
    positions: HashMap<u32, Vec2>,
    points: Vec<PointVertex>,
    /// Segment lists of line primitives, keyed by datacube id.
    line_segments: Vec<(u32, Vec<LineVertex>)>,
    selection_lines: Vec<LineVertex>,
    label_sets: Vec<LabelSet>,
    mesh_requests: Vec<MeshRequest>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a batch into the retained datacubes and deletes every id the batch omits.
    pub fn reconcile(&mut self, updates: Vec<DatacubeUpdate>) -> Reconciled {
        let mut kept = Vec::with_capacity(updates.len());
        let mut focused = None;
        for update in updates {
            let id = update.id;
            if let Some(existing) = self.datacubes.iter_mut().find(|d| d.id == id) {
                existing.merge(update);
            } else {
                self.datacubes.push(Datacube::from(update));
            }
            if focused.is_none() && self.datacube(id).is_some_and(|d| d.is_focused) {
                focused = Some(id);
            }
            kept.push(id);
        }

        let deleted: Vec<u32> = self
            .datacubes
            .iter()
            .map(|d| d.id)
            .filter(|id| !kept.contains(id))
            .collect();
        if !deleted.is_empty() {
            log::debug!("deleted datacubes: {deleted:?}");
            self.datacubes.retain(|d| kept.contains(&d.id));
            self.cuboids.retain(|c| kept.contains(&c.datacube_id));
            self.line_segments.retain(|(owner, _)| !deleted.contains(owner));
        }
        Reconciled { deleted, focused }
    }

    /// Replaces the floor positions of all datacubes.
    pub fn set_positions(&mut self, positions: HashMap<u32, Vec2>) {
        self.positions = positions;
    }

    #[must_use]
    pub fn position(&self, datacube_id: u32) -> Option<Vec2> {
        self.positions.get(&datacube_id).copied()
    }

    #[must_use]
    pub fn datacubes(&self) -> &[Datacube] {
        &self.datacubes
    }

    #[must_use]
    pub fn datacube(&self, datacube_id: u32) -> Option<&Datacube> {
        self.datacubes.iter().find(|d| d.id == datacube_id)
    }

    #[must_use]
    pub fn cuboids(&self) -> &[Cuboid] {
        &self.cuboids
    }

    /// Cuboid of a datacube.
    #[must_use]
    pub fn cuboid(&self, datacube_id: u32) -> Option<&Cuboid> {
        self.cuboids.iter().find(|c| c.datacube_id == datacube_id)
    }

    pub fn cuboid_mut(&mut self, datacube_id: u32) -> Option<&mut Cuboid> {
        self.cuboids.iter_mut().find(|c| c.datacube_id == datacube_id)
    }

    /// Camera center framing a focused datacube, keeping `center_y`.
    #[must_use]
    pub fn focus_center(&self, datacube_id: u32, center_y: f32) -> Option<Vec3> {
        let datacube = self.datacube(datacube_id)?;
        let position = self.position(datacube_id)?;
        Some(Vec3::new(
            position.x + datacube.extent.center_x(),
            center_y,
            position.y + datacube.extent.center_z(),
        ))
    }

    /// Applies an interactively resized extent to both the datacube and its cuboid.
    pub fn set_extent(&mut self, datacube_id: u32, extent: Extent) {
        if let Some(datacube) = self.datacubes.iter_mut().find(|d| d.id == datacube_id) {
            datacube.extent = extent;
        }
        if let Some(cuboid) = self.cuboid_mut(datacube_id) {
            cuboid.extent = extent;
        }
    }

    /// Creates, updates and animates cuboids to match the retained datacubes.
    pub fn rebuild_cuboids(&mut self, options: &Options) {
        let mut cuboids = Vec::with_capacity(self.datacubes.len());
        for datacube in &self.datacubes {
            let mut cuboid = match self.cuboids.iter().position(|c| c.datacube_id == datacube.id) {
                Some(index) => {
                    let mut existing = self.cuboids.swap_remove(index);
                    existing.animate_towards(datacube, options);
                    existing.apply_descriptor(datacube);
                    existing
                }
                None => Cuboid::new(datacube, options),
            };

            let wanted = datacube
                .mesh_asset
                .as_ref()
                .filter(|_| datacube.kind == DatacubeKind::MeshPrimitive)
                .map(|asset| asset.uri.clone());
            match wanted {
                Some(uri) if cuboid.mesh.uri() != Some(uri.as_str()) => {
                    self.mesh_requests.push(MeshRequest {
                        datacube_id: datacube.id,
                        uri: uri.clone(),
                    });
                    cuboid.mesh = MeshState::Loading(uri);
                    cuboid.id_buffer_only = cuboid.points.is_some();
                }
                Some(_) => {}
                None => cuboid.mesh = MeshState::None,
            }
            cuboids.push(cuboid);
        }
        self.cuboids = cuboids;
    }

    /// Whether any cuboid still waits for its mesh asset.
    #[must_use]
    pub fn is_loading_meshes(&self) -> bool {
        self.cuboids
            .iter()
            .any(|c| matches!(c.mesh, MeshState::Loading(_)))
    }

    /// Mesh assets requested since the last call.
    pub fn take_mesh_requests(&mut self) -> Vec<MeshRequest> {
        std::mem::take(&mut self.mesh_requests)
    }

    /// Records the outcome of a mesh load. Returns whether the cuboid still wants that asset.
    pub fn finish_mesh_load(&mut self, datacube_id: u32, uri: &str, loaded: bool) -> bool {
        let Some(cuboid) = self.cuboid_mut(datacube_id) else {
            return false;
        };
        if cuboid.mesh != MeshState::Loading(uri.to_string()) {
            return false;
        }
        if loaded {
            cuboid.mesh = MeshState::Loaded(uri.to_string());
            cuboid.id_buffer_only = true;
        } else {
            cuboid.mesh = MeshState::Failed(uri.to_string());
        }
        loaded
    }

    /// Steps every running cuboid animation. Returns whether anything moved.
    pub fn step_animations(&mut self, dt: f64) -> bool {
        let mut changed = false;
        for cuboid in &mut self.cuboids {
            changed |= cuboid.step_animation(dt);
        }
        changed
    }

    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.cuboids.iter().any(Cuboid::is_animating)
    }

    /// Rebuilds the shared point buffer and the line primitive segments.
    #[allow(clippy::cast_possible_truncation)]
    pub fn rebuild_points(&mut self) {
        let mut vertices = Vec::new();
        let mut line_segments = Vec::new();
        for cuboid in &mut self.cuboids {
            cuboid.points_from = 0;
            cuboid.points_count = 0;
            let Some(points) = cuboid.points.as_ref().filter(|p| !p.is_empty()) else {
                continue;
            };
            if !self.positions.contains_key(&cuboid.datacube_id) {
                continue;
            }
            let from = vertices.len();
            vertices.extend(points.iter().filter(|p| p.is_finite()).map(PointRecord::vertex));
            cuboid.points_from = from as u32;
            cuboid.points_count = (vertices.len() - from) as u32;

            if cuboid.kind == DatacubeKind::LinePrimitive {
                line_segments.push((cuboid.datacube_id, line_strip(&vertices[from..])));
            }
        }
        self.points = vertices;
        self.line_segments = line_segments;
    }

    /// Rebuilds labels, leader lines and selection wireframes.
    pub fn rebuild_decorations(&mut self) {
        let max_height = self
            .cuboids
            .iter()
            .map(|c| c.scale_y)
            .fold(f32::NEG_INFINITY, f32::max);

        let mut label_sets = Vec::new();
        let mut lines = Vec::new();
        for cuboid in &self.cuboids {
            let Some(&position) = self.positions.get(&cuboid.datacube_id) else {
                continue;
            };
            let has_points = cuboid.points.as_ref().is_some_and(|p| !p.is_empty());
            if has_points {
                if let Some(datacube) = self.datacube(cuboid.datacube_id) {
                    axis_labels(&mut label_sets, datacube, cuboid, position);
                }
            }

            let extent = &cuboid.extent;
            label_sets.push(LabelSet::single(Label::new(
                cuboid.title.clone(),
                Vec3::new(
                    position.x + extent.min_x + 0.1,
                    max_height + TITLE_OFFSET,
                    position.y + extent.max_z,
                ),
            )));

            if cuboid.is_selected {
                let corner_x = position.x + extent.min_x;
                let corner_z = position.y + extent.max_z;
                lines.push(LineVertex::new(
                    Vec3::new(corner_x, cuboid.scale_y, corner_z),
                    SELECTION_LINE_COLOR,
                ));
                lines.push(LineVertex::new(
                    Vec3::new(corner_x, max_height + LEADER_OFFSET, corner_z),
                    SELECTION_LINE_COLOR,
                ));
                for (a, b) in cuboid.bounds(position).edges() {
                    lines.push(LineVertex::new(a, SELECTION_LINE_COLOR));
                    lines.push(LineVertex::new(b, SELECTION_LINE_COLOR));
                }
            }
        }
        self.label_sets = label_sets;
        self.selection_lines = lines;
    }

    /// Vertices of the shared point buffer.
    #[must_use]
    pub fn points(&self) -> &[PointVertex] {
        &self.points
    }

    /// Line primitive segments, placed with the current cuboid transforms.
    #[must_use]
    pub fn line_batches(&self) -> Vec<LineBatch> {
        self.line_segments
            .iter()
            .filter_map(|(datacube_id, segments)| {
                let cuboid = self.cuboid(*datacube_id)?;
                let position = self.position(*datacube_id)?;
                Some(LineBatch::new(
                    Some(*datacube_id),
                    cuboid.placement(position),
                    segments.clone(),
                ))
            })
            .collect()
    }

    #[must_use]
    pub fn selection_lines(&self) -> &[LineVertex] {
        &self.selection_lines
    }

    #[must_use]
    pub fn label_sets(&self) -> &[LabelSet] {
        &self.label_sets
    }

    /// Positioned cuboids ordered far-to-near from `eye`.
    #[must_use]
    pub fn cuboids_by_distance(&self, eye: Vec3) -> Vec<(&Cuboid, Vec2)> {
        let mut sorted: Vec<(&Cuboid, Vec2, f32)> = self
            .cuboids
            .iter()
            .filter_map(|cuboid| {
                let position = *self.positions.get(&cuboid.datacube_id)?;
                let anchor = Vec3::new(position.x, cuboid.translate_y, position.y);
                Some((cuboid, position, anchor.distance_squared(eye)))
            })
            .collect();
        sorted.sort_by(|a, b| b.2.total_cmp(&a.2));
        sorted.into_iter().map(|(c, p, _)| (c, p)).collect()
    }

    /// Box instances in draw order. The cuboid with object id `hidden` is left out of the pre-depth target.
    #[must_use]
    pub fn cuboid_instances(&self, eye: Vec3, hidden: Option<u32>) -> Vec<CuboidInstance> {
        self.cuboids_by_distance(eye)
            .into_iter()
            .map(|(cuboid, position)| {
                let [r, g, b] = cuboid.color_rgb();
                CuboidInstance {
                    model: cuboid.model(position),
                    color: Vec4::new(r, g, b, 1.0),
                    id: cuboid.id,
                    id_buffer_only: cuboid.id_buffer_only,
                    has_sub_elements: cuboid.has_sub_elements(),
                    hidden: hidden == Some(cuboid.id),
                }
            })
            .collect()
    }

    /// Point slices in draw order, with the selected row of each datacube highlighted.
    #[must_use]
    pub fn point_draws(&self, eye: Vec3) -> Vec<PointDraw> {
        self.cuboids_by_distance(eye)
            .into_iter()
            .filter(|(cuboid, _)| cuboid.points_count > 0)
            .map(|(cuboid, position)| PointDraw {
                object_id: cuboid.id,
                model: cuboid.placement(position),
                range: cuboid.points_from..cuboid.points_from + cuboid.points_count,
                highlight: self
                    .datacube(cuboid.datacube_id)
                    .and_then(|d| d.selected_point_index)
                    .and_then(|row| point_id(cuboid.datacube_id, row)),
            })
            .collect()
    }
}

/// Connects consecutive points of one slice into segments.
fn line_strip(vertices: &[PointVertex]) -> Vec<LineVertex> {
    vertices
        .windows(2)
        .flat_map(|pair| {
            pair.iter().map(|v| LineVertex {
                position: v.position,
                color: v.color,
            })
        })
        .collect()
}

fn value_label(column: &Column, value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| column.format_value(v))
}

/// Name and range labels along every axis that has a column.
fn axis_labels(sets: &mut Vec<LabelSet>, datacube: &Datacube, cuboid: &Cuboid, position: Vec2) {
    let extent = &cuboid.extent;
    let (px, pz) = (position.x, position.y);
    let value_width = CUBOID_SIZE[0] * 0.45;

    if let Some(column) = &datacube.x_column {
        let (direction, up) = (Vec3::X, Vec3::NEG_Z);
        sets.push(LabelSet::new(
            vec![Label::new(column.name(), Vec3::new(px + extent.center_x(), 0.0, pz + extent.max_z + 0.15))
                .oriented(direction, up)
                .aligned(Alignment::Center)
                .elided(Elide::Middle, extent.width())
                .anchored(LineAnchor::Ascent)],
            true,
        ));
        for (value, x, alignment) in [
            (column.min(), extent.min_x, Alignment::Left),
            (column.max(), extent.max_x, Alignment::Right),
        ] {
            sets.push(LabelSet::new(
                vec![Label::new(value_label(column, value), Vec3::new(px + x, 0.0, pz + extent.max_z + 0.05))
                    .oriented(direction, up)
                    .aligned(alignment)
                    .elided(Elide::None, value_width)
                    .anchored(LineAnchor::Ascent)],
                false,
            ));
        }
    }

    if let Some(column) = &datacube.y_column {
        let (direction, up) = (Vec3::Y, Vec3::NEG_X);
        let x = px + extent.max_x;
        let z = pz + extent.max_z;
        sets.push(LabelSet::new(
            vec![Label::new(column.name(), Vec3::new(x + 0.15, cuboid.scale_y * 0.5, z))
                .oriented(direction, up)
                .aligned(Alignment::Center)
                .elided(Elide::Middle, 1.0)
                .anchored(LineAnchor::Ascent)],
            true,
        ));
        for (value, y, alignment) in [
            (column.min(), 0.0, Alignment::Left),
            (column.max(), cuboid.scale_y, Alignment::Right),
        ] {
            sets.push(LabelSet::new(
                vec![Label::new(value_label(column, value), Vec3::new(x + 0.05, y, z))
                    .oriented(direction, up)
                    .aligned(alignment)
                    .elided(Elide::None, cuboid.scale_y * 0.45)
                    .anchored(LineAnchor::Ascent)],
                false,
            ));
        }
    }

    if let Some(column) = &datacube.z_column {
        let (direction, up) = (Vec3::Z, Vec3::X);
        let x = px + extent.min_x;
        sets.push(LabelSet::new(
            vec![Label::new(column.name(), Vec3::new(x - 0.15, 0.0, pz + extent.center_z()))
                .oriented(direction, up)
                .aligned(Alignment::Center)
                .elided(Elide::Middle, extent.depth())
                .anchored(LineAnchor::Ascent)],
            true,
        ));
        for (value, z, alignment) in [
            (column.min(), extent.min_z, Alignment::Left),
            (column.max(), extent.max_z, Alignment::Right),
        ] {
            sets.push(LabelSet::new(
                vec![Label::new(value_label(column, value), Vec3::new(x - 0.05, 0.0, pz + z))
                    .oriented(direction, up)
                    .aligned(alignment)
                    .elided(Elide::None, value_width)
                    .anchored(LineAnchor::Ascent)],
                false,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacubes_core::{ColorPalette, ColorStop};

    fn positioned(scene: &mut Scene, ids: &[u32]) {
        scene.set_positions(ids.iter().map(|&id| (id, Vec2::new(id as f32, 0.0))).collect());
    }

    #[test]
    fn test_reconcile_merges_and_deletes() {
        let mut scene = Scene::new();
        scene.reconcile((1..=3).map(DatacubeUpdate::new).collect());
        scene.reconcile(vec![
            DatacubeUpdate::new(2).relative_height(5.0),
            DatacubeUpdate::new(4).relative_height(1.0),
        ]);
        let ids: Vec<u32> = scene.datacubes().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(scene.datacube(2).map(|d| d.relative_height), Some(5.0));
    }

    #[test]
    fn test_new_cuboid_starts_at_target() {
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(1).relative_height(0.6)]);
        scene.rebuild_cuboids(&Options::default());
        let cuboid = scene.cuboid(1).unwrap();
        assert_eq!(cuboid.scale_y, 0.6);
        assert_eq!(cuboid.translate_y, 0.3);
        assert!(!cuboid.is_animating());
        assert_eq!(cuboid.id, u32::MAX - 1);
    }

    #[test]
    fn test_pending_uses_pending_height() {
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(1).pending(true).erroneous(true)]);
        scene.rebuild_cuboids(&Options::default());
        let cuboid = scene.cuboid(1).unwrap();
        assert!((cuboid.scale_y - 0.1).abs() < 1e-6);
        assert!((cuboid.translate_y - 0.05).abs() < 1e-6);
        assert_eq!(cuboid.color_lab, normalize_lab(ERROR_LAB));
    }

    #[test]
    fn test_existing_pending_cuboid_keeps_kind_color() {
        let options = Options::default();
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(1).relative_height(1.0)]);
        scene.rebuild_cuboids(&options);
        scene.reconcile(vec![DatacubeUpdate::new(1).pending(true).erroneous(true)]);
        scene.rebuild_cuboids(&options);
        assert!(scene.cuboid(1).unwrap().is_animating());

        let mut steps = 0;
        while scene.is_animating() && steps < 10_000 {
            scene.step_animations(1.0 / 60.0);
            steps += 1;
        }
        let cuboid = scene.cuboid(1).unwrap();
        let expected = normalize_lab(DatacubeKind::Dataset.color_lab());
        for (actual, expected) in cuboid.color_lab.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_height_change_animates_to_target() {
        let options = Options::default();
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(1).relative_height(1.0)]);
        scene.rebuild_cuboids(&options);
        scene.reconcile(vec![DatacubeUpdate::new(1).relative_height(0.5)]);
        scene.rebuild_cuboids(&options);
        assert!(scene.cuboid(1).unwrap().is_animating());

        let mut steps = 0;
        while scene.is_animating() && steps < 10_000 {
            scene.step_animations(1.0 / 60.0);
            steps += 1;
        }
        let cuboid = scene.cuboid(1).unwrap();
        assert!(!cuboid.is_animating());
        assert!((cuboid.scale_y - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_tiny_change_does_not_animate() {
        let options = Options::default();
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(1).relative_height(1.0)]);
        scene.rebuild_cuboids(&options);
        scene.reconcile(vec![DatacubeUpdate::new(1).relative_height(1.0005)]);
        scene.rebuild_cuboids(&options);
        assert!(!scene.cuboid(1).unwrap().is_animating());
    }

    #[test]
    fn test_point_derivation_defaults() {
        let datacube = Datacube::from(
            DatacubeUpdate::new(3)
                .kind(DatacubeKind::PointPrimitive)
                .x_column(Column::number("x", vec![0.0, 10.0])),
        );
        let points = derive_points(&datacube).unwrap();
        assert_eq!(points.len(), 2);
        // Missing y column: value 0 in [0, 1]; missing z column: value 1 in [0, 1]
        assert_eq!(points[0].position, Vec3::new(-0.25, -0.5, 0.25));
        assert_eq!(points[1].position, Vec3::new(0.25, -0.5, 0.25));
        assert_eq!(points[0].size, DEFAULT_POINT_SIZE);
        assert_eq!(points[0].color, [1.0, 1.0, 1.0]);
        assert_eq!(Some(points[1].global_index), point_id(3, 1));
    }

    #[test]
    fn test_rows_beyond_the_pick_id_range_are_not_drawn() {
        let points_of = |id| {
            let datacube = Datacube::from(
                DatacubeUpdate::new(id)
                    .kind(DatacubeKind::PointPrimitive)
                    .x_column(Column::number("x", vec![0.0, 1.0, 2.0])),
            );
            derive_points(&datacube).unwrap()
        };
        assert_eq!(points_of(857).len(), 3);
        assert!(points_of(858).is_empty());
        assert!(points_of(4_000).is_empty());
    }

    #[test]
    fn test_nan_color_rows_are_dropped_but_keep_row_index() {
        let palette = ColorPalette::new(vec![
            ColorStop::new(0.0, "rgb(0, 0, 0)"),
            ColorStop::new(1.0, "rgb(255, 255, 255)"),
        ]);
        let datacube = Datacube::from(
            DatacubeUpdate::new(1)
                .kind(DatacubeKind::PointPrimitive)
                .x_column(Column::number("x", vec![0.0, 1.0, 2.0]))
                .colors(Column::number("c", vec![0.0, f64::NAN, 1.0]), Some(palette)),
        );
        let points = derive_points(&datacube).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].row, 2);
        assert_eq!(points[0].color, [0.0, 0.0, 0.0]);
        assert_eq!(points[1].color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_string_colors_use_distinct_index() {
        let palette = ColorPalette::new(vec![
            ColorStop::new(0.0, "rgb(255, 0, 0)"),
            ColorStop::new(1.0, "rgb(0, 0, 255)"),
        ]);
        let datacube = Datacube::from(
            DatacubeUpdate::new(1)
                .kind(DatacubeKind::PointPrimitive)
                .x_column(Column::number("x", vec![0.0, 1.0, 2.0]))
                .colors(
                    Column::string("c", vec!["a".into(), "b".into(), "a".into()]),
                    Some(palette),
                ),
        );
        let points = derive_points(&datacube).unwrap();
        assert_eq!(points[0].color, [1.0, 0.0, 0.0]);
        assert_eq!(points[1].color, [0.0, 0.0, 1.0]);
        assert_eq!(points[2].color, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_size_column_scales_points() {
        let datacube = Datacube::from(
            DatacubeUpdate::new(1)
                .kind(DatacubeKind::PointPrimitive)
                .x_column(Column::number("x", vec![0.0, 1.0, 2.0]))
                .size_column(Column::number("s", vec![0.0, 5.0, 10.0])),
        );
        let sizes: Vec<f32> = derive_points(&datacube).unwrap().iter().map(|p| p.size).collect();
        assert_eq!(sizes, vec![2.5, 1.25, 2.5]);
    }

    #[test]
    fn test_non_primitives_have_no_points() {
        let datacube = Datacube::from(
            DatacubeUpdate::new(1)
                .kind(DatacubeKind::Dataset)
                .x_column(Column::number("x", vec![0.0, 1.0])),
        );
        assert!(derive_points(&datacube).is_none());
    }

    #[test]
    fn test_shared_buffer_slices() {
        let options = Options::default();
        let mut scene = Scene::new();
        scene.reconcile(vec![
            DatacubeUpdate::new(1)
                .kind(DatacubeKind::PointPrimitive)
                .x_column(Column::number("x", vec![0.0, 1.0])),
            DatacubeUpdate::new(2)
                .kind(DatacubeKind::LinePrimitive)
                .x_column(Column::number("x", vec![0.0, 1.0, 2.0])),
        ]);
        positioned(&mut scene, &[1, 2]);
        scene.rebuild_cuboids(&options);
        scene.rebuild_points();

        assert_eq!(scene.points().len(), 5);
        let second = scene.cuboid(2).unwrap();
        assert_eq!((second.points_from, second.points_count), (2, 3));
        assert!(second.id_buffer_only);

        // Two segments from the line primitive's own three points
        let batches = scene.line_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].owner, Some(2));
        assert_eq!(batches[0].vertices.len(), 4);
    }

    #[test]
    fn test_unpositioned_cuboids_are_skipped() {
        let options = Options::default();
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(1), DatacubeUpdate::new(2)]);
        positioned(&mut scene, &[2]);
        scene.rebuild_cuboids(&options);
        let instances = scene.cuboid_instances(Vec3::new(0.0, 2.0, 5.0), None);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, object_id(2));
    }

    #[test]
    fn test_cuboids_sorted_far_to_near() {
        let options = Options::default();
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(1), DatacubeUpdate::new(2)]);
        positioned(&mut scene, &[1, 2]);
        scene.rebuild_cuboids(&options);
        let eye = Vec3::new(10.0, 0.0, 0.0);
        let order: Vec<u32> = scene
            .cuboids_by_distance(eye)
            .iter()
            .map(|(c, _)| c.datacube_id)
            .collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_selection_draws_wireframe_and_leader() {
        let options = Options::default();
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(1).selected(true).label("Cars")]);
        positioned(&mut scene, &[1]);
        scene.rebuild_cuboids(&options);
        scene.rebuild_decorations();
        // One leader line plus twelve edges
        assert_eq!(scene.selection_lines().len(), 26);
        let title = &scene.label_sets()[0].labels[0];
        assert_eq!(title.text, "Cars");
        assert!((title.position.y - (1.0 + TITLE_OFFSET)).abs() < 1e-6);
    }

    #[test]
    fn test_axis_labels_for_point_data() {
        let options = Options::default();
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(1)
            .kind(DatacubeKind::PointPrimitive)
            .x_column(Column::number("weight", vec![1.0, 2.556]))
            .y_column(Column::number("height", vec![3.0, 4.0]))]);
        positioned(&mut scene, &[1]);
        scene.rebuild_cuboids(&options);
        scene.rebuild_decorations();
        // Three per axis plus the title
        assert_eq!(scene.label_sets().len(), 7);
        let texts: Vec<&str> = scene
            .label_sets()
            .iter()
            .map(|set| set.labels[0].text.as_str())
            .collect();
        assert!(texts.contains(&"weight"));
        assert!(texts.contains(&"2.56"));
        assert!(texts.contains(&"Point Primitive"));
    }

    #[test]
    fn test_mesh_request_and_load() {
        let options = Options::default();
        let mut scene = Scene::new();
        scene.reconcile(vec![DatacubeUpdate::new(5)
            .kind(DatacubeKind::MeshPrimitive)
            .mesh_asset("assets/tree.glb", Some(2.0))]);
        scene.rebuild_cuboids(&options);
        let requests = scene.take_mesh_requests();
        assert_eq!(requests, vec![MeshRequest { datacube_id: 5, uri: "assets/tree.glb".into() }]);
        assert!(!scene.cuboid(5).unwrap().id_buffer_only);

        // A rebuild while loading does not request again
        scene.rebuild_cuboids(&options);
        assert!(scene.take_mesh_requests().is_empty());

        assert!(scene.finish_mesh_load(5, "assets/tree.glb", true));
        let cuboid = scene.cuboid(5).unwrap();
        assert!(cuboid.id_buffer_only);
        assert_eq!(cuboid.mesh_instances(), vec![[0.0, -0.5, 0.0]]);
        assert_eq!(cuboid.mesh_instance_scale(), Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_focus_center() {
        let mut scene = Scene::new();
        let outcome = scene.reconcile(vec![DatacubeUpdate::new(1)
            .focused(true)
            .extent(Extent::new(-0.25, 0.75, -0.25, 0.25))]);
        assert_eq!(outcome.focused, Some(1));
        assert_eq!(scene.focus_center(1, 0.3), None);
        scene.set_positions(HashMap::from([(1, Vec2::new(2.0, 3.0))]));
        assert_eq!(scene.focus_center(1, 0.3), Some(Vec3::new(2.25, 0.3, 3.0)));
    }
}
