//! The datacube model consumed by the renderer.

use serde::{Deserialize, Serialize};

use crate::color::{ColorPalette, DATASET_LAB, FILTERING_LAB, MAPPING_LAB, RENDERING_LAB};

/// Size of the unit cuboid every datacube is scaled from.
pub const CUBOID_SIZE: [f32; 3] = [0.5, 1.0, 0.5];

/// Node kind a datacube was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatacubeKind {
    Dataset,
    DateFilter,
    ColorMapping,
    PointPrimitive,
    LinePrimitive,
    CubePrimitive,
    MeshPrimitive,
    SyncToExternalViewer,
}

impl DatacubeKind {
    /// Whether the datacube renders its data as geometry (points, lines, cubes, meshes).
    #[must_use]
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            Self::PointPrimitive | Self::LinePrimitive | Self::CubePrimitive | Self::MeshPrimitive
        )
    }

    /// Base color in L*a*b*.
    #[must_use]
    pub fn color_lab(self) -> [f32; 3] {
        match self {
            Self::Dataset => DATASET_LAB,
            Self::DateFilter => FILTERING_LAB,
            Self::ColorMapping => MAPPING_LAB,
            Self::PointPrimitive
            | Self::LinePrimitive
            | Self::CubePrimitive
            | Self::MeshPrimitive
            | Self::SyncToExternalViewer => RENDERING_LAB,
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dataset => "Dataset",
            Self::DateFilter => "Date Filter",
            Self::ColorMapping => "Color Mapping",
            Self::PointPrimitive => "Point Primitive",
            Self::LinePrimitive => "Line Primitive",
            Self::CubePrimitive => "Cube Primitive",
            Self::MeshPrimitive => "Mesh Primitive",
            Self::SyncToExternalViewer => "Sync To External Viewer",
        }
    }
}

/// Footprint of a datacube on the floor, relative to its position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            min_x: -0.5 * CUBOID_SIZE[0],
            max_x: 0.5 * CUBOID_SIZE[0],
            min_z: -0.5 * CUBOID_SIZE[2],
            max_z: 0.5 * CUBOID_SIZE[2],
        }
    }
}

impl Extent {
    /// Creates a new extent.
    #[must_use]
    pub fn new(min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> Self {
        Self {
            min_x,
            max_x,
            min_z,
            max_z,
        }
    }

    #[must_use]
    pub fn center_x(&self) -> f32 {
        (self.max_x + self.min_x) * 0.5
    }

    #[must_use]
    pub fn center_z(&self) -> f32 {
        (self.max_z + self.min_z) * 0.5
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn depth(&self) -> f32 {
        self.max_z - self.min_z
    }

    /// Scale applied to the unit cuboid along x and z.
    #[must_use]
    pub fn scale(&self) -> (f32, f32) {
        (self.width() / CUBOID_SIZE[0], self.depth() / CUBOID_SIZE[2])
    }
}

/// A data column attached to a datacube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Number { name: String, values: Vec<f64> },
    /// Dates as unix timestamps in milliseconds.
    Date { name: String, values: Vec<i64> },
    String { name: String, values: Vec<String> },
}

impl Column {
    /// Creates a numeric column.
    pub fn number(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::Number {
            name: name.into(),
            values,
        }
    }

    /// Creates a date column.
    pub fn date(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self::Date {
            name: name.into(),
            values,
        }
    }

    /// Creates a string column.
    pub fn string(name: impl Into<String>, values: Vec<String>) -> Self {
        Self::String {
            name: name.into(),
            values,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Number { name, .. } | Self::Date { name, .. } | Self::String { name, .. } => {
                name
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Number { values, .. } => values.len(),
            Self::Date { values, .. } => values.len(),
            Self::String { values, .. } => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric value of a row. String columns have none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self, row: usize) -> Option<f64> {
        match self {
            Self::Number { values, .. } => values.get(row).copied(),
            Self::Date { values, .. } => values.get(row).map(|&v| v as f64),
            Self::String { .. } => None,
        }
    }

    /// Smallest non-NaN numeric value.
    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.numeric_values().reduce(f64::min)
    }

    /// Largest non-NaN numeric value.
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.numeric_values().reduce(f64::max)
    }

    fn numeric_values(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len())
            .filter_map(|row| self.value(row))
            .filter(|v| !v.is_nan())
    }

    /// Distinct string values in order of first occurrence.
    #[must_use]
    pub fn distinct_values(&self) -> Vec<&str> {
        let Self::String { values, .. } = self else {
            return Vec::new();
        };
        let mut distinct: Vec<&str> = Vec::new();
        for value in values {
            if !distinct.contains(&value.as_str()) {
                distinct.push(value);
            }
        }
        distinct
    }

    /// Formats a value of this column for display on an axis.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn format_value(&self, value: f64) -> String {
        match self {
            Self::Date { .. } => chrono::DateTime::from_timestamp_millis(value as i64)
                .map_or_else(String::new, |date| date.format("%Y-%m-%d").to_string()),
            _ => {
                let rounded = (value * 100.0).round() / 100.0;
                format!("{rounded}")
            }
        }
    }
}

/// Maps a column onto a palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorMapping {
    pub column: Column,
    pub palette: Option<ColorPalette>,
}

/// A glTF asset instanced at every point of a mesh primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshAsset {
    /// Path or URI of the `.gltf` / `.glb` file.
    pub uri: String,
    /// Uniform scale of each instance (1 if unset).
    pub scale: Option<f32>,
}

/// A datacube as supplied by the node editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datacube {
    /// Unique among live datacubes.
    pub id: u32,
    pub kind: DatacubeKind,
    pub extent: Extent,
    /// Height relative to the tallest datacube.
    pub relative_height: f32,
    pub is_pending: bool,
    pub is_erroneous: bool,
    pub is_selected: bool,
    pub is_focused: bool,
    pub x_column: Option<Column>,
    pub y_column: Option<Column>,
    pub z_column: Option<Column>,
    pub size_column: Option<Column>,
    pub colors: Option<ColorMapping>,
    pub mesh_asset: Option<MeshAsset>,
    /// Title rendered above the datacube.
    pub label: Option<String>,
    /// Row highlighted in the point rendering.
    pub selected_point_index: Option<u32>,
}

impl Datacube {
    /// Creates a datacube with default extent and full height.
    #[must_use]
    pub fn new(id: u32, kind: DatacubeKind) -> Self {
        Self {
            id,
            kind,
            extent: Extent::default(),
            relative_height: 1.0,
            is_pending: false,
            is_erroneous: false,
            is_selected: false,
            is_focused: false,
            x_column: None,
            y_column: None,
            z_column: None,
            size_column: None,
            colors: None,
            mesh_asset: None,
            label: None,
            selected_point_index: None,
        }
    }

    /// Whether the datacube carries per-row geometry.
    #[must_use]
    pub fn has_point_data(&self) -> bool {
        self.kind.is_primitive() && self.x_column.is_some()
    }

    /// Applies the fields set in `update`, leaving all others untouched.
    pub fn merge(&mut self, update: DatacubeUpdate) {
        let DatacubeUpdate {
            id: _,
            kind,
            extent,
            relative_height,
            is_pending,
            is_erroneous,
            is_selected,
            is_focused,
            x_column,
            y_column,
            z_column,
            size_column,
            colors,
            mesh_asset,
            label,
            selected_point_index,
        } = update;

        if let Some(kind) = kind {
            self.kind = kind;
        }
        if let Some(extent) = extent {
            self.extent = extent;
        }
        if let Some(relative_height) = relative_height {
            self.relative_height = relative_height;
        }
        if let Some(is_pending) = is_pending {
            self.is_pending = is_pending;
        }
        if let Some(is_erroneous) = is_erroneous {
            self.is_erroneous = is_erroneous;
        }
        if let Some(is_selected) = is_selected {
            self.is_selected = is_selected;
        }
        if let Some(is_focused) = is_focused {
            self.is_focused = is_focused;
        }
        if let Some(x_column) = x_column {
            self.x_column = x_column;
        }
        if let Some(y_column) = y_column {
            self.y_column = y_column;
        }
        if let Some(z_column) = z_column {
            self.z_column = z_column;
        }
        if let Some(size_column) = size_column {
            self.size_column = size_column;
        }
        if let Some(colors) = colors {
            self.colors = colors;
        }
        if let Some(mesh_asset) = mesh_asset {
            self.mesh_asset = mesh_asset;
        }
        if let Some(label) = label {
            self.label = label;
        }
        if let Some(selected_point_index) = selected_point_index {
            self.selected_point_index = selected_point_index;
        }
    }
}

impl From<DatacubeUpdate> for Datacube {
    fn from(update: DatacubeUpdate) -> Self {
        let mut datacube = Datacube::new(
            update.id,
            update.kind.unwrap_or(DatacubeKind::Dataset),
        );
        datacube.merge(update);
        datacube
    }
}

/// A partial datacube description.
///
/// Fields left at `None` keep their current value when merged. Nullable fields use a
/// nested option so an update can clear them with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(clippy::option_option)]
pub struct DatacubeUpdate {
    pub id: u32,
    pub kind: Option<DatacubeKind>,
    pub extent: Option<Extent>,
    pub relative_height: Option<f32>,
    pub is_pending: Option<bool>,
    pub is_erroneous: Option<bool>,
    pub is_selected: Option<bool>,
    pub is_focused: Option<bool>,
    pub x_column: Option<Option<Column>>,
    pub y_column: Option<Option<Column>>,
    pub z_column: Option<Option<Column>>,
    pub size_column: Option<Option<Column>>,
    pub colors: Option<Option<ColorMapping>>,
    pub mesh_asset: Option<Option<MeshAsset>>,
    pub label: Option<Option<String>>,
    pub selected_point_index: Option<Option<u32>>,
}

impl DatacubeUpdate {
    /// Creates an update that changes nothing.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: DatacubeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    #[must_use]
    pub fn relative_height(mut self, height: f32) -> Self {
        self.relative_height = Some(height);
        self
    }

    #[must_use]
    pub fn pending(mut self, pending: bool) -> Self {
        self.is_pending = Some(pending);
        self
    }

    #[must_use]
    pub fn erroneous(mut self, erroneous: bool) -> Self {
        self.is_erroneous = Some(erroneous);
        self
    }

    #[must_use]
    pub fn selected(mut self, selected: bool) -> Self {
        self.is_selected = Some(selected);
        self
    }

    #[must_use]
    pub fn focused(mut self, focused: bool) -> Self {
        self.is_focused = Some(focused);
        self
    }

    #[must_use]
    pub fn x_column(mut self, column: Column) -> Self {
        self.x_column = Some(Some(column));
        self
    }

    #[must_use]
    pub fn y_column(mut self, column: Column) -> Self {
        self.y_column = Some(Some(column));
        self
    }

    #[must_use]
    pub fn z_column(mut self, column: Column) -> Self {
        self.z_column = Some(Some(column));
        self
    }

    #[must_use]
    pub fn size_column(mut self, column: Column) -> Self {
        self.size_column = Some(Some(column));
        self
    }

    #[must_use]
    pub fn colors(mut self, column: Column, palette: Option<ColorPalette>) -> Self {
        self.colors = Some(Some(ColorMapping { column, palette }));
        self
    }

    #[must_use]
    pub fn mesh_asset(mut self, uri: impl Into<String>, scale: Option<f32>) -> Self {
        self.mesh_asset = Some(Some(MeshAsset {
            uri: uri.into(),
            scale,
        }));
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(Some(label.into()));
        self
    }

    #[must_use]
    pub fn selected_point_index(mut self, index: Option<u32>) -> Self {
        self.selected_point_index = Some(index);
        self
    }
}

impl From<Datacube> for DatacubeUpdate {
    fn from(datacube: Datacube) -> Self {
        Self {
            id: datacube.id,
            kind: Some(datacube.kind),
            extent: Some(datacube.extent),
            relative_height: Some(datacube.relative_height),
            is_pending: Some(datacube.is_pending),
            is_erroneous: Some(datacube.is_erroneous),
            is_selected: Some(datacube.is_selected),
            is_focused: Some(datacube.is_focused),
            x_column: Some(datacube.x_column),
            y_column: Some(datacube.y_column),
            z_column: Some(datacube.z_column),
            size_column: Some(datacube.size_column),
            colors: Some(datacube.colors),
            mesh_asset: Some(datacube.mesh_asset),
            label: Some(datacube.label),
            selected_point_index: Some(datacube.selected_point_index),
        }
    }
}
