//! Picking and selection system.
//!
//! Every pickable element is rendered into an RGBA8 ID buffer with a 32-bit id split into
//! its four bytes (red holds the lowest byte). Zero is the background. Datacubes use
//! `u32::MAX - datacube_id`; rows of a datacube use
//! `u32::MAX - ((datacube_id + 1) * ELEMENTS_PER_OBJECT + row)`, so both kinds of id can be
//! told apart after read-back without a lookup table.

use glam::{Mat4, Vec2, Vec3};

use crate::error::{DatacubesError, Result};

/// Number of rows addressable per datacube.
pub const ELEMENTS_PER_OBJECT: u32 = 5_000_000;

/// Id of pixels not covered by any datacube.
pub const BACKGROUND_ID: u32 = 0;

/// Splits an id into RGBA8 bytes.
#[must_use]
pub fn encode_id(id: u32) -> [u8; 4] {
    id.to_le_bytes()
}

/// Reassembles an id from RGBA8 bytes.
#[must_use]
pub fn decode_id(rgba: [u8; 4]) -> u32 {
    u32::from_le_bytes(rgba)
}

/// Encodes an id as normalized color channels, as written by the shaders.
#[must_use]
pub fn encode_id_normalized(id: u32) -> [f32; 4] {
    encode_id(id).map(|byte| f32::from(byte) / 255.0)
}

/// Reassembles an id from normalized color channels.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn decode_id_normalized(rgba: [f32; 4]) -> u32 {
    decode_id(rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
}

/// Id of a datacube's bounding box.
#[must_use]
pub fn object_id(datacube_id: u32) -> u32 {
    u32::MAX - datacube_id
}

/// Id of one row of a datacube, or `None` if it does not fit into 32 bits.
#[must_use]
pub fn point_id(datacube_id: u32, row: u32) -> Option<u32> {
    if row >= ELEMENTS_PER_OBJECT {
        return None;
    }
    let offset = (u64::from(datacube_id) + 1) * u64::from(ELEMENTS_PER_OBJECT) + u64::from(row);
    u64::from(u32::MAX)
        .checked_sub(offset)
        .and_then(|id| u32::try_from(id).ok())
}

/// What a value read from the ID buffer refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedId {
    pub datacube_id: u32,
    /// Source row for point ids.
    pub point_index: Option<u32>,
}

/// Decodes an ID-buffer value. Returns `None` for the background.
#[must_use]
pub fn decode_pick_value(value: u32) -> Option<DecodedId> {
    if value == BACKGROUND_ID {
        return None;
    }
    let inverted = u32::MAX - value;
    if inverted > ELEMENTS_PER_OBJECT - 1 {
        let datacube_id = (inverted - ELEMENTS_PER_OBJECT) / ELEMENTS_PER_OBJECT;
        let row = inverted - (datacube_id + 1) * ELEMENTS_PER_OBJECT;
        Some(DecodedId {
            datacube_id,
            point_index: Some(row),
        })
    } else {
        Some(DecodedId {
            datacube_id: inverted,
            point_index: None,
        })
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Creates a box from two corners.
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The twelve edges as pairs of corners.
    #[must_use]
    pub fn edges(&self) -> [(Vec3, Vec3); 12] {
        let (a, b) = (self.min, self.max);
        let corner = |x: bool, y: bool, z: bool| {
            Vec3::new(
                if x { b.x } else { a.x },
                if y { b.y } else { a.y },
                if z { b.z } else { a.z },
            )
        };
        [
            (corner(false, false, false), corner(true, false, false)),
            (corner(false, true, false), corner(true, true, false)),
            (corner(false, false, true), corner(true, false, true)),
            (corner(false, true, true), corner(true, true, true)),
            (corner(false, false, false), corner(false, true, false)),
            (corner(true, false, false), corner(true, true, false)),
            (corner(false, false, true), corner(false, true, true)),
            (corner(true, false, true), corner(true, true, true)),
            (corner(false, false, false), corner(false, false, true)),
            (corner(true, false, false), corner(true, false, true)),
            (corner(false, true, false), corner(false, true, true)),
            (corner(true, true, false), corner(true, true, true)),
        ]
    }
}

/// Which planes of a bounding box lie within tolerance of a point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct BoundingBoxFaces {
    pub x_min: bool,
    pub x_max: bool,
    pub y_min: bool,
    pub y_max: bool,
    pub z_min: bool,
    pub z_max: bool,
}

impl BoundingBoxFaces {
    /// Tests `point` against the six planes of `bounds`.
    #[must_use]
    pub fn hovered(bounds: &Aabb, point: Vec3, tolerance: f32) -> Self {
        let near = |a: f32, b: f32| (a - b).abs() <= tolerance;
        Self {
            x_min: near(point.x, bounds.min.x),
            x_max: near(point.x, bounds.max.x),
            y_min: near(point.y, bounds.min.y),
            y_max: near(point.y, bounds.max.y),
            z_min: near(point.z, bounds.min.z),
            z_max: near(point.z, bounds.max.z),
        }
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.x_min || self.x_max || self.y_min || self.y_max || self.z_min || self.z_max
    }
}

/// Resize cursor the host shows while hovering a datacube edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorAffordance {
    #[default]
    Default,
    /// Horizontal (x) resize.
    EwResize,
    /// Depth (z) resize.
    NsResize,
    /// Diagonal resize, `x_min`/`z_max` or `x_max`/`z_min` corner.
    NeswResize,
    /// Diagonal resize, `x_min`/`z_min` or `x_max`/`z_max` corner.
    NwseResize,
}

impl CursorAffordance {
    /// Derives the resize cursor from hovered side faces.
    #[must_use]
    pub fn from_hovered_faces(faces: &BoundingBoxFaces) -> Self {
        let x = faces.x_min || faces.x_max;
        let z = faces.z_min || faces.z_max;
        match (x, z) {
            (true, true) => {
                if (faces.x_min && faces.z_min) || (faces.x_max && faces.z_max) {
                    Self::NwseResize
                } else {
                    Self::NeswResize
                }
            }
            (true, false) => Self::EwResize,
            (false, true) => Self::NsResize,
            (false, false) => Self::Default,
        }
    }

    /// Parses a CSS cursor name.
    #[must_use]
    pub fn from_css(name: &str) -> Self {
        match name {
            "ew-resize" => Self::EwResize,
            "ns-resize" => Self::NsResize,
            "nesw-resize" => Self::NeswResize,
            "nwse-resize" => Self::NwseResize,
            _ => Self::Default,
        }
    }

    /// Whether a resize with this cursor moves an x edge.
    #[must_use]
    pub fn resizes_x(self) -> bool {
        matches!(self, Self::EwResize | Self::NeswResize | Self::NwseResize)
    }

    /// Whether a resize with this cursor moves a z edge.
    #[must_use]
    pub fn resizes_z(self) -> bool {
        matches!(self, Self::NsResize | Self::NeswResize | Self::NwseResize)
    }
}

/// Result of a pick operation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PickResult {
    /// Picked datacube, 0 if nothing was hit.
    pub datacube_id: u32,

    /// Row of the picked point, if a point was hit.
    pub point_index: Option<u32>,

    /// The world position of the pick point.
    pub world_position: Option<Vec3>,

    /// The depth of the pick point.
    pub depth: f32,

    /// Bounding-box planes near the pick point.
    pub faces: BoundingBoxFaces,
}

impl PickResult {
    /// Whether any datacube was hit.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.datacube_id != BACKGROUND_ID
    }
}

/// CPU copy of the ID buffer and the pre-depth buffer of one stable frame.
#[derive(Debug, Clone, PartialEq)]
pub struct IdBufferCapture {
    width: u32,
    height: u32,
    ids: Vec<u32>,
    depths: Vec<f32>,
}

impl IdBufferCapture {
    /// Creates a capture from decoded ids and depths, both row-major with top-left origin.
    pub fn new(width: u32, height: u32, ids: Vec<u32>, depths: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        for actual in [ids.len(), depths.len()] {
            if actual != expected {
                return Err(DatacubesError::SizeMismatch { expected, actual });
            }
        }
        Ok(Self {
            width,
            height,
            ids,
            depths,
        })
    }

    /// Creates a capture from tightly packed RGBA8 pixels.
    pub fn from_rgba8(width: u32, height: u32, rgba: &[u8], depths: Vec<f32>) -> Result<Self> {
        let ids = rgba
            .chunks_exact(4)
            .map(|px| decode_id([px[0], px[1], px[2], px[3]]))
            .collect();
        Self::new(width, height, ids, depths)
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Maps a position normalized to the canvas (`[0, 1]`, top-left origin) to a pixel.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn pixel_at(&self, normalized: Vec2) -> Option<(u32, u32)> {
        if self.width == 0
            || self.height == 0
            || !(0.0..=1.0).contains(&normalized.x)
            || !(0.0..=1.0).contains(&normalized.y)
        {
            return None;
        }
        let x = (normalized.x * self.width as f32).round() as u32;
        let y = (normalized.y * self.height as f32).round() as u32;
        Some((x.min(self.width - 1), y.min(self.height - 1)))
    }

    /// Raw id at a pixel.
    #[must_use]
    pub fn id_at(&self, x: u32, y: u32) -> u32 {
        self.index(x, y).map_or(BACKGROUND_ID, |i| self.ids[i])
    }

    /// Depth at a pixel, 1.0 where nothing was drawn.
    #[must_use]
    pub fn depth_at(&self, x: u32, y: u32) -> f32 {
        self.index(x, y).map_or(1.0, |i| self.depths[i])
    }

    /// Reconstructs the world position under a pixel from its captured depth.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn world_position_at(&self, x: u32, y: u32, view_projection_inverse: &Mat4) -> Option<Vec3> {
        let depth = self.depth_at(x, y);
        if !depth.is_finite() || depth >= 1.0 {
            return None;
        }
        let ndc = Vec3::new(
            (x as f32 + 0.5) / self.width as f32 * 2.0 - 1.0,
            1.0 - (y as f32 + 0.5) / self.height as f32 * 2.0,
            depth,
        );
        Some(view_projection_inverse.project_point3(ndc))
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_id_little_endian() {
        assert_eq!(encode_id(0x0403_0201), [1, 2, 3, 4]);
        assert_eq!(encode_id_normalized(255), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_background_decodes_to_none() {
        assert_eq!(decode_pick_value(BACKGROUND_ID), None);
    }

    #[test]
    fn test_object_id_decodes_to_datacube() {
        let decoded = decode_pick_value(object_id(7)).unwrap();
        assert_eq!(decoded.datacube_id, 7);
        assert_eq!(decoded.point_index, None);
    }

    #[test]
    fn test_point_id_bounds() {
        assert_eq!(point_id(0, ELEMENTS_PER_OBJECT), None);
        assert_eq!(point_id(2000, 0), None);
        assert_eq!(point_id(0, 0), Some(u32::MAX - ELEMENTS_PER_OBJECT));
    }

    #[test]
    fn test_cursor_affordance_from_faces() {
        let faces = BoundingBoxFaces {
            x_max: true,
            ..Default::default()
        };
        assert_eq!(CursorAffordance::from_hovered_faces(&faces), CursorAffordance::EwResize);

        let faces = BoundingBoxFaces {
            x_min: true,
            z_min: true,
            ..Default::default()
        };
        assert_eq!(CursorAffordance::from_hovered_faces(&faces), CursorAffordance::NwseResize);

        let faces = BoundingBoxFaces {
            x_min: true,
            z_max: true,
            ..Default::default()
        };
        assert_eq!(CursorAffordance::from_hovered_faces(&faces), CursorAffordance::NeswResize);

        let faces = BoundingBoxFaces {
            y_max: true,
            ..Default::default()
        };
        assert_eq!(CursorAffordance::from_hovered_faces(&faces), CursorAffordance::Default);
    }

    #[test]
    fn test_cursor_affordance_axes() {
        assert!(CursorAffordance::from_css("ew-resize").resizes_x());
        assert!(!CursorAffordance::from_css("ew-resize").resizes_z());
        assert!(CursorAffordance::from_css("ns-resize").resizes_z());
        let diagonal = CursorAffordance::from_css("nesw-resize");
        assert!(diagonal.resizes_x() && diagonal.resizes_z());
        assert!(!CursorAffordance::from_css("pointer").resizes_x());
    }

    #[test]
    fn test_hovered_faces_tolerance() {
        let bounds = Aabb::new(Vec3::new(-0.25, 0.0, -0.25), Vec3::new(0.25, 1.0, 0.25));
        let faces = BoundingBoxFaces::hovered(&bounds, Vec3::new(0.3, 0.5, 0.0), 0.1);
        assert!(faces.x_max);
        assert!(!faces.x_min && !faces.y_min && !faces.y_max && !faces.z_min && !faces.z_max);
        assert!(!BoundingBoxFaces::hovered(&bounds, Vec3::new(0.0, 0.5, 0.0), 0.1).any());
    }

    #[test]
    fn test_capture_size_mismatch() {
        let result = IdBufferCapture::new(2, 2, vec![0; 3], vec![1.0; 4]);
        assert!(matches!(
            result,
            Err(DatacubesError::SizeMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_capture_lookup() {
        let ids = vec![0, object_id(3), 0, 0];
        let capture = IdBufferCapture::new(2, 2, ids, vec![1.0, 0.5, 1.0, 1.0]).unwrap();
        assert_eq!(capture.pixel_at(Vec2::new(0.9, 0.1)), Some((1, 0)));
        assert_eq!(capture.pixel_at(Vec2::new(1.5, 0.1)), None);
        assert_eq!(capture.id_at(1, 0), object_id(3));
        assert_eq!(capture.id_at(5, 5), BACKGROUND_ID);
        assert!(capture.world_position_at(0, 0, &Mat4::IDENTITY).is_none());
        let world = capture.world_position_at(1, 0, &Mat4::IDENTITY).unwrap();
        assert!((world - Vec3::new(0.5, 0.5, 0.5)).length() < 1e-6);
    }

    #[test]
    fn test_capture_from_rgba8() {
        let mut rgba = Vec::new();
        rgba.extend_from_slice(&encode_id(object_id(1)));
        rgba.extend_from_slice(&encode_id(0));
        let capture = IdBufferCapture::from_rgba8(2, 1, &rgba, vec![0.2, 1.0]).unwrap();
        assert_eq!(capture.id_at(0, 0), object_id(1));
    }

    #[test]
    fn test_decode_at_the_object_point_boundary() {
        let last_object = decode_pick_value(u32::MAX - (ELEMENTS_PER_OBJECT - 1)).unwrap();
        assert_eq!(last_object.datacube_id, ELEMENTS_PER_OBJECT - 1);
        assert_eq!(last_object.point_index, None);

        let first_point = decode_pick_value(u32::MAX - ELEMENTS_PER_OBJECT).unwrap();
        assert_eq!(first_point.datacube_id, 0);
        assert_eq!(first_point.point_index, Some(0));
        assert_eq!(point_id(0, 0), Some(u32::MAX - ELEMENTS_PER_OBJECT));

        let top = decode_pick_value(u32::MAX).unwrap();
        assert_eq!(top.datacube_id, 0);
        assert_eq!(top.point_index, None);
        assert_eq!(decode_pick_value(BACKGROUND_ID), None);
    }

    proptest! {
        #[test]
        fn prop_id_round_trip_full_range(value in any::<u32>()) {
            prop_assert_eq!(decode_id(encode_id(value)), value);
            prop_assert_eq!(decode_id_normalized(encode_id_normalized(value)), value);
        }

        #[test]
        fn prop_decoded_value_re_encodes(value in 1u32..=u32::MAX) {
            let decoded = decode_pick_value(value).unwrap();
            let encoded = match decoded.point_index {
                Some(row) => point_id(decoded.datacube_id, row),
                None => Some(object_id(decoded.datacube_id)),
            };
            prop_assert_eq!(encoded, Some(value));
        }

        #[test]
        fn prop_object_id_round_trip(datacube_id in 0u32..ELEMENTS_PER_OBJECT) {
            let value = decode_id(encode_id(object_id(datacube_id)));
            let decoded = decode_pick_value(value).unwrap();
            prop_assert_eq!(decoded.datacube_id, datacube_id);
            prop_assert_eq!(decoded.point_index, None);
        }

        #[test]
        fn prop_point_id_round_trip(datacube_id in 0u32..800, row in 0u32..ELEMENTS_PER_OBJECT) {
            let id = point_id(datacube_id, row).unwrap();
            let value = decode_id_normalized(encode_id_normalized(id));
            let decoded = decode_pick_value(value).unwrap();
            prop_assert_eq!(decoded.datacube_id, datacube_id);
            prop_assert_eq!(decoded.point_index, Some(row));
        }
    }
}
