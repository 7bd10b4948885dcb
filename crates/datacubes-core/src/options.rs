//! Configuration options for the datacube canvas.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Global configuration options.
///
/// Every tuning constant of the renderer and of the interaction controller lives here so
/// hosts can override them from a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Number of jittered sub-frames accumulated into one displayed frame.
    pub multi_frame_number: u32,

    /// Clear color of the color target (sRGB, premultiplied alpha is not used).
    pub clear_color: [f32; 4],

    /// Which auxiliary buffer, if any, is overlaid for debugging.
    pub debug_view: DebugView,

    /// Spring used by every attribute animation.
    pub spring: SpringConfig,

    /// Height of a datacube whose data is still pending.
    pub pending_height: f32,

    /// Distance (world units) within which a bounding-box face counts as hovered.
    pub picking_tolerance: f32,

    /// Limits applied to extents while resizing.
    pub resize_limits: ResizeLimits,

    /// Initial camera configuration.
    pub camera: CameraConfig,

    /// Label font size curve.
    pub label_font: LabelFontConfig,

    /// Edge length of the floor grid.
    pub floor_size: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            multi_frame_number: 8,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            debug_view: DebugView::None,
            spring: SpringConfig::default(),
            pending_height: 0.1,
            picking_tolerance: 0.1,
            resize_limits: ResizeLimits::default(),
            camera: CameraConfig::default(),
            label_font: LabelFontConfig::default(),
            floor_size: 16.0,
        }
    }
}

impl Options {
    /// Parses options from JSON. Missing fields fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the options to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Auxiliary buffer overlaid in the lower right corner of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DebugView {
    /// No overlay.
    #[default]
    None,
    /// The object-ID buffer.
    IdBuffer,
    /// The pre-depth buffer.
    Depth,
}

/// Parameters of the damped spring driving animations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringConfig {
    pub mass: f64,
    pub stiffness: f64,
    pub damping: f64,
    pub velocity: f64,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            mass: 1.0,
            stiffness: 80.0,
            damping: 80.0,
            velocity: 0.0,
        }
    }
}

/// Bounds for the extent edges while resizing, relative to the datacube position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeLimits {
    /// Smallest allowed `min_x` / `min_z`.
    pub min_lower: f32,
    /// Largest allowed `min_x` / `min_z`.
    pub min_upper: f32,
    /// Smallest allowed `max_x` / `max_z`.
    pub max_lower: f32,
    /// Largest allowed `max_x` / `max_z`.
    pub max_upper: f32,
}

impl Default for ResizeLimits {
    fn default() -> Self {
        Self {
            min_lower: -2.0,
            min_upper: -0.25,
            max_lower: 0.25,
            max_upper: 2.0,
        }
    }
}

impl ResizeLimits {
    /// Clamps a lower edge.
    #[must_use]
    pub fn clamp_min(&self, value: f32) -> f32 {
        value.clamp(self.min_lower, self.min_upper)
    }

    /// Clamps an upper edge.
    #[must_use]
    pub fn clamp_max(&self, value: f32) -> f32 {
        value.clamp(self.max_lower, self.max_upper)
    }
}

/// Initial camera parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub eye: Vec3,
    pub center: Vec3,
    pub up: Vec3,
    pub near: f32,
    pub far: f32,
    /// Vertical field of view in degrees.
    pub fovy_degrees: f32,
    /// Height of the orthographic frustum at zoom 1.
    pub frustum_height: f32,
    /// Start in perspective (`true`) or orthographic (`false`) projection.
    pub perspective: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: Vec3::new(2.0, 2.0, 4.0),
            center: Vec3::ZERO,
            up: Vec3::Y,
            near: 0.01,
            far: 32.0,
            fovy_degrees: 45.0,
            frustum_height: 20.0,
            perspective: true,
        }
    }
}

/// World-space font size as a function of the label's distance to the eye.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelFontConfig {
    pub min_size: f32,
    pub max_size: f32,
    /// Distance at which `max_size` is reached.
    pub max_distance: f32,
}

impl Default for LabelFontConfig {
    fn default() -> Self {
        Self {
            min_size: 0.05,
            max_size: 0.3,
            max_distance: 30.0,
        }
    }
}

impl LabelFontConfig {
    /// Font size for a label at `distance` from the eye.
    #[must_use]
    pub fn size_at(&self, distance: f32) -> f32 {
        self.min_size + (distance / self.max_distance).min(1.0) * (self.max_size - self.min_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let options = Options::default();
        assert_eq!(options.multi_frame_number, 8);
        assert_eq!(options.camera.eye, Vec3::new(2.0, 2.0, 4.0));
        assert_eq!(options.spring.stiffness, 80.0);
        assert_eq!(options.debug_view, DebugView::None);
    }

    #[test]
    fn test_options_partial_json() {
        let options = Options::from_json_str(r#"{ "multi_frame_number": 4 }"#).unwrap();
        assert_eq!(options.multi_frame_number, 4);
        assert_eq!(options.resize_limits, ResizeLimits::default());
    }

    #[test]
    fn test_options_json_round_trip() {
        let mut options = Options::default();
        options.debug_view = DebugView::IdBuffer;
        let json = options.to_json_string().unwrap();
        assert_eq!(Options::from_json_str(&json).unwrap(), options);
    }

    #[test]
    fn test_resize_limits_clamp() {
        let limits = ResizeLimits::default();
        assert_eq!(limits.clamp_min(-5.0), -2.0);
        assert_eq!(limits.clamp_min(0.3), -0.25);
        assert_eq!(limits.clamp_max(0.0), 0.25);
        assert_eq!(limits.clamp_max(1.5), 1.5);
    }

    #[test]
    fn test_label_font_size_curve() {
        let font = LabelFontConfig::default();
        assert!((font.size_at(0.0) - 0.05).abs() < 1e-6);
        assert!((font.size_at(15.0) - 0.175).abs() < 1e-6);
        assert!((font.size_at(100.0) - 0.3).abs() < 1e-6);
    }
}
