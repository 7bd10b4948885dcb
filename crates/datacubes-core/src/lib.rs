//! Core abstractions for datacubes-rs.
//!
//! This crate holds everything about the datacube canvas that does not need a GPU:
//! - [`Datacube`] descriptors, partial [`DatacubeUpdate`]s and their columns
//! - Color palettes and L*a*b* conversion
//! - Pick id encoding and the CPU-side [`IdBufferCapture`]
//! - Spring animation and dirty tracking
//! - Configuration options

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]

pub mod animation;
pub mod color;
pub mod datacube;
pub mod dirty;
pub mod error;
pub mod options;
pub mod pick;

pub use animation::{changed_significantly, SpringAnimation, SpringEasing, ANIMATION_SCALE};
pub use color::{ColorPalette, ColorStop};
pub use datacube::{
    ColorMapping, Column, Datacube, DatacubeKind, DatacubeUpdate, Extent, MeshAsset, CUBOID_SIZE,
};
pub use dirty::DirtyFlags;
pub use error::{DatacubesError, Result};
pub use options::{
    CameraConfig, DebugView, LabelFontConfig, Options, ResizeLimits, SpringConfig,
};
pub use pick::{
    decode_pick_value, object_id, point_id, Aabb, BoundingBoxFaces, CursorAffordance, DecodedId,
    IdBufferCapture, PickResult, ELEMENTS_PER_OBJECT,
};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};
