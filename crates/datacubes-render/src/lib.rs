//! Rendering backend for datacubes-rs.
//!
//! This crate provides the wgpu-based rendering engine, including:
//! - GPU context, frame targets and picking read-back ([`RenderEngine`])
//! - The blended orthographic/perspective [`Camera`]
//! - Render passes for cuboids, points, lines, labels, the floor and mesh assets
//! - Multi-frame accumulation and the final blit

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Pixel and vertex math mixes u32 and f32 freely
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod accumulate_pass;
pub mod blit_pass;
pub mod buffer;
pub mod camera;
pub mod cuboid_pass;
pub mod engine;
pub mod error;
pub mod floor_pass;
pub mod label_pass;
pub mod line_pass;
pub mod mesh_asset_pass;
pub mod pass;
pub mod point_pass;
pub mod screenshot;

pub use accumulate_pass::AccumulatePass;
pub use blit_pass::BlitPass;
pub use camera::Camera;
pub use cuboid_pass::{CuboidInstance, CuboidPass};
pub use engine::{CameraUniforms, RenderEngine};
pub use error::{RenderError, RenderResult};
pub use floor_pass::FloorPass;
pub use label_pass::{Alignment, Elide, Label, LabelPass, LabelSet, LineAnchor};
pub use line_pass::{LineBatch, LinePass, LineVertex};
pub use mesh_asset_pass::{load_mesh_asset, MeshData, MeshInstancePass};
pub use pass::{FrameContext, IdStage, ObjectUniforms, RenderPass, Target};
pub use point_pass::{PointDraw, PointPass, PointVertex};
pub use screenshot::{save_image, save_to_buffer, ScreenshotError};
