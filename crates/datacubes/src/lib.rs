//! datacubes-rs: an interactive 3D canvas for tabular datasets.
//!
//! Every datacube is drawn as a colored cuboid standing on a floor. Datasets carry point
//! clouds, axis labels and titles; primitives draw points, lines, cubes or instanced
//! meshes. The canvas handles picking, drag and resize gestures, camera navigation and
//! smooth transitions, and renders with progressive multi-frame anti-aliasing.
//!
//! # Quick Start
//!
//! ```no_run
//! use datacubes::*;
//!
//! fn main() -> Result<()> {
//!     let mut canvas = Canvas::new(Options::default());
//!     canvas.set_datacubes(vec![DatacubeUpdate::new(7)
//!         .label("measurements")
//!         .x_column(Column::number("x", vec![0.0, 1.0, 2.0]))
//!         .y_column(Column::number("y", vec![0.0, 2.0, 4.0]))])?;
//!     canvas.set_datacube_positions([(7, Vec2::ZERO)].into());
//!
//!     // Drag and resize steps arrive here
//!     let updates = canvas.subscribe_position_updates();
//!
//!     show(canvas)?;
//!     for update in updates.try_iter() {
//!         println!("{update:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Canvas`] holds the [`Scene`], the camera, gesture state and change flags.
//! - [`Renderer`] owns the GPU passes and turns a canvas into frames.
//! - [`DatacubesApplication`] connects both to a window; [`render_to_image`] renders
//!   without one.

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Pointer coordinates and pixel sizes mix integer and float math
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

mod app;
pub mod assets;
pub mod canvas;
mod headless;
pub mod interaction;
pub mod navigation;
pub mod renderer;
pub mod scene;

pub use app::{DatacubesApplication, FrameCallback};
pub use assets::{LoadedMesh, MeshLoader};
pub use canvas::Canvas;
pub use headless::{render_to_file, render_to_image};
pub use interaction::{
    AugmentedPointerEvent, CanvasRect, Gesture, Interaction, PointerButton, PointerEvent,
    PointerEventKind, PositionUpdate,
};
pub use navigation::Navigation;
pub use renderer::{FrameStatus, Renderer};
pub use scene::{Cuboid, MeshState, PointRecord, Scene};

// Re-export core types
pub use datacubes_core::{
    color::{self, ColorPalette, ColorStop},
    CameraConfig, ColorMapping, Column, CursorAffordance, Datacube, DatacubeKind, DatacubeUpdate,
    DatacubesError, DebugView, DirtyFlags, Extent, IdBufferCapture, LabelFontConfig, MeshAsset,
    Options, PickResult, ResizeLimits, Result, SpringAnimation, SpringConfig, CUBOID_SIZE,
};
pub use datacubes_core::{Mat4, Vec2, Vec3, Vec4};

// Re-export render types
pub use datacubes_render::{Camera, RenderEngine, RenderError};

/// Shows `canvas` in a window. Blocks until the window is closed.
pub fn show(canvas: Canvas) -> Result<()> {
    let _ = env_logger::try_init();
    DatacubesApplication::new(canvas).run()
}
