//! Headless rendering of a [`Canvas`].
//!
//! Renders the settled state of a canvas into an image buffer or file without opening a
//! window. Useful for integration tests, batch processing and automated screenshots.

use datacubes_core::{DatacubesError, Result};
use datacubes_render::RenderEngine;
use pollster::FutureExt;

use crate::canvas::Canvas;
use crate::renderer::{FrameStatus, Renderer};

/// Simulated frame time while settling animations.
const FRAME_DT: f64 = 1.0 / 60.0;
/// Upper bound on rendered frames, enough for any spring to settle.
const MAX_FRAMES: usize = 2000;

/// Renders the canvas to a file. The format follows the file extension.
///
/// # Example
/// ```no_run
/// use datacubes::*;
///
/// let mut canvas = Canvas::new(Options::default());
/// canvas.set_datacubes(vec![DatacubeUpdate::new(1).label("sales")]).unwrap();
/// canvas.set_datacube_positions([(1, Vec2::ZERO)].into());
/// render_to_file(&mut canvas, "datacubes.png", 800, 600).unwrap();
/// ```
pub fn render_to_file(canvas: &mut Canvas, filename: &str, width: u32, height: u32) -> Result<()> {
    let data = render_to_image(canvas, width, height)?;
    datacubes_render::save_image(filename, &data, width, height)
        .map_err(|e| DatacubesError::RenderError(format!("failed to save image: {e}")))
}

/// Renders the canvas to tightly packed RGBA8 pixels, `width * height * 4` bytes.
///
/// Pending mesh assets are awaited and every animation is stepped to its end before the
/// accumulated image is read back.
pub fn render_to_image(canvas: &mut Canvas, width: u32, height: u32) -> Result<Vec<u8>> {
    let engine = RenderEngine::new_headless(width, height)
        .block_on()
        .map_err(|e| DatacubesError::RenderError(format!("failed to create headless engine: {e}")))?;
    canvas.resize(width, height);
    let mut renderer = Renderer::new(engine, canvas);

    canvas.update(0.0);
    canvas.wait_for_meshes();

    for frame in 0..MAX_FRAMES {
        canvas.update(FRAME_DT);
        let status = renderer
            .render(canvas)
            .map_err(|e| DatacubesError::RenderError(e.to_string()))?;
        if status == FrameStatus::Converged && !canvas.is_animating() {
            log::debug!("headless frame converged after {} frames", frame + 1);
            break;
        }
    }

    let (_, _, pixels) = renderer
        .capture_frame()
        .map_err(|e| DatacubesError::RenderError(format!("failed to read back frame: {e}")))?;
    Ok(pixels)
}
