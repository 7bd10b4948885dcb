//! The frame orchestrator: owns every pass and framebuffer and turns a [`Canvas`] into frames.
//!
//! Each call to [`Renderer::render`] prepares whatever the canvas marked dirty, renders one
//! jittered sub-frame into the color, pre-depth and ID targets, accumulates it and blits the
//! accumulated image to the output target and the window surface. Once all sub-frames of
//! the kernel are accumulated the image is stable and further calls only re-present it.

use std::collections::HashMap;

use datacubes_core::color::srgb_to_linear;
use datacubes_core::{DebugView, DirtyFlags};
use datacubes_render::accumulate_pass::{kernel, ndc_offset};
use datacubes_render::engine::targets::OUTPUT_FORMAT;
use datacubes_render::{
    AccumulatePass, BlitPass, CuboidPass, FloorPass, FrameContext, IdStage, LabelPass, LineBatch,
    LinePass, MeshInstancePass, PointPass, RenderEngine, RenderPass, RenderResult, Target,
};
use glam::{Mat4, Vec2, Vec4};

use crate::canvas::Canvas;
use crate::scene::MeshState;

/// What a call to [`Renderer::render`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A sub-frame was accumulated; more are pending.
    Accumulating,
    /// The accumulated image is complete.
    Converged,
}

impl FrameStatus {
    /// Whether another frame should be requested right away.
    #[must_use]
    pub fn needs_redraw(self) -> bool {
        self == Self::Accumulating
    }
}

/// Converts an sRGB clear color for the linear color target.
fn linear_clear_color(color: [f32; 4]) -> wgpu::Color {
    let [r, g, b, a] = color;
    wgpu::Color {
        r: f64::from(srgb_to_linear(r)),
        g: f64::from(srgb_to_linear(g)),
        b: f64::from(srgb_to_linear(b)),
        a: f64::from(a),
    }
}

fn color_attachment(view: &wgpu::TextureView, clear: wgpu::Color) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(clear),
            store: wgpu::StoreOp::Store,
        },
    })
}

fn depth_attachment(view: &wgpu::TextureView) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
    Some(wgpu::RenderPassDepthStencilAttachment {
        view,
        depth_ops: Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(1.0),
            store: wgpu::StoreOp::Store,
        }),
        stencil_ops: None,
    })
}

/// Renders a [`Canvas`] with the multi-pass datacube pipeline.
pub struct Renderer {
    engine: RenderEngine,
    floor: FloorPass,
    labels: LabelPass,
    selection_lines: LinePass,
    cuboids: CuboidPass,
    meshes: HashMap<u32, MeshInstancePass>,
    points: PointPass,
    line_primitives: LinePass,
    accumulate: AccumulatePass,
    blit: BlitPass,
    kernel: Vec<Vec2>,
    frame_number: u32,
    clear_color: wgpu::Color,
    debug_view: DebugView,
}

impl Renderer {
    /// Creates every pass for `engine`, configured from the canvas options.
    #[must_use]
    pub fn new(engine: RenderEngine, canvas: &Canvas) -> Self {
        let options = canvas.options();
        let device = &engine.device;
        let layout = &engine.camera_bind_group_layout;

        let mut blit = BlitPass::new(device);
        blit.prepare(device, OUTPUT_FORMAT);
        blit.prepare(device, engine.output_format());

        Self {
            floor: FloorPass::new(device, layout, options.floor_size),
            labels: LabelPass::new(device, &engine.queue, layout, options.label_font),
            selection_lines: LinePass::new(device, layout, "selection lines"),
            cuboids: CuboidPass::new(device, layout),
            meshes: HashMap::new(),
            points: PointPass::new(device, layout),
            line_primitives: LinePass::new(device, layout, "line primitives"),
            accumulate: AccumulatePass::new(device),
            blit,
            kernel: kernel(options.multi_frame_number),
            frame_number: 0,
            clear_color: linear_clear_color(options.clear_color),
            debug_view: options.debug_view,
            engine,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    /// Number of sub-frames accumulated into the current image.
    #[must_use]
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Whether all sub-frames of the kernel have been accumulated.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.frame_number >= self.kernel.len() as u32
    }

    /// Renders the next frame of `canvas`.
    ///
    /// Only the ID read-back can fail; surface problems skip the presentation with a warning.
    pub fn render(&mut self, canvas: &mut Canvas) -> RenderResult<FrameStatus> {
        let dirty = canvas.take_dirty();
        self.prepare(canvas, dirty);
        if dirty.any() || self.passes_altered() || canvas.camera().altered() || canvas.needs_capture() {
            self.frame_number = 0;
        }
        self.upload();

        if self.is_converged() {
            self.present();
            return Ok(FrameStatus::Converged);
        }

        let (width, height) = self.engine.size();
        let offset = ndc_offset(self.kernel[self.frame_number as usize], width, height);
        self.engine.update_camera_uniforms(canvas.camera(), offset);

        let mut encoder = self
            .engine
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        self.record_frame(&mut encoder);
        self.accumulate.render(
            &self.engine.device,
            &mut encoder,
            &self.engine.targets.color.view,
            &self.engine.targets.accumulation.view,
            self.frame_number,
        );
        self.blit.render(
            &self.engine.device,
            &mut encoder,
            &self.engine.targets.accumulation.view,
            &self.engine.targets.output.view,
            OUTPUT_FORMAT,
            (width, height),
            self.overlay(),
        );
        self.engine.queue.submit(std::iter::once(encoder.finish()));

        if self.frame_number == 0 && canvas.needs_capture() {
            canvas.set_capture(self.engine.read_id_buffer()?);
        }
        self.frame_number += 1;
        canvas.camera_mut().reset_altered();
        self.present();

        Ok(if self.is_converged() {
            FrameStatus::Converged
        } else {
            FrameStatus::Accumulating
        })
    }

    /// Hands the canvas state that changed since the last frame to the passes.
    fn prepare(&mut self, canvas: &mut Canvas, dirty: DirtyFlags) {
        let loaded = canvas.take_loaded_meshes();
        let options = canvas.options();

        if dirty.frame_size {
            let (width, height) = canvas.frame_size();
            self.engine.resize(width, height);
        }
        if dirty.multi_frame_number {
            self.kernel = kernel(options.multi_frame_number);
        }
        if dirty.clear_color {
            self.clear_color = linear_clear_color(options.clear_color);
        }
        if dirty.debug_view {
            self.debug_view = options.debug_view;
        }

        let scene = canvas.scene();
        let eye = canvas.camera().eye();
        if dirty.datacubes || dirty.datacube_positions {
            self.points.set_points(scene.points().to_vec());
        }
        if dirty.datacubes || dirty.datacube_positions || dirty.cuboids {
            self.labels.set_label_sets(scene.label_sets().to_vec());
            self.selection_lines.set_batches(vec![LineBatch::new(
                None,
                Mat4::IDENTITY,
                scene.selection_lines().to_vec(),
            )]);
            self.line_primitives.set_batches(scene.line_batches());
        }
        self.labels.set_eye(eye);
        self.cuboids
            .set_instances(scene.cuboid_instances(eye, canvas.hidden_object()));
        self.points.set_draws(scene.point_draws(eye));
        self.points.set_id_object(canvas.hovered_object());

        // Mesh passes exist only for cuboids whose asset has arrived
        for (datacube_id, mesh) in loaded {
            let pass = MeshInstancePass::new(
                &self.engine.device,
                &self.engine.camera_bind_group_layout,
                &mesh,
            );
            self.meshes.insert(datacube_id, pass);
        }
        self.meshes.retain(|datacube_id, _| {
            scene
                .cuboid(*datacube_id)
                .is_some_and(|c| matches!(c.mesh, MeshState::Loaded(_)))
        });
        for (datacube_id, pass) in &mut self.meshes {
            let (Some(cuboid), Some(position)) = (scene.cuboid(*datacube_id), scene.position(*datacube_id)) else {
                pass.set_instances(Vec::new());
                continue;
            };
            let [r, g, b] = cuboid.color_rgb();
            pass.set_instances(cuboid.mesh_instances());
            pass.set_transform(
                cuboid.placement(position),
                Vec4::new(r, g, b, 1.0),
                cuboid.mesh_instance_scale(),
            );
        }
    }

    /// Whether any pass holds changes that were not uploaded yet.
    fn passes_altered(&self) -> bool {
        self.color_passes().iter().any(|pass| pass.altered())
    }

    fn upload(&mut self) {
        let device = &self.engine.device;
        let queue = &self.engine.queue;
        self.floor.update(device, queue);
        self.labels.update(device, queue);
        self.selection_lines.update(device, queue);
        self.cuboids.update(device, queue);
        for pass in self.meshes.values_mut() {
            pass.update(device, queue);
        }
        self.points.update(device, queue);
        self.line_primitives.update(device, queue);
    }

    /// Passes of the color target, in draw order.
    fn color_passes(&self) -> Vec<&dyn RenderPass> {
        let mut passes: Vec<&dyn RenderPass> = vec![&self.floor, &self.labels, &self.selection_lines, &self.cuboids];
        passes.extend(self.meshes.values().map(|p| p as &dyn RenderPass));
        passes.push(&self.points);
        passes.push(&self.line_primitives);
        passes
    }

    /// Records the pre-depth, color and ID passes of one sub-frame.
    fn record_frame(&self, encoder: &mut wgpu::CommandEncoder) {
        let targets = &self.engine.targets;
        let camera = &self.engine.camera_bind_group;

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("pre-depth pass"),
                color_attachments: &[color_attachment(&targets.pre_depth.view, wgpu::Color::WHITE)],
                depth_stencil_attachment: depth_attachment(&targets.pre_depth_depth.view),
                ..Default::default()
            });
            let ctx = FrameContext {
                camera,
                target: Target::PreDepth,
            };
            self.cuboids.frame(&mut pass, &ctx);
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("color pass"),
                color_attachments: &[color_attachment(&targets.color.view, self.clear_color)],
                depth_stencil_attachment: depth_attachment(&targets.color_depth.view),
                ..Default::default()
            });
            let ctx = FrameContext {
                camera,
                target: Target::Color,
            };
            for render_pass in self.color_passes() {
                render_pass.frame(&mut pass, &ctx);
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("id pass"),
                color_attachments: &[color_attachment(&targets.id.view, wgpu::Color::TRANSPARENT)],
                depth_stencil_attachment: depth_attachment(&targets.id_depth.view),
                ..Default::default()
            });
            for stage in [IdStage::Containers, IdStage::Points, IdStage::Solids] {
                let ctx = FrameContext {
                    camera,
                    target: Target::Id(stage),
                };
                self.cuboids.frame(&mut pass, &ctx);
                self.points.frame(&mut pass, &ctx);
            }
        }
    }

    fn overlay(&self) -> Option<(&wgpu::TextureView, DebugView)> {
        match self.debug_view {
            DebugView::None => None,
            DebugView::IdBuffer => Some((&self.engine.targets.id.view, DebugView::IdBuffer)),
            DebugView::Depth => Some((&self.engine.targets.pre_depth.view, DebugView::Depth)),
        }
    }

    /// Blits the accumulated image to the window. Failures skip the frame.
    fn present(&self) {
        let texture = match self.engine.acquire_surface_texture() {
            Ok(Some(texture)) => texture,
            Ok(None) => return,
            Err(error) => {
                log::warn!("frame skipped: {error}");
                return;
            }
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .engine
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present encoder"),
            });
        self.blit.render(
            &self.engine.device,
            &mut encoder,
            &self.engine.targets.accumulation.view,
            &view,
            self.engine.output_format(),
            self.engine.size(),
            self.overlay(),
        );
        self.engine.queue.submit(std::iter::once(encoder.finish()));
        texture.present();
    }

    /// The last presented image as tightly packed sRGB RGBA8 pixels.
    pub fn capture_frame(&self) -> RenderResult<(u32, u32, Vec<u8>)> {
        self.engine.capture_color()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_clear_color() {
        let color = linear_clear_color([1.0, 0.0, 0.5, 0.25]);
        assert!((color.r - 1.0).abs() < 1e-6);
        assert_eq!(color.g, 0.0);
        assert!(color.b > 0.2 && color.b < 0.22);
        assert_eq!(color.a, 0.25);
    }

    #[test]
    fn test_frame_status_redraw() {
        assert!(FrameStatus::Accumulating.needs_redraw());
        assert!(!FrameStatus::Converged.needs_redraw());
    }

    #[test]
    fn test_pass_change_restarts_accumulation() {
        use pollster::FutureExt;

        let Ok(engine) = RenderEngine::new_headless(32, 32).block_on() else {
            eprintln!("Skipping renderer test: no GPU adapter available");
            return;
        };
        let mut canvas = Canvas::new(datacubes_core::Options::default());
        canvas.resize(32, 32);
        let mut renderer = Renderer::new(engine, &canvas);

        let mut frames = 0;
        while renderer.render(&mut canvas).unwrap() != FrameStatus::Converged && frames < 1_000 {
            frames += 1;
        }
        assert!(renderer.is_converged());
        assert!(!renderer.passes_altered());

        // Only the point pass changes, the canvas stays clean
        renderer.points.set_id_object(Some(7));
        assert!(renderer.passes_altered());
        assert_eq!(renderer.render(&mut canvas).unwrap(), FrameStatus::Accumulating);
        assert_eq!(renderer.frame_number(), 1);
        assert!(!renderer.passes_altered());
    }
}
