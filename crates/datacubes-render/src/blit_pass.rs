//! Final blit of the accumulated image to the screen, with an optional debug overlay.

use datacubes_core::DebugView;

use crate::engine::pipelines::{texture_bind_group, texture_bind_group_layout};

struct FormatPipelines {
    format: wgpu::TextureFormat,
    copy: wgpu::RenderPipeline,
    depth: wgpu::RenderPipeline,
}

/// Blits a texture to a surface or the output target.
pub struct BlitPass {
    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Vec<FormatPipelines>,
}

/// Viewport of the debug overlay: the lower-right third of the frame.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn overlay_viewport(width: u32, height: u32) -> [f32; 4] {
    let w = width as f32 / 3.0;
    let h = height as f32 / 3.0;
    [width as f32 - w, height as f32 - h, w, h]
}

impl BlitPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = texture_bind_group_layout(device, "blit bind group layout");
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/fullscreen.wgsl").into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        Self {
            shader,
            layout,
            bind_group_layout,
            pipelines: Vec::new(),
        }
    }

    fn create_pipeline(
        &self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        fragment_entry: &str,
    ) -> wgpu::RenderPipeline {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("blit pipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some(fragment_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    /// Creates the pipelines for a target format if they don't exist yet.
    pub fn prepare(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) {
        if self.pipelines.iter().any(|p| p.format == format) {
            return;
        }
        let copy = self.create_pipeline(device, format, "fs_copy");
        let depth = self.create_pipeline(device, format, "fs_depth");
        self.pipelines.push(FormatPipelines { format, copy, depth });
    }

    /// Copies `source` to `target`, then draws `overlay` into the corner according to `debug_view`.
    ///
    /// Does nothing if [`BlitPass::prepare`] was not called for `format`.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        size: (u32, u32),
        overlay: Option<(&wgpu::TextureView, DebugView)>,
    ) {
        let Some(pipelines) = self.pipelines.iter().find(|p| p.format == format) else {
            log::warn!("blit skipped: no pipeline for {format:?}");
            return;
        };
        let bind_group = texture_bind_group(device, &self.bind_group_layout, source, "blit bind group");

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blit pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });

        render_pass.set_pipeline(&pipelines.copy);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);

        let Some((overlay_view, debug_view)) = overlay else {
            return;
        };
        let pipeline = match debug_view {
            DebugView::None => return,
            DebugView::IdBuffer => &pipelines.copy,
            DebugView::Depth => &pipelines.depth,
        };
        let overlay_group =
            texture_bind_group(device, &self.bind_group_layout, overlay_view, "overlay bind group");
        let [x, y, w, h] = overlay_viewport(size.0, size.1);
        render_pass.set_viewport(x, y, w, h, 0.0, 1.0);
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &overlay_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_viewport_lower_right() {
        let [x, y, w, h] = overlay_viewport(300, 150);
        assert_eq!([x, y, w, h], [200.0, 100.0, 100.0, 50.0]);
    }
}
