//! Multi-frame accumulation: jittered sub-frames are blended into one anti-aliased image.

use glam::Vec2;

use crate::engine::pipelines::{texture_bind_group, texture_bind_group_layout, ACCUMULATION_FORMAT};

/// Element `index` of the Halton sequence in `base`, in `[0, 1)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut fraction = 1.0;
    let mut result = 0.0;
    while index > 0 {
        fraction /= base as f32;
        result += fraction * (index % base) as f32;
        index /= base;
    }
    result
}

/// Sub-pixel offsets in `[-0.5, 0.5]` for `count` sub-frames; the first has no offset.
#[must_use]
pub fn kernel(count: u32) -> Vec<Vec2> {
    (0..count.max(1))
        .map(|i| {
            if i == 0 {
                Vec2::ZERO
            } else {
                Vec2::new(halton(i, 2), halton(i, 3)) - Vec2::splat(0.5)
            }
        })
        .collect()
}

/// Converts a pixel offset to normalized device coordinates.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ndc_offset(offset: Vec2, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        2.0 * offset.x / width.max(1) as f32,
        2.0 * offset.y / height.max(1) as f32,
    )
}

/// Blend weight of sub-frame `frame_number` in the running average.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accumulation_weight(frame_number: u32) -> f64 {
    1.0 / (f64::from(frame_number) + 1.0)
}

/// Blends the color target into the accumulation target.
pub struct AccumulatePass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl AccumulatePass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = texture_bind_group_layout(device, "accumulate bind group layout");
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fullscreen shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/fullscreen.wgsl").into()),
        });

        // Create pipeline layout
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("accumulate pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // accum = src * w + accum * (1 - w), w given as blend constant
        let blend = wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Constant,
            dst_factor: wgpu::BlendFactor::OneMinusConstant,
            operation: wgpu::BlendOperation::Add,
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("accumulate pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_copy"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ACCUMULATION_FORMAT,
                    blend: Some(wgpu::BlendState {
                        color: blend,
                        alpha: blend,
                    }),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }

    /// Adds the sub-frame in `color_view` to `accumulation_view`.
    pub fn render(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        accumulation_view: &wgpu::TextureView,
        frame_number: u32,
    ) {
        let bind_group = texture_bind_group(
            device,
            &self.bind_group_layout,
            color_view,
            "accumulate bind group",
        );
        let weight = accumulation_weight(frame_number);

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("accumulate pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: accumulation_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.set_blend_constant(wgpu::Color {
            r: weight,
            g: weight,
            b: weight,
            a: weight,
        });
        render_pass.draw(0..3, 0..1); // Fullscreen triangle
    }
}
