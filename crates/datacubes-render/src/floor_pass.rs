//! Semi-transparent floor grid below the datacubes.

use crate::buffer::{create_index_buffer, create_vertex_buffer};
use crate::engine::pipelines::{scene_shader, DepthMode, PipelineSpec, COLOR_FORMAT};
use crate::pass::{FrameContext, RenderPass, Target};

/// Height of the floor plane, just below the datacubes' base.
pub const FLOOR_HEIGHT: f32 = -0.001;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FloorVertex {
    pub position: [f32; 3],
    pub local: [f32; 2],
}

/// The four corners of a square floor of edge length `size` centered at the origin.
#[must_use]
pub fn floor_vertices(size: f32) -> [FloorVertex; 4] {
    let half = size * 0.5;
    [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)].map(|(x, z)| FloorVertex {
        position: [x * half, FLOOR_HEIGHT, z * half],
        local: [x, z],
    })
}

pub struct FloorPass {
    size: f32,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: wgpu::Buffer,
    pipeline: wgpu::RenderPipeline,
    altered: bool,
}

impl FloorPass {
    pub fn new(device: &wgpu::Device, camera_layout: &wgpu::BindGroupLayout, size: f32) -> Self {
        let shader = scene_shader(device, "floor shader", include_str!("shaders/floor.wgsl"));
        let pipeline = PipelineSpec {
            label: "floor pipeline",
            shader: &shader,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
            bind_group_layouts: &[camera_layout],
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<FloorVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2],
            }],
            format: COLOR_FORMAT,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            depth: Some(DepthMode::TEST_ONLY),
        }
        .build(device);

        // Two triangles, visible from above and below.
        let index_buffer = create_index_buffer(device, &[0, 2, 1, 0, 3, 2], Some("floor indices"));

        Self {
            size,
            vertex_buffer: None,
            index_buffer,
            pipeline,
            altered: true,
        }
    }

    pub fn set_size(&mut self, size: f32) {
        if self.size != size {
            self.size = size;
            self.altered = true;
        }
    }
}

impl RenderPass for FloorPass {
    fn update(&mut self, device: &wgpu::Device, _queue: &wgpu::Queue) {
        if !self.altered {
            return;
        }
        self.vertex_buffer = (self.size > 0.0).then(|| {
            create_vertex_buffer(device, &floor_vertices(self.size), Some("floor vertices"))
        });
        self.altered = false;
    }

    fn frame(&self, pass: &mut wgpu::RenderPass<'_>, ctx: &FrameContext<'_>) {
        if ctx.target != Target::Color {
            return;
        }
        let Some(vertex_buffer) = &self.vertex_buffer else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, ctx.camera, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..6, 0, 0..1);
    }

    fn altered(&self) -> bool {
        self.altered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_vertices_span_size() {
        let vertices = floor_vertices(16.0);
        assert_eq!(vertices[0].position, [-8.0, FLOOR_HEIGHT, -8.0]);
        assert_eq!(vertices[2].position, [8.0, FLOOR_HEIGHT, 8.0]);
        assert_eq!(vertices[2].local, [1.0, 1.0]);
    }
}
