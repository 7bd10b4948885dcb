//! Line lists: selection wireframes, leader lines and line primitives.

use glam::{Mat4, Vec3};

use crate::buffer::{
    create_dynamic_uniform_buffer, create_vertex_buffer, pack_dynamic_uniforms,
    DYNAMIC_UNIFORM_STRIDE,
};
use crate::engine::pipelines::{
    object_bind_group, object_bind_group_layout, scene_shader, DepthMode, PipelineSpec,
    COLOR_FORMAT,
};
use crate::pass::{FrameContext, ObjectUniforms, RenderPass, Target};

/// Line vertex: position and sRGB color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl LineVertex {
    #[must_use]
    pub fn new(position: Vec3, color: [f32; 3]) -> Self {
        Self {
            position: position.to_array(),
            color,
        }
    }
}

/// Segments sharing one model transform, two vertices per segment.
#[derive(Debug, Clone, PartialEq)]
pub struct LineBatch {
    /// Datacube the batch belongs to, if any.
    pub owner: Option<u32>,
    pub model: Mat4,
    pub vertices: Vec<LineVertex>,
}

impl LineBatch {
    #[must_use]
    pub fn new(owner: Option<u32>, model: Mat4, vertices: Vec<LineVertex>) -> Self {
        Self {
            owner,
            model,
            vertices,
        }
    }
}

/// Renders batches of colored line segments into the color target.
pub struct LinePass {
    batches: Vec<LineBatch>,
    vertex_buffer: Option<wgpu::Buffer>,
    object_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    pipeline: wgpu::RenderPipeline,
    altered: bool,
}

impl LinePass {
    pub fn new(device: &wgpu::Device, camera_layout: &wgpu::BindGroupLayout, label: &str) -> Self {
        let object_layout = object_bind_group_layout(device);
        let uniform_buffer = create_dynamic_uniform_buffer(device, 1, Some(label));
        let bind_group = object_bind_group(device, &object_layout, &uniform_buffer);

        let shader = scene_shader(device, "line shader", include_str!("shaders/line.wgsl"));
        let pipeline = PipelineSpec {
            label,
            shader: &shader,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
            bind_group_layouts: &[camera_layout, &object_layout],
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<LineVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
            }],
            format: COLOR_FORMAT,
            blend: Some(wgpu::BlendState::REPLACE),
            topology: wgpu::PrimitiveTopology::LineList,
            cull_mode: None,
            depth: Some(DepthMode::TEST_AND_WRITE),
        }
        .build(device);

        Self {
            batches: Vec::new(),
            vertex_buffer: None,
            object_layout,
            uniform_buffer,
            bind_group,
            capacity: 1,
            pipeline,
            altered: true,
        }
    }

    /// Replaces every batch.
    pub fn set_batches(&mut self, batches: Vec<LineBatch>) {
        if self.batches != batches {
            self.batches = batches;
            self.altered = true;
        }
    }

    #[must_use]
    pub fn batches(&self) -> &[LineBatch] {
        &self.batches
    }
}

impl RenderPass for LinePass {
    fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if !self.altered {
            return;
        }
        let vertices: Vec<LineVertex> = self
            .batches
            .iter()
            .flat_map(|batch| batch.vertices.iter().copied())
            .collect();
        self.vertex_buffer = (!vertices.is_empty())
            .then(|| create_vertex_buffer(device, &vertices, Some("line vertices")));

        if self.batches.len() > self.capacity {
            self.capacity = self.batches.len().next_power_of_two();
            self.uniform_buffer =
                create_dynamic_uniform_buffer(device, self.capacity, Some("line uniforms"));
            self.bind_group = object_bind_group(device, &self.object_layout, &self.uniform_buffer);
        }
        let uniforms: Vec<ObjectUniforms> = self
            .batches
            .iter()
            .map(|batch| ObjectUniforms::new(batch.model, glam::Vec4::ONE))
            .collect();
        if !uniforms.is_empty() {
            queue.write_buffer(&self.uniform_buffer, 0, &pack_dynamic_uniforms(&uniforms));
        }
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
        let mut first = 0u32;
        for (i, batch) in self.batches.iter().enumerate() {
            let count = batch.vertices.len() as u32;
            if count >= 2 {
                let offset = (i as u64 * DYNAMIC_UNIFORM_STRIDE) as u32;
                pass.set_bind_group(1, &self.bind_group, &[offset]);
                // An odd trailing vertex is ignored.
                pass.draw(first..first + (count & !1), 0..1);
            }
            first += count;
        }
    }

    fn altered(&self) -> bool {
        self.altered
    }
}
