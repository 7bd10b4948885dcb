//! Point clouds of all datacubes, read from one shared vertex buffer.

use std::ops::Range;

use glam::Mat4;

use crate::buffer::{
    create_dynamic_uniform_buffer, create_vertex_buffer, pack_dynamic_uniforms,
    DYNAMIC_UNIFORM_STRIDE,
};
use crate::engine::pipelines::{
    object_bind_group, object_bind_group_layout, scene_shader, DepthMode, PipelineSpec,
    COLOR_FORMAT, ID_FORMAT,
};
use crate::pass::{FrameContext, IdStage, ObjectUniforms, RenderPass, Target};

/// Floats per point in the shared buffer.
pub const POINT_VERTEX_FLOATS: usize = 11;

/// One point: position, sRGB color, size and its encoded pick id.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub size: f32,
    pub id: [f32; 4],
}

/// A slice of the shared buffer belonging to one datacube.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDraw {
    /// Object id of the owning datacube.
    pub object_id: u32,
    pub model: Mat4,
    /// Points of the slice, as indices into the shared buffer.
    pub range: Range<u32>,
    /// Pick id of the highlighted point.
    pub highlight: Option<u32>,
}

/// Renders point clouds as screen-aligned discs.
pub struct PointPass {
    vertices: Vec<PointVertex>,
    vertex_buffer: Option<wgpu::Buffer>,
    vertices_changed: bool,
    draws: Vec<PointDraw>,
    id_object: Option<u32>,
    object_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    color_pipeline: wgpu::RenderPipeline,
    id_pipeline: wgpu::RenderPipeline,
    altered: bool,
}

impl PointPass {
    pub fn new(device: &wgpu::Device, camera_layout: &wgpu::BindGroupLayout) -> Self {
        let object_layout = object_bind_group_layout(device);
        let uniform_buffer = create_dynamic_uniform_buffer(device, 1, Some("point uniforms"));
        let bind_group = object_bind_group(device, &object_layout, &uniform_buffer);

        let shader = scene_shader(device, "point shader", include_str!("shaders/point.wgsl"));
        let layouts = [camera_layout, &object_layout];
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PointVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &wgpu::vertex_attr_array![
                0 => Float32x3,
                1 => Float32x3,
                2 => Float32,
                3 => Float32x4
            ],
        }];

        let color_pipeline = PipelineSpec {
            label: "point color pipeline",
            shader: &shader,
            vertex_entry: "vs_color",
            fragment_entry: "fs_color",
            bind_group_layouts: &layouts,
            buffers: &buffers,
            format: COLOR_FORMAT,
            blend: Some(wgpu::BlendState::REPLACE),
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            depth: Some(DepthMode::TEST_AND_WRITE),
        }
        .build(device);

        // Points of the hovered object win over every box in the ID target.
        let id_pipeline = PipelineSpec {
            label: "point id pipeline",
            shader: &shader,
            vertex_entry: "vs_id",
            fragment_entry: "fs_id",
            bind_group_layouts: &layouts,
            buffers: &buffers,
            format: ID_FORMAT,
            blend: None,
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            depth: Some(DepthMode::ALWAYS),
        }
        .build(device);

        Self {
            vertices: Vec::new(),
            vertex_buffer: None,
            vertices_changed: false,
            draws: Vec::new(),
            id_object: None,
            object_layout,
            uniform_buffer,
            bind_group,
            capacity: 1,
            color_pipeline,
            id_pipeline,
            altered: true,
        }
    }

    /// Replaces the shared point buffer.
    pub fn set_points(&mut self, vertices: Vec<PointVertex>) {
        if self.vertices != vertices {
            self.vertices = vertices;
            self.vertices_changed = true;
            self.altered = true;
        }
    }

    /// Replaces the per-datacube slices.
    pub fn set_draws(&mut self, draws: Vec<PointDraw>) {
        if self.draws != draws {
            self.draws = draws;
            self.altered = true;
        }
    }

    /// Selects the object whose points are drawn into the ID target.
    pub fn set_id_object(&mut self, object_id: Option<u32>) {
        if self.id_object != object_id {
            self.id_object = object_id;
            self.altered = true;
        }
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.vertices.len()
    }

    fn draw<'a>(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        pipeline: &wgpu::RenderPipeline,
        selected: impl Iterator<Item = (usize, &'a PointDraw)>,
    ) {
        let Some(vertex_buffer) = &self.vertex_buffer else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        for (i, draw) in selected {
            if draw.range.is_empty() {
                continue;
            }
            let offset = (i as u64 * DYNAMIC_UNIFORM_STRIDE) as u32;
            pass.set_bind_group(1, &self.bind_group, &[offset]);
            pass.draw(0..6, draw.range.clone());
        }
    }
}

impl RenderPass for PointPass {
    fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if !self.altered {
            return;
        }
        if self.vertices_changed {
            self.vertex_buffer = (!self.vertices.is_empty())
                .then(|| create_vertex_buffer(device, &self.vertices, Some("point vertices")));
            self.vertices_changed = false;
        }
        if self.draws.len() > self.capacity {
            self.capacity = self.draws.len().next_power_of_two();
            self.uniform_buffer =
                create_dynamic_uniform_buffer(device, self.capacity, Some("point uniforms"));
            self.bind_group = object_bind_group(device, &self.object_layout, &self.uniform_buffer);
        }
        let uniforms: Vec<ObjectUniforms> = self
            .draws
            .iter()
            .map(|draw| {
                ObjectUniforms::new(draw.model, glam::Vec4::ONE)
                    .with_id(draw.object_id)
                    .with_highlight(draw.highlight)
            })
            .collect();
        if !uniforms.is_empty() {
            queue.write_buffer(&self.uniform_buffer, 0, &pack_dynamic_uniforms(&uniforms));
        }
        self.altered = false;
    }

    fn frame(&self, pass: &mut wgpu::RenderPass<'_>, ctx: &FrameContext<'_>) {
        if self.draws.is_empty() {
            return;
        }
        pass.set_bind_group(0, ctx.camera, &[]);
        let all = self.draws.iter().enumerate();
        match ctx.target {
            Target::Color => self.draw(pass, &self.color_pipeline, all),
            Target::Id(IdStage::Points) => {
                let Some(object_id) = self.id_object else {
                    return;
                };
                self.draw(
                    pass,
                    &self.id_pipeline,
                    all.filter(|(_, d)| d.object_id == object_id),
                );
            }
            _ => {}
        }
    }

    fn altered(&self) -> bool {
        self.altered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_vertex_is_eleven_floats() {
        assert_eq!(
            std::mem::size_of::<PointVertex>(),
            POINT_VERTEX_FLOATS * std::mem::size_of::<f32>()
        );
    }
}
