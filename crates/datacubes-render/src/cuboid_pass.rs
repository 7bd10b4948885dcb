//! Bounding boxes of all datacubes, drawn into every target.

use glam::{Mat4, Vec3, Vec4};

use crate::buffer::{
    create_dynamic_uniform_buffer, create_index_buffer, create_vertex_buffer,
    pack_dynamic_uniforms, DYNAMIC_UNIFORM_STRIDE,
};
use crate::engine::pipelines::{
    object_bind_group, object_bind_group_layout, scene_shader, DepthMode, PipelineSpec,
    COLOR_FORMAT, ID_FORMAT, PRE_DEPTH_FORMAT,
};
use crate::pass::{FrameContext, IdStage, ObjectUniforms, RenderPass, Target};

/// Vertex of the unit cube.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CubeVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Builds a unit cube centered at the origin with outward facing, counter-clockwise faces.
#[must_use]
pub fn unit_cube() -> (Vec<CubeVertex>, Vec<u32>) {
    // (normal, u, v) with u x v = normal
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = (normal + u * su + v * sv) * 0.5;
            vertices.push(CubeVertex {
                position: position.to_array(),
                normal: normal.to_array(),
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// One bounding box to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuboidInstance {
    pub model: Mat4,
    /// sRGB color and alpha.
    pub color: Vec4,
    /// Object pick id.
    pub id: u32,
    /// Only drawn into the ID and pre-depth targets.
    pub id_buffer_only: bool,
    /// Whether the object carries points that resolve to their own ids.
    pub has_sub_elements: bool,
    /// Excluded from the pre-depth target while being dragged or resized.
    pub hidden: bool,
}

/// Renders every datacube's bounding box.
pub struct CuboidPass {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    object_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    color_pipeline: wgpu::RenderPipeline,
    pre_depth_pipeline: wgpu::RenderPipeline,
    id_container_pipeline: wgpu::RenderPipeline,
    id_solid_pipeline: wgpu::RenderPipeline,
    instances: Vec<CuboidInstance>,
    altered: bool,
}

impl CuboidPass {
    pub fn new(device: &wgpu::Device, camera_layout: &wgpu::BindGroupLayout) -> Self {
        let (vertices, indices) = unit_cube();
        let vertex_buffer = create_vertex_buffer(device, &vertices, Some("cuboid vertices"));
        let index_buffer = create_index_buffer(device, &indices, Some("cuboid indices"));

        let object_layout = object_bind_group_layout(device);
        let uniform_buffer = create_dynamic_uniform_buffer(device, 1, Some("cuboid uniforms"));
        let bind_group = object_bind_group(device, &object_layout, &uniform_buffer);

        let shader = scene_shader(device, "cuboid shader", include_str!("shaders/cuboid.wgsl"));
        let layouts = [camera_layout, &object_layout];
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<CubeVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
        }];
        let spec = |label: &str,
                    vertex_entry: &str,
                    fragment_entry: &str,
                    format: wgpu::TextureFormat,
                    blend: Option<wgpu::BlendState>,
                    cull_mode: Option<wgpu::Face>,
                    depth: DepthMode| {
            PipelineSpec {
                label,
                shader: &shader,
                vertex_entry,
                fragment_entry,
                bind_group_layouts: &layouts,
                buffers: &buffers,
                format,
                blend,
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode,
                depth: Some(depth),
            }
            .build(device)
        };

        let color_pipeline = spec(
            "cuboid color pipeline",
            "vs_color",
            "fs_color",
            COLOR_FORMAT,
            Some(wgpu::BlendState::ALPHA_BLENDING),
            Some(wgpu::Face::Back),
            DepthMode::TEST_AND_WRITE,
        );
        let pre_depth_pipeline = spec(
            "cuboid pre-depth pipeline",
            "vs_plain",
            "fs_pre_depth",
            PRE_DEPTH_FORMAT,
            None,
            Some(wgpu::Face::Back),
            DepthMode::TEST_AND_WRITE,
        );
        let id_container_pipeline = spec(
            "cuboid id container pipeline",
            "vs_plain",
            "fs_id",
            ID_FORMAT,
            None,
            Some(wgpu::Face::Front),
            DepthMode::TEST_AND_WRITE,
        );
        let id_solid_pipeline = spec(
            "cuboid id solid pipeline",
            "vs_plain",
            "fs_id",
            ID_FORMAT,
            None,
            Some(wgpu::Face::Back),
            DepthMode::TEST_AND_WRITE,
        );

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            object_layout,
            uniform_buffer,
            bind_group,
            capacity: 1,
            color_pipeline,
            pre_depth_pipeline,
            id_container_pipeline,
            id_solid_pipeline,
            instances: Vec::new(),
            altered: true,
        }
    }

    /// Replaces the drawn boxes. Instances are drawn in the given order.
    pub fn set_instances(&mut self, instances: Vec<CuboidInstance>) {
        if self.instances != instances {
            self.instances = instances;
            self.altered = true;
        }
    }

    #[must_use]
    pub fn instances(&self) -> &[CuboidInstance] {
        &self.instances
    }

    fn draw<'a>(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        pipeline: &wgpu::RenderPipeline,
        selected: impl Iterator<Item = (usize, &'a CuboidInstance)>,
    ) {
        pass.set_pipeline(pipeline);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        for (i, _) in selected {
            let offset = (i as u64 * DYNAMIC_UNIFORM_STRIDE) as u32;
            pass.set_bind_group(1, &self.bind_group, &[offset]);
            pass.draw_indexed(0..self.index_count, 0, 0..1);
        }
    }
}

impl RenderPass for CuboidPass {
    fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if !self.altered {
            return;
        }
        if self.instances.len() > self.capacity {
            self.capacity = self.instances.len().next_power_of_two();
            self.uniform_buffer =
                create_dynamic_uniform_buffer(device, self.capacity, Some("cuboid uniforms"));
            self.bind_group = object_bind_group(device, &self.object_layout, &self.uniform_buffer);
        }
        let uniforms: Vec<ObjectUniforms> = self
            .instances
            .iter()
            .map(|instance| {
                ObjectUniforms::new(instance.model, instance.color)
                    .with_id(instance.id)
                    .hidden(instance.hidden)
            })
            .collect();
        if !uniforms.is_empty() {
            queue.write_buffer(&self.uniform_buffer, 0, &pack_dynamic_uniforms(&uniforms));
        }
        self.altered = false;
    }

    fn frame(&self, pass: &mut wgpu::RenderPass<'_>, ctx: &FrameContext<'_>) {
        if self.instances.is_empty() {
            return;
        }
        pass.set_bind_group(0, ctx.camera, &[]);
        let all = self.instances.iter().enumerate();
        match ctx.target {
            Target::PreDepth => self.draw(pass, &self.pre_depth_pipeline, all),
            Target::Color => self.draw(
                pass,
                &self.color_pipeline,
                all.filter(|(_, c)| !c.id_buffer_only),
            ),
            Target::Id(IdStage::Containers) => self.draw(
                pass,
                &self.id_container_pipeline,
                all.filter(|(_, c)| c.has_sub_elements),
            ),
            Target::Id(IdStage::Solids) => self.draw(
                pass,
                &self.id_solid_pipeline,
                all.filter(|(_, c)| !c.has_sub_elements),
            ),
            Target::Id(IdStage::Points) => {}
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
    fn test_unit_cube_geometry() {
        let (vertices, indices) = unit_cube();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        for v in &vertices {
            for c in v.position {
                assert!((c.abs() - 0.5).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_unit_cube_faces_wind_outwards() {
        let (vertices, indices) = unit_cube();
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(vertices[i as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let normal = Vec3::from(vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(normal) > 0.99);
        }
    }
}
