//! Loading of mesh assets and their instanced rendering at a datacube's points.

use std::path::Path;

use glam::{Mat4, Vec3, Vec4};

use crate::buffer::{
    create_dynamic_uniform_buffer, create_index_buffer, create_vertex_buffer,
    pack_dynamic_uniforms,
};
use crate::engine::pipelines::{
    object_bind_group, object_bind_group_layout, scene_shader, DepthMode, PipelineSpec,
    COLOR_FORMAT,
};
use crate::error::{RenderError, RenderResult};
use crate::pass::{FrameContext, ObjectUniforms, RenderPass, Target};

/// Triangle mesh decoded from an asset file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    // Appends another mesh, offsetting its indices.
    fn append(&mut self, positions: Vec<[f32; 3]>, normals: Option<Vec<[f32; 3]>>, indices: Vec<u32>) {
        let base = self.positions.len() as u32;
        let normals = match normals {
            Some(normals) if normals.len() == positions.len() => normals,
            _ => vertex_normals(&positions, &indices),
        };
        self.positions.extend(positions);
        self.normals.extend(normals);
        self.indices.extend(indices.into_iter().map(|i| i + base));
    }
}

/// Area-weighted vertex normals of an indexed triangle list.
#[must_use]
pub fn vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| i as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let [pa, pb, pc] = [a, b, c].map(|i| Vec3::from(positions[i]));
        let face = (pb - pa).cross(pc - pa);
        for i in [a, b, c] {
            normals[i] += face;
        }
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}

/// Loads every triangle primitive of a `.gltf`, `.glb` or `.obj` file into one mesh.
pub fn load_mesh_asset(path: impl AsRef<Path>) -> RenderResult<MeshData> {
    let path = path.as_ref();
    let uri = path.display().to_string();
    let failed = |reason: String| RenderError::AssetLoadFailed {
        uri: uri.clone(),
        reason,
    };
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let mesh = match extension.as_str() {
        "gltf" | "glb" => load_gltf(path).map_err(|e| failed(e.to_string()))?,
        "obj" => load_obj(path).map_err(|e| failed(e.to_string()))?,
        _ => return Err(failed(format!("unsupported mesh format '{extension}'"))),
    };
    if mesh.is_empty() {
        return Err(failed("no triangles found".to_string()));
    }
    log::debug!(
        "loaded mesh asset {uri}: {} vertices, {} triangles",
        mesh.positions.len(),
        mesh.indices.len() / 3
    );
    Ok(mesh)
}

fn load_gltf(path: &Path) -> Result<MeshData, gltf::Error> {
    let (document, buffers, _images) = gltf::import(path)?;
    let mut mesh = MeshData::default();
    for primitive in document.meshes().flat_map(|m| m.primitives()) {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            continue;
        }
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        let normals = reader.read_normals().map(Iterator::collect);
        let indices = reader.read_indices().map_or_else(
            || (0..positions.len() as u32).collect(),
            |indices| indices.into_u32().collect(),
        );
        mesh.append(positions, normals, indices);
    }
    Ok(mesh)
}

fn load_obj(path: &Path) -> Result<MeshData, tobj::LoadError> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )?;
    let mut mesh = MeshData::default();
    for model in models {
        let triples = |values: &[f32]| -> Vec<[f32; 3]> {
            values.chunks_exact(3).map(|v| [v[0], v[1], v[2]]).collect()
        };
        let positions = triples(&model.mesh.positions);
        let normals = (!model.mesh.normals.is_empty()).then(|| triples(&model.mesh.normals));
        mesh.append(positions, normals, model.mesh.indices);
    }
    Ok(mesh)
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MeshVertex {
    position: [f32; 3],
    normal: [f32; 3],
}

/// Instances of one mesh asset, placed at a datacube's points.
pub struct MeshInstancePass {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    instances: Vec<[f32; 3]>,
    instance_buffer: Option<wgpu::Buffer>,
    uniforms: ObjectUniforms,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
    altered: bool,
}

impl MeshInstancePass {
    pub fn new(device: &wgpu::Device, camera_layout: &wgpu::BindGroupLayout, mesh: &MeshData) -> Self {
        let vertices: Vec<MeshVertex> = mesh
            .positions
            .iter()
            .zip(&mesh.normals)
            .map(|(&position, &normal)| MeshVertex { position, normal })
            .collect();
        let vertex_buffer = create_vertex_buffer(device, &vertices, Some("mesh asset vertices"));
        let index_buffer = create_index_buffer(device, &mesh.indices, Some("mesh asset indices"));

        let object_layout = object_bind_group_layout(device);
        let uniform_buffer = create_dynamic_uniform_buffer(device, 1, Some("mesh asset uniforms"));
        let bind_group = object_bind_group(device, &object_layout, &uniform_buffer);

        let shader = scene_shader(device, "mesh asset shader", include_str!("shaders/mesh.wgsl"));
        let pipeline = PipelineSpec {
            label: "mesh asset pipeline",
            shader: &shader,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
            bind_group_layouts: &[camera_layout, &object_layout],
            buffers: &[
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<MeshVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
                },
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &wgpu::vertex_attr_array![2 => Float32x3],
                },
            ],
            format: COLOR_FORMAT,
            blend: Some(wgpu::BlendState::REPLACE),
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            depth: Some(DepthMode::TEST_AND_WRITE),
        }
        .build(device);

        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            instances: Vec::new(),
            instance_buffer: None,
            uniforms: ObjectUniforms::default(),
            uniform_buffer,
            bind_group,
            pipeline,
            altered: true,
        }
    }

    /// Sets the instance offsets in datacube-local coordinates.
    pub fn set_instances(&mut self, instances: Vec<[f32; 3]>) {
        if self.instances != instances {
            self.instances = instances;
            self.instance_buffer = None;
            self.altered = true;
        }
    }

    /// Sets the datacube transform, the color and the per-instance scale.
    pub fn set_transform(&mut self, model: Mat4, color: Vec4, instance_scale: Vec3) {
        let uniforms = ObjectUniforms::new(model, color).with_instance_scale(instance_scale);
        if bytemuck::bytes_of(&uniforms) != bytemuck::bytes_of(&self.uniforms) {
            self.uniforms = uniforms;
            self.altered = true;
        }
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

impl RenderPass for MeshInstancePass {
    fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if !self.altered {
            return;
        }
        if self.instance_buffer.is_none() && !self.instances.is_empty() {
            self.instance_buffer = Some(create_vertex_buffer(
                device,
                &self.instances,
                Some("mesh asset instances"),
            ));
        }
        queue.write_buffer(&self.uniform_buffer, 0, &pack_dynamic_uniforms(&[self.uniforms]));
        self.altered = false;
    }

    fn frame(&self, pass: &mut wgpu::RenderPass<'_>, ctx: &FrameContext<'_>) {
        if ctx.target != Target::Color || self.index_count == 0 {
            return;
        }
        let Some(instance_buffer) = &self.instance_buffer else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, ctx.camera, &[]);
        pass.set_bind_group(1, &self.bind_group, &[0]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, instance_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..self.instances.len() as u32);
    }

    fn altered(&self) -> bool {
        self.altered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_normals_of_a_triangle() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = vertex_normals(&positions, &[0, 1, 2]);
        for n in normals {
            assert!((Vec3::from(n) - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn test_append_offsets_indices() {
        let mut mesh = MeshData::default();
        let tri = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        mesh.append(tri.clone(), None, vec![0, 1, 2]);
        mesh.append(tri, None, vec![0, 1, 2]);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.normals.len(), 6);
    }

    #[test]
    fn test_unsupported_extension_is_an_error() {
        let result = load_mesh_asset("model.fbx");
        assert!(matches!(result, Err(RenderError::AssetLoadFailed { .. })));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = load_mesh_asset("definitely/not/here.glb");
        assert!(matches!(result, Err(RenderError::AssetLoadFailed { .. })));
    }

    #[test]
    fn test_load_obj_from_disk() {
        let dir = std::env::temp_dir().join("datacubes-render-mesh-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("triangle.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        let mesh = load_mesh_asset(&path).unwrap();
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.indices.len(), 3);
        assert_eq!(mesh.normals.len(), 3);
    }
}
