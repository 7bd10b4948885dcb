//! GPU buffer management.

use wgpu::util::DeviceExt;

/// Byte stride between per-object uniform blocks addressed with dynamic offsets.
pub const DYNAMIC_UNIFORM_STRIDE: u64 = 256;

/// Creates a vertex buffer from data.
pub fn create_vertex_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    data: &[T],
    label: Option<&str>,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label,
        contents: bytemuck::cast_slice(data),
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    })
}

/// Creates an index buffer from data.
pub fn create_index_buffer(
    device: &wgpu::Device,
    data: &[u32],
    label: Option<&str>,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label,
        contents: bytemuck::cast_slice(data),
        usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
    })
}

/// Creates a uniform buffer from data.
pub fn create_uniform_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    data: &T,
    label: Option<&str>,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label,
        contents: bytemuck::bytes_of(data),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Creates a uniform buffer holding `capacity` blocks spaced [`DYNAMIC_UNIFORM_STRIDE`] apart.
pub fn create_dynamic_uniform_buffer(
    device: &wgpu::Device,
    capacity: usize,
    label: Option<&str>,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label,
        size: DYNAMIC_UNIFORM_STRIDE * capacity.max(1) as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Packs uniform blocks into a byte vector with [`DYNAMIC_UNIFORM_STRIDE`] spacing.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn pack_dynamic_uniforms<T: bytemuck::Pod>(blocks: &[T]) -> Vec<u8> {
    let stride = DYNAMIC_UNIFORM_STRIDE as usize;
    let mut bytes = vec![0u8; stride * blocks.len()];
    for (chunk, block) in bytes.chunks_exact_mut(stride).zip(blocks) {
        let data = bytemuck::bytes_of(block);
        chunk[..data.len()].copy_from_slice(data);
    }
    bytes
}

/// Creates a mappable buffer that receives texture copies.
pub fn create_readback_buffer(device: &wgpu::Device, size: u64, label: Option<&str>) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label,
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}

/// Row pitch of a texture copy, padded to wgpu's copy alignment.
#[must_use]
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Updates a buffer with new data.
pub fn update_buffer<T: bytemuck::Pod>(queue: &wgpu::Queue, buffer: &wgpu::Buffer, data: &[T]) {
    queue.write_buffer(buffer, 0, bytemuck::cast_slice(data));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_bytes_per_row() {
        assert_eq!(padded_bytes_per_row(1, 4), 256);
        assert_eq!(padded_bytes_per_row(64, 4), 256);
        assert_eq!(padded_bytes_per_row(65, 4), 512);
    }

    #[test]
    fn test_pack_dynamic_uniforms_spacing() {
        let bytes = pack_dynamic_uniforms(&[[1.0f32; 4], [2.0f32; 4]]);
        assert_eq!(bytes.len(), 512);
        let second: [f32; 4] = bytemuck::pod_read_unaligned(&bytes[256..272]);
        assert_eq!(second, [2.0; 4]);
    }
}
