//! Read-back of the ID, pre-depth and output targets into CPU memory.

use datacubes_core::IdBufferCapture;

use super::RenderEngine;
use crate::buffer::{create_readback_buffer, padded_bytes_per_row};
use crate::error::{RenderError, RenderResult};

impl RenderEngine {
    /// Copies the ID target and the pre-depth target of the last frame into a capture.
    pub fn read_id_buffer(&self) -> RenderResult<IdBufferCapture> {
        let (width, height) = self.targets.size();
        let rgba = self.read_texture(&self.targets.id.texture, 4)?;
        let depth_bytes = self.read_texture(&self.targets.pre_depth.texture, 4)?;
        let depths = depth_bytes
            .chunks_exact(4)
            .map(|px| f32::from_le_bytes([px[0], px[1], px[2], px[3]]))
            .collect();
        IdBufferCapture::from_rgba8(width, height, &rgba, depths)
            .map_err(|_| RenderError::BufferMapFailed)
    }

    /// Returns the last blitted frame as tightly packed sRGB RGBA8 pixels.
    pub fn capture_color(&self) -> RenderResult<(u32, u32, Vec<u8>)> {
        let (width, height) = self.targets.size();
        let pixels = self.read_texture(&self.targets.output.texture, 4)?;
        Ok((width, height, pixels))
    }

    // Copies a whole texture into a staging buffer and strips the row padding.
    fn read_texture(&self, texture: &wgpu::Texture, bytes_per_pixel: u32) -> RenderResult<Vec<u8>> {
        let width = texture.width();
        let height = texture.height();
        let padded_row = padded_bytes_per_row(width, bytes_per_pixel);
        let staging_buffer = create_readback_buffer(
            &self.device,
            u64::from(padded_row) * u64::from(height),
            Some("read-back staging buffer"),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read-back encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver outlives the poll below.
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| RenderError::BufferMapFailed)?
            .map_err(|_| RenderError::BufferMapFailed)?;

        let unpadded_row = (width * bytes_per_pixel) as usize;
        let mut pixels = Vec::with_capacity(unpadded_row * height as usize);
        {
            let data = buffer_slice.get_mapped_range();
            for row in data.chunks_exact(padded_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_row]);
            }
        }
        staging_buffer.unmap();
        Ok(pixels)
    }
}
