//! The main rendering engine.

mod pick;
pub mod pipelines;
pub mod targets;

use std::sync::Arc;

use glam::{Mat4, Vec2};
use wgpu::util::DeviceExt;

use crate::camera::Camera;
use crate::error::{RenderError, RenderResult};
use targets::{FrameTargets, OUTPUT_FORMAT};

/// Camera uniforms for GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
    /// Jitter of the current sub-frame in NDC units.
    pub ndc_offset: [f32; 2],
    /// Viewport size in pixels.
    pub viewport: [f32; 2],
}

impl Default for CameraUniforms {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY.to_cols_array_2d(),
            proj: Mat4::IDENTITY.to_cols_array_2d(),
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            inv_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            eye: [0.0, 0.0, 5.0, 1.0],
            ndc_offset: [0.0; 2],
            viewport: [1.0; 2],
        }
    }
}

impl CameraUniforms {
    #[must_use]
    pub fn new(camera: &Camera, ndc_offset: Vec2) -> Self {
        let view = camera.view();
        let proj = camera.projection();
        let view_proj = proj * view;
        Self {
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            eye: camera.eye().extend(1.0).to_array(),
            ndc_offset: ndc_offset.to_array(),
            viewport: camera.viewport().to_array(),
        }
    }
}

/// The main rendering engine backed by wgpu.
pub struct RenderEngine {
    /// The wgpu instance.
    pub instance: wgpu::Instance,
    /// The wgpu adapter.
    pub adapter: wgpu::Adapter,
    /// The wgpu device.
    pub device: wgpu::Device,
    /// The wgpu queue.
    pub queue: wgpu::Queue,
    /// The render surface (None for headless).
    pub surface: Option<wgpu::Surface<'static>>,
    /// Surface configuration. Headless engines keep it as a description of the output target.
    pub surface_config: wgpu::SurfaceConfiguration,
    /// Off-screen framebuffers.
    pub targets: FrameTargets,
    /// Camera uniform buffer.
    pub camera_buffer: wgpu::Buffer,
    /// Camera bind group layout (group 0 of every scene pipeline).
    pub camera_bind_group_layout: wgpu::BindGroupLayout,
    /// Camera bind group.
    pub camera_bind_group: wgpu::BindGroup,
}

impl RenderEngine {
    /// Creates a new windowed render engine.
    pub async fn new_windowed(window: Arc<winit::window::Window>) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::AdapterCreationFailed)?;

        let (device, queue) = Self::request_device(&adapter, "datacubes device").await?;

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(RenderError::SurfaceConfigurationFailed)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        log::info!(
            "created windowed engine on {} ({width}x{height}, {surface_format:?})",
            adapter.get_info().name
        );
        Ok(Self::assemble(instance, adapter, device, queue, Some(surface), surface_config))
    }

    /// Creates a render engine without a window, rendering into [`FrameTargets::output`].
    pub async fn new_headless(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::AdapterCreationFailed)?;

        let (device, queue) = Self::request_device(&adapter, "datacubes device (headless)").await?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: OUTPUT_FORMAT,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        log::info!("created headless engine on {}", adapter.get_info().name);
        Ok(Self::assemble(instance, adapter, device, queue, None, surface_config))
    }

    async fn request_device(
        adapter: &wgpu::Adapter,
        label: &str,
    ) -> RenderResult<(wgpu::Device, wgpu::Queue)> {
        Ok(adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(label),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?)
    }

    fn assemble(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: Option<wgpu::Surface<'static>>,
        surface_config: wgpu::SurfaceConfiguration,
    ) -> Self {
        let targets = FrameTargets::new(&device, surface_config.width, surface_config.height);

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("camera uniforms"),
            contents: bytemuck::cast_slice(&[CameraUniforms::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group_layout = pipelines::camera_bind_group_layout(&device);
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera bind group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            surface_config,
            targets,
            camera_buffer,
            camera_bind_group_layout,
            camera_bind_group,
        }
    }

    /// Current frame size in pixels.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.targets.size()
    }

    /// Format of the final blit target.
    #[must_use]
    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    /// Whether the engine presents to a window.
    #[must_use]
    pub fn is_windowed(&self) -> bool {
        self.surface.is_some()
    }

    /// Resizes the surface and recreates every framebuffer. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if (width, height) == self.targets.size() {
            return;
        }

        self.surface_config.width = width;
        self.surface_config.height = height;
        if let Some(ref surface) = self.surface {
            surface.configure(&self.device, &self.surface_config);
        }
        self.targets = FrameTargets::new(&self.device, width, height);
        log::debug!("resized frame targets to {width}x{height}");
    }

    /// Uploads the camera matrices and the jitter of the current sub-frame.
    pub fn update_camera_uniforms(&self, camera: &Camera, ndc_offset: Vec2) {
        let uniforms = CameraUniforms::new(camera, ndc_offset);
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[uniforms]));
    }

    /// Acquires the next surface texture; headless engines have none.
    pub fn acquire_surface_texture(&self) -> RenderResult<Option<wgpu::SurfaceTexture>> {
        let Some(surface) = &self.surface else {
            return Ok(None);
        };
        match surface.get_current_texture() {
            Ok(texture) => Ok(Some(texture)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                surface.configure(&self.device, &self.surface_config);
                Err(RenderError::SurfaceOutdated)
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_uniforms_layout() {
        assert_eq!(
            std::mem::size_of::<CameraUniforms>() as u64,
            pipelines::CAMERA_UNIFORMS_SIZE
        );
    }

    #[test]
    fn test_camera_uniforms_inverse() {
        let mut camera = Camera::default();
        camera.set_viewport(320, 240);
        let uniforms = CameraUniforms::new(&camera, Vec2::ZERO);
        let view_proj = Mat4::from_cols_array_2d(&uniforms.view_proj);
        let inverse = Mat4::from_cols_array_2d(&uniforms.inv_view_proj);
        assert!((view_proj * inverse).abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert_eq!(uniforms.viewport, [320.0, 240.0]);
    }
}
