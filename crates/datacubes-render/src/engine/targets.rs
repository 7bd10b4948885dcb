//! Off-screen framebuffers, recreated whenever the frame size changes.

use super::pipelines::{
    ACCUMULATION_FORMAT, COLOR_FORMAT, DEPTH_FORMAT, ID_FORMAT, PRE_DEPTH_FORMAT,
};

/// A texture and its default view.
pub struct TargetTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl TargetTexture {
    fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Every framebuffer of the multi-pass pipeline.
pub struct FrameTargets {
    pub width: u32,
    pub height: u32,
    pub color: TargetTexture,
    pub color_depth: TargetTexture,
    pub accumulation: TargetTexture,
    pub id: TargetTexture,
    pub id_depth: TargetTexture,
    pub pre_depth: TargetTexture,
    pub pre_depth_depth: TargetTexture,
    /// 8-bit sRGB copy of the displayed frame, used for headless output and capture.
    pub output: TargetTexture,
}

/// Format of [`FrameTargets::output`].
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

impl FrameTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let attachment =
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let readable = attachment | wgpu::TextureUsages::COPY_SRC;
        let depth = wgpu::TextureUsages::RENDER_ATTACHMENT;
        Self {
            width,
            height,
            color: TargetTexture::new(device, "color target", width, height, COLOR_FORMAT, attachment),
            color_depth: TargetTexture::new(device, "color depth", width, height, DEPTH_FORMAT, depth),
            accumulation: TargetTexture::new(
                device,
                "accumulation target",
                width,
                height,
                ACCUMULATION_FORMAT,
                attachment,
            ),
            id: TargetTexture::new(device, "id target", width, height, ID_FORMAT, readable),
            id_depth: TargetTexture::new(device, "id depth", width, height, DEPTH_FORMAT, depth),
            pre_depth: TargetTexture::new(
                device,
                "pre-depth target",
                width,
                height,
                PRE_DEPTH_FORMAT,
                readable,
            ),
            pre_depth_depth: TargetTexture::new(
                device,
                "pre-depth depth",
                width,
                height,
                DEPTH_FORMAT,
                depth,
            ),
            output: TargetTexture::new(device, "output target", width, height, OUTPUT_FORMAT, readable),
        }
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
