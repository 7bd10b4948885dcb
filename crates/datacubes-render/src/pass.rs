//! The render pass abstraction shared by every drawable in the scene.

use glam::{Mat4, Vec3, Vec4};

/// Framebuffer a pass is being recorded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Depth-only rendering of bounding boxes into the pre-depth target.
    PreDepth,
    /// The jittered color target.
    Color,
    /// One stage of the object-ID target.
    Id(IdStage),
}

/// The ID target is filled in three ordered stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStage {
    /// Back faces of boxes whose objects carry sub-elements.
    Containers,
    /// Points of the hovered object, without depth test.
    Points,
    /// Front faces of boxes of objects without sub-elements.
    Solids,
}

/// Per-object uniform block, addressed with a dynamic offset.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniforms {
    pub model: [[f32; 4]; 4],
    /// sRGB color and alpha.
    pub color: [f32; 4],
    /// Encoded pick id of the object.
    pub id_color: [f32; 4],
    /// Encoded id of a highlighted sub-element.
    pub highlight_id: [f32; 4],
    /// x: hidden in the pre-depth pass, y: highlight enabled.
    pub params: [f32; 4],
    /// Per-axis scale of mesh instances.
    pub instance_scale: [f32; 4],
}

impl Default for ObjectUniforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            color: [1.0; 4],
            id_color: [0.0; 4],
            highlight_id: [0.0; 4],
            params: [0.0; 4],
            instance_scale: [1.0, 1.0, 1.0, 0.0],
        }
    }
}

impl ObjectUniforms {
    #[must_use]
    pub fn new(model: Mat4, color: Vec4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: color.to_array(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: u32) -> Self {
        self.id_color = datacubes_core::pick::encode_id_normalized(id);
        self
    }

    #[must_use]
    pub fn with_highlight(mut self, id: Option<u32>) -> Self {
        if let Some(id) = id {
            self.highlight_id = datacubes_core::pick::encode_id_normalized(id);
            self.params[1] = 1.0;
        } else {
            self.params[1] = 0.0;
        }
        self
    }

    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.params[0] = if hidden { 1.0 } else { 0.0 };
        self
    }

    #[must_use]
    pub fn with_instance_scale(mut self, scale: Vec3) -> Self {
        self.instance_scale = scale.extend(0.0).to_array();
        self
    }
}

/// Bindings every pass needs while recording.
pub struct FrameContext<'a> {
    /// Camera uniforms at group 0.
    pub camera: &'a wgpu::BindGroup,
    pub target: Target,
}

/// A drawable owning its pipelines and GPU geometry.
///
/// CPU-side state is changed through pass-specific setters, uploaded in
/// [`RenderPass::update`] and drawn in [`RenderPass::frame`]. A pass without
/// geometry records nothing.
pub trait RenderPass {
    /// Uploads pending changes to the GPU.
    fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue);

    /// Records draw calls for `ctx.target`. Passes ignore targets they don't draw into.
    fn frame(&self, pass: &mut wgpu::RenderPass<'_>, ctx: &FrameContext<'_>);

    /// Whether the pass changed since its last [`RenderPass::update`].
    fn altered(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_uniforms_fit_dynamic_stride() {
        assert!(std::mem::size_of::<ObjectUniforms>() as u64 <= crate::buffer::DYNAMIC_UNIFORM_STRIDE);
        assert_eq!(std::mem::size_of::<ObjectUniforms>(), 144);
    }

    #[test]
    fn test_highlight_flag() {
        let uniforms = ObjectUniforms::default().with_highlight(Some(42));
        assert_eq!(uniforms.params[1], 1.0);
        assert_eq!(
            datacubes_core::pick::decode_id_normalized(uniforms.highlight_id),
            42
        );
        assert_eq!(uniforms.with_highlight(None).params[1], 0.0);
    }
}
