//! World-space text labels rendered from an 8x8 bitmap font.

use datacubes_core::LabelFontConfig;
use glam::Vec3;

use crate::buffer::create_vertex_buffer;
use crate::engine::pipelines::{
    scene_shader, texture_bind_group, texture_bind_group_layout, DepthMode, PipelineSpec,
    COLOR_FORMAT,
};
use crate::pass::{FrameContext, RenderPass, Target};

/// Glyphs in the atlas (ASCII).
pub const GLYPH_COUNT: u32 = 128;
/// Edge length of one glyph in atlas pixels.
pub const GLYPH_SIZE: u32 = 8;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// How text exceeding the line width is shortened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Elide {
    #[default]
    None,
    Middle,
    Right,
}

/// Which part of the line sits on the label position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineAnchor {
    Ascent,
    #[default]
    Baseline,
    Descent,
}

/// A single line of text placed in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    pub position: Vec3,
    /// Reading direction.
    pub direction: Vec3,
    pub up: Vec3,
    pub alignment: Alignment,
    /// Maximum line width in world units, used for eliding.
    pub line_width: Option<f32>,
    pub elide: Elide,
    pub line_anchor: LineAnchor,
    /// Glyph height in world units.
    pub font_size: f32,
}

impl Label {
    #[must_use]
    pub fn new(text: impl Into<String>, position: Vec3) -> Self {
        Self {
            text: text.into(),
            position,
            direction: Vec3::X,
            up: Vec3::Y,
            alignment: Alignment::Left,
            line_width: None,
            elide: Elide::None,
            line_anchor: LineAnchor::Baseline,
            font_size: 0.1,
        }
    }

    #[must_use]
    pub fn oriented(mut self, direction: Vec3, up: Vec3) -> Self {
        self.direction = direction;
        self.up = up;
        self
    }

    #[must_use]
    pub fn aligned(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    #[must_use]
    pub fn elided(mut self, elide: Elide, line_width: f32) -> Self {
        self.elide = elide;
        self.line_width = Some(line_width);
        self
    }

    #[must_use]
    pub fn anchored(mut self, line_anchor: LineAnchor) -> Self {
        self.line_anchor = line_anchor;
        self
    }

    /// The text as it is drawn, shortened to the line width if eliding.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn display_text(&self) -> String {
        let chars: Vec<char> = self.text.chars().collect();
        let Some(line_width) = self.line_width else {
            return self.text.clone();
        };
        if self.elide == Elide::None || self.font_size <= 0.0 {
            return self.text.clone();
        }
        let max_chars = (line_width / self.font_size).floor().max(0.0) as usize;
        if chars.len() <= max_chars {
            return self.text.clone();
        }
        if max_chars <= ELLIPSIS.len() {
            return ELLIPSIS[..max_chars].to_string();
        }
        let keep = max_chars - ELLIPSIS.len();
        match self.elide {
            Elide::Right => chars[..keep].iter().collect::<String>() + ELLIPSIS,
            Elide::Middle => {
                let head = keep.div_ceil(2);
                let tail = keep - head;
                let mut text: String = chars[..head].iter().collect();
                text.push_str(ELLIPSIS);
                text.extend(&chars[chars.len() - tail..]);
                text
            }
            Elide::None => self.text.clone(),
        }
    }
}

/// Alternative placements of one label; only one is shown at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    pub labels: Vec<Label>,
    /// Show the candidate nearest to the eye, otherwise the farthest.
    pub use_nearest: bool,
}

impl LabelSet {
    #[must_use]
    pub fn new(labels: Vec<Label>, use_nearest: bool) -> Self {
        Self {
            labels,
            use_nearest,
        }
    }

    /// A set with a single candidate.
    #[must_use]
    pub fn single(label: Label) -> Self {
        Self::new(vec![label], true)
    }

    /// Picks the candidate to show from `eye`.
    #[must_use]
    pub fn select(&self, eye: Vec3) -> Option<&Label> {
        let distance = |label: &&Label| label.position.distance_squared(eye);
        let ordered = |a: &&Label, b: &&Label| distance(a).total_cmp(&distance(b));
        if self.use_nearest {
            self.labels.iter().min_by(ordered)
        } else {
            self.labels.iter().max_by(ordered)
        }
    }
}

/// Selects one label per set and sizes it by its distance to the eye.
#[must_use]
pub fn select_labels(sets: &[LabelSet], eye: Vec3, font: &LabelFontConfig) -> Vec<Label> {
    sets.iter()
        .filter_map(|set| set.select(eye))
        .map(|label| {
            let mut label = label.clone();
            label.font_size = font.size_at(label.position.distance(eye));
            label
        })
        .collect()
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlyphVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Builds two triangles per glyph of the label's display text.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn layout_label(label: &Label) -> Vec<GlyphVertex> {
    let text = label.display_text();
    let size = label.font_size;
    let count = text.chars().count() as f32;
    let width = count * size;
    let start = match label.alignment {
        Alignment::Left => 0.0,
        Alignment::Center => -width * 0.5,
        Alignment::Right => -width,
    };
    // One pixel row of the 8x8 cell lies below the baseline.
    let bottom = match label.line_anchor {
        LineAnchor::Ascent => -size,
        LineAnchor::Baseline => -size / GLYPH_SIZE as f32,
        LineAnchor::Descent => 0.0,
    };
    let right = label.direction.normalize_or_zero();
    let up = label.up.normalize_or_zero();

    let mut vertices = Vec::with_capacity(text.len() * 6);
    for (i, c) in text.chars().enumerate() {
        let glyph = if c.is_ascii() { u32::from(c) } else { u32::from('?') };
        let u0 = (glyph * GLYPH_SIZE) as f32 / (GLYPH_COUNT * GLYPH_SIZE) as f32;
        let u1 = ((glyph + 1) * GLYPH_SIZE) as f32 / (GLYPH_COUNT * GLYPH_SIZE) as f32;
        let x0 = start + i as f32 * size;
        let corner = |x: f32, y: f32, u: f32, v: f32| GlyphVertex {
            position: (label.position + right * x + up * y).to_array(),
            uv: [u, v],
        };
        let bl = corner(x0, bottom, u0, 1.0);
        let br = corner(x0 + size, bottom, u1, 1.0);
        let tr = corner(x0 + size, bottom + size, u1, 0.0);
        let tl = corner(x0, bottom + size, u0, 0.0);
        vertices.extend_from_slice(&[bl, br, tr, bl, tr, tl]);
    }
    vertices
}

/// Rasterizes the ASCII glyphs into a `1024 x 8` single-channel atlas.
#[must_use]
pub fn glyph_atlas() -> Vec<u8> {
    let width = (GLYPH_COUNT * GLYPH_SIZE) as usize;
    let mut pixels = vec![0u8; width * GLYPH_SIZE as usize];
    for (glyph, rows) in font8x8::legacy::BASIC_LEGACY.iter().enumerate() {
        for (y, row) in rows.iter().enumerate() {
            for x in 0..GLYPH_SIZE as usize {
                if (row >> x) & 1 == 1 {
                    pixels[y * width + glyph * GLYPH_SIZE as usize + x] = 255;
                }
            }
        }
    }
    pixels
}

/// Renders the selected label of every [`LabelSet`].
pub struct LabelPass {
    sets: Vec<LabelSet>,
    font: LabelFontConfig,
    eye: Vec3,
    labels: Vec<Label>,
    vertex_buffer: Option<wgpu::Buffer>,
    vertex_count: u32,
    atlas_bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
    altered: bool,
}

impl LabelPass {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        camera_layout: &wgpu::BindGroupLayout,
        font: LabelFontConfig,
    ) -> Self {
        let atlas_size = wgpu::Extent3d {
            width: GLYPH_COUNT * GLYPH_SIZE,
            height: GLYPH_SIZE,
            depth_or_array_layers: 1,
        };
        let atlas = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glyph atlas"),
            size: atlas_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &atlas,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &glyph_atlas(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(GLYPH_COUNT * GLYPH_SIZE),
                rows_per_image: Some(GLYPH_SIZE),
            },
            atlas_size,
        );
        let atlas_view = atlas.create_view(&wgpu::TextureViewDescriptor::default());
        let atlas_layout = texture_bind_group_layout(device, "glyph atlas layout");
        let atlas_bind_group =
            texture_bind_group(device, &atlas_layout, &atlas_view, "glyph atlas bind group");

        let shader = scene_shader(device, "label shader", include_str!("shaders/label.wgsl"));
        let pipeline = PipelineSpec {
            label: "label pipeline",
            shader: &shader,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
            bind_group_layouts: &[camera_layout, &atlas_layout],
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<GlyphVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2],
            }],
            format: COLOR_FORMAT,
            blend: Some(wgpu::BlendState::REPLACE),
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            depth: Some(DepthMode::TEST_AND_WRITE),
        }
        .build(device);

        Self {
            sets: Vec::new(),
            font,
            eye: Vec3::ZERO,
            labels: Vec::new(),
            vertex_buffer: None,
            vertex_count: 0,
            atlas_bind_group,
            pipeline,
            altered: true,
        }
    }

    /// Replaces the label sets.
    pub fn set_label_sets(&mut self, sets: Vec<LabelSet>) {
        if self.sets != sets {
            self.sets = sets;
            self.reselect();
        }
    }

    /// Moves the eye; selection and font sizes follow.
    pub fn set_eye(&mut self, eye: Vec3) {
        if self.eye != eye {
            self.eye = eye;
            self.reselect();
        }
    }

    /// Currently shown labels.
    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    fn reselect(&mut self) {
        let labels = select_labels(&self.sets, self.eye, &self.font);
        if labels != self.labels {
            self.labels = labels;
            self.altered = true;
        }
    }
}

impl RenderPass for LabelPass {
    fn update(&mut self, device: &wgpu::Device, _queue: &wgpu::Queue) {
        if !self.altered {
            return;
        }
        let vertices: Vec<GlyphVertex> = self.labels.iter().flat_map(layout_label).collect();
        self.vertex_count = vertices.len() as u32;
        self.vertex_buffer = (!vertices.is_empty())
            .then(|| create_vertex_buffer(device, &vertices, Some("label vertices")));
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
        pass.set_bind_group(1, &self.atlas_bind_group, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.draw(0..self.vertex_count, 0..1);
    }

    fn altered(&self) -> bool {
        self.altered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_set_selects_nearest_or_farthest() {
        let near = Label::new("near", Vec3::new(1.0, 0.0, 0.0));
        let far = Label::new("far", Vec3::new(5.0, 0.0, 0.0));
        let eye = Vec3::ZERO;
        let nearest = LabelSet::new(vec![far.clone(), near.clone()], true);
        assert_eq!(nearest.select(eye).map(|l| l.text.as_str()), Some("near"));
        let farthest = LabelSet::new(vec![near, far], false);
        assert_eq!(farthest.select(eye).map(|l| l.text.as_str()), Some("far"));
    }

    #[test]
    fn test_font_size_follows_distance() {
        let font = LabelFontConfig::default();
        let sets = vec![LabelSet::single(Label::new("a", Vec3::new(0.0, 0.0, 15.0)))];
        let labels = select_labels(&sets, Vec3::ZERO, &font);
        assert!((labels[0].font_size - 0.175).abs() < 1e-6);

        let labels = select_labels(&sets, Vec3::new(0.0, 0.0, 100.0), &font);
        assert!((labels[0].font_size - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_elide_right_and_middle() {
        let mut label = Label::new("abcdefghij", Vec3::ZERO).elided(Elide::Right, 1.75);
        label.font_size = 0.25;
        assert_eq!(label.display_text(), "abcd...");
        label.elide = Elide::Middle;
        assert_eq!(label.display_text(), "ab...ij");
        label.line_width = Some(4.0);
        assert_eq!(label.display_text(), "abcdefghij");
    }

    #[test]
    fn test_layout_alignment() {
        let mut label = Label::new("ab", Vec3::ZERO).anchored(LineAnchor::Descent);
        label.font_size = 1.0;
        let left = layout_label(&label);
        assert_eq!(left.len(), 12);
        assert_eq!(left[0].position, [0.0, 0.0, 0.0]);

        let right = layout_label(&label.clone().aligned(Alignment::Right));
        assert_eq!(right[0].position, [-2.0, 0.0, 0.0]);

        let centered = layout_label(&label.aligned(Alignment::Center));
        assert_eq!(centered[0].position, [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_glyph_atlas_has_ink() {
        let atlas = glyph_atlas();
        assert_eq!(atlas.len(), 1024 * 8);
        let width = 1024;
        let glyph_a = u32::from('A') as usize * 8;
        let ink = (0..8)
            .flat_map(|y| (0..8).map(move |x| y * width + glyph_a + x))
            .filter(|&i| atlas[i] == 255)
            .count();
        assert!(ink > 0);
        // Space has no ink.
        let space = u32::from(' ') as usize * 8;
        assert!((0..8).all(|y| (0..8).all(|x| atlas[y * width + space + x] == 0)));
    }
}
