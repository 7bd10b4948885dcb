//! Change tracking for lazily rebuilt GPU state.

/// Flags marking state that must be rebuilt before the next frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct DirtyFlags {
    /// Canvas or frame size changed.
    pub frame_size: bool,
    /// Multi-frame sample count changed.
    pub multi_frame_number: bool,
    pub clear_color: bool,
    /// The datacube list changed; cuboids and point buffers must be re-derived.
    pub datacubes: bool,
    pub datacube_positions: bool,
    /// Per-cuboid attributes (height, color, extent, passes) changed.
    pub cuboids: bool,
    pub debug_view: bool,
}

impl DirtyFlags {
    /// All flags set, as after (re)initialization.
    #[must_use]
    pub fn all() -> Self {
        Self {
            frame_size: true,
            multi_frame_number: true,
            clear_color: true,
            datacubes: true,
            datacube_positions: true,
            cuboids: true,
            debug_view: true,
        }
    }

    /// Whether any flag is set.
    #[must_use]
    pub fn any(&self) -> bool {
        let Self {
            frame_size,
            multi_frame_number,
            clear_color,
            datacubes,
            datacube_positions,
            cuboids,
            debug_view,
        } = *self;
        frame_size
            || multi_frame_number
            || clear_color
            || datacubes
            || datacube_positions
            || cuboids
            || debug_view
    }

    /// Clears every flag.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_flags_any_and_reset() {
        let mut flags = DirtyFlags::default();
        assert!(!flags.any());
        flags.datacube_positions = true;
        assert!(flags.any());
        flags.reset();
        assert!(!flags.any());
        assert!(DirtyFlags::all().any());
    }
}
