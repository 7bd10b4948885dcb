//! Application window and event loop management.

mod input;

use std::sync::mpsc::Receiver;
pub(super) use std::sync::Arc;
use std::time::Instant;

pub(super) use pollster::FutureExt;
pub(super) use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorIcon, Window, WindowId},
};

pub(super) use datacubes_core::{CursorAffordance, DatacubesError, DebugView, Result};
pub(super) use datacubes_render::RenderEngine;
pub(super) use glam::Vec2;

use crate::canvas::Canvas;
use crate::interaction::{AugmentedPointerEvent, CanvasRect, PointerButton, PointerEvent};
use crate::renderer::Renderer;

/// Pointer travel, in pixels, below which a press and release count as a click.
const CLICK_DISTANCE: f32 = 3.0;

/// Called once per frame before the canvas is updated.
pub type FrameCallback = Box<dyn FnMut(&mut Canvas)>;

/// A window showing one [`Canvas`].
///
/// Pointer, wheel and resize events of the window drive the canvas. Keyboard:
/// `P` toggles the projection, `D` cycles the debug views and `Escape` closes.
pub struct DatacubesApplication {
    pub(super) title: String,
    pub(super) window: Option<Arc<Window>>,
    pub(super) renderer: Option<Renderer>,
    pub(super) canvas: Canvas,
    pub(super) frame_callback: Option<FrameCallback>,
    /// Own subscription to augmented pointer events, used for the cursor icon.
    pub(super) pointer_events: Receiver<AugmentedPointerEvent>,
    pub(super) cursor_affordance: CursorAffordance,
    // Pointer state in physical pixels
    pub(super) cursor: Vec2,
    pub(super) pressed: Option<PointerButton>,
    pub(super) press_position: Vec2,
    pub(super) shift_down: bool,
    pub(super) perspective: bool,
    pub(super) last_frame_time: Option<Instant>,
}

impl DatacubesApplication {
    /// Creates an application around `canvas`.
    pub fn new(mut canvas: Canvas) -> Self {
        let pointer_events = canvas.subscribe_pointer_events();
        let perspective = canvas.options().camera.perspective;
        Self {
            title: "datacubes".to_string(),
            window: None,
            renderer: None,
            canvas,
            frame_callback: None,
            pointer_events,
            cursor_affordance: CursorAffordance::Default,
            cursor: Vec2::ZERO,
            pressed: None,
            press_position: Vec2::ZERO,
            shift_down: false,
            perspective,
            last_frame_time: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Installs a callback that may feed datacubes and positions into the canvas every frame.
    #[must_use]
    pub fn with_frame_callback(mut self, callback: impl FnMut(&mut Canvas) + 'static) -> Self {
        self.frame_callback = Some(Box::new(callback));
        self
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    /// Opens the window and runs the event loop until it is closed.
    pub fn run(&mut self) -> Result<()> {
        let event_loop = EventLoop::new()
            .map_err(|e| DatacubesError::RenderError(format!("failed to create event loop: {e}")))?;
        event_loop
            .run_app(self)
            .map_err(|e| DatacubesError::RenderError(format!("event loop error: {e}")))
    }

    /// Builds a pointer event at the current cursor position.
    pub(super) fn pointer_event(&self) -> PointerEvent {
        let (width, height) = self
            .window
            .as_ref()
            .map_or((1, 1), |w| (w.inner_size().width, w.inner_size().height));
        PointerEvent::new(self.cursor, CanvasRect::from_size(width, height))
            .with_button(self.pressed.unwrap_or_default())
            .with_shift(self.shift_down)
            .with_cursor(self.cursor_affordance)
    }

    /// Takes the cursor affordance from the latest augmented event.
    pub(super) fn sync_cursor(&mut self) {
        let Some(latest) = self.pointer_events.try_iter().last() else {
            return;
        };
        // The icon stays fixed for the duration of a gesture
        if self.canvas.is_gesture_active() {
            return;
        }
        let affordance = latest.cursor();
        if affordance != self.cursor_affordance {
            self.cursor_affordance = affordance;
            if let Some(window) = &self.window {
                window.set_cursor(cursor_icon(affordance));
            }
        }
    }

    pub(super) fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    /// Steps the canvas and renders one frame.
    pub(super) fn redraw(&mut self) {
        let now = Instant::now();
        let dt = self
            .last_frame_time
            .map_or(0.0, |last| now.duration_since(last).as_secs_f64());
        self.last_frame_time = Some(now);

        if let Some(callback) = &mut self.frame_callback {
            callback(&mut self.canvas);
        }
        let mut needs_redraw = self.canvas.update(dt);

        if let Some(renderer) = &mut self.renderer {
            match renderer.render(&mut self.canvas) {
                Ok(status) => needs_redraw |= status.needs_redraw(),
                Err(error) => log::warn!("frame failed: {error}"),
            }
        }
        if needs_redraw || self.canvas.is_animating() || self.frame_callback.is_some() {
            self.request_redraw();
        } else {
            // Idle until the next input
            self.last_frame_time = None;
        }
    }
}

pub(super) fn cursor_icon(affordance: CursorAffordance) -> CursorIcon {
    match affordance {
        CursorAffordance::Default => CursorIcon::Default,
        CursorAffordance::EwResize => CursorIcon::EwResize,
        CursorAffordance::NsResize => CursorIcon::NsResize,
        CursorAffordance::NeswResize => CursorIcon::NeswResize,
        CursorAffordance::NwseResize => CursorIcon::NwseResize,
    }
}

pub(super) fn pointer_button(button: MouseButton) -> PointerButton {
    match button {
        MouseButton::Left => PointerButton::Primary,
        MouseButton::Right => PointerButton::Secondary,
        _ => PointerButton::Other,
    }
}

/// Wheel offset in lines, positive away from the user.
pub(super) fn wheel_offset(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y,
        MouseScrollDelta::PixelDelta(position) => position.y as f32 / 40.0,
    }
}

pub(super) fn next_debug_view(view: DebugView) -> DebugView {
    match view {
        DebugView::None => DebugView::IdBuffer,
        DebugView::IdBuffer => DebugView::Depth,
        DebugView::Depth => DebugView::None,
    }
}
