use super::{
    next_debug_view, pointer_button, wheel_offset, ActiveEventLoop, ApplicationHandler, Arc,
    DatacubesApplication, ElementState, FutureExt, KeyCode, LogicalSize, PhysicalKey,
    RenderEngine, Vec2, Window, WindowEvent, WindowId, CLICK_DISTANCE,
};
use crate::renderer::Renderer;

impl ApplicationHandler for DatacubesApplication {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(LogicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(error) => {
                log::error!("failed to create window: {error}");
                event_loop.exit();
                return;
            }
        };

        let engine = match RenderEngine::new_windowed(window.clone()).block_on() {
            Ok(engine) => engine,
            Err(error) => {
                log::error!("failed to create render engine: {error}");
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        self.canvas.resize(size.width, size.height);
        self.renderer = Some(Renderer::new(engine, &self.canvas));
        self.window = Some(window);
        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.canvas.resize(size.width, size.height);
                self.request_redraw();
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.shift_down = modifiers.state().shift_key();
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                let pointer = self.pointer_event();
                self.canvas.pointer_move(&pointer);
                self.sync_cursor();
                self.request_redraw();
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = pointer_button(button);
                match state {
                    ElementState::Pressed => {
                        if self.pressed.is_some() {
                            return;
                        }
                        self.pressed = Some(button);
                        self.press_position = self.cursor;
                        let pointer = self.pointer_event();
                        self.canvas.pointer_down(&pointer);
                    }
                    ElementState::Released => {
                        if self.pressed != Some(button) {
                            return;
                        }
                        let pointer = self.pointer_event();
                        self.pressed = None;
                        let dragging = self.canvas.is_gesture_active();
                        self.canvas.pointer_up(&pointer);
                        if !dragging && self.cursor.distance(self.press_position) < CLICK_DISTANCE {
                            self.canvas.click(&pointer);
                        }
                        self.sync_cursor();
                    }
                }
                self.request_redraw();
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.canvas.wheel(wheel_offset(delta));
                self.request_redraw();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                    PhysicalKey::Code(KeyCode::KeyP) => {
                        self.perspective = !self.perspective;
                        self.canvas.set_perspective(self.perspective);
                    }
                    PhysicalKey::Code(KeyCode::KeyD) => {
                        let view = next_debug_view(self.canvas.options().debug_view);
                        log::info!("debug view: {view:?}");
                        self.canvas.set_debug_view(view);
                    }
                    _ => return,
                }
                self.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }
}
