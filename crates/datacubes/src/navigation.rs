//! Pausable camera navigation: turntable orbit, pan and wheel zoom.

use datacubes_render::Camera;
use glam::Vec2;

use crate::interaction::PointerButton;

/// Radians per pixel of orbit drag.
const ORBIT_SPEED: f32 = 0.01;
/// Fraction of the eye distance panned per pixel.
const PAN_SPEED: f32 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Orbit,
    Pan,
}

/// Turns pointer drags and wheel input into camera motion.
///
/// While paused every input is ignored, and resuming forgets whatever was in flight,
/// so a drag that started during a gesture never moves the camera afterwards.
#[derive(Debug, Default)]
pub struct Navigation {
    paused: bool,
    mode: Option<Mode>,
    last_position: Option<Vec2>,
}

impl Navigation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
        self.mode = None;
        self.last_position = None;
    }

    /// Resumes navigation and discards queued input.
    pub fn resume(&mut self) {
        self.paused = false;
        self.mode = None;
        self.last_position = None;
    }

    pub fn pointer_down(&mut self, button: PointerButton, position: Vec2, shift: bool) {
        if self.paused {
            return;
        }
        self.mode = match button {
            PointerButton::Primary if shift => Some(Mode::Pan),
            PointerButton::Primary => Some(Mode::Orbit),
            PointerButton::Secondary => Some(Mode::Pan),
            PointerButton::Other => None,
        };
        self.last_position = Some(position);
    }

    /// Applies a drag step. Returns whether the camera moved.
    pub fn pointer_move(&mut self, position: Vec2, camera: &mut Camera) -> bool {
        if self.paused {
            return false;
        }
        let (Some(mode), Some(last)) = (self.mode, self.last_position) else {
            return false;
        };
        self.last_position = Some(position);
        let delta = position - last;
        if delta == Vec2::ZERO {
            return false;
        }
        match mode {
            Mode::Orbit => camera.orbit(delta.x * ORBIT_SPEED, delta.y * ORBIT_SPEED),
            Mode::Pan => {
                let scale = camera.eye().distance(camera.center()) * PAN_SPEED;
                camera.pan(-delta.x * scale, delta.y * scale);
            }
        }
        true
    }

    pub fn pointer_up(&mut self) {
        self.mode = None;
        self.last_position = None;
    }

    /// Applies a wheel step. Positive offsets zoom in.
    pub fn wheel(&mut self, offset: f32, camera: &mut Camera) -> bool {
        if self.paused || offset == 0.0 {
            return false;
        }
        camera.wheel_zoom(offset);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orbit_moves_eye() {
        let mut camera = Camera::default();
        let before = camera.eye();
        let mut navigation = Navigation::new();
        navigation.pointer_down(PointerButton::Primary, Vec2::ZERO, false);
        assert!(navigation.pointer_move(Vec2::new(20.0, 0.0), &mut camera));
        assert_ne!(camera.eye(), before);
        // Orbiting keeps the distance to the center
        let distance = before.distance(camera.center());
        assert!((camera.eye().distance(camera.center()) - distance).abs() < 1e-4);
    }

    #[test]
    fn test_pan_moves_center() {
        let mut camera = Camera::default();
        let center = camera.center();
        let mut navigation = Navigation::new();
        navigation.pointer_down(PointerButton::Secondary, Vec2::ZERO, false);
        navigation.pointer_move(Vec2::new(10.0, 5.0), &mut camera);
        assert_ne!(camera.center(), center);
    }

    #[test]
    fn test_paused_ignores_input() {
        let mut camera = Camera::default();
        let eye = camera.eye();
        let mut navigation = Navigation::new();
        navigation.pause();
        navigation.pointer_down(PointerButton::Primary, Vec2::ZERO, false);
        assert!(!navigation.pointer_move(Vec2::new(50.0, 0.0), &mut camera));
        assert!(!navigation.wheel(1.0, &mut camera));
        assert_eq!(camera.eye(), eye);
    }

    #[test]
    fn test_resume_discards_drag_in_flight() {
        let mut camera = Camera::default();
        let eye = camera.eye();
        let mut navigation = Navigation::new();
        navigation.pointer_down(PointerButton::Primary, Vec2::ZERO, false);
        navigation.pause();
        navigation.resume();
        assert!(!navigation.pointer_move(Vec2::new(50.0, 0.0), &mut camera));
        assert_eq!(camera.eye(), eye);
    }

    #[test]
    fn test_wheel_zooms_towards_center() {
        let mut camera = Camera::default();
        let distance = camera.eye().distance(camera.center());
        let mut navigation = Navigation::new();
        assert!(navigation.wheel(1.0, &mut camera));
        assert!(camera.eye().distance(camera.center()) < distance);
    }
}
