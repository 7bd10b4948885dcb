//! Camera and view management.

use std::cell::Cell;

use datacubes_core::CameraConfig;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Projection blend value of a pure orthographic projection.
pub const ORTHOGRAPHIC: f32 = 0.0;
/// Projection blend value of a pure perspective projection.
pub const PERSPECTIVE: f32 = 1.0;

/// A 3D camera that blends continuously between orthographic and perspective projection.
///
/// Every mutation invalidates the cached projection and marks the camera as altered until
/// [`Camera::reset_altered`] is called, which the renderer does once per frame.
#[derive(Debug, Clone)]
pub struct Camera {
    eye: Vec3,
    center: Vec3,
    up: Vec3,
    near: f32,
    far: f32,
    /// Vertical field of view in degrees.
    fovy: f32,
    aspect: f32,
    frustum_height: f32,
    zoom: f32,
    /// Projection blend in `[ORTHOGRAPHIC, PERSPECTIVE]`.
    mode: f32,
    viewport: Vec2,
    altered: bool,
    projection: Cell<Option<Mat4>>,
}

impl Camera {
    /// Creates a new camera from a configuration.
    #[must_use]
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            eye: config.eye,
            center: config.center,
            up: config.up,
            near: config.near,
            far: config.far,
            fovy: config.fovy_degrees,
            aspect: 1.0,
            frustum_height: config.frustum_height,
            zoom: 1.0,
            mode: if config.perspective {
                PERSPECTIVE
            } else {
                ORTHOGRAPHIC
            },
            viewport: Vec2::ONE,
            altered: true,
            projection: Cell::new(None),
        }
    }

    fn invalidate(&mut self) {
        self.projection.set(None);
        self.altered = true;
    }

    #[must_use]
    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    pub fn set_eye(&mut self, eye: Vec3) {
        if self.eye != eye {
            self.eye = eye;
            self.invalidate();
        }
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn set_center(&mut self, center: Vec3) {
        if self.center != center {
            self.center = center;
            self.invalidate();
        }
    }

    #[must_use]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn set_up(&mut self, up: Vec3) {
        if self.up != up {
            self.up = up;
            self.invalidate();
        }
    }

    #[must_use]
    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn set_near(&mut self, near: f32) {
        let near = near.max(0.001);
        if self.near != near {
            self.near = near;
            self.invalidate();
        }
    }

    #[must_use]
    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn set_far(&mut self, far: f32) {
        let far = far.max(self.near + 0.1);
        if self.far != far {
            self.far = far;
            self.invalidate();
        }
    }

    /// Vertical field of view in degrees.
    #[must_use]
    pub fn fovy(&self) -> f32 {
        self.fovy
    }

    pub fn set_fovy(&mut self, degrees: f32) {
        let degrees = degrees.clamp(1.0, 179.0);
        if self.fovy != degrees {
            self.fovy = degrees;
            self.invalidate();
        }
    }

    #[must_use]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        if self.zoom != zoom && zoom > 0.0 {
            self.zoom = zoom;
            self.invalidate();
        }
    }

    #[must_use]
    pub fn frustum_height(&self) -> f32 {
        self.frustum_height
    }

    pub fn set_frustum_height(&mut self, frustum_height: f32) {
        if self.frustum_height != frustum_height && frustum_height > 0.0 {
            self.frustum_height = frustum_height;
            self.invalidate();
        }
    }

    /// Sets the viewport size in pixels, which also determines the aspect ratio.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        let viewport = Vec2::new(width.max(1) as f32, height.max(1) as f32);
        if self.viewport != viewport {
            self.viewport = viewport;
            self.aspect = viewport.x / viewport.y;
            self.invalidate();
        }
    }

    #[must_use]
    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    /// Projection blend in `[0, 1]`, 0 being orthographic.
    #[must_use]
    pub fn mode(&self) -> f32 {
        self.mode
    }

    /// Sets the projection blend.
    ///
    /// Leaving or reaching a pure projection synchronizes the other projection's
    /// parameters, so the on-screen scale of the center plane does not jump.
    pub fn set_mode(&mut self, mode: f32) {
        let mode = mode.clamp(ORTHOGRAPHIC, PERSPECTIVE);
        if self.mode == mode {
            return;
        }
        let previous = self.mode;
        if previous == PERSPECTIVE || mode == ORTHOGRAPHIC {
            self.sync_orthographic_zoom();
        }
        if previous == ORTHOGRAPHIC || mode == PERSPECTIVE {
            self.sync_perspective_distance();
        }
        self.mode = mode;
        self.invalidate();
    }

    fn fovy_atan(&self) -> f32 {
        self.fovy.to_radians().atan().abs()
    }

    fn distance(&self) -> f32 {
        self.eye.distance(self.center)
    }

    // Zoom showing the center plane at the size the perspective projection shows it.
    fn sync_orthographic_zoom(&mut self) {
        let visible_height = self.fovy_atan() * self.distance();
        if visible_height > f32::EPSILON {
            self.zoom = self.frustum_height / visible_height;
        }
    }

    // Moves the eye along the view ray to match the current orthographic zoom.
    fn sync_perspective_distance(&mut self) {
        let distance = self.distance();
        if distance <= f32::EPSILON {
            return;
        }
        let new_distance = (self.frustum_height / self.zoom) / self.fovy_atan();
        self.eye = self.center + (self.eye - self.center) * (new_distance / distance);
    }

    /// Returns the view matrix.
    #[must_use]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.center, self.up)
    }

    #[must_use]
    pub fn orthographic_projection(&self) -> Mat4 {
        let half_height = 0.5 * self.frustum_height / self.zoom;
        let half_width = half_height * self.aspect;
        Mat4::orthographic_rh(
            -half_width,
            half_width,
            -half_height,
            half_height,
            self.near,
            self.far,
        )
    }

    #[must_use]
    pub fn perspective_projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy.to_radians(), self.aspect, self.near, self.far)
    }

    /// Returns the (cached) projection matrix, blended component-wise for fractional modes.
    #[must_use]
    pub fn projection(&self) -> Mat4 {
        if let Some(projection) = self.projection.get() {
            return projection;
        }
        let projection = if self.mode <= ORTHOGRAPHIC {
            self.orthographic_projection()
        } else if self.mode >= PERSPECTIVE {
            self.perspective_projection()
        } else {
            let ortho = self.orthographic_projection();
            let persp = self.perspective_projection();
            let t = self.mode;
            Mat4::from_cols(
                ortho.x_axis.lerp(persp.x_axis, t),
                ortho.y_axis.lerp(persp.y_axis, t),
                ortho.z_axis.lerp(persp.z_axis, t),
                ortho.w_axis.lerp(persp.w_axis, t),
            )
        };
        self.projection.set(Some(projection));
        projection
    }

    /// Returns the combined view-projection matrix.
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    #[must_use]
    pub fn view_projection_inverse(&self) -> Mat4 {
        self.view_projection().inverse()
    }

    /// Whether the camera changed since the last [`Camera::reset_altered`].
    #[must_use]
    pub fn altered(&self) -> bool {
        self.altered
    }

    pub fn reset_altered(&mut self) {
        self.altered = false;
    }

    /// Maps a point from normalized device coordinates (depth in `[0, 1]`) to world space.
    #[must_use]
    pub fn unproject(&self, ndc: Vec3) -> Vec3 {
        let world = self.view_projection_inverse() * Vec4::new(ndc.x, ndc.y, ndc.z, 1.0);
        world.truncate() / world.w
    }

    /// Returns the world-space ray through a point in normalized device coordinates.
    ///
    /// The origin lies on the near plane, so the ray works for every projection blend.
    #[must_use]
    pub fn ray_through(&self, ndc: Vec2) -> (Vec3, Vec3) {
        let near = self.unproject(ndc.extend(0.0));
        let far = self.unproject(ndc.extend(1.0));
        (near, (far - near).normalize_or_zero())
    }

    /// Converts a viewport pixel (top-left origin) into normalized device coordinates.
    #[must_use]
    pub fn pixel_to_ndc(&self, pixel: Vec2) -> Vec2 {
        Vec2::new(
            pixel.x / self.viewport.x * 2.0 - 1.0,
            1.0 - pixel.y / self.viewport.y * 2.0,
        )
    }

    /// Returns the camera's forward direction.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        (self.center - self.eye).normalize_or_zero()
    }

    /// Returns the camera's right direction.
    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize_or_zero()
    }

    /// Orbits the eye around the center (turntable around the up axis).
    pub fn orbit(&mut self, delta_x: f32, delta_y: f32) {
        let offset = self.eye - self.center;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        theta -= delta_x;
        phi = (phi - delta_y).clamp(0.01, std::f32::consts::PI - 0.01);

        self.set_eye(
            self.center
                + Vec3::new(
                    radius * phi.sin() * theta.sin(),
                    radius * phi.cos(),
                    radius * phi.sin() * theta.cos(),
                ),
        );
    }

    /// Pans eye and center along the view plane.
    pub fn pan(&mut self, delta_x: f32, delta_y: f32) {
        let right = self.right();
        let up = right.cross(self.forward()).normalize_or_zero();
        let offset = right * delta_x + up * delta_y;
        self.eye += offset;
        self.center += offset;
        self.invalidate();
    }

    /// Wheel zoom. Positive offsets zoom in.
    ///
    /// Orthographic blends scale the zoom factor; otherwise the eye moves toward the
    /// center, and moves that would reach or pass the center are rejected.
    pub fn wheel_zoom(&mut self, offset: f32) {
        let factor = 1.0 - offset * 0.1;
        if self.mode <= ORTHOGRAPHIC {
            if factor > 0.0 {
                self.set_zoom(self.zoom / factor);
            }
            return;
        }
        if factor <= 0.0 {
            return;
        }
        let distance = self.distance();
        let new_distance = distance * factor;
        if new_distance <= self.near {
            return;
        }
        self.set_eye(self.center + (self.eye - self.center) * (new_distance / distance));
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(&CameraConfig::default())
    }
}
