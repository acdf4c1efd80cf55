// Camera - view and projection bookkeeping
//
// Two modes: a look-at camera for inspecting a model from the outside and a
// first-person camera driven by held movement keys. Angles are in degrees.

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    LookAt,
    FirstPerson,
}

/// Held-key state for first-person movement
#[derive(Debug, Default, Clone, Copy)]
pub struct CameraKeys {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

pub struct Camera {
    pub mode: CameraMode,
    pub keys: CameraKeys,
    pub movement_speed: f32,
    pub rotation_speed: f32,

    position: Vec3,
    rotation: Vec3,

    fov: f32,
    znear: f32,
    zfar: f32,

    perspective: Mat4,
    view: Mat4,
}

impl Camera {
    pub fn new(mode: CameraMode) -> Self {
        Self {
            mode,
            keys: CameraKeys::default(),
            movement_speed: 1.0,
            rotation_speed: 1.0,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            fov: 60.0,
            znear: 0.1,
            zfar: 256.0,
            perspective: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn perspective(&self) -> Mat4 {
        self.perspective
    }

    /// True while any movement key is held
    pub fn moving(&self) -> bool {
        self.keys.left || self.keys.right || self.keys.up || self.keys.down
    }

    /// Set the projection. Vulkan clip space has an inverted Y and a 0..1
    /// depth range, so the Y axis is flipped here once instead of per frame.
    pub fn set_perspective(&mut self, fov: f32, aspect: f32, znear: f32, zfar: f32) {
        self.fov = fov;
        self.znear = znear;
        self.zfar = zfar;
        self.perspective = Mat4::perspective_rh(fov.to_radians(), aspect, znear, zfar);
        self.perspective.y_axis.y *= -1.0;
    }

    pub fn update_aspect_ratio(&mut self, aspect: f32) {
        self.perspective =
            Mat4::perspective_rh(self.fov.to_radians(), aspect, self.znear, self.zfar);
        self.perspective.y_axis.y *= -1.0;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_view_matrix();
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
        self.update_view_matrix();
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
        self.update_view_matrix();
    }

    pub fn rotate(&mut self, delta: Vec3) {
        self.rotation += delta;
        self.update_view_matrix();
    }

    /// Advance first-person movement by `delta_time` seconds and rebuild the
    /// view matrix.
    pub fn update(&mut self, delta_time: f32) {
        if self.mode == CameraMode::FirstPerson && self.moving() {
            let front = self.front();
            let move_speed = delta_time * self.movement_speed;

            if self.keys.up {
                self.position += front * move_speed;
            }
            if self.keys.down {
                self.position -= front * move_speed;
            }
            if self.keys.left {
                self.position -= front.cross(Vec3::Y).normalize() * move_speed;
            }
            if self.keys.right {
                self.position += front.cross(Vec3::Y).normalize() * move_speed;
            }
        }
        self.update_view_matrix();
    }

    /// View direction derived from the pitch/yaw angles
    fn front(&self) -> Vec3 {
        let pitch = self.rotation.x.to_radians();
        let yaw = self.rotation.y.to_radians();
        Vec3::new(
            -pitch.cos() * yaw.sin(),
            pitch.sin(),
            pitch.cos() * yaw.cos(),
        )
        .normalize()
    }

    fn update_view_matrix(&mut self) {
        let rotation = Mat4::from_rotation_x(self.rotation.x.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_z(self.rotation.z.to_radians());
        let translation = Mat4::from_translation(self.position);

        // First person rotates around the camera, look-at around the model
        self.view = match self.mode {
            CameraMode::FirstPerson => rotation * translation,
            CameraMode::LookAt => translation * rotation,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn moving_tracks_held_keys() {
        let mut camera = Camera::new(CameraMode::FirstPerson);
        assert!(!camera.moving());
        camera.keys.up = true;
        assert!(camera.moving());
        camera.keys.up = false;
        camera.keys.left = true;
        assert!(camera.moving());
    }

    #[test]
    fn first_person_moves_along_view_direction() {
        let mut camera = Camera::new(CameraMode::FirstPerson);
        camera.movement_speed = 2.0;
        camera.keys.up = true;
        camera.update(0.5);
        // Zero rotation looks down +Z
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), EPS));

        camera.keys.up = false;
        camera.keys.right = true;
        camera.update(0.5);
        // Strafing is perpendicular to the view direction
        assert!(camera.position().abs_diff_eq(Vec3::new(-1.0, 0.0, 1.0), EPS));
    }

    #[test]
    fn look_at_ignores_movement_keys() {
        let mut camera = Camera::new(CameraMode::LookAt);
        camera.keys.up = true;
        camera.update(1.0);
        assert!(camera.position().abs_diff_eq(Vec3::ZERO, EPS));
    }

    #[test]
    fn view_composition_differs_by_mode() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let rotation = Vec3::new(0.0, 90.0, 0.0);

        let mut look_at = Camera::new(CameraMode::LookAt);
        look_at.set_position(position);
        look_at.set_rotation(rotation);

        let mut first_person = Camera::new(CameraMode::FirstPerson);
        first_person.set_position(position);
        first_person.set_rotation(rotation);

        assert!(!look_at.view().abs_diff_eq(first_person.view(), EPS));
        // The look-at composition keeps the raw translation in the last column
        assert!(look_at.view().w_axis.truncate().abs_diff_eq(position, EPS));
    }

    #[test]
    fn perspective_flips_y_for_vulkan() {
        let mut camera = Camera::new(CameraMode::LookAt);
        camera.set_perspective(60.0, 16.0 / 9.0, 0.1, 256.0);
        assert!(camera.perspective().y_axis.y < 0.0);
    }

    #[test]
    fn aspect_ratio_update_rescales_x() {
        let mut camera = Camera::new(CameraMode::LookAt);
        camera.set_perspective(60.0, 1.0, 0.1, 256.0);
        let x_scale = camera.perspective().x_axis.x;
        camera.update_aspect_ratio(2.0);
        assert!((camera.perspective().x_axis.x - x_scale / 2.0).abs() < EPS);
        // Aspect changes leave the Y scale alone
        assert!((camera.perspective().y_axis.y + x_scale).abs() < EPS);
    }

    #[test]
    fn rotate_accumulates() {
        let mut camera = Camera::new(CameraMode::FirstPerson);
        camera.rotate(Vec3::new(10.0, 20.0, 0.0));
        camera.rotate(Vec3::new(-5.0, 10.0, 0.0));
        assert!(camera.rotation().abs_diff_eq(Vec3::new(5.0, 30.0, 0.0), EPS));
    }
}
