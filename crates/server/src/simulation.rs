use glam::{Vec2, Vec3};

use salvo::Identifier;
use salvo::net::{InputButtons, MessageBody};

const WALK_SPEED: f32 = 5.0;
const JUMP_SPEED: f32 = 6.0;
const GRAVITY: f32 = 9.8;
const GROUND_HEIGHT: f32 = 1.0;

pub const SPAWN_POSITION: Vec3 = Vec3::new(0.0, GROUND_HEIGHT, 0.0);

/// Server-authoritative player body. Only the trivial motion needed to give
/// Update messages something to carry.
#[derive(Debug, Clone)]
pub struct Avatar {
    pub entity: Identifier,
    pub position: Vec3,
    pub velocity: Vec3,
    pub heading: f32,
    pub dirty: bool,
}

impl Avatar {
    pub fn spawn(entity: Identifier) -> Self {
        Self {
            entity,
            position: SPAWN_POSITION,
            velocity: Vec3::ZERO,
            heading: 0.0,
            dirty: true,
        }
    }

    fn on_ground(&self) -> bool {
        self.position.y <= GROUND_HEIGHT
    }

    /// `aim.x` is the yaw in radians; heading 0 faces -Z.
    pub fn apply_input(&mut self, buttons: InputButtons, aim: Vec2) {
        self.heading = aim.x;

        let axis = buttons.move_axis();
        let (sin_yaw, cos_yaw) = self.heading.sin_cos();
        let forward = Vec3::new(-sin_yaw, 0.0, -cos_yaw);
        let right = Vec3::new(cos_yaw, 0.0, -sin_yaw);
        let planar = (right * axis.x + forward * axis.y) * WALK_SPEED;

        self.velocity.x = planar.x;
        self.velocity.z = planar.z;
        if buttons.contains(InputButtons::JUMP) && self.on_ground() {
            self.velocity.y = JUMP_SPEED;
        }
        self.dirty = true;
    }

    pub fn integrate(&mut self, dt: f32) {
        if !self.on_ground() || self.velocity.y > 0.0 {
            self.velocity.y -= GRAVITY * dt;
        }
        self.position += self.velocity * dt;

        if self.position.y < GROUND_HEIGHT {
            self.position.y = GROUND_HEIGHT;
            self.velocity.y = 0.0;
        }
        if self.velocity != Vec3::ZERO {
            self.dirty = true;
        }
    }

    pub fn update_message(&self) -> MessageBody {
        MessageBody::Update {
            entity: self.entity,
            position: self.position,
            velocity: self.velocity,
            heading: self.heading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn avatar() -> Avatar {
        let mut avatar = Avatar::spawn(Identifier::new(1, 0));
        avatar.dirty = false;
        avatar
    }

    #[test]
    fn test_forward_moves_along_heading() {
        let mut avatar = avatar();
        avatar.apply_input(InputButtons::FORWARD, Vec2::ZERO);
        avatar.integrate(DT);

        assert!(avatar.position.z < 0.0);
        assert!(avatar.position.x.abs() < 1e-5);
        assert!(avatar.dirty);
    }

    #[test]
    fn test_strafe_follows_yaw() {
        let mut avatar = avatar();
        avatar.apply_input(InputButtons::RIGHT, Vec2::new(std::f32::consts::FRAC_PI_2, 0.0));
        avatar.integrate(DT);

        assert!(avatar.position.z < 0.0);
        assert!((avatar.heading - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_jump_lands_back_on_ground() {
        let mut avatar = avatar();
        avatar.apply_input(InputButtons::JUMP, Vec2::ZERO);
        avatar.integrate(DT);
        assert!(avatar.position.y > GROUND_HEIGHT);

        avatar.apply_input(InputButtons::JUMP, Vec2::ZERO);
        let airborne_velocity = avatar.velocity.y;
        assert!(airborne_velocity < JUMP_SPEED);

        for _ in 0..120 {
            avatar.integrate(DT);
        }
        assert_eq!(avatar.position.y, GROUND_HEIGHT);
        assert_eq!(avatar.velocity.y, 0.0);
    }

    #[test]
    fn test_idle_avatar_stays_clean() {
        let mut avatar = avatar();
        avatar.integrate(DT);

        assert_eq!(avatar.position, SPAWN_POSITION);
        assert!(!avatar.dirty);
    }
}
