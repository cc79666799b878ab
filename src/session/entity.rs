//! Player entity transform

use glam::{Quat, Vec3};

use blockcast_protocol::{EntityData, Quaternion, Xyz};

/// Transform state of one connected player
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: String,
    pub pos: Vec3,
    pub vel: Vec3,
    pub rot: Quat,
}

impl Entity {
    /// Entity at the origin with an all-zero orientation, as clients expect
    /// before their first position report
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pos: Vec3::ZERO,
            vel: Vec3::ZERO,
            rot: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
        }
    }

    pub fn set_transform(&mut self, pos: Xyz<f32>, vel: Xyz<f32>, rot: Quaternion) {
        self.pos = Vec3::new(pos.x, pos.y, pos.z);
        self.vel = Vec3::new(vel.x, vel.y, vel.z);
        self.rot = Quat::from_xyzw(rot.x, rot.y, rot.z, rot.w);
    }

    /// Wire form
    pub fn to_data(&self) -> EntityData {
        EntityData {
            id: self.id.clone(),
            pos: Xyz::new(self.pos.x, self.pos.y, self.pos.z),
            vel: Xyz::new(self.vel.x, self.vel.y, self.vel.z),
            rot: Quaternion {
                x: self.rot.x,
                y: self.rot.y,
                z: self.rot.z,
                w: self.rot.w,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_zeroed() {
        let data = Entity::new("user1").to_data();
        assert_eq!(data.id, "user1");
        assert_eq!(data.pos, Xyz::new(0.0, 0.0, 0.0));
        assert_eq!(data.rot, Quaternion::default());
    }

    #[test]
    fn test_set_transform_round_trips_to_wire() {
        let mut entity = Entity::new("user2");
        let rot = Quaternion { x: 0.0, y: 0.7071, z: 0.0, w: 0.7071 };
        entity.set_transform(Xyz::new(1.0, 2.5, -3.0), Xyz::new(0.0, -9.8, 0.0), rot);

        let data = entity.to_data();
        assert_eq!(data.pos, Xyz::new(1.0, 2.5, -3.0));
        assert_eq!(data.vel, Xyz::new(0.0, -9.8, 0.0));
        assert_eq!(data.rot, rot);
    }
}
