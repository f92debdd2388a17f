use serde::{Deserialize, Serialize};

/// Position as `[x, y, z]`.
pub type Vec3 = [f64; 3];

/// Orientation quaternion as `[x, y, z, w]`. Stored exactly as received.
pub type Quat = [f64; 4];

/// Position + orientation of a participant's avatar.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    /// Spawn pose every participant starts with.
    pub const SPAWN: Pose = Pose {
        position: [0.0, 0.5, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::SPAWN
    }
}

/// Best-effort pose from a `move` event. `None` components keep the value
/// already stored, so a short or partly non-numeric payload still lands.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseUpdate {
    pub position: [Option<f64>; 3],
    pub rotation: [Option<f64>; 4],
}

impl PoseUpdate {
    pub fn full(pose: Pose) -> Self {
        Self {
            position: pose.position.map(Some),
            rotation: pose.rotation.map(Some),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.iter().chain(&self.rotation).all(Option::is_none)
    }

    pub fn apply(&self, base: Pose) -> Pose {
        let mut pose = base;
        for (slot, given) in pose.position.iter_mut().zip(self.position) {
            if let Some(v) = given {
                *slot = v;
            }
        }
        for (slot, given) in pose.rotation.iter_mut().zip(self.rotation) {
            if let Some(v) = given {
                *slot = v;
            }
        }
        pose
    }
}
