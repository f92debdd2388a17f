//! Peer Registry: who is connected, where they stand, and what they are called.
//!
//! Pose and name live in one record under one lock, so a peer has both or
//! neither and a snapshot never sees half of a join or leave.

use std::collections::{BTreeMap, HashMap};

use meetspace_core::{ConnectionId, Pose, PoseUpdate, Quat, Vec3};
use parking_lot::RwLock;
use rand::Rng;

#[derive(Clone, Debug, PartialEq)]
struct PeerRecord {
    pose: Pose,
    name: String,
}

/// Point-in-time copy of the whole registry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerSnapshot {
    pub poses: BTreeMap<ConnectionId, Pose>,
    pub names: BTreeMap<ConnectionId, String>,
}

#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<ConnectionId, PeerRecord>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer at the spawn pose with a placeholder name.
    /// Returns `false` (and changes nothing) if the id is already present.
    pub fn register(&self, id: &ConnectionId) -> bool {
        let mut peers = self.peers.write();
        if peers.contains_key(id) {
            return false;
        }
        peers.insert(
            id.clone(),
            PeerRecord {
                pose: Pose::SPAWN,
                name: placeholder_name(),
            },
        );
        true
    }

    /// Overwrite the pose. Orientation is stored as given.
    pub fn set_pose(&self, id: &ConnectionId, position: Vec3, rotation: Quat) -> bool {
        match self.peers.write().get_mut(id) {
            Some(record) => {
                record.pose = Pose::new(position, rotation);
                true
            }
            None => false,
        }
    }

    /// Merge the given components over the stored pose.
    pub fn update_pose(&self, id: &ConnectionId, update: &PoseUpdate) -> bool {
        match self.peers.write().get_mut(id) {
            Some(record) => {
                record.pose = update.apply(record.pose);
                true
            }
            None => false,
        }
    }

    pub fn set_name(&self, id: &ConnectionId, name: impl Into<String>) -> bool {
        match self.peers.write().get_mut(id) {
            Some(record) => {
                record.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Idempotent.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        self.peers.write().remove(id).is_some()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.peers.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    pub fn snapshot_poses(&self) -> BTreeMap<ConnectionId, Pose> {
        self.peers
            .read()
            .iter()
            .map(|(id, r)| (id.clone(), r.pose))
            .collect()
    }

    pub fn snapshot_names(&self) -> BTreeMap<ConnectionId, String> {
        self.peers
            .read()
            .iter()
            .map(|(id, r)| (id.clone(), r.name.clone()))
            .collect()
    }

    /// Poses and names taken under a single read lock.
    pub fn snapshot(&self) -> PeerSnapshot {
        let peers = self.peers.read();
        let mut snapshot = PeerSnapshot::default();
        for (id, record) in peers.iter() {
            snapshot.poses.insert(id.clone(), record.pose);
            snapshot.names.insert(id.clone(), record.name.clone());
        }
        snapshot
    }
}

fn placeholder_name() -> String {
    format!("User{}", rand::thread_rng().gen_range(0..1000))
}
