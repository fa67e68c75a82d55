//! Local replica of every networked trash item.
//!
//! Items enter the replica only when their `TrashSpawned` directive is
//! received and leave when a `TrashCollected` or `TrashDestroyed` directive is
//! received. Removed ids are remembered so a late spawn can never resurrect
//! an item.

use crate::types::{ParticipantId, Role, TrashId, TrashItem, Vec3};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct TrashRegistry {
    items: HashMap<TrashId, TrashItem>,
    removed: HashSet<TrashId>,
    next_local_seq: u32,
}

impl TrashRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh id for an item instantiated by `owner`
    pub fn allocate_id(&mut self, owner: ParticipantId) -> TrashId {
        self.next_local_seq += 1;
        TrashId {
            owner,
            seq: self.next_local_seq,
        }
    }

    /// Returns false if the item is already known or was removed before
    pub fn insert(&mut self, item: TrashItem) -> bool {
        if self.removed.contains(&item.id) || self.items.contains_key(&item.id) {
            return false;
        }
        self.items.insert(item.id, item);
        true
    }

    pub fn remove(&mut self, id: &TrashId) -> Option<TrashItem> {
        self.removed.insert(*id);
        self.items.remove(id)
    }

    pub fn get(&self, id: &TrashId) -> Option<&TrashItem> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of alive items that score for `role`
    pub fn count_alive(&self, role: Role) -> usize {
        self.items
            .values()
            .filter(|item| item.owner_role == role)
            .count()
    }

    /// Ids of items instantiated by `owner`, sorted
    pub fn owned_by(&self, owner: ParticipantId) -> Vec<TrashId> {
        let mut ids: Vec<TrashId> = self
            .items
            .keys()
            .filter(|id| id.owner == owner)
            .copied()
            .collect();
        ids.sort();
        ids
    }

    /// Positions of items within `radius` of `center`
    pub fn positions_near(&self, center: Vec3, radius: f32) -> Vec<Vec3> {
        self.items
            .values()
            .map(|item| item.position)
            .filter(|position| position.distance(&center) <= radius)
            .collect()
    }

    /// Closest item within `max_distance` of `from`
    pub fn nearest_within(&self, from: Vec3, max_distance: f32) -> Option<&TrashItem> {
        self.items
            .values()
            .map(|item| (item.position.distance(&from), item))
            .filter(|(distance, _)| *distance <= max_distance)
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, item)| item)
    }

    pub fn items(&self) -> impl Iterator<Item = &TrashItem> {
        self.items.values()
    }
}
