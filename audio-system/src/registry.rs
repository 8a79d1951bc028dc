use asset_manager::SoundHandle;

use crate::category::SoundCategory;
use crate::config::clamp_volume;
use crate::messages::{ActivationRequest, EntityId};

/// One playing sound, owned by the mixer thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackInstance {
    pub entity: EntityId,
    pub category: SoundCategory,
    pub sound: SoundHandle,
    pub volume: f32,
    pub looping: bool,
    /// Index of the next frame to mix. Counted in frames so a payload
    /// swapped for one with a different frame size stays addressable.
    pub frame: usize,
}

impl PlaybackInstance {
    pub fn from_request(req: &ActivationRequest) -> Self {
        Self {
            entity: req.entity,
            category: req.category,
            sound: req.sound,
            volume: clamp_volume(req.volume),
            looping: req.looping,
            frame: 0,
        }
    }
}

/// Active instances grouped by category.
///
/// Every bucket is allocated at construction and never grows, so inserting
/// and removing never touch the allocator.
#[derive(Debug)]
pub struct PlaybackRegistry {
    buckets: [Vec<PlaybackInstance>; SoundCategory::COUNT],
    per_category: usize,
}

impl PlaybackRegistry {
    pub fn with_capacity(per_category: usize) -> Self {
        Self {
            buckets: std::array::from_fn(|_| Vec::with_capacity(per_category)),
            per_category,
        }
    }

    pub fn capacity_per_category(&self) -> usize {
        self.per_category
    }

    /// Returns false, leaving the registry unchanged, when the category is full.
    pub fn insert(&mut self, req: &ActivationRequest) -> bool {
        let bucket = &mut self.buckets[req.category.index()];
        if bucket.len() >= self.per_category {
            return false;
        }
        bucket.push(PlaybackInstance::from_request(req));
        true
    }

    /// Remove every instance of `entity` in `category`. Returns how many were removed.
    pub fn remove(&mut self, entity: EntityId, category: SoundCategory) -> usize {
        let bucket = &mut self.buckets[category.index()];
        let before = bucket.len();
        bucket.retain(|inst| inst.entity != entity);
        before - bucket.len()
    }

    pub fn contains(&self, entity: EntityId, category: SoundCategory) -> bool {
        self.buckets[category.index()]
            .iter()
            .any(|inst| inst.entity == entity)
    }

    pub fn bucket(&self, category: SoundCategory) -> &[PlaybackInstance] {
        &self.buckets[category.index()]
    }

    pub(crate) fn bucket_mut(&mut self, category: SoundCategory) -> &mut Vec<PlaybackInstance> {
        &mut self.buckets[category.index()]
    }

    pub fn len_in(&self, category: SoundCategory) -> usize {
        self.buckets[category.index()].len()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }
}
