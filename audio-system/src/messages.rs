//! Plain-data records exchanged between the control thread and the mixer,
//! one hand-off queue per record kind.

use asset_manager::SoundHandle;
use crossbeam::queue::{ArrayQueue, SegQueue};
use std::fmt;

use crate::category::SoundCategory;

/// Identifier of the entity that owns a playing sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

/// Start one playback instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationRequest {
    pub entity: EntityId,
    pub category: SoundCategory,
    pub sound: SoundHandle,
    pub volume: f32,
    pub looping: bool,
}

/// Stop every instance of `entity` in `category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemovalRequest {
    pub entity: EntityId,
    pub category: SoundCategory,
}

/// A non-looping instance played its last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionReport {
    pub entity: EntityId,
    pub category: SoundCategory,
    pub sound: SoundHandle,
}

/// Control → mixer queues are unbounded so the producer never waits; the
/// mixer → control queue is bounded and allocated up front.
pub(crate) struct HandoffQueues {
    pub activations: SegQueue<ActivationRequest>,
    pub removals: SegQueue<RemovalRequest>,
    pub completions: ArrayQueue<CompletionReport>,
}

impl HandoffQueues {
    pub fn new(completion_capacity: usize) -> Self {
        Self {
            activations: SegQueue::new(),
            removals: SegQueue::new(),
            completions: ArrayQueue::new(completion_capacity),
        }
    }
}
