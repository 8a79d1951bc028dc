//! Typed entity-lifecycle channels, one attach/detach pair per sound
//! component kind, plus the finished-sound channel.

use audio_system::{CompletionReport, EntityId, SoundCategory, SoundHandle};
use event_bus::{EventChannel, SubscriptionId};
use std::marker::PhantomData;

use crate::components::{AmbientSound, EffectSound, MusicSource, SoundComponent, VoiceLine};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentAttached<C> {
    pub entity: EntityId,
    pub component: C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentDetached<C> {
    pub entity: EntityId,
    kind: PhantomData<fn() -> C>,
}

impl<C> ComponentDetached<C> {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            kind: PhantomData,
        }
    }
}

/// A non-looping sound played to its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundFinished {
    pub entity: EntityId,
    pub category: SoundCategory,
    pub sound: SoundHandle,
}

impl From<CompletionReport> for SoundFinished {
    fn from(r: CompletionReport) -> Self {
        Self {
            entity: r.entity,
            category: r.category,
            sound: r.sound,
        }
    }
}

pub struct SoundChannels<C: SoundComponent> {
    pub attached: EventChannel<ComponentAttached<C>>,
    pub detached: EventChannel<ComponentDetached<C>>,
}

impl<C: SoundComponent> Default for SoundChannels<C> {
    fn default() -> Self {
        Self {
            attached: EventChannel::new(),
            detached: EventChannel::new(),
        }
    }
}

impl<C: SoundComponent> SoundChannels<C> {
    fn drain(&self) -> usize {
        // attaches first so an attach/detach pair in one frame nets out
        self.attached.drain() + self.detached.drain()
    }
}

/// Which handler list a subscription id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Attached(SoundCategory),
    Detached(SoundCategory),
    Finished,
}

#[derive(Default)]
pub struct LifecycleChannels {
    pub music: SoundChannels<MusicSource>,
    pub effect: SoundChannels<EffectSound>,
    pub ambient: SoundChannels<AmbientSound>,
    pub voice: SoundChannels<VoiceLine>,
    pub finished: EventChannel<SoundFinished>,
}

impl LifecycleChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of<C: SoundComponent>(&self) -> &SoundChannels<C> {
        C::channels(self)
    }

    /// Announce that `component` was attached to `entity`.
    pub fn attach<C: SoundComponent>(&self, entity: EntityId, component: C) {
        self.of::<C>()
            .attached
            .publish(ComponentAttached { entity, component });
    }

    /// Announce that the `C` component was removed from `entity`.
    pub fn detach<C: SoundComponent>(&self, entity: EntityId) {
        self.of::<C>().detached.publish(ComponentDetached::new(entity));
    }

    /// Deliver pending attach/detach events, category by category in mix
    /// order. Returns how many were delivered.
    pub fn drain_lifecycle(&self) -> usize {
        self.music.drain() + self.effect.drain() + self.ambient.drain() + self.voice.drain()
    }

    pub(crate) fn unsubscribe(&self, slot: Slot, id: SubscriptionId) -> bool {
        match slot {
            Slot::Attached(SoundCategory::Music) => self.music.attached.unsubscribe(id),
            Slot::Attached(SoundCategory::Effect) => self.effect.attached.unsubscribe(id),
            Slot::Attached(SoundCategory::Ambient) => self.ambient.attached.unsubscribe(id),
            Slot::Attached(SoundCategory::Voice) => self.voice.attached.unsubscribe(id),
            Slot::Detached(SoundCategory::Music) => self.music.detached.unsubscribe(id),
            Slot::Detached(SoundCategory::Effect) => self.effect.detached.unsubscribe(id),
            Slot::Detached(SoundCategory::Ambient) => self.ambient.detached.unsubscribe(id),
            Slot::Detached(SoundCategory::Voice) => self.voice.detached.unsubscribe(id),
            Slot::Finished => self.finished.unsubscribe(id),
        }
    }
}
