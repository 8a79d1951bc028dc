//! bevy_ecs adapter. Observers forward component add/remove to the
//! lifecycle channels; finished sounds remove their component again.

use audio_system::{EntityId, SoundCategory};
use bevy_ecs::prelude::*;
use std::sync::Arc;
use tracing::debug;

use crate::components::{AmbientSound, EffectSound, MusicSource, SoundComponent, VoiceLine};
use crate::events::{LifecycleChannels, SoundFinished};

/// Observer entities spawned by `install_observers`.
#[derive(Debug, Default)]
pub struct SoundObservers {
    observers: Vec<Entity>,
}

impl SoundObservers {
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[derive(Resource, Clone)]
pub struct AudioChannelsRes(pub Arc<LifecycleChannels>);

pub fn entity_id(entity: Entity) -> EntityId {
    EntityId(entity.to_bits())
}

/// Forward `OnAdd`/`OnRemove` of every sound component to `channels`.
///
/// Inserting a component over one the entity already has fires neither
/// hook, so the old sound keeps playing. To switch tracks, remove the
/// component and insert the new one in a later frame: a detach and
/// re-attach of the same kind drained together cancels both.
pub fn install_observers(world: &mut World, channels: Arc<LifecycleChannels>) -> SoundObservers {
    let mut set = SoundObservers::default();
    observe::<MusicSource>(world, &channels, &mut set);
    observe::<EffectSound>(world, &channels, &mut set);
    observe::<AmbientSound>(world, &channels, &mut set);
    observe::<VoiceLine>(world, &channels, &mut set);
    world.insert_resource(AudioChannelsRes(channels));
    debug!(observers = set.len(), "sound observers installed");
    set
}

fn observe<C: SoundComponent>(
    world: &mut World,
    channels: &Arc<LifecycleChannels>,
    set: &mut SoundObservers,
) {
    let on_add = channels.clone();
    let added = world
        .add_observer(move |trigger: Trigger<OnAdd, C>, query: Query<&C>| {
            let entity = trigger.target();
            if let Ok(component) = query.get(entity) {
                on_add.attach(entity_id(entity), *component);
            }
        })
        .id();

    let on_remove = channels.clone();
    let removed = world
        .add_observer(move |trigger: Trigger<OnRemove, C>| {
            on_remove.detach::<C>(entity_id(trigger.target()));
        })
        .id();

    set.observers.extend([added, removed]);
}

/// Despawn the observers; later component changes are no longer forwarded.
pub fn uninstall_observers(world: &mut World, set: SoundObservers) {
    for observer in set.observers {
        world.despawn(observer);
    }
    world.remove_resource::<AudioChannelsRes>();
}

/// Remove the sound component of every entity whose sound finished.
/// Entities that no longer exist are skipped. Returns how many components
/// were removed.
pub fn remove_finished_sounds(world: &mut World, finished: &[SoundFinished]) -> usize {
    let mut removed = 0;
    for f in finished {
        let Ok(entity) = Entity::try_from_bits(f.entity.0) else {
            continue;
        };
        let Ok(mut entity_mut) = world.get_entity_mut(entity) else {
            continue;
        };
        let had = match f.category {
            SoundCategory::Music => entity_mut.take::<MusicSource>().is_some(),
            SoundCategory::Effect => entity_mut.take::<EffectSound>().is_some(),
            SoundCategory::Ambient => entity_mut.take::<AmbientSound>().is_some(),
            SoundCategory::Voice => entity_mut.take::<VoiceLine>().is_some(),
        };
        if had {
            removed += 1;
        }
    }
    removed
}
