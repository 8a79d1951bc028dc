use audio_system::{SoundCategory, SoundHandle};
use bevy_ecs::prelude::*;
use std::fmt;

use crate::events::{LifecycleChannels, SoundChannels};

/// A component that plays a sound while attached to an entity.
pub trait SoundComponent: Component + Copy + fmt::Debug {
    const CATEGORY: SoundCategory;

    fn sound(&self) -> SoundHandle;
    fn volume(&self) -> f32;
    fn looping(&self) -> bool;

    /// The attach/detach channels for this component kind.
    fn channels(all: &LifecycleChannels) -> &SoundChannels<Self>;
}

macro_rules! sound_component {
    ($(#[$meta:meta])* $name:ident, $category:ident, $field:ident) => {
        $(#[$meta])*
        #[derive(Component, Debug, Clone, Copy, PartialEq)]
        pub struct $name {
            pub sound: SoundHandle,
            pub volume: f32,
            pub looping: bool,
        }

        impl $name {
            /// Full volume, plays once.
            pub fn new(name: &str) -> Self {
                Self {
                    sound: SoundHandle::from_name(name),
                    volume: 1.0,
                    looping: false,
                }
            }

            pub fn with_volume(mut self, volume: f32) -> Self {
                self.volume = volume;
                self
            }

            pub fn with_looping(mut self, looping: bool) -> Self {
                self.looping = looping;
                self
            }
        }

        impl SoundComponent for $name {
            const CATEGORY: SoundCategory = SoundCategory::$category;

            fn sound(&self) -> SoundHandle {
                self.sound
            }
            fn volume(&self) -> f32 {
                self.volume
            }
            fn looping(&self) -> bool {
                self.looping
            }
            fn channels(all: &LifecycleChannels) -> &SoundChannels<Self> {
                &all.$field
            }
        }
    };
}

sound_component!(
    /// Background music.
    MusicSource, Music, music
);
sound_component!(
    /// One-shot sound effect.
    EffectSound, Effect, effect
);
sound_component!(
    /// Environmental bed, usually looping.
    AmbientSound, Ambient, ambient
);
sound_component!(VoiceLine, Voice, voice);
