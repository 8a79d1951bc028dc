//! Entity layer for the audio system: sound components, typed lifecycle
//! channels, the bridge that turns them into playback requests, and a
//! bevy_ecs adapter that feeds the channels from component observers.

pub mod bridge;
pub mod components;
pub mod ecs;
pub mod events;

pub use bridge::AudioBridge;
pub use components::{AmbientSound, EffectSound, MusicSource, SoundComponent, VoiceLine};
pub use ecs::{
    entity_id, install_observers, remove_finished_sounds, uninstall_observers, AudioChannelsRes,
    SoundObservers,
};
pub use events::{ComponentAttached, ComponentDetached, LifecycleChannels, SoundChannels, SoundFinished};
