//! Entity-sound bridge: turns component attach/detach events into playback
//! requests and completion reports into `SoundFinished` events.

use audio_system::{
    ActivationRequest, AudioSystem, BridgeConfig, RequestSink, SoundHandle, TickReport,
};
use event_bus::SubscriptionId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::components::{AmbientSound, EffectSound, MusicSource, SoundComponent, VoiceLine};
use crate::events::{ComponentAttached, ComponentDetached, LifecycleChannels, Slot, SoundFinished};

pub struct AudioBridge {
    channels: Arc<LifecycleChannels>,
    subscriptions: Vec<(Slot, SubscriptionId)>,
    // sounds already queued for loading
    requested: Arc<Mutex<HashSet<SoundHandle>>>,
}

impl AudioBridge {
    /// Subscribe to every sound component kind. Detach events are only
    /// subscribed for the categories `config` marks as cancellable; other
    /// categories play to completion.
    pub fn new(channels: Arc<LifecycleChannels>, sink: RequestSink, config: &BridgeConfig) -> Self {
        let mut bridge = Self {
            channels,
            subscriptions: Vec::new(),
            requested: Arc::new(Mutex::new(HashSet::new())),
        };
        bridge.wire::<MusicSource>(&sink, config);
        bridge.wire::<EffectSound>(&sink, config);
        bridge.wire::<AmbientSound>(&sink, config);
        bridge.wire::<VoiceLine>(&sink, config);
        debug!(subscriptions = bridge.subscriptions.len(), "audio bridge wired");
        bridge
    }

    fn wire<C: SoundComponent>(&mut self, sink: &RequestSink, config: &BridgeConfig) {
        let channels = self.channels.of::<C>();
        let category = C::CATEGORY;

        let play_sink = sink.clone();
        let requested = self.requested.clone();
        let id = channels.attached.subscribe(move |ev: &ComponentAttached<C>| {
            let sound = ev.component.sound();
            if requested.lock().insert(sound) {
                play_sink.preload(sound);
            }
            trace!(entity = %ev.entity, %category, %sound, "component attached");
            play_sink.play(ActivationRequest {
                entity: ev.entity,
                category,
                sound,
                volume: ev.component.volume(),
                looping: ev.component.looping(),
            });
        });
        self.subscriptions.push((Slot::Attached(category), id));

        if config.cancels_on_detach(category) {
            let stop_sink = sink.clone();
            let id = channels.detached.subscribe(move |ev: &ComponentDetached<C>| {
                trace!(entity = %ev.entity, %category, "component detached");
                stop_sink.stop(ev.entity, category);
            });
            self.subscriptions.push((Slot::Detached(category), id));
        }
    }

    pub fn channels(&self) -> &Arc<LifecycleChannels> {
        &self.channels
    }

    /// Observe finished sounds. The handler runs inside `update`.
    pub fn on_finished<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: Fn(&SoundFinished) + Send + Sync + 'static,
    {
        let id = self.channels.finished.subscribe(handler);
        self.subscriptions.push((Slot::Finished, id));
        id
    }

    /// Number of distinct sounds the bridge has asked to load.
    pub fn requested_sounds(&self) -> usize {
        self.requested.lock().len()
    }

    /// One frame: deliver lifecycle events, tick the audio system, then
    /// publish and deliver a `SoundFinished` for each completion.
    pub fn update(&self, system: &mut AudioSystem, dt: f32) -> TickReport {
        self.channels.drain_lifecycle();
        let report = system.tick(dt);
        for completion in &report.completions {
            self.channels.finished.publish(SoundFinished::from(*completion));
        }
        self.channels.finished.drain();
        report
    }

    pub fn is_active(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Release every subscription. Later events are queued but reach no handler.
    pub fn shutdown(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        for (slot, id) in self.subscriptions.drain(..) {
            self.channels.unsubscribe(slot, id);
        }
        debug!("audio bridge unsubscribed");
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_manager::{BankWriter, PcmFormat};
    use audio_system::{create, AudioConfig, EntityId, Mixer, SoundCategory};
    use std::path::Path;
    use tempfile::tempdir;

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn setup(bank: &Path, frames: usize) -> (AudioSystem, Mixer, AudioBridge) {
        let mut w = BankWriter::new();
        w.add_sound("music/theme", PcmFormat::new(1, 16, 44_100), pcm16(&[100; 64]));
        w.add_sound("sfx/hit", PcmFormat::new(1, 16, 44_100), pcm16(&[7; 3]));
        w.write_to_path(bank).unwrap();

        let mut config = AudioConfig::default();
        config.output.channels = 1;
        config.output.frames_per_buffer = frames;
        let (system, mixer) = create(config.clone()).unwrap();
        system.register_bank(bank);
        let bridge = AudioBridge::new(
            Arc::new(LifecycleChannels::new()),
            system.request_sink(),
            &config.bridge,
        );
        (system, mixer, bridge)
    }

    #[test]
    fn attach_plays_and_detach_cancels_music() {
        let dir = tempdir().unwrap();
        let (mut system, mut mixer, bridge) = setup(&dir.path().join("a.bank"), 4);
        let entity = EntityId(42);

        bridge
            .channels()
            .attach(entity, MusicSource::new("theme").with_looping(true));
        bridge.update(&mut system, 0.016);
        let mut out = [0i16; 4];
        mixer.render(&mut out);
        assert_eq!(out, [100; 4]);

        bridge.channels().detach::<MusicSource>(entity);
        bridge.update(&mut system, 0.016);
        mixer.render(&mut out);
        assert_eq!(out, [0; 4]);
        assert!(mixer.registry().is_empty());
    }

    #[test]
    fn detached_effect_plays_to_completion() {
        let dir = tempdir().unwrap();
        let (mut system, mut mixer, bridge) = setup(&dir.path().join("a.bank"), 4);
        let entity = EntityId(5);
        let finished = Arc::new(Mutex::new(Vec::new()));

        bridge.channels().attach(entity, EffectSound::new("hit"));
        bridge.update(&mut system, 0.0);
        bridge.channels().detach::<EffectSound>(entity);
        bridge.update(&mut system, 0.0);

        let mut out = [0i16; 4];
        mixer.render(&mut out);
        assert_eq!(out, [7, 7, 7, 0]);

        let mut bridge = bridge;
        let seen = finished.clone();
        bridge.on_finished(move |f| seen.lock().push(*f));
        let report = bridge.update(&mut system, 0.0);
        assert_eq!(report.completions.len(), 1);
        assert_eq!(
            *finished.lock(),
            vec![SoundFinished {
                entity,
                category: SoundCategory::Effect,
                sound: SoundHandle::from_name("hit"),
            }]
        );
    }

    #[test]
    fn attach_then_detach_in_one_frame_nets_out() {
        let dir = tempdir().unwrap();
        let (mut system, mut mixer, bridge) = setup(&dir.path().join("a.bank"), 4);
        let entity = EntityId(1);
        bridge
            .channels()
            .attach(entity, AmbientSound::new("theme").with_looping(true));
        bridge.channels().detach::<AmbientSound>(entity);
        bridge.update(&mut system, 0.0);

        let mut out = [0i16; 4];
        mixer.render(&mut out);
        assert_eq!(out, [0; 4]);
        assert!(mixer.registry().is_empty());
    }

    #[test]
    fn detach_then_reattach_in_one_frame_cancels_both() {
        let dir = tempdir().unwrap();
        let (mut system, mut mixer, bridge) = setup(&dir.path().join("a.bank"), 4);
        let entity = EntityId(8);
        let music = MusicSource::new("theme").with_looping(true);
        bridge.channels().attach(entity, music);
        bridge.update(&mut system, 0.0);
        let mut out = [0i16; 4];
        mixer.render(&mut out);
        assert_eq!(out, [100; 4]);

        // the removal is entity-wide and lands after the new activation
        bridge.channels().detach::<MusicSource>(entity);
        bridge.channels().attach(entity, music);
        bridge.update(&mut system, 0.0);
        mixer.render(&mut out);
        assert_eq!(out, [0; 4]);
        assert!(mixer.registry().is_empty());

        // attaching again in a later frame restarts it
        bridge.channels().attach(entity, music);
        bridge.update(&mut system, 0.0);
        mixer.render(&mut out);
        assert_eq!(out, [100; 4]);
    }

    #[test]
    fn load_requests_are_deduplicated() {
        let dir = tempdir().unwrap();
        let (mut system, _mixer, bridge) = setup(&dir.path().join("a.bank"), 4);
        for e in 0..3 {
            bridge.channels().attach(EntityId(e), EffectSound::new("hit"));
        }
        bridge.channels().attach(EntityId(9), VoiceLine::new("theme"));
        let report = bridge.update(&mut system, 0.0);
        assert_eq!(bridge.requested_sounds(), 2);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.forwarded, 4);
    }

    #[test]
    fn shutdown_releases_every_subscription() {
        let dir = tempdir().unwrap();
        let (mut system, mut mixer, mut bridge) = setup(&dir.path().join("a.bank"), 4);
        let channels = bridge.channels().clone();
        assert_eq!(channels.music.attached.subscriber_count(), 1);
        assert_eq!(channels.music.detached.subscriber_count(), 1);
        assert_eq!(channels.effect.detached.subscriber_count(), 0);

        bridge.shutdown();
        assert!(!bridge.is_active());
        assert_eq!(channels.music.attached.subscriber_count(), 0);
        assert_eq!(channels.voice.attached.subscriber_count(), 0);

        channels.attach(EntityId(1), EffectSound::new("hit"));
        bridge.update(&mut system, 0.0);
        let mut out = [0i16; 4];
        mixer.render(&mut out);
        assert!(mixer.registry().is_empty());

        drop(bridge);
        assert_eq!(channels.ambient.detached.subscriber_count(), 0);
    }
}
