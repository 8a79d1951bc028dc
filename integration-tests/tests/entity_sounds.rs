use asset_manager::{BankWriter, PcmFormat};
use audio_backend::MockAudioBackend;
use audio_system::{create, AudioConfig, SoundCategory};
use bevy_ecs::prelude::*;
use engine_audio::{
    entity_id, install_observers, remove_finished_sounds, AmbientSound, AudioBridge, EffectSound,
    LifecycleChannels, MusicSource, SoundFinished,
};
use integration_tests::pcm16;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

#[test]
fn entity_lifecycle_drives_playback_through_the_mock_device() {
    let dir = tempdir().unwrap();
    let bank = dir.path().join("level.bank");
    let mut w = BankWriter::new();
    w.add_sound("music/theme", PcmFormat::new(1, 16, 44_100), pcm16(&[100; 16]));
    w.add_sound("ambient/wind", PcmFormat::new(1, 16, 44_100), pcm16(&[10; 16]));
    w.add_sound("sfx/door", PcmFormat::new(1, 16, 44_100), pcm16(&[1000, 1000, 1000]));
    w.write_to_path(&bank).unwrap();

    let mut config = AudioConfig::default();
    config.output.channels = 1;
    config.output.frames_per_buffer = 4;
    let (mut system, mixer) = create(config.clone()).unwrap();
    let backend = MockAudioBackend::with_spec(config.output.stream_spec());
    let driver = backend.driver();
    system.start(Box::new(backend), mixer).unwrap();
    system.register_bank(&bank);

    let mut world = World::new();
    let channels = Arc::new(LifecycleChannels::new());
    let _observers = install_observers(&mut world, channels.clone());
    let mut bridge = AudioBridge::new(channels, system.request_sink(), &config.bridge);
    let finished = Arc::new(Mutex::new(Vec::new()));
    let seen = finished.clone();
    bridge.on_finished(move |f: &SoundFinished| seen.lock().unwrap().push(*f));

    let player = world
        .spawn(MusicSource::new("theme").with_looping(true))
        .id();
    let wind = world
        .spawn(AmbientSound::new("wind").with_looping(true))
        .id();
    let door = world.spawn(EffectSound::new("door")).id();
    let report = bridge.update(&mut system, 0.016);
    assert_eq!(report.loaded, 3);
    assert_eq!(report.forwarded, 3);

    assert_eq!(driver.render_blocks(1).unwrap(), vec![1110, 1110, 1110, 110]);

    // the door ran out inside that block
    let report = bridge.update(&mut system, 0.016);
    let done: Vec<SoundFinished> = report.completions.into_iter().map(SoundFinished::from).collect();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].entity, entity_id(door));
    assert_eq!(done[0].category, SoundCategory::Effect);
    assert_eq!(finished.lock().unwrap().len(), 1);
    assert_eq!(remove_finished_sounds(&mut world, &done), 1);
    assert!(world.get::<EffectSound>(door).is_none());

    // removing ambient cancels it on the next frame
    world.entity_mut(wind).remove::<AmbientSound>();
    bridge.update(&mut system, 0.016);
    assert_eq!(driver.render_blocks(1).unwrap(), vec![100; 4]);

    world.despawn(player);
    bridge.update(&mut system, 0.016);
    assert_eq!(driver.render_blocks(1).unwrap(), vec![0; 4]);
    assert_eq!(system.stats().active_instances, 0);

    system.stop().unwrap();
}

#[test]
fn effect_detach_does_not_cut_playback() {
    let dir = tempdir().unwrap();
    let bank = dir.path().join("a.bank");
    let mut w = BankWriter::new();
    w.add_sound("shot", PcmFormat::new(1, 16, 44_100), pcm16(&[7; 6]));
    w.write_to_path(&bank).unwrap();

    let mut config = AudioConfig::default();
    config.output.channels = 1;
    config.output.frames_per_buffer = 3;
    let (mut system, mut mixer) = create(config.clone()).unwrap();
    system.register_bank(&bank);

    let mut world = World::new();
    let channels = Arc::new(LifecycleChannels::new());
    let _observers = install_observers(&mut world, channels.clone());
    let bridge = AudioBridge::new(channels, system.request_sink(), &config.bridge);

    let shooter = world.spawn(EffectSound::new("shot")).id();
    bridge.update(&mut system, 0.0);
    let mut out = [0i16; 3];
    mixer.render(&mut out);
    world.despawn(shooter);
    bridge.update(&mut system, 0.0);
    mixer.render(&mut out);
    assert_eq!(out, [7; 3]);
    assert_eq!(bridge.update(&mut system, 0.0).completions.len(), 1);

    // the entity is gone; nothing to remove
    let finished = [SoundFinished {
        entity: entity_id(shooter),
        category: SoundCategory::Effect,
        sound: audio_system::SoundHandle::from_name("shot"),
    }];
    assert_eq!(remove_finished_sounds(&mut world, &finished), 0);
}
