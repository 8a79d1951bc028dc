// Plays through the system's output device. Compiled only with the
// `real-audio-tests` feature and ignored by default:
//   cargo test -p integration-tests --features real-audio-tests -- --ignored
#[cfg(feature = "real-audio-tests")]
mod real_audio_tests {
    use asset_manager::{BankWriter, PcmFormat};
    use audio_backend::create_audio_backend;
    use audio_system::{create, ActivationRequest, AudioConfig, EntityId, SoundCategory, SoundHandle};
    use serial_test::serial;
    use std::time::Duration;

    fn sine(rate: u32, freq: f32, seconds: f32) -> Vec<u8> {
        let frames = (rate as f32 * seconds) as usize;
        (0..frames)
            .map(|i| {
                let t = i as f32 / rate as f32;
                ((t * freq * std::f32::consts::TAU).sin() * 6000.0) as i16
            })
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    #[test]
    #[ignore]
    #[serial]
    fn plays_a_tone_on_the_default_device() {
        let dir = tempfile::tempdir().unwrap();
        let bank = dir.path().join("tone.bank");
        let config = AudioConfig::default();
        let rate = config.output.sample_rate;
        let mut w = BankWriter::new();
        w.add_sound("tone", PcmFormat::new(1, 16, rate), sine(rate, 440.0, 0.5));
        w.write_to_path(&bank).unwrap();

        let (mut system, mixer) = create(config.clone()).unwrap();
        let backend = create_audio_backend(config.output.stream_spec()).expect("create backend");
        eprintln!(
            "backend sample_rate={} buffer_size={} channels={}",
            backend.sample_rate(),
            backend.buffer_size(),
            backend.channels()
        );
        system.start(backend, mixer).expect("start");
        system.register_bank(&bank);
        system.play(ActivationRequest {
            entity: EntityId(1),
            category: SoundCategory::Effect,
            sound: SoundHandle::from_name("tone"),
            volume: 1.0,
            looping: false,
        });

        let mut done = false;
        for _ in 0..100 {
            if !system.tick(0.02).completions.is_empty() {
                done = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        system.stop().expect("stop");
        assert!(done, "tone never finished");
    }
}
