//! Control-thread facade: owns the sound bank store, forwards playback
//! requests to the mixer and collects completion reports.

use anyhow::{anyhow, Context, Result};
use asset_manager::{
    BankLifecycleManager, Decompressor, SoundBankStore, SoundHandle, Stored, TickSummary,
};
use audio_backend::AudioBackend;
use crossbeam::queue::SegQueue;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::category::SoundCategory;
use crate::config::{clamp_volume, AudioConfig};
use crate::messages::{ActivationRequest, CompletionReport, EntityId, HandoffQueues, RemovalRequest};
use crate::mixer::{Mixer, MixerShared, MixerStats};

// dropped-message counters are logged at most this often
const DIAGNOSTICS_INTERVAL_SECS: f32 = 1.0;

/// Thread-safe entry point for playback requests. Requests are staged and
/// forwarded to the mixer by the next `AudioSystem::tick`, activations only
/// once their sounds are resident.
#[derive(Clone)]
pub struct RequestSink {
    activations: Arc<SegQueue<ActivationRequest>>,
    removals: Arc<SegQueue<RemovalRequest>>,
    preloads: Arc<SegQueue<SoundHandle>>,
}

impl RequestSink {
    fn new() -> Self {
        Self {
            activations: Arc::new(SegQueue::new()),
            removals: Arc::new(SegQueue::new()),
            preloads: Arc::new(SegQueue::new()),
        }
    }

    pub fn play(&self, request: ActivationRequest) {
        self.activations.push(request);
    }

    pub fn stop(&self, entity: EntityId, category: SoundCategory) {
        self.removals.push(RemovalRequest { entity, category });
    }

    /// Make `sound` resident on the next tick without playing it.
    pub fn preload(&self, sound: SoundHandle) {
        self.preloads.push(sound);
    }
}

/// What one `AudioSystem::tick` did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub banks: TickSummary,
    /// Sounds whose payload became resident this tick.
    pub loaded: usize,
    /// Activations handed to the mixer.
    pub forwarded: usize,
    pub completions: Vec<CompletionReport>,
}

pub struct AudioSystem {
    config: AudioConfig,
    store: SoundBankStore,
    banks: Arc<BankLifecycleManager>,
    sink: RequestSink,
    queues: Arc<HandoffQueues>,
    shared: Arc<MixerShared>,
    // reused each tick
    activations: Vec<ActivationRequest>,
    to_load: HashSet<SoundHandle>,
    backend: Option<Box<dyn AudioBackend>>,
    since_diagnostics: f32,
    last_stats: MixerStats,
}

/// Build the two halves: the control facade and the real-time mixer.
/// Payloads are read as stored; see `create_with_codec` for compressed banks.
pub fn create(config: AudioConfig) -> Result<(AudioSystem, Mixer)> {
    create_with_codec(config, Box::new(Stored))
}

/// Like `create`, but payloads are decompressed with `codec` when they
/// become resident.
pub fn create_with_codec(
    config: AudioConfig,
    codec: Box<dyn Decompressor>,
) -> Result<(AudioSystem, Mixer)> {
    config.validate().context("invalid audio configuration")?;

    let store = SoundBankStore::with_codec(codec);
    let queues = Arc::new(HandoffQueues::new(config.mixer.completion_capacity));
    let shared = Arc::new(MixerShared::new(&config));
    let mixer = Mixer::new(&config, queues.clone(), shared.clone(), store.reader());
    let sink = RequestSink::new();

    info!(
        sample_rate = config.output.sample_rate,
        channels = config.output.channels,
        frames_per_buffer = config.output.frames_per_buffer,
        max_instances_per_category = config.mixer.max_instances_per_category,
        "audio system created"
    );

    let system = AudioSystem {
        config,
        store,
        banks: Arc::new(BankLifecycleManager::new()),
        sink,
        queues,
        shared,
        activations: Vec::new(),
        to_load: HashSet::new(),
        backend: None,
        since_diagnostics: 0.0,
        last_stats: MixerStats::default(),
    };
    Ok((system, mixer))
}

impl AudioSystem {
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn store(&self) -> &SoundBankStore {
        &self.store
    }

    /// Handle for submitting bank operations from other threads.
    pub fn bank_requests(&self) -> Arc<BankLifecycleManager> {
        self.banks.clone()
    }

    pub fn request_sink(&self) -> RequestSink {
        self.sink.clone()
    }

    /// Queue a bank for registration on the next tick.
    pub fn register_bank(&self, path: impl Into<PathBuf>) {
        self.banks.request_register(path);
    }

    /// Queue a bank for removal on the next tick.
    pub fn unregister_bank(&self, path: impl Into<PathBuf>) {
        self.banks.request_unregister(path);
    }

    pub fn play(&self, request: ActivationRequest) {
        self.sink.play(request);
    }

    pub fn stop_sound(&self, entity: EntityId, category: SoundCategory) {
        self.sink.stop(entity, category);
    }

    pub fn set_category_volume(&self, category: SoundCategory, volume: f32) {
        self.shared
            .set_category_volume(category, clamp_volume(volume));
    }

    pub fn category_volume(&self, category: SoundCategory) -> f32 {
        self.shared.category_volume(category)
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.shared.set_master_volume(clamp_volume(volume));
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.master_volume()
    }

    pub fn stats(&self) -> MixerStats {
        self.shared.snapshot(
            self.config.output.sample_rate,
            self.config.output.frames_per_buffer,
        )
    }

    /// One control-thread step: apply bank operations, make referenced
    /// sounds resident, publish the sound table, forward staged requests and
    /// collect completion reports. Payloads are always published before the
    /// activation that needs them reaches the mixer.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        let banks = self.banks.tick(&mut self.store);

        self.to_load.clear();
        while let Some(sound) = self.sink.preloads.pop() {
            self.to_load.insert(sound);
        }
        self.activations.clear();
        while let Some(req) = self.sink.activations.pop() {
            self.to_load.insert(req.sound);
            self.activations.push(req);
        }

        let mut loaded = 0;
        for sound in &self.to_load {
            let was_resident = self.store.lookup_payload(*sound).is_some();
            if self.store.ensure_loaded(*sound) {
                if !was_resident {
                    loaded += 1;
                }
            } else {
                debug!(%sound, "sound not available; playback will be silent");
            }
        }
        self.store.publish();

        let forwarded = self.activations.len();
        for req in self.activations.drain(..) {
            self.queues.activations.push(req);
        }
        // after the activations, matching the mixer's drain order
        while let Some(req) = self.sink.removals.pop() {
            self.queues.removals.push(req);
        }

        let mut completions = Vec::new();
        while let Some(report) = self.queues.completions.pop() {
            completions.push(report);
        }

        self.since_diagnostics += dt;
        if self.since_diagnostics >= DIAGNOSTICS_INTERVAL_SECS {
            self.since_diagnostics = 0.0;
            self.log_dropped();
        }

        TickReport {
            banks,
            loaded,
            forwarded,
            completions,
        }
    }

    fn log_dropped(&mut self) {
        let stats = self.stats();
        let activations = stats.dropped_activations - self.last_stats.dropped_activations;
        let completions = stats.dropped_completions - self.last_stats.dropped_completions;
        if activations > 0 {
            warn!(dropped = activations, "mixer refused activations; category full");
        }
        if completions > 0 {
            warn!(dropped = completions, "mixer lost completion reports");
        }
        self.last_stats = stats;
    }

    /// Hand the mixer to `backend` and start the output stream.
    pub fn start(&mut self, mut backend: Box<dyn AudioBackend>, mixer: Mixer) -> Result<()> {
        if self.backend.is_some() {
            return Err(anyhow!("audio output already started"));
        }
        let spec = self.config.output.stream_spec();
        if backend.channels() != spec.channels || backend.buffer_size() != spec.frames_per_buffer {
            return Err(anyhow!(
                "backend format {}ch/{} frames does not match configured {}ch/{} frames",
                backend.channels(),
                backend.buffer_size(),
                spec.channels,
                spec.frames_per_buffer
            ));
        }
        backend
            .start(mixer.into_render_fn())
            .context("failed to start audio output")?;
        info!(sample_rate = backend.sample_rate(), "audio output started");
        self.backend = Some(backend);
        Ok(())
    }

    /// Stop the output stream. The mixer is dropped with it.
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };
        backend.stop().context("failed to stop audio output")?;
        info!(frames = backend.frames_since_start(), "audio output stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_running())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_VOLUME;
    use asset_manager::{BankWriter, PcmFormat};
    use audio_backend::MockAudioBackend;
    use std::path::Path;
    use tempfile::tempdir;

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn write_bank(path: &Path, sounds: &[(&str, PcmFormat, Vec<u8>)]) {
        let mut w = BankWriter::new();
        for (name, format, pcm) in sounds {
            w.add_sound(*name, *format, pcm.clone());
        }
        w.write_to_path(path).unwrap();
    }

    fn play(system: &AudioSystem, entity: u64, category: SoundCategory, name: &str, volume: f32) {
        system.play(ActivationRequest {
            entity: EntityId(entity),
            category,
            sound: SoundHandle::from_name(name),
            volume,
            looping: false,
        });
    }

    #[test]
    fn beep_plays_then_reports_completion() {
        let dir = tempdir().unwrap();
        let bank = dir.path().join("sfx.bank");
        let samples: Vec<i16> = (0..200).map(|i| (i * 97 % 4000) as i16 - 2000).collect();
        write_bank(&bank, &[("sfx/beep", PcmFormat::new(2, 16, 44_100), pcm16(&samples))]);

        let mut config = AudioConfig::default();
        config.mixer.category_volumes.effect = 0.5;
        config.mixer.master_volume = 0.8;
        let (mut system, mut mixer) = create(config).unwrap();
        system.register_bank(&bank);
        play(&system, 1, SoundCategory::Effect, "beep", 1.0);
        let report = system.tick(0.016);
        assert_eq!(report.banks.registered, 1);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.forwarded, 1);

        let mut out = vec![0i16; 256 * 2];
        mixer.render(&mut out);
        for (got, s) in out[..200].iter().zip(&samples) {
            let expected = ((*s as f32 * 0.5) * 0.8).round() as i16;
            assert_eq!(*got, expected);
        }
        assert!(out[200..].iter().all(|s| *s == 0));

        let report = system.tick(0.016);
        assert_eq!(
            report.completions,
            vec![CompletionReport {
                entity: EntityId(1),
                category: SoundCategory::Effect,
                sound: SoundHandle::from_name("beep"),
            }]
        );
        mixer.render(&mut out);
        assert!(system.tick(0.016).completions.is_empty());
    }

    #[test]
    fn two_half_volume_instances_sum() {
        let dir = tempdir().unwrap();
        let bank = dir.path().join("a.bank");
        let samples = [1001i16, -999, 3, 20_000];
        write_bank(&bank, &[("tone", PcmFormat::new(1, 16, 44_100), pcm16(&samples))]);

        let mut config = AudioConfig::default();
        config.output.channels = 1;
        config.output.frames_per_buffer = 4;
        let (mut system, mut mixer) = create(config).unwrap();
        system.register_bank(&bank);
        play(&system, 1, SoundCategory::Voice, "tone", 0.5);
        play(&system, 2, SoundCategory::Voice, "tone", 0.5);
        system.tick(0.0);

        let mut out = [0i16; 4];
        mixer.render(&mut out);
        let half = |s: i16| (s as f32 * 0.5).round() as i32;
        let expected: Vec<i16> = samples.iter().map(|s| (2 * half(*s)) as i16).collect();
        assert_eq!(out.to_vec(), expected);
    }

    #[test]
    fn unregistered_bank_goes_silent() {
        let dir = tempdir().unwrap();
        let bank = dir.path().join("a.bank");
        write_bank(&bank, &[("hum", PcmFormat::new(1, 16, 44_100), pcm16(&[500; 16]))]);

        let mut config = AudioConfig::default();
        config.output.channels = 1;
        config.output.frames_per_buffer = 4;
        let (mut system, mut mixer) = create(config).unwrap();
        system.register_bank(&bank);
        system.play(ActivationRequest {
            entity: EntityId(1),
            category: SoundCategory::Ambient,
            sound: SoundHandle::from_name("hum"),
            volume: 1.0,
            looping: true,
        });
        system.tick(0.0);

        let mut out = [0i16; 4];
        mixer.render(&mut out);
        assert_eq!(out, [500; 4]);

        system.unregister_bank(&bank);
        system.tick(0.0);
        mixer.render(&mut out);
        assert_eq!(out, [0; 4]);
        assert!(system.store().lookup_descriptor(SoundHandle::from_name("hum")).is_none());
        // the instance waits silently until it is stopped
        assert_eq!(mixer.registry().len(), 1);

        system.stop_sound(EntityId(1), SoundCategory::Ambient);
        system.tick(0.0);
        mixer.render(&mut out);
        assert!(mixer.registry().is_empty());
    }

    #[test]
    fn volume_setters_clamp() {
        let (system, _mixer) = create(AudioConfig::default()).unwrap();
        system.set_master_volume(10.0);
        assert_eq!(system.master_volume(), MAX_VOLUME);
        system.set_category_volume(SoundCategory::Music, f32::NAN);
        assert_eq!(system.category_volume(SoundCategory::Music), 0.0);
        system.set_category_volume(SoundCategory::Voice, 0.25);
        assert_eq!(system.category_volume(SoundCategory::Voice), 0.25);
    }

    #[test]
    fn runs_through_mock_backend() {
        let dir = tempdir().unwrap();
        let bank = dir.path().join("a.bank");
        write_bank(&bank, &[("blip", PcmFormat::new(1, 16, 44_100), pcm16(&[42; 300]))]);

        let config = AudioConfig::default();
        let spec = config.output.stream_spec();
        let (mut system, mixer) = create(config).unwrap();
        let backend = MockAudioBackend::with_spec(spec);
        let driver = backend.driver();
        system.start(Box::new(backend), mixer).unwrap();
        assert!(system.is_running());

        system.register_bank(&bank);
        play(&system, 7, SoundCategory::Effect, "blip", 1.0);
        system.tick(0.0);

        // 300 frames span two 256-frame callbacks
        let out = driver.render_blocks(2).unwrap();
        assert!(out[..600].iter().all(|s| *s == 42));
        assert!(out[600..].iter().all(|s| *s == 0));

        let report = system.tick(0.0);
        assert_eq!(report.completions.len(), 1);
        assert_eq!(system.stats().stream_time_frames, 512);

        system.stop().unwrap();
        assert!(!system.is_running());
    }

    #[test]
    fn start_rejects_mismatched_backend() {
        let (mut system, mixer) = create(AudioConfig::default()).unwrap();
        let spec = audio_backend::StreamSpec {
            sample_rate: 44_100,
            channels: 1,
            frames_per_buffer: 256,
        };
        assert!(system
            .start(Box::new(MockAudioBackend::with_spec(spec)), mixer)
            .is_err());
        assert!(!system.is_running());
    }

    #[test]
    fn compressed_bank_plays_through_its_codec() {
        let dir = tempdir().unwrap();
        let bank = dir.path().join("packed.bank");
        let mut w = BankWriter::with_compressor(asset_manager::Deflate::default());
        w.add_sound("tone", PcmFormat::new(1, 16, 44_100), pcm16(&[1000; 64]));
        w.write_to_path(&bank).unwrap();

        let mut config = AudioConfig::default();
        config.output.channels = 1;
        config.output.frames_per_buffer = 4;
        let (mut system, mut mixer) =
            create_with_codec(config, Box::new(asset_manager::Deflate::default())).unwrap();
        system.register_bank(&bank);
        play(&system, 1, SoundCategory::Effect, "tone", 1.0);
        assert_eq!(system.tick(0.0).loaded, 1);

        let mut out = [0i16; 4];
        mixer.render(&mut out);
        assert_eq!(out, [1000; 4]);
        let resident = system.store().lookup_payload(SoundHandle::from_name("tone"));
        assert_eq!(resident.unwrap().len(), 128);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = AudioConfig::default();
        config.mixer.completion_capacity = 0;
        assert!(create(config).is_err());
    }
}
