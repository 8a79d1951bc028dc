//! Real-time half of the audio system.
//!
//! `Mixer::render` runs on the device callback. Everything it touches is
//! either owned by the mixer and sized at construction (registry buckets,
//! category scratch, completion backlog) or shared lock-free (hand-off
//! queues, the published sound table, atomic volumes and counters).

use asset_manager::{ResidentSound, SoundTableReader};
use audio_backend::RenderFn;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::category::SoundCategory;
use crate::config::AudioConfig;
use crate::messages::{CompletionReport, HandoffQueues};
use crate::registry::{PlaybackInstance, PlaybackRegistry};

/// State shared between the control facade and the mixer. Volumes are f32
/// bit patterns.
pub(crate) struct MixerShared {
    category_volume: [AtomicU32; SoundCategory::COUNT],
    master_volume: AtomicU32,
    stream_frames: AtomicU64,
    callbacks: AtomicU64,
    active_instances: AtomicUsize,
    dropped_activations: AtomicU64,
    dropped_completions: AtomicU64,
}

impl MixerShared {
    pub fn new(config: &AudioConfig) -> Self {
        let volumes = &config.mixer.category_volumes;
        Self {
            category_volume: std::array::from_fn(|i| {
                AtomicU32::new(volumes.get(SoundCategory::ALL[i]).to_bits())
            }),
            master_volume: AtomicU32::new(config.mixer.master_volume.to_bits()),
            stream_frames: AtomicU64::new(0),
            callbacks: AtomicU64::new(0),
            active_instances: AtomicUsize::new(0),
            dropped_activations: AtomicU64::new(0),
            dropped_completions: AtomicU64::new(0),
        }
    }

    pub fn set_category_volume(&self, category: SoundCategory, volume: f32) {
        self.category_volume[category.index()].store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn category_volume(&self, category: SoundCategory) -> f32 {
        f32::from_bits(self.category_volume[category.index()].load(Ordering::Relaxed))
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.master_volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self, sample_rate: u32, buffer_frames: usize) -> MixerStats {
        MixerStats {
            sample_rate,
            buffer_frames,
            stream_time_frames: self.stream_frames.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
            active_instances: self.active_instances.load(Ordering::Relaxed),
            dropped_activations: self.dropped_activations.load(Ordering::Relaxed),
            dropped_completions: self.dropped_completions.load(Ordering::Relaxed),
        }
    }
}

/// Counters published by the mixer after every callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStats {
    pub sample_rate: u32,
    pub buffer_frames: usize,
    pub stream_time_frames: u64,
    pub callbacks: u64,
    pub active_instances: usize,
    /// Activations refused because their category was full.
    pub dropped_activations: u64,
    /// Completion reports lost because both the queue and the backlog were full.
    pub dropped_completions: u64,
}

pub struct Mixer {
    queues: Arc<HandoffQueues>,
    shared: Arc<MixerShared>,
    sounds: SoundTableReader,
    registry: PlaybackRegistry,
    scratch: [Vec<i32>; SoundCategory::COUNT],
    backlog: Vec<CompletionReport>,
    backlog_limit: usize,
    channels: usize,
    block_frames: usize,
}

impl Mixer {
    pub(crate) fn new(
        config: &AudioConfig,
        queues: Arc<HandoffQueues>,
        shared: Arc<MixerShared>,
        sounds: SoundTableReader,
    ) -> Self {
        let channels = config.output.channels as usize;
        let block_frames = config.output.frames_per_buffer;
        Self {
            queues,
            shared,
            sounds,
            registry: PlaybackRegistry::with_capacity(config.mixer.max_instances_per_category),
            scratch: std::array::from_fn(|_| vec![0; block_frames * channels]),
            backlog: Vec::with_capacity(config.mixer.completion_capacity),
            backlog_limit: config.mixer.completion_capacity,
            channels,
            block_frames,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    pub fn registry(&self) -> &PlaybackRegistry {
        &self.registry
    }

    /// Completion reports waiting for room in the completion queue.
    pub fn pending_completions(&self) -> usize {
        self.backlog.len()
    }

    /// Mix one interleaved output buffer. Buffers longer than the configured
    /// block are mixed block by block; a trailing partial frame is zeroed.
    pub fn render(&mut self, out: &mut [i16]) {
        self.flush_backlog();
        self.apply_requests();

        let block_samples = self.block_frames * self.channels;
        for chunk in out.chunks_mut(block_samples) {
            self.mix_block(chunk);
        }

        let shared = &self.shared;
        shared
            .active_instances
            .store(self.registry.len(), Ordering::Relaxed);
        shared
            .stream_frames
            .fetch_add((out.len() / self.channels) as u64, Ordering::Relaxed);
        shared.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Wrap the mixer as the backend's render callback.
    pub fn into_render_fn(mut self) -> RenderFn {
        Box::new(move |out: &mut [i16]| self.render(out))
    }

    fn flush_backlog(&mut self) {
        let mut sent = 0;
        for report in &self.backlog {
            if self.queues.completions.push(*report).is_err() {
                break;
            }
            sent += 1;
        }
        self.backlog.drain(..sent);
    }

    // activations first, then removals, so a request pair that arrives
    // between two callbacks cancels out
    fn apply_requests(&mut self) {
        while let Some(req) = self.queues.activations.pop() {
            if !self.registry.insert(&req) {
                self.shared
                    .dropped_activations
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
        while let Some(req) = self.queues.removals.pop() {
            self.registry.remove(req.entity, req.category);
        }
    }

    fn mix_block(&mut self, out: &mut [i16]) {
        let channels = self.channels;
        let samples = out.len() / channels * channels;
        let table = self.sounds.load();
        let Mixer {
            queues,
            shared,
            registry,
            scratch,
            backlog,
            backlog_limit,
            ..
        } = self;

        for category in SoundCategory::ALL {
            let acc = &mut scratch[category.index()][..samples];
            acc.fill(0);
            registry.bucket_mut(category).retain_mut(|inst| {
                // not resident yet: keep the instance, contribute nothing
                let Some(sound) = table.get(inst.sound) else {
                    return true;
                };
                if !mix_instance(inst, sound, acc, channels) {
                    return true;
                }
                let report = CompletionReport {
                    entity: inst.entity,
                    category: inst.category,
                    sound: inst.sound,
                };
                if let Err(report) = queues.completions.push(report) {
                    if backlog.len() < *backlog_limit {
                        backlog.push(report);
                    } else {
                        shared.dropped_completions.fetch_add(1, Ordering::Relaxed);
                    }
                }
                false
            });
        }

        let master = shared.master_volume();
        let volumes = SoundCategory::ALL.map(|c| shared.category_volume(c));
        for (i, slot) in out[..samples].iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for (acc, volume) in scratch.iter().zip(volumes) {
                sum += acc[i] as f32 * volume;
            }
            *slot = saturate(sum * master);
        }
        out[samples..].fill(0);
    }
}

/// Mix as many frames of `inst` as fit in `acc`. Returns true when a
/// non-looping instance has played its last frame.
fn mix_instance(
    inst: &mut PlaybackInstance,
    sound: &ResidentSound,
    acc: &mut [i32],
    channels: usize,
) -> bool {
    let payload: &[u8] = &sound.payload;
    let src_channels = sound.descriptor.channels as usize;
    let sample_bytes = sound.descriptor.bits_per_sample as usize / 8;
    let frame_bytes = sound.descriptor.frame_bytes();
    if frame_bytes == 0 {
        return !inst.looping;
    }
    let frames = payload.len() / frame_bytes;
    if frames == 0 {
        return !inst.looping;
    }
    if inst.frame >= frames {
        // the payload was replaced by a shorter one
        if !inst.looping {
            return true;
        }
        inst.frame = 0;
    }

    for out_frame in acc.chunks_exact_mut(channels) {
        let start = inst.frame * frame_bytes;
        let frame = &payload[start..start + frame_bytes];
        for (ch, slot) in out_frame.iter_mut().enumerate() {
            let sample = map_channel(frame, ch, channels, src_channels, sample_bytes);
            *slot = slot.saturating_add(scale(sample, inst.volume));
        }
        inst.frame += 1;
        if inst.frame >= frames {
            if !inst.looping {
                return true;
            }
            inst.frame = 0;
        }
    }
    false
}

/// Sample for output channel `out_ch`. Mono output averages every source
/// channel; otherwise source channels repeat across the output layout.
fn map_channel(
    frame: &[u8],
    out_ch: usize,
    out_channels: usize,
    src_channels: usize,
    sample_bytes: usize,
) -> i32 {
    if out_channels == 1 && src_channels > 1 {
        let sum: i32 = (0..src_channels)
            .map(|c| decode_sample(frame, c, sample_bytes))
            .sum();
        return sum / src_channels as i32;
    }
    decode_sample(frame, out_ch % src_channels, sample_bytes)
}

/// 8-bit PCM is unsigned; 16-bit is signed little-endian.
fn decode_sample(frame: &[u8], ch: usize, sample_bytes: usize) -> i32 {
    let at = ch * sample_bytes;
    if sample_bytes == 1 {
        (frame[at] as i32 - 128) << 8
    } else {
        i16::from_le_bytes([frame[at], frame[at + 1]]) as i32
    }
}

#[inline]
fn scale(sample: i32, volume: f32) -> i32 {
    (sample as f32 * volume).round() as i32
}

#[inline]
fn saturate(v: f32) -> i16 {
    v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
