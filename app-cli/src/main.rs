use anyhow::{bail, Context, Result};
use bevy_ecs::prelude::*;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audio_backend::{create_audio_backend, AudioBackend, MockAudioBackend, MockDriver};
use asset_manager::{Decompressor, Deflate, Stored};
use audio_system::{create_with_codec, AudioConfig, AudioSystem, SoundCategory, SoundHandle};
use engine_audio::{
    install_observers, remove_finished_sounds, uninstall_observers, AmbientSound, AudioBridge,
    EffectSound, LifecycleChannels, MusicSource, SoundFinished, VoiceLine,
};

#[derive(Parser)]
#[command(name = "app-cli", about = "AudioVerse sound bank player")]
struct Cli {
    /// TOML audio configuration; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play one sound from a bank on an entity until it finishes
    Play(PlayArgs),
}

#[derive(Args)]
struct PlayArgs {
    bank: PathBuf,
    /// Sound name; any directory prefix is ignored
    sound: String,
    #[arg(long, default_value = "effect")]
    category: SoundCategory,
    #[arg(long, default_value_t = 1.0)]
    volume: f32,
    #[arg(long)]
    looping: bool,
    /// Stop after this many seconds (default: 5 when looping, 30 otherwise)
    #[arg(long)]
    seconds: Option<f32>,
    /// Render into the mock backend instead of the sound device
    #[arg(long)]
    mock: bool,
    /// The bank was packed with `asset-packer pack --compress`
    #[arg(long)]
    deflate: bool,
}

const FRAME: Duration = Duration::from_micros(16_667);

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AudioConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AudioConfig::default(),
    };
    match cli.command {
        Command::Play(args) => play(config, args),
    }
}

fn spawn_sound(world: &mut World, args: &PlayArgs) -> Entity {
    let name = args.sound.as_str();
    match args.category {
        SoundCategory::Music => world.spawn(
            MusicSource::new(name)
                .with_volume(args.volume)
                .with_looping(args.looping),
        ),
        SoundCategory::Effect => world.spawn(
            EffectSound::new(name)
                .with_volume(args.volume)
                .with_looping(args.looping),
        ),
        SoundCategory::Ambient => world.spawn(
            AmbientSound::new(name)
                .with_volume(args.volume)
                .with_looping(args.looping),
        ),
        SoundCategory::Voice => world.spawn(
            VoiceLine::new(name)
                .with_volume(args.volume)
                .with_looping(args.looping),
        ),
    }
    .id()
}

fn open_backend(config: &AudioConfig, mock: bool) -> Result<(Box<dyn AudioBackend>, Option<MockDriver>)> {
    let spec = config.output.stream_spec();
    if mock {
        let backend = MockAudioBackend::with_spec(spec);
        let driver = backend.driver();
        return Ok((Box::new(backend), Some(driver)));
    }
    let backend = create_audio_backend(spec).context("opening audio output")?;
    Ok((backend, None))
}

fn play(config: AudioConfig, args: PlayArgs) -> Result<()> {
    let sound = SoundHandle::from_name(&args.sound);
    let limit = args
        .seconds
        .unwrap_or(if args.looping { 5.0 } else { 30.0 });

    let codec: Box<dyn Decompressor> = if args.deflate {
        Box::new(Deflate::default())
    } else {
        Box::new(Stored)
    };
    let (mut system, mixer) = create_with_codec(config.clone(), codec)?;
    let (backend, driver) = open_backend(&config, args.mock)?;
    system.start(backend, mixer)?;

    let mut world = World::new();
    let channels = Arc::new(LifecycleChannels::new());
    let observers = install_observers(&mut world, channels.clone());
    let bridge = AudioBridge::new(channels, system.request_sink(), &config.bridge);

    system.register_bank(&args.bank);
    let entity = spawn_sound(&mut world, &args);
    let report = bridge.update(&mut system, 0.0);
    if report.banks.failed > 0 {
        bail!("could not register bank {}", args.bank.display());
    }
    if system.store().lookup_descriptor(sound).is_none() {
        bail!("sound '{}' not found in {}", args.sound, args.bank.display());
    }
    info!(%entity, %sound, category = %args.category, "playing");

    let result = run(&mut system, &bridge, &mut world, driver.as_ref(), limit);

    if world.get_entity(entity).is_ok() {
        world.despawn(entity);
        bridge.update(&mut system, 0.0);
    }
    let stats = system.stats();
    info!(
        frames = stats.stream_time_frames,
        callbacks = stats.callbacks,
        dropped_activations = stats.dropped_activations,
        "done"
    );
    system.stop()?;
    uninstall_observers(&mut world, observers);
    result
}

/// Frame loop. Real output paces itself on the wall clock; the mock renders
/// one frame's worth of blocks per iteration without sleeping.
fn run(
    system: &mut AudioSystem,
    bridge: &AudioBridge,
    world: &mut World,
    driver: Option<&MockDriver>,
    limit: f32,
) -> Result<()> {
    let dt = FRAME.as_secs_f32();
    let mut elapsed = 0.0;
    let mut peak = 0i16;
    while elapsed < limit {
        let started = Instant::now();
        match driver {
            Some(driver) => {
                let spec = driver.spec();
                let frames = spec.sample_rate as f32 * dt;
                let blocks = (frames / spec.frames_per_buffer as f32).ceil().max(1.0) as usize;
                let out = driver.render_blocks(blocks)?;
                peak = out.iter().fold(peak, |p, s| p.max(s.saturating_abs()));
            }
            None => {
                if let Some(rest) = FRAME.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }
        elapsed += dt;

        let report = bridge.update(system, dt);
        let finished: Vec<SoundFinished> = report
            .completions
            .into_iter()
            .map(SoundFinished::from)
            .collect();
        if remove_finished_sounds(world, &finished) > 0 {
            info!(seconds = elapsed, "sound finished");
            if driver.is_some() {
                info!(peak, "mock output level");
            }
            return Ok(());
        }
    }
    if driver.is_some() {
        info!(peak, "mock output level");
    }
    warn!(seconds = limit, "time limit reached");
    Ok(())
}
