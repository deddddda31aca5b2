use anyhow::{Context, Result, anyhow, bail};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use wadmix::{AudioConfig, AudioEngine, AudioEvent, MusicPlayer, SoundBank, SoundWorld};

const USAGE: &str = "usage: wadmix-demo <file> [--sfx]";

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(path) = args.iter().find(|a| !a.starts_with("--")) else {
        bail!(USAGE);
    };
    let as_sfx = args.iter().any(|a| a == "--sfx");

    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path))?;
    let config = AudioConfig::default();
    let mut engine = AudioEngine::new(config.clone())?;

    if as_sfx {
        play_sound(&mut engine, &config, &data)
    } else {
        play_music(&mut engine, &config, &data)
    }
}

fn lock(world: &Mutex<SoundWorld>) -> Result<MutexGuard<'_, SoundWorld>> {
    world.lock().map_err(|_| anyhow!("sound world lock poisoned"))
}

/// Plays a sound effect once, sweeping it from left to right.
fn play_sound(engine: &mut AudioEngine, config: &AudioConfig, data: &[u8]) -> Result<()> {
    let mut bank = SoundBank::new(config.chunk_options.clone());
    let id = bank
        .load(data)
        .context("not a DMX, WAV or Ogg Vorbis sound")?;
    let chunk = bank.get(id).context("chunk vanished from the bank")?.clone();
    log::info!("Loaded sound: {:?}", chunk.duration());

    engine.start()?;
    let world = engine.world();
    lock(&world)?.start_sound(0, &chunk, 1.0, -1.0)?;

    let steps = 50u32;
    let step = chunk.duration() / steps;
    for i in 0..=steps {
        {
            let mut world = lock(&world)?;
            if !world.sound_playing(0) {
                break;
            }
            world.update_sound(0, 1.0, -1.0 + 2.0 * i as f32 / steps as f32)?;
        }
        std::thread::sleep(step);
    }

    bank.free(id, &mut lock(&world)?);
    engine.stop()?;
    log::info!("Played {} frames", engine.frames_processed());
    Ok(())
}

/// Plays music with a fade in until it finishes.
fn play_music(engine: &mut AudioEngine, config: &AudioConfig, data: &[u8]) -> Result<()> {
    let mut music = MusicPlayer::load(data, &config.codecs);
    if !music.is_loaded() {
        bail!("unrecognized music format");
    }
    if let Some(duration) = music.duration() {
        log::info!("Music length: {:?}", duration);
    }
    music.fade_from_to(0.0, 1.0, Duration::from_secs(2));
    music.play(false);

    let events = engine.events();
    engine.start()?;
    let previous = lock(&engine.world())?.set_music(music);
    drop(previous);

    loop {
        match events.recv() {
            Ok(AudioEvent::MusicFinished) => break,
            Ok(AudioEvent::StreamError { error }) => log::warn!("Stream error: {}", error),
            Ok(event) => log::debug!("{:?}", event),
            Err(_) => break,
        }
    }

    engine.stop()?;
    log::info!("Played {} frames", engine.frames_processed());
    Ok(())
}
