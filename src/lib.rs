//! # wadmix
//!
//! A real-time game audio engine: one-shot sound effects decoded up front,
//! streamed music with fades and loop points, all normalized to a fixed
//! native rate and summed into stereo for the output device.
//!
//! The whole live graph sits behind one mutex. The game thread takes the
//! lock for control calls; the device callback takes it for each buffer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use wadmix::*;
//!
//! # fn main() -> wadmix::Result<()> {
//! let mut engine = AudioEngine::new(AudioConfig::default())?;
//! engine.start()?;
//!
//! // Decode a sound effect lump (DMX, WAV or Ogg Vorbis).
//! let mut bank = SoundBank::default();
//! let bytes = std::fs::read("dspistol.lmp")?;
//! let pistol = bank.load(&bytes).expect("not a sound");
//!
//! // Build music off the audio thread, then swap it in under the lock.
//! let mut music = MusicPlayer::load(&std::fs::read("d_e1m1.ogg")?, &CodecRegistry::default());
//! music.play(true);
//!
//! let world = engine.world();
//! let mut world = world.lock().unwrap();
//! world.set_music(music);
//! if let (Some(channel), Some(chunk)) = (world.free_channel(), bank.get(pistol)) {
//!     world.start_sound(channel, chunk, 1.0, -0.3)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod audio_data;
pub mod bank;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod format;
pub mod io;
pub mod mixer;
pub mod music;
pub mod player;
pub mod resampler;
pub mod sample;
pub mod sound_effect;
pub mod source;
pub mod world;

/// Rate every source is converted to before mixing, in Hz.
pub const NATIVE_SAMPLE_RATE: u32 = 44_100;

pub use audio_data::{
    ChunkLoadOptions, ChunkResampler, SoundChunk, try_load_chunk, try_load_chunk_with,
};
pub use bank::SoundBank;
pub use config::AudioConfig;
pub use engine::AudioEngine;
pub use error::{FormatError, Result, WadMixError};
pub use events::AudioEvent;
pub use format::CodecRegistry;
pub use mixer::{Mixer, SourceId};
pub use music::{MusicPlayer, MusicSource, MusicType};
pub use resampler::Resampler;
pub use sample::{Mono, Sample, Stereo};
pub use sound_effect::SoundEffectPlayer;
pub use source::{BoxedSource, Source};
pub use world::SoundWorld;
