//! Sound effect chunks and the multi-format chunk loader.

mod batch_resampler;
mod dmx;
mod load_options;
mod loader;

pub use batch_resampler::BatchResampler;
pub use load_options::{ChunkLoadOptions, ChunkResampler};
pub use loader::{try_load_chunk, try_load_chunk_with};

use crate::NATIVE_SAMPLE_RATE;
use crate::sample::{Mono, Sample};
use crate::source::Source;
use std::time::Duration;

/// A fully decoded, native-rate, mono sound effect.
///
/// Chunks are immutable once built. Playback slots refer to them weakly; the
/// owner must reset every slot that [`is_playing_chunk`] before dropping the
/// chunk.
///
/// [`is_playing_chunk`]: crate::sound_effect::SoundEffectPlayer::is_playing_chunk
#[derive(Debug, Clone, PartialEq)]
pub struct SoundChunk {
    samples: Vec<Mono>,
}

impl SoundChunk {
    pub fn new(samples: Vec<Mono>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Mono] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / NATIVE_SAMPLE_RATE as f64)
    }
}

/// Plays a resident buffer of frames once.
pub(crate) struct BufferSource<const C: usize> {
    frames: Vec<Sample<C>>,
    position: usize,
}

impl<const C: usize> BufferSource<C> {
    pub(crate) fn new(frames: Vec<Sample<C>>) -> Self {
        Self {
            frames,
            position: 0,
        }
    }
}

impl<const C: usize> Source<C> for BufferSource<C> {
    fn generate(&mut self, buffer: &mut [Sample<C>]) -> usize {
        let count = buffer.len().min(self.frames.len() - self.position);
        buffer[..count].copy_from_slice(&self.frames[self.position..self.position + count]);
        self.position += count;
        count
    }
}
