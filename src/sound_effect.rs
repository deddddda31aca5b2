//! One-shot playback of a [`SoundChunk`] with stereo panning.

use crate::audio_data::SoundChunk;
use crate::sample::Stereo;
use crate::source::Source;
use std::f64::consts::FRAC_PI_4;
use std::sync::{Arc, Weak};

/// Plays a chunk once, panned and scaled, into a stereo mix.
///
/// The player only holds a weak handle to its chunk. Whoever owns the chunk
/// is expected to [`reset`](Self::reset) every player for which
/// [`is_playing_chunk`](Self::is_playing_chunk) holds before freeing it; a
/// chunk that disappears anyway is treated as finished.
#[derive(Debug, Default)]
pub struct SoundEffectPlayer {
    chunk: Option<Weak<SoundChunk>>,
    cursor: usize,
    volume: f32,
    sep: f32,
    left: f32,
    right: f32,
}

impl SoundEffectPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plays `chunk` from the start. `sep` ranges from -1 (hard left) to 1
    /// (hard right); values outside are clamped.
    pub fn start(&mut self, chunk: &Arc<SoundChunk>, volume: f32, sep: f32) {
        self.chunk = Some(Arc::downgrade(chunk));
        self.cursor = 0;
        self.update(volume, sep);
    }

    /// Moves a playing sound without restarting it.
    pub fn update(&mut self, volume: f32, sep: f32) {
        self.volume = volume;
        self.sep = sep.clamp(-1.0, 1.0);
        let (left, right) = pan_gains(self.sep);
        self.left = left * volume;
        self.right = right * volume;
    }

    /// Detaches the chunk. The player is finished afterwards.
    pub fn reset(&mut self) {
        self.chunk = None;
        self.cursor = 0;
    }

    pub fn finished(&self) -> bool {
        match self.chunk.as_ref().and_then(Weak::upgrade) {
            Some(chunk) => self.cursor >= chunk.len(),
            None => true,
        }
    }

    pub fn is_playing_chunk(&self, chunk: &Arc<SoundChunk>) -> bool {
        self.chunk
            .as_ref()
            .is_some_and(|weak| Weak::as_ptr(weak) == Arc::as_ptr(chunk))
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn sep(&self) -> f32 {
        self.sep
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Constant-power gains: the angle sweeps `[0, π/2]` as `sep` sweeps
/// `[-1, 1]`, left follows the cosine and right the sine.
pub fn pan_gains(sep: f32) -> (f32, f32) {
    let angle = (sep.clamp(-1.0, 1.0) as f64 + 1.0) * FRAC_PI_4;
    (snap_to_zero(angle.cos() as f32), snap_to_zero(angle.sin() as f32))
}

// cos(π/2) is not exactly zero in floating point.
fn snap_to_zero(gain: f32) -> f32 {
    if gain < f32::EPSILON { 0.0 } else { gain }
}

impl Source<2> for SoundEffectPlayer {
    fn generate(&mut self, buffer: &mut [Stereo]) -> usize {
        let Some(chunk) = self.chunk.as_ref().and_then(Weak::upgrade) else {
            return 0;
        };

        let samples = chunk.samples();
        let start = self.cursor.min(samples.len());
        let count = buffer.len().min(samples.len() - start);

        for (out, sample) in buffer.iter_mut().zip(&samples[start..start + count]) {
            let value = sample[0];
            *out = Stereo::new([value * self.left, value * self.right]);
        }

        self.cursor = start + count;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Mono, Sample};

    fn chunk(len: usize, value: f32) -> Arc<SoundChunk> {
        Arc::new(SoundChunk::new(vec![Mono::splat(value); len]))
    }

    #[test]
    fn centre_pan_is_equal_power() {
        let (left, right) = pan_gains(0.0);
        assert_eq!(left, right);
        assert!((left - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn full_separation_is_a_hard_pan() {
        assert_eq!(pan_gains(-1.0), (1.0, 0.0));
        assert_eq!(pan_gains(1.0), (0.0, 1.0));
        assert_eq!(pan_gains(-7.0), (1.0, 0.0));
    }

    #[test]
    fn unassigned_player_is_finished() {
        let mut player = SoundEffectPlayer::new();
        assert!(player.finished());
        let mut buf = [Stereo::SILENCE; 4];
        assert_eq!(player.generate(&mut buf), 0);
    }

    #[test]
    fn finishes_exactly_at_the_end_of_the_chunk() {
        let sound = chunk(10, 0.5);
        let mut player = SoundEffectPlayer::new();
        player.start(&sound, 1.0, 1.0);

        let mut buf = [Stereo::SILENCE; 6];
        assert_eq!(player.generate(&mut buf), 6);
        assert!(!player.finished());
        assert_eq!(buf[0], Sample::new([0.0, 0.5]));

        assert_eq!(player.generate(&mut buf), 4);
        assert!(player.finished());
        assert_eq!(player.generate(&mut buf), 0);
    }

    #[test]
    fn volume_scales_both_channels() {
        let sound = chunk(2, 1.0);
        let mut player = SoundEffectPlayer::new();
        player.start(&sound, 0.5, -1.0);
        let mut buf = [Stereo::SILENCE; 2];
        player.generate(&mut buf);
        assert_eq!(buf[1], Sample::new([0.5, 0.0]));
    }

    #[test]
    fn update_keeps_the_cursor() {
        let sound = chunk(8, 1.0);
        let mut player = SoundEffectPlayer::new();
        player.start(&sound, 1.0, -1.0);
        let mut buf = [Stereo::SILENCE; 3];
        player.generate(&mut buf);
        player.update(1.0, 1.0);
        assert_eq!(player.cursor(), 3);
        player.generate(&mut buf);
        assert_eq!(buf[0], Sample::new([0.0, 1.0]));
    }

    #[test]
    fn tracks_which_chunk_is_playing() {
        let a = chunk(4, 0.1);
        let b = chunk(4, 0.1);
        let mut player = SoundEffectPlayer::new();
        player.start(&a, 1.0, 0.0);
        assert!(player.is_playing_chunk(&a));
        assert!(!player.is_playing_chunk(&b));
        player.reset();
        assert!(!player.is_playing_chunk(&a));
        assert!(player.finished());
    }

    #[test]
    fn dropped_chunk_reads_as_finished() {
        let sound = chunk(4, 0.1);
        let mut player = SoundEffectPlayer::new();
        player.start(&sound, 1.0, 0.0);
        drop(sound);
        assert!(player.finished());
        let mut buf = [Stereo::SILENCE; 4];
        assert_eq!(player.generate(&mut buf), 0);
    }
}
