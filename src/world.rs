use crate::audio_data::SoundChunk;
use crate::config::AudioConfig;
use crate::error::{Result, WadMixError};
use crate::events::AudioEvent;
use crate::mixer::{Mixer, SourceId};
use crate::music::MusicPlayer;
use crate::sample::Stereo;
use crate::sound_effect::SoundEffectPlayer;
use crate::source::Source;
use crossbeam_channel::Sender;
use std::sync::Arc;

/// The whole live audio graph: one music slot plus a fixed set of sound
/// effect slots, summed to native-rate stereo.
///
/// # Locking
///
/// A `SoundWorld` is shared between the game thread and the audio callback
/// behind a single `Mutex` (see [`AudioEngine::world`]). Every control call
/// and every `generate` happen under that one lock, so a change is either
/// fully visible to a buffer or not at all.
///
/// [`AudioEngine::world`]: crate::engine::AudioEngine::world
pub struct SoundWorld {
    effects: Mixer<2, SoundEffectPlayer>,
    effect_ids: Vec<SourceId>,
    music: MusicPlayer,
    scratch: Vec<Stereo>,
    events: Sender<AudioEvent>,
}

impl SoundWorld {
    pub fn new(config: &AudioConfig, events: Sender<AudioEvent>) -> Self {
        let mut effects = Mixer::with_capacity(config.block_size);
        let effect_ids = (0..config.sound_channels)
            .map(|_| effects.add_source(SoundEffectPlayer::new()))
            .collect();

        Self {
            effects,
            effect_ids,
            music: MusicPlayer::new(),
            scratch: vec![Stereo::SILENCE; config.block_size],
            events,
        }
    }

    pub fn sound_channels(&self) -> usize {
        self.effect_ids.len()
    }

    fn effect(&self, channel: usize) -> Option<&SoundEffectPlayer> {
        let id = *self.effect_ids.get(channel)?;
        self.effects.source(id)
    }

    fn effect_mut(&mut self, channel: usize) -> Result<&mut SoundEffectPlayer> {
        self.effect_ids
            .get(channel)
            .copied()
            .and_then(|id| self.effects.source_mut(id))
            .ok_or_else(|| {
                WadMixError::Engine(format!("Sound channel {} does not exist", channel))
            })
    }

    /// First channel that is not playing anything.
    pub fn free_channel(&self) -> Option<usize> {
        (0..self.sound_channels()).find(|&channel| !self.sound_playing(channel))
    }

    /// Plays `chunk` on `channel` from the start, replacing whatever was
    /// playing there.
    pub fn start_sound(
        &mut self,
        channel: usize,
        chunk: &Arc<SoundChunk>,
        volume: f32,
        sep: f32,
    ) -> Result<()> {
        self.effect_mut(channel)?.start(chunk, volume, sep);
        Ok(())
    }

    pub fn update_sound(&mut self, channel: usize, volume: f32, sep: f32) -> Result<()> {
        self.effect_mut(channel)?.update(volume, sep);
        Ok(())
    }

    pub fn stop_sound(&mut self, channel: usize) -> Result<()> {
        self.effect_mut(channel)?.reset();
        Ok(())
    }

    pub fn sound_playing(&self, channel: usize) -> bool {
        self.effect(channel).is_some_and(|player| !player.finished())
    }

    /// Detaches `chunk` from every channel playing it. Must be called before
    /// the chunk is freed; returns how many channels were reset.
    pub fn reset_chunk(&mut self, chunk: &Arc<SoundChunk>) -> usize {
        let mut reset = 0;
        for player in self.effects.sources_mut() {
            if player.is_playing_chunk(chunk) {
                player.reset();
                reset += 1;
            }
        }
        reset
    }

    /// Moves `music` into the live slot and hands back the previous player,
    /// so it can be dropped after the lock is released.
    pub fn set_music(&mut self, music: MusicPlayer) -> MusicPlayer {
        if let Some(kind) = music.music_type() {
            log::info!("Switching music to {:?} track", kind);
        }
        std::mem::replace(&mut self.music, music)
    }

    pub fn music(&self) -> &MusicPlayer {
        &self.music
    }

    pub fn music_mut(&mut self) -> &mut MusicPlayer {
        &mut self.music
    }
}

impl Source<2> for SoundWorld {
    fn generate(&mut self, buffer: &mut [Stereo]) -> usize {
        let music_was_playing = self.music.playing();

        self.effects.generate(buffer);

        if self.scratch.len() < buffer.len() {
            self.scratch.resize(buffer.len(), Stereo::SILENCE);
        }
        let scratch = &mut self.scratch[..buffer.len()];
        let written = self.music.generate(scratch);
        for (out, frame) in buffer.iter_mut().zip(&scratch[..written]) {
            *out += *frame;
        }

        if music_was_playing && !self.music.playing() {
            // A full queue only means nobody is listening.
            let _ = self.events.try_send(AudioEvent::MusicFinished);
        }
        buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CodecRegistry;
    use crate::format::xmp::tests::{ToneCodec, tone_bytes};
    use crate::sample::{Mono, Sample};
    use crossbeam_channel::{Receiver, bounded};

    fn world(channels: usize) -> (SoundWorld, Receiver<AudioEvent>) {
        let (tx, rx) = bounded(8);
        let config = AudioConfig::new().block_size(16).sound_channels(channels);
        (SoundWorld::new(&config, tx), rx)
    }

    fn chunk(len: usize, value: f32) -> Arc<SoundChunk> {
        Arc::new(SoundChunk::new(vec![Mono::splat(value); len]))
    }

    #[test]
    fn idle_world_is_silent() {
        let (mut world, _rx) = world(4);
        let mut buf = [Stereo::splat(1.0); 32];
        assert_eq!(world.generate(&mut buf), 32);
        assert_eq!(buf, [Stereo::SILENCE; 32]);
    }

    #[test]
    fn effects_are_panned_and_summed() {
        let (mut world, _rx) = world(2);
        let sound = chunk(8, 0.5);
        world.start_sound(0, &sound, 1.0, -1.0).unwrap();
        world.start_sound(1, &sound, 1.0, 1.0).unwrap();

        let mut buf = [Stereo::SILENCE; 4];
        world.generate(&mut buf);
        assert_eq!(buf[0], Sample::new([0.5, 0.5]));
        assert!(world.sound_playing(0));
    }

    #[test]
    fn out_of_range_channel_is_an_error() {
        let (mut world, _rx) = world(1);
        let sound = chunk(8, 0.5);
        assert!(matches!(
            world.start_sound(1, &sound, 1.0, 0.0),
            Err(WadMixError::Engine(_))
        ));
        assert!(!world.sound_playing(5));
    }

    #[test]
    fn free_channel_skips_busy_slots() {
        let (mut world, _rx) = world(2);
        let sound = chunk(8, 0.5);
        assert_eq!(world.free_channel(), Some(0));
        world.start_sound(0, &sound, 1.0, 0.0).unwrap();
        assert_eq!(world.free_channel(), Some(1));
        world.start_sound(1, &sound, 1.0, 0.0).unwrap();
        assert_eq!(world.free_channel(), None);
        world.stop_sound(0).unwrap();
        assert_eq!(world.free_channel(), Some(0));
    }

    #[test]
    fn reset_chunk_detaches_every_player() {
        let (mut world, _rx) = world(3);
        let a = chunk(8, 0.5);
        let b = chunk(8, 0.5);
        world.start_sound(0, &a, 1.0, 0.0).unwrap();
        world.start_sound(1, &b, 1.0, 0.0).unwrap();
        world.start_sound(2, &a, 1.0, 0.0).unwrap();

        assert_eq!(world.reset_chunk(&a), 2);
        assert!(!world.sound_playing(0));
        assert!(world.sound_playing(1));
        assert!(!world.sound_playing(2));
    }

    #[test]
    fn music_end_is_reported_once() {
        let (mut world, rx) = world(0);
        let codecs = CodecRegistry::empty().with_module_codec(ToneCodec);
        let mut music = MusicPlayer::load(&tone_bytes(64, 64, 20), &codecs);
        music.play(false);
        let previous = world.set_music(music);
        assert!(!previous.is_loaded());

        let mut buf = [Stereo::SILENCE; 16];
        world.generate(&mut buf);
        assert_eq!(buf[0], Stereo::splat(0.5));
        assert!(rx.try_recv().is_err());

        world.generate(&mut buf);
        assert_eq!(buf[4], Stereo::SILENCE);
        assert_eq!(rx.try_recv(), Ok(AudioEvent::MusicFinished));

        world.generate(&mut buf);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stopping_music_does_not_report_an_end() {
        let (mut world, rx) = world(0);
        let codecs = CodecRegistry::empty().with_module_codec(ToneCodec);
        let mut music = MusicPlayer::load(&tone_bytes(64, 64, 200), &codecs);
        music.play(false);
        world.set_music(music);

        let mut buf = [Stereo::SILENCE; 16];
        world.generate(&mut buf);
        world.music_mut().stop();
        world.generate(&mut buf);
        assert!(rx.try_recv().is_err());
    }
}
