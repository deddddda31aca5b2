//! Streaming background music with a per-sample fade envelope.

use crate::NATIVE_SAMPLE_RATE;
use crate::format::{CodecRegistry, Gme, Ogg, Xmp};
use crate::player::{GmePlayer, OggPlayer, XmpPlayer};
use crate::resampler::Resampler;
use crate::sample::Stereo;
use crate::source::Source;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicType {
    Ogg,
    /// Tracker modules.
    Mod,
    /// Chiptunes.
    Gme,
}

/// The decoded track behind a [`MusicPlayer`].
pub enum MusicSource {
    Ogg(OggPlayer<2>),
    Mod(XmpPlayer<2>),
    Gme(GmePlayer<2>),
}

impl MusicSource {
    /// Tries Ogg Vorbis, then tracker modules, then chiptunes.
    pub fn load(data: &[u8], codecs: &CodecRegistry) -> Option<Self> {
        if Ogg::sniff(data) {
            match Ogg::new(data.to_vec()) {
                Ok(ogg) => return Some(Self::Ogg(OggPlayer::new(ogg))),
                Err(e) => log::debug!("Music is not Ogg Vorbis: {}", e),
            }
        }
        match Xmp::new(data, codecs.module_codecs()) {
            Ok(xmp) => return Some(Self::Mod(XmpPlayer::new(xmp))),
            Err(e) => log::debug!("Music is not a tracker module: {}", e),
        }
        match Gme::new(data, codecs.chip_codecs()) {
            Ok(gme) => return Some(Self::Gme(GmePlayer::new(gme))),
            Err(e) => log::debug!("Music is not a chiptune: {}", e),
        }
        None
    }

    pub fn music_type(&self) -> MusicType {
        match self {
            Self::Ogg(_) => MusicType::Ogg,
            Self::Mod(_) => MusicType::Mod,
            Self::Gme(_) => MusicType::Gme,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Ogg(p) => p.sample_rate(),
            Self::Mod(p) => p.sample_rate(),
            Self::Gme(p) => p.sample_rate(),
        }
    }

    pub fn looping(&self) -> bool {
        match self {
            Self::Ogg(p) => p.looping(),
            Self::Mod(p) => p.looping(),
            Self::Gme(p) => p.looping(),
        }
    }

    pub fn set_looping(&mut self, looping: bool) {
        match self {
            Self::Ogg(p) => p.set_looping(looping),
            Self::Mod(p) => p.set_looping(looping),
            Self::Gme(p) => p.set_looping(looping),
        }
    }

    pub fn seek(&mut self, position: Duration) {
        match self {
            Self::Ogg(p) => {
                let frame = position.as_secs_f64() * p.sample_rate() as f64;
                p.seek(frame as u64);
            }
            Self::Mod(p) => p.seek(position),
            Self::Gme(p) => p.seek(position),
        }
    }

    pub fn position(&self) -> Duration {
        match self {
            Self::Ogg(p) => frames_to_duration(p.position(), p.sample_rate()),
            Self::Mod(p) => p.position(),
            Self::Gme(p) => p.position(),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Ogg(p) => p.duration(),
            Self::Mod(p) => p.duration(),
            Self::Gme(p) => p.duration(),
        }
    }
}

impl Source<2> for MusicSource {
    fn generate(&mut self, buffer: &mut [Stereo]) -> usize {
        match self {
            Self::Ogg(p) => p.generate(buffer),
            Self::Mod(p) => p.generate(buffer),
            Self::Gme(p) => p.generate(buffer),
        }
    }
}

fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(frames as f64 / sample_rate as f64)
}

/// Linear gain ramp advanced once per output frame.
#[derive(Debug, Clone, Copy)]
struct Fade {
    gain: f32,
    from: f32,
    to: f32,
    elapsed: u64,
    total: u64,
    active: bool,
}

impl Fade {
    fn new() -> Self {
        Self {
            gain: 1.0,
            from: 1.0,
            to: 1.0,
            elapsed: 0,
            total: 1,
            active: false,
        }
    }

    fn arm(&mut self, from: f32, to: f32, length: Duration) {
        self.from = from;
        self.to = to;
        self.gain = from;
        self.elapsed = 0;
        self.total = ((length.as_secs_f64() * NATIVE_SAMPLE_RATE as f64) as u64).max(1);
        self.active = true;
    }

    fn step(&mut self) -> f32 {
        if self.active {
            self.elapsed += 1;
            if self.elapsed >= self.total {
                self.gain = self.to;
                self.active = false;
            } else {
                let t = self.elapsed as f64 / self.total as f64;
                self.gain = self.from + ((self.to - self.from) as f64 * t) as f32;
            }
        }
        self.gain
    }
}

/// Plays one music track at the native rate.
///
/// A player that failed to load stays empty and generates nothing. Tracks
/// are swapped by building a new player off the audio thread and moving it
/// into the live slot (see [`SoundWorld::set_music`]).
///
/// [`SoundWorld::set_music`]: crate::world::SoundWorld::set_music
pub struct MusicPlayer {
    stream: Option<Resampler<2, MusicSource>>,
    playing: bool,
    fade: Fade,
    internal_gain: f32,
}

impl Default for MusicPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicPlayer {
    /// An empty player.
    pub fn new() -> Self {
        Self {
            stream: None,
            playing: false,
            fade: Fade::new(),
            internal_gain: 1.0,
        }
    }

    /// Decodes `data` as music. Unrecognized or malformed data yields an
    /// empty player; the failure is only logged.
    pub fn load(data: &[u8], codecs: &CodecRegistry) -> Self {
        let mut player = Self::new();
        match MusicSource::load(data, codecs) {
            Some(source) => {
                log::info!(
                    "Loaded {:?} music at {} Hz",
                    source.music_type(),
                    source.sample_rate()
                );
                let rate = source.sample_rate();
                player.stream = Some(Resampler::from_rate(source, rate));
            }
            None => log::warn!("Unrecognized music format ({} bytes)", data.len()),
        }
        player
    }

    pub fn is_loaded(&self) -> bool {
        self.stream.is_some()
    }

    pub fn music_type(&self) -> Option<MusicType> {
        self.source().map(MusicSource::music_type)
    }

    fn source(&self) -> Option<&MusicSource> {
        self.stream.as_ref().map(Resampler::source)
    }

    /// Starts the track from the beginning.
    pub fn play(&mut self, looping: bool) {
        let Some(stream) = self.stream.as_mut() else {
            log::debug!("Ignoring play on empty music player");
            return;
        };
        stream.source_mut().set_looping(looping);
        stream.source_mut().seek(Duration::ZERO);
        stream.reset();
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn resume(&mut self) {
        self.playing = self.stream.is_some();
    }

    /// Stops and rewinds.
    pub fn stop(&mut self) {
        self.playing = false;
        if let Some(stream) = self.stream.as_mut() {
            stream.source_mut().seek(Duration::ZERO);
            stream.reset();
        }
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn seek(&mut self, position: Duration) {
        if let Some(stream) = self.stream.as_mut() {
            stream.source_mut().seek(position);
            stream.reset();
        }
    }

    pub fn position(&self) -> Duration {
        self.source()
            .map(MusicSource::position)
            .unwrap_or(Duration::ZERO)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.source().and_then(MusicSource::duration)
    }

    pub fn looping(&self) -> bool {
        self.source().is_some_and(MusicSource::looping)
    }

    pub fn set_looping(&mut self, looping: bool) {
        if let Some(stream) = self.stream.as_mut() {
            stream.source_mut().set_looping(looping);
        }
    }

    /// Loop target of an Ogg track; other formats loop where their codec says.
    pub fn loop_point(&self) -> Option<Duration> {
        match self.source()? {
            MusicSource::Ogg(p) => p
                .loop_point()
                .map(|frame| frames_to_duration(frame, p.sample_rate())),
            _ => None,
        }
    }

    pub fn set_loop_point(&mut self, position: Option<Duration>) {
        match self.stream.as_mut().map(Resampler::source_mut) {
            Some(MusicSource::Ogg(p)) => {
                let rate = p.sample_rate() as f64;
                p.set_loop_point(position.map(|pos| (pos.as_secs_f64() * rate) as u64));
            }
            _ => log::debug!("Loop points are only supported for Ogg music"),
        }
    }

    /// Ramps from the current gain to `to` over `length`.
    pub fn fade_to(&mut self, to: f32, length: Duration) {
        let from = self.fade.gain;
        self.fade.arm(from, to, length);
    }

    pub fn fade_from_to(&mut self, from: f32, to: f32, length: Duration) {
        self.fade.arm(from, to, length);
    }

    /// Freezes the gain where the ramp currently is.
    pub fn stop_fade(&mut self) {
        self.fade.active = false;
    }

    pub fn fading(&self) -> bool {
        self.fade.active
    }

    /// Current envelope gain.
    pub fn gain(&self) -> f32 {
        self.fade.gain
    }

    /// Sets a fixed gain applied on top of the fade envelope, without ramping.
    pub fn internal_gain(&mut self, gain: f32) {
        self.internal_gain = gain;
    }
}

impl Source<2> for MusicPlayer {
    fn generate(&mut self, buffer: &mut [Stereo]) -> usize {
        if !self.playing {
            return 0;
        }
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };

        let written = stream.generate(buffer);
        for frame in &mut buffer[..written] {
            *frame *= self.fade.step() * self.internal_gain;
        }
        if written < buffer.len() {
            self.playing = false;
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::gme::tests::{SquareCodec, chip_bytes};
    use crate::format::ogg::tests::{LOOP_OGG, LOOP_OGG_POINT};
    use crate::format::protracker::tests::{cell, mod_bytes};
    use crate::format::xmp::tests::{ToneCodec, tone_bytes};
    use crate::format::ym::tests::{tone_registers, ym3_bytes};

    fn codecs() -> CodecRegistry {
        CodecRegistry::empty()
            .with_module_codec(ToneCodec)
            .with_chip_codec(SquareCodec)
    }

    fn tone(frames: u16) -> MusicPlayer {
        MusicPlayer::load(&tone_bytes(64, 64, frames), &codecs())
    }

    #[test]
    fn load_order_picks_the_first_accepting_format() {
        assert_eq!(tone(10).music_type(), Some(MusicType::Mod));
        let chip = MusicPlayer::load(&chip_bytes(10), &codecs());
        assert_eq!(chip.music_type(), Some(MusicType::Gme));
    }

    #[test]
    fn default_codecs_play_protracker_modules() {
        let module = mod_bytes(64, &[(0, 0, cell(1, 428, 0, 0))]);
        let mut player = MusicPlayer::load(&module, &CodecRegistry::default());
        assert_eq!(player.music_type(), Some(MusicType::Mod));
        assert_eq!(player.duration(), Some(Duration::from_millis(7680)));

        player.play(false);
        let mut buf = [Stereo::SILENCE; 32];
        assert_eq!(player.generate(&mut buf), 32);
        // Channel one pans mostly left.
        assert!((buf[0][0] - 0.1875).abs() < 1e-6);
        assert!((buf[0][1] - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn default_codecs_play_ym_chiptunes() {
        let song = ym3_bytes(tone_registers(0), 50);
        let mut player = MusicPlayer::load(&song, &CodecRegistry::default());
        assert_eq!(player.music_type(), Some(MusicType::Gme));
        assert_eq!(player.duration(), Some(Duration::from_secs(1)));

        player.play(false);
        let mut buf = vec![Stereo::SILENCE; 4410];
        assert_eq!(player.generate(&mut buf), 4410);
        assert!(buf.iter().any(|f| f[0].abs() > 0.05));
    }

    #[test]
    fn ogg_music_keeps_its_tagged_loop_point() {
        let mut player = MusicPlayer::load(LOOP_OGG, &CodecRegistry::default());
        assert_eq!(player.music_type(), Some(MusicType::Ogg));
        let expected = Duration::from_secs_f64(LOOP_OGG_POINT as f64 / 22050.0);
        let loop_point = player.loop_point().unwrap();
        assert!(loop_point.abs_diff(expected) < Duration::from_micros(50));

        player.play(true);
        let mut buf = vec![Stereo::SILENCE; 30_000];
        assert_eq!(player.generate(&mut buf), 30_000);
        assert!(player.playing());
        assert!(buf.iter().any(|f| f[0].abs() > 0.01));
    }

    #[test]
    fn unrecognized_music_is_empty_and_silent() {
        let mut player = MusicPlayer::load(b"not music at all", &codecs());
        assert!(!player.is_loaded());
        player.play(true);
        assert!(!player.playing());
        let mut buf = [Stereo::SILENCE; 8];
        assert_eq!(player.generate(&mut buf), 0);
    }

    #[test]
    fn stopped_player_generates_nothing() {
        let mut player = tone(100);
        let mut buf = [Stereo::SILENCE; 8];
        assert_eq!(player.generate(&mut buf), 0);
        player.play(false);
        assert_eq!(player.generate(&mut buf), 8);
        assert_eq!(buf[0], Stereo::splat(0.5));
        player.pause();
        assert_eq!(player.generate(&mut buf), 0);
        player.resume();
        assert_eq!(player.generate(&mut buf), 8);
    }

    #[test]
    fn short_read_ends_the_track() {
        let mut player = tone(10);
        player.play(false);
        let mut buf = [Stereo::SILENCE; 16];
        assert_eq!(player.generate(&mut buf), 10);
        assert!(!player.playing());
    }

    #[test]
    fn looping_track_keeps_going() {
        let mut player = tone(10);
        player.play(true);
        assert!(player.looping());
        let mut buf = [Stereo::SILENCE; 25];
        assert_eq!(player.generate(&mut buf), 25);
        assert!(player.playing());
    }

    #[test]
    fn play_rewinds_after_the_end() {
        let mut player = tone(10);
        player.play(false);
        let mut buf = [Stereo::SILENCE; 16];
        player.generate(&mut buf);
        player.play(false);
        assert_eq!(player.generate(&mut buf), 10);
    }

    #[test]
    fn fade_reaches_target_exactly() {
        let length = Duration::from_secs_f64(100.0 / NATIVE_SAMPLE_RATE as f64);
        let frames = (length.as_secs_f64() * NATIVE_SAMPLE_RATE as f64).ceil() as usize;

        let mut player = tone(1000);
        player.play(false);
        player.fade_from_to(0.0, 1.0, length);
        assert!(player.fading());

        let mut buf = vec![Stereo::SILENCE; frames];
        assert_eq!(player.generate(&mut buf), frames);
        assert!(!player.fading());
        assert_eq!(player.gain(), 1.0);
        assert!(buf.iter().all(|f| f[0] <= 0.5));
        assert!(buf.windows(2).all(|w| w[0][0] <= w[1][0]));

        let mut after = [Stereo::SILENCE; 4];
        player.generate(&mut after);
        assert_eq!(after, [Stereo::splat(0.5); 4]);
    }

    #[test]
    fn fade_is_continuous_across_buffers() {
        let mut player = tone(1000);
        player.play(false);
        player.fade_from_to(1.0, 0.0, Duration::from_secs_f64(10.0 / NATIVE_SAMPLE_RATE as f64));

        let mut first = [Stereo::SILENCE; 3];
        let mut second = [Stereo::SILENCE; 3];
        player.generate(&mut first);
        player.generate(&mut second);
        assert!(first[2][0] > second[0][0]);
        assert!(player.fading());
    }

    #[test]
    fn zero_length_fade_snaps() {
        let mut player = tone(100);
        player.play(false);
        player.fade_to(0.25, Duration::ZERO);
        let mut buf = [Stereo::SILENCE; 2];
        player.generate(&mut buf);
        assert!(!player.fading());
        assert_eq!(buf[0], Stereo::splat(0.125));
    }

    #[test]
    fn stop_fade_freezes_gain() {
        let mut player = tone(1000);
        player.play(false);
        player.fade_from_to(0.0, 1.0, Duration::from_secs(1));
        let mut buf = [Stereo::SILENCE; 10];
        player.generate(&mut buf);
        player.stop_fade();
        let frozen = player.gain();
        player.generate(&mut buf);
        assert_eq!(player.gain(), frozen);
        assert!(!player.fading());
    }

    #[test]
    fn internal_gain_is_applied_on_top_of_the_envelope() {
        let mut player = tone(100);
        player.play(false);
        player.internal_gain(0.5);
        let mut buf = [Stereo::SILENCE; 2];
        player.generate(&mut buf);
        assert_eq!(buf[0], Stereo::splat(0.25));
        assert_eq!(player.gain(), 1.0);
    }

    #[test]
    fn seek_and_position_follow_the_codec() {
        let mut player = tone(44100);
        player.play(false);
        player.seek(Duration::from_millis(500));
        assert_eq!(player.position(), Duration::from_millis(500));
        assert_eq!(player.duration(), Some(Duration::from_secs(1)));
        assert_eq!(player.loop_point(), None);
    }
}
