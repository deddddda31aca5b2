use crate::format::Gme;
use crate::sample::Sample;
use crate::source::Source;
use std::time::Duration;

/// Plays a chiptune track as `C` channels. The emulator decides when a
/// track ends; looping restarts the current track.
pub struct GmePlayer<const C: usize> {
    gme: Gme,
    looping: bool,
    ended: bool,
}

impl<const C: usize> GmePlayer<C> {
    pub fn new(gme: Gme) -> Self {
        Self {
            gme,
            looping: false,
            ended: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.gme.sample_rate()
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn seek(&mut self, position: Duration) {
        match self.gme.seek(position) {
            Ok(()) => self.ended = false,
            Err(e) => {
                log::error!("Chiptune seek failed: {e}");
                self.ended = true;
            }
        }
    }

    pub fn position(&self) -> Duration {
        self.gme.position()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.gme.duration()
    }
}

impl<const C: usize> Source<C> for GmePlayer<C> {
    fn generate(&mut self, buffer: &mut [Sample<C>]) -> usize {
        if self.ended {
            return 0;
        }

        match self.gme.get_samples(buffer, self.looping) {
            Ok(read) => {
                if read < buffer.len() {
                    self.ended = true;
                }
                read
            }
            Err(e) => {
                log::error!("Chiptune emulation failed, stopping: {e}");
                self.ended = true;
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ChipCodec;
    use crate::format::gme::tests::{SquareCodec, chip_bytes};
    use crate::sample::Stereo;
    use std::sync::Arc;

    #[test]
    fn ends_after_track_length_unless_looping() {
        let codecs: Vec<Arc<dyn ChipCodec>> = vec![Arc::new(SquareCodec)];
        let mut player: GmePlayer<2> = GmePlayer::new(Gme::new(&chip_bytes(32), &codecs).unwrap());
        let mut buf = vec![Stereo::SILENCE; 32];
        assert_eq!(player.generate(&mut buf), 32);
        assert_eq!(player.generate(&mut buf), 0);
        assert!(player.ended());

        player.set_looping(true);
        player.seek(Duration::ZERO);
        assert_eq!(player.generate(&mut buf), 32);
        assert_eq!(player.generate(&mut buf), 32);
    }
}
