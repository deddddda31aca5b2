use crate::format::Xmp;
use crate::sample::Sample;
use crate::source::Source;
use std::time::Duration;

/// Plays a tracker module as `C` channels. Looping is handled by the module
/// renderer itself.
pub struct XmpPlayer<const C: usize> {
    xmp: Xmp,
    looping: bool,
    ended: bool,
}

impl<const C: usize> XmpPlayer<C> {
    pub fn new(xmp: Xmp) -> Self {
        Self {
            xmp,
            looping: false,
            ended: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.xmp.sample_rate()
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
        match self.xmp.seek(position) {
            Ok(()) => self.ended = false,
            Err(e) => {
                log::error!("Module seek failed: {e}");
                self.ended = true;
            }
        }
    }

    pub fn position(&self) -> Duration {
        self.xmp.position()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.xmp.duration()
    }
}

impl<const C: usize> Source<C> for XmpPlayer<C> {
    fn generate(&mut self, buffer: &mut [Sample<C>]) -> usize {
        if self.ended {
            return 0;
        }

        let mut written = 0;
        while written < buffer.len() {
            match self.xmp.get_samples(&mut buffer[written..], self.looping) {
                Ok(0) => {
                    self.ended = true;
                    break;
                }
                Ok(read) => written += read,
                Err(e) => {
                    log::error!("Module render failed, stopping: {e}");
                    self.ended = true;
                    break;
                }
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::xmp::tests::{ToneCodec, tone_bytes};
    use crate::format::ModuleCodec;
    use crate::sample::Stereo;
    use std::sync::Arc;

    fn player(frames: u16) -> XmpPlayer<2> {
        let codecs: Vec<Arc<dyn ModuleCodec>> = vec![Arc::new(ToneCodec)];
        XmpPlayer::new(Xmp::new(&tone_bytes(32, 32, frames), &codecs).unwrap())
    }

    #[test]
    fn plays_to_the_end_once() {
        let mut player = player(100);
        let mut buf = vec![Stereo::SILENCE; 64];
        assert_eq!(player.generate(&mut buf), 64);
        assert_eq!(player.generate(&mut buf), 36);
        assert!(player.ended());
        assert_eq!(player.generate(&mut buf), 0);
    }

    #[test]
    fn looping_never_ends() {
        let mut player = player(10);
        player.set_looping(true);
        let mut buf = vec![Stereo::SILENCE; 64];
        for _ in 0..4 {
            assert_eq!(player.generate(&mut buf), 64);
        }
        assert!(!player.ended());
    }

    #[test]
    fn seek_clears_end() {
        let mut player = player(10);
        let mut buf = vec![Stereo::SILENCE; 64];
        player.generate(&mut buf);
        assert!(player.ended());
        player.seek(Duration::ZERO);
        assert!(!player.ended());
        assert_eq!(player.generate(&mut buf), 10);
    }
}
