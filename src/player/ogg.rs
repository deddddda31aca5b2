use crate::format::Ogg;
use crate::sample::Sample;
use crate::source::Source;
use std::time::Duration;

/// Plays an [`Ogg`] stream as `C` channels, looping back to the stream's
/// loop point (or the start) when looping.
pub struct OggPlayer<const C: usize> {
    ogg: Ogg,
    looping: bool,
    ended: bool,
}

impl<const C: usize> OggPlayer<C> {
    pub fn new(ogg: Ogg) -> Self {
        Self {
            ogg,
            looping: false,
            ended: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.ogg.sample_rate()
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

    pub fn position(&self) -> u64 {
        self.ogg.position()
    }

    pub fn seek(&mut self, frame: u64) {
        match self.ogg.seek(frame) {
            Ok(()) => self.ended = false,
            Err(e) => {
                log::error!("Ogg seek failed: {e}");
                self.ended = true;
            }
        }
    }

    pub fn loop_point(&self) -> Option<u64> {
        self.ogg.loop_point()
    }

    pub fn set_loop_point(&mut self, frame: Option<u64>) {
        self.ogg.set_loop_point(frame);
    }

    pub fn duration(&self) -> Option<Duration> {
        self.ogg.duration()
    }
}

impl<const C: usize> Source<C> for OggPlayer<C> {
    fn generate(&mut self, buffer: &mut [Sample<C>]) -> usize {
        if self.ended {
            return 0;
        }

        let mut written = 0;
        // Set after a loop seek; a second empty read right after means the
        // loop target itself is empty.
        let mut rewound = false;
        while written < buffer.len() {
            match self.ogg.get_samples(&mut buffer[written..]) {
                Ok(0) => {
                    if !self.looping || rewound {
                        self.ended = true;
                        break;
                    }
                    let target = self.ogg.loop_point().unwrap_or(0);
                    if let Err(e) = self.ogg.seek(target) {
                        log::error!("Ogg loop seek to frame {target} failed: {e}");
                        self.ended = true;
                        break;
                    }
                    rewound = true;
                }
                Ok(read) => {
                    written += read;
                    rewound = false;
                }
                Err(e) => {
                    log::error!("Ogg decode failed, stopping: {e}");
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
    use crate::format::ogg::tests::{LOOP_OGG, LOOP_OGG_FRAMES, LOOP_OGG_POINT};
    use crate::sample::{Mono, Stereo};

    fn player<const C: usize>() -> OggPlayer<C> {
        OggPlayer::new(Ogg::new(LOOP_OGG.to_vec()).unwrap())
    }

    #[test]
    fn plays_to_the_end_once() {
        let mut player = player::<1>();
        let mut buf = vec![Mono::SILENCE; LOOP_OGG_FRAMES as usize + 100];
        assert_eq!(player.generate(&mut buf) as u64, LOOP_OGG_FRAMES);
        assert!(player.ended());
        assert_eq!(player.generate(&mut buf), 0);
    }

    #[test]
    fn looping_wraps_to_the_tagged_loop_point() {
        let mut player = player::<1>();
        player.set_looping(true);
        assert_eq!(player.loop_point(), Some(LOOP_OGG_POINT));

        let total = LOOP_OGG_FRAMES as usize;
        let mut buf = vec![Mono::SILENCE; total + 300];
        assert_eq!(player.generate(&mut buf), total + 300);
        assert!(!player.ended());
        assert_eq!(player.position(), LOOP_OGG_POINT + 300);

        let start = LOOP_OGG_POINT as usize;
        for i in 0..300 {
            let (wrapped, original) = (buf[total + i][0], buf[start + i][0]);
            assert!((wrapped - original).abs() < 1e-4, "frame {i}: {wrapped} vs {original}");
        }
    }

    #[test]
    fn cleared_loop_point_wraps_to_the_start() {
        let mut player = player::<2>();
        player.set_looping(true);
        player.set_loop_point(None);
        let mut buf = vec![Stereo::SILENCE; LOOP_OGG_FRAMES as usize + 10];
        player.generate(&mut buf);
        assert_eq!(player.position(), 10);
        assert_eq!(buf[0][0], buf[0][1]);
    }
}
