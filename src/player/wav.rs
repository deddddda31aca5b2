use crate::format::Wav;
use crate::sample::Sample;
use crate::source::Source;
use std::time::Duration;

/// Plays a decoded [`Wav`] at any channel count.
#[derive(Debug, Clone)]
pub struct WavPlayer {
    wav: Wav,
    position: usize,
    looping: bool,
    ended: bool,
}

impl WavPlayer {
    pub fn new(wav: Wav) -> Self {
        Self {
            wav,
            position: 0,
            looping: false,
            ended: false,
        }
    }

    pub fn wav(&self) -> &Wav {
        &self.wav
    }

    pub fn sample_rate(&self) -> u32 {
        self.wav.sample_rate()
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

    /// Frame index of the next frame.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, frame: usize) {
        self.position = frame.min(self.wav.length());
        self.ended = false;
    }

    pub fn duration(&self) -> Duration {
        self.wav.duration()
    }
}

impl<const C: usize> Source<C> for WavPlayer {
    fn generate(&mut self, buffer: &mut [Sample<C>]) -> usize {
        if self.ended {
            return 0;
        }

        let mut written = 0;
        while written < buffer.len() {
            let read = self.wav.get_samples(self.position, &mut buffer[written..]);
            self.position += read;
            written += read;

            if read == 0 {
                if !self.looping || self.wav.length() == 0 {
                    self.ended = true;
                    break;
                }
                self.position = 0;
            }
        }
        written
    }
}
