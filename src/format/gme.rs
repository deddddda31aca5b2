//! Chiptune backend.
//!
//! Emulation is delegated to a [`ChipCodec`] registered in the
//! [`CodecRegistry`](super::CodecRegistry). The built-in
//! [`YmCodec`](super::YmCodec) plays YM register dumps; console emulators
//! (NSF, SPC, VGM) plug in the same way. Emulators render interleaved
//! stereo 16-bit PCM at the native rate.

use crate::NATIVE_SAMPLE_RATE;
use crate::error::{FormatError, Result};
use crate::sample::{Sample, i16_to_f32};
use std::sync::Arc;
use std::time::Duration;

/// An opened chiptune file.
pub trait ChipEmulator: Send {
    fn track_count(&self) -> usize;

    fn start_track(&mut self, index: usize) -> Result<()>;

    /// Fills all of `out` with interleaved stereo samples.
    fn play(&mut self, out: &mut [i16]) -> Result<()>;

    /// True once a track with a known length has played to its end.
    fn track_ended(&self) -> bool;

    fn seek_ms(&mut self, ms: u64) -> Result<()>;

    fn tell_ms(&self) -> u64;

    fn track_length_ms(&self) -> Option<u64>;
}

/// Factory that recognizes and opens chiptune files.
pub trait ChipCodec: Send + Sync {
    fn name(&self) -> &str;

    fn open(
        &self,
        data: &[u8],
        sample_rate: u32,
    ) -> std::result::Result<Box<dyn ChipEmulator>, FormatError>;
}

pub struct Gme {
    emulator: Box<dyn ChipEmulator>,
    codec: String,
    track: usize,
    scratch: Vec<i16>,
}

impl Gme {
    /// Tries each codec in order and starts the first track. Codecs only
    /// borrow `data`.
    pub fn new(
        data: &[u8],
        codecs: &[Arc<dyn ChipCodec>],
    ) -> std::result::Result<Self, FormatError> {
        if data.is_empty() {
            return Err(FormatError::Chiptune("empty chiptune data".into()));
        }

        let mut last_error = None;
        for codec in codecs {
            match codec.open(data, NATIVE_SAMPLE_RATE) {
                Ok(mut emulator) => {
                    if emulator.track_count() == 0 {
                        return Err(FormatError::Chiptune("file contains no tracks".into()));
                    }
                    emulator
                        .start_track(0)
                        .map_err(|e| FormatError::Chiptune(format!("failed to start track: {e}")))?;
                    log::debug!("Opened chiptune with {}", codec.name());
                    return Ok(Self {
                        emulator,
                        codec: codec.name().to_string(),
                        track: 0,
                        scratch: Vec::new(),
                    });
                }
                Err(e) => {
                    log::debug!("{} rejected chiptune: {}", codec.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FormatError::Chiptune("no chiptune codec registered".into())))
    }

    pub fn codec_name(&self) -> &str {
        &self.codec
    }

    pub fn sample_rate(&self) -> u32 {
        NATIVE_SAMPLE_RATE
    }

    pub fn track(&self) -> usize {
        self.track
    }

    pub fn track_count(&self) -> usize {
        self.emulator.track_count()
    }

    pub fn start_track(&mut self, index: usize) -> Result<()> {
        self.emulator.start_track(index)?;
        self.track = index;
        Ok(())
    }

    /// Renders up to `buffer.len()` frames. Once a track ends it restarts
    /// when `looping`, otherwise zero frames are returned.
    pub fn get_samples<const C: usize>(
        &mut self,
        buffer: &mut [Sample<C>],
        looping: bool,
    ) -> Result<usize> {
        if self.emulator.track_ended() {
            if !looping {
                return Ok(0);
            }
            self.emulator.start_track(self.track)?;
        }

        let needed = buffer.len() * 2;
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0);
        }
        let pcm = &mut self.scratch[..needed];
        self.emulator.play(pcm)?;
        for (i, out) in buffer.iter_mut().enumerate() {
            *out = Sample::from_channels(2, |c| i16_to_f32(pcm[i * 2 + c]));
        }
        Ok(buffer.len())
    }

    pub fn seek(&mut self, position: Duration) -> Result<()> {
        self.emulator
            .seek_ms(u64::try_from(position.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn position(&self) -> Duration {
        Duration::from_millis(self.emulator.tell_ms())
    }

    pub fn duration(&self) -> Option<Duration> {
        self.emulator.track_length_ms().map(Duration::from_millis)
    }
}
