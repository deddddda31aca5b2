//! Tracker module backend.
//!
//! Rendering is delegated to a [`ModuleCodec`] registered in the
//! [`CodecRegistry`](super::CodecRegistry). The built-in
//! [`ProTrackerCodec`](super::ProTrackerCodec) handles MOD files; bindings
//! for XM, S3M or IT plug in the same way. Decoders render interleaved
//! stereo 16-bit PCM at the native rate.

use crate::NATIVE_SAMPLE_RATE;
use crate::error::{FormatError, Result};
use crate::sample::{Sample, i16_to_f32};
use std::sync::Arc;
use std::time::Duration;

/// A loaded module ready to render.
pub trait ModuleDecoder: Send {
    /// Renders interleaved stereo frames into `out` (two values per frame)
    /// and returns the number of frames rendered.
    ///
    /// With `looping` set the module restarts at its own loop target and
    /// never ends. Otherwise zero frames means the module has finished.
    fn play_buffer(&mut self, out: &mut [i16], looping: bool) -> Result<usize>;

    fn seek_time(&mut self, ms: u32) -> Result<()>;

    fn position_ms(&self) -> u32;

    fn duration_ms(&self) -> Option<u32>;
}

/// Factory that recognizes and loads module files.
pub trait ModuleCodec: Send + Sync {
    fn name(&self) -> &str;

    /// Loads a module from memory, rendering at `sample_rate`. Fails with a
    /// [`FormatError::Module`] when the bytes are not a module it supports.
    fn load(
        &self,
        data: &[u8],
        sample_rate: u32,
    ) -> std::result::Result<Box<dyn ModuleDecoder>, FormatError>;
}

pub struct Xmp {
    decoder: Box<dyn ModuleDecoder>,
    codec: String,
    scratch: Vec<i16>,
}

impl Xmp {
    /// Tries each codec in order. Codecs only borrow `data`; a decoder keeps
    /// whatever it needs.
    pub fn new(
        data: &[u8],
        codecs: &[Arc<dyn ModuleCodec>],
    ) -> std::result::Result<Self, FormatError> {
        if data.is_empty() {
            return Err(FormatError::Module("empty module data".into()));
        }

        let mut last_error = None;
        for codec in codecs {
            match codec.load(data, NATIVE_SAMPLE_RATE) {
                Ok(decoder) => {
                    log::debug!("Loaded module with {}", codec.name());
                    return Ok(Self {
                        decoder,
                        codec: codec.name().to_string(),
                        scratch: Vec::new(),
                    });
                }
                Err(e) => {
                    log::debug!("{} rejected module: {}", codec.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FormatError::Module("no module codec registered".into())))
    }

    pub fn codec_name(&self) -> &str {
        &self.codec
    }

    pub fn sample_rate(&self) -> u32 {
        NATIVE_SAMPLE_RATE
    }

    pub fn get_samples<const C: usize>(
        &mut self,
        buffer: &mut [Sample<C>],
        looping: bool,
    ) -> Result<usize> {
        let needed = buffer.len() * 2;
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0);
        }
        let pcm = &mut self.scratch[..needed];
        let frames = self.decoder.play_buffer(pcm, looping)?.min(buffer.len());
        for (i, out) in buffer[..frames].iter_mut().enumerate() {
            *out = Sample::from_channels(2, |c| i16_to_f32(pcm[i * 2 + c]));
        }
        Ok(frames)
    }

    pub fn seek(&mut self, position: Duration) -> Result<()> {
        let ms = u32::try_from(position.as_millis()).unwrap_or(u32::MAX);
        self.decoder.seek_time(ms)
    }

    pub fn position(&self) -> Duration {
        Duration::from_millis(self.decoder.position_ms() as u64)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.decoder
            .duration_ms()
            .map(|ms| Duration::from_millis(ms as u64))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sample::Stereo;

    /// Plays `frames` frames of a fixed stereo value, restarting when looping.
    pub(crate) struct ToneModule {
        pub value: [i16; 2],
        pub frames: usize,
        pub cursor: usize,
    }

    impl ModuleDecoder for ToneModule {
        fn play_buffer(&mut self, out: &mut [i16], looping: bool) -> Result<usize> {
            let wanted = out.len() / 2;
            let mut rendered = 0;
            while rendered < wanted {
                if self.cursor >= self.frames {
                    if !looping {
                        break;
                    }
                    self.cursor = 0;
                }
                out[rendered * 2] = self.value[0];
                out[rendered * 2 + 1] = self.value[1];
                self.cursor += 1;
                rendered += 1;
            }
            Ok(rendered)
        }

        fn seek_time(&mut self, ms: u32) -> Result<()> {
            self.cursor = (ms as u64 * NATIVE_SAMPLE_RATE as u64 / 1000) as usize;
            Ok(())
        }

        fn position_ms(&self) -> u32 {
            (self.cursor as u64 * 1000 / NATIVE_SAMPLE_RATE as u64) as u32
        }

        fn duration_ms(&self) -> Option<u32> {
            Some((self.frames as u64 * 1000 / NATIVE_SAMPLE_RATE as u64) as u32)
        }
    }

    /// Accepts data starting with `TONE`; byte 4 is the left value, byte 5
    /// the right value (both scaled by 256), bytes 6..8 the length in frames.
    pub(crate) struct ToneCodec;

    impl ModuleCodec for ToneCodec {
        fn name(&self) -> &str {
            "tone"
        }

        fn load(
            &self,
            data: &[u8],
            _sample_rate: u32,
        ) -> std::result::Result<Box<dyn ModuleDecoder>, FormatError> {
            if data.len() < 8 || &data[..4] != b"TONE" {
                return Err(FormatError::Module("not a tone module".into()));
            }
            Ok(Box::new(ToneModule {
                value: [data[4] as i8 as i16 * 256, data[5] as i8 as i16 * 256],
                frames: u16::from_le_bytes([data[6], data[7]]) as usize,
                cursor: 0,
            }))
        }
    }

    pub(crate) fn tone_bytes(left: i8, right: i8, frames: u16) -> Vec<u8> {
        let mut bytes = b"TONE".to_vec();
        bytes.push(left as u8);
        bytes.push(right as u8);
        bytes.extend(frames.to_le_bytes());
        bytes
    }

    fn codecs() -> Vec<Arc<dyn ModuleCodec>> {
        vec![Arc::new(ToneCodec)]
    }

    #[test]
    fn converts_interleaved_pcm() {
        let mut xmp = Xmp::new(&tone_bytes(64, -64, 100), &codecs()).unwrap();
        assert_eq!(xmp.codec_name(), "tone");
        let mut buf = [Stereo::SILENCE; 10];
        assert_eq!(xmp.get_samples(&mut buf, false).unwrap(), 10);
        assert_eq!(buf[3], Stereo::new([0.5, -0.5]));
    }

    #[test]
    fn mono_output_averages() {
        let mut xmp = Xmp::new(&tone_bytes(64, 0, 100), &codecs()).unwrap();
        let mut buf = [Sample::<1>::SILENCE; 4];
        assert_eq!(xmp.get_samples(&mut buf, false).unwrap(), 4);
        assert_eq!(buf[0][0], 0.25);
    }

    #[test]
    fn ends_only_without_looping() {
        let mut xmp = Xmp::new(&tone_bytes(1, 1, 6), &codecs()).unwrap();
        let mut buf = [Stereo::SILENCE; 4];
        assert_eq!(xmp.get_samples(&mut buf, false).unwrap(), 4);
        assert_eq!(xmp.get_samples(&mut buf, false).unwrap(), 2);
        assert_eq!(xmp.get_samples(&mut buf, false).unwrap(), 0);
        assert_eq!(xmp.get_samples(&mut buf, true).unwrap(), 4);
    }

    #[test]
    fn rejects_unknown_data() {
        assert!(matches!(
            Xmp::new(b"garbage!", &codecs()),
            Err(FormatError::Module(_))
        ));
        assert!(Xmp::new(&tone_bytes(1, 1, 1), &[]).is_err());
        assert!(Xmp::new(&[], &codecs()).is_err());
    }
}
