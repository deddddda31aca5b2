//! RIFF/WAVE PCM backend.
//!
//! Only uncompressed PCM (format tag 1) at 8 or 16 bits per sample is
//! accepted. The decoded samples stay resident for the lifetime of the
//! backend.

use crate::error::FormatError;
use crate::io::{ByteStream, StreamError};
use crate::sample::{Sample, i16_to_f32, u8_to_f32};
use std::time::Duration;

const PCM_FORMAT: u16 = 1;

#[derive(Debug, Clone, PartialEq)]
enum PcmData {
    U8(Vec<u8>),
    I16(Vec<i16>),
}

#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// A fully decoded WAV file.
#[derive(Debug, Clone)]
pub struct Wav {
    data: PcmData,
    channels: usize,
    sample_rate: u32,
}

// `?` on a stream read inside the WAV parser yields a WAV error. The
// YM parser maps stream failures to chiptune errors itself.
impl From<StreamError> for FormatError {
    fn from(e: StreamError) -> Self {
        FormatError::Wav(e.to_string())
    }
}

impl Wav {
    /// Parses a RIFF/WAVE file held in memory.
    pub fn new(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut stream = ByteStream::new(bytes);

        if stream.read(4)? != b"RIFF" {
            return Err(FormatError::Wav("missing RIFF header".into()));
        }
        let riff_len = stream.read_u32_le()? as usize;
        if stream.read(4)? != b"WAVE" {
            return Err(FormatError::Wav("RIFF type is not WAVE".into()));
        }
        // The RIFF length counts the type tag we just read.
        let end = riff_len
            .checked_add(8)
            .ok_or_else(|| FormatError::Wav("RIFF length overflows".into()))?;

        let mut fmt: Option<FmtChunk> = None;
        let mut data: Option<PcmData> = None;

        while stream.position() < end {
            let tag = stream.read_array::<4>()?;
            let len = stream.read_u32_le()? as usize;

            match &tag {
                b"fmt " => {
                    if fmt.is_some() {
                        return Err(FormatError::Wav("duplicate fmt chunk".into()));
                    }
                    fmt = Some(read_fmt(&mut stream, len)?);
                }
                b"data" => {
                    let Some(format) = fmt else {
                        return Err(FormatError::Wav("data chunk before fmt chunk".into()));
                    };
                    data = Some(read_data(&mut stream, len, format)?);
                }
                _ => {
                    log::debug!(
                        "Skipping WAV chunk {:?} ({} bytes)",
                        String::from_utf8_lossy(&tag),
                        len
                    );
                    stream.skip(len)?;
                }
            }
        }

        let (Some(format), Some(data)) = (fmt, data) else {
            return Err(FormatError::Wav("missing data chunk".into()));
        };

        Ok(Self {
            data,
            channels: format.channels as usize,
            sample_rate: format.sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Length in frames.
    pub fn length(&self) -> usize {
        let interleaved = match &self.data {
            PcmData::U8(v) => v.len(),
            PcmData::I16(v) => v.len(),
        };
        interleaved / self.channels
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.length() as f64 / self.sample_rate as f64)
    }

    /// Copies frames starting at frame `position` into `buffer`, converting to
    /// `C` channels. A mono buffer receives the mean of every channel.
    ///
    /// Returns the number of frames written, zero at or past the end.
    pub fn get_samples<const C: usize>(&self, position: usize, buffer: &mut [Sample<C>]) -> usize {
        let start = position.min(self.length());
        let frames = buffer.len().min(self.length() - start);
        let ch = self.channels;

        for (i, out) in buffer[..frames].iter_mut().enumerate() {
            let offset = (start + i) * ch;
            *out = match &self.data {
                PcmData::U8(v) => Sample::from_channels(ch, |c| u8_to_f32(v[offset + c])),
                PcmData::I16(v) => Sample::from_channels(ch, |c| i16_to_f32(v[offset + c])),
            };
        }
        frames
    }
}

fn read_fmt(stream: &mut ByteStream<'_>, len: usize) -> Result<FmtChunk, FormatError> {
    if len < 16 {
        return Err(FormatError::Wav(format!("fmt chunk too short ({len} bytes)")));
    }
    let chunk_end = stream.position() + len;

    let format_tag = stream.read_u16_le()?;
    let channels = stream.read_u16_le()?;
    let sample_rate = stream.read_u32_le()?;
    let _byte_rate = stream.read_u32_le()?;
    let _block_align = stream.read_u16_le()?;
    let bits_per_sample = stream.read_u16_le()?;
    stream.seek(chunk_end)?;

    if format_tag != PCM_FORMAT {
        return Err(FormatError::Wav(format!(
            "unsupported format tag {format_tag}, only PCM is supported"
        )));
    }
    if channels == 0 {
        return Err(FormatError::Wav("zero channels".into()));
    }
    if sample_rate == 0 || i32::try_from(sample_rate).is_err() {
        return Err(FormatError::Wav(format!("invalid sample rate {sample_rate}")));
    }
    if bits_per_sample != 8 && bits_per_sample != 16 {
        return Err(FormatError::Wav(format!(
            "unsupported bit width {bits_per_sample}"
        )));
    }

    Ok(FmtChunk {
        channels,
        sample_rate,
        bits_per_sample,
    })
}

fn read_data(stream: &mut ByteStream<'_>, len: usize, fmt: FmtChunk) -> Result<PcmData, FormatError> {
    let frame_size = fmt.channels as usize * (fmt.bits_per_sample as usize / 8);
    if len == 0 {
        return Err(FormatError::Wav("data chunk is empty".into()));
    }
    if len % frame_size != 0 {
        return Err(FormatError::Wav(format!(
            "data length {len} is not a multiple of the {frame_size}-byte frame"
        )));
    }
    if i32::try_from(len).is_err() {
        return Err(FormatError::Wav(format!("data chunk of {len} bytes is too large")));
    }

    let bytes = stream.read(len)?;
    Ok(match fmt.bits_per_sample {
        8 => PcmData::U8(bytes.to_vec()),
        _ => PcmData::I16(
            bytes
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
    })
}
