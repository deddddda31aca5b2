//! Ogg Vorbis backend decoding from memory through Symphonia.
//!
//! Loop points come from the vendor comment convention `LOOPPOINT=<frames>`
//! or `LOOPMS=<milliseconds>`. The first well-formed tag in file order wins.

use crate::error::{FormatError, Result, WadMixError};
use crate::sample::Sample;
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_VORBIS, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision};
use symphonia::core::probe::Hint;

const OGG_MAGIC: &[u8; 4] = b"OggS";

/// Longest Vorbis packet duration: half of the largest block size. Seeks land
/// this far early because the packet the demuxer stops on decodes to nothing
/// after a decoder reset.
const SEEK_PREROLL: u64 = 4096;

/// Streaming Vorbis decoder over an owned, in-memory Ogg file.
pub struct Ogg {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
    total_frames: Option<u64>,
    loop_point: Option<u64>,
    /// Frame index of the next frame handed out.
    position: u64,
    /// Last decoded packet, interleaved. Reused across packets.
    pending: Option<SampleBuffer<f32>>,
    pending_capacity: u64,
    pending_channels: usize,
    pending_frames: usize,
    pending_pos: usize,
    /// Frames still to discard after an accurate seek.
    skip_frames: u64,
    /// Frame a seek asked for, until the first decoded packet after it.
    seek_target: Option<u64>,
}

impl Ogg {
    /// Whether `bytes` start with the Ogg capture pattern. Lets callers skip
    /// copying data that cannot be Ogg.
    pub fn sniff(bytes: &[u8]) -> bool {
        bytes.starts_with(OGG_MAGIC)
    }

    pub fn new(bytes: Vec<u8>) -> std::result::Result<Self, FormatError> {
        if !Self::sniff(&bytes) {
            return Err(FormatError::Ogg("missing OggS capture pattern".into()));
        }

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("ogg");

        let mut opened = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| FormatError::Ogg(format!("failed to open stream: {e}")))?;

        let mut comments: Vec<(String, String)> = Vec::new();
        if let Some(metadata) = opened.metadata.get() {
            if let Some(revision) = metadata.current() {
                collect_comments(revision, &mut comments);
            }
        }
        let mut format = opened.format;
        {
            let metadata = format.metadata();
            if let Some(revision) = metadata.current() {
                collect_comments(revision, &mut comments);
            }
        }

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec == CODEC_TYPE_VORBIS)
            .ok_or_else(|| FormatError::Ogg("no Vorbis stream".into()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .filter(|&rate| rate > 0)
            .ok_or_else(|| FormatError::Ogg("sample rate not found".into()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .filter(|&c| c > 0)
            .ok_or_else(|| FormatError::Ogg("channel layout not found".into()))?;
        let total_frames = track.codec_params.n_frames;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| FormatError::Ogg(format!("failed to create decoder: {e}")))?;

        let mut loop_point = parse_loop_point(
            comments.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            sample_rate,
        );
        if let (Some(point), Some(total)) = (loop_point, total_frames) {
            if point >= total {
                log::warn!("Ignoring loop point {point} past the end of a {total}-frame stream");
                loop_point = None;
            }
        }

        log::debug!(
            "Opened Ogg Vorbis stream: {} Hz, {} channels, {:?} frames, loop point {:?}",
            sample_rate,
            channels,
            total_frames,
            loop_point
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
            total_frames,
            loop_point,
            position: 0,
            pending: None,
            pending_capacity: 0,
            pending_channels: 0,
            pending_frames: 0,
            pending_pos: 0,
            skip_frames: 0,
            seek_target: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frame index of the next frame `get_samples` returns.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn loop_point(&self) -> Option<u64> {
        self.loop_point
    }

    pub fn set_loop_point(&mut self, frame: Option<u64>) {
        self.loop_point = frame;
    }

    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    pub fn duration(&self) -> Option<Duration> {
        self.total_frames
            .map(|frames| Duration::from_secs_f64(frames as f64 / self.sample_rate as f64))
    }

    /// Decodes up to `buffer.len()` frames. Zero means end of stream.
    pub fn get_samples<const C: usize>(&mut self, buffer: &mut [Sample<C>]) -> Result<usize> {
        let mut written = 0;

        while written < buffer.len() {
            if self.pending_pos >= self.pending_frames {
                if !self.decode_packet()? {
                    break;
                }
                continue;
            }

            let available = self.pending_frames - self.pending_pos;
            if self.skip_frames > 0 {
                let skipped = (self.skip_frames.min(available as u64)) as usize;
                self.pending_pos += skipped;
                self.skip_frames -= skipped as u64;
                continue;
            }

            let Some(pending) = self.pending.as_ref() else {
                break;
            };
            let samples = pending.samples();
            let ch = self.pending_channels;
            let count = available.min(buffer.len() - written);
            for (i, out) in buffer[written..written + count].iter_mut().enumerate() {
                let offset = (self.pending_pos + i) * ch;
                *out = Sample::from_frame(&samples[offset..offset + ch]);
            }
            self.pending_pos += count;
            written += count;
        }

        self.position += written as u64;
        Ok(written)
    }

    /// Moves to an absolute frame. Positions past the end clamp to the end.
    pub fn seek(&mut self, frame: u64) -> Result<()> {
        let target = self.total_frames.map_or(frame, |total| frame.min(total));
        let seek_ts = target.saturating_sub(SEEK_PREROLL);
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: seek_ts,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| WadMixError::Decode(format!("seek to frame {target} failed: {e}")))?;

        self.decoder.reset();
        self.seek_target = Some(target);
        self.skip_frames = 0;
        self.pending_frames = 0;
        self.pending_pos = 0;
        self.position = target;
        Ok(())
    }

    /// Decodes the next packet of our track into `pending`. Returns `false` at
    /// the end of the stream.
    fn decode_packet(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                // A chained stream with new headers; treat it as the end.
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => {
                    return Err(WadMixError::Decode(format!("error reading packet: {e}")));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }
            let packet_ts = packet.ts();

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping corrupt Vorbis packet: {e}");
                    continue;
                }
                Err(e) => {
                    return Err(WadMixError::Decode(format!("error decoding packet: {e}")));
                }
            };
            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            let channels = spec.channels.count();
            let reuse = self.pending.is_some()
                && self.pending_capacity >= capacity
                && self.pending_channels == channels;
            if !reuse {
                self.pending = Some(SampleBuffer::new(capacity, spec));
                self.pending_capacity = capacity;
                self.pending_channels = channels;
            }

            let Some(pending) = self.pending.as_mut() else {
                return Ok(false);
            };
            pending.copy_interleaved_ref(decoded);
            self.pending_frames = pending.samples().len() / channels;
            self.pending_pos = 0;

            if let Some(target) = self.seek_target.take() {
                if packet_ts > target {
                    log::debug!("Seek to frame {target} resumed late at frame {packet_ts}");
                    self.position = packet_ts;
                }
                self.skip_frames = target.saturating_sub(packet_ts);
            }
            return Ok(true);
        }
    }
}

fn collect_comments(revision: &MetadataRevision, out: &mut Vec<(String, String)>) {
    for tag in revision.tags() {
        out.push((tag.key.clone(), tag.value.to_string()));
    }
}

/// Finds the loop point, in frames, among Vorbis comments given in file
/// order.
///
/// `LOOPPOINT` is taken as a frame index and `LOOPMS` as milliseconds at
/// `sample_rate`. Keys match case-insensitively. Values that do not parse as
/// non-negative integers are skipped and the search continues.
pub fn parse_loop_point<'a, I>(comments: I, sample_rate: u32) -> Option<u64>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (key, value) in comments {
        let value = value.trim();
        if key.eq_ignore_ascii_case("LOOPPOINT") {
            match value.parse::<u64>() {
                Ok(frame) => return Some(frame),
                Err(_) => log::warn!("Ignoring malformed LOOPPOINT={value}"),
            }
        } else if key.eq_ignore_ascii_case("LOOPMS") {
            let frame = value
                .parse::<u64>()
                .ok()
                .and_then(|ms| ms.checked_mul(sample_rate as u64))
                .map(|scaled| scaled / 1000);
            match frame {
                Some(frame) => return Some(frame),
                None => log::warn!("Ignoring malformed LOOPMS={value}"),
            }
        }
    }
    None
}
