//! Native YM chiptune codec: Atari ST and Amstrad CPC register dumps played
//! through a YM2149 emulation.
//!
//! Accepts uncompressed `YM2!`, `YM3!`, `YM3b`, `YM5!` and `YM6!` files.
//! Most YM files in the wild are LHA-packed and have to be depacked first.
//! Digidrums and the YM5/YM6 special effects are not reproduced.

use super::gme::{ChipCodec, ChipEmulator};
use crate::error::{FormatError, Result, WadMixError};
use crate::io::{ByteStream, StreamError};

const ATARI_ST_CLOCK: u32 = 2_000_000;
const DEFAULT_FRAME_RATE: u16 = 50;
/// Registers stored per frame by YM2 and YM3.
const OLD_FRAME_REGISTERS: usize = 14;
/// Registers stored per frame by YM5 and YM6.
const FRAME_REGISTERS: usize = 16;
/// Register 13 holding this value leaves the envelope running.
const ENVELOPE_UNCHANGED: u8 = 0xFF;

/// Output level for each 4-bit volume, roughly 3 dB apart.
const VOLUME_TABLE: [f32; 16] = [
    0.0, 0.0137, 0.0205, 0.0291, 0.0423, 0.0618, 0.0847, 0.1369, 0.1691, 0.2647, 0.3527, 0.4499,
    0.5704, 0.6873, 0.8482, 1.0,
];

/// Loads YM register dumps. Registered by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct YmCodec;

impl ChipCodec for YmCodec {
    fn name(&self) -> &str {
        "ym"
    }

    fn open(
        &self,
        data: &[u8],
        sample_rate: u32,
    ) -> std::result::Result<Box<dyn ChipEmulator>, FormatError> {
        if sample_rate == 0 {
            return Err(FormatError::Chiptune("sample rate must be positive".into()));
        }
        let song = Song::parse(data)?;
        log::debug!(
            "YM song: {} frames at {} Hz, {} Hz clock",
            song.frames.len(),
            song.frame_rate,
            song.clock
        );
        Ok(Box::new(YmPlayer::new(song, sample_rate)))
    }
}

fn stream_error(e: StreamError) -> FormatError {
    FormatError::Chiptune(format!("truncated YM file: {e}"))
}

#[derive(Debug, Clone)]
struct Song {
    frames: Vec<[u8; FRAME_REGISTERS]>,
    clock: u32,
    frame_rate: u16,
    loop_frame: usize,
}

impl Song {
    fn parse(data: &[u8]) -> std::result::Result<Self, FormatError> {
        if data.get(2..5) == Some(b"-lh".as_slice()) {
            return Err(FormatError::Chiptune(
                "LHA-packed YM files must be depacked first".into(),
            ));
        }
        match data.get(..4) {
            Some(b"YM2!" | b"YM3!") => Self::parse_old(&data[4..], 0),
            Some(b"YM3b") => {
                let body = data
                    .get(4..data.len().saturating_sub(4))
                    .ok_or_else(|| FormatError::Chiptune("truncated YM3b file".into()))?;
                let tail = &data[data.len() - 4..];
                let loop_frame = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
                Self::parse_old(body, loop_frame as usize)
            }
            Some(b"YM5!" | b"YM6!") => Self::parse_leonard(data),
            _ => Err(FormatError::Chiptune("not a YM file".into())),
        }
    }

    /// YM2/YM3: fourteen interleaved register streams and nothing else.
    fn parse_old(body: &[u8], loop_frame: usize) -> std::result::Result<Self, FormatError> {
        let count = body.len() / OLD_FRAME_REGISTERS;
        if count == 0 {
            return Err(FormatError::Chiptune("YM file holds no frames".into()));
        }
        let frames = (0..count)
            .map(|f| {
                let mut regs = [0u8; FRAME_REGISTERS];
                for (r, reg) in regs.iter_mut().take(OLD_FRAME_REGISTERS).enumerate() {
                    *reg = body[r * count + f];
                }
                regs
            })
            .collect();
        Ok(Self {
            frames,
            clock: ATARI_ST_CLOCK,
            frame_rate: DEFAULT_FRAME_RATE,
            loop_frame: if loop_frame < count { loop_frame } else { 0 },
        })
    }

    /// YM5/YM6: big-endian header, digidrums, three strings, then sixteen
    /// registers per frame, interleaved or not.
    fn parse_leonard(data: &[u8]) -> std::result::Result<Self, FormatError> {
        let mut stream = ByteStream::new(data);
        stream.skip(4).map_err(stream_error)?;
        if stream.read(8).map_err(stream_error)? != b"LeOnArD!" {
            return Err(FormatError::Chiptune("missing LeOnArD! check string".into()));
        }
        let count = stream.read_u32_be().map_err(stream_error)? as usize;
        let attributes = stream.read_u32_be().map_err(stream_error)?;
        let drums = stream.read_u16_be().map_err(stream_error)?;
        let clock = stream.read_u32_be().map_err(stream_error)?;
        let frame_rate = stream.read_u16_be().map_err(stream_error)?;
        let loop_frame = stream.read_u32_be().map_err(stream_error)? as usize;
        let extra = stream.read_u16_be().map_err(stream_error)?;
        stream.skip(extra as usize).map_err(stream_error)?;
        for _ in 0..drums {
            let size = stream.read_u32_be().map_err(stream_error)?;
            stream.skip(size as usize).map_err(stream_error)?;
        }

        let name = stream.read_cstr().map_err(stream_error)?;
        let author = stream.read_cstr().map_err(stream_error)?;
        stream.read_cstr().map_err(stream_error)?;
        log::debug!(
            "YM song {:?} by {:?}",
            String::from_utf8_lossy(name),
            String::from_utf8_lossy(author)
        );

        if count == 0 {
            return Err(FormatError::Chiptune("YM file holds no frames".into()));
        }
        if clock == 0 || frame_rate == 0 {
            return Err(FormatError::Chiptune(format!(
                "invalid timing: {clock} Hz clock, {frame_rate} Hz frames"
            )));
        }
        let len = count
            .checked_mul(FRAME_REGISTERS)
            .ok_or_else(|| FormatError::Chiptune("frame count overflows".into()))?;
        let body = stream.read(len).map_err(stream_error)?;

        let interleaved = attributes & 1 != 0;
        let frames = (0..count)
            .map(|f| {
                let mut regs = [0u8; FRAME_REGISTERS];
                for (r, reg) in regs.iter_mut().enumerate() {
                    *reg = if interleaved {
                        body[r * count + f]
                    } else {
                        body[f * FRAME_REGISTERS + r]
                    };
                }
                regs
            })
            .collect();

        Ok(Self {
            frames,
            clock,
            frame_rate,
            loop_frame: if loop_frame < count { loop_frame } else { 0 },
        })
    }
}

/// Register-level YM2149: three square-wave tones, a noise generator and a
/// shared envelope, mixed to stereo as A left, B centre, C right.
#[derive(Debug, Clone)]
struct Ym2149 {
    regs: [u8; 14],
    /// Chip ticks (clock / 8) per output frame.
    ticks_per_frame: f64,
    tone_count: [f64; 3],
    tone_high: [bool; 3],
    noise_count: f64,
    noise_lfsr: u32,
    noise_high: bool,
    env_count: f64,
    env_step: i8,
    env_attack: u8,
    env_hold: bool,
    env_alternate: bool,
    env_holding: bool,
    /// DC blocker state per side: last input, last output.
    dc: [(f32, f32); 2],
}

impl Ym2149 {
    fn new(clock: u32, sample_rate: u32) -> Self {
        Self {
            regs: [0; 14],
            ticks_per_frame: clock as f64 / 8.0 / sample_rate as f64,
            tone_count: [0.0; 3],
            tone_high: [false; 3],
            noise_count: 0.0,
            noise_lfsr: 1,
            noise_high: false,
            env_count: 0.0,
            env_step: 0,
            env_attack: 0,
            env_hold: true,
            env_alternate: false,
            env_holding: true,
            dc: [(0.0, 0.0); 2],
        }
    }

    fn write(&mut self, reg: usize, value: u8) {
        let value = match reg {
            1 | 3 | 5 | 13 => value & 0x0F,
            6 | 8 | 9 | 10 => value & 0x1F,
            7 => value & 0x3F,
            _ => value,
        };
        if let Some(slot) = self.regs.get_mut(reg) {
            *slot = value;
        }
        if reg == 13 {
            self.restart_envelope(value);
        }
    }

    fn restart_envelope(&mut self, shape: u8) {
        self.env_attack = if shape & 0x04 != 0 { 0x0F } else { 0x00 };
        if shape & 0x08 == 0 {
            // Shapes 0-7 run once and hold at zero.
            self.env_hold = true;
            self.env_alternate = self.env_attack != 0;
        } else {
            self.env_hold = shape & 0x01 != 0;
            self.env_alternate = shape & 0x02 != 0;
        }
        self.env_step = 0x0F;
        self.env_holding = false;
        self.env_count = 0.0;
    }

    fn env_level(&self) -> u8 {
        (self.env_step as u8 & 0x0F) ^ self.env_attack
    }

    fn tone_period(&self, channel: usize) -> f64 {
        let period =
            u16::from(self.regs[channel * 2 + 1]) << 8 | u16::from(self.regs[channel * 2]);
        period.max(1) as f64
    }

    fn step_envelope(&mut self) {
        if self.env_holding {
            return;
        }
        self.env_step -= 1;
        if self.env_step < 0 {
            if self.env_hold {
                if self.env_alternate {
                    self.env_attack ^= 0x0F;
                }
                self.env_holding = true;
                self.env_step = 0;
            } else {
                if self.env_alternate {
                    self.env_attack ^= 0x0F;
                }
                self.env_step &= 0x0F;
            }
        }
    }

    fn render(&mut self) -> (f32, f32) {
        let ticks = self.ticks_per_frame;

        for channel in 0..3 {
            let period = self.tone_period(channel);
            self.tone_count[channel] += ticks;
            let toggles = (self.tone_count[channel] / period).floor();
            self.tone_count[channel] -= toggles * period;
            if toggles as u64 % 2 == 1 {
                self.tone_high[channel] = !self.tone_high[channel];
            }
        }

        // The noise LFSR shifts at half the tone rate.
        let noise_period = (self.regs[6].max(1) as f64) * 2.0;
        self.noise_count += ticks;
        while self.noise_count >= noise_period {
            self.noise_count -= noise_period;
            let bit = (self.noise_lfsr ^ (self.noise_lfsr >> 3)) & 1;
            self.noise_lfsr = (self.noise_lfsr >> 1) | (bit << 16);
            self.noise_high = self.noise_lfsr & 1 != 0;
        }

        // Sixteen envelope steps per 256 * period clocks.
        let env_period =
            (u16::from(self.regs[12]) << 8 | u16::from(self.regs[11])).max(1) as f64 * 2.0;
        self.env_count += ticks;
        while self.env_count >= env_period {
            self.env_count -= env_period;
            self.step_envelope();
        }

        let mixer = self.regs[7];
        let mut levels = [0.0f32; 3];
        for (channel, level) in levels.iter_mut().enumerate() {
            let tone_off = mixer & (1 << channel) != 0;
            let noise_off = mixer & (8 << channel) != 0;
            let gate = (self.tone_high[channel] || tone_off) && (self.noise_high || noise_off);
            if gate {
                let volume = self.regs[8 + channel];
                let index = if volume & 0x10 != 0 {
                    self.env_level()
                } else {
                    volume & 0x0F
                };
                *level = VOLUME_TABLE[index as usize];
            }
        }

        let left = (levels[0] + levels[1] * 0.5) / 1.5;
        let right = (levels[2] + levels[1] * 0.5) / 1.5;
        (self.block_dc(0, left), self.block_dc(1, right))
    }

    /// The chip only swings between zero and the channel level; recentre it.
    fn block_dc(&mut self, side: usize, input: f32) -> f32 {
        let (last_in, last_out) = self.dc[side];
        let output = input - last_in + 0.995 * last_out;
        self.dc[side] = (input, output);
        output
    }
}

struct YmPlayer {
    song: Song,
    sample_rate: u32,
    chip: Ym2149,
    /// Next frame to load into the chip.
    frame: usize,
    frame_remaining: usize,
    frame_carry: f64,
    played: u64,
    ended: bool,
}

impl YmPlayer {
    fn new(song: Song, sample_rate: u32) -> Self {
        Self {
            chip: Ym2149::new(song.clock, sample_rate),
            song,
            sample_rate,
            frame: 0,
            frame_remaining: 0,
            frame_carry: 0.0,
            played: 0,
            ended: false,
        }
    }

    fn reset(&mut self) {
        self.chip = Ym2149::new(self.song.clock, self.sample_rate);
        self.frame = 0;
        self.frame_remaining = 0;
        self.frame_carry = 0.0;
        self.played = 0;
        self.ended = false;
    }

    fn frame_len(&self) -> f64 {
        self.sample_rate as f64 / self.song.frame_rate as f64
    }

    fn load_frame(&mut self) {
        if self.frame >= self.song.frames.len() {
            self.frame = self.song.loop_frame;
        }
        let regs = self.song.frames[self.frame];
        for (reg, &value) in regs.iter().take(13).enumerate() {
            self.chip.write(reg, value);
        }
        if regs[13] != ENVELOPE_UNCHANGED {
            self.chip.write(13, regs[13]);
        }
        self.frame += 1;

        let exact = self.frame_len() + self.frame_carry;
        let samples = exact.floor();
        self.frame_carry = exact - samples;
        self.frame_remaining = (samples as usize).max(1);
    }
}

impl ChipEmulator for YmPlayer {
    fn track_count(&self) -> usize {
        1
    }

    fn start_track(&mut self, index: usize) -> Result<()> {
        if index != 0 {
            return Err(WadMixError::Decode(format!(
                "YM files hold a single track, not track {index}"
            )));
        }
        self.reset();
        Ok(())
    }

    fn play(&mut self, out: &mut [i16]) -> Result<()> {
        for frame in out.chunks_exact_mut(2) {
            if self.frame_remaining == 0 {
                self.load_frame();
            }
            let (left, right) = self.chip.render();
            frame[0] = (left * 32767.0).clamp(-32768.0, 32767.0) as i16;
            frame[1] = (right * 32767.0).clamp(-32768.0, 32767.0) as i16;

            self.frame_remaining -= 1;
            self.played += 1;
            if self.frame_remaining == 0 && self.frame >= self.song.frames.len() {
                self.ended = true;
            }
        }
        Ok(())
    }

    fn track_ended(&self) -> bool {
        self.ended
    }

    /// Jumps to the frame holding `ms`, restoring the last envelope shape
    /// written before it.
    fn seek_ms(&mut self, ms: u64) -> Result<()> {
        let target = ms * self.sample_rate as u64 / 1000;
        let frame = ((target as f64 / self.frame_len()) as usize).min(self.song.frames.len());
        self.reset();
        if let Some(shape) = self.song.frames[..frame]
            .iter()
            .rev()
            .map(|regs| regs[13])
            .find(|&shape| shape != ENVELOPE_UNCHANGED)
        {
            self.chip.write(13, shape);
        }
        self.frame = frame;
        self.played = target;
        self.ended = frame >= self.song.frames.len();
        Ok(())
    }

    fn tell_ms(&self) -> u64 {
        self.played * 1000 / self.sample_rate as u64
    }

    fn track_length_ms(&self) -> Option<u64> {
        Some(self.song.frames.len() as u64 * 1000 / self.song.frame_rate as u64)
    }
}
