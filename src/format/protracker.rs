//! Native ProTracker module codec.
//!
//! Reads 31-instrument MOD files tagged `M.K.`, `M!K!`, `FLT4`/`FLT8`,
//! `xCHN` or `xxCH` and renders them with a tick/row sequencer. Channels are
//! panned LRRL like the Amiga's hard-wired outputs, softened so headphones
//! don't get one voice per ear.
//!
//! Supported effects: arpeggio, portamento up/down, tone portamento,
//! vibrato, the two combined slides, sample offset, volume slide, position
//! jump, set volume, pattern break, set speed/tempo, and the fine slides,
//! note cut, note delay and pattern delay of the `E` group.

use super::xmp::{ModuleCodec, ModuleDecoder};
use crate::error::{FormatError, Result};

const HEADER_LEN: usize = 1084;
const ROWS: usize = 64;
const INSTRUMENTS: usize = 31;
const MAX_CHANNELS: usize = 32;

/// PAL Paula clock divided by two: the frequency of period 1.
const PAULA_CLOCK: f64 = 3_546_895.0;
const PERIOD_MIN: u16 = 113;
const PERIOD_MAX: u16 = 856;

const DEFAULT_SPEED: u8 = 6;
const DEFAULT_TEMPO: u8 = 125;

/// How far each channel sits from the centre, 1.0 being hard panned.
const STEREO_SEPARATION: f32 = 0.5;

const VIBRATO_SINE: [u8; 32] = [
    0, 24, 49, 74, 97, 120, 141, 161, 180, 197, 212, 224, 235, 244, 250, 253, 255, 253, 250, 244,
    235, 224, 212, 197, 180, 161, 141, 120, 97, 74, 49, 24,
];

/// Loads ProTracker modules. Registered by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProTrackerCodec;

impl ModuleCodec for ProTrackerCodec {
    fn name(&self) -> &str {
        "protracker"
    }

    fn load(
        &self,
        data: &[u8],
        sample_rate: u32,
    ) -> std::result::Result<Box<dyn ModuleDecoder>, FormatError> {
        if sample_rate == 0 {
            return Err(FormatError::Module("sample rate must be positive".into()));
        }
        let module = Module::parse(data)?;
        Ok(Box::new(ProTrackerModule::new(module, sample_rate)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cell {
    instrument: u8,
    period: u16,
    effect: u8,
    param: u8,
}

impl Cell {
    fn parse(bytes: &[u8]) -> Self {
        Self {
            instrument: (bytes[0] & 0xF0) | (bytes[2] >> 4),
            period: u16::from(bytes[0] & 0x0F) << 8 | u16::from(bytes[1]),
            effect: bytes[2] & 0x0F,
            param: bytes[3],
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Instrument {
    data: Vec<i8>,
    volume: u8,
    /// Finetune as a frequency multiplier.
    tuning: f64,
    loop_start: usize,
    /// Zero when the instrument does not loop.
    loop_end: usize,
}

impl Instrument {
    fn parse(header: &[u8], pcm: &[u8]) -> Self {
        let finetune = (header[24] & 0x0F) as i8;
        let finetune = if finetune > 7 { finetune - 16 } else { finetune };
        let loop_start = u16::from_be_bytes([header[26], header[27]]) as usize * 2;
        let loop_len = u16::from_be_bytes([header[28], header[29]]) as usize * 2;

        let data: Vec<i8> = pcm.iter().map(|&b| b as i8).collect();
        // Loop bounds past the sample data are common; clamp them.
        let loop_end = (loop_start + loop_len).min(data.len());
        let (loop_start, loop_end) = if loop_len > 2 && loop_start < loop_end {
            (loop_start, loop_end)
        } else {
            (0, 0)
        };

        Self {
            data,
            volume: header[25].min(64),
            tuning: 2f64.powf(finetune as f64 / 96.0),
            loop_start,
            loop_end,
        }
    }

    fn looped(&self) -> bool {
        self.loop_end > self.loop_start
    }
}

#[derive(Debug, Clone)]
struct Module {
    channels: usize,
    orders: Vec<u8>,
    restart: usize,
    /// Every pattern, row-major, `channels` cells per row.
    cells: Vec<Cell>,
    instruments: Vec<Instrument>,
}

fn channel_count(tag: &[u8]) -> Option<usize> {
    let count = match tag {
        b"M.K." | b"M!K!" | b"M&K!" | b"FLT4" => 4,
        b"FLT8" | b"OCTA" | b"CD81" => 8,
        [n, b'C', b'H', b'N'] if n.is_ascii_digit() => (n - b'0') as usize,
        [a, b, b'C', b'H'] if a.is_ascii_digit() && b.is_ascii_digit() => {
            ((a - b'0') * 10 + (b - b'0')) as usize
        }
        _ => return None,
    };
    (1..=MAX_CHANNELS).contains(&count).then_some(count)
}

impl Module {
    fn parse(data: &[u8]) -> std::result::Result<Self, FormatError> {
        if data.len() < HEADER_LEN {
            return Err(FormatError::Module("too short for a ProTracker module".into()));
        }
        let channels = channel_count(&data[1080..1084])
            .ok_or_else(|| FormatError::Module("no ProTracker signature".into()))?;

        let song_length = data[950] as usize;
        if !(1..=128).contains(&song_length) {
            return Err(FormatError::Module(format!(
                "invalid song length {song_length}"
            )));
        }
        let table = &data[952..1080];
        let orders = table[..song_length].to_vec();
        // Trackers write 127 here when there is no restart position.
        let restart = match data[951] as usize {
            r if r < song_length => r,
            _ => 0,
        };

        // Patterns past the song length still occupy space in the file.
        let pattern_count = table.iter().copied().max().unwrap_or(0) as usize + 1;
        let cells_end = HEADER_LEN + pattern_count * ROWS * channels * 4;
        let cells = data
            .get(HEADER_LEN..cells_end)
            .ok_or_else(|| FormatError::Module("truncated pattern data".into()))?
            .chunks_exact(4)
            .map(Cell::parse)
            .collect();

        // Sample data follows the patterns; rips are often cut short.
        let mut offset = cells_end;
        let mut instruments = Vec::with_capacity(INSTRUMENTS);
        for header in data[20..20 + INSTRUMENTS * 30].chunks_exact(30) {
            let len = u16::from_be_bytes([header[22], header[23]]) as usize * 2;
            let available = data.len().saturating_sub(offset).min(len);
            let pcm = data.get(offset..offset + available).unwrap_or(&[]);
            instruments.push(Instrument::parse(header, pcm));
            offset += len;
        }

        let title = String::from_utf8_lossy(&data[..20]);
        log::debug!(
            "ProTracker module {:?}: {} channels, {} orders, {} patterns",
            title.trim_end_matches('\0').trim(),
            channels,
            orders.len(),
            pattern_count
        );

        Ok(Self {
            channels,
            orders,
            restart,
            cells,
            instruments,
        })
    }

    fn row(&self, order: usize, row: usize) -> &[Cell] {
        let pattern = self.orders[order] as usize;
        let start = (pattern * ROWS + row) * self.channels;
        &self.cells[start..start + self.channels]
    }

    /// Instruments are numbered from one; zero means none.
    fn instrument(&self, number: usize) -> Option<&Instrument> {
        number.checked_sub(1).and_then(|i| self.instruments.get(i))
    }
}

#[derive(Debug, Clone)]
struct Channel {
    instrument: usize,
    playing: bool,
    /// Position in the instrument's data, in sample frames.
    position: f64,
    /// Instrument frames per output frame for the current tick.
    step: f64,
    period: u16,
    volume: u8,
    effect: u8,
    param: u8,
    porta_target: u16,
    porta_speed: u8,
    vibrato_speed: u8,
    vibrato_depth: u8,
    vibrato_pos: u8,
    offset: u8,
    delayed: Option<Cell>,
    gains: (f32, f32),
}

impl Channel {
    fn new(index: usize) -> Self {
        let near = 0.5 + STEREO_SEPARATION / 2.0;
        let gains = match index % 4 {
            0 | 3 => (near, 1.0 - near),
            _ => (1.0 - near, near),
        };
        Self {
            instrument: 0,
            playing: false,
            position: 0.0,
            step: 0.0,
            period: 0,
            volume: 0,
            effect: 0,
            param: 0,
            porta_target: 0,
            porta_speed: 0,
            vibrato_speed: 0,
            vibrato_depth: 0,
            vibrato_pos: 0,
            offset: 0,
            delayed: None,
            gains,
        }
    }

    fn start_row(&mut self, cell: Cell, module: &Module, seq: &mut Sequencer) {
        self.effect = cell.effect;
        self.param = cell.param;
        let (x, y) = (cell.param >> 4, cell.param & 0x0F);

        if cell.effect == 0xE && x == 0xD && y > 0 {
            self.delayed = Some(cell);
        } else {
            self.trigger(cell, module);
        }

        match cell.effect {
            0x3 if cell.param > 0 => self.porta_speed = cell.param,
            0x4 => {
                if x > 0 {
                    self.vibrato_speed = x;
                }
                if y > 0 {
                    self.vibrato_depth = y;
                }
            }
            0xB => seq.jump_order = Some(cell.param as usize),
            0xC => self.volume = cell.param.min(64),
            // The break row is stored as two decimal digits.
            0xD => seq.break_row = Some(((x * 10 + y) as usize).min(ROWS - 1)),
            0xE => match x {
                0x1 if self.period > 0 => {
                    self.period = self.period.saturating_sub(y as u16).max(PERIOD_MIN)
                }
                0x2 if self.period > 0 => self.period = (self.period + y as u16).min(PERIOD_MAX),
                0xA => self.volume = (self.volume + y).min(64),
                0xB => self.volume = self.volume.saturating_sub(y),
                0xC if y == 0 => self.volume = 0,
                0xE if seq.pattern_delay == 0 => seq.pattern_delay = y,
                _ => {}
            },
            0xF => match cell.param {
                0 => {}
                p if p < 32 => seq.speed = p,
                p => seq.tempo = p,
            },
            _ => {}
        }
    }

    fn trigger(&mut self, cell: Cell, module: &Module) {
        if cell.instrument > 0 {
            if let Some(instrument) = module.instrument(cell.instrument as usize) {
                self.instrument = cell.instrument as usize;
                self.volume = instrument.volume;
            }
        }
        if cell.period == 0 {
            return;
        }
        if matches!(cell.effect, 0x3 | 0x5) {
            self.porta_target = cell.period;
            return;
        }

        self.period = cell.period;
        self.vibrato_pos = 0;
        self.position = 0.0;
        if cell.effect == 0x9 {
            if cell.param > 0 {
                self.offset = cell.param;
            }
            self.position = self.offset as f64 * 256.0;
        }
        self.playing = module
            .instrument(self.instrument)
            .is_some_and(|i| self.position < i.data.len() as f64);
    }

    fn update_tick(&mut self, tick: u16, module: &Module) {
        let (x, y) = (self.param >> 4, self.param & 0x0F);
        match self.effect {
            0x1 if self.period > 0 => {
                self.period = self
                    .period
                    .saturating_sub(self.param as u16)
                    .max(PERIOD_MIN)
            }
            0x2 if self.period > 0 => {
                self.period = (self.period + self.param as u16).min(PERIOD_MAX)
            }
            0x3 => self.tone_portamento(),
            0x4 => self.vibrato_pos = self.vibrato_pos.wrapping_add(self.vibrato_speed),
            0x5 => {
                self.tone_portamento();
                self.volume_slide();
            }
            0x6 => {
                self.vibrato_pos = self.vibrato_pos.wrapping_add(self.vibrato_speed);
                self.volume_slide();
            }
            0xA => self.volume_slide(),
            0xE if x == 0xC && tick == y as u16 => self.volume = 0,
            0xE if x == 0xD && tick == y as u16 => {
                if let Some(cell) = self.delayed.take() {
                    self.trigger(cell, module);
                }
            }
            _ => {}
        }
    }

    fn tone_portamento(&mut self) {
        if self.period == 0 || self.porta_target == 0 {
            return;
        }
        let speed = self.porta_speed as u16;
        self.period = if self.period < self.porta_target {
            (self.period + speed).min(self.porta_target)
        } else {
            self.period.saturating_sub(speed).max(self.porta_target)
        };
    }

    fn volume_slide(&mut self) {
        let (up, down) = (self.param >> 4, self.param & 0x0F);
        self.volume = if up > 0 {
            (self.volume + up).min(64)
        } else {
            self.volume.saturating_sub(down)
        };
    }

    fn update_step(&mut self, tick: u16, module: &Module, sample_rate: u32) {
        let Some(instrument) = module.instrument(self.instrument) else {
            self.step = 0.0;
            return;
        };
        if self.period == 0 {
            self.step = 0.0;
            return;
        }

        let mut period = self.period as f64;
        if matches!(self.effect, 0x4 | 0x6) {
            let depth = VIBRATO_SINE[(self.vibrato_pos & 31) as usize] as f64
                * self.vibrato_depth as f64
                / 128.0;
            period += if self.vibrato_pos & 32 == 0 { depth } else { -depth };
        }

        let mut frequency = PAULA_CLOCK / period.max(1.0) * instrument.tuning;
        if self.effect == 0x0 && self.param != 0 {
            let semitones = match tick % 3 {
                0 => 0,
                1 => self.param >> 4,
                _ => self.param & 0x0F,
            };
            frequency *= 2f64.powf(semitones as f64 / 12.0);
        }
        self.step = frequency / sample_rate as f64;
    }

    /// Linearly interpolated value at the current position, scaled by volume.
    fn value(&self, instrument: &Instrument) -> f32 {
        let index = self.position as usize;
        let frac = (self.position - index as f64) as f32;
        let next = if instrument.looped() && index + 1 >= instrument.loop_end {
            instrument.loop_start
        } else {
            index + 1
        };
        let a = instrument.data.get(index).copied().unwrap_or(0) as f32;
        let b = instrument.data.get(next).copied().unwrap_or(0) as f32;
        (a + (b - a) * frac) / 128.0 * self.volume as f32 / 64.0
    }

    fn advance(&mut self, instrument: &Instrument, frames: usize) {
        self.position += self.step * frames as f64;
        if instrument.looped() {
            let end = instrument.loop_end as f64;
            if self.position >= end {
                let start = instrument.loop_start as f64;
                self.position = start + (self.position - start) % (end - start);
            }
        } else if self.position >= instrument.data.len() as f64 {
            self.playing = false;
        }
    }
}

#[derive(Debug, Clone)]
struct Sequencer {
    order: usize,
    row: usize,
    /// Tick within the current row, pattern delay included.
    tick: u16,
    speed: u8,
    tempo: u8,
    pattern_delay: u8,
    jump_order: Option<usize>,
    break_row: Option<usize>,
}

impl Sequencer {
    fn new() -> Self {
        Self {
            order: 0,
            row: 0,
            tick: 0,
            speed: DEFAULT_SPEED,
            tempo: DEFAULT_TEMPO,
            pattern_delay: 0,
            jump_order: None,
            break_row: None,
        }
    }

    fn row_ticks(&self) -> u16 {
        self.speed as u16 * (1 + self.pattern_delay as u16)
    }

    fn advance(&mut self, module: &Module) {
        let (order, row) = match (self.jump_order.take(), self.break_row.take()) {
            (Some(order), row) => (order, row.unwrap_or(0)),
            (None, Some(row)) => (self.order + 1, row),
            (None, None) if self.row + 1 < ROWS => (self.order, self.row + 1),
            (None, None) => (self.order + 1, 0),
        };
        self.order = if order < module.orders.len() {
            order
        } else {
            module.restart
        };
        self.row = row;
    }
}

/// Everything that changes while a module plays.
#[derive(Debug, Clone)]
struct Playback {
    channels: Vec<Channel>,
    seq: Sequencer,
    /// Output frame at which each (order, row) was first entered. A row
    /// entered twice means the song has looped.
    row_starts: Vec<Option<u64>>,
    tick_remaining: usize,
    tick_carry: f64,
    frames_played: u64,
}

impl Playback {
    fn new(module: &Module) -> Self {
        Self {
            channels: (0..module.channels).map(Channel::new).collect(),
            seq: Sequencer::new(),
            row_starts: vec![None; module.orders.len() * ROWS],
            tick_remaining: 0,
            tick_carry: 0.0,
            frames_played: 0,
        }
    }

    /// Starts the next tick. Returns false once the song has ended and may
    /// not loop.
    fn next_tick(&mut self, module: &Module, sample_rate: u32, looping: bool) -> bool {
        if self.seq.tick == 0 && !self.enter_row(looping) {
            return false;
        }

        let tick = self.seq.tick;
        if tick == 0 {
            let row = module.row(self.seq.order, self.seq.row);
            for (channel, cell) in self.channels.iter_mut().zip(row) {
                channel.start_row(*cell, module, &mut self.seq);
            }
        } else {
            for channel in &mut self.channels {
                channel.update_tick(tick, module);
            }
        }
        for channel in &mut self.channels {
            channel.update_step(tick, module, sample_rate);
        }

        // 125 BPM is 50 ticks a second.
        let exact = sample_rate as f64 * 2.5 / self.seq.tempo as f64 + self.tick_carry;
        let frames = exact.floor();
        self.tick_carry = exact - frames;
        self.tick_remaining = (frames as usize).max(1);

        self.seq.tick += 1;
        if self.seq.tick >= self.seq.row_ticks() {
            self.seq.tick = 0;
            self.seq.pattern_delay = 0;
            self.seq.advance(module);
        }
        true
    }

    fn enter_row(&mut self, looping: bool) -> bool {
        let index = self.seq.order * ROWS + self.seq.row;
        if let Some(start) = self.row_starts[index] {
            if !looping {
                return false;
            }
            log::trace!("Module looped to order {}", self.seq.order);
            self.row_starts.fill(None);
            self.frames_played = start;
        }
        self.row_starts[index] = Some(self.frames_played);
        true
    }

    fn mix(&mut self, module: &Module, out: &mut [i16], gain: f32) {
        for frame in out.chunks_exact_mut(2) {
            let (mut left, mut right) = (0.0f32, 0.0f32);
            for channel in &mut self.channels {
                if !channel.playing {
                    continue;
                }
                let Some(instrument) = module.instrument(channel.instrument) else {
                    continue;
                };
                let value = channel.value(instrument);
                left += value * channel.gains.0;
                right += value * channel.gains.1;
                channel.advance(instrument, 1);
            }
            frame[0] = to_i16(left * gain);
            frame[1] = to_i16(right * gain);
        }
        let frames = out.len() / 2;
        self.tick_remaining -= frames;
        self.frames_played += frames as u64;
    }

    fn skip(&mut self, module: &Module, frames: usize) {
        for channel in &mut self.channels {
            if let (true, Some(instrument)) =
                (channel.playing, module.instrument(channel.instrument))
            {
                channel.advance(instrument, frames);
            }
        }
        self.tick_remaining -= frames;
        self.frames_played += frames as u64;
    }
}

fn to_i16(value: f32) -> i16 {
    (value * 32768.0).clamp(-32768.0, 32767.0) as i16
}

struct ProTrackerModule {
    module: Module,
    sample_rate: u32,
    playback: Playback,
    /// Keeps the summed channels inside full scale.
    gain: f32,
    duration_frames: u64,
}

impl ProTrackerModule {
    fn new(module: Module, sample_rate: u32) -> Self {
        let duration_frames = measure(&module, sample_rate);
        Self {
            playback: Playback::new(&module),
            gain: (2.0 / module.channels as f32).min(1.0),
            module,
            sample_rate,
            duration_frames,
        }
    }
}

/// Runs the sequencer without mixing until the song first loops.
fn measure(module: &Module, sample_rate: u32) -> u64 {
    let mut playback = Playback::new(module);
    while playback.next_tick(module, sample_rate, false) {
        playback.frames_played += playback.tick_remaining as u64;
    }
    playback.frames_played
}

impl ModuleDecoder for ProTrackerModule {
    fn play_buffer(&mut self, out: &mut [i16], looping: bool) -> Result<usize> {
        let wanted = out.len() / 2;
        let mut rendered = 0;
        while rendered < wanted {
            if self.playback.tick_remaining == 0
                && !self
                    .playback
                    .next_tick(&self.module, self.sample_rate, looping)
            {
                break;
            }
            let frames = (wanted - rendered).min(self.playback.tick_remaining);
            self.playback.mix(
                &self.module,
                &mut out[rendered * 2..(rendered + frames) * 2],
                self.gain,
            );
            rendered += frames;
        }
        Ok(rendered)
    }

    /// Replays the song silently from the top up to `ms`.
    fn seek_time(&mut self, ms: u32) -> Result<()> {
        let target = ms as u64 * self.sample_rate as u64 / 1000;
        self.playback = Playback::new(&self.module);
        while self.playback.frames_played < target {
            if self.playback.tick_remaining == 0
                && !self
                    .playback
                    .next_tick(&self.module, self.sample_rate, false)
            {
                break;
            }
            let frames = (target - self.playback.frames_played)
                .min(self.playback.tick_remaining as u64) as usize;
            self.playback.skip(&self.module, frames);
        }
        Ok(())
    }

    fn position_ms(&self) -> u32 {
        (self.playback.frames_played * 1000 / self.sample_rate as u64) as u32
    }

    fn duration_ms(&self) -> Option<u32> {
        Some((self.duration_frames * 1000 / self.sample_rate as u64) as u32)
    }
}
