//! Streaming linear resampler that normalizes any source to the native rate.

use crate::NATIVE_SAMPLE_RATE;
use crate::sample::Sample;
use crate::source::{BoxedSource, Source};

/// Number of upstream frames pulled per refill.
pub const REFILL_FRAMES: usize = 512;

/// Converts an upstream source running at an arbitrary rate into native-rate
/// frames by linear interpolation.
///
/// The resampler owns its upstream, so the upstream outlives every frame the
/// resampler produces. Metadata queries (position, duration, loop point) reach
/// it through [`Resampler::source`] and [`Resampler::source_mut`].
///
/// # Algorithm
///
/// Upstream frames land in a fixed window of [`REFILL_FRAMES`]. The read
/// position is an integer index into the window plus a fractional part in
/// `[0, 1)`. Each output frame interpolates between the two window frames
/// straddling that position, then the fractional part advances by `ratio`
/// and its integer overflow carries into the index. When the index runs past
/// the window, the window length is subtracted from the index and the window
/// is refilled; the last frame of the old window is kept as an anchor so an
/// index of `-1` still interpolates against real data.
pub struct Resampler<const C: usize, S = BoxedSource<C>> {
    source: S,
    ratio: f32,
    window: Vec<Sample<C>>,
    window_len: usize,
    index: i64,
    fraction: f32,
    anchor: Sample<C>,
}

impl<const C: usize, S: Source<C>> Resampler<C, S> {
    /// `ratio` is input rate over output rate; see [`ratio_for_rate`].
    pub fn new(source: S, ratio: f32) -> Self {
        Self {
            source,
            ratio: ratio.max(0.0),
            window: vec![Sample::SILENCE; REFILL_FRAMES],
            window_len: 0,
            index: 0,
            fraction: 0.0,
            anchor: Sample::SILENCE,
        }
    }

    /// Wraps a source whose frames are produced at `input_rate` Hz.
    pub fn from_rate(source: S, input_rate: u32) -> Self {
        Self::new(source, ratio_for_rate(input_rate))
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Changes the conversion ratio without disturbing buffered frames.
    /// Negative ratios are clamped to zero.
    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = ratio.max(0.0);
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Drops buffered frames and interpolation state, e.g. after the upstream
    /// was seeked.
    pub fn reset(&mut self) {
        self.window_len = 0;
        self.index = 0;
        self.fraction = 0.0;
        self.anchor = Sample::SILENCE;
    }

    /// Shifts the read position into a freshly pulled window. Returns `false`
    /// when the upstream produced nothing.
    fn refill(&mut self) -> bool {
        self.index -= self.window_len as i64;
        if self.window_len > 0 {
            self.anchor = self.window[self.window_len - 1];
        }
        self.window_len = self.source.generate(&mut self.window);
        self.window_len > 0
    }

    /// Copies frames still buffered at an integer position into `buffer`,
    /// anchor first when the index is `-1`. Only valid at a zero fraction.
    fn drain_window(&mut self, buffer: &mut [Sample<C>]) -> usize {
        let mut written = 0;
        if self.index < 0 && !buffer.is_empty() {
            buffer[0] = self.anchor;
            written = 1;
            self.index = 0;
        }
        let start = self.index.max(0) as usize;
        let count = self.window_len.saturating_sub(start).min(buffer.len() - written);
        buffer[written..written + count].copy_from_slice(&self.window[start..start + count]);
        self.index += count as i64;
        written + count
    }
}

impl<const C: usize, S: Source<C>> Source<C> for Resampler<C, S> {
    fn generate(&mut self, buffer: &mut [Sample<C>]) -> usize {
        // Pass straight through at unit ratio once the read position sits on
        // a whole frame inside (or at the end of) the window.
        if self.ratio == 1.0 && self.fraction == 0.0 && self.index <= self.window_len as i64 {
            let written = self.drain_window(buffer);
            if written < buffer.len() {
                return written + self.source.generate(&mut buffer[written..]);
            }
            return written;
        }

        let mut written = 0;
        while written < buffer.len() {
            // Both straddling frames must be inside the window.
            while self.index + 1 >= self.window_len as i64 {
                if !self.refill() {
                    return written;
                }
            }

            let frame = if self.index < 0 {
                let next = self.window[0];
                self.anchor + (next - self.anchor) * self.fraction
            } else {
                let i = self.index as usize;
                let current = self.window[i];
                current + (self.window[i + 1] - current) * self.fraction
            };
            buffer[written] = frame;
            written += 1;

            self.fraction += self.ratio;
            let carry = self.fraction.floor();
            self.fraction -= carry;
            self.index += carry as i64;
        }
        written
    }
}

/// Ratio that converts `input_rate` Hz to [`NATIVE_SAMPLE_RATE`].
pub fn ratio_for_rate(input_rate: u32) -> f32 {
    input_rate as f32 / NATIVE_SAMPLE_RATE as f32
}
