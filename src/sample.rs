//! Fixed-channel audio frames.

use std::ops::{Add, AddAssign, Index, IndexMut, Mul, MulAssign, Sub};

/// One frame of `C` channels of float amplitude.
///
/// Values are not clamped here; clipping is the output stage's concern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<const C: usize> {
    pub amplitudes: [f32; C],
}

pub type Mono = Sample<1>;
pub type Stereo = Sample<2>;

impl<const C: usize> Sample<C> {
    pub const SILENCE: Self = Self {
        amplitudes: [0.0; C],
    };

    pub const fn new(amplitudes: [f32; C]) -> Self {
        Self { amplitudes }
    }

    /// A frame with every channel set to `value`.
    pub const fn splat(value: f32) -> Self {
        Self {
            amplitudes: [value; C],
        }
    }

    /// Builds a frame from one interleaved source frame of any channel count.
    ///
    /// A mono target averages every source channel. Otherwise channels map
    /// one-to-one, wrapping around when the source has fewer channels than
    /// `C` (mono sources fill every channel).
    pub fn from_frame(frame: &[f32]) -> Self {
        Self::from_channels(frame.len(), |c| frame[c])
    }

    /// Same mapping as [`Sample::from_frame`] for a source frame of
    /// `channels` values read through `channel`.
    pub fn from_channels(channels: usize, channel: impl Fn(usize) -> f32) -> Self {
        let mut out = Self::SILENCE;
        if channels == 0 {
            return out;
        }
        if C == 1 && channels > 1 {
            out.amplitudes[0] = (0..channels).map(&channel).sum::<f32>() / channels as f32;
            return out;
        }
        for (c, amplitude) in out.amplitudes.iter_mut().enumerate() {
            *amplitude = channel(c % channels);
        }
        out
    }

    pub fn channels(&self) -> usize {
        C
    }
}

impl<const C: usize> Default for Sample<C> {
    fn default() -> Self {
        Self::SILENCE
    }
}

impl<const C: usize> Index<usize> for Sample<C> {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.amplitudes[index]
    }
}

impl<const C: usize> IndexMut<usize> for Sample<C> {
    fn index_mut(&mut self, index: usize) -> &mut f32 {
        &mut self.amplitudes[index]
    }
}

impl<const C: usize> Add for Sample<C> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl<const C: usize> AddAssign for Sample<C> {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.amplitudes.iter_mut().zip(rhs.amplitudes) {
            *a += b;
        }
    }
}

impl<const C: usize> Sub for Sample<C> {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        for (a, b) in self.amplitudes.iter_mut().zip(rhs.amplitudes) {
            *a -= b;
        }
        self
    }
}

impl<const C: usize> Mul<f32> for Sample<C> {
    type Output = Self;

    fn mul(mut self, rhs: f32) -> Self {
        self *= rhs;
        self
    }
}

impl<const C: usize> MulAssign<f32> for Sample<C> {
    fn mul_assign(&mut self, rhs: f32) {
        for a in self.amplitudes.iter_mut() {
            *a *= rhs;
        }
    }
}

/// Unsigned 8-bit PCM to float, centered on 128.
pub(crate) fn u8_to_f32(value: u8) -> f32 {
    (value as f32 - 128.0) / 128.0
}

/// Signed 16-bit PCM to float.
pub(crate) fn i16_to_f32(value: i16) -> f32 {
    value as f32 / 32768.0
}
