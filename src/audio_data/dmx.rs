//! DMX digital sound lumps.
//!
//! Layout: `u16` format (3), `u16` sample rate, `u32` sample count including
//! 32 bytes of padding, 16 padding bytes, then unsigned 8-bit mono samples.
//! The 16 trailing padding bytes are not read.

use crate::io::ByteStream;
use crate::sample::{Mono, Sample, u8_to_f32};

const DMX_FORMAT: u16 = 3;
const DMX_PADDING: usize = 32;
const DMX_LEADING_PADDING: usize = 16;

pub(crate) struct DmxSound<'a> {
    pub sample_rate: u32,
    pub samples: &'a [u8],
}

impl DmxSound<'_> {
    pub(crate) fn to_frames(&self) -> Vec<Mono> {
        self.samples
            .iter()
            .map(|&s| Sample::new([u8_to_f32(s)]))
            .collect()
    }
}

/// Validates a DMX header and borrows its sample payload. Any mismatch or
/// out-of-range length means "not DMX".
pub(crate) fn parse(data: &[u8]) -> Option<DmxSound<'_>> {
    let mut stream = ByteStream::new(data);

    if stream.read_u16_le().ok()? != DMX_FORMAT {
        return None;
    }
    let sample_rate = stream.read_u16_le().ok()? as u32;
    if sample_rate == 0 {
        return None;
    }
    let declared = stream.read_u32_le().ok()? as usize;
    let count = declared.checked_sub(DMX_PADDING)?;
    if count == 0 {
        return None;
    }

    stream.skip(DMX_LEADING_PADDING).ok()?;
    let samples = stream.read(count).ok()?;
    Some(DmxSound {
        sample_rate,
        samples,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_dmx(rate: u16, samples: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(&DMX_FORMAT.to_le_bytes());
        buf.extend(&rate.to_le_bytes());
        buf.extend(&((samples.len() + DMX_PADDING) as u32).to_le_bytes());
        buf.extend([0x80; DMX_LEADING_PADDING]);
        buf.extend(samples);
        buf.extend([0x80; 16]);
        buf
    }

    #[test]
    fn reads_samples_between_padding() {
        let data = make_dmx(11025, &[0, 64, 128, 255]);
        let sound = parse(&data).unwrap();
        assert_eq!(sound.sample_rate, 11025);
        assert_eq!(sound.samples, &[0, 64, 128, 255]);
        assert_eq!(sound.to_frames()[1][0], -0.5);
    }

    #[test]
    fn trailing_padding_is_optional() {
        let mut data = make_dmx(11025, &[1, 2, 3]);
        data.truncate(data.len() - 16);
        assert_eq!(parse(&data).unwrap().samples, &[1, 2, 3]);
    }

    #[test]
    fn wrong_format_is_a_miss() {
        let mut data = make_dmx(11025, &[1, 2, 3]);
        data[0] = 2;
        assert!(parse(&data).is_none());
    }

    #[test]
    fn length_below_padding_is_a_miss() {
        let mut data = make_dmx(11025, &[1, 2, 3]);
        data[4..8].copy_from_slice(&31u32.to_le_bytes());
        assert!(parse(&data).is_none());
        data[4..8].copy_from_slice(&32u32.to_le_bytes());
        assert!(parse(&data).is_none());
    }

    #[test]
    fn length_past_the_end_is_a_miss() {
        let mut data = make_dmx(11025, &[1, 2, 3]);
        data[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(parse(&data).is_none());
    }

    #[test]
    fn short_header_is_a_miss() {
        assert!(parse(&[3, 0, 0x11]).is_none());
    }
}
