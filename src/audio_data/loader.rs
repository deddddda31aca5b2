use super::batch_resampler::BatchResampler;
use super::dmx;
use super::load_options::{ChunkLoadOptions, ChunkResampler};
use super::{BufferSource, SoundChunk};
use crate::NATIVE_SAMPLE_RATE;
use crate::format::{Ogg, Wav};
use crate::player::{OggPlayer, WavPlayer};
use crate::resampler::Resampler;
use crate::sample::{Mono, Sample};
use crate::source::Source;

const DRAIN_FRAMES: usize = 1024;

/// Decodes a sound effect lump with the default options.
///
/// Formats are tried in order: DMX, WAV, Ogg Vorbis. A format that does not
/// recognize the bytes, or recognizes them but fails to parse, hands over to
/// the next one. Returns `None` when nothing produces audio.
pub fn try_load_chunk(data: &[u8]) -> Option<SoundChunk> {
    try_load_chunk_with(data, &ChunkLoadOptions::default())
}

pub fn try_load_chunk_with(data: &[u8], options: &ChunkLoadOptions) -> Option<SoundChunk> {
    if data.is_empty() {
        return None;
    }

    if let Some(sound) = dmx::parse(data) {
        log::debug!(
            "Loading DMX chunk: {} samples at {} Hz",
            sound.samples.len(),
            sound.sample_rate
        );
        let source = BufferSource::new(sound.to_frames());
        return finish(source, sound.sample_rate, options);
    }

    match Wav::new(data) {
        Ok(wav) => {
            log::debug!(
                "Loading WAV chunk: {} channels, {} frames at {} Hz",
                wav.channels(),
                wav.length(),
                wav.sample_rate()
            );
            let rate = wav.sample_rate();
            return finish(WavPlayer::new(wav), rate, options);
        }
        Err(e) => log::debug!("Chunk is not a WAV: {}", e),
    }

    if Ogg::sniff(data) {
        match Ogg::new(data.to_vec()) {
            Ok(ogg) => {
                let rate = ogg.sample_rate();
                let player: OggPlayer<1> = OggPlayer::new(ogg);
                return finish(player, rate, options);
            }
            Err(e) => log::debug!("Chunk is not an Ogg Vorbis stream: {}", e),
        }
    }

    None
}

fn finish<S: Source<1>>(
    source: S,
    sample_rate: u32,
    options: &ChunkLoadOptions,
) -> Option<SoundChunk> {
    let samples = match options.resampler {
        ChunkResampler::Linear => drain(Resampler::<1, S>::from_rate(source, sample_rate)),
        ChunkResampler::Sinc => resample_offline(drain(source), sample_rate),
    };

    if samples.is_empty() {
        log::debug!("Chunk decoded to zero frames");
        return None;
    }
    Some(SoundChunk::new(samples))
}

/// Pulls frames until the source reports a short read of zero.
fn drain<S: Source<1>>(mut source: S) -> Vec<Mono> {
    let mut samples = Vec::new();
    let mut block = [Sample::SILENCE; DRAIN_FRAMES];
    loop {
        let written = source.generate(&mut block);
        if written == 0 {
            break;
        }
        samples.extend_from_slice(&block[..written]);
    }
    samples
}

fn resample_offline(samples: Vec<Mono>, sample_rate: u32) -> Vec<Mono> {
    if sample_rate == NATIVE_SAMPLE_RATE {
        return samples;
    }

    let planar: Vec<f32> = samples.iter().map(|s| s[0]).collect();
    let converted = BatchResampler::new(sample_rate, NATIVE_SAMPLE_RATE, None)
        .and_then(|resampler| resampler.resample_channel(&planar));

    match converted {
        Ok(channel) => channel.into_iter().map(|s| Sample::new([s])).collect(),
        Err(e) => {
            log::warn!("Sinc resampling failed, falling back to linear: {}", e);
            drain(Resampler::<1, _>::from_rate(
                BufferSource::new(samples),
                sample_rate,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::dmx::tests::make_dmx;
    use crate::format::ogg::tests::{LOOP_OGG, LOOP_OGG_FRAMES};
    use crate::format::wav::tests::make_wav;

    #[test]
    fn empty_input_is_no_chunk() {
        assert!(try_load_chunk(&[]).is_none());
    }

    #[test]
    fn garbage_is_no_chunk() {
        assert!(try_load_chunk(b"definitely not audio").is_none());
    }

    #[test]
    fn native_rate_dmx_is_copied() {
        let data = make_dmx(NATIVE_SAMPLE_RATE as u16, &[128, 192, 64]);
        let chunk = try_load_chunk(&data).unwrap();
        let values: Vec<f32> = chunk.samples().iter().map(|s| s[0]).collect();
        assert_eq!(values, vec![0.0, 0.5, -0.5]);
    }

    #[test]
    fn low_rate_dmx_is_upsampled() {
        let data = make_dmx(11025, &[192; 100]);
        let chunk = try_load_chunk(&data).unwrap();
        // 4x upsampling of 100 frames, give or take the tail of the window.
        assert!((396..=400).contains(&chunk.len()), "len {}", chunk.len());
        assert!(chunk.samples().iter().all(|s| (s[0] - 0.5).abs() < 1e-6));
    }

    #[test]
    fn sinc_option_produces_expected_length() {
        let data = make_dmx(22050, &[192; 500]);
        let options = ChunkLoadOptions::new().resampler(ChunkResampler::Sinc);
        let chunk = try_load_chunk_with(&data, &options).unwrap();
        assert_eq!(chunk.len(), 1000);
        let samples = chunk.samples();
        for i in [32, 64, 500, 900, 960] {
            assert!((samples[i][0] - 0.5).abs() < 0.02, "sample {i} is {}", samples[i][0]);
        }
    }

    #[test]
    fn ogg_chunk_is_decoded_and_upsampled() {
        let chunk = try_load_chunk(LOOP_OGG).unwrap();
        let expected = 2 * LOOP_OGG_FRAMES as usize;
        assert!((expected - 4..=expected).contains(&chunk.len()), "len {}", chunk.len());
        let peak = chunk.samples().iter().fold(0.0f32, |m, s| m.max(s[0].abs()));
        assert!(peak > 0.01, "peak {peak}");
    }

    #[test]
    fn invalid_dmx_falls_back_to_wav() {
        let pcm = 1000i16.to_le_bytes().repeat(8);
        let wav = make_wav(1, NATIVE_SAMPLE_RATE, 16, &pcm);
        let chunk = try_load_chunk(&wav).unwrap();
        assert_eq!(chunk.len(), 8);
        assert!((chunk.samples()[0][0] - 1000.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn stereo_wav_is_averaged_to_mono() {
        let mut pcm = Vec::new();
        for _ in 0..4 {
            pcm.extend_from_slice(&[255, 1]);
        }
        let wav = make_wav(2, NATIVE_SAMPLE_RATE, 8, &pcm);
        let chunk = try_load_chunk(&wav).unwrap();
        assert_eq!(chunk.len(), 4);
        assert!(chunk.samples()[0][0].abs() < 1e-6);
    }

    #[test]
    fn truncated_wav_is_no_chunk() {
        let wav = make_wav(1, NATIVE_SAMPLE_RATE, 8, &[1, 2, 3, 4]);
        assert!(try_load_chunk(&wav[..wav.len() - 2]).is_none());
    }
}
