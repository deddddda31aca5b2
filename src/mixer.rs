//! Sums any number of child sources into one buffer.

use crate::sample::Sample;
use crate::source::{BoxedSource, Source};

/// Stable handle to a child added with [`Mixer::add_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

impl SourceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Additive mixer over child sources of type `S`.
///
/// `generate` always fills and returns the whole buffer, starting from
/// silence, so consumers never special-case an idle mixer. Children are
/// never unlinked: an exhausted child is expected to keep returning short
/// reads (usually zero frames), which contribute nothing.
pub struct Mixer<const C: usize, S = BoxedSource<C>> {
    sources: Vec<S>,
    scratch: Vec<Sample<C>>,
}

impl<const C: usize, S: Source<C>> Mixer<C, S> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Pre-sizes the scratch buffer so steady-state mixing of up to `frames`
    /// frames never allocates.
    pub fn with_capacity(frames: usize) -> Self {
        Self {
            sources: Vec::new(),
            scratch: vec![Sample::SILENCE; frames],
        }
    }

    pub fn add_source(&mut self, source: S) -> SourceId {
        self.sources.push(source);
        SourceId(self.sources.len() - 1)
    }

    pub fn source(&self, id: SourceId) -> Option<&S> {
        self.sources.get(id.0)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut S> {
        self.sources.get_mut(id.0)
    }

    pub fn sources(&self) -> impl Iterator<Item = &S> {
        self.sources.iter()
    }

    pub fn sources_mut(&mut self) -> impl Iterator<Item = &mut S> {
        self.sources.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl<const C: usize, S: Source<C>> Default for Mixer<C, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const C: usize, S: Source<C>> Source<C> for Mixer<C, S> {
    fn generate(&mut self, buffer: &mut [Sample<C>]) -> usize {
        buffer.fill(Sample::SILENCE);
        if self.scratch.len() < buffer.len() {
            self.scratch.resize(buffer.len(), Sample::SILENCE);
        }

        let scratch = &mut self.scratch[..buffer.len()];
        for source in self.sources.iter_mut() {
            let written = source.generate(scratch).min(buffer.len());
            for (out, frame) in buffer[..written].iter_mut().zip(&scratch[..written]) {
                *out += *frame;
            }
        }
        buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Stereo;
    use crate::source::testing::ConstantSource;

    #[test]
    fn sums_children() {
        let mut mixer: Mixer<2> = Mixer::new();
        for v in [0.1f32, 0.25, -0.05] {
            mixer.add_source(Box::new(ConstantSource::<2>::endless(v)));
        }
        let mut buf = vec![Stereo::splat(9.0); 300];
        assert_eq!(mixer.generate(&mut buf), 300);
        for frame in &buf {
            assert!((frame[0] - 0.3).abs() < 1e-6);
            assert!((frame[1] - 0.3).abs() < 1e-6);
        }
    }

    #[test]
    fn empty_mixer_is_exact_silence() {
        let mut mixer: Mixer<2> = Mixer::new();
        let mut buf = vec![Stereo::splat(0.5); 128];
        assert_eq!(mixer.generate(&mut buf), 128);
        assert!(buf.iter().all(|f| *f == Stereo::SILENCE));
    }

    #[test]
    fn short_reads_only_cover_their_prefix() {
        let mut mixer: Mixer<2> = Mixer::with_capacity(16);
        mixer.add_source(Box::new(ConstantSource::<2>::new(1.0, 5)));
        mixer.add_source(Box::new(ConstantSource::<2>::endless(0.5)));

        let mut buf = vec![Stereo::SILENCE; 8];
        assert_eq!(mixer.generate(&mut buf), 8);
        assert_eq!(buf[4], Stereo::splat(1.5));
        assert_eq!(buf[5], Stereo::splat(0.5));

        // Exhausted children keep contributing nothing.
        assert_eq!(mixer.generate(&mut buf), 8);
        assert!(buf.iter().all(|f| *f == Stereo::splat(0.5)));
    }

    #[test]
    fn handles_address_children() {
        let mut mixer: Mixer<1, ConstantSource<1>> = Mixer::new();
        let a = mixer.add_source(ConstantSource::endless(0.1));
        let b = mixer.add_source(ConstantSource::endless(0.2));
        assert_eq!(mixer.len(), 2);
        mixer.source_mut(b).unwrap().remaining = 0;
        assert_eq!(mixer.source(a).unwrap().remaining, usize::MAX);
        assert!(mixer.source(SourceId(7)).is_none());
    }
}
