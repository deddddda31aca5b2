//! The pull interface shared by every node in the audio graph.

use crate::sample::Sample;

/// A pull-based generator of `C`-channel frames.
///
/// `generate` writes up to `buffer.len()` frames from the start of `buffer`
/// and returns how many it wrote. Returning fewer frames than requested is
/// how a source signals that it has ended; the remainder of `buffer` is left
/// untouched.
pub trait Source<const C: usize> {
    fn generate(&mut self, buffer: &mut [Sample<C>]) -> usize;
}

impl<const C: usize, S: Source<C> + ?Sized> Source<C> for Box<S> {
    fn generate(&mut self, buffer: &mut [Sample<C>]) -> usize {
        (**self).generate(buffer)
    }
}

/// An owned, type-erased source that can move to the audio thread.
pub type BoxedSource<const C: usize> = Box<dyn Source<C> + Send>;
