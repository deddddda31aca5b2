//! Players adapt a format backend into a loopable [`Source`](crate::source::Source).
//!
//! A player that reaches the end without looping returns a short read and
//! stays ended until it is seeked. That short read is the end-of-clip
//! signal seen by resamplers, mixers and the music player.

mod gme;
mod ogg;
mod wav;
mod xmp;

pub use gme::GmePlayer;
pub use ogg::OggPlayer;
pub use wav::WavPlayer;
pub use xmp::XmpPlayer;
