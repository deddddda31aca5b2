//! Format backends.
//!
//! Each backend owns a decoder built from an in-memory buffer and exposes
//! pull-decoding, seeking and duration. Constructors fail with a
//! [`FormatError`](crate::error::FormatError) when the bytes are recognized
//! but malformed.

pub mod gme;
pub mod ogg;
pub mod protracker;
pub mod wav;
pub mod xmp;
pub mod ym;

pub use gme::{ChipCodec, ChipEmulator, Gme};
pub use ogg::{Ogg, parse_loop_point};
pub use protracker::ProTrackerCodec;
pub use wav::Wav;
pub use xmp::{ModuleCodec, ModuleDecoder, Xmp};
pub use ym::YmCodec;

use std::fmt;
use std::sync::Arc;

/// Native codecs available to the module and chiptune backends, tried in
/// registration order.
///
/// The default registry holds the built-in [`ProTrackerCodec`] and
/// [`YmCodec`]; start from [`CodecRegistry::empty`] to control the order
/// completely.
#[derive(Clone)]
pub struct CodecRegistry {
    modules: Vec<Arc<dyn ModuleCodec>>,
    chips: Vec<Arc<dyn ChipCodec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::empty()
            .with_module_codec(ProTrackerCodec)
            .with_chip_codec(YmCodec)
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with no codecs at all.
    pub fn empty() -> Self {
        Self {
            modules: Vec::new(),
            chips: Vec::new(),
        }
    }

    pub fn with_module_codec(mut self, codec: impl ModuleCodec + 'static) -> Self {
        self.modules.push(Arc::new(codec));
        self
    }

    pub fn with_chip_codec(mut self, codec: impl ChipCodec + 'static) -> Self {
        self.chips.push(Arc::new(codec));
        self
    }

    pub fn module_codecs(&self) -> &[Arc<dyn ModuleCodec>] {
        &self.modules
    }

    pub fn chip_codecs(&self) -> &[Arc<dyn ChipCodec>] {
        &self.chips
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field(
                "modules",
                &self.modules.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("chips", &self.chips.iter().map(|c| c.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_the_native_codecs() {
        let codecs = CodecRegistry::default();
        let modules: Vec<_> = codecs.module_codecs().iter().map(|c| c.name()).collect();
        let chips: Vec<_> = codecs.chip_codecs().iter().map(|c| c.name()).collect();
        assert_eq!(modules, ["protracker"]);
        assert_eq!(chips, ["ym"]);
        assert!(CodecRegistry::empty().module_codecs().is_empty());
    }
}
