//! Configuration for wadmix

use crate::audio_data::ChunkLoadOptions;
use crate::error::{Result, WadMixError};
use crate::format::CodecRegistry;

#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Device buffer size in frames. The mix scratch buffer is sized to this
    /// up front so the audio callback does not allocate in steady state.
    pub block_size: usize,
    /// Number of simultaneous sound effect slots.
    pub sound_channels: usize,
    /// Capacity of the bounded event queue. Events are dropped when full.
    pub event_capacity: usize,
    pub chunk_options: ChunkLoadOptions,
    pub codecs: CodecRegistry,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            sound_channels: 32,
            event_capacity: 64,
            chunk_options: ChunkLoadOptions::default(),
            codecs: CodecRegistry::default(),
        }
    }
}

impl AudioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn sound_channels(mut self, channels: usize) -> Self {
        self.sound_channels = channels;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn chunk_options(mut self, options: ChunkLoadOptions) -> Self {
        self.chunk_options = options;
        self
    }

    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(WadMixError::Configuration(
                "block_size must be greater than 0".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(WadMixError::Configuration(
                "event_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
