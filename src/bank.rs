use crate::audio_data::{ChunkLoadOptions, SoundChunk, try_load_chunk_with};
use crate::world::SoundWorld;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Owns decoded sound effect chunks, keyed by UUID handles.
///
/// Channels in a [`SoundWorld`] only hold weak references to chunks, so
/// freeing goes through [`SoundBank::free`], which detaches every channel
/// playing the chunk before dropping it.
#[derive(Debug, Default)]
pub struct SoundBank {
    chunks: HashMap<Uuid, Arc<SoundChunk>>,
    options: ChunkLoadOptions,
}

impl SoundBank {
    pub fn new(options: ChunkLoadOptions) -> Self {
        Self {
            chunks: HashMap::new(),
            options,
        }
    }

    pub fn insert(&mut self, chunk: SoundChunk) -> Uuid {
        let uuid = Uuid::new_v4();
        self.chunks.insert(uuid, Arc::new(chunk));
        uuid
    }

    /// Decodes a sound lump and stores it. Returns `None` if no format
    /// accepted the bytes.
    pub fn load(&mut self, data: &[u8]) -> Option<Uuid> {
        let chunk = try_load_chunk_with(data, &self.options)?;
        log::debug!("Stored sound chunk of {:?}", chunk.duration());
        Some(self.insert(chunk))
    }

    pub fn get(&self, id: Uuid) -> Option<&Arc<SoundChunk>> {
        self.chunks.get(&id)
    }

    /// Resets every channel in `world` playing the chunk, then drops it.
    /// Returns `false` if the id was unknown.
    pub fn free(&mut self, id: Uuid, world: &mut SoundWorld) -> bool {
        let Some(chunk) = self.chunks.get(&id) else {
            return false;
        };
        let reset = world.reset_chunk(chunk);
        if reset > 0 {
            log::debug!("Reset {} channels before freeing chunk {}", reset, id);
        }
        self.chunks.remove(&id);
        true
    }

    /// Frees every chunk.
    pub fn clear(&mut self, world: &mut SoundWorld) {
        for chunk in self.chunks.values() {
            world.reset_chunk(chunk);
        }
        self.chunks.clear();
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.chunks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
