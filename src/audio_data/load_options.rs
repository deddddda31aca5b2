/// How non-native-rate chunks are converted at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkResampler {
    /// Drain the streaming linear resampler, the same path music takes.
    #[default]
    Linear,
    /// Offline FFT-based conversion; slower to load, fewer artifacts.
    Sinc,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkLoadOptions {
    pub resampler: ChunkResampler,
}

impl ChunkLoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resampler(mut self, resampler: ChunkResampler) -> Self {
        self.resampler = resampler;
        self
    }
}
