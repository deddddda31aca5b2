//! Notifications sent from the audio thread

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// The music track ran out on its own (not looping, not stopped by a
    /// control call).
    MusicFinished,
    EngineStarted,
    EngineStopped,
    /// The output stream reported an error.
    StreamError {
        error: String,
    },
}

impl AudioEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::StreamError { .. })
    }
}
