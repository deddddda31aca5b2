//! Error types for wadmix

use thiserror::Error;

/// A recognized container that is structurally malformed.
///
/// Raised only by backend constructors. A loader that merely failed to
/// recognize its format reports a miss with `None` instead, which is the only
/// way a DMX lump fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("WAV format error: {0}")]
    Wav(String),

    #[error("Ogg Vorbis format error: {0}")]
    Ogg(String),

    #[error("Module format error: {0}")]
    Module(String),

    #[error("Chiptune format error: {0}")]
    Chiptune(String),
}

#[derive(Error, Debug)]
pub enum WadMixError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, WadMixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_error_names_a_backend_constructor() {
        let errors = [
            FormatError::Wav("short fmt chunk".into()),
            FormatError::Ogg("no Vorbis stream".into()),
            FormatError::Module("bad tag".into()),
            FormatError::Chiptune("packed".into()),
        ];
        for error in errors {
            let backend = match &error {
                FormatError::Wav(_) => "WAV",
                FormatError::Ogg(_) => "Ogg Vorbis",
                FormatError::Module(_) => "Module",
                FormatError::Chiptune(_) => "Chiptune",
            };
            assert!(error.to_string().starts_with(backend), "{error}");
        }
    }

    #[test]
    fn format_errors_convert_into_the_crate_error() {
        let error: WadMixError = FormatError::Ogg("x".into()).into();
        assert_eq!(error.to_string(), "Ogg Vorbis format error: x");
    }
}
