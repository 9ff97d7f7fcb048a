use thiserror::Error;

/// Unified error type for the mixer core.
#[derive(Error, Debug)]
pub enum MixerError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("No audio loaded for instrument {0}")]
    NoAudioLoaded(usize),

    #[error("Playback already started for instrument {0}; rebuild the graph first")]
    AlreadyStarted(usize),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid ensemble size {requested} (maximum {max})")]
    InvalidEnsembleSize { requested: usize, max: usize },

    #[error("Track unavailable: {0}")]
    TrackUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio engine error: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<symphonia::core::errors::Error> for MixerError {
    fn from(error: symphonia::core::errors::Error) -> Self {
        MixerError::Decode(error.to_string())
    }
}

impl From<hound::Error> for MixerError {
    fn from(error: hound::Error) -> Self {
        MixerError::Engine(format!("WAV error: {}", error))
    }
}

pub type Result<T> = std::result::Result<T, MixerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = MixerError::NoAudioLoaded(2);
        assert!(format!("{}", err).contains("instrument 2"));

        let err = MixerError::InvalidEnsembleSize {
            requested: 40,
            max: 16,
        };
        assert_eq!(format!("{}", err), "Invalid ensemble size 40 (maximum 16)");

        let io_err = MixerError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        assert!(format!("{}", io_err).contains("I/O error: file not found"));
    }
}
