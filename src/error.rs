use thiserror::Error;

use crate::sources::ResolveStatus;

/// Errors produced by the playback core.
///
/// Resolution and transport failures are absorbed by the sequencer and turned
/// into the next state transition; the remaining variants are user input
/// problems reported once to whoever triggered the action.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    /// A stream URL could not be obtained for a candidate.
    #[error("Could not stream {subject}: {status} ({detail})")]
    Resolution {
        subject: String,
        status: ResolveStatus,
        detail: String,
    },

    /// The voice transport refused to start the audio source.
    #[error("Failed to start audio source: {0}")]
    TransportStart(String),

    /// Catalog call failed before any stream could be resolved.
    #[error("Catalog request failed: {0}")]
    Catalog(String),

    #[error("You need to be in a voice channel to play music")]
    NotInVoice,

    #[error("I'm not connected to a voice channel")]
    NotConnected,

    #[error("Could not join the voice channel: {0}")]
    VoiceConnect(String),

    #[error("Nothing is playing right now")]
    NothingPlaying,

    #[error("The queue is full (max {0} tracks)")]
    QueueFull(usize),

    #[error("Not enough songs in queue to shuffle")]
    NotEnoughToShuffle,

    #[error("No previous song to replay")]
    NoPrevious,
}

impl PlaybackError {
    pub fn resolution(
        subject: impl Into<String>,
        status: ResolveStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self::Resolution {
            subject: subject.into(),
            status,
            detail: detail.into(),
        }
    }

    /// True for failures caused by the request itself rather than upstream.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NotInVoice
                | Self::NotConnected
                | Self::NothingPlaying
                | Self::QueueFull(_)
                | Self::NotEnoughToShuffle
                | Self::NoPrevious
        )
    }
}

pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_classified() {
        assert!(PlaybackError::NotInVoice.is_user_error());
        assert!(PlaybackError::QueueFull(5).is_user_error());
        assert!(!PlaybackError::TransportStart("boom".into()).is_user_error());
        assert!(!PlaybackError::resolution("x", ResolveStatus::NotFound, "404").is_user_error());
    }

    #[test]
    fn resolution_message_names_subject() {
        let err = PlaybackError::resolution("file `a.mp3`", ResolveStatus::FileNotFound, "gone");
        assert_eq!(err.to_string(), "Could not stream file `a.mp3`: file_not_found (gone)");
    }
}
