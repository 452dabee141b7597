use thiserror::Error;

use super::stream::StreamKind;

/// Errors raised by the recording engine.
///
/// Per-sample conditions (try-again, empty polls) never surface here; they are
/// retried inside the drain loop. Everything in this enum is either reported
/// to the listener or returned to the control layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("no encoder available for {0}")]
    CodecUnavailable(String),

    #[error("{0} track already registered")]
    DuplicateTrack(StreamKind),

    #[error("container already started, tracks can no longer be added")]
    AlreadyStarted,

    #[error("no audio capture source could be opened: {0}")]
    CaptureSourceUnavailable(String),

    #[error("container rejected sample: {0}")]
    WriteFailure(String),

    #[error("{0} encoder output format changed twice")]
    FormatChangedTwice(StreamKind),

    #[error("{0} encoder produced data before its track was registered")]
    MuxerNotStarted(StreamKind),

    #[error("container did not start within {waited_ms} ms")]
    StartBarrierTimeout { waited_ms: u64 },

    #[error("container was never started")]
    ContainerNeverStarted,

    #[error("compressor error: {0}")]
    Compressor(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl RecorderError {
    /// Whether the error ends the encoder session that raised it.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::WriteFailure(_) | Self::CaptureSourceUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_failures_are_not_fatal() {
        assert!(!RecorderError::WriteFailure("disk full".into()).is_fatal());
        assert!(!RecorderError::CaptureSourceUnavailable("denied".into()).is_fatal());
        assert!(RecorderError::FormatChangedTwice(StreamKind::Video).is_fatal());
        assert!(RecorderError::DuplicateTrack(StreamKind::Audio).is_fatal());
    }

    #[test]
    fn messages_name_the_stream() {
        let err = RecorderError::DuplicateTrack(StreamKind::Audio);
        assert_eq!(err.to_string(), "audio track already registered");

        let err = RecorderError::StartBarrierTimeout { waited_ms: 5000 };
        assert_eq!(err.to_string(), "container did not start within 5000 ms");
    }
}
