use avrec_core::models::error::RecorderError;
use avrec_core::models::stream::AudioSourceKind;
use thiserror::Error;

/// Failures of the WASAPI capture path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WasapiError {
    #[error("COM initialization failed: {0}")]
    ComInit(String),

    #[error("no capture endpoint for the {0:?} source")]
    DeviceNotFound(AudioSourceKind),

    #[error("microphone access is disabled in privacy settings")]
    AccessDenied,

    #[error("unsupported capture format: {0}")]
    UnsupportedFormat(String),

    #[error("{call} failed: {message}")]
    Api { call: &'static str, message: String },
}

impl WasapiError {
    pub fn api(call: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Api {
            call,
            message: error.to_string(),
        }
    }
}

/// Every WASAPI failure leaves the source unusable; the audio encoder falls
/// back to the next source or to silent frames.
impl From<WasapiError> for RecorderError {
    fn from(error: WasapiError) -> Self {
        RecorderError::CaptureSourceUnavailable(error.to_string())
    }
}
