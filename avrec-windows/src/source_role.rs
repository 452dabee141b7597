use avrec_core::models::stream::AudioSourceKind;

/// Endpoint role a capture source resolves to (`ERole` on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Console,
    Multimedia,
    Communications,
}

impl EndpointRole {
    pub fn for_source(source: AudioSourceKind) -> Self {
        match source {
            AudioSourceKind::Mic | AudioSourceKind::Default => Self::Console,
            AudioSourceKind::Camcorder => Self::Multimedia,
            AudioSourceKind::VoiceCommunication | AudioSourceKind::VoiceRecognition => Self::Communications,
        }
    }

    /// Sources that read the microphone directly and are subject to the
    /// privacy toggle check before opening.
    pub fn needs_permission_check(source: AudioSourceKind) -> bool {
        matches!(source, AudioSourceKind::Mic | AudioSourceKind::Default)
    }
}
