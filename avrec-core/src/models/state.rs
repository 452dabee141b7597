use super::error::RecorderError;
use super::recording_result::RecordingResult;

/// Encoder session lifecycle.
///
/// ```text
/// idle → prepared → capturing → stop_requested → draining → released
///          │                                                   ↑
///          └──────────────── stop before start ────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Idle,
    Prepared,
    Capturing,
    StopRequested,
    Draining,
    Released,
}

impl EncoderState {
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released)
    }

    /// Stop has been requested or the session already wound down.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::StopRequested | Self::Draining | Self::Released)
    }
}

/// Recorder (control layer) state machine.
///
/// ```text
/// idle → prepared → recording → stopping → completed / failed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderState {
    Idle,
    Prepared,
    Recording,
    Stopping,
    Completed(Box<RecordingResult>),
    Failed(RecorderError),
}

impl RecorderState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}
