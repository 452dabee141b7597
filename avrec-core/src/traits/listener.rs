use crate::models::error::RecorderError;
use crate::models::stream::StreamKind;

/// Event listener for encoder sessions.
///
/// Called from encoder threads, not from the control thread.
/// Implementations should marshal to their own thread if needed.
pub trait EncoderListener: Send + Sync {
    /// The compressor is configured and its input is ready. For video this is
    /// the moment to bind a renderer.
    fn on_prepared(&self, kind: StreamKind);

    /// The session released its compressor. For the last session this happens
    /// after the container was finalized.
    fn on_stopped(&self, kind: StreamKind);

    /// A fatal error ended the session.
    fn on_error(&self, kind: StreamKind, error: &RecorderError) {
        let _ = (kind, error);
    }
}
