use crate::models::error::RecorderError;
use crate::models::stream::{AudioSourceKind, PcmFormat};

/// Blocking PCM reader for one opened capture source.
///
/// Created and used on the audio sampling thread only, so it does not need
/// to be `Send`.
pub trait PcmReader {
    fn start(&mut self) -> Result<(), RecorderError>;

    /// Fill `buf` with interleaved 16-bit little-endian PCM.
    ///
    /// Returns the number of bytes read. `Ok(0)` means nothing arrived in a
    /// bounded wait and the caller should poll again.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, RecorderError>;

    fn stop(&mut self);
}

/// Platform microphone access.
///
/// Implemented by:
/// - `WasapiAudioInput` (Windows)
pub trait AudioInput: Send + Sync {
    /// Smallest capture buffer the device accepts for `format`, in bytes.
    fn min_buffer_size(&self, format: &PcmFormat) -> Option<usize>;

    /// Open a source. Called on the sampling thread.
    fn open(
        &self,
        source: AudioSourceKind,
        format: &PcmFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn PcmReader>, RecorderError>;
}
