use std::sync::Arc;
use std::time::Duration;

use crate::models::error::RecorderError;
use crate::models::stream::{BufferInfo, FormatDescriptor};

/// Opaque handle to a GPU-renderable surface feeding a video compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// One result of polling a compressor's output queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Nothing became available within the timeout.
    TryAgainLater,
    /// Output buffer set was reallocated. Informational only.
    BuffersChanged,
    /// The negotiated output format is ready. Fires once per session.
    FormatChanged,
    /// A compressed buffer. `data` holds `info.size` valid bytes copied out of
    /// output slot `index`, which must be handed back with
    /// [`Compressor::release_output_buffer`].
    Sample {
        index: usize,
        data: Vec<u8>,
        info: BufferInfo,
    },
    /// Status code the engine does not understand. Logged and ignored.
    Unknown(i32),
}

/// A stateful hardware or software encoder with an input queue and an
/// output queue.
///
/// Implementations are internally synchronized: the capture thread queues
/// input while the encoding thread drains output.
pub trait Compressor: Send + Sync {
    /// Queue raw input. Returns `Ok(false)` when no input slot became free
    /// within `timeout`. An empty `data` with `end_of_stream` set marks the
    /// end of input.
    fn queue_input(
        &self,
        data: &[u8],
        presentation_time_us: i64,
        end_of_stream: bool,
        timeout: Duration,
    ) -> Result<bool, RecorderError>;

    /// Surface the renderer draws into, for surface-input (video) encoders.
    fn input_surface(&self) -> Option<SurfaceHandle> {
        None
    }

    /// Mark end of input on a surface-input encoder.
    fn signal_end_of_input_stream(&self) -> Result<(), RecorderError> {
        Err(RecorderError::Compressor(
            "encoder has no input surface".into(),
        ))
    }

    /// Poll the output queue for at most `timeout`.
    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent, RecorderError>;

    /// Output format. Only valid after [`OutputEvent::FormatChanged`].
    fn output_format(&self) -> Result<FormatDescriptor, RecorderError>;

    /// Hand an output slot back to the compressor.
    fn release_output_buffer(&self, index: usize) -> Result<(), RecorderError>;

    fn stop(&self) -> Result<(), RecorderError>;

    fn release(&self);
}

/// Finds and configures a compressor for a requested format.
pub trait CodecProvider: Send + Sync {
    /// Create, configure and start an encoder.
    ///
    /// Returns [`RecorderError::CodecUnavailable`] when nothing matches.
    fn create_encoder(&self, format: &FormatDescriptor) -> Result<Arc<dyn Compressor>, RecorderError>;
}
