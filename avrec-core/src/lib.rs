//! # avrec-core
//!
//! Platform-agnostic audio/video recording engine.
//!
//! Captured audio and rendered video frames are compressed by per-stream
//! encoder sessions, each on its own encoding thread, and interleaved into a
//! single container through a shared muxer coordinator. The container starts
//! only once every registered session reported its output format, and is
//! finalized once every started session stopped. Platform backends
//! (Windows WASAPI) implement the `AudioInput` trait; hardware codecs and
//! container formats plug in through `CodecProvider` and `ContainerWriter`.
//!
//! ## Architecture
//!
//! ```text
//! avrec-core (this crate)
//! ├── traits/       ← Compressor, CodecProvider, ContainerWriter, AudioInput, FrameRenderer, EncoderListener
//! ├── models/       ← RecorderError, StreamKind, FormatDescriptor, configuration, states, results
//! ├── processing/   ← PresentationClock, PCM conversion helpers
//! ├── session/      ← EncoderCore, AudioEncoder, VideoEncoder, MuxerCoordinator, Recorder
//! └── storage/      ← TrackFileWriter, metadata
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use models::config::{AudioEncoderConfig, RecorderConfiguration, VideoEncoderConfig};
pub use models::error::RecorderError;
pub use models::recording_result::{ContainerSummary, RecordingMetadata, RecordingResult, TrackSummary};
pub use models::state::{EncoderState, RecorderState};
pub use models::stream::{
    AudioSourceKind, BufferInfo, FormatDescriptor, FrameTransform, PcmFormat, SampleFlags, StreamKind, StreamParams,
    TrackIndex,
};
pub use processing::presentation_clock::PresentationClock;
pub use session::audio::AudioEncoder;
pub use session::encoder::{EncoderCore, InputMode};
pub use session::muxer::MuxerCoordinator;
pub use session::recorder::Recorder;
pub use session::video::VideoEncoder;
pub use storage::track_file_writer::TrackFileWriter;
pub use traits::audio_input::{AudioInput, PcmReader};
pub use traits::compressor::{CodecProvider, Compressor, OutputEvent, SurfaceHandle};
pub use traits::container_writer::ContainerWriter;
pub use traits::frame_renderer::FrameRenderer;
pub use traits::listener::EncoderListener;
pub use traits::time_source::{SystemTimeSource, TimeSource};
