use std::path::Path;

use crate::models::error::RecorderError;
use crate::models::recording_result::ContainerSummary;
use crate::models::stream::{BufferInfo, FormatDescriptor, TrackIndex};

/// Append-only writer interleaving several elementary streams into one file.
///
/// Call order: `open` → `add_track`* → `start` → `write_sample`* → `finalize`.
/// The muxer coordinator guarantees that order and serializes every call.
pub trait ContainerWriter: Send {
    fn open(&mut self, path: &Path) -> Result<(), RecorderError>;

    fn add_track(&mut self, format: &FormatDescriptor) -> Result<TrackIndex, RecorderError>;

    /// Begin accepting samples. Called once, after every track was added.
    fn start(&mut self) -> Result<(), RecorderError>;

    fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<(), RecorderError>;

    /// Flush and close the file.
    fn finalize(&mut self) -> Result<ContainerSummary, RecorderError>;

    /// Drop a container that never started. Default: nothing to clean up.
    fn abandon(&mut self) {}
}
