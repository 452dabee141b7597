use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::stream::{StreamKind, TrackIndex};

/// Per-track totals collected by the muxer coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub kind: StreamKind,
    pub index: TrackIndex,
    pub mime: String,
    pub samples_written: u64,
    pub bytes_written: u64,
    pub samples_dropped: u64,
}

/// What the container writer reports when it is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerSummary {
    pub bytes_written: u64,
    /// SHA-256 of the finished file, if the writer computes one.
    pub checksum: Option<String>,
}

/// Result returned once every encoder released and the container finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub tracks: Vec<TrackSummary>,
    pub container: ContainerSummary,
}

/// Sidecar metadata written next to a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: Option<String>,
    pub bytes_written: u64,
    pub created_at: String,
    pub tracks: Vec<TrackSummary>,
}

impl RecordingMetadata {
    pub fn from_result(result: &RecordingResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            duration_secs: result.duration_secs,
            file_path: result.file_path.to_string_lossy().to_string(),
            checksum: result.container.checksum.clone(),
            bytes_written: result.container.bytes_written,
            created_at: chrono::Utc::now().to_rfc3339(),
            tracks: result.tracks.clone(),
        }
    }
}
