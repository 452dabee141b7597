use std::fmt;

use serde::{Deserialize, Serialize};

/// Which elementary stream an encoder session produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Audio,
    Video,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Index of a track inside the container, assigned by the container writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackIndex(pub u32);

impl fmt::Display for TrackIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier handed out by the muxer coordinator when a session registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Sample flag bits, mirroring what hardware codecs attach to output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SampleFlags(u32);

impl SampleFlags {
    pub const NONE: Self = Self(0);
    pub const KEY_FRAME: Self = Self(1);
    pub const CODEC_CONFIG: Self = Self(1 << 1);
    pub const END_OF_STREAM: Self = Self(1 << 2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_key_frame(self) -> bool {
        self.contains(Self::KEY_FRAME)
    }

    pub fn is_codec_config(self) -> bool {
        self.contains(Self::CODEC_CONFIG)
    }

    pub fn is_end_of_stream(self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }
}

impl std::ops::BitOr for SampleFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Metadata accompanying one output buffer of a compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    /// Number of valid payload bytes. Zero for pure flag buffers.
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: SampleFlags,
}

/// A compressed sample on its way from an encoder to the container.
///
/// Transient: the payload is copied out of the compressor's output buffer and
/// written immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedSample {
    pub track: TrackIndex,
    pub data: Vec<u8>,
    pub presentation_time_us: i64,
    pub flags: SampleFlags,
}

/// Kind-specific stream parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamParams {
    Audio {
        sample_rate: u32,
        channels: u16,
    },
    Video {
        width: u32,
        height: u32,
        frame_rate: u32,
        i_frame_interval_secs: u32,
    },
}

/// Describes a stream to a compressor (requested format) or to a container
/// writer (negotiated output format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub mime: String,
    pub bit_rate: u32,
    pub params: StreamParams,
    /// Codec specific data blobs (e.g. SPS/PPS, AudioSpecificConfig).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codec_specific_data: Vec<Vec<u8>>,
}

impl FormatDescriptor {
    pub fn kind(&self) -> StreamKind {
        match self.params {
            StreamParams::Audio { .. } => StreamKind::Audio,
            StreamParams::Video { .. } => StreamKind::Video,
        }
    }
}

/// Audio capture sources, tried in priority order by the audio encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceKind {
    Mic,
    Default,
    Camcorder,
    VoiceCommunication,
    VoiceRecognition,
}

impl AudioSourceKind {
    /// Microphone first, then progressively more processed sources.
    pub fn default_priority() -> Vec<Self> {
        vec![
            Self::Mic,
            Self::Default,
            Self::Camcorder,
            Self::VoiceCommunication,
            Self::VoiceRecognition,
        ]
    }
}

/// Raw PCM layout delivered by a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Always 16 for the encoders in this crate.
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }
}

/// 4x4 column-major texture transform and model/view/projection matrices
/// used when drawing a camera frame into the video encoder's input surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransform {
    pub tex_matrix: [f32; 16],
    pub mvp_matrix: [f32; 16],
}

pub const IDENTITY_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

impl FrameTransform {
    /// Build from optional caller matrices. Missing or short matrices are
    /// replaced by identity.
    pub fn from_slices(tex_matrix: Option<&[f32]>, mvp_matrix: Option<&[f32]>) -> Self {
        Self {
            tex_matrix: matrix_or_identity(tex_matrix),
            mvp_matrix: matrix_or_identity(mvp_matrix),
        }
    }
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self {
            tex_matrix: IDENTITY_MATRIX,
            mvp_matrix: IDENTITY_MATRIX,
        }
    }
}

fn matrix_or_identity(matrix: Option<&[f32]>) -> [f32; 16] {
    match matrix {
        Some(m) if m.len() >= 16 => {
            let mut out = [0.0; 16];
            out.copy_from_slice(&m[..16]);
            out
        }
        _ => IDENTITY_MATRIX,
    }
}
