use std::path::{Path, PathBuf};
use std::time::Duration;

use super::stream::{AudioSourceKind, FormatDescriptor, PcmFormat, StreamParams};

/// Recording-wide settings shared by the muxer coordinator and every encoder.
#[derive(Debug, Clone)]
pub struct RecorderConfiguration {
    /// Directory where the container file is written.
    pub output_directory: PathBuf,

    /// File stem. `None` derives one from the local time (`yyyy-MM-dd-HH-mm-ss`).
    pub file_name: Option<String>,

    /// Container extension (default: `.mp4`, `.m4a` works for audio only).
    pub extension: String,

    /// Timeout for each poll of a compressor queue (default: 10 ms).
    pub poll_timeout: Duration,

    /// Consecutive empty polls tolerated before a drain pass gives up,
    /// as long as end-of-stream has not been signaled (default: 5).
    pub max_empty_polls: u32,

    /// How long an encoder waits for its sibling tracks at the start barrier.
    pub start_barrier_timeout: Duration,

    /// Upper bound on one idle wait of the encoding thread.
    pub heartbeat: Duration,

    /// Write `<file>.metadata.json` next to the recording (default: true).
    pub write_metadata: bool,
}

impl RecorderConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_timeout.is_zero() {
            return Err("poll timeout must be positive".into());
        }
        if self.max_empty_polls == 0 {
            return Err("max empty polls must be at least 1".into());
        }
        if self.heartbeat.is_zero() {
            return Err("heartbeat must be positive".into());
        }
        if let Some(name) = &self.file_name {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(format!("invalid file name: {:?}", name));
            }
        }
        Ok(())
    }

    /// Extension with a leading dot; empty falls back to `.mp4`.
    pub fn normalized_extension(&self) -> String {
        let ext = self.extension.trim();
        if ext.is_empty() {
            ".mp4".to_string()
        } else if ext.starts_with('.') {
            ext.to_string()
        } else {
            format!(".{}", ext)
        }
    }

    /// Resolve the output path, generating a timestamped name when needed.
    pub fn output_path(&self) -> PathBuf {
        let stem = self
            .file_name
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string());
        self.output_directory
            .join(format!("{}{}", stem, self.normalized_extension()))
    }

    pub fn with_output_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_directory = dir.as_ref().to_path_buf();
        self
    }
}

impl Default for RecorderConfiguration {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            file_name: None,
            extension: ".mp4".into(),
            poll_timeout: Duration::from_millis(10),
            max_empty_polls: 5,
            start_barrier_timeout: Duration::from_secs(5),
            heartbeat: Duration::from_millis(100),
            write_metadata: true,
        }
    }
}

/// H.264 encoder settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncoderConfig {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Bits per pixel used to derive the bit rate.
    pub bits_per_pixel: f32,
    pub i_frame_interval_secs: u32,
}

impl VideoEncoderConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn bit_rate(&self) -> u32 {
        (self.bits_per_pixel * self.frame_rate as f32 * self.width as f32 * self.height as f32) as u32
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("invalid frame size {}x{}", self.width, self.height));
        }
        if self.frame_rate == 0 {
            return Err("frame rate must be positive".into());
        }
        if self.bits_per_pixel <= 0.0 {
            return Err("bits per pixel must be positive".into());
        }
        Ok(())
    }

    /// Format requested from the codec provider.
    pub fn format(&self) -> FormatDescriptor {
        FormatDescriptor {
            mime: self.mime.clone(),
            bit_rate: self.bit_rate(),
            params: StreamParams::Video {
                width: self.width,
                height: self.height,
                frame_rate: self.frame_rate,
                i_frame_interval_secs: self.i_frame_interval_secs,
            },
            codec_specific_data: Vec::new(),
        }
    }
}

impl Default for VideoEncoderConfig {
    fn default() -> Self {
        Self {
            mime: "video/avc".into(),
            width: 1280,
            height: 720,
            frame_rate: 25,
            bits_per_pixel: 0.25,
            i_frame_interval_secs: 10,
        }
    }
}

/// AAC encoder and microphone sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioEncoderConfig {
    pub mime: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
    /// PCM samples per channel handed to the encoder per read (AAC frame size).
    pub samples_per_frame: usize,
    pub frames_per_buffer: usize,
    /// Capture sources in the order they are tried.
    pub sources: Vec<AudioSourceKind>,
    /// Silent frames emitted when nothing was captured.
    pub placeholder_frames: u32,
    pub placeholder_interval: Duration,
}

impl AudioEncoderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.samples_per_frame == 0 || self.frames_per_buffer == 0 {
            return Err("frame sizes must be positive".into());
        }
        if self.sources.is_empty() {
            return Err("at least one audio source is required".into());
        }
        Ok(())
    }

    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: 16,
        }
    }

    /// Bytes read from the capture source per chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.samples_per_frame * self.pcm_format().bytes_per_frame()
    }

    /// Capture buffer size, never smaller than the device minimum.
    pub fn buffer_size(&self, min_buffer_size: usize) -> usize {
        let preferred = self.samples_per_frame * self.frames_per_buffer;
        if preferred < min_buffer_size {
            (min_buffer_size / self.samples_per_frame + 1) * self.samples_per_frame * 2
        } else {
            preferred
        }
    }

    pub fn format(&self) -> FormatDescriptor {
        FormatDescriptor {
            mime: self.mime.clone(),
            bit_rate: self.bit_rate,
            params: StreamParams::Audio {
                sample_rate: self.sample_rate,
                channels: self.channels,
            },
            codec_specific_data: Vec::new(),
        }
    }
}

impl Default for AudioEncoderConfig {
    fn default() -> Self {
        Self {
            mime: "audio/mp4a-latm".into(),
            // 44.1 kHz is the only rate every device is guaranteed to support.
            sample_rate: 44_100,
            channels: 1,
            bit_rate: 64_000,
            samples_per_frame: 1024,
            frames_per_buffer: 25,
            sources: AudioSourceKind::default_priority(),
            placeholder_frames: 5,
            placeholder_interval: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_normalized() {
        let mut config = RecorderConfiguration::default();
        assert_eq!(config.normalized_extension(), ".mp4");

        config.extension = "m4a".into();
        assert_eq!(config.normalized_extension(), ".m4a");

        config.extension = String::new();
        assert_eq!(config.normalized_extension(), ".mp4");
    }

    #[test]
    fn output_path_uses_file_name_when_given() {
        let config = RecorderConfiguration {
            file_name: Some("take-1".into()),
            ..Default::default()
        }
        .with_output_directory("/tmp/rec");
        assert_eq!(config.output_path(), PathBuf::from("/tmp/rec/take-1.mp4"));
    }

    #[test]
    fn output_path_defaults_to_timestamp() {
        let config = RecorderConfiguration::default();
        let path = config.output_path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        // yyyy-MM-dd-HH-mm-ss.mp4
        assert_eq!(name.len(), 19 + 4);
        assert!(name.ends_with(".mp4"));
        assert_eq!(name.matches('-').count(), 5);
    }

    #[test]
    fn rejects_bad_file_names() {
        let config = RecorderConfiguration {
            file_name: Some("a/b".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(RecorderConfiguration::default().validate().is_ok());
    }

    #[test]
    fn video_bit_rate_from_bits_per_pixel() {
        let config = VideoEncoderConfig::new(640, 480);
        // 0.25 * 25 * 640 * 480
        assert_eq!(config.bit_rate(), 1_920_000);
        assert!(VideoEncoderConfig::new(0, 480).validate().is_err());
    }

    #[test]
    fn audio_buffer_size_respects_device_minimum() {
        let config = AudioEncoderConfig::default();
        assert_eq!(config.buffer_size(4096), 1024 * 25);
        // (30000 / 1024 + 1) * 1024 * 2
        assert_eq!(config.buffer_size(30_000), 30 * 1024 * 2);
    }

    #[test]
    fn audio_chunk_is_one_frame_of_16_bit_pcm() {
        let config = AudioEncoderConfig::default();
        assert_eq!(config.chunk_bytes(), 2048);
        assert!(config.validate().is_ok());

        let stereo = AudioEncoderConfig {
            channels: 2,
            ..Default::default()
        };
        assert_eq!(stereo.chunk_bytes(), 4096);
    }
}
