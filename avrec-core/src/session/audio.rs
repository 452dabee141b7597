use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::{AudioEncoderConfig, RecorderConfiguration};
use crate::models::error::RecorderError;
use crate::models::stream::{AudioSourceKind, StreamKind};
use crate::processing::pcm;
use crate::session::encoder::{EncoderCore, InputMode};
use crate::session::muxer::MuxerCoordinator;
use crate::traits::audio_input::{AudioInput, PcmReader};
use crate::traits::compressor::CodecProvider;

/// AAC encoding session fed by a PCM capture thread.
///
/// Capture sources are tried in the configured order. When nothing could be
/// captured at all, a short burst of silent frames is pushed instead so the
/// audio track still exists and the container can start.
pub struct AudioEncoder {
    core: EncoderCore,
    config: AudioEncoderConfig,
    input: Arc<dyn AudioInput>,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl AudioEncoder {
    pub fn new(
        muxer: &Arc<MuxerCoordinator>,
        settings: &RecorderConfiguration,
        config: AudioEncoderConfig,
        input: Arc<dyn AudioInput>,
    ) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        let core = EncoderCore::new(StreamKind::Audio, InputMode::Buffers, muxer, settings)?;
        Ok(Self {
            core,
            config,
            input,
            sampler: Mutex::new(None),
        })
    }

    pub fn core(&self) -> &EncoderCore {
        &self.core
    }

    pub fn config(&self) -> &AudioEncoderConfig {
        &self.config
    }

    pub fn prepare(&self, codecs: &dyn CodecProvider) -> Result<(), RecorderError> {
        self.core.prepare(codecs, &self.config.format())
    }

    /// Start the session and its sampling thread.
    pub fn start_recording(&self) -> Result<(), RecorderError> {
        self.core.start_recording()?;

        let mut sampler = self.sampler.lock();
        if sampler.is_none() {
            let core = self.core.clone();
            let input = Arc::clone(&self.input);
            let config = self.config.clone();
            let handle = thread::Builder::new()
                .name("audio-sampler".into())
                .spawn(move || sample(&core, input.as_ref(), &config))
                .map_err(|e| RecorderError::InvalidState(format!("failed to spawn audio sampler: {}", e)))?;
            *sampler = Some(handle);
        }
        Ok(())
    }

    pub fn frame_available_soon(&self) -> bool {
        self.core.frame_available_soon()
    }

    pub fn stop_recording(&self) {
        self.core.stop_recording();
    }

    /// Wait for the sampling thread to exit, if it was started.
    pub fn join_sampler(&self) {
        if let Some(handle) = self.sampler.lock().take() {
            if handle.join().is_err() {
                log::error!("audio sampler panicked");
            }
        }
    }
}

fn sample(core: &EncoderCore, input: &dyn AudioInput, config: &AudioEncoderConfig) {
    let frames = match open_source(input, config) {
        Ok((source, mut reader)) => {
            log::info!("audio capture using {:?} source", source);
            let frames = capture(core, reader.as_mut(), config);
            reader.stop();
            frames
        }
        Err(e) => {
            log::error!("audio capture unavailable: {}", e);
            0
        }
    };

    if frames == 0 {
        emit_placeholders(core, config);
    }
    log::debug!("audio sampler finished after {} frame(s)", frames);
}

fn open_source(
    input: &dyn AudioInput,
    config: &AudioEncoderConfig,
) -> Result<(AudioSourceKind, Box<dyn PcmReader>), RecorderError> {
    let format = config.pcm_format();
    let min_buffer_size = input.min_buffer_size(&format).unwrap_or(0);
    let buffer_size = config.buffer_size(min_buffer_size);

    for &source in &config.sources {
        match input.open(source, &format, buffer_size) {
            Ok(reader) => return Ok((source, reader)),
            Err(e) => log::warn!("audio source {:?} unavailable: {}", source, e),
        }
    }
    Err(RecorderError::CaptureSourceUnavailable(format!(
        "none of {} source(s) could be opened",
        config.sources.len()
    )))
}

fn capture(core: &EncoderCore, reader: &mut dyn PcmReader, config: &AudioEncoderConfig) -> u64 {
    if !core.is_capturing() {
        return 0;
    }
    if let Err(e) = reader.start() {
        log::error!("audio capture failed to start: {}", e);
        return 0;
    }

    let mut buf = vec![0u8; config.chunk_bytes()];
    let mut frames = 0u64;
    while core.is_capturing() && !core.is_stop_requested() && !core.is_eos() {
        match reader.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if let Err(e) = core.encode(&buf[..n], core.next_timestamp(), false) {
                    log::error!("audio encode failed: {}", e);
                    break;
                }
                core.frame_available_soon();
                frames += 1;
            }
            Err(e) => {
                log::error!("audio read failed: {}", e);
                break;
            }
        }
    }
    core.frame_available_soon();
    frames
}

fn emit_placeholders(core: &EncoderCore, config: &AudioEncoderConfig) {
    let chunk = pcm::silence(config.chunk_bytes());
    let mut sent = 0u32;
    while sent < config.placeholder_frames
        && core.is_capturing()
        && !core.is_stop_requested()
        && !core.is_eos()
    {
        if let Err(e) = core.encode(&chunk, core.next_timestamp(), false) {
            log::warn!("silent frame rejected: {}", e);
            break;
        }
        core.frame_available_soon();
        sent += 1;
        thread::sleep(config.placeholder_interval.max(Duration::from_millis(1)));
    }
    log::warn!("no audio captured, sent {} silent frame(s)", sent);
}
