use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::config::{AudioEncoderConfig, RecorderConfiguration, VideoEncoderConfig};
use crate::models::error::RecorderError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::RecorderState;
use crate::models::stream::FrameTransform;
use crate::session::audio::AudioEncoder;
use crate::session::encoder::EncoderCore;
use crate::session::muxer::MuxerCoordinator;
use crate::session::video::VideoEncoder;
use crate::storage::metadata;
use crate::traits::audio_input::AudioInput;
use crate::traits::compressor::CodecProvider;
use crate::traits::container_writer::ContainerWriter;
use crate::traits::listener::EncoderListener;

/// Drives one recording: owns the muxer coordinator and up to one encoder per
/// stream kind, and fans control calls out to them.
///
/// ```text
/// new → add_video / add_audio → prepare → start_recording
///     → on_frame_available ... → stop_recording → await_completion
/// ```
pub struct Recorder {
    config: RecorderConfiguration,
    codecs: Arc<dyn CodecProvider>,
    muxer: Arc<MuxerCoordinator>,
    video: Option<VideoEncoder>,
    audio: Option<AudioEncoder>,
    listener: Option<Arc<dyn EncoderListener>>,
    state: Mutex<RecorderState>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl Recorder {
    /// Open `writer` at the configured output path.
    pub fn new(
        config: RecorderConfiguration,
        writer: Box<dyn ContainerWriter>,
        codecs: Arc<dyn CodecProvider>,
    ) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        let muxer = Arc::new(MuxerCoordinator::new(config.output_path(), writer)?);
        log::info!("recording to {}", muxer.output_path().display());

        Ok(Self {
            config,
            codecs,
            muxer,
            video: None,
            audio: None,
            listener: None,
            state: Mutex::new(RecorderState::Idle),
            started_at: None,
            stopped_at: None,
        })
    }

    pub fn output_path(&self) -> &Path {
        self.muxer.output_path()
    }

    pub fn state(&self) -> RecorderState {
        self.state.lock().clone()
    }

    pub fn video(&self) -> Option<&VideoEncoder> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&AudioEncoder> {
        self.audio.as_ref()
    }

    /// Listener for every encoder, current and future.
    pub fn set_listener(&mut self, listener: Option<Arc<dyn EncoderListener>>) {
        for core in self.cores() {
            core.set_listener(listener.clone());
        }
        self.listener = listener;
    }

    pub fn add_video(&mut self, config: VideoEncoderConfig) -> Result<&VideoEncoder, RecorderError> {
        self.expect_idle("add a video encoder")?;
        let encoder = VideoEncoder::new(&self.muxer, &self.config, config)?;
        encoder.core().set_listener(self.listener.clone());
        Ok(&*self.video.insert(encoder))
    }

    pub fn add_audio(
        &mut self,
        config: AudioEncoderConfig,
        input: Arc<dyn AudioInput>,
    ) -> Result<&AudioEncoder, RecorderError> {
        self.expect_idle("add an audio encoder")?;
        let encoder = AudioEncoder::new(&self.muxer, &self.config, config, input)?;
        encoder.core().set_listener(self.listener.clone());
        Ok(&*self.audio.insert(encoder))
    }

    /// Prepare every encoder.
    ///
    /// A failing encoder does not stop its siblings from being prepared; the
    /// first error is returned. The recorder still moves to `Prepared` when at
    /// least one encoder succeeded, but the container cannot start without
    /// every track, so such a recording ends in a start barrier timeout.
    pub fn prepare(&mut self) -> Result<(), RecorderError> {
        self.expect_idle("prepare")?;
        if self.video.is_none() && self.audio.is_none() {
            return Err(RecorderError::InvalidState("no encoder to prepare".into()));
        }

        let mut first_error = None;
        let mut prepared = 0;
        let results = [
            self.video.as_ref().map(|v| v.prepare(self.codecs.as_ref())),
            self.audio.as_ref().map(|a| a.prepare(self.codecs.as_ref())),
        ];
        for result in results.into_iter().flatten() {
            match result {
                Ok(()) => prepared += 1,
                Err(e) => {
                    log::error!("encoder failed to prepare: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if prepared > 0 {
            *self.state.lock() = RecorderState::Prepared;
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Start every prepared encoder, video first.
    pub fn start_recording(&mut self) -> Result<(), RecorderError> {
        {
            let state = self.state.lock();
            if *state != RecorderState::Prepared {
                return Err(RecorderError::InvalidState(format!("cannot start while {:?}", *state)));
            }
        }

        if let Some(video) = &self.video {
            if let Err(e) = video.start_recording() {
                log::warn!("video encoder not started: {}", e);
            }
        }
        if let Some(audio) = &self.audio {
            if let Err(e) = audio.start_recording() {
                log::warn!("audio encoder not started: {}", e);
            }
        }

        self.started_at = Some(Instant::now());
        *self.state.lock() = RecorderState::Recording;
        log::info!("recording started");
        Ok(())
    }

    /// Preview-frame hook, throttled to every other frame.
    pub fn on_frame_available(&self, transform: &FrameTransform) -> bool {
        self.video.as_ref().is_some_and(|v| v.on_frame_available(transform))
    }

    /// Draw and encode one video frame now.
    pub fn frame_available_soon(&self, transform: &FrameTransform) -> bool {
        self.video.as_ref().is_some_and(|v| v.frame_available_soon(transform))
    }

    /// Ask every encoder to stop. Does not block; see
    /// [`await_completion`](Self::await_completion).
    pub fn stop_recording(&mut self) {
        {
            let mut state = self.state.lock();
            if state.is_terminal() || *state == RecorderState::Stopping {
                return;
            }
            *state = RecorderState::Stopping;
        }
        self.stopped_at = Some(Instant::now());

        if let Some(video) = &self.video {
            video.stop_recording();
        }
        if let Some(audio) = &self.audio {
            audio.stop_recording();
        }
        log::info!("recording stop requested");
    }

    /// Wait for every encoder to release and the container to be finalized.
    ///
    /// Call after [`stop_recording`](Self::stop_recording). Writes the
    /// metadata sidecar when enabled.
    pub fn await_completion(&mut self, timeout: Duration) -> Result<RecordingResult, RecorderError> {
        match self.state() {
            RecorderState::Completed(result) => return Ok(*result),
            RecorderState::Failed(e) => return Err(e),
            RecorderState::Stopping => {}
            other => {
                return Err(RecorderError::InvalidState(format!(
                    "await_completion needs a stopped recorder, not {:?}",
                    other
                )))
            }
        }

        let deadline = Instant::now() + timeout;
        for core in self.cores() {
            if !core.wait_stopped(deadline.saturating_duration_since(Instant::now())) {
                return Err(RecorderError::InvalidState(format!(
                    "{} encoder did not stop within {} ms",
                    core.kind(),
                    timeout.as_millis()
                )));
            }
        }
        if let Some(audio) = &self.audio {
            audio.join_sampler();
        }

        // no session ever reached the start barrier
        if !self.muxer.is_finished() && self.muxer.started_count() == 0 {
            self.muxer.abandon();
        }
        let outcome = self
            .muxer
            .wait_finished(deadline.saturating_duration_since(Instant::now()))
            .unwrap_or_else(|| Err(RecorderError::InvalidState("container was not finalized".into())));

        let failure = self.cores().find_map(|core| core.failure());
        let result = outcome.and_then(|container| match failure {
            Some(e) => Err(e),
            None => Ok(container),
        });

        match result {
            Ok(container) => {
                let duration = match (self.started_at, self.stopped_at) {
                    (Some(start), Some(stop)) => stop.saturating_duration_since(start),
                    _ => Duration::ZERO,
                };
                let result = RecordingResult {
                    file_path: self.output_path().to_path_buf(),
                    duration_secs: duration.as_secs_f64(),
                    tracks: self.muxer.tracks(),
                    container,
                };
                if self.config.write_metadata {
                    let path = metadata::write_metadata(&RecordingMetadata::from_result(&result), &result.file_path)?;
                    log::debug!("metadata written to {}", path.display());
                }
                log::info!(
                    "recording finished: {:.2}s, {} bytes",
                    result.duration_secs,
                    result.container.bytes_written
                );
                *self.state.lock() = RecorderState::Completed(Box::new(result.clone()));
                Ok(result)
            }
            Err(e) => {
                log::error!("recording failed: {}", e);
                *self.state.lock() = RecorderState::Failed(e.clone());
                Err(e)
            }
        }
    }

    fn cores(&self) -> impl Iterator<Item = &EncoderCore> {
        self.video
            .as_ref()
            .map(VideoEncoder::core)
            .into_iter()
            .chain(self.audio.as_ref().map(AudioEncoder::core))
    }

    fn expect_idle(&self, action: &str) -> Result<(), RecorderError> {
        let state = self.state.lock();
        if state.is_idle() {
            Ok(())
        } else {
            Err(RecorderError::InvalidState(format!("cannot {} while {:?}", action, *state)))
        }
    }
}

/// Extra time granted on drop beyond the start barrier timeout.
const DROP_GRACE: Duration = Duration::from_secs(2);

/// Stops and waits for every encoder before the muxer goes away, so sessions
/// still flushing can cross the stop barrier and finalize the container.
impl Drop for Recorder {
    fn drop(&mut self) {
        for core in self.cores() {
            core.stop_recording();
        }

        let deadline = Instant::now() + self.config.start_barrier_timeout + DROP_GRACE;
        for core in self.cores() {
            if !core.wait_stopped(deadline.saturating_duration_since(Instant::now())) {
                log::warn!("{} encoder still running when the recorder was dropped", core.kind());
            }
        }
        if let Some(audio) = &self.audio {
            audio.join_sampler();
        }

        if !self.muxer.is_finished() && self.muxer.started_count() == 0 {
            self.muxer.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stream::{AudioSourceKind, StreamKind};
    use crate::storage::track_file_writer::{read_track_file, TrackFileWriter};
    use crate::test_support::{
        ListenerEvent, LoopbackCodecs, LoopbackCompressor, LoopbackRenderer, RecordingListener, RecordingWriter,
        ScriptedAudioInput,
    };
    use std::fs;
    use std::thread;

    const WAIT: Duration = Duration::from_secs(5);

    fn config(name: &str) -> RecorderConfiguration {
        RecorderConfiguration {
            file_name: Some(name.into()),
            write_metadata: false,
            start_barrier_timeout: Duration::from_millis(300),
            ..RecorderConfiguration::default()
        }
        .with_output_directory(std::env::temp_dir())
    }

    struct Rig {
        recorder: Recorder,
        video: Arc<LoopbackCompressor>,
        renderer: Arc<LoopbackRenderer>,
        listener: Arc<RecordingListener>,
    }

    fn rig(config: RecorderConfiguration, writer: Box<dyn ContainerWriter>) -> Rig {
        let video = LoopbackCompressor::video();
        let codecs = Arc::new(LoopbackCodecs {
            audio: Some(LoopbackCompressor::audio()),
            video: Some(Arc::clone(&video)),
        });
        let listener = RecordingListener::new();

        let mut recorder = Recorder::new(config, writer, codecs).unwrap();
        recorder.set_listener(Some(listener.clone()));
        recorder.add_video(VideoEncoderConfig::new(640, 480)).unwrap();
        recorder
            .add_audio(
                AudioEncoderConfig::default(),
                ScriptedAudioInput::working(&[AudioSourceKind::Mic]),
            )
            .unwrap();

        let renderer = LoopbackRenderer::new(Arc::clone(&video));
        Rig {
            recorder,
            video,
            renderer,
            listener,
        }
    }

    fn record_frames(recorder: &Recorder, count: usize) {
        let transform = FrameTransform::default();
        for _ in 0..count {
            recorder.on_frame_available(&transform);
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn records_both_tracks_end_to_end() {
        let writer = RecordingWriter::new();
        let Rig {
            mut recorder,
            video,
            renderer,
            listener,
        } = rig(config("avrec_test_e2e"), Box::new(writer.clone()));

        recorder.prepare().unwrap();
        assert_eq!(recorder.state(), RecorderState::Prepared);
        recorder.video().unwrap().bind_renderer(renderer.clone()).unwrap();

        recorder.start_recording().unwrap();
        assert!(recorder.state().is_recording());
        record_frames(&recorder, 20);
        recorder.stop_recording();
        assert!(!recorder.on_frame_available(&FrameTransform::default()));

        let result = recorder.await_completion(WAIT).unwrap();
        assert_eq!(result.file_path, std::env::temp_dir().join("avrec_test_e2e.mp4"));
        assert!(result.duration_secs > 0.0);
        assert_eq!(result.tracks.len(), 2);
        assert!(result.tracks.iter().all(|t| t.samples_written > 0));

        let log = writer.log();
        assert_eq!(log.starts, 1);
        assert_eq!(log.finalizes, 1);
        assert_eq!(log.abandons, 0);
        assert_eq!(renderer.draw_count(), 10);
        assert!(video.eos_signaled());
        assert!(*renderer.released.lock());

        for track in &result.tracks {
            let pts: Vec<_> = log
                .samples
                .iter()
                .filter(|s| s.track == track.index)
                .map(|s| s.presentation_time_us)
                .collect();
            assert_eq!(pts.len() as u64, track.samples_written);
            assert!(pts.windows(2).all(|w| w[0] <= w[1]));
        }

        let events = listener.events();
        assert!(events.contains(&ListenerEvent::Prepared(StreamKind::Video)));
        assert!(events.contains(&ListenerEvent::Prepared(StreamKind::Audio)));
        assert!(events.contains(&ListenerEvent::Stopped(StreamKind::Video)));
        assert!(events.contains(&ListenerEvent::Stopped(StreamKind::Audio)));
        assert!(!events.iter().any(|e| matches!(e, ListenerEvent::Error(..))));

        assert!(matches!(recorder.state(), RecorderState::Completed(_)));
        assert_eq!(recorder.await_completion(WAIT), Ok(result));
    }

    #[test]
    fn writes_track_file_and_sidecar() {
        let config = RecorderConfiguration {
            write_metadata: true,
            extension: "avmx".into(),
            ..config("avrec_test_track_file")
        };
        let Rig {
            mut recorder,
            renderer,
            ..
        } = rig(config, Box::new(TrackFileWriter::new()));

        recorder.prepare().unwrap();
        recorder.video().unwrap().bind_renderer(renderer).unwrap();
        recorder.start_recording().unwrap();
        record_frames(&recorder, 10);
        recorder.stop_recording();
        let result = recorder.await_completion(WAIT).unwrap();

        let path = std::env::temp_dir().join("avrec_test_track_file.avmx");
        assert_eq!(result.file_path, path);
        let file = read_track_file(&path).unwrap();
        assert_eq!(file.tracks.len(), 2);
        let written: u64 = result.tracks.iter().map(|t| t.samples_written).sum();
        assert_eq!(file.sample_count, written);
        assert_eq!(file.samples.len() as u64, written);

        let sidecar = metadata::read_metadata(&path).unwrap();
        assert_eq!(sidecar.checksum, result.container.checksum);
        assert_eq!(sidecar.tracks, result.tracks);

        fs::remove_file(&path).ok();
        fs::remove_file(metadata::metadata_path(&path)).ok();
    }

    #[test]
    fn missing_video_codec_stalls_the_start_barrier() {
        let writer = RecordingWriter::new();
        let codecs = Arc::new(LoopbackCodecs {
            audio: Some(LoopbackCompressor::audio()),
            video: None,
        });
        let listener = RecordingListener::new();
        let mut recorder = Recorder::new(config("avrec_test_no_video"), Box::new(writer.clone()), codecs).unwrap();
        recorder.set_listener(Some(listener.clone()));
        recorder.add_video(VideoEncoderConfig::new(640, 480)).unwrap();
        recorder
            .add_audio(AudioEncoderConfig::default(), ScriptedAudioInput::broken())
            .unwrap();

        assert_eq!(
            recorder.prepare(),
            Err(RecorderError::CodecUnavailable("video/avc".into()))
        );
        assert_eq!(recorder.state(), RecorderState::Prepared);

        recorder.start_recording().unwrap();
        let audio = recorder.audio().unwrap().core().clone();
        assert!(audio.wait_stopped(WAIT));
        assert_eq!(audio.failure(), Some(RecorderError::StartBarrierTimeout { waited_ms: 300 }));

        recorder.stop_recording();
        assert_eq!(recorder.await_completion(WAIT), Err(RecorderError::ContainerNeverStarted));
        assert!(matches!(recorder.state(), RecorderState::Failed(_)));

        let log = writer.log();
        assert_eq!(log.starts, 0);
        assert_eq!(log.abandons, 1);
        assert!(listener.events().contains(&ListenerEvent::Error(
            StreamKind::Audio,
            RecorderError::StartBarrierTimeout { waited_ms: 300 }
        )));
    }

    #[test]
    fn stop_before_start_abandons_the_container() {
        let writer = RecordingWriter::new();
        let Rig { mut recorder, .. } = rig(config("avrec_test_early_stop"), Box::new(writer.clone()));
        recorder.prepare().unwrap();
        recorder.stop_recording();

        assert_eq!(recorder.await_completion(WAIT), Err(RecorderError::ContainerNeverStarted));
        let log = writer.log();
        assert_eq!(log.starts, 0);
        assert_eq!(log.finalizes, 0);
        assert_eq!(log.abandons, 1);
    }

    #[test]
    fn dropping_after_stop_still_finalizes() {
        let writer = RecordingWriter::new();
        let Rig {
            mut recorder,
            renderer,
            listener,
            ..
        } = rig(config("avrec_test_drop"), Box::new(writer.clone()));

        recorder.prepare().unwrap();
        recorder.video().unwrap().bind_renderer(renderer).unwrap();
        recorder.start_recording().unwrap();
        record_frames(&recorder, 20);
        recorder.stop_recording();
        drop(recorder);

        let events = listener.events();
        assert!(events.contains(&ListenerEvent::Stopped(StreamKind::Video)));
        assert!(events.contains(&ListenerEvent::Stopped(StreamKind::Audio)));

        let log = writer.log();
        assert_eq!(log.starts, 1);
        assert_eq!(log.finalizes, 1);
        assert_eq!(log.abandons, 0);
        assert!(!log.samples.is_empty());
    }

    #[test]
    fn dropping_an_unstarted_recorder_abandons_the_container() {
        let writer = RecordingWriter::new();
        let Rig { mut recorder, .. } = rig(config("avrec_test_drop_idle"), Box::new(writer.clone()));
        recorder.prepare().unwrap();
        drop(recorder);

        let log = writer.log();
        assert_eq!(log.starts, 0);
        assert_eq!(log.finalizes, 0);
        assert_eq!(log.abandons, 1);
    }

    #[test]
    fn lifecycle_is_enforced() {
        let Rig { mut recorder, .. } = rig(config("avrec_test_lifecycle"), Box::new(RecordingWriter::new()));

        assert!(matches!(recorder.start_recording(), Err(RecorderError::InvalidState(_))));
        assert!(matches!(recorder.await_completion(WAIT), Err(RecorderError::InvalidState(_))));
        assert!(matches!(
            recorder.add_video(VideoEncoderConfig::new(320, 240)),
            Err(RecorderError::DuplicateTrack(StreamKind::Video))
        ));

        recorder.prepare().unwrap();
        assert!(matches!(
            recorder.add_audio(AudioEncoderConfig::default(), ScriptedAudioInput::broken()),
            Err(RecorderError::InvalidState(_))
        ));
        assert!(matches!(recorder.prepare(), Err(RecorderError::InvalidState(_))));
    }

    #[test]
    fn needs_at_least_one_encoder() {
        let mut recorder = Recorder::new(
            config("avrec_test_empty"),
            Box::new(RecordingWriter::new()),
            Arc::new(LoopbackCodecs { audio: None, video: None }),
        )
        .unwrap();
        assert!(matches!(recorder.prepare(), Err(RecorderError::InvalidState(_))));
    }
}
