use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::RecorderError;
use crate::models::recording_result::{ContainerSummary, TrackSummary};
use crate::models::stream::{BufferInfo, FormatDescriptor, SessionId, StreamKind, TrackIndex};
use crate::traits::container_writer::ContainerWriter;

/// Longest single wait while blocked on the start barrier.
const START_WAIT_SLICE: Duration = Duration::from_millis(100);

/// Mutable coordinator state. Every field is guarded by the one mutex shared
/// by all sessions of a recording.
struct MuxerState {
    writer: Box<dyn ContainerWriter>,
    audio: Option<SessionId>,
    video: Option<SessionId>,
    encoder_count: usize,
    started_count: i32,
    is_started: bool,
    start_error: Option<RecorderError>,
    outcome: Option<Result<ContainerSummary, RecorderError>>,
    tracks: Vec<TrackSummary>,
}

impl MuxerState {
    fn track_mut(&mut self, index: TrackIndex) -> Option<&mut TrackSummary> {
        self.tracks.iter_mut().find(|t| t.index == index)
    }
}

/// Owns the container writer and enforces the multi-encoder start/stop
/// barrier.
///
/// ```text
/// [audio encoder] ─┐  add_track / start_barrier / write_sample / stop_barrier
///                  ├─→ [MuxerCoordinator (one mutex)] → [ContainerWriter]
/// [video encoder] ─┘
/// ```
///
/// The container starts exactly once, when every registered session passed
/// the start barrier, and is finalized exactly once, when the started count
/// drops back to zero.
pub struct MuxerCoordinator {
    output_path: PathBuf,
    state: Mutex<MuxerState>,
    started: Condvar,
    finished: Condvar,
    next_session: AtomicU64,
}

impl MuxerCoordinator {
    /// Open `writer` on `output_path`. Tracks are added later by the encoders.
    pub fn new(output_path: PathBuf, mut writer: Box<dyn ContainerWriter>) -> Result<Self, RecorderError> {
        writer.open(&output_path)?;
        log::debug!("container opened at {}", output_path.display());

        Ok(Self {
            output_path,
            state: Mutex::new(MuxerState {
                writer,
                audio: None,
                video: None,
                encoder_count: 0,
                started_count: 0,
                is_started: false,
                start_error: None,
                outcome: None,
                tracks: Vec::new(),
            }),
            started: Condvar::new(),
            finished: Condvar::new(),
            next_session: AtomicU64::new(1),
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Register an encoder session. At most one audio and one video session.
    pub fn register_session(&self, kind: StreamKind) -> Result<SessionId, RecorderError> {
        let mut s = self.state.lock();
        if s.is_started {
            return Err(RecorderError::AlreadyStarted);
        }

        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let slot = match kind {
            StreamKind::Audio => &mut s.audio,
            StreamKind::Video => &mut s.video,
        };
        if slot.is_some() {
            return Err(RecorderError::DuplicateTrack(kind));
        }
        *slot = Some(id);

        s.encoder_count = s.audio.is_some() as usize + s.video.is_some() as usize;
        log::debug!("registered {} session, expecting {} encoder(s)", kind, s.encoder_count);
        Ok(id)
    }

    /// Number of sessions the start barrier waits for.
    pub fn encoder_count(&self) -> usize {
        self.state.lock().encoder_count
    }

    /// Declare a track. Only allowed before the container started.
    pub fn add_track(&self, format: &FormatDescriptor) -> Result<TrackIndex, RecorderError> {
        let mut s = self.state.lock();
        if s.is_started {
            return Err(RecorderError::AlreadyStarted);
        }

        let index = s.writer.add_track(format)?;
        log::info!(
            "added {} track {} ({}), {} encoder(s) registered",
            format.kind(),
            index,
            format.mime,
            s.encoder_count
        );
        s.tracks.push(TrackSummary {
            kind: format.kind(),
            index,
            mime: format.mime.clone(),
            samples_written: 0,
            bytes_written: 0,
            samples_dropped: 0,
        });
        Ok(index)
    }

    /// Signal that one session's track is declared. Starts the container when
    /// the last registered session arrives.
    ///
    /// Returns whether the container is started; `false` means the caller
    /// must wait (see [`wait_until_started`](Self::wait_until_started)).
    pub fn start_barrier(&self) -> bool {
        let mut s = self.state.lock();
        s.started_count += 1;
        log::debug!("start barrier: {}/{}", s.started_count, s.encoder_count);

        if s.encoder_count > 0 && s.started_count == s.encoder_count as i32 && !s.is_started && s.outcome.is_none() {
            match s.writer.start() {
                Ok(()) => {
                    s.is_started = true;
                    log::info!("container started: {}", self.output_path.display());
                }
                Err(e) => {
                    log::error!("failed to start container: {}", e);
                    s.start_error = Some(e);
                }
            }
            self.started.notify_all();
        }
        s.is_started
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().is_started
    }

    pub fn started_count(&self) -> i32 {
        self.state.lock().started_count
    }

    /// Block until the container started, the writer refused to start, or
    /// `timeout` elapsed. A missing sibling format surfaces here as
    /// [`RecorderError::StartBarrierTimeout`] instead of a silent hang.
    pub fn wait_until_started(&self, timeout: Duration) -> Result<(), RecorderError> {
        let deadline = Instant::now() + timeout;
        let mut s = self.state.lock();
        loop {
            if s.is_started {
                return Ok(());
            }
            if let Some(e) = &s.start_error {
                return Err(e.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "start barrier stalled at {}/{} after {:?}",
                    s.started_count,
                    s.encoder_count,
                    timeout
                );
                return Err(RecorderError::StartBarrierTimeout {
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            let slice = (deadline - now).min(START_WAIT_SLICE);
            self.started.wait_for(&mut s, slice);
        }
    }

    /// Forward one sample to the container.
    ///
    /// Returns `Ok(false)` when the sample was dropped because the container
    /// is not running. A writer error is reported as
    /// [`RecorderError::WriteFailure`]; the sample is lost but the stream goes on.
    pub fn write_sample(&self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<bool, RecorderError> {
        let mut s = self.state.lock();
        if s.started_count <= 0 || !s.is_started {
            if let Some(t) = s.track_mut(track) {
                t.samples_dropped += 1;
            }
            return Ok(false);
        }

        match s.writer.write_sample(track, data, info) {
            Ok(()) => {
                if let Some(t) = s.track_mut(track) {
                    t.samples_written += 1;
                    t.bytes_written += data.len() as u64;
                }
                Ok(true)
            }
            Err(e) => {
                if let Some(t) = s.track_mut(track) {
                    t.samples_dropped += 1;
                }
                Err(match e {
                    RecorderError::WriteFailure(_) => e,
                    other => RecorderError::WriteFailure(other.to_string()),
                })
            }
        }
    }

    /// Signal that one started session finished. Finalizes the container when
    /// the started count reaches zero. Later calls are no-ops.
    pub fn stop_barrier(&self) {
        let mut s = self.state.lock();
        s.started_count -= 1;
        log::debug!("stop barrier: {} session(s) still running", s.started_count.max(0));

        if s.encoder_count > 0 && s.started_count <= 0 && s.outcome.is_none() {
            let outcome = if s.is_started {
                s.writer.finalize()
            } else {
                s.writer.abandon();
                Err(RecorderError::ContainerNeverStarted)
            };
            match &outcome {
                Ok(summary) => log::info!(
                    "container finalized: {} ({} bytes)",
                    self.output_path.display(),
                    summary.bytes_written
                ),
                Err(e) => log::error!("container not finalized: {}", e),
            }
            s.is_started = false;
            s.outcome = Some(outcome);
            self.finished.notify_all();
        }
    }

    /// Close out a recording in which no session ever reached the start
    /// barrier. Does nothing if the container was already finalized.
    pub fn abandon(&self) {
        let mut s = self.state.lock();
        if s.outcome.is_some() {
            return;
        }
        if s.is_started {
            log::warn!("abandoning a started container: {}", self.output_path.display());
        }
        s.writer.abandon();
        s.is_started = false;
        s.outcome = Some(Err(RecorderError::ContainerNeverStarted));
        self.finished.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    /// Wait for the stop barrier to finalize the container.
    ///
    /// Returns `None` on timeout.
    pub fn wait_finished(&self, timeout: Duration) -> Option<Result<ContainerSummary, RecorderError>> {
        let deadline = Instant::now() + timeout;
        let mut s = self.state.lock();
        while s.outcome.is_none() {
            if self.finished.wait_until(&mut s, deadline).timed_out() {
                break;
            }
        }
        s.outcome.clone()
    }

    /// Per-track totals so far.
    pub fn tracks(&self) -> Vec<TrackSummary> {
        self.state.lock().tracks.clone()
    }
}
