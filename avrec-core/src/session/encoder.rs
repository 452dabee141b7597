use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::models::config::RecorderConfiguration;
use crate::models::error::RecorderError;
use crate::models::state::EncoderState;
use crate::models::stream::{FormatDescriptor, SessionId, StreamKind, TrackIndex};
use crate::processing::presentation_clock::PresentationClock;
use crate::session::muxer::MuxerCoordinator;
use crate::traits::compressor::{CodecProvider, Compressor, OutputEvent, SurfaceHandle};
use crate::traits::listener::EncoderListener;

/// How input reaches the compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Raw buffers pushed through [`EncoderCore::encode`].
    Buffers,
    /// Frames drawn into the compressor's input surface by a renderer.
    Surface,
}

/// Timing knobs copied out of [`RecorderConfiguration`].
#[derive(Debug, Clone, Copy)]
struct DrainSettings {
    poll_timeout: Duration,
    max_empty_polls: u32,
    start_barrier_timeout: Duration,
    heartbeat: Duration,
}

/// Flags guarded by the session mutex and signalled through its condvar.
struct Signals {
    state: EncoderState,
    is_capturing: bool,
    request_stop: bool,
    request_drain: u32,
    thread_running: bool,
    releasing: bool,
}

#[derive(Default)]
struct TrackState {
    index: Option<TrackIndex>,
    muxer_started: bool,
}

struct EncoderShared {
    kind: StreamKind,
    session: SessionId,
    input_mode: InputMode,
    settings: DrainSettings,
    signals: Mutex<Signals>,
    cond: Condvar,
    is_eos: AtomicBool,
    track: Mutex<TrackState>,
    compressor: Mutex<Option<Arc<dyn Compressor>>>,
    muxer: Weak<MuxerCoordinator>,
    clock: PresentationClock,
    listener: RwLock<Option<Arc<dyn EncoderListener>>>,
    failure: Mutex<Option<RecorderError>>,
    release_hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Shared machinery of one encoding session.
///
/// Each session owns a dedicated encoding thread. The thread sleeps on the
/// session condvar until a drain or stop is requested, pulls compressed
/// samples out of the compressor and hands them to the [`MuxerCoordinator`].
///
/// ```text
/// capture thread ── encode() ──→ [Compressor] ──→ drain() ──→ MuxerCoordinator
///         └── frame_available_soon() ─→ request_drain ─┘ (encoding thread)
/// ```
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct EncoderCore {
    shared: Arc<EncoderShared>,
}

impl EncoderCore {
    /// Register a session of `kind` with `muxer` and start its encoding thread.
    ///
    /// Returns once the thread is up and waiting for work.
    pub fn new(
        kind: StreamKind,
        input_mode: InputMode,
        muxer: &Arc<MuxerCoordinator>,
        config: &RecorderConfiguration,
    ) -> Result<Self, RecorderError> {
        let session = muxer.register_session(kind)?;

        let shared = Arc::new(EncoderShared {
            kind,
            session,
            input_mode,
            settings: DrainSettings {
                poll_timeout: config.poll_timeout,
                max_empty_polls: config.max_empty_polls,
                start_barrier_timeout: config.start_barrier_timeout,
                heartbeat: config.heartbeat,
            },
            signals: Mutex::new(Signals {
                state: EncoderState::Idle,
                is_capturing: false,
                request_stop: false,
                request_drain: 0,
                thread_running: false,
                releasing: false,
            }),
            cond: Condvar::new(),
            is_eos: AtomicBool::new(false),
            track: Mutex::new(TrackState::default()),
            compressor: Mutex::new(None),
            muxer: Arc::downgrade(muxer),
            clock: PresentationClock::new(),
            listener: RwLock::new(None),
            failure: Mutex::new(None),
            release_hooks: Mutex::new(Vec::new()),
            thread: Mutex::new(None),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("{}-encoder", kind))
            .spawn(move || worker.run())
            .map_err(|e| RecorderError::InvalidState(format!("failed to spawn {} encoder thread: {}", kind, e)))?;

        {
            let mut signals = shared.signals.lock();
            while !signals.thread_running {
                shared.cond.wait(&mut signals);
            }
        }
        *shared.thread.lock() = Some(handle);

        log::debug!("{} session {} ready", kind, session.0);
        Ok(Self { shared })
    }

    pub fn kind(&self) -> StreamKind {
        self.shared.kind
    }

    pub fn session_id(&self) -> SessionId {
        self.shared.session
    }

    pub fn state(&self) -> EncoderState {
        self.shared.signals.lock().state
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.is_capturing()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.signals.lock().request_stop
    }

    /// Whether the end-of-stream marker has been handed to the compressor.
    pub fn is_eos(&self) -> bool {
        self.shared.is_eos.load(Ordering::SeqCst)
    }

    /// Track assigned by the muxer once the compressor reported its format.
    pub fn track_index(&self) -> Option<TrackIndex> {
        self.shared.track.lock().index
    }

    /// First fatal error hit by this session, if any.
    pub fn failure(&self) -> Option<RecorderError> {
        self.shared.failure.lock().clone()
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn EncoderListener>>) {
        *self.shared.listener.write() = listener;
    }

    /// Timestamp for the next input buffer.
    pub fn next_timestamp(&self) -> i64 {
        self.shared.clock.next()
    }

    /// Input surface of the prepared compressor, for surface-fed sessions.
    pub fn input_surface(&self) -> Option<SurfaceHandle> {
        self.shared.compressor().and_then(|c| c.input_surface())
    }

    /// Run `hook` on the encoding thread when the session is released.
    pub(crate) fn on_release(&self, hook: impl FnOnce() + Send + 'static) {
        self.shared.release_hooks.lock().push(Box::new(hook));
    }

    /// Create and configure the compressor for `format`.
    ///
    /// Notifies the listener with `on_prepared` on success.
    pub fn prepare(&self, codecs: &dyn CodecProvider, format: &FormatDescriptor) -> Result<(), RecorderError> {
        let kind = self.shared.kind;
        {
            let signals = self.shared.signals.lock();
            if signals.state != EncoderState::Idle {
                return Err(RecorderError::InvalidState(format!(
                    "{} encoder cannot prepare while {:?}",
                    kind, signals.state
                )));
            }
        }

        *self.shared.track.lock() = TrackState::default();
        self.shared.is_eos.store(false, Ordering::SeqCst);

        let compressor = codecs.create_encoder(format).map_err(|e| {
            log::error!("{} encoder unavailable for {}: {}", kind, format.mime, e);
            e
        })?;
        if self.shared.input_mode == InputMode::Surface && compressor.input_surface().is_none() {
            compressor.release();
            return Err(RecorderError::Compressor(format!(
                "{} did not provide an input surface",
                format.mime
            )));
        }
        *self.shared.compressor.lock() = Some(compressor);

        self.shared.signals.lock().state = EncoderState::Prepared;
        log::info!("{} encoder prepared: {} at {} bps", kind, format.mime, format.bit_rate);

        if let Some(listener) = self.shared.listener() {
            listener.on_prepared(kind);
        }
        Ok(())
    }

    /// Begin accepting input. Calling it again while capturing is a no-op.
    pub fn start_recording(&self) -> Result<(), RecorderError> {
        let mut signals = self.shared.signals.lock();
        match signals.state {
            EncoderState::Prepared => {}
            EncoderState::Capturing => return Ok(()),
            other => {
                return Err(RecorderError::InvalidState(format!(
                    "{} encoder cannot start while {:?}",
                    self.shared.kind, other
                )))
            }
        }
        signals.is_capturing = true;
        signals.request_stop = false;
        signals.state = EncoderState::Capturing;
        self.shared.cond.notify_all();
        log::info!("{} encoder capturing", self.shared.kind);
        Ok(())
    }

    /// Tell the encoding thread that output is (or will shortly be) ready.
    ///
    /// Returns `false` once the session is no longer accepting frames.
    pub fn frame_available_soon(&self) -> bool {
        let mut signals = self.shared.signals.lock();
        if !signals.is_capturing || signals.request_stop {
            return false;
        }
        signals.request_drain += 1;
        self.shared.cond.notify_all();
        true
    }

    /// Ask the encoding thread to flush, signal end of stream and release.
    ///
    /// Does not block. A second call is a no-op.
    pub fn stop_recording(&self) {
        let mut signals = self.shared.signals.lock();
        if signals.request_stop || signals.state.is_released() {
            return;
        }
        signals.request_stop = true;
        signals.state = EncoderState::StopRequested;
        self.shared.cond.notify_all();
        log::debug!("{} encoder stop requested", self.shared.kind);
    }

    /// Queue one input buffer, retrying while the compressor has no free slot.
    ///
    /// With `end_of_stream` set, `data` may be empty and marks the end of input.
    /// Input arriving when the session is not capturing is dropped.
    pub fn encode(&self, data: &[u8], presentation_time_us: i64, end_of_stream: bool) -> Result<(), RecorderError> {
        self.shared.encode(data, presentation_time_us, end_of_stream)
    }

    /// Wait until the session is released and its encoding thread has exited.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        {
            let mut signals = self.shared.signals.lock();
            while signals.thread_running || !signals.state.is_released() {
                if self.shared.cond.wait_until(&mut signals, deadline).timed_out() {
                    return false;
                }
            }
        }
        if let Some(handle) = self.shared.thread.lock().take() {
            if handle.join().is_err() {
                log::error!("{} encoder thread panicked", self.shared.kind);
            }
        }
        true
    }
}

impl EncoderShared {
    fn is_capturing(&self) -> bool {
        self.signals.lock().is_capturing
    }

    fn compressor(&self) -> Option<Arc<dyn Compressor>> {
        self.compressor.lock().clone()
    }

    fn listener(&self) -> Option<Arc<dyn EncoderListener>> {
        self.listener.read().clone()
    }

    fn set_state(&self, state: EncoderState) {
        let mut signals = self.signals.lock();
        if !signals.state.is_released() {
            signals.state = state;
        }
    }

    fn run(&self) {
        {
            let mut signals = self.signals.lock();
            signals.request_stop = false;
            signals.request_drain = 0;
            signals.thread_running = true;
            self.cond.notify_all();
        }
        log::trace!("{} encoder thread started", self.kind);

        loop {
            let (stop, drain) = {
                let mut signals = self.signals.lock();
                let stop = signals.request_stop;
                let drain = signals.request_drain > 0;
                if drain {
                    signals.request_drain -= 1;
                }
                (stop, drain)
            };

            if stop {
                self.set_state(EncoderState::Draining);
                let flushed = self
                    .drain()
                    .and_then(|_| self.signal_end_of_input())
                    .and_then(|_| self.drain());
                if let Err(e) = flushed {
                    self.fail(e);
                }
                self.release();
                break;
            }

            if drain {
                match self.drain() {
                    Ok(()) => {}
                    Err(e) if !e.is_fatal() => log::warn!("{} drain interrupted: {}", self.kind, e),
                    Err(e) => {
                        self.fail(e);
                        self.release();
                        break;
                    }
                }
            } else {
                let mut signals = self.signals.lock();
                if !signals.request_stop && signals.request_drain == 0 {
                    self.cond.wait_for(&mut signals, self.settings.heartbeat);
                }
            }
        }

        let mut signals = self.signals.lock();
        signals.request_stop = true;
        signals.is_capturing = false;
        signals.thread_running = false;
        self.cond.notify_all();
        log::trace!("{} encoder thread finished", self.kind);
    }

    fn encode(&self, data: &[u8], presentation_time_us: i64, end_of_stream: bool) -> Result<(), RecorderError> {
        if !self.is_capturing() {
            return Ok(());
        }
        let Some(compressor) = self.compressor() else {
            return Ok(());
        };

        while self.is_capturing() {
            if compressor.queue_input(data, presentation_time_us, end_of_stream, self.settings.poll_timeout)? {
                if end_of_stream {
                    self.is_eos.store(true, Ordering::SeqCst);
                    log::debug!("{} end of stream queued", self.kind);
                }
                break;
            }
        }
        Ok(())
    }

    fn signal_end_of_input(&self) -> Result<(), RecorderError> {
        if !self.is_capturing() {
            return Ok(());
        }
        match self.input_mode {
            InputMode::Buffers => self.encode(&[], self.clock.next(), true),
            InputMode::Surface => {
                let Some(compressor) = self.compressor() else {
                    return Ok(());
                };
                compressor.signal_end_of_input_stream()?;
                self.is_eos.store(true, Ordering::SeqCst);
                log::debug!("{} end of stream signalled on surface", self.kind);
                Ok(())
            }
        }
    }

    /// Pull every available output sample and forward it to the muxer.
    ///
    /// Gives up after `max_empty_polls` consecutive empty polls unless end of
    /// stream has been queued, in which case it keeps polling until the
    /// compressor emits the end-of-stream sample.
    fn drain(&self) -> Result<(), RecorderError> {
        let Some(compressor) = self.compressor() else {
            return Ok(());
        };
        let Some(muxer) = self.muxer.upgrade() else {
            log::warn!("{} drain skipped: muxer is gone", self.kind);
            return Ok(());
        };

        let mut empty_polls = 0u32;
        while self.is_capturing() {
            match compressor.dequeue_output(self.settings.poll_timeout)? {
                OutputEvent::TryAgainLater => {
                    if !self.is_eos.load(Ordering::SeqCst) {
                        empty_polls += 1;
                        if empty_polls > self.settings.max_empty_polls {
                            break;
                        }
                    }
                }
                OutputEvent::BuffersChanged => {
                    log::debug!("{} output buffers changed", self.kind);
                }
                OutputEvent::FormatChanged => {
                    self.register_track(compressor.as_ref(), &muxer)?;
                }
                OutputEvent::Unknown(code) => {
                    log::warn!("{} unexpected dequeue result {}", self.kind, code);
                }
                OutputEvent::Sample { index, data, mut info } => {
                    if info.flags.is_codec_config() {
                        // already carried by the output format
                        log::debug!("{} dropping codec config buffer", self.kind);
                        info.size = 0;
                    }

                    if info.size != 0 {
                        empty_polls = 0;
                        let track = self.track.lock().index.ok_or(RecorderError::MuxerNotStarted(self.kind))?;
                        info.presentation_time_us = self.clock.next();
                        let payload = &data[..info.size.min(data.len())];
                        match muxer.write_sample(track, payload, &info) {
                            Ok(true) => {}
                            Ok(false) => log::trace!("{} sample dropped outside the started window", self.kind),
                            Err(e) => log::warn!("{} sample dropped: {}", self.kind, e),
                        }
                    }
                    compressor.release_output_buffer(index)?;

                    if info.flags.is_end_of_stream() {
                        log::debug!("{} reached end of stream", self.kind);
                        self.signals.lock().is_capturing = false;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn register_track(&self, compressor: &dyn Compressor, muxer: &MuxerCoordinator) -> Result<(), RecorderError> {
        {
            let mut track = self.track.lock();
            if track.muxer_started {
                return Err(RecorderError::FormatChangedTwice(self.kind));
            }
            let format = compressor.output_format()?;
            let index = muxer.add_track(&format)?;
            log::info!("{} output format {} registered as track {}", self.kind, format.mime, index);
            track.index = Some(index);
            track.muxer_started = true;
        }

        if !muxer.start_barrier() {
            log::debug!("{} waiting for sibling sessions", self.kind);
            muxer.wait_until_started(self.settings.start_barrier_timeout)?;
        }
        Ok(())
    }

    fn fail(&self, error: RecorderError) {
        log::error!("{} encoder failed: {}", self.kind, error);
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(error.clone());
            }
        }
        if let Some(listener) = self.listener() {
            listener.on_error(self.kind, &error);
        }
    }

    fn release(&self) {
        {
            let mut signals = self.signals.lock();
            if signals.releasing {
                return;
            }
            signals.releasing = true;
            signals.is_capturing = false;
            signals.request_stop = true;
            self.cond.notify_all();
        }
        log::debug!("releasing {} encoder", self.kind);

        if let Some(compressor) = self.compressor.lock().take() {
            if let Err(e) = compressor.stop() {
                log::warn!("{} compressor stop failed: {}", self.kind, e);
            }
            compressor.release();
        }

        let hooks: Vec<_> = self.release_hooks.lock().drain(..).collect();
        for hook in hooks {
            hook();
        }

        let muxer_started = self.track.lock().muxer_started;
        if muxer_started {
            match self.muxer.upgrade() {
                Some(muxer) => muxer.stop_barrier(),
                None => log::warn!("{} muxer dropped before stop", self.kind),
            }
        }

        {
            let mut signals = self.signals.lock();
            signals.state = EncoderState::Released;
            self.cond.notify_all();
        }

        if let Some(listener) = self.listener() {
            listener.on_stopped(self.kind);
        }
    }
}
