//! Scripted doubles for the black-box collaborators.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::RecorderError;
use crate::models::recording_result::ContainerSummary;
use crate::models::stream::{
    AudioSourceKind, BufferInfo, FormatDescriptor, FrameTransform, PcmFormat, SampleFlags, StreamKind,
    StreamParams, TrackIndex,
};
use crate::traits::audio_input::{AudioInput, PcmReader};
use crate::traits::compressor::{CodecProvider, Compressor, OutputEvent, SurfaceHandle};
use crate::traits::container_writer::ContainerWriter;
use crate::traits::frame_renderer::FrameRenderer;
use crate::traits::listener::EncoderListener;
use crate::traits::time_source::TimeSource;

pub fn audio_format() -> FormatDescriptor {
    FormatDescriptor {
        mime: "audio/mp4a-latm".into(),
        bit_rate: 64_000,
        params: StreamParams::Audio {
            sample_rate: 44_100,
            channels: 1,
        },
        codec_specific_data: vec![vec![0x12, 0x08]],
    }
}

pub fn video_format() -> FormatDescriptor {
    FormatDescriptor {
        mime: "video/avc".into(),
        bit_rate: 1_920_000,
        params: StreamParams::Video {
            width: 640,
            height: 480,
            frame_rate: 25,
            i_frame_interval_secs: 10,
        },
        codec_specific_data: Vec::new(),
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// -- time --

/// Replays a fixed list of readings, then repeats the last one.
pub struct ScriptedTime {
    readings: Vec<i64>,
    next: AtomicUsize,
}

impl ScriptedTime {
    pub fn new(readings: &[i64]) -> Arc<Self> {
        Arc::new(Self {
            readings: readings.to_vec(),
            next: AtomicUsize::new(0),
        })
    }
}

impl TimeSource for ScriptedTime {
    fn now_us(&self) -> i64 {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        self.readings[i.min(self.readings.len() - 1)]
    }
}

// -- compressor --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedInput {
    pub len: usize,
    pub presentation_time_us: i64,
    pub end_of_stream: bool,
}

struct LoopbackState {
    format: FormatDescriptor,
    format_events: u32,
    emit_config: bool,
    pending: VecDeque<(Vec<u8>, bool)>,
    inputs: Vec<QueuedInput>,
    outstanding: Vec<usize>,
    next_index: usize,
    eos_signaled: bool,
    eos_delay: Duration,
    eos_ready_at: Option<Instant>,
    eos_drained: bool,
    empty_polls: u32,
    stopped: bool,
    released: bool,
}

impl LoopbackState {
    fn mark_eos(&mut self) {
        self.eos_signaled = true;
        self.eos_ready_at = Some(Instant::now() + self.eos_delay);
    }

    /// Whether the head of the queue may be handed out now.
    fn head_ready(&self) -> bool {
        match self.pending.front() {
            Some((_, true)) => self.eos_ready_at.map_or(true, |at| Instant::now() >= at),
            Some(_) => true,
            None => false,
        }
    }
}

/// Compressor that passes input through as output samples.
///
/// Emits `FormatChanged` on the first poll (or never, or twice, as scripted),
/// then a codec-config buffer, then one sample per queued input. An
/// end-of-stream input becomes an empty sample carrying the EOS flag, held
/// back for the configured EOS delay.
pub struct LoopbackCompressor {
    surface: Option<SurfaceHandle>,
    state: Mutex<LoopbackState>,
    cond: Condvar,
}

impl LoopbackCompressor {
    fn build(format: FormatDescriptor, surface: Option<SurfaceHandle>) -> Arc<Self> {
        Arc::new(Self {
            surface,
            state: Mutex::new(LoopbackState {
                format,
                format_events: 1,
                emit_config: true,
                pending: VecDeque::new(),
                inputs: Vec::new(),
                outstanding: Vec::new(),
                next_index: 0,
                eos_signaled: false,
                eos_delay: Duration::ZERO,
                eos_ready_at: None,
                eos_drained: false,
                empty_polls: 0,
                stopped: false,
                released: false,
            }),
            cond: Condvar::new(),
        })
    }

    pub fn audio() -> Arc<Self> {
        Self::build(audio_format(), None)
    }

    pub fn video() -> Arc<Self> {
        Self::build(video_format(), Some(SurfaceHandle(7)))
    }

    /// How many `FormatChanged` events to emit (0 simulates a dead encoder).
    pub fn set_format_events(&self, count: u32) {
        self.state.lock().format_events = count;
    }

    /// Hold the end-of-stream sample back for `delay` after it was queued.
    pub fn set_eos_delay(&self, delay: Duration) {
        self.state.lock().eos_delay = delay;
    }

    /// Polls that returned `TryAgainLater`.
    pub fn empty_polls(&self) -> u32 {
        self.state.lock().empty_polls
    }

    /// Whether the end-of-stream sample was handed out.
    pub fn eos_drained(&self) -> bool {
        self.state.lock().eos_drained
    }

    /// Simulate the renderer drawing one frame into the input surface.
    pub fn push_frame(&self, data: Vec<u8>) {
        self.state.lock().pending.push_back((data, false));
        self.cond.notify_all();
    }

    pub fn inputs(&self) -> Vec<QueuedInput> {
        self.state.lock().inputs.clone()
    }

    pub fn outstanding_buffers(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    pub fn eos_signaled(&self) -> bool {
        self.state.lock().eos_signaled
    }

    pub fn is_released(&self) -> bool {
        let s = self.state.lock();
        s.stopped && s.released
    }
}

impl Compressor for LoopbackCompressor {
    fn queue_input(
        &self,
        data: &[u8],
        presentation_time_us: i64,
        end_of_stream: bool,
        _timeout: Duration,
    ) -> Result<bool, RecorderError> {
        let mut s = self.state.lock();
        if s.stopped {
            return Err(RecorderError::Compressor("queue_input after stop".into()));
        }
        s.inputs.push(QueuedInput {
            len: data.len(),
            presentation_time_us,
            end_of_stream,
        });
        if end_of_stream {
            s.mark_eos();
        }
        s.pending.push_back((data.to_vec(), end_of_stream));
        self.cond.notify_all();
        Ok(true)
    }

    fn input_surface(&self) -> Option<SurfaceHandle> {
        self.surface
    }

    fn signal_end_of_input_stream(&self) -> Result<(), RecorderError> {
        if self.surface.is_none() {
            return Err(RecorderError::Compressor("encoder has no input surface".into()));
        }
        let mut s = self.state.lock();
        s.mark_eos();
        s.pending.push_back((Vec::new(), true));
        self.cond.notify_all();
        Ok(())
    }

    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent, RecorderError> {
        let mut s = self.state.lock();
        if s.format_events > 0 {
            s.format_events -= 1;
            return Ok(OutputEvent::FormatChanged);
        }
        if s.emit_config {
            s.emit_config = false;
            let index = s.next_index;
            s.next_index += 1;
            s.outstanding.push(index);
            let csd = vec![0x01, 0x42];
            return Ok(OutputEvent::Sample {
                index,
                info: BufferInfo {
                    size: csd.len(),
                    presentation_time_us: 0,
                    flags: SampleFlags::CODEC_CONFIG,
                },
                data: csd,
            });
        }
        if !s.head_ready() {
            self.cond.wait_for(&mut s, timeout);
        }
        if !s.head_ready() {
            s.empty_polls += 1;
            return Ok(OutputEvent::TryAgainLater);
        }
        let Some((data, eos)) = s.pending.pop_front() else {
            return Ok(OutputEvent::TryAgainLater);
        };
        if eos {
            s.eos_drained = true;
        }
        let index = s.next_index;
        s.next_index += 1;
        s.outstanding.push(index);
        let flags = if eos {
            SampleFlags::END_OF_STREAM
        } else {
            SampleFlags::KEY_FRAME
        };
        Ok(OutputEvent::Sample {
            index,
            info: BufferInfo {
                size: data.len(),
                presentation_time_us: 0,
                flags,
            },
            data,
        })
    }

    fn output_format(&self) -> Result<FormatDescriptor, RecorderError> {
        Ok(self.state.lock().format.clone())
    }

    fn release_output_buffer(&self, index: usize) -> Result<(), RecorderError> {
        let mut s = self.state.lock();
        let pos = s
            .outstanding
            .iter()
            .position(|&i| i == index)
            .ok_or_else(|| RecorderError::Compressor(format!("unknown output buffer {}", index)))?;
        s.outstanding.remove(pos);
        Ok(())
    }

    fn stop(&self) -> Result<(), RecorderError> {
        self.state.lock().stopped = true;
        Ok(())
    }

    fn release(&self) {
        self.state.lock().released = true;
    }
}

/// Hands out pre-built loopback compressors by stream kind.
pub struct LoopbackCodecs {
    pub audio: Option<Arc<LoopbackCompressor>>,
    pub video: Option<Arc<LoopbackCompressor>>,
}

impl CodecProvider for LoopbackCodecs {
    fn create_encoder(&self, format: &FormatDescriptor) -> Result<Arc<dyn Compressor>, RecorderError> {
        let compressor = match format.kind() {
            StreamKind::Audio => self.audio.clone(),
            StreamKind::Video => self.video.clone(),
        };
        compressor
            .map(|c| c as Arc<dyn Compressor>)
            .ok_or_else(|| RecorderError::CodecUnavailable(format.mime.clone()))
    }
}

// -- container writer --

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenSample {
    pub track: TrackIndex,
    pub data: Vec<u8>,
    pub presentation_time_us: i64,
    pub flags: SampleFlags,
}

#[derive(Debug, Clone, Default)]
pub struct WriterLog {
    pub opened: Vec<PathBuf>,
    pub tracks: Vec<FormatDescriptor>,
    pub starts: u32,
    pub samples: Vec<WrittenSample>,
    pub finalizes: u32,
    pub abandons: u32,
    pub fail_writes: bool,
}

/// Container writer that records every call.
#[derive(Clone, Default)]
pub struct RecordingWriter {
    log: Arc<Mutex<WriterLog>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> WriterLog {
        self.log.lock().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.log.lock().fail_writes = fail;
    }
}

impl ContainerWriter for RecordingWriter {
    fn open(&mut self, path: &Path) -> Result<(), RecorderError> {
        self.log.lock().opened.push(path.to_path_buf());
        Ok(())
    }

    fn add_track(&mut self, format: &FormatDescriptor) -> Result<TrackIndex, RecorderError> {
        let mut log = self.log.lock();
        log.tracks.push(format.clone());
        Ok(TrackIndex(log.tracks.len() as u32 - 1))
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        self.log.lock().starts += 1;
        Ok(())
    }

    fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<(), RecorderError> {
        let mut log = self.log.lock();
        if log.fail_writes {
            return Err(RecorderError::StorageError("disk full".into()));
        }
        log.samples.push(WrittenSample {
            track,
            data: data.to_vec(),
            presentation_time_us: info.presentation_time_us,
            flags: info.flags,
        });
        Ok(())
    }

    fn finalize(&mut self) -> Result<ContainerSummary, RecorderError> {
        let mut log = self.log.lock();
        log.finalizes += 1;
        Ok(ContainerSummary {
            bytes_written: log.samples.iter().map(|s| s.data.len() as u64).sum(),
            checksum: None,
        })
    }

    fn abandon(&mut self) {
        self.log.lock().abandons += 1;
    }
}

// -- listener --

#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Prepared(StreamKind),
    Stopped(StreamKind),
    Error(StreamKind, RecorderError),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }
}

impl EncoderListener for RecordingListener {
    fn on_prepared(&self, kind: StreamKind) {
        self.events.lock().push(ListenerEvent::Prepared(kind));
    }

    fn on_stopped(&self, kind: StreamKind) {
        self.events.lock().push(ListenerEvent::Stopped(kind));
    }

    fn on_error(&self, kind: StreamKind, error: &RecorderError) {
        self.events.lock().push(ListenerEvent::Error(kind, error.clone()));
    }
}

// -- audio input --

/// Audio input whose sources fail unless listed in `working`.
pub struct ScriptedAudioInput {
    working: Vec<AudioSourceKind>,
    pub attempts: Mutex<Vec<AudioSourceKind>>,
    pub opened_buffer_size: Mutex<Option<usize>>,
}

impl ScriptedAudioInput {
    pub fn working(sources: &[AudioSourceKind]) -> Arc<Self> {
        Arc::new(Self {
            working: sources.to_vec(),
            attempts: Mutex::new(Vec::new()),
            opened_buffer_size: Mutex::new(None),
        })
    }

    pub fn broken() -> Arc<Self> {
        Self::working(&[])
    }
}

impl AudioInput for ScriptedAudioInput {
    fn min_buffer_size(&self, _format: &PcmFormat) -> Option<usize> {
        Some(3528)
    }

    fn open(
        &self,
        source: AudioSourceKind,
        _format: &PcmFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn PcmReader>, RecorderError> {
        self.attempts.lock().push(source);
        if !self.working.contains(&source) {
            return Err(RecorderError::CaptureSourceUnavailable(format!("{:?} refused", source)));
        }
        *self.opened_buffer_size.lock() = Some(buffer_size);
        Ok(Box::new(ToneReader { counter: 0 }))
    }
}

/// Produces chunks filled with an incrementing byte, one every 5 ms.
struct ToneReader {
    counter: u8,
}

impl PcmReader for ToneReader {
    fn start(&mut self) -> Result<(), RecorderError> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, RecorderError> {
        thread::sleep(Duration::from_millis(5));
        self.counter = self.counter.wrapping_add(1).max(1);
        buf.fill(self.counter);
        Ok(buf.len())
    }

    fn stop(&mut self) {}
}

// -- renderer --

/// Renderer that turns each draw into a frame on a loopback compressor.
pub struct LoopbackRenderer {
    target: Arc<LoopbackCompressor>,
    pub attached: Mutex<Option<SurfaceHandle>>,
    pub draws: Mutex<Vec<FrameTransform>>,
    pub released: Mutex<bool>,
}

impl LoopbackRenderer {
    pub fn new(target: Arc<LoopbackCompressor>) -> Arc<Self> {
        Arc::new(Self {
            target,
            attached: Mutex::new(None),
            draws: Mutex::new(Vec::new()),
            released: Mutex::new(false),
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draws.lock().len()
    }
}

impl FrameRenderer for LoopbackRenderer {
    fn attach(&self, surface: SurfaceHandle) {
        *self.attached.lock() = Some(surface);
    }

    fn draw(&self, transform: &FrameTransform) {
        let mut draws = self.draws.lock();
        draws.push(*transform);
        self.target.push_frame(vec![draws.len() as u8; 64]);
    }

    fn release(&self) {
        *self.released.lock() = true;
    }
}
