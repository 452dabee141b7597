use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::config::{RecorderConfiguration, VideoEncoderConfig};
use crate::models::error::RecorderError;
use crate::models::stream::{FrameTransform, StreamKind};
use crate::session::encoder::{EncoderCore, InputMode};
use crate::session::muxer::MuxerCoordinator;
use crate::traits::compressor::{CodecProvider, SurfaceHandle};
use crate::traits::frame_renderer::FrameRenderer;

/// H.264 encoding session fed through the compressor's input surface.
///
/// Frames are drawn into the surface by a [`FrameRenderer`] bound after
/// `prepare`; every draw is paired with a drain request on the encoding
/// thread. End of stream is signalled on the surface rather than as an
/// empty input buffer.
pub struct VideoEncoder {
    core: EncoderCore,
    config: VideoEncoderConfig,
    renderer: Arc<RwLock<Option<Arc<dyn FrameRenderer>>>>,
    draw_next: AtomicBool,
}

impl VideoEncoder {
    pub fn new(
        muxer: &Arc<MuxerCoordinator>,
        settings: &RecorderConfiguration,
        config: VideoEncoderConfig,
    ) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        let core = EncoderCore::new(StreamKind::Video, InputMode::Surface, muxer, settings)?;

        let renderer: Arc<RwLock<Option<Arc<dyn FrameRenderer>>>> = Arc::new(RwLock::new(None));
        let slot = Arc::clone(&renderer);
        core.on_release(move || {
            if let Some(renderer) = slot.write().take() {
                renderer.release();
            }
        });

        Ok(Self {
            core,
            config,
            renderer,
            draw_next: AtomicBool::new(false),
        })
    }

    pub fn core(&self) -> &EncoderCore {
        &self.core
    }

    pub fn config(&self) -> &VideoEncoderConfig {
        &self.config
    }

    pub fn prepare(&self, codecs: &dyn CodecProvider) -> Result<(), RecorderError> {
        self.core.prepare(codecs, &self.config.format())
    }

    pub fn input_surface(&self) -> Option<SurfaceHandle> {
        self.core.input_surface()
    }

    /// Attach `renderer` to the input surface. Only valid once prepared.
    pub fn bind_renderer(&self, renderer: Arc<dyn FrameRenderer>) -> Result<(), RecorderError> {
        let surface = self
            .input_surface()
            .ok_or_else(|| RecorderError::InvalidState("video encoder has no input surface yet".into()))?;
        renderer.attach(surface);
        if let Some(previous) = self.renderer.write().replace(renderer) {
            previous.release();
        }
        log::debug!("renderer bound to surface {}", surface.0);
        Ok(())
    }

    pub fn start_recording(&self) -> Result<(), RecorderError> {
        self.core.start_recording()
    }

    pub fn stop_recording(&self) {
        self.core.stop_recording();
    }

    /// Request a drain and draw one frame with `transform`.
    ///
    /// Returns `false` (and draws nothing) once the session stopped accepting
    /// frames.
    pub fn frame_available_soon(&self, transform: &FrameTransform) -> bool {
        if !self.core.frame_available_soon() {
            return false;
        }
        if let Some(renderer) = self.renderer.read().as_ref() {
            renderer.draw(transform);
        }
        true
    }

    /// Preview-frame hook: forwards every other frame to
    /// [`frame_available_soon`](Self::frame_available_soon).
    pub fn on_frame_available(&self, transform: &FrameTransform) -> bool {
        let draw = self.draw_next.fetch_xor(true, Ordering::SeqCst);
        if draw {
            self.frame_available_soon(transform)
        } else {
            self.core.is_capturing() && !self.core.is_stop_requested()
        }
    }
}
