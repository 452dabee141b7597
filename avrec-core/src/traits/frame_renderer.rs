use crate::models::stream::FrameTransform;
use crate::traits::compressor::SurfaceHandle;

/// Draws the latest camera texture into a video encoder's input surface.
///
/// GPU context handling lives in the implementation; the engine only asks
/// for draws.
pub trait FrameRenderer: Send + Sync {
    /// Bind to the encoder input surface. Called once after prepare.
    fn attach(&self, surface: SurfaceHandle);

    /// Queue one draw with the given transforms. Must not block on the GPU.
    fn draw(&self, transform: &FrameTransform);

    /// Detach and free GPU resources.
    fn release(&self);
}
