use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::perception::types::Dimensions;

/// Source of primary-display frames.
/// The real implementation is `XcapScreen`; tests substitute an in-memory frame.
#[async_trait]
pub trait ScreenSource: Send + Sync {
    /// Size of the pointer coordinate space of the primary display.
    async fn native_size(&self) -> DeskPilotResult<Dimensions>;

    /// Scale factor between the pointer space and physical pixels.
    fn scale_factor(&self) -> f64 {
        1.0
    }

    /// Full-resolution RGBA frame of the primary display.
    async fn capture(&self) -> DeskPilotResult<image::RgbaImage>;
}
