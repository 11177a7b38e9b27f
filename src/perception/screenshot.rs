use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::ScreenMapper;
use crate::perception::traits::ScreenSource;
use crate::perception::types::{CapturedFrame, Dimensions, ScreenshotMeta};

pub const ARCHIVE_FILE_NAME: &str = "high_quality_screenshot.png";

/// Last scale factor seen by a capture; 1.0 until the first one.
#[derive(Debug, Clone)]
pub(crate) struct ScaleCell(Arc<AtomicU64>);

impl ScaleCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1.0f64.to_bits())))
    }

    pub(crate) fn store(&self, scale: f64) {
        if scale.is_finite() && scale > 0.0 {
            self.0.store(scale.to_bits(), Ordering::Relaxed);
        }
    }

    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

impl Default for ScaleCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Primary display captured through xcap.
#[derive(Debug, Default, Clone)]
pub struct XcapScreen {
    scale: ScaleCell,
}

impl XcapScreen {
    pub fn new() -> Self {
        Self::default()
    }

    fn primary() -> DeskPilotResult<xcap::Monitor> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| DeskPilotError::Capture(format!("failed to enumerate monitors: {e}")))?;
        let mut fallback = None;
        for monitor in monitors {
            if monitor.is_primary() {
                return Ok(monitor);
            }
            fallback.get_or_insert(monitor);
        }
        fallback.ok_or_else(|| DeskPilotError::Capture("No display found for screenshot".into()))
    }
}

#[async_trait]
impl ScreenSource for XcapScreen {
    async fn native_size(&self) -> DeskPilotResult<Dimensions> {
        blocking(|| {
            let monitor = Self::primary()?;
            Ok(Dimensions::native(monitor.width(), monitor.height()))
        })
        .await
    }

    /// Value recorded by the most recent `capture`; never touches the display server.
    fn scale_factor(&self) -> f64 {
        self.scale.load()
    }

    async fn capture(&self) -> DeskPilotResult<RgbaImage> {
        let scale = self.scale.clone();
        blocking(move || {
            let monitor = Self::primary()?;
            scale.store(monitor.scale_factor() as f64);
            monitor
                .capture_image()
                .map_err(|e| DeskPilotError::Capture(format!("screen capture failed: {e}")))
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> DeskPilotResult<T>
where
    F: FnOnce() -> DeskPilotResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeskPilotError::Capture(format!("capture task failed: {e}")))?
}

/// Captures the primary display, downsamples it to decision space and
/// encodes it as a base64 PNG.
pub async fn capture_for_decision(
    source: &dyn ScreenSource,
    mapper: &ScreenMapper,
) -> DeskPilotResult<CapturedFrame> {
    let frame = source.capture().await?;
    let (physical_width, physical_height) = frame.dimensions();
    let decision = mapper.decision();

    let png = blocking(move || {
        let resized = image::imageops::resize(&frame, decision.width, decision.height, FilterType::Triangle);
        encode_png(resized)
    })
    .await?;

    tracing::debug!(
        native = %mapper.native(),
        decision = %decision,
        physical = %format!("{physical_width}×{physical_height}"),
        bytes = png.len(),
        "frame captured for decision"
    );

    Ok(CapturedFrame {
        image_base64: base64::engine::general_purpose::STANDARD.encode(&png),
        media_type: "image/png".into(),
        native: mapper.native(),
        decision,
        meta: ScreenshotMeta {
            scale_factor: source.scale_factor(),
            physical_width,
            physical_height,
            captured_at: chrono::Utc::now(),
        },
    })
}

/// Writes a native-resolution PNG of the primary display into `dir`.
pub async fn archive_full_resolution(source: &dyn ScreenSource, dir: &Path) -> DeskPilotResult<PathBuf> {
    let frame = source.capture().await?;
    let (width, height) = frame.dimensions();
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(ARCHIVE_FILE_NAME);

    let png = blocking(move || encode_png(frame)).await?;
    tokio::fs::write(&path, png).await?;

    tracing::info!(path = %path.display(), width, height, "full-resolution screenshot archived");
    Ok(path)
}

/// Desktop directory, else `<data dir>/DeskPilot`, else the working directory.
pub fn default_archive_dir() -> PathBuf {
    if let Some(desktop) = dirs::desktop_dir() {
        return desktop;
    }
    if let Some(data) = dirs::data_local_dir() {
        return data.join("DeskPilot");
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn encode_png(image: RgbaImage) -> DeskPilotResult<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Solid-colour in-memory display.
    pub(crate) struct FakeScreen {
        pub native: Dimensions,
        pub fail: AtomicBool,
    }

    impl FakeScreen {
        pub(crate) fn new(width: u32, height: u32) -> Self {
            Self { native: Dimensions::native(width, height), fail: AtomicBool::new(false) }
        }
    }

    #[async_trait]
    impl ScreenSource for FakeScreen {
        async fn native_size(&self) -> DeskPilotResult<Dimensions> {
            Ok(self.native)
        }

        async fn capture(&self) -> DeskPilotResult<RgbaImage> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DeskPilotError::Capture("No display found for screenshot".into()));
            }
            Ok(RgbaImage::from_pixel(self.native.width, self.native.height, image::Rgba([30, 60, 90, 255])))
        }
    }

    #[tokio::test]
    async fn frame_is_downsampled_to_decision_space() {
        let screen = FakeScreen::new(1920, 1080);
        let mapper = ScreenMapper::new(screen.native).unwrap();
        let frame = capture_for_decision(&screen, &mapper).await.unwrap();

        assert_eq!(frame.decision, Dimensions::decision(1280, 720));
        assert_eq!(frame.meta.physical_width, 1920);
        assert!(frame.data_url().starts_with("data:image/png;base64,"));

        let png = base64::engine::general_purpose::STANDARD
            .decode(&frame.image_base64)
            .unwrap();
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1280, 720));
    }

    #[test]
    fn scale_cell_keeps_last_valid_value() {
        let cell = ScaleCell::new();
        assert_eq!(cell.load(), 1.0);

        let shared = cell.clone();
        shared.store(1.5);
        assert_eq!(cell.load(), 1.5);

        shared.store(0.0);
        shared.store(f64::NAN);
        assert_eq!(cell.load(), 1.5);
    }

    #[tokio::test]
    async fn capture_failure_is_reported_not_panicked() {
        let screen = FakeScreen::new(800, 600);
        screen.fail.store(true, Ordering::SeqCst);
        let mapper = ScreenMapper::new(screen.native).unwrap();
        let err = capture_for_decision(&screen, &mapper).await.unwrap_err();
        assert!(matches!(err, DeskPilotError::Capture(_)));
    }

    #[tokio::test]
    async fn archive_writes_native_resolution_png() {
        let dir = tempfile::tempdir().unwrap();
        let screen = FakeScreen::new(640, 400);
        let path = archive_full_resolution(&screen, dir.path()).await.unwrap();

        assert_eq!(path.file_name().unwrap(), ARCHIVE_FILE_NAME);
        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (640, 400));
    }
}
