use serde::{Deserialize, Serialize};

/// Which coordinate space a size or point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Space {
    /// Pointer coordinates of the primary display.
    Native,
    /// The bounded box the decision service sees and answers in.
    Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub space: Space,
}

impl Dimensions {
    pub fn native(width: u32, height: u32) -> Self {
        Self { width, height, space: Space::Native }
    }

    pub fn decision(width: u32, height: u32) -> Self {
        Self { width, height, space: Space::Decision }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotMeta {
    pub scale_factor: f64,
    /// Pixel size of the raw frame as delivered by the capture backend.
    pub physical_width: u32,
    pub physical_height: u32,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

/// A frame downsampled to decision space and ready for transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub image_base64: String,
    pub media_type: String,
    pub native: Dimensions,
    pub decision: Dimensions,
    pub meta: ScreenshotMeta,
}

impl CapturedFrame {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.image_base64)
    }
}
