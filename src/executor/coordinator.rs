// Coordinate mapping between the primary display and decision space.
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::types::{Dimensions, Space};

/// Upper bound of the decision space on each axis.
pub const MAX_DECISION_WIDTH: u32 = 1280;
pub const MAX_DECISION_HEIGHT: u32 = 800;

/// Aspect-preserving box bounded by 1280×800 with exactly one axis on the cap.
pub fn decision_dimensions(native: Dimensions) -> DeskPilotResult<Dimensions> {
    if native.width == 0 || native.height == 0 {
        return Err(DeskPilotError::Capture(format!(
            "display reports an empty size ({native})"
        )));
    }
    let (w, h) = (native.width as f64, native.height as f64);
    let cap_ratio = MAX_DECISION_WIDTH as f64 / MAX_DECISION_HEIGHT as f64;

    let decision = if w / h > cap_ratio {
        // width is limiting
        let scaled = (MAX_DECISION_WIDTH as f64 * h / w).round() as u32;
        Dimensions::decision(MAX_DECISION_WIDTH, scaled.max(1))
    } else {
        let scaled = (MAX_DECISION_HEIGHT as f64 * w / h).round() as u32;
        Dimensions::decision(scaled.max(1), MAX_DECISION_HEIGHT)
    };
    Ok(decision)
}

/// Converts points between native and decision space for one display size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenMapper {
    native: Dimensions,
    decision: Dimensions,
}

impl ScreenMapper {
    pub fn new(native: Dimensions) -> DeskPilotResult<Self> {
        if native.space != Space::Native {
            return Err(DeskPilotError::Config(format!(
                "screen mapper needs native dimensions, got {:?}",
                native.space
            )));
        }
        let decision = decision_dimensions(native)?;
        Ok(Self { native, decision })
    }

    pub fn native(&self) -> Dimensions {
        self.native
    }

    pub fn decision(&self) -> Dimensions {
        self.decision
    }

    pub fn to_decision(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.decision.width as f64 / self.native.width as f64,
            y * self.decision.height as f64 / self.native.height as f64,
        )
    }

    pub fn to_native(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.native.width as f64 / self.decision.width as f64,
            y * self.native.height as f64 / self.decision.height as f64,
        )
    }

    /// Decision-space point → the native pixel handed to the input driver.
    /// Rounded to the nearest pixel and clamped onto the display.
    pub fn to_native_pixel(&self, x: i32, y: i32) -> (i32, i32) {
        let (nx, ny) = self.to_native(x as f64, y as f64);
        let max_x = self.native.width.saturating_sub(1) as f64;
        let max_y = self.native.height.saturating_sub(1) as f64;
        (
            nx.round().clamp(0.0, max_x) as i32,
            ny.round().clamp(0.0, max_y) as i32,
        )
    }

    /// Native pointer position → decision-space point reported back to the service.
    pub fn to_decision_pixel(&self, x: i32, y: i32) -> (i32, i32) {
        let (dx, dy) = self.to_decision(x as f64, y as f64);
        (dx.round() as i32, dy.round() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(w: u32, h: u32) -> ScreenMapper {
        ScreenMapper::new(Dimensions::native(w, h)).unwrap()
    }

    #[test]
    fn full_hd_maps_to_1280x720() {
        let m = mapper(1920, 1080);
        assert_eq!(m.decision(), Dimensions::decision(1280, 720));
        assert_eq!(m.to_native_pixel(640, 360), (960, 540));
    }

    #[test]
    fn wide_displays_are_width_limited() {
        for (w, h) in [(1920, 1080), (2560, 1080), (3440, 1440), (1280, 800), (5120, 1440), (1600, 1000)] {
            let d = decision_dimensions(Dimensions::native(w, h)).unwrap();
            assert_eq!(d.width, 1280, "{w}x{h}");
            assert!(d.height <= 800, "{w}x{h} -> {d}");
        }
    }

    #[test]
    fn tall_displays_are_height_limited() {
        for (w, h) in [(1440, 900 + 1), (1024, 768), (1280, 1024), (1080, 1920), (800, 600), (2048, 1536)] {
            let d = decision_dimensions(Dimensions::native(w, h)).unwrap();
            assert_eq!(d.height, 800, "{w}x{h}");
            assert!(d.width <= 1280, "{w}x{h} -> {d}");
        }
    }

    #[test]
    fn aspect_ratio_is_preserved_within_rounding() {
        for (w, h) in [(1920, 1080), (1366, 768), (1024, 768), (3840, 2160), (1080, 1920)] {
            let native = Dimensions::native(w, h);
            let d = decision_dimensions(native).unwrap();
            let err = (d.aspect_ratio() - native.aspect_ratio()).abs();
            assert!(err < 0.01, "{w}x{h} -> {d} (err {err})");
        }
    }

    #[test]
    fn round_trip_within_one_unit() {
        for (w, h) in [(1920, 1080), (1366, 768), (3840, 2160), (1024, 768), (2560, 1600)] {
            let m = mapper(w, h);
            for &(x, y) in &[(0.0, 0.0), (17.0, 923.0), (w as f64 - 1.0, h as f64 - 1.0), (w as f64 / 3.0, h as f64 / 7.0)] {
                let (dx, dy) = m.to_decision(x, y);
                let (nx, ny) = m.to_native(dx, dy);
                assert!((nx - x).abs() <= 1.0 && (ny - y).abs() <= 1.0, "{w}x{h}: ({x},{y}) -> ({nx},{ny})");
            }
        }
    }

    #[test]
    fn native_pixel_is_clamped_onto_display() {
        let m = mapper(1920, 1080);
        assert_eq!(m.to_native_pixel(1280, 720), (1919, 1079));
        assert_eq!(m.to_native_pixel(-5, -5), (0, 0));
    }

    #[test]
    fn cursor_position_reported_in_decision_space() {
        let m = mapper(1920, 1080);
        assert_eq!(m.to_decision_pixel(960, 540), (640, 360));
    }

    #[test]
    fn empty_display_is_a_capture_error() {
        let err = ScreenMapper::new(Dimensions::native(0, 1080)).unwrap_err();
        assert!(matches!(err, DeskPilotError::Capture(_)));
    }

    #[test]
    fn rejects_decision_space_input() {
        assert!(ScreenMapper::new(Dimensions::decision(1280, 720)).is_err());
    }
}
