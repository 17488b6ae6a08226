//! Capture profiles: output format and frame size per power mode.

/// Output format of the sensor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageFormat {
    /// Uncompressed output. Draws less power while idle.
    Bmp,
    /// Compressed output from the on-module encoder.
    Jpeg,
}

/// JPEG frame sizes supported by the OV5642.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JpegSize {
    Qvga,
    Vga,
    Xga,
    Sxga,
    Uxga,
    FullHd,
    Qxga,
    Qsxga,
}

impl JpegSize {
    /// Width and height in pixels.
    pub fn dimensions(self) -> (u16, u16) {
        match self {
            JpegSize::Qvga => (320, 240),
            JpegSize::Vga => (640, 480),
            JpegSize::Xga => (1024, 768),
            JpegSize::Sxga => (1280, 960),
            JpegSize::Uxga => (1600, 1200),
            JpegSize::FullHd => (1920, 1080),
            JpegSize::Qxga => (2048, 1536),
            JpegSize::Qsxga => (2592, 1944),
        }
    }
}

/// Power profile, fixed for the life of the process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureProfile {
    /// Idle in BMP, switch to JPEG around every capture.
    LowPower,
    /// Stay in JPEG with a large frame, configured once.
    NormalPower,
}

impl CaptureProfile {
    /// Profile selected by the `low-power` / `normal-power` cargo features.
    #[cfg(feature = "low-power")]
    pub const DEFAULT: CaptureProfile = CaptureProfile::LowPower;

    /// Profile selected by the `low-power` / `normal-power` cargo features.
    #[cfg(not(feature = "low-power"))]
    pub const DEFAULT: CaptureProfile = CaptureProfile::NormalPower;

    /// Format the sensor sits in between captures.
    pub fn idle_format(self) -> ImageFormat {
        match self {
            CaptureProfile::LowPower => ImageFormat::Bmp,
            CaptureProfile::NormalPower => ImageFormat::Jpeg,
        }
    }

    /// Format used for captures.
    pub fn capture_format(self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    /// JPEG frame size used for captures.
    pub fn jpeg_size(self) -> JpegSize {
        match self {
            CaptureProfile::LowPower => JpegSize::Vga,
            CaptureProfile::NormalPower => JpegSize::FullHd,
        }
    }

    /// Whether the format must be switched before and after each capture.
    pub fn toggles_format(self) -> bool {
        self.idle_format() != self.capture_format()
    }
}

impl Default for CaptureProfile {
    fn default() -> Self {
        CaptureProfile::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_power_toggles_around_capture() {
        let p = CaptureProfile::LowPower;
        assert!(p.toggles_format());
        assert_eq!(p.idle_format(), ImageFormat::Bmp);
        assert_eq!(p.jpeg_size().dimensions(), (640, 480));
    }

    #[test]
    fn normal_power_stays_in_jpeg() {
        let p = CaptureProfile::NormalPower;
        assert!(!p.toggles_format());
        assert_eq!(p.jpeg_size(), JpegSize::FullHd);
    }
}
