//! OV5642 sensor constants and register tables.

use super::profile::{ImageFormat, JpegSize};

/// Device address is 0x78, however the I2C driver will left-shift the provided address by 1
pub const ADDRESS: u8 = 0x3C;

/// Expected chip ID, high byte first ("5642").
pub const CHIP_ID: u16 = 0x5642;

/// Device register addresses.
pub struct Register;

impl Register {
    // Register page select, written before the ID read on plus modules
    pub const PAGE_SELECT: u16 = 0x00FF;

    // System control, bit 7 is soft reset
    pub const SYSTEM_CTRL: u16 = 0x3008;

    // Chip ID registers
    pub const CHIP_ID_HIGH: u16 = 0x300A;
    pub const CHIP_ID_LOW: u16 = 0x300B;

    // Output window size
    pub const DVP_HSIZE_HIGH: u16 = 0x3808;
    pub const DVP_HSIZE_LOW: u16 = 0x3809;
    pub const DVP_VSIZE_HIGH: u16 = 0x380A;
    pub const DVP_VSIZE_LOW: u16 = 0x380B;
}

/// Page value selecting the sensor registers.
pub const SENSOR_PAGE: u8 = 0x01;

/// Soft reset value for `SYSTEM_CTRL`.
pub const SOFT_RESET: u8 = 0x80;

/// Common preview setup applied after a soft reset, before the format specific table.
pub const PREVIEW_INIT: &[(u16, u8)] = &[
    (0x3103, 0x93),
    (0x3008, 0x02),
    (0x3017, 0x7f),
    (0x3018, 0xfc),
    (0x3810, 0xc2),
    (0x3615, 0xf0),
    (0x3000, 0x00),
    (0x3001, 0x00),
    (0x3002, 0x5c),
    (0x3003, 0x00),
    (0x3004, 0xff),
    (0x3005, 0xff),
    (0x3006, 0x43),
    (0x3007, 0x37),
    (0x3011, 0x08),
    (0x3010, 0x10),
    (0x460c, 0x22),
    (0x3815, 0x04),
    (0x370c, 0xa0),
    (0x3602, 0xfc),
    (0x3612, 0xff),
    (0x3634, 0xc0),
    (0x3613, 0x00),
    (0x3605, 0x7c),
    (0x3621, 0x09),
    (0x3622, 0x60),
    (0x3604, 0x40),
    (0x3603, 0xa7),
    (0x3603, 0x27),
    (0x4000, 0x21),
    (0x401d, 0x22),
    (0x3600, 0x54),
    (0x3605, 0x04),
    (0x3606, 0x3f),
    (0x3c01, 0x80),
    (0x5000, 0x4f),
    (0x5020, 0x04),
    (0x5181, 0x79),
    (0x5182, 0x00),
    (0x5185, 0x22),
    (0x5197, 0x01),
    (0x5001, 0xff),
    (0x5500, 0x0a),
    (0x5504, 0x00),
    (0x5505, 0x7f),
    (0x5080, 0x08),
    (0x300e, 0x18),
    (0x4610, 0x00),
    (0x471d, 0x05),
    (0x4708, 0x06),
    (0x3808, 0x02),
    (0x3809, 0x80),
    (0x380a, 0x01),
    (0x380b, 0xe0),
];

/// JPEG output: compressed DVP output, JPEG timing and quality.
pub const JPEG_INIT: &[(u16, u8)] = &[
    (0x4300, 0x18),
    (0x3818, 0xa8),
    (0x3621, 0x10),
    (0x3801, 0xb0),
    (0x4407, 0x04),
    (0x4740, 0x20),
];

/// BMP output: RGB565 DVP output with JPEG mode bits cleared.
pub const BMP_INIT: &[(u16, u8)] = &[
    (0x4740, 0x21),
    (0x501e, 0x2a),
    (0x5002, 0xf8),
    (0x501f, 0x01),
    (0x4300, 0x61),
    (0x3818, 0xc1),
    (0x3621, 0x87),
];

/// Table for the requested output format.
pub fn format_table(format: ImageFormat) -> &'static [(u16, u8)] {
    match format {
        ImageFormat::Jpeg => JPEG_INIT,
        ImageFormat::Bmp => BMP_INIT,
    }
}

/// Output window registers for a JPEG frame size.
pub fn size_table(size: JpegSize) -> [(u16, u8); 4] {
    let (width, height) = size.dimensions();
    let [w_hi, w_lo] = width.to_be_bytes();
    let [h_hi, h_lo] = height.to_be_bytes();
    [
        (Register::DVP_HSIZE_HIGH, w_hi),
        (Register::DVP_HSIZE_LOW, w_lo),
        (Register::DVP_VSIZE_HIGH, h_hi),
        (Register::DVP_VSIZE_LOW, h_lo),
    ]
}
