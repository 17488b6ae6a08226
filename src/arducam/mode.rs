//! Sensor format and frame size control around captures.
//!
//! The low power profile keeps the sensor in BMP between captures and only switches to JPEG for
//! the capture itself. The normal power profile configures JPEG once at startup. Register writes
//! here are not read back.

use super::bringup::DeviceState;
use super::bus::Registers;
use super::capture::{Camera, DeviceError};
use super::ov5642;
use super::profile::ImageFormat;
use super::spi::{Mask, Register};
use crate::jpeg::FifoSource;
use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info};

impl<B, D, E> Camera<B, D>
where
    B: Registers<Error = E> + FifoSource<Error = E>,
    D: DelayMs<u32>,
{
    /// Startup configuration: single-shot capture and the profile's idle format. Runs once
    /// after `bring_up`.
    pub fn configure(&mut self) -> Result<(), DeviceError<E>> {
        if self.state == DeviceState::Unverified {
            return Err(DeviceError::NotReady);
        }

        // Set capture 1 photo per time
        self.write_reg(Register::CAPTURE_CTRL, 0x00)?;
        self.delay.delay_ms(self.config.timing.register_settle_ms);
        let capture_ctrl = self
            .bus
            .read_reg(Register::CAPTURE_CTRL)
            .map_err(DeviceError::Bus)?;
        info!("Capture Control Register: {}", capture_ctrl);

        let profile = self.config.profile;
        info!("{:?} profile", profile);
        self.init_sensor(profile.idle_format())?;
        if !profile.toggles_format() {
            self.set_capture_window()?;
        }

        self.delay.delay_ms(self.config.timing.startup_settle_ms);
        Ok(())
    }

    /// Switch to the capture format before a capture, if the profile idles in another one.
    pub fn prepare_capture(&mut self) -> Result<(), DeviceError<E>> {
        let profile = self.config.profile;
        if !profile.toggles_format() {
            return Ok(());
        }

        self.write_reg(Register::CAPTURE_CTRL, 0x00)?;
        self.delay.delay_ms(self.config.timing.format_switch_ms);
        self.init_sensor(profile.capture_format())?;
        self.set_capture_window()?;
        self.delay.delay_ms(self.config.timing.capture_settle_ms);
        Ok(())
    }

    /// Switch back to the idle format after the FIFO has been drained.
    pub fn restore_idle(&mut self) -> Result<(), DeviceError<E>> {
        let profile = self.config.profile;
        if !profile.toggles_format() {
            return Ok(());
        }

        self.init_sensor(profile.idle_format())?;
        self.delay.delay_ms(self.config.timing.idle_settle_ms);
        Ok(())
    }

    /// Soft reset the sensor and load the tables for `format`.
    fn init_sensor(&mut self, format: ImageFormat) -> Result<(), DeviceError<E>> {
        debug!("sensor init for {:?}", format);
        let settle = self.config.timing.sensor_reset_ms;

        self.bus
            .write_sensor_reg(ov5642::Register::SYSTEM_CTRL, ov5642::SOFT_RESET)
            .map_err(DeviceError::Bus)?;
        self.delay.delay_ms(settle);
        self.bus
            .write_sensor_table(ov5642::PREVIEW_INIT)
            .map_err(DeviceError::Bus)?;
        self.delay.delay_ms(settle);
        self.bus
            .write_sensor_table(ov5642::format_table(format))
            .map_err(DeviceError::Bus)
    }

    /// VSYNC active high and the profile's JPEG frame size.
    fn set_capture_window(&mut self) -> Result<(), DeviceError<E>> {
        self.write_reg(Register::TIM, Mask::VSYNC_LEVEL)?;
        let size = self.config.profile.jpeg_size();
        self.bus
            .write_sensor_table(&ov5642::size_table(size))
            .map_err(DeviceError::Bus)
    }

    fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), DeviceError<E>> {
        self.bus.write_reg(reg, val).map_err(DeviceError::Bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arducam::profile::{CaptureProfile, JpegSize};
    use crate::config::{Config, Timing};
    use crate::sim::{SimArduCam, SimBus, SimDelay};

    fn camera(sim: &SimArduCam, profile: CaptureProfile) -> Camera<SimBus, SimDelay> {
        let config = Config {
            timing: Timing::none(),
            ..Config::with_profile(profile)
        };
        let mut cam = Camera::new(sim.bus(), sim.delay(), config);
        cam.bring_up().unwrap();
        cam
    }

    fn window(sim: &SimArduCam) -> (u16, u16) {
        let reg = |r| u16::from(sim.sensor_register(r).unwrap_or(0));
        (
            reg(ov5642::Register::DVP_HSIZE_HIGH) << 8 | reg(ov5642::Register::DVP_HSIZE_LOW),
            reg(ov5642::Register::DVP_VSIZE_HIGH) << 8 | reg(ov5642::Register::DVP_VSIZE_LOW),
        )
    }

    #[test]
    fn configure_requires_bring_up() {
        let sim = SimArduCam::new();
        let mut cam = Camera::new(sim.bus(), sim.delay(), Config::default());
        assert_eq!(cam.configure(), Err(DeviceError::NotReady));
    }

    #[test]
    fn normal_power_configures_jpeg_once() {
        let sim = SimArduCam::new();
        let mut cam = camera(&sim, CaptureProfile::NormalPower);

        cam.configure().unwrap();
        assert_eq!(sim.format(), Some(ImageFormat::Jpeg));
        assert_eq!(sim.register(Register::TIM), Mask::VSYNC_LEVEL);
        assert_eq!(window(&sim), JpegSize::FullHd.dimensions());

        let writes = sim.sensor_writes().len();
        cam.prepare_capture().unwrap();
        cam.restore_idle().unwrap();
        assert_eq!(sim.sensor_writes().len(), writes);
    }

    #[test]
    fn low_power_idles_in_bmp() {
        let sim = SimArduCam::new();
        let mut cam = camera(&sim, CaptureProfile::LowPower);

        cam.configure().unwrap();
        assert_eq!(sim.format(), Some(ImageFormat::Bmp));

        cam.prepare_capture().unwrap();
        assert_eq!(sim.format(), Some(ImageFormat::Jpeg));
        assert_eq!(sim.register(Register::TIM), Mask::VSYNC_LEVEL);
        assert_eq!(window(&sim), JpegSize::Vga.dimensions());

        cam.restore_idle().unwrap();
        assert_eq!(sim.format(), Some(ImageFormat::Bmp));
    }

    #[test]
    fn low_power_capture_delays() {
        let sim = SimArduCam::new();
        let config = Config::with_profile(CaptureProfile::LowPower);
        let mut cam = Camera::new(sim.bus(), sim.delay(), config);
        cam.check_wiring().unwrap();
        let before = sim.delayed_ms();

        cam.prepare_capture().unwrap();
        // format switch + two sensor reset settles + capture settle
        assert_eq!(sim.delayed_ms() - before, 200 + 2 * 100 + 1000);

        let before = sim.delayed_ms();
        cam.restore_idle().unwrap();
        assert_eq!(sim.delayed_ms() - before, 2 * 100 + 500);
    }
}
