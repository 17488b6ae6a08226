//! Runtime configuration: retry bounds, settle delays, identity policy and file naming.

use crate::arducam::profile::CaptureProfile;
use heapless::String;

/// What to do when the sensor chip ID does not match.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IdentityPolicy {
    /// Fail bring-up.
    Require,
    /// Log a warning and carry on.
    #[default]
    Warn,
}

/// Settle delays in milliseconds. Defaults are the minimums the module needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timing {
    /// After writing a register that is read back (loopback test, capture control).
    pub register_settle_ms: u32,
    /// Each half of the CPLD reset pulse.
    pub cpld_reset_ms: u32,
    /// After the sensor soft reset and after each register table.
    pub sensor_reset_ms: u32,
    /// After switching the format to JPEG for a capture.
    pub format_switch_ms: u32,
    /// After configuring the frame size for a capture.
    pub capture_settle_ms: u32,
    /// After switching back to the idle format.
    pub idle_settle_ms: u32,
    /// At the end of the startup configuration.
    pub startup_settle_ms: u32,
    /// Back-off after a file could not be opened.
    pub open_failure_ms: u32,
    /// Between polls of the capture-done flag.
    pub poll_interval_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            register_settle_ms: 200,
            cpld_reset_ms: 100,
            sensor_reset_ms: 100,
            format_switch_ms: 200,
            capture_settle_ms: 1000,
            idle_settle_ms: 500,
            startup_settle_ms: 500,
            open_failure_ms: 500,
            poll_interval_ms: 1,
        }
    }
}

impl Timing {
    /// All delays zero, for simulated hardware.
    pub fn none() -> Self {
        Timing {
            register_settle_ms: 0,
            cpld_reset_ms: 0,
            sensor_reset_ms: 0,
            format_switch_ms: 0,
            capture_settle_ms: 0,
            idle_settle_ms: 0,
            startup_settle_ms: 0,
            open_failure_ms: 0,
            poll_interval_ms: 0,
        }
    }
}

/// Camera configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub profile: CaptureProfile,
    pub identity: IdentityPolicy,
    /// Loopback writes attempted before bring-up gives up.
    pub wiring_attempts: u32,
    /// Capture-done polls before a capture times out.
    pub capture_polls: u32,
    pub timing: Timing,
    pub file_prefix: String<16>,
    pub file_extension: String<8>,
    /// Counter value of the first file.
    pub first_index: u16,
}

impl Default for Config {
    fn default() -> Self {
        let mut file_prefix = String::new();
        let _ = file_prefix.push_str("jpss");
        let mut file_extension = String::new();
        let _ = file_extension.push_str("jpg");

        Config {
            profile: CaptureProfile::DEFAULT,
            identity: IdentityPolicy::default(),
            wiring_attempts: 10,
            capture_polls: 5000,
            timing: Timing::default(),
            file_prefix,
            file_extension,
            first_index: 0,
        }
    }
}

impl Config {
    /// Default configuration with a specific profile.
    pub fn with_profile(profile: CaptureProfile) -> Self {
        Config {
            profile,
            ..Config::default()
        }
    }
}
