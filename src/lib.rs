//! Capture JPEG stills from an ArduCAM OV5642 module into numbered files.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

/// Drivers and capture sequencing for the ArduCAM module.
pub mod arducam {
    mod bringup;
    pub mod bus;
    mod capture;
    mod mode;
    pub mod ov5642;
    pub mod profile;
    pub mod sccb;
    pub mod spi;

    pub use bringup::{DeviceState, Identity};
    pub use capture::{Camera, CaptureError, DeviceError, RunSummary, SavedFrame};
}

pub mod chunk_buf;
pub mod config;
pub mod jpeg;
pub mod nvm;

#[cfg(any(test, feature = "std"))]
pub mod sim;
