//! Hardware-independent core library for brewsense
//!
//! This crate contains all platform-agnostic logic for the brewsense device:
//! sampling the coffee maker's clock/data/strobe LED bus, decoding the status
//! word, driving its button lines, polling the MPRLS pressure transducer over
//! I2C, and the cooperative scheduler that publishes everything to sensor
//! sinks.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod async_i2c_bus;
pub mod buttons;
pub mod calibration;
pub mod config;
pub mod decoder;
pub mod error;
pub mod outputs;
pub mod sampling;
pub mod scheduler;
pub mod sensors;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ConfigError, Error, ErrorKind, Result};
