use alloc::boxed::Box;

use embedded_hal_async::i2c::I2c;

use super::Sensor;
use crate::async_i2c_bus::DeviceHandle;
use crate::calibration::{CalibrationProfile, RawCount};
use crate::config::PressureSensorConfig;
use crate::error::{ConfigError, Error, Result};
use crate::outputs::NumericSink;

pub const MPRLS_DEVICE: &str = "MPRLS";

/// Output measurement command, followed by two don't-care bytes
const MEASURE_COMMAND: [u8; 3] = [0xAA, 0x00, 0x00];

const STATUS_POWERED: u8 = 0x40;
const STATUS_BUSY: u8 = 0x20;
const STATUS_INTEGRITY_FAILED: u8 = 0x04;
const STATUS_MATH_SATURATION: u8 = 0x01;

/// Status byte sent ahead of every measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MprlsStatus(pub u8);

impl MprlsStatus {
    pub const fn is_powered(self) -> bool {
        self.0 & STATUS_POWERED != 0
    }

    pub const fn is_busy(self) -> bool {
        self.0 & STATUS_BUSY != 0
    }

    pub const fn integrity_failed(self) -> bool {
        self.0 & STATUS_INTEGRITY_FAILED != 0
    }

    pub const fn math_saturated(self) -> bool {
        self.0 & STATUS_MATH_SATURATION != 0
    }

    /// Reject any status whose count must not be used
    pub const fn check(self) -> Result<()> {
        if self.is_busy() {
            return Err(Error::DeviceBusy {
                device: MPRLS_DEVICE,
            });
        }
        if self.math_saturated() {
            return Err(Error::DeviceFault {
                device: MPRLS_DEVICE,
                details: "math saturation",
            });
        }
        if self.integrity_failed() {
            return Err(Error::DeviceFault {
                device: MPRLS_DEVICE,
                details: "memory integrity check failed",
            });
        }
        Ok(())
    }
}

/// Bare MPRLS driver: one transaction per call, no retries
pub struct Mprls<I> {
    handle: DeviceHandle<I>,
}

impl<I: I2c> Mprls<I> {
    pub const fn new(i2c: I, address: u8) -> Self {
        Self {
            handle: DeviceHandle::new(i2c, address, MPRLS_DEVICE),
        }
    }

    pub const fn address(&self) -> u8 {
        self.handle.address()
    }

    /// Start a conversion; the result is ready about 5 ms later
    pub async fn start_conversion(&mut self) -> Result<()> {
        self.handle.write(&MEASURE_COMMAND).await
    }

    /// Read status and 24-bit count of the last conversion
    pub async fn read(&mut self) -> Result<RawCount> {
        let mut buffer = [0u8; 4];
        self.handle.read(&mut buffer).await?;
        MprlsStatus(buffer[0]).check()?;
        Ok(RawCount::from_be_bytes([buffer[1], buffer[2], buffer[3]]))
    }

    pub fn release(self) -> I {
        self.handle.release()
    }
}

/// One calibrated measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReading {
    pub raw: RawCount,
    pub pressure: f32,
}

/// MPRLS driver, calibration and the pressure sink as one polled component
pub struct PressureSensor<I> {
    driver: Mprls<I>,
    profile: CalibrationProfile,
    sink: Option<Box<dyn NumericSink>>,
}

impl<I: I2c> PressureSensor<I> {
    pub fn new(
        i2c: I,
        config: &PressureSensorConfig,
        sink: Option<Box<dyn NumericSink>>,
    ) -> core::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            driver: Mprls::new(i2c, config.address),
            profile: config.profile()?,
            sink,
        })
    }

    pub const fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    /// Trigger the first conversion so the first poll finds data
    pub async fn setup(&mut self) -> Result<()> {
        log::info!(
            "{}: setup at I2C address 0x{:02X}",
            MPRLS_DEVICE,
            self.driver.address()
        );
        self.driver.start_conversion().await.inspect_err(|e| {
            log::error!("{}: initial conversion failed: {}", MPRLS_DEVICE, e);
        })
    }

    pub fn release(self) -> I {
        self.driver.release()
    }
}

impl<I: I2c> Sensor for PressureSensor<I> {
    type Readings = PressureReading;

    fn name(&self) -> &'static str {
        MPRLS_DEVICE
    }

    async fn read(&mut self) -> Result<PressureReading> {
        let raw = self.driver.read().await?;

        // The count is valid whether or not the next conversion starts
        if let Err(e) = self.driver.start_conversion().await {
            log::warn!("{}: failed to trigger next conversion: {}", MPRLS_DEVICE, e);
        }

        let pressure = self.profile.calibrate(raw);
        log::debug!("{}: raw {} -> {} Pa", MPRLS_DEVICE, raw.0, pressure);
        Ok(PressureReading { raw, pressure })
    }

    fn publish(&mut self, readings: &PressureReading) {
        if let Some(sink) = self.sink.as_mut() {
            sink.publish_state(readings.pressure);
        }
    }
}
