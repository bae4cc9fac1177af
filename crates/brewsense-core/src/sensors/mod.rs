//! Polled components
//!
//! Everything the [`PollingTask`](crate::scheduler::PollingTask) drives
//! implements [`Sensor`]: one async read per cycle, then a synchronous
//! publish of the result to the component's sinks.

mod coffee_maker;
mod mprls;

use crate::error::Result;

/// Trait for components that produce typed readings once per poll cycle.
pub trait Sensor {
    /// The type of readings this sensor produces.
    type Readings;

    /// Name used in log lines
    fn name(&self) -> &'static str;

    /// Read the sensor and return typed readings.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings>>;

    /// Hand a successful reading to the sinks.
    fn publish(&mut self, readings: &Self::Readings);

    /// Stop driving outputs and drop partial state. Called once when the
    /// scheduler shuts down.
    fn shutdown(&mut self) {}
}

pub use coffee_maker::{CoffeeMaker, CoffeeMakerReadings};
pub use mprls::{MPRLS_DEVICE, Mprls, MprlsStatus, PressureReading, PressureSensor};
