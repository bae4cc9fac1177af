//! Async I2C bus sharing and address-bound device handles
//!
//! The pressure transducer shares its I2C bus with the rest of the board.
//! [`SharedBusDevice`] gives each driver its own view of the bus while an
//! Embassy async mutex serializes transactions, and [`DeviceHandle`] pins a
//! view to one device address and turns HAL errors into [`Error`]s.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal::i2c::Error as _;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

use crate::error::{Error, Result};

/// Default 7-bit address of the MPRLS
pub const DEFAULT_ADDRESS: u8 = 0x18;

/// A bus shared between several device drivers
pub type SharedBus<T> = Mutex<CriticalSectionRawMutex, T>;

/// Async I2C bus sharing device using Embassy's async Mutex.
///
/// The lock is held for exactly one transaction, so two drivers never
/// interleave bytes on the wire while each can still yield to the executor
/// while its own transaction is in flight.
///
/// # Example
///
/// ```ignore
/// static I2C_BUS: StaticCell<SharedBus<I2c<'static, Async>>> = StaticCell::new();
///
/// let bus = I2C_BUS.init(Mutex::new(i2c));
/// let for_pressure = SharedBusDevice::new(bus);
/// let for_eeprom = SharedBusDevice::new(bus);
/// ```
pub struct SharedBusDevice<'a, T> {
    bus: &'a SharedBus<T>,
}

impl<'a, T> SharedBusDevice<'a, T> {
    /// Create a new `SharedBusDevice`.
    #[inline]
    pub const fn new(bus: &'a SharedBus<T>) -> Self {
        Self { bus }
    }
}

impl<T> ErrorType for SharedBusDevice<'_, T>
where
    T: ErrorType,
{
    type Error = T::Error;
}

impl<T> I2c for SharedBusDevice<'_, T>
where
    T: I2c,
{
    /// Executes the operations as one locked transaction.
    ///
    /// `read`, `write` and `write_read` are provided by the trait in terms of
    /// this method, so they inherit the same locking.
    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> core::result::Result<(), Self::Error> {
        let mut bus = self.bus.lock().await;
        bus.transaction(address, operations).await
    }
}

/// An I2C endpoint at a fixed address, owned by one driver
pub struct DeviceHandle<I> {
    i2c: I,
    address: u8,
    device: &'static str,
}

impl<I: I2c> DeviceHandle<I> {
    /// Bind `i2c` to `address`. `device` names the peripheral in errors.
    pub const fn new(i2c: I, address: u8, device: &'static str) -> Self {
        Self {
            i2c,
            address,
            device,
        }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub const fn device(&self) -> &'static str {
        self.device
    }

    /// Read `buffer.len()` bytes from the device
    pub async fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.i2c
            .read(self.address, buffer)
            .await
            .map_err(|e| self.bus_error("read", e.kind()))
    }

    /// Write `bytes` to the device
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.i2c
            .write(self.address, bytes)
            .await
            .map_err(|e| self.bus_error("write", e.kind()))
    }

    /// Give the underlying bus back
    pub fn release(self) -> I {
        self.i2c
    }

    fn bus_error(&self, operation: &'static str, kind: embedded_hal::i2c::ErrorKind) -> Error {
        Error::TransientBus {
            device: self.device,
            operation,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeI2c, FakeResponse};
    use embassy_futures::block_on;
    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

    #[test]
    fn test_shared_bus_forwards_to_device() {
        let mut fake = FakeI2c::new();
        fake.push_read(FakeResponse::Bytes(&[0x40, 0x01, 0x02, 0x03]));
        let bus: SharedBus<FakeI2c> = Mutex::new(fake);

        let mut device = SharedBusDevice::new(&bus);
        let mut buffer = [0u8; 4];
        block_on(device.read(0x18, &mut buffer)).expect("read succeeds");
        assert_eq!(buffer, [0x40, 0x01, 0x02, 0x03]);

        block_on(device.write(0x18, &[0xAA, 0x00, 0x00])).expect("write succeeds");
        let fake = block_on(bus.lock());
        assert_eq!(fake.writes(), &[(0x18, alloc::vec![0xAA, 0x00, 0x00])]);
    }

    #[test]
    fn test_handle_maps_nack_to_transient_bus_error() {
        let mut fake = FakeI2c::new();
        fake.push_read(FakeResponse::Nack);
        let mut handle = DeviceHandle::new(fake, DEFAULT_ADDRESS, "MPRLS");

        let mut buffer = [0u8; 1];
        let err = block_on(handle.read(&mut buffer)).unwrap_err();
        assert_eq!(
            err,
            Error::TransientBus {
                device: "MPRLS",
                operation: "read",
                kind: ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            }
        );
    }
}
