//! Test doubles for the I2C bus and GPIO lines

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use core::future::poll_fn;
use core::task::Poll;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

/// Scripted answer to one I2C read
#[derive(Debug, Clone, Copy)]
pub enum FakeResponse {
    Bytes(&'static [u8]),
    Nack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeI2cError(pub ErrorKind);

impl embedded_hal::i2c::Error for FakeI2cError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// I2C bus that answers reads from a script and records writes
#[derive(Default)]
pub struct FakeI2c {
    reads: VecDeque<FakeResponse>,
    writes: Vec<(u8, Vec<u8>)>,
    failing_writes: usize,
}

impl FakeI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_read(&mut self, response: FakeResponse) {
        self.reads.push_back(response);
    }

    /// Make the next `count` writes fail with a NACK
    pub fn fail_writes(&mut self, count: usize) {
        self.failing_writes = count;
    }

    pub fn writes(&self) -> &[(u8, Vec<u8>)] {
        &self.writes
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }
}

impl ErrorType for FakeI2c {
    type Error = FakeI2cError;
}

impl I2c for FakeI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations.iter_mut() {
            match operation {
                Operation::Read(buffer) => match self.reads.pop_front() {
                    Some(FakeResponse::Bytes(bytes)) => {
                        buffer.fill(0);
                        let len = bytes.len().min(buffer.len());
                        buffer[..len].copy_from_slice(&bytes[..len]);
                    }
                    Some(FakeResponse::Nack) => {
                        return Err(FakeI2cError(ErrorKind::NoAcknowledge(
                            NoAcknowledgeSource::Address,
                        )));
                    }
                    None => panic!("No scripted read for address 0x{:02x}", address),
                },
                Operation::Write(bytes) => {
                    if self.failing_writes > 0 {
                        self.failing_writes -= 1;
                        return Err(FakeI2cError(ErrorKind::NoAcknowledge(
                            NoAcknowledgeSource::Data,
                        )));
                    }
                    self.writes.push((address, bytes.to_vec()));
                }
            }
        }
        Ok(())
    }
}

/// Output pin that records every level it is driven to
#[derive(Clone, Default)]
pub struct RecordingPin {
    history: Rc<RefCell<Vec<bool>>>,
}

impl RecordingPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<bool> {
        self.history.borrow().clone()
    }

    pub fn level(&self) -> Option<bool> {
        self.history.borrow().last().copied()
    }
}

impl embedded_hal::digital::ErrorType for RecordingPin {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.history.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.history.borrow_mut().push(true);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakePinError;

impl embedded_hal::digital::Error for FakePinError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

/// Input pin whose every read fails
pub struct FailingPin;

impl embedded_hal::digital::ErrorType for FailingPin {
    type Error = FakePinError;
}

impl embedded_hal::digital::InputPin for FailingPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Err(FakePinError)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Err(FakePinError)
    }
}

/// One edge on the simulated coffee-maker bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEdge {
    Strobe,
    Clock(bool),
}

/// Shared edge script driving a set of [`ScriptedPin`]s
#[derive(Clone, Default)]
pub struct EdgeScript {
    edges: Rc<RefCell<VecDeque<BusEdge>>>,
    data_level: Rc<Cell<bool>>,
}

impl EdgeScript {
    pub fn new(edges: &[BusEdge]) -> Self {
        let script = Self::default();
        script.edges.borrow_mut().extend(edges.iter().copied());
        script
    }

    /// Edges for one strobe followed by the given bits
    pub fn word(bits: &[bool]) -> Vec<BusEdge> {
        let mut edges = alloc::vec![BusEdge::Strobe];
        edges.extend(bits.iter().map(|bit| BusEdge::Clock(*bit)));
        edges
    }

    pub fn remaining(&self) -> usize {
        self.edges.borrow().len()
    }

    pub fn clock_pin(&self) -> ScriptedPin {
        ScriptedPin {
            script: self.clone(),
            role: PinRole::Clock,
        }
    }

    pub fn strobe_pin(&self) -> ScriptedPin {
        ScriptedPin {
            script: self.clone(),
            role: PinRole::Strobe,
        }
    }

    pub fn data_pin(&self) -> ScriptedPin {
        ScriptedPin {
            script: self.clone(),
            role: PinRole::Data,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PinRole {
    Clock,
    Strobe,
    Data,
}

/// Input pin whose edges come from an [`EdgeScript`]
///
/// A wait resolves only when the next scripted edge belongs to this pin, so a
/// clock and strobe pin raced against each other replay the script in order.
pub struct ScriptedPin {
    script: EdgeScript,
    role: PinRole,
}

impl ScriptedPin {
    async fn wait_for_own_edge(&mut self) {
        poll_fn(|_| {
            let mut edges = self.script.edges.borrow_mut();
            match (self.role, edges.front().copied()) {
                (PinRole::Strobe, Some(BusEdge::Strobe)) => {
                    edges.pop_front();
                    Poll::Ready(())
                }
                (PinRole::Clock, Some(BusEdge::Clock(bit))) => {
                    edges.pop_front();
                    self.script.data_level.set(bit);
                    Poll::Ready(())
                }
                _ => Poll::Pending,
            }
        })
        .await
    }
}

impl embedded_hal::digital::ErrorType for ScriptedPin {
    type Error = Infallible;
}

impl embedded_hal::digital::InputPin for ScriptedPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.role == PinRole::Data && self.script.data_level.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl embedded_hal_async::digital::Wait for ScriptedPin {
    async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
        self.wait_for_own_edge().await;
        Ok(())
    }

    async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
        self.wait_for_own_edge().await;
        Ok(())
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for_own_edge().await;
        Ok(())
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for_own_edge().await;
        Ok(())
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for_own_edge().await;
        Ok(())
    }
}
