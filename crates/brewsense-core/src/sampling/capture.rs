use embassy_futures::select::{Either, select};
use embassy_time::Instant;
use embedded_hal::digital::InputPin;
use embedded_hal_async::digital::Wait;

use super::sampler::StrobeOutcome;
use super::shared::SharedSampler;
use crate::error::{Error, Result};

/// Something that has to run once per strobe cycle (button press timing)
pub trait StrobeListener {
    fn on_strobe(&self);
}

/// The edge that [`GpioCapture::step`] consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedEdge {
    Strobe(StrobeOutcome),
    Clock { bit: bool, completed_word: bool },
}

/// Async edge capture over GPIO pins
///
/// Used on targets where the clock and strobe lines are read through
/// `embedded_hal_async::digital::Wait` instead of dedicated interrupt
/// handlers. Both edges are awaited together, so a strobe that arrives in the
/// middle of a word is seen immediately and restarts it.
pub struct GpioCapture<C, D, S> {
    clock: C,
    data: D,
    strobe: S,
}

impl<C, D, S> GpioCapture<C, D, S>
where
    C: Wait,
    D: InputPin,
    S: Wait,
{
    pub fn new(clock: C, data: D, strobe: S) -> Self {
        Self {
            clock,
            data,
            strobe,
        }
    }

    /// Wait for the next strobe or clock edge and feed it to `sampler`
    pub async fn step<const WIDTH: usize>(
        &mut self,
        sampler: &SharedSampler<WIDTH>,
        listeners: &[&dyn StrobeListener],
    ) -> Result<CapturedEdge> {
        match select(
            self.strobe.wait_for_rising_edge(),
            self.clock.wait_for_rising_edge(),
        )
        .await
        {
            Either::First(strobe) => {
                strobe.map_err(|_| Error::Gpio { line: "strobe" })?;
                let outcome = sampler.on_strobe(Instant::now());
                for listener in listeners {
                    listener.on_strobe();
                }
                Ok(CapturedEdge::Strobe(outcome))
            }
            Either::Second(clock) => {
                clock.map_err(|_| Error::Gpio { line: "clock" })?;
                let bit = self
                    .data
                    .is_high()
                    .map_err(|_| Error::Gpio { line: "data" })?;
                let completed_word = sampler.on_clock(bit);
                Ok(CapturedEdge::Clock {
                    bit,
                    completed_word,
                })
            }
        }
    }

    /// Capture edges until a GPIO line fails
    pub async fn run<const WIDTH: usize>(
        &mut self,
        sampler: &SharedSampler<WIDTH>,
        listeners: &[&dyn StrobeListener],
    ) -> Error {
        loop {
            if let Err(e) = self.step(sampler, listeners).await {
                log::error!("Coffee maker capture stopped: {}", e);
                return e;
            }
        }
    }

    /// Give the pins back, e.g. to reconfigure them on shutdown
    pub fn release(self) -> (C, D, S) {
        (self.clock, self.data, self.strobe)
    }
}
