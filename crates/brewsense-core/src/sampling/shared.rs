use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;

use super::averaging::{LedAverager, LedState, settled_word};
use super::sampler::{BitSampler, SamplerStats, StrobeOutcome};
use super::word::SerialWord;

struct Inner<const WIDTH: usize> {
    sampler: BitSampler<WIDTH>,
    averager: LedAverager<WIDTH>,
    settled: Option<SerialWord<WIDTH>>,
    led_states: [LedState; WIDTH],
}

/// Sampler shared between the edge source and the poller.
///
/// Edge handlers (GPIO interrupts or [`GpioCapture`](super::GpioCapture))
/// feed strobes and clocks; the coffee maker drains settled words once per
/// poll. Every access runs inside a critical section, so the type can live in
/// a `static` next to interrupt handlers.
///
/// ```ignore
/// static SAMPLER: SharedSampler<COFFEE_MAKER_WORD_WIDTH> =
///     SharedSampler::new(DEFAULT_AVERAGING_WINDOW);
/// ```
pub struct SharedSampler<const WIDTH: usize> {
    inner: BlockingMutex<CriticalSectionRawMutex, RefCell<Inner<WIDTH>>>,
}

impl<const WIDTH: usize> SharedSampler<WIDTH> {
    /// Create a sampler averaging LED states over `averaging_window` words
    pub const fn new(averaging_window: u16) -> Self {
        Self {
            inner: BlockingMutex::new(RefCell::new(Inner {
                sampler: BitSampler::new(),
                averager: LedAverager::new(averaging_window),
                settled: None,
                led_states: [LedState::Off; WIDTH],
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner<WIDTH>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Strobe edge handler
    pub fn on_strobe(&self, now: Instant) -> StrobeOutcome {
        self.with(|inner| inner.sampler.strobe(now))
    }

    /// Clock edge handler; `bit` is the level of the data line.
    ///
    /// Returns `true` when the edge completed a word.
    pub fn on_clock(&self, bit: bool) -> bool {
        self.with(|inner| {
            let Some(word) = inner.sampler.clock(bit) else {
                return false;
            };
            if let Some(states) = inner.averager.push(&word) {
                inner.settled = Some(settled_word(&states, word.timestamp()));
                inner.led_states = states;
            }
            true
        })
    }

    /// Take the settled word produced since the last call, if any
    pub fn take(&self) -> Option<SerialWord<WIDTH>> {
        self.with(|inner| inner.settled.take())
    }

    /// LED states of the last closed averaging window
    pub fn led_states(&self) -> [LedState; WIDTH] {
        self.with(|inner| inner.led_states)
    }

    pub fn stats(&self) -> SamplerStats {
        self.with(|inner| inner.sampler.stats())
    }

    pub fn averaging_window(&self) -> u16 {
        self.with(|inner| inner.averager.window())
    }

    /// Return to a clean idle state: no partial word, no pending word and an
    /// empty averaging window
    pub fn reset(&self) {
        self.with(|inner| {
            inner.sampler.reset();
            inner.averager.clear();
            inner.settled = None;
        })
    }
}
