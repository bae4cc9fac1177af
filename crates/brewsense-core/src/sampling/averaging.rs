//! LED state averaging over a window of strobe cycles
//!
//! The panel multiplexes its LEDs, and several indicators blink rather than
//! stay lit (water empty, decalcification). A single word therefore says
//! little about an indicator; counting how often each bit was set over a
//! window of words separates steady, blinking and dark LEDs.

use super::word::SerialWord;

/// Default number of words per averaging window
pub const DEFAULT_AVERAGING_WINDOW: u16 = 500;

/// Share of words (in percent) above which a bit counts as steadily lit
const ON_THRESHOLD_PERCENT: u32 = 90;

/// Share of words (in percent) below which a bit counts as dark
const OFF_THRESHOLD_PERCENT: u32 = 10;

/// Settled state of one LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedState {
    #[default]
    Off,
    On,
    Flashing,
}

impl LedState {
    /// Whether the indicator should be reported as active
    pub const fn is_lit(self) -> bool {
        matches!(self, Self::On | Self::Flashing)
    }
}

/// Per-bit on-counter over a fixed window of words
#[derive(Debug, Clone)]
pub struct LedAverager<const WIDTH: usize> {
    window: u16,
    samples: u16,
    counts: [u16; WIDTH],
}

impl<const WIDTH: usize> LedAverager<WIDTH> {
    /// `window` must be at least 1; configuration validation guarantees it.
    pub const fn new(window: u16) -> Self {
        Self {
            window: if window == 0 { 1 } else { window },
            samples: 0,
            counts: [0; WIDTH],
        }
    }

    pub const fn window(&self) -> u16 {
        self.window
    }

    /// Add a word. Returns the LED states when this word closed a window.
    pub fn push(&mut self, word: &SerialWord<WIDTH>) -> Option<[LedState; WIDTH]> {
        for (count, bit) in self.counts.iter_mut().zip(word.bits()) {
            if *bit {
                *count += 1;
            }
        }
        self.samples += 1;

        if self.samples < self.window {
            return None;
        }

        let states = self.classify();
        self.clear();
        Some(states)
    }

    /// Start the window over
    pub fn clear(&mut self) {
        self.samples = 0;
        self.counts = [0; WIDTH];
    }

    fn classify(&self) -> [LedState; WIDTH] {
        let samples = u32::from(self.samples);
        let mut states = [LedState::Off; WIDTH];
        for (state, count) in states.iter_mut().zip(self.counts) {
            let percent = u32::from(count) * 100 / samples;
            *state = if percent >= ON_THRESHOLD_PERCENT {
                LedState::On
            } else if percent <= OFF_THRESHOLD_PERCENT {
                LedState::Off
            } else {
                LedState::Flashing
            };
        }
        states
    }
}

/// Rebuild a word from settled LED states
pub fn settled_word<const WIDTH: usize>(
    states: &[LedState; WIDTH],
    timestamp: embassy_time::Instant,
) -> SerialWord<WIDTH> {
    SerialWord::new((*states).map(LedState::is_lit), timestamp)
}
