use embassy_time::Instant;

use super::word::SerialWord;
use crate::error::{Error, Result};

/// What a strobe edge did to the sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrobeOutcome {
    /// A new word was opened from idle
    Started,
    /// A word was still in progress; its bits were thrown away
    Restarted { discarded_bits: usize },
}

impl StrobeOutcome {
    /// A restart as [`Error::ProtocolDesync`]
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Started => Ok(()),
            Self::Restarted { discarded_bits } => Err(Error::ProtocolDesync { discarded_bits }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State<const WIDTH: usize> {
    Idle,
    Receiving {
        bits: [bool; WIDTH],
        count: usize,
        started: Instant,
    },
}

/// Running counters kept by the sampler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub strobes: u32,
    pub words: u32,
    pub desyncs: u32,
    pub discarded_bits: u32,
}

/// Clock/data/strobe state machine.
///
/// A strobe opens a word, each clock edge appends the data bit, and the
/// `WIDTH`-th bit completes the word. Clock edges outside a word are noise
/// and are ignored. Nothing here blocks or logs, so the methods are safe to
/// call from interrupt handlers.
#[derive(Debug, Clone)]
pub struct BitSampler<const WIDTH: usize> {
    state: State<WIDTH>,
    latest: Option<SerialWord<WIDTH>>,
    stats: SamplerStats,
}

impl<const WIDTH: usize> Default for BitSampler<WIDTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WIDTH: usize> BitSampler<WIDTH> {
    pub const fn new() -> Self {
        Self {
            state: State::Idle,
            latest: None,
            stats: SamplerStats {
                strobes: 0,
                words: 0,
                desyncs: 0,
                discarded_bits: 0,
            },
        }
    }

    /// Handle a strobe edge observed at `now`
    pub fn strobe(&mut self, now: Instant) -> StrobeOutcome {
        self.stats.strobes = self.stats.strobes.wrapping_add(1);

        let outcome = match self.state {
            State::Receiving { count, .. } => {
                self.stats.desyncs = self.stats.desyncs.wrapping_add(1);
                self.stats.discarded_bits = self.stats.discarded_bits.wrapping_add(count as u32);
                StrobeOutcome::Restarted {
                    discarded_bits: count,
                }
            }
            State::Idle => StrobeOutcome::Started,
        };

        self.state = State::Receiving {
            bits: [false; WIDTH],
            count: 0,
            started: now,
        };
        outcome
    }

    /// Handle a clock edge with the data line at `bit`
    ///
    /// Returns the word when this edge completed it.
    pub fn clock(&mut self, bit: bool) -> Option<SerialWord<WIDTH>> {
        let State::Receiving {
            mut bits,
            mut count,
            started,
        } = self.state
        else {
            return None;
        };

        if count < WIDTH {
            bits[count] = bit;
            count += 1;
        }

        if count >= WIDTH {
            let word = SerialWord::new(bits, started);
            self.state = State::Idle;
            self.latest = Some(word);
            self.stats.words = self.stats.words.wrapping_add(1);
            Some(word)
        } else {
            self.state = State::Receiving {
                bits,
                count,
                started,
            };
            None
        }
    }

    /// Take the most recent complete word, if one arrived since the last take
    pub fn take(&mut self) -> Option<SerialWord<WIDTH>> {
        self.latest.take()
    }

    /// Whether a word is currently being received
    pub fn in_progress(&self) -> bool {
        matches!(self.state, State::Receiving { .. })
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Drop any partial and pending word
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.latest = None;
    }
}
