//! Coffee-maker LED bus sampling
//!
//! The coffee maker's panel controller shifts its LED state out on a
//! synchronous bus: a strobe edge marks the start of a word, then one data bit
//! is valid on every rising clock edge. This module turns those edges into
//! fixed-width [`SerialWord`]s.
//!
//! - [`BitSampler`] is the bare state machine.
//! - [`SharedSampler`] wraps it together with [`LedAverager`] behind a
//!   critical-section mutex so interrupt handlers and the poller can share it.
//! - [`GpioCapture`] feeds a shared sampler from async GPIO pins.

pub mod averaging;
mod capture;
mod sampler;
mod shared;
mod word;

pub use averaging::{DEFAULT_AVERAGING_WINDOW, LedAverager, LedState};
pub use capture::{CapturedEdge, GpioCapture, StrobeListener};
pub use sampler::{BitSampler, SamplerStats, StrobeOutcome};
pub use shared::SharedSampler;
pub use word::{COFFEE_MAKER_WORD_WIDTH, SerialWord};
