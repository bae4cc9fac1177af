//! Error taxonomy for brewsense
//!
//! Every fallible operation in the crate returns [`Error`]. Errors are split
//! into classes by [`Error::kind`] so the scheduler can decide, in one place,
//! whether a failed cycle is skipped (transient, desync) or whether startup
//! must halt (configuration).

use embedded_hal::i2c::ErrorKind as I2cErrorKind;
use thiserror_no_std::Error;

/// Result type used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;

/// Recovery class of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recoverable communication problem. The cycle is skipped and the
    /// previously published values stay in place.
    Transient,
    /// Strobe/word misalignment. The partial word was already discarded.
    Desync,
    /// A rejected command (button request, GPIO write).
    Command,
    /// Invalid configuration. Only produced at startup.
    Fatal,
}

/// All errors produced by brewsense
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// I2C NACK, arbitration loss or bus fault
    #[error("{device}: I2C {operation} failed ({kind:?})")]
    TransientBus {
        device: &'static str,
        operation: &'static str,
        kind: I2cErrorKind,
    },

    /// The device answered but its conversion is still running
    #[error("{device}: conversion still in progress")]
    DeviceBusy { device: &'static str },

    /// The device answered with an error flag in its status byte
    #[error("{device}: {details}")]
    DeviceFault {
        device: &'static str,
        details: &'static str,
    },

    /// Nothing has been received yet
    #[error("{device}: no data received yet")]
    NoData { device: &'static str },

    /// A strobe arrived before the previous word was complete
    ///
    /// The sampler only counts these; see [`StrobeOutcome::into_result`]
    /// for callers that want one per restart.
    ///
    /// [`StrobeOutcome::into_result`]: crate::sampling::StrobeOutcome::into_result
    #[error("strobe restarted a word after {discarded_bits} bits")]
    ProtocolDesync { discarded_bits: usize },

    /// A GPIO line could not be read or driven
    #[error("GPIO {line} failed")]
    Gpio { line: &'static str },

    /// A button request was made while the enable switch is off
    #[error("coffee maker control is disabled")]
    NotEnabled,

    /// A button request was made while another press is still held
    #[error("another button press is in progress")]
    ButtonBusy,

    /// The wiring has no button matrix lines
    #[error("no button matrix lines are configured")]
    NoButtonMatrix,

    #[error("configuration error: {0}")]
    Configuration(ConfigError),
}

impl Error {
    /// Classify the error for the scheduler
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientBus { .. }
            | Self::DeviceBusy { .. }
            | Self::DeviceFault { .. }
            | Self::NoData { .. } => ErrorKind::Transient,
            Self::ProtocolDesync { .. } => ErrorKind::Desync,
            Self::Gpio { .. } | Self::NotEnabled | Self::ButtonBusy | Self::NoButtonMatrix => {
                ErrorKind::Command
            }
            Self::Configuration(_) => ErrorKind::Fatal,
        }
    }

    /// Whether a poll cycle that failed with this error is simply skipped
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Fatal)
    }
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value)
    }
}

/// Configuration problems detected at startup
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{role} pin {pin} is out of range (max {max})")]
    PinOutOfRange {
        role: &'static str,
        pin: u8,
        max: u8,
    },

    #[error("pin {pin} is assigned to both {first} and {second}")]
    DuplicatePin {
        pin: u8,
        first: &'static str,
        second: &'static str,
    },

    #[error("I2C address 0x{address:02X} is not a valid 7-bit address")]
    InvalidAddress { address: u8 },

    #[error("calibration values must be finite")]
    NonFiniteCalibration,

    /// The raw endpoints coincide, so the linear map would divide by zero
    #[error("calibration range is empty (min {min}, max {max})")]
    DegenerateCalibration { min: f32, max: f32 },

    #[error("{component}: update interval must be greater than zero")]
    ZeroInterval { component: &'static str },

    #[error("LED averaging window must be at least one strobe cycle")]
    ZeroAveragingWindow,

    #[error("button press must last at least one strobe cycle")]
    ZeroButtonPress,

    #[error("word layout is {actual} bits wide, expected {expected}")]
    LayoutWidth { expected: usize, actual: usize },

    #[error("word layout uses bit {bit} of a {width}-bit word")]
    LayoutBitOutOfRange { bit: usize, width: usize },

    #[error("word layout assigns bit {bit} twice")]
    LayoutBitReused { bit: usize },

    #[error("word layout reading table is empty or has a zero divisor")]
    LayoutInvalidTable,

    #[error("could not decode configuration blob: {0}")]
    Decode(postcard::Error),

    #[error("could not encode configuration blob: {0}")]
    Encode(postcard::Error),
}
