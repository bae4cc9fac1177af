use embassy_time::Instant;

/// Width of the coffee maker's LED status word
pub const COFFEE_MAKER_WORD_WIDTH: usize = 16;

/// Fixed-width sequence of bits captured after one strobe edge.
///
/// Bit 0 is the first bit clocked in after the strobe. The width is a
/// compile-time property of the device class, so words of different widths
/// are different types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialWord<const WIDTH: usize> {
    bits: [bool; WIDTH],
    timestamp: Instant,
}

impl<const WIDTH: usize> SerialWord<WIDTH> {
    pub const fn new(bits: [bool; WIDTH], timestamp: Instant) -> Self {
        Self { bits, timestamp }
    }

    /// Build a word from an integer, bit 0 of `value` becoming bit 0 of the
    /// word. Bits above `WIDTH` are ignored.
    pub fn from_lsb_first(value: u64, timestamp: Instant) -> Self {
        let mut bits = [false; WIDTH];
        for (index, bit) in bits.iter_mut().enumerate().take(64) {
            *bit = value & (1 << index) != 0;
        }
        Self { bits, timestamp }
    }

    pub const fn width(&self) -> usize {
        WIDTH
    }

    pub fn bit(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    pub const fn bits(&self) -> &[bool; WIDTH] {
        &self.bits
    }

    /// Time of the strobe that opened this word
    pub const fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Pack the first 64 bits into an integer, bit 0 first
    pub fn to_lsb_first(&self) -> u64 {
        self.bits
            .iter()
            .take(64)
            .enumerate()
            .fold(0, |acc, (index, bit)| acc | (u64::from(*bit) << index))
    }
}
