//! Status word decoding
//!
//! A [`WordLayout`] is the single place that knows which panel LED sits on
//! which bit of the status word. [`decode_with`] walks the layout and
//! produces the named flags and derived readings; it has no state and no side
//! effects, so the same word always decodes the same way.
//!
//! Layouts are static and versioned. When a different panel revision wires
//! its LEDs differently, it gets a new layout with a new version rather than
//! runtime detection.

use alloc::vec::Vec;

use crate::error::ConfigError;
use crate::sampling::{COFFEE_MAKER_WORD_WIDTH, SerialWord};

/// Named boolean indicators on the coffee maker panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFlag {
    OneCupReady,
    TwoCupReady,
    HotWater,
    WaterEmpty,
    GroundsFull,
    Error,
    DecalcificationNeeded,
    GrindDisabled,
}

impl StatusFlag {
    pub const COUNT: usize = 8;

    pub const ALL: [StatusFlag; Self::COUNT] = [
        Self::OneCupReady,
        Self::TwoCupReady,
        Self::HotWater,
        Self::WaterEmpty,
        Self::GroundsFull,
        Self::Error,
        Self::DecalcificationNeeded,
        Self::GrindDisabled,
    ];

    /// Configuration/output name of the flag
    pub const fn name(self) -> &'static str {
        match self {
            Self::OneCupReady => "one_cup_ready",
            Self::TwoCupReady => "two_cup_ready",
            Self::HotWater => "hot_water",
            Self::WaterEmpty => "water_empty",
            Self::GroundsFull => "grounds_full",
            Self::Error => "error",
            Self::DecalcificationNeeded => "decalcification_needed",
            Self::GrindDisabled => "grind_disabled",
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Value of every [`StatusFlag`] for one word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags {
    states: [bool; StatusFlag::COUNT],
}

impl StatusFlags {
    pub const fn get(&self, flag: StatusFlag) -> bool {
        self.states[flag.index()]
    }

    pub fn set(&mut self, flag: StatusFlag, state: bool) {
        self.states[flag.index()] = state;
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatusFlag, bool)> + '_ {
        StatusFlag::ALL.into_iter().map(|flag| (flag, self.get(flag)))
    }

    /// Number of flags currently set
    pub fn count_active(&self) -> usize {
        self.states.iter().filter(|state| **state).count()
    }
}

/// Numeric readings derived from bit groups
///
/// `None` means the group held no valid code, e.g. no quantity LED was lit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivedReadings {
    /// Cups, one decimal
    pub coffee_quantity: Option<f32>,
    /// Integer intensity index
    pub coffee_flavor: Option<f32>,
}

/// How a group of adjacent bits encodes a table index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEncoding {
    /// Exactly one bit set; its position is the index
    OneHot,
    /// The bits form an integer, lowest bit first
    Binary,
}

/// Lookup table for one derived reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingTable {
    /// First bit of the group
    pub start: usize,
    /// Number of bits in the group
    pub width: usize,
    pub encoding: GroupEncoding,
    /// Reading for each index, scaled by `divisor`
    pub values: &'static [u16],
    pub divisor: u16,
}

impl ReadingTable {
    fn index<const W: usize>(&self, word: &SerialWord<W>) -> Option<usize> {
        let bits = (self.start..self.start + self.width).map(|bit| word.bit(bit));
        match self.encoding {
            GroupEncoding::OneHot => {
                let mut lit = bits.enumerate().filter(|(_, set)| *set).map(|(i, _)| i);
                match (lit.next(), lit.next()) {
                    (Some(index), None) => Some(index),
                    _ => None,
                }
            }
            GroupEncoding::Binary => Some(
                bits.enumerate()
                    .fold(0, |acc, (i, set)| acc | (usize::from(set) << i)),
            ),
        }
    }

    /// Look up the reading held in `word`
    pub fn read<const W: usize>(&self, word: &SerialWord<W>) -> Option<f32> {
        let value = *self.values.get(self.index(word)?)?;
        Some(f32::from(value) / f32::from(self.divisor))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fits = match self.encoding {
            GroupEncoding::OneHot => self.values.len() == self.width,
            GroupEncoding::Binary => self.width <= 16 && self.values.len() <= 1 << self.width,
        };
        if self.values.is_empty() || self.divisor == 0 || !fits {
            return Err(ConfigError::LayoutInvalidTable);
        }
        Ok(())
    }
}

/// One flag bound to one bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagBit {
    pub flag: StatusFlag,
    pub bit: usize,
}

impl FlagBit {
    pub const fn new(flag: StatusFlag, bit: usize) -> Self {
        Self { flag, bit }
    }
}

/// Declarative bit map of a status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordLayout {
    pub version: u16,
    pub width: usize,
    /// A flag listed more than once is set when any of its bits is set
    pub flags: &'static [FlagBit],
    pub quantity: Option<ReadingTable>,
    pub flavor: Option<ReadingTable>,
}

impl WordLayout {
    /// Check the layout against the word width it will decode
    pub fn validate(&self, width: usize) -> Result<(), ConfigError> {
        if self.width != width {
            return Err(ConfigError::LayoutWidth {
                expected: width,
                actual: self.width,
            });
        }

        let mut claimed: Vec<usize> = self.flags.iter().map(|entry| entry.bit).collect();
        for table in self.quantity.iter().chain(self.flavor.iter()) {
            table.validate()?;
            claimed.extend(table.start..table.start + table.width);
        }

        for (position, bit) in claimed.iter().enumerate() {
            if *bit >= width {
                return Err(ConfigError::LayoutBitOutOfRange { bit: *bit, width });
            }
            if claimed[..position].contains(bit) {
                return Err(ConfigError::LayoutBitReused { bit: *bit });
            }
        }
        Ok(())
    }
}

/// Quantity LEDs: 1, 1.5 and 2 cups
const QUANTITY_CUPS_TENTHS: [u16; 3] = [10, 15, 20];

/// Flavor LEDs: mild, medium, strong
const FLAVOR_LEVELS: [u16; 3] = [1, 2, 3];

const COFFEE_MAKER_FLAGS: [FlagBit; StatusFlag::COUNT] = [
    FlagBit::new(StatusFlag::OneCupReady, 0),
    FlagBit::new(StatusFlag::TwoCupReady, 1),
    FlagBit::new(StatusFlag::HotWater, 2),
    FlagBit::new(StatusFlag::WaterEmpty, 3),
    FlagBit::new(StatusFlag::GroundsFull, 4),
    FlagBit::new(StatusFlag::Error, 5),
    FlagBit::new(StatusFlag::DecalcificationNeeded, 6),
    FlagBit::new(StatusFlag::GrindDisabled, 7),
];

/// Panel layout, revision 1. Bits 14 and 15 are not wired to an indicator.
pub static COFFEE_MAKER_LAYOUT: WordLayout = WordLayout {
    version: 1,
    width: COFFEE_MAKER_WORD_WIDTH,
    flags: &COFFEE_MAKER_FLAGS,
    quantity: Some(ReadingTable {
        start: 8,
        width: 3,
        encoding: GroupEncoding::OneHot,
        values: &QUANTITY_CUPS_TENTHS,
        divisor: 10,
    }),
    flavor: Some(ReadingTable {
        start: 11,
        width: 3,
        encoding: GroupEncoding::OneHot,
        values: &FLAVOR_LEVELS,
        divisor: 1,
    }),
};

/// Decode a coffee-maker word with [`COFFEE_MAKER_LAYOUT`]
pub fn decode(word: &SerialWord<COFFEE_MAKER_WORD_WIDTH>) -> (StatusFlags, DerivedReadings) {
    decode_with(word, &COFFEE_MAKER_LAYOUT)
}

/// Decode `word` with any layout of the same width
pub fn decode_with<const W: usize>(
    word: &SerialWord<W>,
    layout: &WordLayout,
) -> (StatusFlags, DerivedReadings) {
    let mut flags = StatusFlags::default();
    for entry in layout.flags {
        if word.bit(entry.bit) {
            flags.set(entry.flag, true);
        }
    }

    let readings = DerivedReadings {
        coffee_quantity: layout.quantity.and_then(|table| table.read(word)),
        coffee_flavor: layout.flavor.and_then(|table| table.read(word)),
    };

    (flags, readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Instant;

    fn word16(value: u64) -> SerialWord<COFFEE_MAKER_WORD_WIDTH> {
        SerialWord::from_lsb_first(value, Instant::from_ticks(0))
    }

    static EIGHT_BIT_LAYOUT: WordLayout = WordLayout {
        version: 1,
        width: 8,
        flags: &COFFEE_MAKER_FLAGS,
        quantity: None,
        flavor: None,
    };

    #[test]
    fn test_default_layout_is_valid() {
        assert_eq!(COFFEE_MAKER_LAYOUT.validate(COFFEE_MAKER_WORD_WIDTH), Ok(()));
        assert_eq!(EIGHT_BIT_LAYOUT.validate(8), Ok(()));
    }

    #[test]
    fn test_eight_bit_word_sets_only_one_cup_ready() {
        let word = SerialWord::<8>::from_lsb_first(0b0000_0001, Instant::from_ticks(0));
        let (flags, readings) = decode_with(&word, &EIGHT_BIT_LAYOUT);

        assert!(flags.get(StatusFlag::OneCupReady));
        for (flag, state) in flags.iter() {
            if flag != StatusFlag::OneCupReady {
                assert!(!state, "{} should be clear", flag.name());
            }
        }
        assert_eq!(readings, DerivedReadings::default());
    }

    #[test]
    fn test_derived_readings_from_one_hot_groups() {
        // 1.5 cups (bit 9), strong (bit 13), water empty (bit 3)
        let (flags, readings) = decode(&word16((1 << 9) | (1 << 13) | (1 << 3)));
        assert_eq!(readings.coffee_quantity, Some(1.5));
        assert_eq!(readings.coffee_flavor, Some(3.0));
        assert!(flags.get(StatusFlag::WaterEmpty));
        assert_eq!(flags.count_active(), 1);
    }

    #[test]
    fn test_invalid_one_hot_group_yields_none() {
        let (_, none_lit) = decode(&word16(0));
        assert_eq!(none_lit.coffee_quantity, None);

        let (_, two_lit) = decode(&word16((1 << 8) | (1 << 10)));
        assert_eq!(two_lit.coffee_quantity, None);
    }

    #[test]
    fn test_binary_group_lookup() {
        static VALUES: [u16; 3] = [5, 10, 25];
        let table = ReadingTable {
            start: 2,
            width: 2,
            encoding: GroupEncoding::Binary,
            values: &VALUES,
            divisor: 10,
        };
        // group bits are read lowest bit first
        let word = SerialWord::<4>::from_lsb_first(0b0100, Instant::from_ticks(0));
        assert_eq!(table.read(&word), Some(1.0));
        let word = SerialWord::<4>::from_lsb_first(0b1000, Instant::from_ticks(0));
        assert_eq!(table.read(&word), Some(2.5));
        // index 3 has no table entry
        let word = SerialWord::<4>::from_lsb_first(0b1100, Instant::from_ticks(0));
        assert_eq!(table.read(&word), None);
    }

    #[test]
    fn test_decode_is_deterministic_over_all_words() {
        for value in 0..(1u64 << COFFEE_MAKER_WORD_WIDTH) {
            let word = word16(value);
            let first = decode(&word);
            let second = decode(&word);
            assert_eq!(first, second, "word {:#06x} decoded differently", value);
        }
    }

    #[test]
    fn test_layout_validation_rejects_bad_tables() {
        static OVERLAP: [FlagBit; 2] = [
            FlagBit::new(StatusFlag::Error, 3),
            FlagBit::new(StatusFlag::GroundsFull, 3),
        ];
        let layout = WordLayout {
            flags: &OVERLAP,
            ..EIGHT_BIT_LAYOUT
        };
        assert_eq!(layout.validate(8), Err(ConfigError::LayoutBitReused { bit: 3 }));

        assert_eq!(
            COFFEE_MAKER_LAYOUT.validate(8),
            Err(ConfigError::LayoutWidth {
                expected: 8,
                actual: 16
            })
        );

        static FAR: [FlagBit; 1] = [FlagBit::new(StatusFlag::Error, 8)];
        let layout = WordLayout {
            flags: &FAR,
            ..EIGHT_BIT_LAYOUT
        };
        assert_eq!(
            layout.validate(8),
            Err(ConfigError::LayoutBitOutOfRange { bit: 8, width: 8 })
        );

        let layout = WordLayout {
            quantity: Some(ReadingTable {
                start: 0,
                width: 2,
                encoding: GroupEncoding::OneHot,
                values: &QUANTITY_CUPS_TENTHS,
                divisor: 10,
            }),
            flags: &[],
            ..EIGHT_BIT_LAYOUT
        };
        assert_eq!(layout.validate(8), Err(ConfigError::LayoutInvalidTable));
    }

    #[test]
    fn test_flag_listed_twice_is_or_ed() {
        static TWICE: [FlagBit; 2] = [
            FlagBit::new(StatusFlag::Error, 0),
            FlagBit::new(StatusFlag::Error, 5),
        ];
        let layout = WordLayout {
            flags: &TWICE,
            ..EIGHT_BIT_LAYOUT
        };
        assert_eq!(layout.validate(8), Ok(()));
        let word = SerialWord::<8>::from_lsb_first(1 << 5, Instant::from_ticks(0));
        assert!(decode_with(&word, &layout).0.get(StatusFlag::Error));
    }
}
