//! Device configuration
//!
//! The configuration arrives as a postcard blob (flash partition, provisioning
//! message) and is decoded into [`DeviceConfig`]. [`DeviceConfig::validate`]
//! runs once at startup; every error it returns is fatal.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::async_i2c_bus::DEFAULT_ADDRESS;
use crate::buttons::DEFAULT_BUTTON_PRESS_STROBES;
use crate::calibration::{CalibrationProfile, TransferMode};
use crate::decoder::{COFFEE_MAKER_LAYOUT, StatusFlag};
use crate::error::ConfigError;
use crate::sampling::{COFFEE_MAKER_WORD_WIDTH, DEFAULT_AVERAGING_WINDOW};

/// Highest GPIO number of the target (ESP32-S3)
pub const MAX_GPIO: u8 = 48;

/// Default poll period of both components
pub const DEFAULT_UPDATE_INTERVAL_MS: u32 = 60_000;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    pub coffee_maker: Option<CoffeeMakerConfig>,
    pub pressure_sensor: Option<PressureSensorConfig>,
}

impl DeviceConfig {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(bytes).map_err(ConfigError::Decode)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(ConfigError::Encode)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(coffee_maker) = &self.coffee_maker {
            coffee_maker.validate()?;
        }
        if let Some(pressure_sensor) = &self.pressure_sensor {
            pressure_sensor.validate()?;
        }
        Ok(())
    }

    /// Decode and validate in one step, logging the reason on failure
    pub fn load(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config = Self::from_bytes(bytes).and_then(|config| {
            config.validate()?;
            Ok(config)
        });
        if let Err(e) = &config {
            log::error!("Invalid device configuration: {}", e);
        }
        config
    }
}

/// A GPIO number plus its polarity
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioPin {
    pub number: u8,
    #[serde(default)]
    pub inverted: bool,
}

impl GpioPin {
    pub const fn new(number: u8) -> Self {
        Self {
            number,
            inverted: false,
        }
    }

    pub const fn inverted(number: u8) -> Self {
        Self {
            number,
            inverted: true,
        }
    }
}

/// Full pin set with polarity per line
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedPins {
    pub clock: GpioPin,
    pub data: GpioPin,
    pub strobe: GpioPin,
    pub buttons_a: GpioPin,
    pub buttons_b: GpioPin,
    pub button_onoff: GpioPin,
}

/// Bare pin numbers of the minimal wiring. `zio` is the on/off line; there
/// are no button matrix lines.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPins {
    pub clock: u8,
    pub data: u8,
    pub strobe: u8,
    pub zio: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinAssignment {
    Named(NamedPins),
    Raw(RawPins),
}

impl Default for PinAssignment {
    fn default() -> Self {
        Self::Named(NamedPins {
            clock: GpioPin::new(4),
            data: GpioPin::new(5),
            strobe: GpioPin::new(6),
            buttons_a: GpioPin::new(7),
            buttons_b: GpioPin::new(15),
            button_onoff: GpioPin::new(16),
        })
    }
}

/// Pins after validation, the same shape for both assignment variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPins {
    pub clock: GpioPin,
    pub data: GpioPin,
    pub strobe: GpioPin,
    pub buttons_a: Option<GpioPin>,
    pub buttons_b: Option<GpioPin>,
    pub button_onoff: GpioPin,
}

impl ResolvedPins {
    /// Every assigned line with its role name
    pub fn roles(&self) -> impl Iterator<Item = (&'static str, GpioPin)> {
        [
            ("clock", Some(self.clock)),
            ("data", Some(self.data)),
            ("strobe", Some(self.strobe)),
            ("buttons_a", self.buttons_a),
            ("buttons_b", self.buttons_b),
            ("button_onoff", Some(self.button_onoff)),
        ]
        .into_iter()
        .filter_map(|(role, pin)| pin.map(|pin| (role, pin)))
    }

    /// Whether brew requests can be sent
    pub const fn has_button_matrix(&self) -> bool {
        self.buttons_a.is_some() && self.buttons_b.is_some()
    }
}

impl PinAssignment {
    /// Normalize and check: every pin in range, no pin used twice
    pub fn resolve(&self) -> Result<ResolvedPins, ConfigError> {
        let pins = match *self {
            Self::Named(named) => ResolvedPins {
                clock: named.clock,
                data: named.data,
                strobe: named.strobe,
                buttons_a: Some(named.buttons_a),
                buttons_b: Some(named.buttons_b),
                button_onoff: named.button_onoff,
            },
            Self::Raw(raw) => ResolvedPins {
                clock: GpioPin::new(raw.clock),
                data: GpioPin::new(raw.data),
                strobe: GpioPin::new(raw.strobe),
                buttons_a: None,
                buttons_b: None,
                button_onoff: GpioPin::new(raw.zio),
            },
        };

        let roles: Vec<(&'static str, GpioPin)> = pins.roles().collect();
        for (position, (role, pin)) in roles.iter().enumerate() {
            if pin.number > MAX_GPIO {
                return Err(ConfigError::PinOutOfRange {
                    role: *role,
                    pin: pin.number,
                    max: MAX_GPIO,
                });
            }
            if let Some((first, _)) = roles[..position]
                .iter()
                .find(|(_, other)| other.number == pin.number)
            {
                return Err(ConfigError::DuplicatePin {
                    pin: pin.number,
                    first: *first,
                    second: *role,
                });
            }
        }
        Ok(pins)
    }
}

/// Which coffee maker outputs get a sink
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct OutputSelection {
    pub one_cup_ready: bool,
    pub two_cup_ready: bool,
    pub hot_water: bool,
    pub water_empty: bool,
    pub grounds_full: bool,
    pub error: bool,
    pub decalcification_needed: bool,
    pub grind_disabled: bool,
    pub coffee_quantity: bool,
    pub coffee_flavor: bool,
    pub enable: bool,
}

impl OutputSelection {
    /// Nothing published
    pub const NONE: Self = Self {
        one_cup_ready: false,
        two_cup_ready: false,
        hot_water: false,
        water_empty: false,
        grounds_full: false,
        error: false,
        decalcification_needed: false,
        grind_disabled: false,
        coffee_quantity: false,
        coffee_flavor: false,
        enable: false,
    };

    pub const fn flag(&self, flag: StatusFlag) -> bool {
        match flag {
            StatusFlag::OneCupReady => self.one_cup_ready,
            StatusFlag::TwoCupReady => self.two_cup_ready,
            StatusFlag::HotWater => self.hot_water,
            StatusFlag::WaterEmpty => self.water_empty,
            StatusFlag::GroundsFull => self.grounds_full,
            StatusFlag::Error => self.error,
            StatusFlag::DecalcificationNeeded => self.decalcification_needed,
            StatusFlag::GrindDisabled => self.grind_disabled,
        }
    }
}

impl Default for OutputSelection {
    fn default() -> Self {
        Self {
            one_cup_ready: true,
            two_cup_ready: true,
            hot_water: true,
            water_empty: true,
            grounds_full: true,
            error: true,
            decalcification_needed: true,
            grind_disabled: true,
            coffee_quantity: true,
            coffee_flavor: true,
            enable: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CoffeeMakerConfig {
    pub update_interval_ms: u32,
    pub pins: PinAssignment,
    pub outputs: OutputSelection,
    /// Strobe cycles per LED averaging window
    pub averaging_window: u16,
    /// Strobe cycles a button press is held
    pub button_press_strobes: u16,
}

impl Default for CoffeeMakerConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            pins: PinAssignment::default(),
            outputs: OutputSelection::default(),
            averaging_window: DEFAULT_AVERAGING_WINDOW,
            button_press_strobes: DEFAULT_BUTTON_PRESS_STROBES,
        }
    }
}

impl CoffeeMakerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                component: "coffee_maker",
            });
        }
        if self.averaging_window == 0 {
            return Err(ConfigError::ZeroAveragingWindow);
        }
        if self.button_press_strobes == 0 {
            return Err(ConfigError::ZeroButtonPress);
        }
        self.pins.resolve()?;
        COFFEE_MAKER_LAYOUT.validate(COFFEE_MAKER_WORD_WIDTH)
    }

    pub fn log_config(&self) {
        log::info!("Coffee maker:");
        log::info!("  Update interval: {} ms", self.update_interval_ms);
        log::info!(
            "  Layout: v{} ({} bits)",
            COFFEE_MAKER_LAYOUT.version,
            COFFEE_MAKER_LAYOUT.width
        );
        log::info!("  Averaging window: {} strobes", self.averaging_window);
        log::info!("  Button press: {} strobes", self.button_press_strobes);
        match self.pins.resolve() {
            Ok(pins) => {
                for (role, pin) in pins.roles() {
                    log::info!(
                        "  {}: GPIO{}{}",
                        role,
                        pin.number,
                        if pin.inverted { " (inverted)" } else { "" }
                    );
                }
            }
            Err(e) => log::error!("  Pins: {}", e),
        }
        for flag in StatusFlag::ALL {
            if self.outputs.flag(flag) {
                log::info!("  Binary sensor: {}", flag.name());
            }
        }
        if self.outputs.coffee_quantity {
            log::info!("  Sensor: coffee_quantity");
        }
        if self.outputs.coffee_flavor {
            log::info!("  Sensor: coffee_flavor");
        }
        if self.outputs.enable {
            log::info!("  Switch: enable");
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PressureSensorConfig {
    /// 7-bit I2C address
    pub address: u8,
    pub update_interval_ms: u32,
    pub pressure_min: f32,
    pub pressure_max: f32,
    pub output_min: f32,
    pub output_max: f32,
    pub transfer: TransferMode,
    /// Whether the pressure reading gets a sink
    pub publish: bool,
}

impl Default for PressureSensorConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            pressure_min: 0.0,
            pressure_max: 300.0,
            output_min: 5.0,
            output_max: 95.0,
            transfer: TransferMode::default(),
            publish: true,
        }
    }
}

impl PressureSensorConfig {
    /// Calibration profile for the configured transfer mode
    pub fn profile(&self) -> Result<CalibrationProfile, ConfigError> {
        match self.transfer {
            TransferMode::Linear => CalibrationProfile::try_new(
                self.pressure_min,
                self.pressure_max,
                self.output_min,
                self.output_max,
            ),
            TransferMode::PercentOfFullScale => CalibrationProfile::from_percent_of_full_scale(
                self.pressure_min,
                self.pressure_max,
                self.output_min,
                self.output_max,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Reserved 7-bit ranges: 0x00-0x07 and 0x78-0x7F
        if !(0x08..=0x77).contains(&self.address) {
            return Err(ConfigError::InvalidAddress {
                address: self.address,
            });
        }
        if self.update_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                component: "pressure_sensor",
            });
        }
        self.profile().map(|_| ())
    }

    pub fn log_config(&self) {
        log::info!("Pressure sensor:");
        log::info!("  Address: 0x{:02X}", self.address);
        log::info!("  Update interval: {} ms", self.update_interval_ms);
        log::info!("  Transfer: {:?}", self.transfer);
        log::info!("  Pressure: {} .. {}", self.pressure_min, self.pressure_max);
        log::info!("  Output: {} .. {}", self.output_min, self.output_max);
        if self.publish {
            log::info!("  Sensor: pressure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> DeviceConfig {
        DeviceConfig {
            coffee_maker: Some(CoffeeMakerConfig::default()),
            pressure_sensor: Some(PressureSensorConfig::default()),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(full_config().validate(), Ok(()));
        assert_eq!(DeviceConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_blob_round_trip() {
        let mut config = full_config();
        if let Some(pressure) = config.pressure_sensor.as_mut() {
            pressure.transfer = TransferMode::PercentOfFullScale;
            pressure.address = 0x28;
        }
        let bytes = config.to_bytes().expect("encodes");
        assert_eq!(DeviceConfig::load(&bytes), Ok(config));
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let bytes = full_config().to_bytes().expect("encodes");
        assert!(matches!(
            DeviceConfig::from_bytes(&bytes[..bytes.len() / 2]),
            Err(ConfigError::Decode(_))
        ));
    }

    #[test]
    fn test_blob_with_invalid_pin_is_rejected() {
        let mut coffee_maker = CoffeeMakerConfig::default();
        coffee_maker.pins = PinAssignment::Raw(RawPins {
            clock: 4,
            data: 5,
            strobe: 49,
            zio: 6,
        });
        let config = DeviceConfig {
            coffee_maker: Some(coffee_maker),
            pressure_sensor: None,
        };
        let bytes = config.to_bytes().expect("encodes");
        assert_eq!(
            DeviceConfig::load(&bytes),
            Err(ConfigError::PinOutOfRange {
                role: "strobe",
                pin: 49,
                max: MAX_GPIO
            })
        );
    }

    #[test]
    fn test_duplicate_pin_is_rejected() {
        let pins = PinAssignment::Named(NamedPins {
            clock: GpioPin::new(4),
            data: GpioPin::new(5),
            strobe: GpioPin::new(6),
            buttons_a: GpioPin::new(7),
            buttons_b: GpioPin::inverted(5),
            button_onoff: GpioPin::new(16),
        });
        assert_eq!(
            pins.resolve(),
            Err(ConfigError::DuplicatePin {
                pin: 5,
                first: "data",
                second: "buttons_b"
            })
        );
    }

    #[test]
    fn test_raw_pins_resolve_without_matrix() {
        let pins = PinAssignment::Raw(RawPins {
            clock: 1,
            data: 2,
            strobe: 3,
            zio: 4,
        })
        .resolve()
        .expect("valid pins");
        assert!(!pins.has_button_matrix());
        assert_eq!(pins.button_onoff, GpioPin::new(4));
        assert_eq!(pins.roles().count(), 4);
    }

    #[test]
    fn test_pressure_sensor_validation() {
        let config = PressureSensorConfig {
            address: 0x80,
            ..PressureSensorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidAddress { address: 0x80 }));

        let config = PressureSensorConfig {
            update_interval_ms: 0,
            ..PressureSensorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                component: "pressure_sensor"
            })
        );

        let config = PressureSensorConfig {
            transfer: TransferMode::Linear,
            pressure_max: 0.0,
            ..PressureSensorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DegenerateCalibration { .. })
        ));
    }

    #[test]
    fn test_zero_averaging_window_is_rejected() {
        let config = CoffeeMakerConfig {
            averaging_window: 0,
            ..CoffeeMakerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroAveragingWindow));
    }

    #[test]
    fn test_zero_button_press_is_rejected() {
        let config = CoffeeMakerConfig {
            button_press_strobes: 0,
            ..CoffeeMakerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroButtonPress));
    }

    #[test]
    fn test_default_profile_maps_midpoint() {
        let config = PressureSensorConfig::default();
        assert_eq!(config.transfer, TransferMode::Linear);
        let profile = config.profile().expect("valid profile");
        assert_eq!(profile.calibrate(crate::calibration::RawCount(0)), 5.0);
        assert_eq!(profile.calibrate(crate::calibration::RawCount(150)), 50.0);
        assert_eq!(profile.calibrate(crate::calibration::RawCount(300)), 95.0);
    }

    #[test]
    fn test_percent_of_full_scale_is_opt_in() {
        let config = PressureSensorConfig {
            transfer: TransferMode::PercentOfFullScale,
            ..PressureSensorConfig::default()
        };
        let profile = config.profile().expect("valid profile");
        // 5 % of 2^24 counts reads as the bottom of the pressure range
        assert_eq!(profile.calibrate(crate::calibration::RawCount(838_861)), 0.0);
    }
}
