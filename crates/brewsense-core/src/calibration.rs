//! Linear calibration from raw transducer counts to physical units
//!
//! A [`CalibrationProfile`] fixes a straight line through two points:
//! `(pressure_min, output_min)` and `(pressure_max, output_max)`. The
//! `pressure_*` fields are the raw endpoints and the `output_*` fields the
//! calibrated values at those endpoints. Results are deliberately not
//! clamped, so readings outside the nominal range remain visible.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of counts spanned by the MPRLS 24-bit output (2^24)
pub const COUNTS_FULL_SCALE: u32 = 1 << 24;

/// Largest value a 24-bit count can hold
pub const MAX_RAW_COUNT: u32 = COUNTS_FULL_SCALE - 1;

/// A raw 24-bit reading straight from the transducer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RawCount(pub u32);

impl RawCount {
    /// Assemble a count from the three big-endian data bytes of a reading
    pub const fn from_be_bytes(bytes: [u8; 3]) -> Self {
        Self(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
    }
}

/// How the four configured calibration floats are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferMode {
    /// The floats are the profile itself (raw endpoints and outputs)
    #[default]
    Linear,
    /// MPRLS datasheet transfer function: `output_min`/`output_max` are
    /// percentages of the 2^24 count range, `pressure_min`/`pressure_max`
    /// the physical pressure at those counts.
    PercentOfFullScale,
}

/// Four immutable floats fixing a linear transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub pressure_min: f32,
    pub pressure_max: f32,
    pub output_min: f32,
    pub output_max: f32,
}

impl CalibrationProfile {
    /// Create a profile without validation
    pub const fn new(pressure_min: f32, pressure_max: f32, output_min: f32, output_max: f32) -> Self {
        Self {
            pressure_min,
            pressure_max,
            output_min,
            output_max,
        }
    }

    /// Create a profile, rejecting non-finite values and an empty raw range
    pub fn try_new(
        pressure_min: f32,
        pressure_max: f32,
        output_min: f32,
        output_max: f32,
    ) -> Result<Self, ConfigError> {
        let profile = Self::new(pressure_min, pressure_max, output_min, output_max);
        profile.validate()?;
        Ok(profile)
    }

    /// Build the profile for the MPRLS transfer function
    ///
    /// `output_min_percent` and `output_max_percent` are converted to counts
    /// (rounded to the nearest count) and become the raw endpoints; the
    /// pressures become the calibrated outputs.
    pub fn from_percent_of_full_scale(
        pressure_min: f32,
        pressure_max: f32,
        output_min_percent: f32,
        output_max_percent: f32,
    ) -> Result<Self, ConfigError> {
        if !output_min_percent.is_finite() || !output_max_percent.is_finite() {
            return Err(ConfigError::NonFiniteCalibration);
        }
        Self::try_new(
            percent_to_counts(output_min_percent),
            percent_to_counts(output_max_percent),
            pressure_min,
            pressure_max,
        )
    }

    /// Check the invariants [`calibrate`](Self::calibrate) relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all_finite = self.pressure_min.is_finite()
            && self.pressure_max.is_finite()
            && self.output_min.is_finite()
            && self.output_max.is_finite();
        if !all_finite {
            return Err(ConfigError::NonFiniteCalibration);
        }
        if self.pressure_min == self.pressure_max {
            return Err(ConfigError::DegenerateCalibration {
                min: self.pressure_min,
                max: self.pressure_max,
            });
        }
        Ok(())
    }

    /// Map a raw count onto the calibrated output range
    ///
    /// Evaluated as an interpolation between the two output endpoints so the
    /// endpoints themselves map exactly.
    pub fn calibrate(&self, raw: RawCount) -> f32 {
        let t = (raw.0 as f32 - self.pressure_min) / (self.pressure_max - self.pressure_min);
        self.output_min * (1.0 - t) + self.output_max * t
    }
}

/// Free-function form of [`CalibrationProfile::calibrate`]
#[inline]
pub fn calibrate(raw: RawCount, profile: &CalibrationProfile) -> f32 {
    profile.calibrate(raw)
}

/// Convert a percentage of full scale to a whole number of counts
fn percent_to_counts(percent: f32) -> f32 {
    let counts = COUNTS_FULL_SCALE as f32 * (percent / 100.0) + 0.5;
    // Truncation after adding 0.5 rounds to the nearest count
    (counts as u32) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibrate_midpoint() {
        let profile = CalibrationProfile::new(0.0, 300.0, 5.0, 95.0);
        assert_eq!(calibrate(RawCount(150), &profile), 50.0);
    }

    #[test]
    fn test_calibrate_exact_at_endpoints() {
        let profiles = [
            CalibrationProfile::new(0.0, 300.0, 5.0, 95.0),
            CalibrationProfile::new(1_677_722.0, 15_099_494.0, 0.0, 25.0),
            CalibrationProfile::new(100.0, 7.0, 0.1, 0.3),
        ];
        for profile in profiles {
            let min = RawCount(profile.pressure_min as u32);
            let max = RawCount(profile.pressure_max as u32);
            assert_eq!(profile.calibrate(min), profile.output_min);
            assert_eq!(profile.calibrate(max), profile.output_max);
        }
    }

    #[test]
    fn test_calibrate_is_not_clamped() {
        let profile = CalibrationProfile::new(0.0, 300.0, 5.0, 95.0);
        assert!(profile.calibrate(RawCount(600)) > 95.0);
        assert_eq!(profile.calibrate(RawCount(600)), 185.0);
    }

    #[test]
    fn test_degenerate_profile_rejected() {
        assert_eq!(
            CalibrationProfile::try_new(10.0, 10.0, 0.0, 1.0),
            Err(ConfigError::DegenerateCalibration {
                min: 10.0,
                max: 10.0
            })
        );
        assert_eq!(
            CalibrationProfile::try_new(0.0, f32::NAN, 0.0, 1.0),
            Err(ConfigError::NonFiniteCalibration)
        );
    }

    #[test]
    fn test_percent_of_full_scale_profile() {
        let profile = CalibrationProfile::from_percent_of_full_scale(0.0, 25.0, 10.0, 90.0)
            .expect("valid transfer function");
        // 10 % and 90 % of 2^24, rounded
        assert_eq!(profile.pressure_min, 1_677_722.0);
        assert_eq!(profile.pressure_max, 15_099_494.0);
        assert_eq!(profile.calibrate(RawCount(1_677_722)), 0.0);
        assert_eq!(profile.calibrate(RawCount(15_099_494)), 25.0);
    }

    #[test]
    fn test_raw_count_from_bytes() {
        assert_eq!(RawCount::from_be_bytes([0x12, 0x34, 0x56]), RawCount(0x12_3456));
        assert_eq!(RawCount::from_be_bytes([0xFF, 0xFF, 0xFF]), RawCount(MAX_RAW_COUNT));
    }
}
