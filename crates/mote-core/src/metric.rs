//! Metrics tracked by the node
//!
//! The set of metrics is fixed at build time. Every metric owns exactly one
//! sample buffer inside [`Telemetry`](crate::Telemetry), addressed by
//! [`Metric::index`].

use core::fmt;
use core::ops::RangeInclusive;

/// Number of metrics tracked by the node
pub const METRIC_COUNT: usize = 3;

/// A physical quantity sampled by the node.
///
/// All values are fixed-point integers scaled by [`SCALE`](crate::value::SCALE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Temperature in degrees Celsius × 100
    Temperature,
    /// Relative humidity in percent × 100
    Humidity,
    /// Air quality in percent × 100
    AirQuality,
}

impl Metric {
    /// All metrics in buffer order
    pub const ALL: [Metric; METRIC_COUNT] =
        [Metric::Temperature, Metric::Humidity, Metric::AirQuality];

    /// Index of this metric's buffer in the telemetry context
    pub const fn index(self) -> usize {
        match self {
            Self::Temperature => 0,
            Self::Humidity => 1,
            Self::AirQuality => 2,
        }
    }

    /// Stable lowercase name, used for resource paths and topic suffixes
    pub const fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::AirQuality => "airquality",
        }
    }

    /// Unit string reported in structured payloads
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "C",
            Self::Humidity | Self::AirQuality => "%",
        }
    }

    /// Range of plausible scaled readings.
    ///
    /// Readings outside of it are treated as sensor faults by the sampler.
    pub const fn valid_range(self) -> RangeInclusive<i32> {
        match self {
            // -40 °C to 125 °C covers the operating range of common I2C sensors
            Self::Temperature => -4000..=12500,
            Self::Humidity | Self::AirQuality => 0..=10000,
        }
    }

    /// Range the pseudo-random fallback generator draws from
    pub const fn fallback_range(self) -> RangeInclusive<i32> {
        match self {
            Self::Temperature => 0..=5000,
            Self::Humidity | Self::AirQuality => 0..=10000,
        }
    }

    /// Value a buffer is seeded with when no initial reading is available
    pub const fn seed_value(self) -> i32 {
        0
    }

    /// Look up a metric by its [`name`](Self::name)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Check whether a scaled reading lies inside [`valid_range`](Self::valid_range)
    pub fn is_valid(self, value: i32) -> bool {
        self.valid_range().contains(&value)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_match_all_order() {
        for (i, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), i);
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Metric::from_name("humidity"), Some(Metric::Humidity));
        assert_eq!(Metric::from_name("airquality"), Some(Metric::AirQuality));
        assert_eq!(Metric::from_name("pressure"), None);
    }

    #[test]
    fn test_fallback_range_is_valid() {
        for metric in Metric::ALL {
            let range = metric.fallback_range();
            assert!(metric.is_valid(*range.start()));
            assert!(metric.is_valid(*range.end()));
        }
    }
}
