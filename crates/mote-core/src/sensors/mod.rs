//! Sensor backends
//!
//! Every backend implements [`Sensor`] and reports readings already scaled by
//! [`SCALE`](crate::value::SCALE). Backends are chosen when the sampler is
//! constructed; metrics a device cannot measure are routed elsewhere with
//! [`WithFallback`].

mod fallback;
#[cfg(feature = "sensor-sht40")]
mod sht40;

pub use fallback::RandomSensor;
#[cfg(feature = "sensor-sht40")]
pub use sht40::SHT40Sensor;

use thiserror_no_std::Error;

use crate::metric::Metric;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} read failed during {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} timed out during {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor} does not measure {metric}")]
    Unsupported { sensor: &'static str, metric: Metric },
}

/// A source of raw readings.
pub trait Sensor {
    /// Prepare the device. Called once before the first reading.
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Take a fresh reading of `metric`, scaled by 100.
    fn read_raw(&mut self, metric: Metric) -> impl Future<Output = Result<i32, SensorError>>;

    /// Whether this backend measures `metric` at all
    fn supports(&self, metric: Metric) -> bool;
}

/// Route metrics the primary sensor cannot measure to a fallback.
///
/// A failed reading of a supported metric is *not* retried on the fallback;
/// the sampler's last-good handling covers transient faults.
pub struct WithFallback<P, F> {
    primary: P,
    fallback: F,
}

impl<P: Sensor, F: Sensor> WithFallback<P, F> {
    pub const fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: Sensor, F: Sensor> Sensor for WithFallback<P, F> {
    async fn init(&mut self) -> Result<(), SensorError> {
        self.primary.init().await?;
        self.fallback.init().await
    }

    async fn read_raw(&mut self, metric: Metric) -> Result<i32, SensorError> {
        if self.primary.supports(metric) {
            self.primary.read_raw(metric).await
        } else {
            self.fallback.read_raw(metric).await
        }
    }

    fn supports(&self, metric: Metric) -> bool {
        self.primary.supports(metric) || self.fallback.supports(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    /// Reports a fixed value for temperature only
    struct Thermometer(i32);

    impl Sensor for Thermometer {
        async fn init(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        async fn read_raw(&mut self, metric: Metric) -> Result<i32, SensorError> {
            match metric {
                Metric::Temperature => Ok(self.0),
                _ => Err(SensorError::Unsupported {
                    sensor: "thermometer",
                    metric,
                }),
            }
        }

        fn supports(&self, metric: Metric) -> bool {
            metric == Metric::Temperature
        }
    }

    #[test]
    fn test_with_fallback_routes_unsupported_metrics() {
        let mut sensor = WithFallback::new(Thermometer(2371), Thermometer(-1));
        assert!(sensor.supports(Metric::Temperature));
        assert!(!sensor.supports(Metric::Humidity));
        assert_eq!(block_on(sensor.read_raw(Metric::Temperature)), Ok(2371));

        let mut sensor = WithFallback::new(Thermometer(2371), RandomSensor::new(7));
        block_on(sensor.init()).unwrap();
        assert!(sensor.supports(Metric::AirQuality));
        let humidity = block_on(sensor.read_raw(Metric::Humidity)).unwrap();
        assert!(Metric::Humidity.fallback_range().contains(&humidity));
    }
}
