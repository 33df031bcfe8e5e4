//! On-demand reduction of sample buffers

use crate::app_state::Telemetry;
use crate::metric::Metric;
use crate::storage::SAMPLE_WINDOW;
use crate::value::ScaledValue;

/// Temperature and humidity aggregates read back to back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Climate {
    pub temperature: ScaledValue,
    pub humidity: ScaledValue,
}

/// Stateless view over a [`Telemetry`] context.
///
/// Nothing is cached: every call recomputes the mean from the buffer, so pull
/// and push paths always see the same value for the same buffer state.
pub struct Aggregator<'a, const N: usize = SAMPLE_WINDOW> {
    telemetry: &'a Telemetry<N>,
}

// Manual impls, derive would require `Telemetry<N>: Clone`
impl<const N: usize> Clone for Aggregator<'_, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<const N: usize> Copy for Aggregator<'_, N> {}

impl<'a, const N: usize> Aggregator<'a, N> {
    pub const fn new(telemetry: &'a Telemetry<N>) -> Self {
        Self { telemetry }
    }

    /// Mean of the current window of `metric`
    pub fn current_value(&self, metric: Metric) -> ScaledValue {
        self.telemetry.buffer(metric).snapshot_and_average()
    }

    pub fn climate(&self) -> Climate {
        Climate {
            temperature: self.current_value(Metric::Temperature),
            humidity: self.current_value(Metric::Humidity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_value_tracks_writes() {
        let telemetry = Telemetry::<6>::new();
        let aggregator = Aggregator::new(&telemetry);

        telemetry.seed(Metric::Temperature, 100);
        assert_eq!(aggregator.current_value(Metric::Temperature).raw(), 100);

        for value in [100, 101, 100, 101, 100, 101] {
            telemetry.record(Metric::Temperature, value);
        }
        assert_eq!(aggregator.current_value(Metric::Temperature).raw(), 100);

        for _ in 0..6 {
            telemetry.record(Metric::Temperature, 2371);
        }
        assert_eq!(aggregator.current_value(Metric::Temperature).raw(), 2371);
    }

    #[test]
    fn test_climate() {
        let telemetry = Telemetry::<2>::new();
        telemetry.seed(Metric::Temperature, 2150);
        telemetry.seed(Metric::Humidity, 4012);
        telemetry.seed(Metric::AirQuality, 9000);

        let climate = Aggregator::new(&telemetry).climate();
        assert_eq!(climate.temperature.raw(), 2150);
        assert_eq!(climate.humidity.raw(), 4012);
    }
}
