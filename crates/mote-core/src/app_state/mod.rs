//! Shared telemetry state of a node

use crate::metric::{METRIC_COUNT, Metric};
use crate::storage::{SAMPLE_WINDOW, SampleBuffer};

/// Telemetry context
///
/// Owns one [`SampleBuffer`] per [`Metric`]. The sampler writes into it and the
/// relay reads from it; both borrow it for their whole lifetime, so binaries
/// typically place it in a `static` or a `StaticCell`.
pub struct Telemetry<const N: usize = SAMPLE_WINDOW> {
    buffers: [SampleBuffer<N>; METRIC_COUNT],
}

impl<const N: usize> Telemetry<N> {
    /// Create a context whose buffers hold each metric's seed value
    pub const fn new() -> Self {
        Self {
            buffers: [
                SampleBuffer::new(Metric::Temperature.seed_value()),
                SampleBuffer::new(Metric::Humidity.seed_value()),
                SampleBuffer::new(Metric::AirQuality.seed_value()),
            ],
        }
    }

    /// Buffer owned by `metric`
    pub fn buffer(&self, metric: Metric) -> &SampleBuffer<N> {
        &self.buffers[metric.index()]
    }

    /// Pre-fill every slot of `metric`'s buffer with `value`
    pub fn seed(&self, metric: Metric, value: i32) {
        self.buffer(metric).fill(value);
    }

    /// Record a new raw sample for `metric`
    pub fn record(&self, metric: Metric, value: i32) {
        self.buffer(metric).write(value);
    }
}

impl<const N: usize> Default for Telemetry<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_do_not_share_buffers() {
        let telemetry = Telemetry::<3>::new();
        telemetry.seed(Metric::Temperature, 2000);
        telemetry.record(Metric::Humidity, 4500);

        assert_eq!(telemetry.buffer(Metric::Temperature).snapshot(), [2000; 3]);
        assert_eq!(telemetry.buffer(Metric::Humidity).snapshot(), [0, 0, 4500]);
        assert_eq!(telemetry.buffer(Metric::AirQuality).snapshot(), [0; 3]);
    }

    #[test]
    fn test_const_construction() {
        static TELEMETRY: Telemetry = Telemetry::new();
        TELEMETRY.record(Metric::AirQuality, 120);
        assert_eq!(TELEMETRY.buffer(Metric::AirQuality).writes(), 1);
        assert_eq!(TELEMETRY.buffer(Metric::AirQuality).capacity(), SAMPLE_WINDOW);
    }
}
