use rand_core::{RngCore, SeedableRng};
use rand_pcg::Pcg32;

use super::{Sensor, SensorError};
use crate::metric::Metric;

/// Pseudo-random stand-in for missing hardware.
///
/// Draws uniformly from each metric's
/// [`fallback_range`](Metric::fallback_range). Deterministic for a given seed.
pub struct RandomSensor {
    rng: Pcg32,
}

impl RandomSensor {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    fn draw(&mut self, metric: Metric) -> i32 {
        let range = metric.fallback_range();
        let (low, high) = (*range.start(), *range.end());
        let span = (i64::from(high) - i64::from(low) + 1) as u64;
        // Multiply-shift maps a u32 onto 0..span without a division
        let offset = (u64::from(self.rng.next_u32()) * span) >> 32;
        (i64::from(low) + offset as i64) as i32
    }
}

impl Sensor for RandomSensor {
    async fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn read_raw(&mut self, metric: Metric) -> Result<i32, SensorError> {
        Ok(self.draw(metric))
    }

    fn supports(&self, _metric: Metric) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_readings_stay_in_fallback_range() {
        let mut sensor = RandomSensor::new(0xC0FFEE);
        for metric in Metric::ALL {
            let range = metric.fallback_range();
            for _ in 0..500 {
                let value = block_on(sensor.read_raw(metric)).unwrap();
                assert!(range.contains(&value), "{metric}: {value}");
            }
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = RandomSensor::new(42);
        let mut b = RandomSensor::new(42);
        for _ in 0..10 {
            assert_eq!(
                block_on(a.read_raw(Metric::Temperature)),
                block_on(b.read_raw(Metric::Temperature))
            );
        }
    }
}
