//! Periodic sampling loop
//!
//! One [`Sampler`] runs per node. Every interval it asks the sensor for a fresh
//! reading of each metric and appends it to that metric's buffer. Faulty
//! readings never reach the buffers: the metric's last good value is written
//! in their place so the window keeps advancing at a steady rate.

use embassy_time::{Duration, Timer};
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::aggregator::Aggregator;
use crate::app_state::Telemetry;
use crate::metric::{METRIC_COUNT, Metric};
use crate::sensors::{Sensor, SensorError};
use crate::storage::SAMPLE_WINDOW;
use crate::value::ScaledValue;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerError {
    #[error("Sensor bring-up failed: {0}")]
    SensorInit(SensorError),
}

pub struct Sampler<'a, S, const N: usize = SAMPLE_WINDOW> {
    sensor: S,
    telemetry: &'a Telemetry<N>,
    interval: Duration,
    last_good: [i32; METRIC_COUNT],
    passes: u32,
}

impl<'a, S: Sensor, const N: usize> Sampler<'a, S, N> {
    /// Initialize `sensor` and pre-fill every buffer with a first reading.
    ///
    /// A sensor that fails to initialize is a startup fault and no sampler is
    /// returned. A failed first reading only affects its own metric, whose
    /// buffer is seeded with [`Metric::seed_value`].
    pub async fn bring_up(
        mut sensor: S,
        telemetry: &'a Telemetry<N>,
        interval: Duration,
    ) -> Result<Self, SamplerError> {
        sensor.init().await.map_err(SamplerError::SensorInit)?;

        let mut last_good = [0; METRIC_COUNT];
        for metric in Metric::ALL {
            let seed = match Self::acquire(&mut sensor, metric).await {
                Some(value) => value,
                None => {
                    warn!("No initial {} reading, seeding buffer", metric);
                    metric.seed_value()
                }
            };
            telemetry.seed(metric, seed);
            last_good[metric.index()] = seed;
        }

        info!(
            "Sampler up: window of {} samples every {} ms",
            N,
            interval.as_millis()
        );

        Ok(Self {
            sensor,
            telemetry,
            interval,
            last_good,
            passes: 0,
        })
    }

    /// Read `metric`, rejecting failures and implausible values
    async fn acquire(sensor: &mut S, metric: Metric) -> Option<i32> {
        if !sensor.supports(metric) {
            return None;
        }
        match sensor.read_raw(metric).await {
            Ok(value) if metric.is_valid(value) => Some(value),
            Ok(value) => {
                warn!("Discarding out-of-range {} reading {}", metric, value);
                None
            }
            Err(e) => {
                warn!("Failed to read {}: {}", metric, e);
                None
            }
        }
    }

    /// Take one reading of every metric and append it to its buffer
    pub async fn sample_once(&mut self) {
        for metric in Metric::ALL {
            let slot = &mut self.last_good[metric.index()];
            if let Some(value) = Self::acquire(&mut self.sensor, metric).await {
                *slot = value;
            }
            self.telemetry.record(metric, *slot);
        }

        self.passes = self.passes.wrapping_add(1);
        debug!("Sampling pass {} complete", self.passes);

        if self.passes % N as u32 == 0 {
            let aggregator = Aggregator::new(self.telemetry);
            info!(
                "Window complete: temperature={} humidity={} airquality={}",
                aggregator.current_value(Metric::Temperature),
                aggregator.current_value(Metric::Humidity),
                aggregator.current_value(Metric::AirQuality),
            );
        }
    }

    /// Sample forever, one pass per interval.
    ///
    /// Missed intervals are not caught up.
    pub async fn run(&mut self) -> ! {
        loop {
            Timer::after(self.interval).await;
            self.sample_once().await;
        }
    }

    /// Value written for `metric` when the sensor misbehaves
    pub fn last_good(&self, metric: Metric) -> ScaledValue {
        ScaledValue::new(self.last_good[metric.index()])
    }

    /// Completed sampling passes since bring-up
    pub fn passes(&self) -> u32 {
        self.passes
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
