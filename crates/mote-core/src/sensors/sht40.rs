use embedded_hal_async::i2c::I2c;
use log::{error, info};
use sht4x::Sht4xAsync;

use super::{Sensor, SensorError};
use crate::metric::Metric;

/// Sensirion SHT40 temperature and humidity sensor.
///
/// One measurement yields both quantities; the humidity half is kept until the
/// next humidity read so a sampling pass costs a single I2C measurement.
pub struct SHT40Sensor<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
    pending_humidity: Option<i32>,
}

impl<I: I2c> SHT40Sensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
            pending_humidity: None,
        }
    }

    /// Returns `(temperature, humidity)` scaled by 100
    async fn measure(&mut self, precision: sht4x::Precision) -> Result<(i32, i32), SensorError> {
        let measurement = self
            .sensor
            .measure(precision, &mut embassy_time::Delay)
            .await
            .map_err(|e| {
                error!("SHT40 measurement failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "SHT40",
                    operation: "measure temperature/humidity",
                    details: "I2C communication error or sensor not responding",
                }
            })?;

        let temperature = (measurement.temperature_celsius().to_num::<f32>() * 100.0) as i32;
        let humidity = (measurement.humidity_percent().to_num::<f32>() * 100.0) as i32;
        Ok((temperature, humidity))
    }
}

impl<I: I2c> Sensor for SHT40Sensor<I> {
    async fn init(&mut self) -> Result<(), SensorError> {
        // A throwaway low precision measurement proves the device answers
        self.measure(sht4x::Precision::Low).await.map_err(|_| {
            SensorError::InitializationFailed {
                sensor: "SHT40",
                details: "Sensor did not answer the probe measurement",
            }
        })?;
        info!("SHT40: probe measurement succeeded");
        Ok(())
    }

    async fn read_raw(&mut self, metric: Metric) -> Result<i32, SensorError> {
        match metric {
            Metric::Temperature => {
                let (temperature, humidity) = self.measure(sht4x::Precision::High).await?;
                self.pending_humidity = Some(humidity);
                Ok(temperature)
            }
            Metric::Humidity => match self.pending_humidity.take() {
                Some(humidity) => Ok(humidity),
                None => Ok(self.measure(sht4x::Precision::High).await?.1),
            },
            Metric::AirQuality => Err(SensorError::Unsupported {
                sensor: "SHT40",
                metric,
            }),
        }
    }

    fn supports(&self, metric: Metric) -> bool {
        matches!(metric, Metric::Temperature | Metric::Humidity)
    }
}
