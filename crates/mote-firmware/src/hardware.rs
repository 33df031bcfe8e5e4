//! Board peripherals: sensor bus, status LED and push button
//!
//! Pin assignment (M5Stack CoreS3 port A for the sensor, breakout LEDs):
//!
//! | Function   | GPIO |
//! |------------|------|
//! | I2C SDA    | 2    |
//! | I2C SCL    | 1    |
//! | LED red    | 5    |
//! | LED green  | 6    |
//! | LED blue   | 7    |
//! | Button     | 0    |

use embassy_time::{Duration, Timer};
use esp_hal::gpio::{Input, Level, Output};
use esp_hal::i2c::master::{Config as I2cConfig, ConfigError, I2c};
use esp_hal::time::Rate;
use log::info;
use mote_core::actuator::{Indicator, LedChannel, LedState};
use mote_core::relay::{PushRequest, PushTrigger};

/// Presses shorter than this are contact bounce
const DEBOUNCE: Duration = Duration::from_millis(50);

/// Initialize the sensor I2C bus (100 kHz)
pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO2<'static>,
    scl: esp_hal::peripherals::GPIO1<'static>,
) -> Result<I2c<'static, esp_hal::Async>, ConfigError> {
    let bus = I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(100)))?;
    Ok(bus.with_sda(sda).with_scl(scl).into_async())
}

/// RGB status LED on three GPIO outputs, active high
pub struct GpioIndicator {
    pins: [Output<'static>; 3],
    state: LedState,
}

impl GpioIndicator {
    /// Pins in red, green, blue order. All channels start off.
    pub fn new(red: Output<'static>, green: Output<'static>, blue: Output<'static>) -> Self {
        let mut indicator = Self {
            pins: [red, green, blue],
            state: LedState::new(),
        };
        indicator.apply();
        indicator
    }

    fn apply(&mut self) {
        for channel in LedChannel::ALL {
            let level = Level::from(self.state.is_on(channel));
            self.pins[channel.index()].set_level(level);
        }
    }
}

impl Indicator for GpioIndicator {
    fn set_all(&mut self, on: bool) {
        self.state.set_all(on);
        self.apply();
    }

    fn toggle(&mut self, channel: LedChannel) {
        self.state.toggle(channel);
        self.apply();
    }
}

/// Request a push cycle on every button press
#[embassy_executor::task]
pub async fn button_task(mut button: Input<'static>, trigger: &'static PushTrigger) {
    info!("Push button armed");
    loop {
        button.wait_for_falling_edge().await;
        Timer::after(DEBOUNCE).await;
        if button.is_low() && trigger.request(PushRequest::Button) {
            info!("Button pressed, push requested");
        }
        button.wait_for_high().await;
    }
}
