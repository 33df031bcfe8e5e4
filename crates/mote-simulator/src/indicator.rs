use log::info;
use mote_core::actuator::{Indicator, LedChannel, LedState};

/// Stand-in for the RGB status LED that logs every change
#[derive(Default)]
pub struct LoggingIndicator {
    state: LedState,
}

impl Indicator for LoggingIndicator {
    fn set_all(&mut self, on: bool) {
        self.state.set_all(on);
        info!("LED {}", if on { "ON" } else { "OFF" });
    }

    fn toggle(&mut self, channel: LedChannel) {
        self.state.toggle(channel);
        info!("LED TOGGLE {} -> {}", channel, self.state);
    }
}
