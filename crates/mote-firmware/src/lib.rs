//! ESP32-S3 firmware-specific modules for mote-rs
//!
//! This crate contains the hardware-bound half of the node: Wi-Fi and
//! embassy-net bring-up, the GPIO LED driver, the button, and the CoAP and
//! MQTT-SN endpoints running on embassy-net UDP sockets. Everything they serve
//! comes from `mote_core`.

#![no_std]

pub mod coap;
pub mod config;
pub mod hardware;
pub mod network;
pub mod transport;

use mote_core::config::ConfigError;
use mote_core::net::NodeAddresses;
use mote_core::relay::TelemetryRelay;
use mote_core::sampler::SamplerError;
use thiserror_no_std::Error;

/// The relay as wired on the board
pub type Relay = TelemetryRelay<'static, NodeAddresses, hardware::GpioIndicator>;

/// Faults that stop the node before it starts serving
#[derive(Error, Debug)]
pub enum BringUpError {
    #[error("Invalid configuration: {0}")]
    Config(ConfigError),
    #[error("Sensor bus configuration rejected")]
    SensorBus,
    #[error("{0}")]
    Sampler(SamplerError),
    #[error("Radio initialization failed")]
    Radio,
}
