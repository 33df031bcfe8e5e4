//! Hardware-independent core library for mote-rs
//!
//! This crate contains the platform-agnostic logic of the telemetry node:
//! the per-metric sample buffers, the periodic sampler, the aggregator, and
//! the relay that turns aggregates into pull responses and push publications.
//! The CoAP and MQTT-SN framing used by the binaries lives in [`wire`].
//!
//! It is `#![no_std]` so it compiles on both embedded targets (ESP32-S3) and
//! desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

pub mod actuator;
pub mod aggregator;
pub mod app_state;
pub mod config;
pub mod metric;
pub mod net;
pub mod relay;
pub mod sampler;
pub mod sensors;
pub mod storage;
pub mod value;
pub mod wire;

pub use aggregator::Aggregator;
pub use app_state::Telemetry;
pub use metric::Metric;
pub use sampler::Sampler;
pub use storage::SampleBuffer;
pub use value::ScaledValue;
