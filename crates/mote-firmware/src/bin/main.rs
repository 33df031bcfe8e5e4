#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};
use static_cell::StaticCell;

use mote_core::net::NodeAddresses;
use mote_core::relay::{PushRequest, PushTrigger, TelemetryRelay};
use mote_core::sensors::RandomSensor;
use mote_core::{Sampler, Telemetry};

use mote_firmware::hardware::{self, GpioIndicator};
use mote_firmware::{BringUpError, Relay, coap, config, network, transport};

#[cfg(feature = "sensor-sht40")]
type NodeSensor = mote_core::sensors::WithFallback<
    mote_core::sensors::SHT40Sensor<esp_hal::i2c::master::I2c<'static, esp_hal::Async>>,
    RandomSensor,
>;
#[cfg(not(feature = "sensor-sht40"))]
type NodeSensor = RandomSensor;

static TELEMETRY: Telemetry = Telemetry::new();
static ADDRESSES: NodeAddresses = NodeAddresses::new();
static TRIGGER: PushTrigger = PushTrigger::new();
static RELAY: StaticCell<Relay> = StaticCell::new();
static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<{ network::MAX_SOCKETS }>> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Spawn a task, logging instead of panicking when its pool is exhausted
macro_rules! spawn {
    ($spawner:expr, $task:expr) => {
        match $task {
            Ok(token) => $spawner.spawn(token),
            Err(e) => error!("Cannot spawn {}: {:?}", stringify!($task), e),
        }
    };
}

#[embassy_executor::task]
async fn sampler_task(mut sampler: Sampler<'static, NodeSensor>) -> ! {
    sampler.run().await
}

#[embassy_executor::task]
async fn ticker_task(trigger: &'static PushTrigger, every: Duration) -> ! {
    loop {
        Timer::after(every).await;
        trigger.request(PushRequest::Timer);
    }
}

/// Log a startup fault and idle forever
async fn halt(fault: BringUpError) -> ! {
    error!("Startup fault: {}", fault);
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let node = match config::node_config() {
        Ok(node) => node,
        Err(e) => halt(BringUpError::Config(e)).await,
    };

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());

    // Sensor and sampler
    let fallback = RandomSensor::new(seed);
    #[cfg(feature = "sensor-sht40")]
    let sensor: NodeSensor = {
        let bus = match hardware::create_i2c_bus(
            peripherals.I2C0,
            peripherals.GPIO2,
            peripherals.GPIO1,
        ) {
            Ok(bus) => bus,
            Err(e) => {
                error!("I2C: {:?}", e);
                halt(BringUpError::SensorBus).await
            }
        };
        mote_core::sensors::WithFallback::new(
            mote_core::sensors::SHT40Sensor::new(bus),
            fallback,
        )
    };
    #[cfg(not(feature = "sensor-sht40"))]
    let sensor: NodeSensor = fallback;

    let sampler = match Sampler::bring_up(sensor, &TELEMETRY, node.sample_interval).await {
        Ok(sampler) => sampler,
        Err(e) => halt(BringUpError::Sampler(e)).await,
    };

    // Actuator and relay
    let indicator = GpioIndicator::new(
        Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO6, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO7, Level::Low, OutputConfig::default()),
    );
    let relay: &'static Relay = RELAY.init(
        TelemetryRelay::new(&TELEMETRY, &ADDRESSES, indicator).with_map_style(node.map_style),
    );
    relay.register();

    // Wi-Fi and network stack
    let radio = match esp_radio::init() {
        Ok(radio) => RADIO.init(radio),
        Err(e) => {
            error!("Radio: {:?}", e);
            halt(BringUpError::Radio).await
        }
    };
    let (wifi_controller, interfaces) =
        match esp_radio::wifi::new(radio, peripherals.WIFI, Default::default()) {
            Ok(wifi) => wifi,
            Err(e) => {
                error!("Wi-Fi: {:?}", e);
                halt(BringUpError::Radio).await
            }
        };
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );

    spawn!(spawner, network::connection_task(wifi_controller));
    spawn!(spawner, network::net_task(runner));
    spawn!(spawner, network::address_task(stack, &ADDRESSES));

    spawn!(spawner, sampler_task(sampler));
    spawn!(spawner, coap::coap_task(stack, relay, node.coap_port, seed as u16));

    if node.broker.is_some() {
        let button = Input::new(peripherals.GPIO0, InputConfig::default().with_pull(Pull::Up));
        spawn!(spawner, hardware::button_task(button, &TRIGGER));
        if let Some(every) = node.push_interval {
            spawn!(spawner, ticker_task(&TRIGGER, every));
        }
    }
    spawn!(spawner, transport::push_task(stack, relay, &TRIGGER, node));

    info!("Node up");
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
