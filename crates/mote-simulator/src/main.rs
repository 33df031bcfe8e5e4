//! Host simulator for the mote-rs telemetry node.
//!
//! Runs the same core as the firmware on std threads: a random sensor feeds
//! the sample buffers, a CoAP server answers pull requests on UDP, and a push
//! worker publishes to an MQTT-SN gateway (or just logs when none is set).
//! Configuration comes from `MOTE_*` environment variables, optionally loaded
//! from a `.env` file.
//!
//! Operator commands are read from stdin, see [`shell`] for the list.

mod blocker;
mod coap_server;
mod indicator;
mod shell;
mod transport;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::process;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};

use mote_core::config::{MQTTSN_PORT, NodeConfig};
use mote_core::net::{NodeAddresses, is_global_candidate};
use mote_core::relay::{PushRequest, PushTransport, PushTrigger, PushWorker, TelemetryRelay};
use mote_core::sensors::{RandomSensor, Sensor};
use mote_core::{Sampler, Telemetry};
use mote_core::wire::coap::MessageIds;

use indicator::LoggingIndicator;
use shell::Shell;
use transport::{LogTransport, MqttSnUdp};

type Relay<'a> = TelemetryRelay<'a, NodeAddresses, LoggingIndicator>;

// ---------------------------------------------------------------------------
// Network bring-up
// ---------------------------------------------------------------------------

/// Targets used only to ask the OS which source address it would pick
const PROBE_TARGETS: [SocketAddr; 2] = [
    SocketAddr::new(
        IpAddr::V6(Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 1)),
        MQTTSN_PORT,
    ),
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), MQTTSN_PORT),
];

/// Source addresses the host would use for outbound traffic. Connecting a UDP
/// socket sends nothing, it only resolves the route.
fn discover_addresses(broker: Option<SocketAddr>) -> Vec<IpAddr> {
    let mut found = Vec::new();
    for target in broker.into_iter().chain(PROBE_TARGETS) {
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let probed = UdpSocket::bind(local)
            .and_then(|socket| socket.connect(target).map(|()| socket))
            .and_then(|socket| socket.local_addr());
        match probed {
            Ok(addr) if is_global_candidate(&addr.ip()) && !found.contains(&addr.ip()) => {
                found.push(addr.ip());
            }
            Ok(addr) => debug!("Skipping source address {}", addr.ip()),
            Err(e) => debug!("No route towards {}: {}", target, e),
        }
    }
    found
}

fn bind_coap(port: u16) -> std::io::Result<UdpSocket> {
    UdpSocket::bind((Ipv6Addr::UNSPECIFIED, port))
        .or_else(|_| UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)))
}

// ---------------------------------------------------------------------------
// Worker threads
// ---------------------------------------------------------------------------

fn run_sampler<S: Sensor>(mut sampler: Sampler<'_, S>) {
    blocker::block_on(sampler.run())
}

fn run_push<T: PushTransport>(mut worker: PushWorker<'_, T, NodeAddresses, LoggingIndicator>) {
    blocker::block_on(worker.run())
}

fn periodic_push(trigger: &PushTrigger, every: Duration) {
    loop {
        thread::sleep(every);
        trigger.request(PushRequest::Timer);
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0x5EED)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    // Before the logger so RUST_LOG may come from .env
    let dotenv = dotenvy::dotenv();
    env_logger::init();
    if let Err(e) = dotenv {
        debug!("No .env loaded: {}", e);
    }
    info!("Starting mote-rs simulator");

    let config = match NodeConfig::from_lookup(|key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(2);
        }
    };
    info!(
        "Node '{}', sampling every {} s, CoAP on port {}",
        config.node_name,
        config.sample_interval.as_secs(),
        config.coap_port
    );

    let telemetry: Telemetry = Telemetry::new();
    let addresses = NodeAddresses::new();
    let trigger = PushTrigger::new();

    let found = discover_addresses(config.broker);
    if found.is_empty() {
        warn!("No global address found, info will be empty");
    } else {
        info!("Node addresses: {:?}", found);
    }
    addresses.set(&found);

    let sensor = RandomSensor::new(time_seed());
    let sampler =
        match blocker::block_on(Sampler::bring_up(sensor, &telemetry, config.sample_interval)) {
            Ok(sampler) => sampler,
            Err(e) => {
                error!("Startup fault: {}", e);
                process::exit(1);
            }
        };

    let relay: Relay<'_> = TelemetryRelay::new(&telemetry, &addresses, LoggingIndicator::default())
        .with_map_style(config.map_style);
    relay.register();

    let coap_socket = match bind_coap(config.coap_port) {
        Ok(socket) => socket,
        Err(e) => {
            error!("Cannot bind CoAP port {}: {}", config.coap_port, e);
            process::exit(1);
        }
    };

    let relay = &relay;
    let trigger = &trigger;
    let telemetry = &telemetry;

    thread::scope(|scope| {
        scope.spawn(move || run_sampler(sampler));

        let ids = MessageIds::new(time_seed() as u16);
        scope.spawn(|| coap_server::serve(&coap_socket, relay, ids));

        match config.broker {
            Some(broker) => {
                let transport = MqttSnUdp::new(config.client_id.clone());
                let worker =
                    PushWorker::new(transport, relay, trigger, broker, config.node_name.clone())
                        .with_qos(config.qos);
                scope.spawn(move || run_push(worker));
            }
            None => {
                let placeholder = SocketAddr::from((Ipv6Addr::LOCALHOST, MQTTSN_PORT));
                let worker = PushWorker::new(
                    LogTransport::default(),
                    relay,
                    trigger,
                    placeholder,
                    config.node_name.clone(),
                );
                scope.spawn(move || run_push(worker));
            }
        }

        if let Some(every) = config.push_interval {
            let every = Duration::from_millis(every.as_millis());
            scope.spawn(move || periodic_push(trigger, every));
        }

        scope.spawn(move || Shell::new(relay, telemetry, trigger).run());
    });
}
