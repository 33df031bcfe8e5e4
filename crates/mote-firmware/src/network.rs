//! Wi-Fi station bring-up and embassy-net plumbing

use core::net::IpAddr;

use embassy_net::{Runner, Stack};
use embassy_time::{Duration, Timer};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState};
use log::{debug, error, info, warn};
use mote_core::net::NodeAddresses;

use crate::config::{WIFI_PASSWORD, WIFI_SSID};

/// Sockets in use: the CoAP server and the MQTT-SN client, plus DHCP
pub const MAX_SOCKETS: usize = 3;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Keep the station associated, reconnecting after every drop
#[embassy_executor::task]
pub async fn connection_task(mut controller: WifiController<'static>) {
    if WIFI_SSID.is_empty() {
        error!("No WIFI_SSID baked in, staying offline");
        return;
    }

    loop {
        if matches!(esp_radio::wifi::sta_state(), WifiStaState::Connected) {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("Wi-Fi disconnected");
            Timer::after(RECONNECT_DELAY).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let client = ClientConfig::default()
                .with_ssid(WIFI_SSID.into())
                .with_password(WIFI_PASSWORD.into());
            if let Err(e) = controller.set_config(&ModeConfig::Client(client)) {
                error!("Rejected Wi-Fi configuration: {:?}", e);
                return;
            }
            debug!("Starting Wi-Fi");
            if let Err(e) = controller.start_async().await {
                error!("Wi-Fi start failed: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
        }

        info!("Connecting to '{}'", WIFI_SSID);
        match controller.connect_async().await {
            Ok(()) => info!("Wi-Fi connected"),
            Err(e) => {
                warn!("Wi-Fi connect failed: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
            }
        }
    }
}

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

/// Mirror the stack's DHCP lease into `addresses`
#[embassy_executor::task]
pub async fn address_task(stack: Stack<'static>, addresses: &'static NodeAddresses) -> ! {
    loop {
        stack.wait_config_up().await;
        match stack.config_v4() {
            Some(config) => {
                let address = config.address.address();
                info!("Got address {}", address);
                addresses.set(&[IpAddr::V4(address)]);
            }
            None => warn!("Network up without an IPv4 configuration"),
        }

        stack.wait_config_down().await;
        warn!("Lost network configuration");
        addresses.clear();
    }
}
