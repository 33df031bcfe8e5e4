//! CoAP server on an embassy-net UDP socket

use embassy_net::Stack;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use log::{error, info, warn};
use mote_core::config::MAX_PAYLOAD;
use mote_core::wire::coap::{self, MessageIds};

use crate::Relay;

const DATAGRAM_LEN: usize = MAX_PAYLOAD + 64;

/// Serve CoAP on `port`; NON responses are numbered from `first_message_id`
#[embassy_executor::task]
pub async fn coap_task(
    stack: Stack<'static>,
    relay: &'static Relay,
    port: u16,
    first_message_id: u16,
) {
    let mut ids = MessageIds::new(first_message_id);
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; 2 * DATAGRAM_LEN];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; 2 * DATAGRAM_LEN];
    let mut datagram = [0u8; DATAGRAM_LEN];
    let mut reply = [0u8; DATAGRAM_LEN];

    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    if let Err(e) = socket.bind(port) {
        error!("Cannot bind CoAP port {}: {:?}", port, e);
        return;
    }
    info!("CoAP server listening on port {}", port);

    loop {
        let (len, meta) = match socket.recv_from(&mut datagram).await {
            Ok(received) => received,
            Err(e) => {
                warn!("CoAP receive failed: {:?}", e);
                continue;
            }
        };

        match coap::serve_datagram(relay, &datagram[..len], &mut ids, &mut reply) {
            Ok(Some(reply_len)) => {
                if let Err(e) = socket.send_to(&reply[..reply_len], meta).await {
                    warn!("Cannot reply to {}: {:?}", meta.endpoint, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Dropping datagram from {}: {}", meta.endpoint, e),
        }
    }
}
