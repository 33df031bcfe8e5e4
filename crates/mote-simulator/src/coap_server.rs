//! CoAP server on a host UDP socket
//!
//! Answers one datagram at a time on the calling thread.

use std::net::UdpSocket;

use log::{error, info, warn};
use mote_core::actuator::Indicator;
use mote_core::config::MAX_PAYLOAD;
use mote_core::net::AddressSource;
use mote_core::relay::TelemetryRelay;
use mote_core::wire::coap::{self, MessageIds};

/// Datagram buffer: header, token and options on top of the largest payload
const DATAGRAM_LEN: usize = MAX_PAYLOAD + 64;

/// Serve CoAP requests on `socket` until it fails
pub fn serve<A, I>(socket: &UdpSocket, relay: &TelemetryRelay<'_, A, I>, mut ids: MessageIds)
where
    A: AddressSource,
    I: Indicator,
{
    if let Ok(local) = socket.local_addr() {
        info!("CoAP server listening on {}", local);
    }

    let mut datagram = [0u8; DATAGRAM_LEN];
    let mut reply = [0u8; DATAGRAM_LEN];
    loop {
        let (len, peer) = match socket.recv_from(&mut datagram) {
            Ok(received) => received,
            Err(e) => {
                error!("CoAP socket failed: {}", e);
                return;
            }
        };

        match coap::serve_datagram(relay, &datagram[..len], &mut ids, &mut reply) {
            Ok(Some(reply_len)) => {
                if let Err(e) = socket.send_to(&reply[..reply_len], peer) {
                    warn!("Cannot reply to {}: {}", peer, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Dropping datagram from {}: {}", peer, e),
        }
    }
}
