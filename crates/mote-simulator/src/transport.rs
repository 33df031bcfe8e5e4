//! Push transports for the host
//!
//! Both transports do blocking socket I/O inside their futures; the simulator
//! runs the push worker on its own thread, so nothing else waits on them.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use log::{debug, error, info, warn};
use mote_core::config::NodeName;
use mote_core::relay::push::{QoS, TopicId};
use mote_core::relay::{PushTransport, TransportError};
use mote_core::wire::mqttsn::{self, MqttSnError, Reply};

/// Largest gateway frame we expect to receive
const RX_BUFFER: usize = 64;

/// Largest frame we send: a publish header plus the bounded payload
const TX_BUFFER: usize = 128;

const KEEP_ALIVE_SECS: u16 = 60;
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

fn io_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
        _ => {
            error!("MQTT-SN socket error: {}", e);
            TransportError::Io
        }
    }
}

fn wire_error(e: MqttSnError) -> TransportError {
    match e {
        MqttSnError::Rejected(code) => {
            warn!("Gateway rejected request: {:?}", code);
            TransportError::Rejected
        }
        other => {
            error!("MQTT-SN framing error: {}", other);
            TransportError::Protocol
        }
    }
}

/// MQTT-SN client over a UDP socket
pub struct MqttSnUdp {
    client_id: NodeName,
    socket: Option<UdpSocket>,
    next_msg_id: u16,
}

impl MqttSnUdp {
    pub fn new(client_id: NodeName) -> Self {
        Self {
            client_id,
            socket: None,
            next_msg_id: 1,
        }
    }

    fn msg_id(&mut self) -> u16 {
        let id = self.next_msg_id;
        // Message id 0 is reserved
        self.next_msg_id = self.next_msg_id.checked_add(1).unwrap_or(1);
        id
    }

    fn socket(&self) -> Result<&UdpSocket, TransportError> {
        self.socket.as_ref().ok_or(TransportError::NotConnected)
    }

    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        self.socket()?.send(frame).map_err(io_error)?;
        Ok(())
    }

    /// Wait for the first reply accepted by `wanted`, skipping unrelated ones
    fn await_reply(&self, wanted: impl Fn(&Reply) -> bool) -> Result<Reply, TransportError> {
        let socket = self.socket()?;
        let mut buf = [0u8; RX_BUFFER];
        loop {
            let len = socket.recv(&mut buf).map_err(io_error)?;
            let reply = mqttsn::decode(&buf[..len]).map_err(wire_error)?;
            if wanted(&reply) {
                return Ok(reply);
            }
            debug!("Ignoring unsolicited {:?}", reply);
        }
    }
}

impl PushTransport for MqttSnUdp {
    async fn connect(&mut self, broker: SocketAddr) -> Result<(), TransportError> {
        let local: SocketAddr = match broker {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).map_err(io_error)?;
        socket.set_read_timeout(Some(REPLY_TIMEOUT)).map_err(io_error)?;
        socket.connect(broker).map_err(io_error)?;
        self.socket = Some(socket);

        let mut frame = [0u8; TX_BUFFER];
        let len = mqttsn::encode_connect(&self.client_id, KEEP_ALIVE_SECS, true, &mut frame)
            .map_err(wire_error)?;
        let result = self
            .send(&frame[..len])
            .and_then(|()| self.await_reply(|reply| *reply == Reply::ConnAck));

        if let Err(e) = result {
            self.socket = None;
            return Err(match e {
                TransportError::Timeout => TransportError::Timeout,
                _ => TransportError::ConnectFailed,
            });
        }
        Ok(())
    }

    async fn register_topic(&mut self, name: &str) -> Result<TopicId, TransportError> {
        let msg_id = self.msg_id();
        let mut frame = [0u8; TX_BUFFER];
        let len = mqttsn::encode_register(name, msg_id, &mut frame).map_err(wire_error)?;
        self.send(&frame[..len])?;

        match self.await_reply(|reply| {
            matches!(reply, Reply::RegAck { msg_id: id, .. } if *id == msg_id)
        })? {
            Reply::RegAck { topic_id, .. } => Ok(topic_id),
            _ => Err(TransportError::Protocol),
        }
    }

    async fn publish(
        &mut self,
        topic: TopicId,
        payload: &[u8],
        qos: QoS,
    ) -> Result<(), TransportError> {
        let msg_id = self.msg_id();
        let mut frame = [0u8; TX_BUFFER];
        let len =
            mqttsn::encode_publish(topic, msg_id, qos, payload, &mut frame).map_err(wire_error)?;
        self.send(&frame[..len])?;

        if qos == QoS::AtLeastOnce {
            self.await_reply(|reply| {
                matches!(reply, Reply::PubAck { msg_id: id, .. } if *id == msg_id)
            })?;
        }
        Ok(())
    }
}

/// Transport used when no broker is configured: publications are only logged
#[derive(Default)]
pub struct LogTransport {
    topics: Vec<String>,
}

impl PushTransport for LogTransport {
    async fn connect(&mut self, _broker: SocketAddr) -> Result<(), TransportError> {
        info!("No broker configured, publications are logged only");
        self.topics.clear();
        Ok(())
    }

    async fn register_topic(&mut self, name: &str) -> Result<TopicId, TransportError> {
        self.topics.push(name.to_owned());
        TopicId::try_from(self.topics.len()).map_err(|_| TransportError::Rejected)
    }

    async fn publish(
        &mut self,
        topic: TopicId,
        payload: &[u8],
        _qos: QoS,
    ) -> Result<(), TransportError> {
        let name = usize::from(topic)
            .checked_sub(1)
            .and_then(|i| self.topics.get(i))
            .ok_or(TransportError::Rejected)?;
        info!("PUBLISH {} {}", name, String::from_utf8_lossy(payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocker::block_on;
    use std::thread;

    /// Answers CONNECT, REGISTER and QoS 1 PUBLISH like a gateway would
    fn fake_gateway(socket: UdpSocket, frames: usize) -> Vec<Vec<u8>> {
        let mut seen = Vec::new();
        let mut buf = [0u8; 256];
        for _ in 0..frames {
            let (len, peer) = socket.recv_from(&mut buf).unwrap();
            let frame = buf[..len].to_vec();
            let reply: Vec<u8> = match frame[1] {
                mqttsn::msg_type::CONNECT => vec![3, mqttsn::msg_type::CONNACK, 0],
                mqttsn::msg_type::REGISTER => {
                    vec![7, mqttsn::msg_type::REGACK, 0, 9, frame[4], frame[5], 0]
                }
                mqttsn::msg_type::PUBLISH if frame[2] & 0x20 != 0 => {
                    vec![7, mqttsn::msg_type::PUBACK, frame[3], frame[4], frame[5], frame[6], 0]
                }
                _ => Vec::new(),
            };
            if !reply.is_empty() {
                socket.send_to(&reply, peer).unwrap();
            }
            seen.push(frame);
        }
        seen
    }

    #[test]
    fn test_session_against_fake_gateway() {
        let gateway = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let broker = gateway.local_addr().unwrap();
        let handle = thread::spawn(move || fake_gateway(gateway, 4));

        let mut transport = MqttSnUdp::new(NodeName::try_from("mote").unwrap());
        block_on(transport.connect(broker)).unwrap();
        let topic = block_on(transport.register_topic("mote/climate")).unwrap();
        assert_eq!(topic, 9);
        block_on(transport.publish(topic, b"{}", QoS::AtMostOnce)).unwrap();
        block_on(transport.publish(topic, b"{}", QoS::AtLeastOnce)).unwrap();

        let frames = handle.join().unwrap();
        assert_eq!(frames[0][1], mqttsn::msg_type::CONNECT);
        assert_eq!(&frames[1][6..], b"mote/climate");
        assert_eq!(&frames[2][7..], b"{}");
    }

    #[test]
    fn test_publish_without_session() {
        let mut transport = MqttSnUdp::new(NodeName::try_from("mote").unwrap());
        assert_eq!(
            block_on(transport.publish(1, b"{}", QoS::AtMostOnce)),
            Err(TransportError::NotConnected)
        );
    }

    #[test]
    fn test_log_transport_assigns_ids() {
        let mut transport = LogTransport::default();
        let broker = SocketAddr::from((Ipv6Addr::LOCALHOST, 1883));
        block_on(transport.connect(broker)).unwrap();
        assert_eq!(block_on(transport.register_topic("mote/info")), Ok(1));
        assert_eq!(block_on(transport.register_topic("mote/climate")), Ok(2));
        assert!(block_on(transport.publish(2, b"{}", QoS::AtMostOnce)).is_ok());
        assert_eq!(
            block_on(transport.publish(7, b"{}", QoS::AtMostOnce)),
            Err(TransportError::Rejected)
        );
    }
}
