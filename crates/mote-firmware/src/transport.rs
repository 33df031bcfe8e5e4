//! MQTT-SN client on an embassy-net UDP socket

use core::net::SocketAddr;

use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack};
use embassy_time::{Duration, with_timeout};
use log::{debug, error, info, warn};
use mote_core::config::{NodeConfig, NodeName};
use mote_core::net::NodeAddresses;
use mote_core::relay::push::{QoS, TopicId};
use mote_core::relay::{PushTransport, PushTrigger, PushWorker, TransportError};
use mote_core::wire::mqttsn::{self, MqttSnError, Reply};

use crate::Relay;
use crate::hardware::GpioIndicator;

const FRAME_LEN: usize = 128;
const KEEP_ALIVE_SECS: u16 = 60;
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

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

pub struct UdpTransport<'s> {
    socket: UdpSocket<'s>,
    client_id: NodeName,
    gateway: Option<IpEndpoint>,
    next_msg_id: u16,
}

impl<'s> UdpTransport<'s> {
    /// `socket` must already be bound
    pub fn new(socket: UdpSocket<'s>, client_id: NodeName) -> Self {
        Self {
            socket,
            client_id,
            gateway: None,
            next_msg_id: 1,
        }
    }

    fn msg_id(&mut self) -> u16 {
        let id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.checked_add(1).unwrap_or(1);
        id
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let gateway = self.gateway.ok_or(TransportError::NotConnected)?;
        self.socket.send_to(frame, gateway).await.map_err(|e| {
            error!("MQTT-SN send failed: {:?}", e);
            TransportError::Io
        })
    }

    /// Wait for the first gateway reply accepted by `wanted`
    async fn await_reply(&mut self, wanted: impl Fn(&Reply) -> bool) -> Result<Reply, TransportError> {
        let gateway = self.gateway.ok_or(TransportError::NotConnected)?;
        let mut buf = [0u8; FRAME_LEN];
        loop {
            let (len, meta) = with_timeout(REPLY_TIMEOUT, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| {
                    error!("MQTT-SN receive failed: {:?}", e);
                    TransportError::Io
                })?;
            if meta.endpoint != gateway {
                debug!("Ignoring datagram from {}", meta.endpoint);
                continue;
            }
            let reply = mqttsn::decode(&buf[..len]).map_err(wire_error)?;
            if wanted(&reply) {
                return Ok(reply);
            }
            debug!("Ignoring unsolicited {:?}", reply);
        }
    }
}

impl PushTransport for UdpTransport<'_> {
    async fn connect(&mut self, broker: SocketAddr) -> Result<(), TransportError> {
        let SocketAddr::V4(v4) = broker else {
            error!("Broker {} is IPv6, the stack only speaks IPv4", broker);
            return Err(TransportError::ConnectFailed);
        };
        self.gateway = Some(IpEndpoint::new(IpAddress::Ipv4(*v4.ip()), v4.port()));

        let mut frame = [0u8; FRAME_LEN];
        let len = mqttsn::encode_connect(&self.client_id, KEEP_ALIVE_SECS, true, &mut frame)
            .map_err(wire_error)?;
        let mut result = self.send(&frame[..len]).await;
        if result.is_ok() {
            result = self
                .await_reply(|reply| *reply == Reply::ConnAck)
                .await
                .map(|_| ());
        }

        if let Err(e) = result {
            self.gateway = None;
            return Err(match e {
                TransportError::Timeout => TransportError::Timeout,
                _ => TransportError::ConnectFailed,
            });
        }
        Ok(())
    }

    async fn register_topic(&mut self, name: &str) -> Result<TopicId, TransportError> {
        let msg_id = self.msg_id();
        let mut frame = [0u8; FRAME_LEN];
        let len = mqttsn::encode_register(name, msg_id, &mut frame).map_err(wire_error)?;
        self.send(&frame[..len]).await?;

        match self
            .await_reply(|reply| matches!(reply, Reply::RegAck { msg_id: id, .. } if *id == msg_id))
            .await?
        {
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
        let mut frame = [0u8; FRAME_LEN];
        let len =
            mqttsn::encode_publish(topic, msg_id, qos, payload, &mut frame).map_err(wire_error)?;
        self.send(&frame[..len]).await?;

        if qos == QoS::AtLeastOnce {
            self.await_reply(|reply| matches!(reply, Reply::PubAck { msg_id: id, .. } if *id == msg_id))
                .await?;
        }
        Ok(())
    }
}

/// Publish on every push request, forever
#[embassy_executor::task]
pub async fn push_task(
    stack: Stack<'static>,
    relay: &'static Relay,
    trigger: &'static PushTrigger,
    config: NodeConfig,
) {
    let Some(broker) = config.broker else {
        info!("No broker configured, push disabled");
        return;
    };

    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; 2 * FRAME_LEN];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; 2 * FRAME_LEN];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    // Ephemeral local port
    if let Err(e) = socket.bind(0) {
        error!("Cannot bind MQTT-SN socket: {:?}", e);
        return;
    }

    stack.wait_config_up().await;

    let transport = UdpTransport::new(socket, config.client_id);
    let mut worker: PushWorker<'_, _, NodeAddresses, GpioIndicator> =
        PushWorker::new(transport, relay, trigger, broker, config.node_name)
            .with_qos(config.qos);
    worker.run().await
}
