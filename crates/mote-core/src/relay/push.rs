//! Publish path
//!
//! Triggers (button interrupts, timers, the shell) only enqueue a
//! [`PushRequest`]. A single [`PushWorker`] task drains the queue and performs
//! the actual publishing over a [`PushTransport`], so slow or failing network
//! I/O never blocks the code that asked for a push.

use core::fmt::Write;
use core::net::SocketAddr;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use super::{RelayError, RelayState, TelemetryRelay};
use crate::actuator::Indicator;
use crate::config::{MAX_NAME_LEN, MAX_PUBLISH_PAYLOAD, NodeName};
use crate::metric::Metric;
use crate::net::AddressSource;
use crate::storage::SAMPLE_WINDOW;

/// Pending push requests; further requests are dropped while it is full
pub const PUSH_QUEUE_DEPTH: usize = 4;

/// Longest topic name: node name, separator and the longest suffix
pub const MAX_TOPIC_LEN: usize = MAX_NAME_LEN + 1 + 11;

/// Gateway-assigned topic identifier
pub type TopicId = u16;

pub type TopicName = heapless::String<MAX_TOPIC_LEN>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("No session with the broker")]
    NotConnected,
    #[error("Connection to the broker failed")]
    ConnectFailed,
    #[error("Broker rejected the request")]
    Rejected,
    #[error("Broker did not answer in time")]
    Timeout,
    #[error("Socket I/O failed")]
    Io,
    #[error("Malformed reply from the broker")]
    Protocol,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    #[error("Encoding failed: {0}")]
    Encode(RelayError),
    #[error("Transport failed: {0}")]
    Transport(TransportError),
    #[error("Topic name too long")]
    TopicTooLong,
}

impl From<RelayError> for PushError {
    fn from(e: RelayError) -> Self {
        Self::Encode(e)
    }
}

impl From<TransportError> for PushError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Delivery guarantee requested for a publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
}

/// Connection to a publish/subscribe broker
pub trait PushTransport {
    /// Open a session with `broker`
    fn connect(&mut self, broker: SocketAddr) -> impl Future<Output = Result<(), TransportError>>;

    /// Obtain the id under which `name` is published in this session
    fn register_topic(&mut self, name: &str)
    -> impl Future<Output = Result<TopicId, TransportError>>;

    fn publish(
        &mut self,
        topic: TopicId,
        payload: &[u8],
        qos: QoS,
    ) -> impl Future<Output = Result<(), TransportError>>;
}

/// Origin of a push request, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushRequest {
    Button,
    Timer,
    Shell,
}

/// Bounded queue between push triggers and the [`PushWorker`]
pub struct PushTrigger {
    queue: Channel<CriticalSectionRawMutex, PushRequest, PUSH_QUEUE_DEPTH>,
}

impl PushTrigger {
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
        }
    }

    /// Ask for a publish cycle without blocking.
    ///
    /// Returns `false` when the queue is full and the request was dropped; the
    /// queued cycles will publish the same aggregates anyway.
    pub fn request(&self, source: PushRequest) -> bool {
        match self.queue.try_send(source) {
            Ok(()) => true,
            Err(_) => {
                debug!("Push queue full, dropping {:?} request", source);
                false
            }
        }
    }

    pub async fn next(&self) -> PushRequest {
        self.queue.receive().await
    }

    pub fn try_next(&self) -> Option<PushRequest> {
        self.queue.try_receive().ok()
    }
}

impl Default for PushTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// A published subtopic below the node name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Info,
    Climate,
    Metric(Metric),
}

impl Topic {
    pub const COUNT: usize = 5;

    /// Publication order of one cycle
    pub const ALL: [Topic; Self::COUNT] = [
        Topic::Info,
        Topic::Climate,
        Topic::Metric(Metric::Temperature),
        Topic::Metric(Metric::Humidity),
        Topic::Metric(Metric::AirQuality),
    ];

    const fn index(self) -> usize {
        match self {
            Self::Info => 0,
            Self::Climate => 1,
            Self::Metric(metric) => 2 + metric.index(),
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Climate => "climate",
            Self::Metric(metric) => metric.name(),
        }
    }

    /// Full topic name `<node>/<suffix>`
    pub fn name(self, node: &str) -> Result<TopicName, PushError> {
        let mut name = TopicName::new();
        write!(name, "{}/{}", node, self.suffix()).map_err(|_| PushError::TopicTooLong)?;
        Ok(name)
    }
}

/// Outcome of one publish cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub published: usize,
    pub failed: usize,
}

/// Performs publish cycles on behalf of a [`PushTrigger`]
pub struct PushWorker<'a, T, A, I, const N: usize = SAMPLE_WINDOW> {
    transport: T,
    relay: &'a TelemetryRelay<'a, A, I, N>,
    trigger: &'a PushTrigger,
    broker: SocketAddr,
    node_name: NodeName,
    qos: QoS,
    connected: bool,
    topics: [Option<TopicId>; Topic::COUNT],
}

impl<'a, T, A, I, const N: usize> PushWorker<'a, T, A, I, N>
where
    T: PushTransport,
    A: AddressSource,
    I: Indicator,
{
    pub fn new(
        transport: T,
        relay: &'a TelemetryRelay<'a, A, I, N>,
        trigger: &'a PushTrigger,
        broker: SocketAddr,
        node_name: NodeName,
    ) -> Self {
        Self {
            transport,
            relay,
            trigger,
            broker,
            node_name,
            qos: QoS::default(),
            connected: false,
            topics: [None; Topic::COUNT],
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Serve push requests forever
    pub async fn run(&mut self) -> ! {
        loop {
            let request = self.trigger.next().await;
            debug!("Push requested by {:?}", request);
            let report = self.publish_cycle().await;
            info!(
                "Push cycle done: {} published, {} failed",
                report.published, report.failed
            );
        }
    }

    /// Publish info, climate and every metric once.
    ///
    /// The session is opened lazily; a failed connect abandons the cycle and
    /// is retried on the next one.
    pub async fn publish_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        if self.relay.state() != RelayState::Ready {
            warn!("Relay not registered yet, skipping push");
            report.failed = Topic::COUNT;
            return report;
        }

        if let Err(e) = self.ensure_session().await {
            error!("Cannot reach broker {}: {}", self.broker, e);
            report.failed = Topic::COUNT;
            return report;
        }

        for topic in Topic::ALL {
            match self.publish_topic(topic).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    error!("Failed to publish {}: {}", topic.suffix(), e);
                    report.failed += 1;
                    if self.connected && e == PushError::Transport(TransportError::NotConnected) {
                        warn!("Broker session lost, reconnecting on next push");
                        self.drop_session();
                    }
                }
            }
        }

        report
    }

    async fn ensure_session(&mut self) -> Result<(), TransportError> {
        if self.connected {
            return Ok(());
        }
        self.transport.connect(self.broker).await?;
        self.connected = true;
        self.topics = [None; Topic::COUNT];
        info!("Connected to broker {} as {}", self.broker, self.node_name);
        Ok(())
    }

    fn drop_session(&mut self) {
        self.connected = false;
        self.topics = [None; Topic::COUNT];
    }

    async fn topic_id(&mut self, topic: Topic) -> Result<TopicId, PushError> {
        if let Some(id) = self.topics[topic.index()] {
            return Ok(id);
        }
        if !self.connected {
            return Err(TransportError::NotConnected.into());
        }
        let name = topic.name(&self.node_name)?;
        let id = self.transport.register_topic(&name).await?;
        debug!("Registered topic {} as {}", name, id);
        self.topics[topic.index()] = Some(id);
        Ok(id)
    }

    async fn publish_topic(&mut self, topic: Topic) -> Result<(), PushError> {
        let mut payload = [0u8; MAX_PUBLISH_PAYLOAD];
        let len = match topic {
            Topic::Info => self.relay.encode_info(&mut payload)?,
            Topic::Climate => self.relay.encode_climate(&mut payload)?,
            Topic::Metric(metric) => self.relay.encode_metric(metric, &mut payload)?,
        };
        let id = self.topic_id(topic).await?;
        self.transport.publish(id, &payload[..len], self.qos).await?;
        Ok(())
    }
}
