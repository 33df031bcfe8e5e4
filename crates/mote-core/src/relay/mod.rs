//! Protocol adapter between aggregates and the network
//!
//! The pull path maps a decoded [`Request`] onto the [`RESOURCES`] table and
//! writes the response payload into a caller-provided buffer. The push path
//! ([`push`]) publishes the same encodings to a broker when triggered.
//!
//! Neither path suspends while holding a lock: handlers read aggregates
//! (which lock one buffer at a time), format them, and return.

pub mod encode;
pub mod link_format;
pub mod push;

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::actuator::{Indicator, LedCommand};
use crate::aggregator::Aggregator;
use crate::app_state::Telemetry;
use crate::metric::Metric;
use crate::net::AddressSource;
use crate::storage::SAMPLE_WINDOW;

pub use encode::MapStyle;
pub use push::{PushRequest, PushTransport, PushTrigger, PushWorker, TransportError};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    #[error("Encoded payload exceeds the output buffer")]
    PayloadTooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// Outcome of a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Content,
    Changed,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
    ServiceUnavailable,
}

impl Status {
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Content | Self::Changed)
    }
}

/// Payload media types, numbered as CoAP content formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Text = 0,
    LinkFormat = 40,
    Json = 50,
}

impl ContentFormat {
    pub const fn id(self) -> u16 {
        self as u16
    }

    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            0 => Some(Self::Text),
            40 => Some(Self::LinkFormat),
            50 => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Discovery,
    Metric(Metric),
    Climate,
    Info,
    Led,
}

/// One entry of the resource table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub path: &'static str,
    pub method: Method,
    pub kind: ResourceKind,
    /// Attributes advertised in discovery; `None` hides the resource
    pub link_attrs: Option<&'static str>,
}

/// All resources served by the node, in discovery order
pub const RESOURCES: [Resource; 7] = [
    Resource {
        path: "/.well-known/core",
        method: Method::Get,
        kind: ResourceKind::Discovery,
        link_attrs: Some("ct=40"),
    },
    Resource {
        path: "/temperature",
        method: Method::Get,
        kind: ResourceKind::Metric(Metric::Temperature),
        link_attrs: Some("ct=0"),
    },
    Resource {
        path: "/humidity",
        method: Method::Get,
        kind: ResourceKind::Metric(Metric::Humidity),
        link_attrs: Some("ct=0"),
    },
    Resource {
        path: "/airquality",
        method: Method::Get,
        kind: ResourceKind::Metric(Metric::AirQuality),
        link_attrs: Some("ct=0"),
    },
    Resource {
        path: "/climate",
        method: Method::Get,
        kind: ResourceKind::Climate,
        link_attrs: Some("ct=50"),
    },
    Resource {
        path: "/info",
        method: Method::Get,
        kind: ResourceKind::Info,
        link_attrs: Some("ct=50"),
    },
    Resource {
        path: "/led",
        method: Method::Put,
        kind: ResourceKind::Led,
        link_attrs: None,
    },
];

/// A decoded pull request
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: Method,
    /// Absolute path, e.g. `/temperature`
    pub path: &'a str,
    pub payload: &'a [u8],
    /// Content format the client asked for
    pub accept: Option<ContentFormat>,
}

impl Request<'_> {
    /// Structured output is requested by a `json` payload or a JSON accept hint
    pub fn prefers_structured(&self) -> bool {
        self.payload.starts_with(b"json") || self.accept == Some(ContentFormat::Json)
    }
}

/// Response metadata; the payload is the first `payload_len` bytes of the
/// buffer passed to [`TelemetryRelay::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub content_format: Option<ContentFormat>,
    pub payload_len: usize,
}

impl Response {
    pub const fn empty(status: Status) -> Self {
        Self {
            status,
            content_format: None,
            payload_len: 0,
        }
    }

    const fn content(format: ContentFormat, payload_len: usize) -> Self {
        Self {
            status: Status::Content,
            content_format: Some(format),
            payload_len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Uninitialized,
    Ready,
}

/// Bridges aggregates to pull and push transports
pub struct TelemetryRelay<'a, A, I, const N: usize = SAMPLE_WINDOW> {
    aggregator: Aggregator<'a, N>,
    addresses: &'a A,
    indicator: Mutex<CriticalSectionRawMutex, RefCell<I>>,
    state: Mutex<CriticalSectionRawMutex, Cell<RelayState>>,
    map_style: MapStyle,
}

impl<'a, A, I, const N: usize> TelemetryRelay<'a, A, I, N>
where
    A: AddressSource,
    I: Indicator,
{
    pub fn new(telemetry: &'a Telemetry<N>, addresses: &'a A, indicator: I) -> Self {
        Self {
            aggregator: Aggregator::new(telemetry),
            addresses,
            indicator: Mutex::new(RefCell::new(indicator)),
            state: Mutex::new(Cell::new(RelayState::Uninitialized)),
            map_style: MapStyle::default(),
        }
    }

    pub fn with_map_style(mut self, style: MapStyle) -> Self {
        self.map_style = style;
        self
    }

    /// Start serving requests. Until then every request is answered with
    /// [`Status::ServiceUnavailable`].
    pub fn register(&self) {
        self.state.lock(|state| state.set(RelayState::Ready));
        info!("Relay registered {} resources", RESOURCES.len());
    }

    pub fn state(&self) -> RelayState {
        self.state.lock(|state| state.get())
    }

    pub fn map_style(&self) -> MapStyle {
        self.map_style
    }

    pub fn aggregator(&self) -> Aggregator<'a, N> {
        self.aggregator
    }

    /// Answer one pull request, writing its payload into `out`
    pub fn handle(&self, request: &Request<'_>, out: &mut [u8]) -> Response {
        let response = self.dispatch(request, out);
        debug!(
            "{:?} {} -> {:?} ({} bytes)",
            request.method, request.path, response.status, response.payload_len
        );
        response
    }

    fn dispatch(&self, request: &Request<'_>, out: &mut [u8]) -> Response {
        if self.state() != RelayState::Ready {
            return Response::empty(Status::ServiceUnavailable);
        }

        let mut candidates = RESOURCES.iter().filter(|r| r.path == request.path).peekable();
        if candidates.peek().is_none() {
            return Response::empty(Status::NotFound);
        }
        let Some(resource) = candidates.find(|r| r.method == request.method) else {
            return Response::empty(Status::MethodNotAllowed);
        };

        let result = match resource.kind {
            ResourceKind::Discovery => Ok(Response::content(
                ContentFormat::LinkFormat,
                link_format::render(&RESOURCES, out),
            )),
            ResourceKind::Metric(metric) => self.get_metric(metric, request, out),
            ResourceKind::Climate => self
                .encode_climate(out)
                .map(|len| Response::content(self.map_style.content_format(), len)),
            ResourceKind::Info => self
                .encode_info(out)
                .map(|len| Response::content(self.map_style.content_format(), len)),
            ResourceKind::Led => Ok(self.put_led(request.payload)),
        };

        result.unwrap_or_else(|e| {
            error!("Failed to answer {}: {}", request.path, e);
            Response::empty(Status::InternalServerError)
        })
    }

    fn get_metric(
        &self,
        metric: Metric,
        request: &Request<'_>,
        out: &mut [u8],
    ) -> Result<Response, RelayError> {
        if request.prefers_structured() {
            let len = self.encode_metric(metric, out)?;
            Ok(Response::content(self.map_style.content_format(), len))
        } else {
            let len = encode::decimal(self.aggregator.current_value(metric), out)?;
            Ok(Response::content(ContentFormat::Text, len))
        }
    }

    fn put_led(&self, payload: &[u8]) -> Response {
        match LedCommand::from_payload(payload) {
            Some(command) => {
                self.actuate(command);
                Response::empty(Status::Changed)
            }
            None => {
                warn!("Ignoring malformed LED command ({} bytes)", payload.len());
                Response::empty(Status::BadRequest)
            }
        }
    }

    /// Apply `command` to the indicator
    pub fn actuate(&self, command: LedCommand) {
        self.indicator
            .lock(|indicator| command.apply(&mut *indicator.borrow_mut()));
        info!("LED command {:?} applied", command);
    }

    /// Run `f` with exclusive access to the indicator
    pub fn with_indicator<R>(&self, f: impl FnOnce(&mut I) -> R) -> R {
        self.indicator.lock(|indicator| f(&mut indicator.borrow_mut()))
    }

    /// Structured map of `metric`'s current aggregate
    pub fn encode_metric(&self, metric: Metric, out: &mut [u8]) -> Result<usize, RelayError> {
        encode::metric_map(
            self.map_style,
            metric,
            self.aggregator.current_value(metric),
            out,
        )
    }

    pub fn encode_climate(&self, out: &mut [u8]) -> Result<usize, RelayError> {
        encode::climate_map(self.map_style, self.aggregator.climate(), out)
    }

    pub fn encode_info(&self, out: &mut [u8]) -> Result<usize, RelayError> {
        encode::info_map(self.map_style, self.addresses.primary_global(), out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{LedChannel, LedState};
    use crate::config::MAX_PAYLOAD;
    use crate::net::NodeAddresses;
    use core::net::{IpAddr, Ipv6Addr};

    fn get(path: &str) -> Request<'_> {
        Request {
            method: Method::Get,
            path,
            payload: &[],
            accept: None,
        }
    }

    fn payload(out: &[u8], response: Response) -> &str {
        core::str::from_utf8(&out[..response.payload_len]).unwrap()
    }

    fn fixture() -> (Telemetry<6>, NodeAddresses) {
        let telemetry = Telemetry::new();
        telemetry.seed(Metric::Temperature, 2371);
        telemetry.seed(Metric::Humidity, 4500);
        telemetry.seed(Metric::AirQuality, 9000);
        (telemetry, NodeAddresses::new())
    }

    #[test]
    fn test_unregistered_relay_is_unavailable() {
        let (telemetry, addresses) = fixture();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        let mut out = [0u8; MAX_PAYLOAD];

        assert_eq!(relay.state(), RelayState::Uninitialized);
        let response = relay.handle(&get("/temperature"), &mut out);
        assert_eq!(response, Response::empty(Status::ServiceUnavailable));

        relay.register();
        assert_eq!(relay.state(), RelayState::Ready);
        assert_eq!(relay.handle(&get("/temperature"), &mut out).status, Status::Content);
    }

    #[test]
    fn test_metric_plain_and_structured() {
        let (telemetry, addresses) = fixture();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        relay.register();
        let mut out = [0u8; MAX_PAYLOAD];

        let response = relay.handle(&get("/temperature"), &mut out);
        assert_eq!(response.content_format, Some(ContentFormat::Text));
        assert_eq!(payload(&out, response), "23.71");

        let request = Request {
            payload: b"json",
            ..get("/temperature")
        };
        let response = relay.handle(&request, &mut out);
        assert_eq!(response.content_format, Some(ContentFormat::Text));
        let map = payload(&out, response);
        assert!(map.contains("'temperature'"));
        assert!(map.contains("'C'"));
        assert!(map.contains("100"));
        assert!(map.contains("'2371'"));

        let request = Request {
            accept: Some(ContentFormat::Json),
            ..get("/airquality")
        };
        let response = relay.handle(&request, &mut out);
        assert_eq!(
            payload(&out, response),
            "{sensor: 'airquality',unit: '%',factor: 100,value: '9000'}"
        );
    }

    #[test]
    fn test_json_map_style() {
        let (telemetry, addresses) = fixture();
        let relay =
            TelemetryRelay::new(&telemetry, &addresses, LedState::new()).with_map_style(MapStyle::Json);
        relay.register();
        let mut out = [0u8; MAX_PAYLOAD];

        let response = relay.handle(&get("/climate"), &mut out);
        assert_eq!(response.content_format, Some(ContentFormat::Json));
        assert_eq!(payload(&out, response), r#"{"temperature":2371,"humidity":4500}"#);

        let request = Request {
            accept: Some(ContentFormat::Json),
            ..get("/humidity")
        };
        let response = relay.handle(&request, &mut out);
        assert_eq!(response.content_format, Some(ContentFormat::Json));
        assert!(payload(&out, response).starts_with(r#"{"sensor":"humidity""#));
    }

    #[test]
    fn test_climate_and_info() {
        let (telemetry, addresses) = fixture();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        relay.register();
        let mut out = [0u8; MAX_PAYLOAD];

        // Legacy maps are not JSON, so they are labelled as text
        let response = relay.handle(&get("/climate"), &mut out);
        assert_eq!(response.content_format, Some(ContentFormat::Text));
        assert_eq!(payload(&out, response), "{'temperature': 2371, 'humidity': 4500}");

        let response = relay.handle(&get("/info"), &mut out);
        assert_eq!(payload(&out, response), "{}");

        addresses.set(&[IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 7))]);
        let response = relay.handle(&get("/info"), &mut out);
        assert_eq!(payload(&out, response), "{'addr': '2001:db8::7'}");
    }

    #[test]
    fn test_discovery() {
        let (telemetry, addresses) = fixture();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        relay.register();
        let mut out = [0u8; MAX_PAYLOAD];

        let response = relay.handle(&get("/.well-known/core"), &mut out);
        assert_eq!(response.content_format, Some(ContentFormat::LinkFormat));
        assert!(payload(&out, response).starts_with("</.well-known/core>;ct=40,</temperature>;ct=0"));
    }

    #[test]
    fn test_led_commands() {
        let (telemetry, addresses) = fixture();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        relay.register();
        let mut out = [0u8; MAX_PAYLOAD];

        let put = |payload: &'static [u8]| Request {
            method: Method::Put,
            path: "/led",
            payload,
            accept: None,
        };

        let response = relay.handle(&put(b"1"), &mut out);
        assert_eq!(response, Response::empty(Status::Changed));
        assert!(relay.with_indicator(|leds| leds.is_on(LedChannel::Green)));

        let response = relay.handle(&put(b"g"), &mut out);
        assert_eq!(response.status, Status::Changed);
        assert!(!relay.with_indicator(|leds| leds.is_on(LedChannel::Green)));

        // Rejected commands leave the LEDs alone
        let before = relay.with_indicator(|leds| *leds);
        assert_eq!(relay.handle(&put(b""), &mut out).status, Status::BadRequest);
        assert_eq!(relay.handle(&put(b"?"), &mut out).status, Status::BadRequest);
        assert_eq!(relay.with_indicator(|leds| *leds), before);
    }

    #[test]
    fn test_unknown_path_and_wrong_method() {
        let (telemetry, addresses) = fixture();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        relay.register();
        let mut out = [0u8; MAX_PAYLOAD];

        assert_eq!(relay.handle(&get("/pressure"), &mut out).status, Status::NotFound);
        assert_eq!(relay.handle(&get("/led"), &mut out).status, Status::MethodNotAllowed);

        let request = Request {
            method: Method::Put,
            ..get("/temperature")
        };
        assert_eq!(relay.handle(&request, &mut out).status, Status::MethodNotAllowed);
    }

    #[test]
    fn test_overflow_yields_internal_error() {
        let (telemetry, addresses) = fixture();
        let relay = TelemetryRelay::new(&telemetry, &addresses, LedState::new());
        relay.register();
        let mut out = [0u8; 8];

        let response = relay.handle(&get("/climate"), &mut out);
        assert_eq!(response, Response::empty(Status::InternalServerError));
    }
}
