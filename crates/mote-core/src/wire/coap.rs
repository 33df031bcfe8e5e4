//! Minimal CoAP over UDP (RFC 7252)
//!
//! Covers what a constrained server needs: request parsing with the
//! Uri-Path, Content-Format and Accept options, piggy-backed responses, and
//! resets for empty CON pings. Block-wise transfer and observe are not
//! supported.
//!
//! A CON request is answered with a piggy-backed ACK echoing its message id.
//! A NON request is answered with a NON response carrying a fresh id drawn
//! from [`MessageIds`].

use core::fmt::Write;

use thiserror_no_std::Error;

use crate::actuator::Indicator;
use crate::config::MAX_PAYLOAD;
use crate::net::AddressSource;
use crate::relay::{ContentFormat, Method, Request, Response, Status, TelemetryRelay};

pub const VERSION: u8 = 1;

const PAYLOAD_MARKER: u8 = 0xFF;
const HEADER_LEN: usize = 4;
const MAX_TOKEN_LEN: usize = 8;

/// Longest request path kept after joining Uri-Path segments
pub const MAX_PATH_LEN: usize = 64;

pub mod option {
    pub const URI_HOST: u16 = 3;
    pub const URI_PORT: u16 = 7;
    pub const URI_PATH: u16 = 11;
    pub const CONTENT_FORMAT: u16 = 12;
    pub const URI_QUERY: u16 = 15;
    pub const ACCEPT: u16 = 17;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoapError {
    #[error("Datagram shorter than its header and options")]
    Truncated,
    #[error("Unsupported CoAP version {0}")]
    BadVersion(u8),
    #[error("Token length {0} exceeds 8")]
    BadTokenLength(u8),
    #[error("Malformed or unsupported critical option {0}")]
    BadOption(u16),
    #[error("Request path exceeds {0} bytes")]
    PathTooLong(usize),
    #[error("Output buffer too small")]
    BufferTooSmall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable = 0,
    NonConfirmable = 1,
    Acknowledgement = 2,
    Reset = 3,
}

impl MessageType {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }
}

/// Code byte of a response, `class << 5 | detail`
pub const fn response_code(status: Status) -> u8 {
    const fn code(class: u8, detail: u8) -> u8 {
        (class << 5) | detail
    }
    match status {
        Status::Changed => code(2, 4),
        Status::Content => code(2, 5),
        Status::BadRequest => code(4, 0),
        Status::NotFound => code(4, 4),
        Status::MethodNotAllowed => code(4, 5),
        Status::InternalServerError => code(5, 0),
        Status::ServiceUnavailable => code(5, 3),
    }
}

const fn method_code(method: Method) -> u8 {
    match method {
        Method::Get => 1,
        Method::Post => 2,
        Method::Put => 3,
        Method::Delete => 4,
    }
}

/// A parsed request, borrowing token and payload from the datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapRequest<'a> {
    pub message_type: MessageType,
    pub code: u8,
    pub message_id: u16,
    pub token: &'a [u8],
    /// Uri-Path segments joined with `/`, always starting with `/`
    pub path: heapless::String<MAX_PATH_LEN>,
    pub content_format: Option<u16>,
    pub accept: Option<u16>,
    pub payload: &'a [u8],
}

impl<'a> CoapRequest<'a> {
    /// Empty message, used by clients as a ping
    pub fn is_empty_message(&self) -> bool {
        self.code == 0
    }

    /// Request class (0.01 to 0.31), including methods the node does not know
    pub fn is_request(&self) -> bool {
        self.code != 0 && self.code >> 5 == 0
    }

    pub fn method(&self) -> Option<Method> {
        match self.code {
            1 => Some(Method::Get),
            2 => Some(Method::Post),
            3 => Some(Method::Put),
            4 => Some(Method::Delete),
            _ => None,
        }
    }

    /// View as a relay request; `None` for non-request codes
    pub fn as_request(&self) -> Option<Request<'_>> {
        Some(Request {
            method: self.method()?,
            path: &self.path,
            payload: self.payload,
            accept: self.accept.and_then(ContentFormat::from_id),
        })
    }
}

/// Read an option's extended delta or length nibble
fn extended(nibble: u8, data: &[u8], pos: &mut usize) -> Result<u16, CoapError> {
    match nibble {
        0..=12 => Ok(u16::from(nibble)),
        13 => {
            let byte = *data.get(*pos).ok_or(CoapError::Truncated)?;
            *pos += 1;
            Ok(u16::from(byte) + 13)
        }
        14 => {
            let bytes = data.get(*pos..*pos + 2).ok_or(CoapError::Truncated)?;
            *pos += 2;
            u16::from_be_bytes([bytes[0], bytes[1]])
                .checked_add(269)
                .ok_or(CoapError::Truncated)
        }
        _ => Err(CoapError::Truncated),
    }
}

fn uint_value(number: u16, value: &[u8]) -> Result<u16, CoapError> {
    match value {
        [] => Ok(0),
        [b] => Ok(u16::from(*b)),
        [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(CoapError::BadOption(number)),
    }
}

/// Parse a request datagram
pub fn parse(data: &[u8]) -> Result<CoapRequest<'_>, CoapError> {
    if data.len() < HEADER_LEN {
        return Err(CoapError::Truncated);
    }
    let version = data[0] >> 6;
    if version != VERSION {
        return Err(CoapError::BadVersion(version));
    }
    let token_len = data[0] & 0x0F;
    if usize::from(token_len) > MAX_TOKEN_LEN {
        return Err(CoapError::BadTokenLength(token_len));
    }
    let message_type = MessageType::from_bits(data[0] >> 4);
    let code = data[1];
    let message_id = u16::from_be_bytes([data[2], data[3]]);

    let mut pos = HEADER_LEN;
    let token = data
        .get(pos..pos + usize::from(token_len))
        .ok_or(CoapError::Truncated)?;
    pos += usize::from(token_len);

    let mut request = CoapRequest {
        message_type,
        code,
        message_id,
        token,
        path: heapless::String::new(),
        content_format: None,
        accept: None,
        payload: &[],
    };

    let mut number = 0u16;
    while pos < data.len() {
        let header = data[pos];
        pos += 1;
        if header == PAYLOAD_MARKER {
            // A marker followed by nothing is a format error
            if pos == data.len() {
                return Err(CoapError::Truncated);
            }
            request.payload = &data[pos..];
            break;
        }

        let delta = extended(header >> 4, data, &mut pos)?;
        let len = usize::from(extended(header & 0x0F, data, &mut pos)?);
        number = number.checked_add(delta).ok_or(CoapError::BadOption(u16::MAX))?;
        let value = data.get(pos..pos + len).ok_or(CoapError::Truncated)?;
        pos += len;

        match number {
            option::URI_PATH => {
                let segment =
                    core::str::from_utf8(value).map_err(|_| CoapError::BadOption(number))?;
                write!(request.path, "/{}", segment)
                    .map_err(|_| CoapError::PathTooLong(MAX_PATH_LEN))?;
            }
            option::CONTENT_FORMAT => request.content_format = Some(uint_value(number, value)?),
            option::ACCEPT => request.accept = Some(uint_value(number, value)?),
            option::URI_HOST | option::URI_PORT | option::URI_QUERY => {}
            // Unknown elective options are skipped, unknown critical ones are fatal
            n if n % 2 == 1 => return Err(CoapError::BadOption(n)),
            _ => {}
        }
    }

    if request.path.is_empty() {
        // No Uri-Path means the root resource
        let _ = request.path.push('/');
    }

    Ok(request)
}

/// Sequential writer over an output buffer
struct Cursor<'a> {
    out: &'a mut [u8],
    pos: usize,
    last_option: u16,
}

impl<'a> Cursor<'a> {
    fn new(out: &'a mut [u8]) -> Self {
        Self {
            out,
            pos: 0,
            last_option: 0,
        }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), CoapError> {
        let end = self.pos + bytes.len();
        let dst = self
            .out
            .get_mut(self.pos..end)
            .ok_or(CoapError::BufferTooSmall)?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn header(
        &mut self,
        message_type: MessageType,
        code: u8,
        message_id: u16,
        token: &[u8],
    ) -> Result<(), CoapError> {
        let first = (VERSION << 6) | ((message_type as u8) << 4) | token.len() as u8;
        let [id_hi, id_lo] = message_id.to_be_bytes();
        self.put(&[first, code, id_hi, id_lo])?;
        self.put(token)
    }

    /// Options must be written in ascending number order
    fn option(&mut self, number: u16, value: &[u8]) -> Result<(), CoapError> {
        fn split(value: usize) -> (u8, heapless::Vec<u8, 2>) {
            let mut ext = heapless::Vec::new();
            let nibble = match value {
                0..=12 => value as u8,
                13..=268 => {
                    let _ = ext.push((value - 13) as u8);
                    13
                }
                _ => {
                    let _ = ext.extend_from_slice(&((value - 269) as u16).to_be_bytes());
                    14
                }
            };
            (nibble, ext)
        }

        let (delta, delta_ext) = split(usize::from(number - self.last_option));
        let (len, len_ext) = split(value.len());
        self.put(&[(delta << 4) | len])?;
        self.put(&delta_ext)?;
        self.put(&len_ext)?;
        self.put(value)?;
        self.last_option = number;
        Ok(())
    }

    fn uint_option(&mut self, number: u16, value: u16) -> Result<(), CoapError> {
        let bytes = value.to_be_bytes();
        let skip = match value {
            0 => 2,
            1..=0xFF => 1,
            _ => 0,
        };
        self.option(number, &bytes[skip..])
    }

    fn payload(&mut self, payload: &[u8]) -> Result<(), CoapError> {
        if payload.is_empty() {
            return Ok(());
        }
        self.put(&[PAYLOAD_MARKER])?;
        self.put(payload)
    }
}

/// Build the response to `request`: an ACK carrying the response for CON
/// requests, a NON for NON requests.
pub fn build_response(
    request: &CoapRequest<'_>,
    response: &Response,
    payload: &[u8],
    ids: &mut MessageIds,
    out: &mut [u8],
) -> Result<usize, CoapError> {
    let (message_type, message_id) = match request.message_type {
        MessageType::Confirmable => (MessageType::Acknowledgement, request.message_id),
        _ => (MessageType::NonConfirmable, ids.allocate()),
    };
    let mut cursor = Cursor::new(out);
    cursor.header(
        message_type,
        response_code(response.status),
        message_id,
        request.token,
    )?;
    if let Some(format) = response.content_format {
        cursor.uint_option(option::CONTENT_FORMAT, format.id())?;
    }
    cursor.payload(&payload[..response.payload_len.min(payload.len())])?;
    Ok(cursor.pos)
}

/// Message ids for responses that are not piggy-backed on an ACK
#[derive(Debug, Clone)]
pub struct MessageIds {
    next: u16,
}

impl MessageIds {
    /// Start at `first`, ideally a random value
    pub const fn new(first: u16) -> Self {
        Self { next: first }
    }

    pub fn allocate(&mut self) -> u16 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}

/// Reset answering an empty CON ping
pub fn build_reset(request: &CoapRequest<'_>, out: &mut [u8]) -> Result<usize, CoapError> {
    let mut cursor = Cursor::new(out);
    cursor.header(MessageType::Reset, 0, request.message_id, &[])?;
    Ok(cursor.pos)
}

/// Client side request, used by tooling and tests
pub struct OutgoingRequest<'a> {
    pub message_type: MessageType,
    pub method: Method,
    pub message_id: u16,
    pub token: &'a [u8],
    pub path: &'a str,
    pub accept: Option<ContentFormat>,
    pub payload: &'a [u8],
}

pub fn build_request(request: &OutgoingRequest<'_>, out: &mut [u8]) -> Result<usize, CoapError> {
    if request.token.len() > MAX_TOKEN_LEN {
        return Err(CoapError::BadTokenLength(request.token.len() as u8));
    }
    let mut cursor = Cursor::new(out);
    cursor.header(
        request.message_type,
        method_code(request.method),
        request.message_id,
        request.token,
    )?;
    for segment in request.path.split('/').filter(|s| !s.is_empty()) {
        cursor.option(option::URI_PATH, segment.as_bytes())?;
    }
    if let Some(accept) = request.accept {
        cursor.uint_option(option::ACCEPT, accept.id())?;
    }
    cursor.payload(request.payload)?;
    Ok(cursor.pos)
}

/// Run one datagram through `relay` and frame its answer into `reply`.
///
/// Returns `Ok(None)` when nothing should be sent back: non-confirmable pings
/// and messages carrying a response code are ignored.
pub fn serve_datagram<A, I, const N: usize>(
    relay: &TelemetryRelay<'_, A, I, N>,
    datagram: &[u8],
    ids: &mut MessageIds,
    reply: &mut [u8],
) -> Result<Option<usize>, CoapError>
where
    A: AddressSource,
    I: Indicator,
{
    let request = parse(datagram)?;

    if request.is_empty_message() {
        return match request.message_type {
            MessageType::Confirmable => build_reset(&request, reply).map(Some),
            _ => Ok(None),
        };
    }

    if !request.is_request() {
        return Ok(None);
    }
    let Some(relay_request) = request.as_request() else {
        let response = Response::empty(Status::MethodNotAllowed);
        return build_response(&request, &response, &[], ids, reply).map(Some);
    };
    let mut payload = [0u8; MAX_PAYLOAD];
    let response = relay.handle(&relay_request, &mut payload);
    build_response(&request, &response, &payload, ids, reply).map(Some)
}
